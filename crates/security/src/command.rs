//! Command validation: allow-listed, metacharacter-free, argv-only commands.
//!
//! A command string is accepted only if its leading token is allow-listed and
//! it contains no shell metacharacters. Commands that delete, move, copy or
//! create files also have every target put through the path sandbox and
//! confined to the workspace. The accepted command is returned as an argv
//! vector so it can be spawned without a shell.

use std::path::Path;

use ferrule_core::error::ToolError;

use crate::path::{is_system_path, validate_path};

/// Substrings that make a command string unsafe to run.
pub const SHELL_METACHARACTERS: &[&str] = &["&&", "||", "|", ";", ">", "<", "`", "$(", "${", "\n", "\r"];

/// Commands that remove data and get their targets checked.
pub const DESTRUCTIVE_COMMANDS: &[&str] = &["rm", "rmdir", "del", "rd", "unlink", "shred"];

/// Commands that write to their targets. `mv` also removes its sources.
pub const WRITING_COMMANDS: &[&str] = &["mv", "cp", "mkdir", "touch"];

/// Targets a destructive command may never touch.
const DANGEROUS_TARGETS: &[&str] = &[
    "/", "/*", "*", "~", "~/", "~/*", ".", "./", "./*", "..", "../", "\\", "c:\\", "c:/",
];

/// `find` flags that delete files or run programs.
const FIND_ACTION_FLAGS: &[&str] = &["-delete", "-exec", "-execdir", "-ok", "-okdir"];

/// `git` options that inject configuration or helper programs.
const GIT_OVERRIDE_FLAGS: &[&str] = &["--exec-path", "--upload-pack", "--receive-pack", "--config-env"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandValidationError {
    #[error("Command is empty")]
    Empty,

    #[error("Command '{command}' is not in the allow-list")]
    NotAllowed { command: String },

    #[error("Shell metacharacter '{pattern}' is not permitted")]
    ShellMetacharacter { pattern: String },

    #[error("Refusing to run '{command}' against '{target}'")]
    DestructiveTarget { command: String, target: String },

    #[error("Target '{target}' of '{command}' is not allowed: {reason}")]
    UnsafeTarget {
        command: String,
        target: String,
        reason: String,
    },

    #[error("Target '{target}' of '{command}' is outside the workspace")]
    OutsideWorkspace { command: String, target: String },

    #[error("Unterminated quote in command")]
    UnterminatedQuote,
}

impl From<CommandValidationError> for ToolError {
    fn from(e: CommandValidationError) -> Self {
        ToolError::CommandNotAllowed(e.to_string())
    }
}

/// Validate a command string and return its argv.
///
/// File targets resolve against `workspace_dir` and are checked with the
/// same rules (including `forbidden_paths`) as the file tools.
pub fn validate_command(
    command: &str,
    allowed_commands: &[String],
    workspace_dir: &Path,
    forbidden_paths: &[String],
) -> Result<Vec<String>, CommandValidationError> {
    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(CommandValidationError::Empty);
    }

    if let Some(pattern) = SHELL_METACHARACTERS.iter().find(|p| trimmed.contains(*p)) {
        return Err(CommandValidationError::ShellMetacharacter {
            pattern: pattern.escape_default().to_string(),
        });
    }

    let argv = tokenize(trimmed)?;
    let Some(program) = argv.first() else {
        return Err(CommandValidationError::Empty);
    };

    if !allowed_commands.iter().any(|c| c == program) {
        return Err(CommandValidationError::NotAllowed {
            command: program.clone(),
        });
    }

    let destructive = DESTRUCTIVE_COMMANDS.contains(&program.as_str());
    if destructive || WRITING_COMMANDS.contains(&program.as_str()) {
        let removes = destructive || program == "mv";
        for target in argv.iter().skip(1).filter_map(|a| target_of(a)) {
            if destructive && is_dangerous_target(target) {
                return Err(CommandValidationError::DestructiveTarget {
                    command: program.clone(),
                    target: target.to_string(),
                });
            }
            check_target(program, target, removes, workspace_dir, forbidden_paths)?;
        }
    }

    let blocked_flag = match program.as_str() {
        "find" => argv.iter().find(|a| FIND_ACTION_FLAGS.contains(&a.as_str())),
        "git" => argv.iter().skip(1).find(|a| is_git_override(a)),
        _ => None,
    };
    if let Some(flag) = blocked_flag {
        return Err(CommandValidationError::DestructiveTarget {
            command: program.clone(),
            target: flag.clone(),
        });
    }

    Ok(argv)
}

/// The file operand carried by an argument, if any. `--opt=value` carries
/// `value`; other flags carry none.
fn target_of(arg: &str) -> Option<&str> {
    if let Some(long) = arg.strip_prefix("--") {
        return long.split_once('=').map(|(_, value)| value).filter(|v| !v.is_empty());
    }
    if is_flag(arg) { None } else { Some(arg) }
}

fn is_flag(arg: &str) -> bool {
    if arg.len() > 1 && arg.starts_with('-') {
        return true;
    }
    // Windows-style switches such as `del /s /q`
    arg.len() == 2 && arg.starts_with('/') && arg[1..].chars().all(|c| c.is_ascii_alphabetic())
}

fn is_dangerous_target(target: &str) -> bool {
    let lower = target.to_lowercase();
    let trimmed = lower.trim_end_matches(['/', '\\']);
    DANGEROUS_TARGETS.contains(&lower.as_str())
        || trimmed.is_empty()
        || trimmed == "~"
        || trimmed == "."
        || trimmed == ".."
        || is_system_path(&lower)
}

fn is_git_override(arg: &str) -> bool {
    (arg.starts_with("-c") && !arg.starts_with("--"))
        || GIT_OVERRIDE_FLAGS
            .iter()
            .any(|flag| arg == *flag || arg.strip_prefix(flag).is_some_and(|rest| rest.starts_with('=')))
}

/// Run `target` through the path sandbox and confine it to the workspace.
fn check_target(
    program: &str,
    target: &str,
    removes: bool,
    workspace_dir: &Path,
    forbidden_paths: &[String],
) -> Result<(), CommandValidationError> {
    let resolved = validate_path(target, workspace_dir, forbidden_paths).map_err(|e| {
        CommandValidationError::UnsafeTarget {
            command: program.to_string(),
            target: target.to_string(),
            reason: e.to_string(),
        }
    })?;

    let root = workspace_dir
        .canonicalize()
        .unwrap_or_else(|_| workspace_dir.to_path_buf());
    if !resolved.starts_with(&root) && !resolved.starts_with(workspace_dir) {
        return Err(CommandValidationError::OutsideWorkspace {
            command: program.to_string(),
            target: target.to_string(),
        });
    }
    if removes && (resolved == root || resolved == workspace_dir) {
        return Err(CommandValidationError::DestructiveTarget {
            command: program.to_string(),
            target: target.to_string(),
        });
    }
    Ok(())
}

/// Split a command into argv, honoring single and double quotes.
pub fn tokenize(command: &str) -> Result<Vec<String>, CommandValidationError> {
    let mut argv = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    argv.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(CommandValidationError::UnterminatedQuote);
    }
    if in_token {
        argv.push(current);
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_config::SecurityConfig;

    fn allowed() -> Vec<String> {
        ["ls", "echo", "rm", "cat", "find", "git", "mv", "cp", "mkdir"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn check(command: &str) -> Result<Vec<String>, CommandValidationError> {
        let workspace = tempfile::tempdir().unwrap();
        check_in(command, workspace.path())
    }

    fn check_in(command: &str, workspace: &Path) -> Result<Vec<String>, CommandValidationError> {
        validate_command(command, &allowed(), workspace, &[])
    }

    #[test]
    fn allowed_command_returns_argv() {
        let argv = check("ls -la src").unwrap();
        assert_eq!(argv, vec!["ls", "-la", "src"]);
    }

    #[test]
    fn unlisted_command_rejected() {
        assert_eq!(
            check("curl http://example.com"),
            Err(CommandValidationError::NotAllowed {
                command: "curl".into()
            })
        );
    }

    #[test]
    fn metacharacters_reject_whole_command() {
        for cmd in [
            "ls && whoami",
            "ls || true",
            "ls | grep x",
            "ls; rm x",
            "echo hi > out.txt",
            "cat < in.txt",
            "echo `id`",
            "echo $(id)",
            "echo ${HOME}",
            "ls\nwhoami",
        ] {
            assert!(
                matches!(check(cmd), Err(CommandValidationError::ShellMetacharacter { .. })),
                "{cmd}"
            );
        }
    }

    #[test]
    fn rm_rf_root_rejected() {
        let err = check("rm -rf /").unwrap_err();
        assert_eq!(
            err,
            CommandValidationError::DestructiveTarget {
                command: "rm".into(),
                target: "/".into()
            }
        );
    }

    #[test]
    fn rm_wildcards_and_system_dirs_rejected() {
        for cmd in ["rm -rf *", "rm -r ~", "rm -rf .", "rm -rf ..", "rm -rf /etc", "rm /usr/bin/ls", "rm -rf /*"] {
            assert!(
                matches!(check(cmd), Err(CommandValidationError::DestructiveTarget { .. })),
                "{cmd}"
            );
        }
    }

    #[test]
    fn rm_of_ordinary_file_allowed() {
        let argv = check("rm build/output.log").unwrap();
        assert_eq!(argv, vec!["rm", "build/output.log"]);
    }

    #[test]
    fn rm_outside_workspace_rejected() {
        for cmd in ["rm -rf /home", "rm -rf /home/alice/Documents", "rm -rf /opt", "rmdir /tmp"] {
            assert!(
                matches!(check(cmd), Err(CommandValidationError::OutsideWorkspace { .. })),
                "{cmd}"
            );
        }
    }

    #[test]
    fn rm_traversal_rejected() {
        assert!(matches!(
            check("rm -rf ../sibling"),
            Err(CommandValidationError::UnsafeTarget { .. })
        ));
        assert!(matches!(
            check("rm -rf build/../../sibling"),
            Err(CommandValidationError::UnsafeTarget { .. })
        ));
    }

    #[test]
    fn rm_of_workspace_root_by_absolute_path_rejected() {
        let workspace = tempfile::tempdir().unwrap();
        let cmd = format!("rm -rf {}", workspace.path().display());
        assert!(matches!(
            check_in(&cmd, workspace.path()),
            Err(CommandValidationError::DestructiveTarget { .. })
        ));
    }

    #[test]
    fn absolute_path_inside_workspace_allowed() {
        let workspace = tempfile::tempdir().unwrap();
        std::fs::write(workspace.path().join("old.log"), "").unwrap();
        let cmd = format!("rm {}", workspace.path().join("old.log").display());
        assert!(check_in(&cmd, workspace.path()).is_ok());
    }

    #[test]
    fn forbidden_paths_apply_to_targets() {
        let workspace = tempfile::tempdir().unwrap();
        std::fs::create_dir(workspace.path().join("secrets")).unwrap();
        let forbidden = vec![workspace.path().join("secrets").display().to_string()];
        let result = validate_command("rm -rf secrets", &allowed(), workspace.path(), &forbidden);
        assert!(matches!(result, Err(CommandValidationError::UnsafeTarget { .. })));
    }

    #[test]
    fn mv_and_cp_targets_checked() {
        for cmd in ["mv /etc/passwd x", "cp /etc/shadow stolen", "cp notes.txt /opt/notes.txt", "mv . ../elsewhere"] {
            assert!(check(cmd).is_err(), "{cmd}");
        }
        assert!(matches!(
            check("cp --target-directory=/opt notes.txt"),
            Err(CommandValidationError::OutsideWorkspace { .. })
        ));
        assert!(check("cp -r src backup/src").is_ok());
        assert!(check("mv draft.md docs/final.md").is_ok());
        assert!(check("mkdir -p out/reports").is_ok());
    }

    #[test]
    fn find_actions_rejected() {
        assert!(check("find . -name x -delete").is_err());
        assert!(check("find . -exec whoami").is_err());
        assert!(check("find . -name '*.rs'").is_ok());
    }

    #[test]
    fn git_overrides_rejected() {
        for cmd in [
            "git -c core.pager=whoami log",
            "git -c alias.x=!whoami x",
            "git --exec-path=/tmp/evil status",
            "git fetch --upload-pack=whoami origin",
        ] {
            assert!(check(cmd).is_err(), "{cmd}");
        }
        assert!(check("git status --short").is_ok());
        assert!(check("git log --oneline -n 5").is_ok());
    }

    #[test]
    fn default_allow_list_has_no_interpreters() {
        let workspace = tempfile::tempdir().unwrap();
        let defaults = SecurityConfig::default().allowed_commands;
        for cmd in [
            r#"python3 -c "__import__('shutil').rmtree('/home/alice')""#,
            "python -c print",
            "node -e process.exit",
            "npm install left-pad",
            "pip install requests",
            "cargo run",
        ] {
            assert!(
                matches!(
                    validate_command(cmd, &defaults, workspace.path(), &[]),
                    Err(CommandValidationError::NotAllowed { .. })
                ),
                "{cmd}"
            );
        }
        assert!(validate_command("ls -la", &defaults, workspace.path(), &[]).is_ok());
    }

    #[test]
    fn quoted_arguments_stay_together() {
        let argv = tokenize(r#"git commit -m "fix the thing" 'x y'"#).unwrap();
        assert_eq!(argv, vec!["git", "commit", "-m", "fix the thing", "x y"]);
    }

    #[test]
    fn unterminated_quote_rejected() {
        assert_eq!(check("echo 'oops"), Err(CommandValidationError::UnterminatedQuote));
    }

    #[test]
    fn empty_command_rejected() {
        assert_eq!(check("   "), Err(CommandValidationError::Empty));
    }
}
