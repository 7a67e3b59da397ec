//! Shell tool: run an allow-listed command inside the workspace.
//!
//! The command string is tokenized by the security policy and spawned
//! directly from its argv. No shell is involved, so pipes, redirects and
//! substitutions can never take effect.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferrule_core::error::ToolError;
use ferrule_core::tool::{PropertySchema, Tool, ToolArgs, ToolCapability, ToolOutput, ToolSchema};
use ferrule_security::SecurityPolicy;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::str_arg;

/// Upper bound of the `timeout_secs` argument. The executor's configured
/// timeout caps it further.
pub const MAX_TIMEOUT_SECS: u64 = 300;

pub struct ShellTool {
    policy: Arc<SecurityPolicy>,
}

impl ShellTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Run an allow-listed command in the workspace and return its output. \
         Pipes, redirects and command chaining are not supported."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("shell")
            .required(
                "command",
                PropertySchema::string("The command to run, e.g. 'ls -la src'"),
            )
            .optional(
                "timeout_secs",
                PropertySchema::integer(
                    "Seconds before the command is killed. Optional; can only shorten the configured tool timeout",
                )
                .with_range(1.0, MAX_TIMEOUT_SECS as f64),
            )
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Command
    }

    fn validate(&self, args: &ToolArgs) -> Result<(), ToolError> {
        self.policy.check_command(str_arg(args, "command")?)?;
        Ok(())
    }

    fn timeout_hint(&self, args: &ToolArgs) -> Option<Duration> {
        args.get("timeout_secs")
            .and_then(|v| v.as_u64())
            .map(|secs| Duration::from_secs(secs.clamp(1, MAX_TIMEOUT_SECS)))
    }

    async fn execute(&self, args: ToolArgs, cancel: CancellationToken) -> Result<ToolOutput, ToolError> {
        let command = str_arg(&args, "command")?;
        let argv = self.policy.check_command(command)?;
        let Some((program, rest)) = argv.split_first() else {
            return Err(ToolError::InvalidArguments("empty command".into()));
        };

        debug!(command = %command, cwd = %self.policy.workspace_dir().display(), "Spawning command");

        let child = Command::new(program)
            .args(rest)
            .current_dir(self.policy.workspace_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "shell".into(),
                reason: format!("could not start '{program}': {e}"),
            })?;

        // Dropping the child on cancellation kills it.
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "shell".into(),
                    reason: "command cancelled".into(),
                });
            }
            output = child.wait_with_output() => output.map_err(|e| ToolError::ExecutionFailed {
                tool_name: "shell".into(),
                reason: e.to_string(),
            })?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let stdout = stdout.trim_end();
            let stderr = stderr.trim_end();
            let content = match (stdout.is_empty(), stderr.is_empty()) {
                (true, true) => "(no output)".to_string(),
                (_, true) => stdout.to_string(),
                (true, false) => format!("[stderr]\n{stderr}"),
                (false, false) => format!("{stdout}\n[stderr]\n{stderr}"),
            };
            return Ok(ToolOutput::ok(content));
        }

        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        warn!(command = %command, exit_code = %code, "Command exited with failure");
        let mut content = format!("[exit code: {code}]");
        for stream in [stdout.trim_end(), stderr.trim_end()] {
            if !stream.is_empty() {
                content.push('\n');
                content.push_str(stream);
            }
        }
        Ok(ToolOutput::failed(content))
    }
}
