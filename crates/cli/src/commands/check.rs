//! `ferrule check-*`: run the security validators without executing anything.

use std::fmt::Display;

use ferrule_config::AppConfig;

use super::{CommandResult, security_policy};

pub fn command(config: &AppConfig, command: &str) -> CommandResult {
    let verdict = security_policy(config)
        .check_command(command)
        .map(|argv| format!("argv {argv:?}"));
    report("command", command, verdict)
}

pub fn path(config: &AppConfig, path: &str) -> CommandResult {
    let verdict = security_policy(config)
        .check_path(path)
        .map(|resolved| format!("resolves to {}", resolved.display()));
    report("path", path, verdict)
}

pub fn url(config: &AppConfig, url: &str) -> CommandResult {
    let verdict = security_policy(config)
        .check_url(url)
        .map(|parsed| format!("host {}", parsed.host_str().unwrap_or("-")));
    report("url", url, verdict)
}

fn report<E: Display>(what: &str, input: &str, verdict: Result<String, E>) -> CommandResult {
    match verdict {
        Ok(detail) => {
            println!("allowed: {what} '{input}' ({detail})");
            Ok(())
        }
        Err(e) => {
            println!("rejected: {what} '{input}': {e}");
            Err(format!("{what} rejected").into())
        }
    }
}
