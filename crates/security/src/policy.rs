//! The sandbox policy shared by every tool.

use std::path::{Path, PathBuf};

use ferrule_config::SecurityConfig;

use crate::command::{CommandValidationError, validate_command};
use crate::path::{PathValidationError, validate_path};
use crate::url::{UrlValidationError, validate_url};

/// Command, path and URL rules resolved from configuration.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    allowed_commands: Vec<String>,
    forbidden_paths: Vec<String>,
    allowed_endpoints: Vec<String>,
    workspace_dir: PathBuf,
}

impl SecurityPolicy {
    pub fn new(
        allowed_commands: Vec<String>,
        forbidden_paths: Vec<String>,
        allowed_endpoints: Vec<String>,
        workspace_dir: PathBuf,
    ) -> Self {
        Self {
            allowed_commands,
            forbidden_paths,
            allowed_endpoints,
            workspace_dir,
        }
    }

    /// Build from the `[security]` config section. Without a configured
    /// workspace, relative paths resolve against the process directory.
    pub fn from_config(config: &SecurityConfig) -> Self {
        let workspace_dir = config
            .workspace_dir
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(
            config.allowed_commands.clone(),
            config.forbidden_paths.clone(),
            config.allowed_endpoints.clone(),
            workspace_dir,
        )
    }

    /// Replace the directory relative paths and commands resolve against.
    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = dir.into();
        self
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    pub fn allowed_commands(&self) -> &[String] {
        &self.allowed_commands
    }

    /// Validate a command string and return the argv to spawn.
    pub fn check_command(&self, command: &str) -> Result<Vec<String>, CommandValidationError> {
        validate_command(
            command,
            &self.allowed_commands,
            &self.workspace_dir,
            &self.forbidden_paths,
        )
        .inspect_err(|e| {
            tracing::warn!(command = %command, reason = %e, "Command rejected by security policy");
        })
    }

    /// Validate a filesystem path and return the resolved location.
    pub fn check_path(&self, path: &str) -> Result<PathBuf, PathValidationError> {
        validate_path(path, &self.workspace_dir, &self.forbidden_paths).inspect_err(|e| {
            tracing::warn!(path = %path, reason = %e, "Path rejected by security policy");
        })
    }

    /// Validate a URL for an outbound request.
    pub fn check_url(&self, url: &str) -> Result<url::Url, UrlValidationError> {
        validate_url(url, &self.allowed_endpoints).inspect_err(|e| {
            tracing::warn!(url = %url, reason = %e, "URL rejected by security policy");
        })
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::from_config(&SecurityConfig::default())
    }
}
