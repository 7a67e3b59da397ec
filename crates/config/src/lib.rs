//! Configuration loading, validation, and management for Ferrule.
//!
//! Loads configuration from `~/.ferrule/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ferrule/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Per-attempt HTTP timeout for provider requests
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Orchestration loop bounds
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Provider retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Tool sandbox settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_request_timeout_secs() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("orchestrator", &self.orchestrator)
            .field("retry", &self.retry)
            .field("security", &self.security)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Bounds on one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    /// Tools-enabled provider requests allowed before forced finalization
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Conversation size (characters) that triggers pruning and finalization
    #[serde(default = "default_max_conversation_chars")]
    pub max_conversation_chars: usize,

    /// Most-recent messages kept when the conversation is pruned
    #[serde(default = "default_keep_recent_messages")]
    pub keep_recent_messages: usize,

    /// Per tool call timeout
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Tool output cap before truncation
    #[serde(default = "default_max_tool_output_chars")]
    pub max_tool_output_chars: usize,

    /// System prompt prepended when the history has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_max_iterations() -> u32 {
    5
}
fn default_max_conversation_chars() -> usize {
    50_000
}
fn default_keep_recent_messages() -> usize {
    10
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_max_tool_output_chars() -> usize {
    4_000
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_conversation_chars: default_max_conversation_chars(),
            keep_recent_messages: default_keep_recent_messages(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_tool_output_chars: default_max_tool_output_chars(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for linear/exponential backoff, in seconds
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_secs() -> f64 {
    1.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Leading command tokens the shell tool may run
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Extra forbidden path prefixes (on top of built-in system directories)
    #[serde(default)]
    pub forbidden_paths: Vec<String>,

    /// If non-empty, URLs must start with one of these prefixes
    #[serde(default)]
    pub allowed_endpoints: Vec<String>,

    /// Working directory for shell commands (default: process cwd)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<String>,
}

fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "dir", "cat", "head", "tail", "echo", "pwd", "date", "whoami", "wc", "grep", "find",
        "which", "sort", "uniq", "diff", "stat", "file", "du", "df", "uname", "git", "mkdir",
        "touch", "cp", "mv", "rm",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            forbidden_paths: vec!["~/.ssh".into(), "~/.gnupg".into(), "~/.aws".into()],
            allowed_endpoints: vec![],
            workspace_dir: None,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.ferrule/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `FERRULE_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("FERRULE_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("FERRULE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("FERRULE_MODEL") {
            self.default_model = model;
        }

        if let Some(raw) = lookup("FERRULE_MAX_ITERATIONS") {
            self.orchestrator.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FERRULE_MAX_ITERATIONS must be a positive integer, got '{raw}'"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ferrule")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.orchestrator.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_iterations must be at least 1".into(),
            ));
        }

        if self.orchestrator.max_conversation_chars == 0
            || self.orchestrator.max_tool_output_chars == 0
        {
            return Err(ConfigError::ValidationError(
                "orchestrator size bounds must be greater than 0".into(),
            ));
        }

        if self.orchestrator.keep_recent_messages == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.keep_recent_messages must be at least 1".into(),
            ));
        }

        if self.orchestrator.tool_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be greater than 0 seconds".into(),
            ));
        }

        if !self.retry.base_delay_secs.is_finite() || self.retry.base_delay_secs < 0.0 {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_secs must be a non-negative number".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Serialize the configuration as TOML with secrets removed.
    pub fn redacted_toml(&self) -> String {
        let mut copy = self.clone();
        if copy.api_key.is_some() {
            copy.api_key = Some("[REDACTED]".into());
        }
        for provider in copy.providers.values_mut() {
            if provider.api_key.is_some() {
                provider.api_key = Some("[REDACTED]".into());
            }
        }
        toml::to_string_pretty(&copy).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            orchestrator: OrchestratorSettings::default(),
            retry: RetryConfig::default(),
            security: SecurityConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
