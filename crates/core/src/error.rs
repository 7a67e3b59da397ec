//! Error types for the Ferrule domain.
//!
//! Each bounded context has its own `thiserror` enum. Configuration and
//! security errors live in their own crates and convert into [`ToolError`]
//! where they surface through a tool.

use thiserror::Error;

use crate::classify::ErrorKind;

/// A failure reported by (or while talking to) an LLM provider.
///
/// Variants are the first, typed tier of classification; see
/// [`crate::classify::classify`].
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider: {message}")]
    RateLimited {
        retry_after_secs: Option<u64>,
        message: String,
    },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Content policy violation: {0}")]
    ContentPolicy(String),

    #[error("Context window exceeded: {0}")]
    ContextWindowExceeded(String),

    #[error("Provider internal error: {0}")]
    ServerError(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Unprocessable request: {0}")]
    Unprocessable(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// A failure inside the tool pipeline. Never aborts a run; the executor folds
/// it into a tool-result message.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    #[error("Path not allowed: {0}")]
    PathNotAllowed(String),

    #[error("URL not allowed: {0}")]
    UrlNotAllowed(String),

    #[error("Missing required argument '{0}'")]
    MissingField(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Malformed tool arguments: {0}")]
    MalformedInput(String),
}

impl ToolError {
    /// The taxonomy kind this failure belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::ToolNotFound,
            Self::ExecutionFailed { .. } => ErrorKind::ToolExecutionFailed,
            Self::Timeout { .. } => ErrorKind::ToolTimeout,
            Self::PermissionDenied { .. } => ErrorKind::ToolPermissionDenied,
            Self::CommandNotAllowed(_) => ErrorKind::CommandNotAllowed,
            Self::PathNotAllowed(_) => ErrorKind::PathNotAllowed,
            Self::UrlNotAllowed(_) => ErrorKind::UrlNotAllowed,
            Self::MissingField(_) => ErrorKind::MissingField,
            Self::InvalidArguments(_) => ErrorKind::InvalidValue,
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
        }
    }

    /// Whether this failure was a sandbox rejection (nothing was executed).
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::CommandNotAllowed(_)
                | Self::PathNotAllowed(_)
                | Self::UrlNotAllowed(_)
                | Self::PermissionDenied { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::PermissionDenied {
            tool_name: "shell".into(),
            reason: "command not in allowlist".into(),
        };
        assert!(err.to_string().contains("shell"));
        assert!(err.to_string().contains("allowlist"));
    }

    #[test]
    fn tool_error_kinds() {
        assert_eq!(
            ToolError::CommandNotAllowed("rm".into()).kind(),
            ErrorKind::CommandNotAllowed
        );
        assert_eq!(
            ToolError::MissingField("path".into()).kind(),
            ErrorKind::MissingField
        );
        assert!(ToolError::UrlNotAllowed("x".into()).is_policy_violation());
        assert!(!ToolError::MalformedInput("x".into()).is_policy_violation());
    }
}
