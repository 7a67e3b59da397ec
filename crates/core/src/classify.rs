//! Error classification: maps any failure to an [`ErrorKind`], a fixed
//! [`RetryStrategy`], and a [`Severity`].
//!
//! Provider failures are classified in tiers:
//! 1. the concrete [`ProviderError`] variant,
//! 2. the HTTP status code of a generic API error,
//! 3. keyword matching over the message text ([`KEYWORD_RULES`]),
//! 4. [`ErrorKind::Unknown`].

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// The error taxonomy shared by providers, tools, validation and the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // --- Provider ---
    RateLimit,
    Authentication,
    InvalidRequest,
    Timeout,
    Connection,
    ContentPolicy,
    ContextWindowExceeded,
    InternalServer,
    NotFound,
    PermissionDenied,
    ServiceUnavailable,
    Unprocessable,
    EmptyResponse,
    InvalidResponse,

    // --- Tool ---
    ToolExecutionFailed,
    ToolNotFound,
    ToolTimeout,
    ToolPermissionDenied,
    CommandNotAllowed,
    PathNotAllowed,
    UrlNotAllowed,

    // --- Validation ---
    MissingField,
    InvalidValue,
    MalformedInput,

    // --- System ---
    Internal,
    Configuration,
    Unknown,
}

/// How a failed request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    None,
    Immediate,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorKind {
    /// Stable wire code used in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimit => "RATE_LIMIT_EXCEEDED",
            Self::Authentication => "AUTHENTICATION_FAILED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::Timeout => "TIMEOUT",
            Self::Connection => "CONNECTION_ERROR",
            Self::ContentPolicy => "CONTENT_POLICY_VIOLATION",
            Self::ContextWindowExceeded => "CONTEXT_WINDOW_EXCEEDED",
            Self::InternalServer => "INTERNAL_SERVER_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Unprocessable => "UNPROCESSABLE_ENTITY",
            Self::EmptyResponse => "EMPTY_RESPONSE",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::ToolExecutionFailed => "TOOL_EXECUTION_FAILED",
            Self::ToolNotFound => "TOOL_NOT_FOUND",
            Self::ToolTimeout => "TOOL_TIMEOUT",
            Self::ToolPermissionDenied => "TOOL_PERMISSION_DENIED",
            Self::CommandNotAllowed => "COMMAND_NOT_ALLOWED",
            Self::PathNotAllowed => "PATH_NOT_ALLOWED",
            Self::UrlNotAllowed => "URL_NOT_ALLOWED",
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidValue => "INVALID_VALUE",
            Self::MalformedInput => "MALFORMED_INPUT",
            Self::Internal => "INTERNAL_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// The fixed retry strategy for this kind. Not configurable per call.
    pub fn retry_strategy(&self) -> RetryStrategy {
        match self {
            Self::RateLimit | Self::Connection | Self::InternalServer | Self::ServiceUnavailable => {
                RetryStrategy::Exponential
            }
            Self::Timeout | Self::Unknown => RetryStrategy::Linear,
            Self::EmptyResponse | Self::InvalidResponse => RetryStrategy::Immediate,
            _ => RetryStrategy::None,
        }
    }

    pub fn should_retry(&self) -> bool {
        self.retry_strategy() != RetryStrategy::None
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Configuration | Self::Internal => Severity::Critical,
            Self::Authentication
            | Self::PermissionDenied
            | Self::ContentPolicy
            | Self::InternalServer
            | Self::ServiceUnavailable
            | Self::ToolPermissionDenied
            | Self::CommandNotAllowed
            | Self::PathNotAllowed
            | Self::UrlNotAllowed => Severity::High,
            Self::Unknown => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// The result of classifying one failure. Computed per failure, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    pub retry_strategy: RetryStrategy,
    pub severity: Severity,
}

impl ErrorClassification {
    pub fn of(kind: ErrorKind) -> Self {
        Self {
            kind,
            retry_strategy: kind.retry_strategy(),
            severity: kind.severity(),
        }
    }

    pub fn retryable(&self) -> bool {
        self.retry_strategy != RetryStrategy::None
    }
}

/// Bumped whenever [`KEYWORD_RULES`] changes.
pub const KEYWORD_TABLE_VERSION: u32 = 1;

/// Last-resort keyword table, evaluated in order against the lowercased
/// message text. The first rule with a matching phrase wins.
pub const KEYWORD_RULES: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::RateLimit,
        &["rate limit", "rate-limit", "ratelimit", "too many requests", "quota exceeded"],
    ),
    (
        ErrorKind::ContextWindowExceeded,
        &[
            "context length",
            "context window",
            "maximum context",
            "too many tokens",
            "token limit",
            "prompt is too long",
        ],
    ),
    (
        ErrorKind::ContentPolicy,
        &["content policy", "content filter", "content_filter", "safety system", "moderation"],
    ),
    (
        ErrorKind::Authentication,
        &["unauthorized", "invalid api key", "incorrect api key", "authentication", "api key not"],
    ),
    (
        ErrorKind::PermissionDenied,
        &["permission denied", "forbidden", "not allowed to access", "insufficient permissions"],
    ),
    (
        ErrorKind::Timeout,
        &["timed out", "timeout", "deadline exceeded"],
    ),
    (
        ErrorKind::ServiceUnavailable,
        &["service unavailable", "overloaded", "bad gateway", "temporarily unavailable"],
    ),
    (
        ErrorKind::Connection,
        &[
            "connection refused",
            "connection reset",
            "connection closed",
            "connection error",
            "network",
            "dns",
            "broken pipe",
        ],
    ),
    (
        ErrorKind::InternalServer,
        &["internal server error", "internal error", "server error"],
    ),
    (
        ErrorKind::NotFound,
        &["not found", "does not exist", "no such model"],
    ),
    (
        ErrorKind::Unprocessable,
        &["unprocessable"],
    ),
    (
        ErrorKind::InvalidRequest,
        &["invalid request", "bad request", "malformed request", "invalid_request"],
    ),
    (
        ErrorKind::EmptyResponse,
        &["empty response", "no content returned"],
    ),
    (
        ErrorKind::InvalidResponse,
        &["invalid response", "failed to parse", "unexpected response", "no choices"],
    ),
];

/// Keyword tier: classify free-form failure text, or `None` if nothing matched.
pub fn classify_message(text: &str) -> Option<ErrorKind> {
    let lower = text.to_lowercase();
    KEYWORD_RULES
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| lower.contains(p)))
        .map(|(kind, _)| *kind)
}

/// Status tier: classify an HTTP status code.
pub fn classify_status(status_code: u16) -> Option<ErrorKind> {
    match status_code {
        400 => Some(ErrorKind::InvalidRequest),
        401 => Some(ErrorKind::Authentication),
        403 => Some(ErrorKind::PermissionDenied),
        404 => Some(ErrorKind::NotFound),
        408 => Some(ErrorKind::Timeout),
        422 => Some(ErrorKind::Unprocessable),
        429 => Some(ErrorKind::RateLimit),
        500 => Some(ErrorKind::InternalServer),
        502..=504 => Some(ErrorKind::ServiceUnavailable),
        501 | 505..=599 => Some(ErrorKind::InternalServer),
        _ => None,
    }
}

/// Classify a provider failure.
pub fn classify(error: &ProviderError) -> ErrorClassification {
    let kind = match error {
        ProviderError::RateLimited { .. } => ErrorKind::RateLimit,
        ProviderError::AuthenticationFailed(_) => ErrorKind::Authentication,
        ProviderError::InvalidRequest(_) => ErrorKind::InvalidRequest,
        ProviderError::Timeout(_) => ErrorKind::Timeout,
        ProviderError::Network(_) => ErrorKind::Connection,
        ProviderError::ContentPolicy(_) => ErrorKind::ContentPolicy,
        ProviderError::ContextWindowExceeded(_) => ErrorKind::ContextWindowExceeded,
        ProviderError::ServerError(_) => ErrorKind::InternalServer,
        ProviderError::ModelNotFound(_) => ErrorKind::NotFound,
        ProviderError::PermissionDenied(_) => ErrorKind::PermissionDenied,
        ProviderError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
        ProviderError::Unprocessable(_) => ErrorKind::Unprocessable,
        ProviderError::EmptyResponse(_) => ErrorKind::EmptyResponse,
        ProviderError::InvalidResponse(_) => ErrorKind::InvalidResponse,
        ProviderError::NotConfigured(_) => ErrorKind::Configuration,
        ProviderError::ApiError {
            status_code,
            message,
        } => {
            // A 400 often hides a more specific cause in its body.
            let from_text = classify_message(message);
            match (classify_status(*status_code), from_text) {
                (
                    Some(ErrorKind::InvalidRequest),
                    Some(k @ (ErrorKind::ContextWindowExceeded | ErrorKind::ContentPolicy)),
                ) => k,
                (Some(k), _) => k,
                (None, Some(k)) => k,
                (None, None) => ErrorKind::Unknown,
            }
        }
    };
    ErrorClassification::of(kind)
}
