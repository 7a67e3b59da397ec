//! Response envelopes: the uniform wire-level result of one orchestration run.
//!
//! Every envelope carries execution timing (elapsed seconds plus ISO-8601
//! start/finish timestamps). Error envelopes carry a stable code, a
//! `retryable` flag, actionable suggestions, and for rate limits a
//! `retryAfter` hint in seconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Instant;

use crate::classify::{ErrorClassification, ErrorKind};
use crate::error::ProviderError;
use crate::provider::Usage;

/// Used when a rate-limited provider gives no usable hint.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
    Partial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    pub elapsed_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Which provider/model produced the response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T> {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub execution: ExecutionInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl<T> ResponseEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    /// Attach model information after construction.
    pub fn with_model_info(mut self, model_info: ModelInfo) -> Self {
        self.model_info = Some(model_info);
        self
    }
}

/// Builds envelopes that share the timing of one originating request.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl EnvelopeBuilder {
    /// Start the clock for a new request.
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn execution(&self) -> ExecutionInfo {
        ExecutionInfo {
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
            started_at: self.started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn success<T>(
        &self,
        data: T,
        message: Option<String>,
        model_info: Option<ModelInfo>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> ResponseEnvelope<T> {
        ResponseEnvelope {
            status: ResponseStatus::Success,
            data: Some(data),
            error: None,
            message,
            execution: self.execution(),
            model_info,
            metadata,
        }
    }

    /// A response that produced usable data but did not complete normally.
    pub fn partial<T>(&self, data: T, message: impl Into<String>) -> ResponseEnvelope<T> {
        ResponseEnvelope {
            status: ResponseStatus::Partial,
            data: Some(data),
            error: None,
            message: Some(message.into()),
            execution: self.execution(),
            model_info: None,
            metadata: None,
        }
    }

    /// An error envelope. Suggestions default to the kind's standard advice.
    pub fn error<T>(
        &self,
        kind: ErrorKind,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
        retry_after: Option<u64>,
        retryable: bool,
        suggestions: Option<Vec<String>>,
    ) -> ResponseEnvelope<T> {
        let message = message.into();
        let retry_after = match kind {
            ErrorKind::RateLimit => Some(
                retry_after
                    .or_else(|| parse_retry_after(&message))
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            ),
            _ => retry_after,
        };
        ResponseEnvelope {
            status: ResponseStatus::Error,
            data: None,
            error: Some(ErrorBody {
                code: kind.code().to_string(),
                kind,
                message: message.clone(),
                details,
                retryable,
                retry_after,
                suggestions: suggestions.unwrap_or_else(|| default_suggestions(kind)),
            }),
            message: Some(message),
            execution: self.execution(),
            model_info: None,
            metadata: None,
        }
    }

    /// An error envelope for a classified provider failure.
    pub fn from_provider_error<T>(
        &self,
        classification: &ErrorClassification,
        error: &ProviderError,
        details: Option<serde_json::Value>,
    ) -> ResponseEnvelope<T> {
        let retry_after = match error {
            ProviderError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        };
        self.error(
            classification.kind,
            error.to_string(),
            details,
            retry_after,
            classification.retryable(),
            None,
        )
    }
}

static RETRY_AFTER_RE: LazyLock<Option<regex_lite::Regex>> = LazyLock::new(|| {
    regex_lite::Regex::new(
        r"(?i)(?:retry[- _]after[:=\s]+|try again in\s+|retry in\s+)(\d+(?:\.\d+)?)\s*(?:(ms|milliseconds?|s|secs?|seconds?|m|mins?|minutes?)\b)?",
    )
    .ok()
});

/// Extract a retry hint (in whole seconds, rounded up) from provider text.
pub fn parse_retry_after(message: &str) -> Option<u64> {
    let re = RETRY_AFTER_RE.as_ref()?;
    let caps = re.captures(message)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();
    let secs = if unit.starts_with("ms") || unit.starts_with("milli") {
        value / 1000.0
    } else if unit.starts_with('m') {
        value * 60.0
    } else {
        value
    };
    Some(secs.ceil().max(1.0) as u64)
}

/// Standard actionable advice per error kind.
pub fn default_suggestions(kind: ErrorKind) -> Vec<String> {
    let items: &[&str] = match kind {
        ErrorKind::RateLimit => &[
            "Wait for the retryAfter interval before sending another request",
            "Reduce request frequency or switch to a model with a higher quota",
        ],
        ErrorKind::Authentication => &[
            "Check that the API key is set and valid",
            "Set FERRULE_API_KEY or configure api_key in config.toml",
        ],
        ErrorKind::PermissionDenied => &["Verify the API key has access to the requested model"],
        ErrorKind::InvalidRequest | ErrorKind::Unprocessable => {
            &["Check the model name and request parameters"]
        }
        ErrorKind::ContextWindowExceeded => &[
            "Shorten the message or start a new conversation",
            "Lower max_conversation_chars so history is pruned earlier",
        ],
        ErrorKind::ContentPolicy => &["Rephrase the request to comply with the provider's content policy"],
        ErrorKind::Timeout => &["Try again, or raise request_timeout_secs"],
        ErrorKind::Connection => &["Check network connectivity and the provider api_url"],
        ErrorKind::InternalServer | ErrorKind::ServiceUnavailable => {
            &["The provider is having problems; try again shortly"]
        }
        ErrorKind::NotFound => &["Check that the configured model exists for this provider"],
        ErrorKind::EmptyResponse | ErrorKind::InvalidResponse => {
            &["Try again; if it persists, try a different model"]
        }
        ErrorKind::Configuration => &["Run `ferrule config` to inspect the effective configuration"],
        _ => &["Try again; if the problem persists, run with --verbose for details"],
    };
    items.iter().map(|s| s.to_string()).collect()
}
