//! Retry policy engine: classified, strategy-specific retries for provider calls.
//!
//! Each failure is classified into an [`ErrorKind`]; the kind's fixed
//! [`RetryStrategy`] decides whether and how long to wait before the next
//! attempt. Successful but empty results count as failures too.

use std::future::Future;
use std::time::Duration;

use ferrule_config::RetryConfig;
use ferrule_core::classify::{ErrorClassification, ErrorKind, RetryStrategy, classify};
use ferrule_core::error::ProviderError;
use ferrule_core::provider::ProviderResponse;
use tracing::{debug, warn};

/// Flat delay used by the immediate strategy.
pub const IMMEDIATE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Placeholder strings treated as "no answer".
const PLACEHOLDERS: &[&str] = &["null", "none", "empty response"];

/// Whether a result carries usable content.
pub trait Substantive {
    fn is_substantive(&self) -> bool;
}

/// True for blank text or a placeholder such as `"null"`.
pub fn is_placeholder(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.is_empty() || PLACEHOLDERS.iter().any(|p| trimmed.eq_ignore_ascii_case(p))
}

impl Substantive for ProviderResponse {
    fn is_substantive(&self) -> bool {
        self.has_tool_calls() || !is_placeholder(&self.message.content)
    }
}

impl Substantive for String {
    fn is_substantive(&self) -> bool {
        !is_placeholder(self)
    }
}

impl Substantive for &str {
    fn is_substantive(&self) -> bool {
        !is_placeholder(self)
    }
}

impl<T: Substantive> Substantive for Option<T> {
    fn is_substantive(&self) -> bool {
        self.as_ref().is_some_and(Substantive::is_substantive)
    }
}

impl<T> Substantive for Vec<T> {
    fn is_substantive(&self) -> bool {
        !self.is_empty()
    }
}

impl Substantive for serde_json::Value {
    fn is_substantive(&self) -> bool {
        match self {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !is_placeholder(s),
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(o) => !o.is_empty(),
            serde_json::Value::Bool(_) | serde_json::Value::Number(_) => true,
        }
    }
}

/// Progress of one logical request through its retry budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryState {
    /// Zero-based index of the attempt in flight
    pub attempt: u32,
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryState {
    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_retries
    }
}

/// The request failed for good.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct RetryFailure {
    pub classification: ErrorClassification,
    pub error: ProviderError,
    /// Total attempts made, including the first
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let base_delay =
            Duration::try_from_secs_f64(config.base_delay_secs).unwrap_or(Duration::from_secs(1));
        Self::new(config.max_retries, base_delay)
    }

    /// A policy that attempts each request exactly once.
    pub fn no_retries() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay before retrying after the zero-based `attempt` failed with `kind`.
    /// Zero for kinds that are never retried.
    pub fn compute_delay(&self, kind: ErrorKind, attempt: u32) -> Duration {
        self.delay_for(kind.retry_strategy(), attempt)
    }

    pub fn delay_for(&self, strategy: RetryStrategy, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let secs = match strategy {
            RetryStrategy::None => return Duration::ZERO,
            RetryStrategy::Immediate => return IMMEDIATE_RETRY_DELAY,
            RetryStrategy::Linear => base * f64::from(attempt.saturating_add(1)),
            RetryStrategy::Exponential => base * 2f64.powi(attempt.min(i32::MAX as u32) as i32),
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Run `op` until it yields a substantive result, the failure is not
    /// retryable, or the retry budget is spent.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryFailure>
    where
        T: Substantive,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut state = RetryState {
            attempt: 0,
            max_retries: self.max_retries,
            base_delay: self.base_delay,
        };

        loop {
            debug!(label, attempt = state.attempt + 1, "Attempting request");

            let error = match op().await {
                Ok(value) if value.is_substantive() => {
                    if state.attempt > 0 {
                        debug!(label, attempts = state.attempt + 1, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(_) => ProviderError::EmptyResponse(format!("{label} returned no usable content")),
                Err(e) => e,
            };

            let classification = classify(&error);
            if !classification.retryable() || !state.can_retry() {
                warn!(
                    label,
                    kind = %classification.kind,
                    attempts = state.attempt + 1,
                    error = %error,
                    "Request failed, not retrying"
                );
                return Err(RetryFailure {
                    classification,
                    error,
                    attempts: state.attempt + 1,
                });
            }

            let delay = self.delay_for(classification.retry_strategy, state.attempt);
            warn!(
                label,
                kind = %classification.kind,
                attempt = state.attempt + 1,
                max_retries = state.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
            state.attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
