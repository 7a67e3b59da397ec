//! Tool executor: parse, validate, sandbox-check and run one tool call.
//!
//! The executor never fails: every problem along the pipeline is folded into
//! a [`ToolExecutionResult`] with `succeeded = false` and readable content,
//! which the orchestrator feeds back to the model as the tool result.

use std::sync::Arc;
use std::time::Duration;

use ferrule_core::error::ToolError;
use ferrule_core::message::MessageToolCall;
use ferrule_core::tool::{ToolExecutionResult, ToolOutput, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::args::parse_arguments;
use crate::validate::validate_args;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 4_000;
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    max_output_chars: usize,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_chars(mut self, max_output_chars: usize) -> Self {
        self.max_output_chars = max_output_chars;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool call through the full pipeline.
    pub async fn execute(&self, call: &MessageToolCall) -> ToolExecutionResult {
        debug!(tool = %call.name, call_id = %call.id, "Executing tool call");

        match self.run(call).await {
            Ok(output) => {
                if !output.success {
                    debug!(tool = %call.name, "Tool reported failure");
                }
                ToolExecutionResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: truncate_output(output.content, self.max_output_chars),
                    succeeded: output.success,
                }
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, code = e.kind().code(), error = %e, "Tool call failed");
                ToolExecutionResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: format!("Error [{}]: {e}", e.kind().code()),
                    succeeded: false,
                }
            }
        }
    }

    async fn run(&self, call: &MessageToolCall) -> Result<ToolOutput, ToolError> {
        let tool = self
            .registry
            .resolve(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let parsed = parse_arguments(&call.arguments)?;
        let args = validate_args(&tool.schema(), &parsed).into_result()?;
        tool.validate(&args)?;

        let timeout = tool
            .timeout_hint(&args)
            .map_or(self.timeout, |hint| hint.min(self.timeout));
        let cancel = CancellationToken::new();
        let mut handle = tokio::spawn({
            let tool = tool.clone();
            let cancel = cancel.clone();
            async move { tool.execute(args, cancel).await }
        });

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: if join_error.is_panic() {
                    "tool panicked".into()
                } else {
                    "tool task was cancelled".into()
                },
            }),
            Err(_) => {
                cancel.cancel();
                handle.abort();
                Err(ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }
}

/// Cut `content` to `max_chars` characters and mark the cut.
pub fn truncate_output(content: String, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content,
        Some((byte_idx, _)) => {
            let mut cut = content;
            cut.truncate(byte_idx);
            cut.push_str(TRUNCATION_MARKER);
            cut
        }
    }
}
