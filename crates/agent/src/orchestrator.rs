//! The orchestration loop.
//!
//! One run drives `REQUEST(with tools) -> EXECUTE_TOOLS -> REQUEST(with tools)`
//! until the model answers without tool calls, the iteration budget is
//! spent, or the conversation outgrows its size bound. The last two end on
//! the finalize path: one instruction to stop using tools and one
//! tools-disabled request.

use std::sync::Arc;
use std::time::Duration;

use ferrule_config::AppConfig;
use ferrule_core::envelope::{EnvelopeBuilder, ModelInfo, ResponseEnvelope};
use ferrule_core::message::{Conversation, Message, Role};
use ferrule_core::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
use ferrule_core::tool::ToolRegistry;
use ferrule_providers::{RetryFailure, RetryPolicy};
use ferrule_tools::ToolExecutor;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::prune_conversation;

/// Appended as a user message before the tools-disabled final request.
pub const FINALIZE_INSTRUCTION: &str = "You have reached the tool-use limit for this request. \
    Do not call any more tools. Using only the information gathered so far, \
    give your final answer to the original question now.";

/// Knobs for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Tools-enabled requests allowed per run
    pub max_iterations: u32,
    pub max_conversation_chars: usize,
    pub keep_recent_messages: usize,
    pub tool_timeout: Duration,
    pub max_tool_output_chars: usize,
    /// Prepended when the history does not start with a system message
    pub system_prompt: Option<String>,
}

impl OrchestratorConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let settings = &config.orchestrator;
        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());
        Self {
            model,
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
            max_iterations: settings.max_iterations,
            max_conversation_chars: settings.max_conversation_chars,
            keep_recent_messages: settings.keep_recent_messages,
            tool_timeout: Duration::from_secs(settings.tool_timeout_secs),
            max_tool_output_chars: settings.max_tool_output_chars,
            system_prompt: settings.system_prompt.clone(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// Why the finalize path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    MaxIterations,
    ConversationSize,
}

/// Success data of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub answer: String,
    pub tools_used: bool,
    /// Tool calls executed across all rounds
    pub tool_calls: usize,
    /// Tools-enabled requests issued
    pub iterations: u32,
    pub finalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalize_reason: Option<FinalizeReason>,
    pub pruned: bool,
    /// Messages produced in this turn, ready for a history store
    pub transcript: Vec<Message>,
}

/// Progress of a single run, threaded through the loop.
struct RunState {
    conversation: Conversation,
    transcript: Vec<Message>,
    usage: Option<Usage>,
    responded_model: Option<String>,
    iterations: u32,
    tool_calls: usize,
    pruned: bool,
}

impl RunState {
    fn record(&mut self, response: &ProviderResponse) {
        if let Some(u) = &response.usage {
            self.usage.get_or_insert_with(Usage::default).add(u);
        }
        self.responded_model = Some(response.model.clone());
    }

    fn model_info(&self, provider: &str, model: &str) -> ModelInfo {
        ModelInfo {
            provider: provider.to_string(),
            model: model.to_string(),
            responded_model: self.responded_model.clone(),
            usage: self.usage,
        }
    }

    fn push(&mut self, message: Message) {
        self.transcript.push(message.clone());
        self.conversation.push(message);
    }

    fn outcome(self, answer: String, finalize_reason: Option<FinalizeReason>) -> TurnOutcome {
        TurnOutcome {
            answer,
            tools_used: self.tool_calls > 0,
            tool_calls: self.tool_calls,
            iterations: self.iterations,
            finalized: finalize_reason.is_some(),
            finalize_reason,
            pruned: self.pruned,
            transcript: self.transcript,
        }
    }
}

/// Drives provider requests and tool execution for one turn at a time.
///
/// Holds no per-run state, so one instance can serve concurrent runs.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    executor: ToolExecutor,
    retry: RetryPolicy,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        retry: RetryPolicy,
        config: OrchestratorConfig,
    ) -> Self {
        let executor = ToolExecutor::new(registry)
            .with_timeout(config.tool_timeout)
            .with_max_output_chars(config.max_tool_output_chars);
        Self {
            provider,
            executor,
            retry,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    /// Alias of [`Orchestrator::run`].
    pub async fn process_turn(
        &self,
        user_message: impl Into<String>,
        prior_history: Vec<Message>,
    ) -> ResponseEnvelope<TurnOutcome> {
        self.run(user_message, prior_history).await
    }

    /// Run one turn. Always resolves to exactly one envelope.
    pub async fn run(
        &self,
        user_message: impl Into<String>,
        prior_history: Vec<Message>,
    ) -> ResponseEnvelope<TurnOutcome> {
        let builder = EnvelopeBuilder::start();
        let mut state = RunState {
            conversation: Conversation::with_history(prior_history),
            transcript: Vec::new(),
            usage: None,
            responded_model: None,
            iterations: 0,
            tool_calls: 0,
            pruned: false,
        };

        info!(
            conversation_id = %state.conversation.id,
            provider = self.provider.name(),
            model = %self.config.model,
            history = state.conversation.len(),
            "Starting orchestration run"
        );

        if let Some(prompt) = &self.config.system_prompt
            && state.conversation.messages.first().is_none_or(|m| m.role != Role::System)
        {
            state.conversation.messages.insert(0, Message::system(prompt));
        }
        state.push(Message::user(user_message));

        // Oversized history is pruned up front; only growth during the run
        // forces the finalize path.
        if self.prune(&mut state) {
            debug!("Prior history pruned before the first request");
        }

        let tools = self.executor.registry().definitions();
        let finalize_reason = loop {
            state.iterations += 1;
            debug!(iteration = state.iterations, max = self.config.max_iterations, "Orchestration iteration");

            let response = match self.request(&state, tools.clone()).await {
                Ok(response) => response,
                Err(failure) => return self.failure_envelope(&builder, state, failure),
            };
            state.record(&response);

            if !response.has_tool_calls() {
                let answer = response.message.content.clone();
                state.push(response.message);
                return self.success_envelope(&builder, state, answer, None);
            }

            let calls = response.message.tool_calls.clone();
            state.push(response.message);
            for call in &calls {
                let result = self.executor.execute(call).await;
                debug!(tool = %result.tool_name, succeeded = result.succeeded, "Tool call finished");
                state.tool_calls += 1;
                state.push(Message::tool_result(result.tool_call_id, result.content));
            }

            let over_bound = self.prune(&mut state);
            if state.iterations >= self.config.max_iterations {
                warn!(iterations = state.iterations, "Iteration budget spent, finalizing");
                break FinalizeReason::MaxIterations;
            }
            if over_bound {
                warn!(iterations = state.iterations, "Conversation size bound hit, finalizing");
                break FinalizeReason::ConversationSize;
            }
        };

        self.finalize(&builder, state, finalize_reason).await
    }

    async fn finalize(
        &self,
        builder: &EnvelopeBuilder,
        mut state: RunState,
        reason: FinalizeReason,
    ) -> ResponseEnvelope<TurnOutcome> {
        // Control message: sent to the provider, kept out of the transcript.
        state.conversation.push(Message::user(FINALIZE_INSTRUCTION));

        let response = match self.request(&state, Vec::new()).await {
            Ok(response) => response,
            Err(failure) => return self.failure_envelope(builder, state, failure),
        };
        state.record(&response);

        let ignored_calls = response.message.tool_calls.len();
        let answer = response.message.content.clone();
        let mut final_message = response.message;
        final_message.tool_calls.clear();
        state.push(final_message);

        if ignored_calls > 0 {
            warn!(ignored_calls, "Finalization response still requested tools");
            let model_info = state.model_info(self.provider.name(), &self.config.model);
            let outcome = state.outcome(answer, Some(reason));
            return builder
                .partial(
                    outcome,
                    format!(
                        "The final response still requested {ignored_calls} tool call(s); they were ignored"
                    ),
                )
                .with_model_info(model_info);
        }
        self.success_envelope(builder, state, answer, Some(reason))
    }

    /// One provider request, wrapped by the retry policy.
    async fn request(
        &self,
        state: &RunState,
        tools: Vec<ToolDefinition>,
    ) -> Result<ProviderResponse, RetryFailure> {
        let request = ProviderRequest {
            model: self.config.model.clone(),
            messages: state.conversation.messages.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            tools,
        };
        let label = if request.tools_enabled() {
            "completion"
        } else {
            "final completion"
        };
        self.retry
            .execute(label, || self.provider.complete(request.clone()))
            .await
    }

    /// Prune if over the size bound. True when the bound was hit, even if
    /// only the current round remained and nothing could be dropped.
    fn prune(&self, state: &mut RunState) -> bool {
        let Some(report) = prune_conversation(
            &mut state.conversation.messages,
            self.config.max_conversation_chars,
            self.config.keep_recent_messages,
        ) else {
            return false;
        };
        if report.dropped() > 0 {
            state.pruned = true;
        }
        true
    }

    fn success_envelope(
        &self,
        builder: &EnvelopeBuilder,
        state: RunState,
        answer: String,
        finalize_reason: Option<FinalizeReason>,
    ) -> ResponseEnvelope<TurnOutcome> {
        let model_info = state.model_info(self.provider.name(), &self.config.model);
        let outcome = state.outcome(answer, finalize_reason);
        info!(
            iterations = outcome.iterations,
            tool_calls = outcome.tool_calls,
            finalized = outcome.finalized,
            pruned = outcome.pruned,
            "Orchestration run succeeded"
        );
        builder.success(outcome, None, Some(model_info), None)
    }

    fn failure_envelope(
        &self,
        builder: &EnvelopeBuilder,
        state: RunState,
        failure: RetryFailure,
    ) -> ResponseEnvelope<TurnOutcome> {
        warn!(
            kind = %failure.classification.kind,
            attempts = failure.attempts,
            iterations = state.iterations,
            error = %failure.error,
            "Orchestration run failed"
        );
        let details = serde_json::json!({
            "attempts": failure.attempts,
            "iteration": state.iterations,
            "toolCalls": state.tool_calls,
        });
        let model_info = state.model_info(self.provider.name(), &self.config.model);
        builder
            .from_provider_error(&failure.classification, &failure.error, Some(details))
            .with_model_info(model_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ScriptedProvider, text_response, tool_call, tool_call_response};
    use async_trait::async_trait;
    use ferrule_core::classify::ErrorKind;
    use ferrule_core::envelope::ResponseStatus;
    use ferrule_core::error::{ProviderError, ToolError};
    use ferrule_core::tool::{PropertySchema, Tool, ToolArgs, ToolCapability, ToolOutput, ToolSchema};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo text back"
        }
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("echo").required("text", PropertySchema::string("Text"))
        }
        fn capability(&self) -> ToolCapability {
            ToolCapability::Compute
        }
        async fn execute(&self, args: ToolArgs, _cancel: CancellationToken) -> Result<ToolOutput, ToolError> {
            Ok(ToolOutput::ok(args["text"].as_str().unwrap_or_default()))
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        Arc::new(registry)
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            model: "test-model".into(),
            system_prompt: None,
            ..OrchestratorConfig::default()
        }
    }

    fn orchestrator(provider: Arc<ScriptedProvider>, config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(provider, registry(), RetryPolicy::no_retries(), config)
    }

    fn echo(id: &str, text: &str) -> ferrule_core::message::MessageToolCall {
        tool_call(id, "echo", json!({ "text": text }))
    }

    #[tokio::test]
    async fn direct_answer_is_success() {
        let provider = Arc::new(ScriptedProvider::new([Ok(text_response("Hello!"))]));
        let envelope = orchestrator(provider.clone(), config()).run("Hi", vec![]).await;

        assert_eq!(envelope.status, ResponseStatus::Success);
        let outcome = envelope.data.as_ref().unwrap();
        assert_eq!(outcome.answer, "Hello!");
        assert_eq!(outcome.iterations, 1);
        assert!(!outcome.tools_used);
        assert!(!outcome.finalized);
        assert_eq!(outcome.transcript.len(), 2);
        assert_eq!(outcome.transcript[0].role, Role::User);

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools_enabled());

        let info = envelope.model_info.unwrap();
        assert_eq!(info.provider, "scripted");
        assert_eq!(info.model, "test-model");
        assert_eq!(info.responded_model.as_deref(), Some("scripted-model"));
        assert_eq!(info.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn tool_results_are_fed_back() {
        let provider = Arc::new(ScriptedProvider::new([
            Ok(tool_call_response(vec![echo("c1", "a.txt\nb.txt")])),
            Ok(text_response("Two files.")),
        ]));
        let envelope = orchestrator(provider.clone(), config()).run("List", vec![]).await;

        assert!(envelope.is_success());
        let outcome = envelope.data.unwrap();
        assert_eq!(outcome.tool_calls, 1);
        assert!(outcome.tools_used);
        assert_eq!(outcome.iterations, 2);

        let second = &provider.requests()[1];
        let result = second.messages.last().unwrap();
        assert_eq!(result.role, Role::Tool);
        assert_eq!(result.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(result.content, "a.txt\nb.txt");
        assert_eq!(envelope.model_info.unwrap().usage.unwrap().total_tokens, 30);
    }

    #[tokio::test]
    async fn failing_tool_does_not_abort_batch() {
        let provider = Arc::new(ScriptedProvider::new([
            Ok(tool_call_response(vec![
                tool_call("c1", "missing_tool", json!({})),
                echo("c2", "still ran"),
            ])),
            Ok(text_response("ok")),
        ]));
        let envelope = orchestrator(provider.clone(), config()).run("go", vec![]).await;
        assert!(envelope.is_success());

        let messages = &provider.requests()[1].messages;
        let results: Vec<_> = messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].content.starts_with("Error [TOOL_NOT_FOUND]"));
        assert_eq!(results[1].content, "still ran");
    }

    #[tokio::test]
    async fn iteration_budget_forces_finalize() {
        let mut script: Vec<_> = (0..3)
            .map(|i| Ok(tool_call_response(vec![echo(&format!("c{i}"), "again")])))
            .collect();
        script.push(Ok(text_response("Final answer.")));
        let provider = Arc::new(ScriptedProvider::new(script));
        let config = OrchestratorConfig {
            max_iterations: 3,
            ..config()
        };

        let envelope = orchestrator(provider.clone(), config).run("loop", vec![]).await;

        assert_eq!(envelope.status, ResponseStatus::Success);
        let outcome = envelope.data.unwrap();
        assert_eq!(outcome.answer, "Final answer.");
        assert!(outcome.finalized);
        assert_eq!(outcome.finalize_reason, Some(FinalizeReason::MaxIterations));
        assert_eq!(outcome.iterations, 3);
        assert!(outcome.transcript.iter().all(|m| m.content != FINALIZE_INSTRUCTION));

        let requests = provider.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[..3].iter().all(ProviderRequest::tools_enabled));
        assert!(!requests[3].tools_enabled());
        let instruction = requests[3].messages.last().unwrap();
        assert_eq!(instruction.role, Role::User);
        assert_eq!(instruction.content, FINALIZE_INSTRUCTION);
    }

    #[tokio::test]
    async fn tool_calls_in_final_response_make_partial() {
        let provider = Arc::new(ScriptedProvider::new([
            Ok(tool_call_response(vec![echo("c1", "x")])),
            Ok(ProviderResponse {
                message: Message::assistant_with_tool_calls("best effort", vec![echo("c2", "y")]),
                usage: None,
                model: "scripted-model".into(),
            }),
        ]));
        let config = OrchestratorConfig {
            max_iterations: 1,
            ..config()
        };

        let envelope = orchestrator(provider, config).run("q", vec![]).await;

        assert_eq!(envelope.status, ResponseStatus::Partial);
        let outcome = envelope.data.unwrap();
        assert_eq!(outcome.answer, "best effort");
        assert_eq!(outcome.tool_calls, 1);
        assert!(outcome.transcript.last().unwrap().tool_calls.is_empty());
        assert!(envelope.model_info.is_some());
    }

    #[tokio::test]
    async fn size_bound_prunes_and_finalizes() {
        let big = "z".repeat(2_000);
        let provider = Arc::new(ScriptedProvider::new([
            Ok(tool_call_response(vec![echo("c1", &big)])),
            Ok(text_response("Summarized.")),
        ]));
        let config = OrchestratorConfig {
            max_conversation_chars: 1_000,
            max_tool_output_chars: 10_000,
            ..config()
        };

        let history = vec![Message::user("earlier"), Message::assistant("noted")];
        let envelope = orchestrator(provider.clone(), config).run("read it", history).await;

        let outcome = envelope.data.unwrap();
        assert!(outcome.pruned);
        assert_eq!(outcome.finalize_reason, Some(FinalizeReason::ConversationSize));
        assert_eq!(outcome.iterations, 1);
        // the transcript keeps everything the turn produced
        assert!(outcome.transcript.iter().any(|m| m.content == big));

        let last = provider.requests().pop().unwrap();
        assert!(!last.tools_enabled());
        assert!(last.messages.iter().any(|m| m.content == "read it"));
        assert!(last.messages.iter().all(|m| m.content != "earlier"));
    }

    #[tokio::test]
    async fn oversized_question_is_still_sent() {
        let question = "q".repeat(5_000);
        let provider = Arc::new(ScriptedProvider::new([Ok(text_response("Answered."))]));
        let config = OrchestratorConfig {
            max_conversation_chars: 1_000,
            ..config()
        };
        let history: Vec<Message> = (0..4)
            .flat_map(|i| {
                [
                    Message::user(format!("question {i}")),
                    Message::assistant("a".repeat(300)),
                ]
            })
            .collect();

        let envelope = orchestrator(provider.clone(), config).run(&question, history).await;

        assert_eq!(envelope.status, ResponseStatus::Success);
        let outcome = envelope.data.unwrap();
        assert_eq!(outcome.answer, "Answered.");
        assert!(outcome.pruned);
        assert!(!outcome.finalized);

        let first = &provider.requests()[0];
        assert_eq!(first.messages.len(), 1);
        assert_eq!(first.messages[0].role, Role::User);
        assert_eq!(first.messages[0].content, question);
    }

    #[tokio::test]
    async fn provider_failure_is_error_envelope() {
        let provider = Arc::new(ScriptedProvider::new([Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let envelope = orchestrator(provider.clone(), config()).run("hi", vec![]).await;

        assert!(envelope.is_error());
        let error = envelope.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Authentication);
        assert_eq!(error.code, "AUTHENTICATION_FAILED");
        assert!(!error.retryable);
        assert_eq!(error.details.unwrap()["attempts"], 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn system_prompt_prepended_once() {
        let provider = Arc::new(ScriptedProvider::new([
            Ok(text_response("one")),
            Ok(text_response("two")),
        ]));
        let config = OrchestratorConfig {
            system_prompt: Some("Be brief.".into()),
            ..config()
        };
        let orchestrator = orchestrator(provider.clone(), config);

        orchestrator.run("first", vec![]).await;
        let history = vec![Message::system("Existing."), Message::user("earlier")];
        orchestrator.process_turn("second", history).await;

        let requests = provider.requests();
        assert_eq!(requests[0].messages[0].content, "Be brief.");
        assert_eq!(requests[1].messages[0].content, "Existing.");
        assert_eq!(
            requests[1]
                .messages
                .iter()
                .filter(|m| m.role == Role::System)
                .count(),
            1
        );
    }

    #[test]
    fn config_follows_app_config() {
        let mut app = AppConfig::default();
        app.orchestrator.max_iterations = 7;
        app.orchestrator.tool_timeout_secs = 12;
        let config = OrchestratorConfig::from_app_config(&app);
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.tool_timeout, Duration::from_secs(12));
        assert_eq!(config.model, app.default_model);
        assert_eq!(config.keep_recent_messages, 10);
    }
}
