//! A provider that replays a fixed script of responses.
//!
//! Used by tests and dry runs to drive the orchestrator without a network
//! provider. Every request is recorded so callers can inspect what was sent.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use ferrule_core::error::ProviderError;
use ferrule_core::message::{Message, MessageToolCall};
use ferrule_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};

type Step = Result<ProviderResponse, ProviderError>;

pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            name: "scripted".into(),
            script: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderError::NotConfigured(
                    "scripted provider has no responses left".into(),
                ))
            })
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A plain text answer.
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "scripted-model".into(),
    }
}

/// A response that requests the given tool calls.
pub fn tool_call_response(calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tool_calls("", calls),
        usage: usage(),
        model: "scripted-model".into(),
    }
}

/// A tool call with JSON-encoded arguments.
pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall::new(id, name, args.to_string())
}
