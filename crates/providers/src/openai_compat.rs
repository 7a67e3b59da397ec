//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, Fireworks AI,
//! and any endpoint exposing `/chat/completions`.
//!
//! Non-success responses are mapped onto [`ProviderError`] variants by HTTP
//! status so the classifier can pick a retry strategy.

use std::time::Duration;

use async_trait::async_trait;
use ferrule_core::classify::{ErrorKind, classify_message};
use ferrule_core::envelope::parse_retry_after;
use ferrule_core::error::ProviderError;
use ferrule_core::message::{Message, MessageToolCall, Role};
use ferrule_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider. `timeout` bounds each HTTP request.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::NotConfigured(format!("Failed to create HTTP client for {name}: {e}"))
            })?;

        Ok(Self {
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "openrouter",
            "https://openrouter.ai/api/v1",
            api_key,
            Duration::from_secs(120),
        )
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            Duration::from_secs(120),
        )
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            Duration::from_secs(120),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if request.tools_enabled() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

/// Map a non-success HTTP response onto a provider error.
///
/// `retry_after_header` is the raw `Retry-After` header value, if any.
pub fn map_error_status(
    status: u16,
    body: &str,
    retry_after_header: Option<&str>,
) -> ProviderError {
    let message = extract_error_message(body);
    match status {
        400 => match classify_message(&message) {
            Some(ErrorKind::ContextWindowExceeded) => ProviderError::ContextWindowExceeded(message),
            Some(ErrorKind::ContentPolicy) => ProviderError::ContentPolicy(message),
            _ => ProviderError::InvalidRequest(message),
        },
        401 => ProviderError::AuthenticationFailed(message),
        403 => ProviderError::PermissionDenied(message),
        404 => ProviderError::ModelNotFound(message),
        408 => ProviderError::Timeout(message),
        422 => ProviderError::Unprocessable(message),
        429 => ProviderError::RateLimited {
            retry_after_secs: retry_after_header
                .and_then(|h| h.trim().parse::<f64>().ok())
                .map(|secs| secs.ceil().max(1.0) as u64)
                .or_else(|| parse_retry_after(&message)),
            message,
        },
        500 => ProviderError::ServerError(message),
        502..=504 => ProviderError::ServiceUnavailable(message),
        _ => ProviderError::ApiError {
            status_code: status,
            message,
        },
    }
}

/// Pull `error.message` out of a JSON error body, or fall back to the raw text.
fn extract_error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .or_else(|| v.get("error"))
            .and_then(|m| m.as_str())
            .map(String::from)
    });
    match from_json {
        Some(m) => m,
        None if body.trim().is_empty() => "no response body".into(),
        None => body.trim().to_string(),
    }
}

fn map_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(error.to_string())
    } else {
        ProviderError::Network(error.to_string())
    }
}

#[async_trait]
impl ferrule_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();

        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(map_error_status(status, &error_body, retry_after.as_deref()));
        }

        let api_response: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {e}"))
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls: Vec<MessageToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| MessageToolCall::new(tc.id, tc.function.name, tc.function.arguments))
            .collect();

        let message = Message::assistant_with_tool_calls(
            choice.message.content.unwrap_or_default(),
            tool_calls,
        );

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model.unwrap_or(request.model),
        })
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_core::Provider;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAiCompatProvider {
        OpenAiCompatProvider::new("test", server.uri(), "sk-test", Duration::from_secs(5)).unwrap()
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("Hello")],
            temperature: 0.7,
            max_tokens: None,
            tools: vec![],
        }
    }

    async fn error_for(status: u16, body: &str) -> ProviderError {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        provider_for(&server).complete(request()).await.unwrap_err()
    }

    #[test]
    fn openrouter_constructor() {
        let provider = OpenAiCompatProvider::openrouter("sk-test").unwrap();
        assert_eq!(provider.name(), "openrouter");
        assert!(provider.base_url().contains("openrouter.ai"));
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url().contains("localhost:11434"));
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![MessageToolCall::new("call_1", "shell", r#"{"command":"ls"}"#)],
        );
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg, Message::tool_result("call_1", "a.txt")]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "shell");
        assert_eq!(api_msgs[1].role, "tool");
        assert_eq!(api_msgs[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn tools_omitted_when_disabled() {
        let body = OpenAiCompatProvider::request_body(&request());
        assert!(body.get("tools").is_none());

        let mut with_tools = request();
        with_tools.tools.push(ToolDefinition {
            name: "shell".into(),
            description: "Run a command".into(),
            parameters: serde_json::json!({"type": "object"}),
        });
        let body = OpenAiCompatProvider::request_body(&with_tools);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "shell");
    }

    #[tokio::test]
    async fn successful_completion_parses_tool_calls_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "gpt-4o-2024-08-06",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_abc",
                            "type": "function",
                            "function": {"name": "shell", "arguments": "{\"command\":\"ls\"}"}
                        }]
                    }
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider_for(&server).complete(request()).await.unwrap();
        assert_eq!(response.model, "gpt-4o-2024-08-06");
        assert!(response.has_tool_calls());
        assert_eq!(response.message.tool_calls[0].id, "call_abc");
        assert_eq!(response.message.tool_calls[0].arguments, r#"{"command":"ls"}"#);
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[tokio::test]
    async fn rate_limit_reads_retry_after_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "7")
                    .set_body_string(r#"{"error":{"message":"Rate limit reached"}}"#),
            )
            .mount(&server)
            .await;

        match provider_for(&server).complete(request()).await.unwrap_err() {
            ProviderError::RateLimited {
                retry_after_secs,
                message,
            } => {
                assert_eq!(retry_after_secs, Some(7));
                assert_eq!(message, "Rate limit reached");
            }
            other => panic!("Expected RateLimited, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rate_limit_falls_back_to_body_hint() {
        let err = error_for(429, "Too many requests, please try again in 20s").await;
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_secs: Some(20),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn status_codes_map_to_variants() {
        assert!(matches!(error_for(401, "bad key").await, ProviderError::AuthenticationFailed(_)));
        assert!(matches!(error_for(403, "forbidden").await, ProviderError::PermissionDenied(_)));
        assert!(matches!(error_for(404, "no such model").await, ProviderError::ModelNotFound(_)));
        assert!(matches!(error_for(408, "slow").await, ProviderError::Timeout(_)));
        assert!(matches!(error_for(422, "bad schema").await, ProviderError::Unprocessable(_)));
        assert!(matches!(error_for(500, "boom").await, ProviderError::ServerError(_)));
        assert!(matches!(error_for(502, "bad gateway").await, ProviderError::ServiceUnavailable(_)));
        assert!(matches!(error_for(503, "overloaded").await, ProviderError::ServiceUnavailable(_)));
        assert!(matches!(error_for(504, "gateway timeout").await, ProviderError::ServiceUnavailable(_)));
    }

    #[test]
    fn bad_request_refined_by_body() {
        assert!(matches!(
            map_error_status(400, r#"{"error":{"message":"This model's maximum context length is 8192 tokens"}}"#, None),
            ProviderError::ContextWindowExceeded(_)
        ));
        assert!(matches!(
            map_error_status(400, "missing field messages", None),
            ProviderError::InvalidRequest(_)
        ));
    }

    #[test]
    fn unknown_status_stays_generic() {
        assert!(matches!(
            map_error_status(418, "teapot", None),
            ProviderError::ApiError { status_code: 418, .. }
        ));
    }

    #[tokio::test]
    async fn empty_choices_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"model": "gpt-4o", "choices": []})),
            )
            .mount(&server)
            .await;
        let err = provider_for(&server).complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let provider = OpenAiCompatProvider::new(
            "dead",
            "http://127.0.0.1:9",
            "sk",
            Duration::from_secs(2),
        )
        .unwrap();
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_) | ProviderError::Timeout(_)));
    }
}
