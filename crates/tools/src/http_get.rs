//! HTTP GET/HEAD tool for public URLs.
//!
//! The URL is checked by the security policy before the request, and every
//! redirect hop is checked again so a public URL cannot bounce the request
//! onto an internal host.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferrule_core::error::ToolError;
use ferrule_core::tool::{PropertySchema, Tool, ToolArgs, ToolCapability, ToolOutput, ToolSchema};
use ferrule_security::SecurityPolicy;
use reqwest::redirect;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::str_arg;

pub const MAX_REDIRECTS: usize = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpGetTool {
    policy: Arc<SecurityPolicy>,
}

impl HttpGetTool {
    pub fn new(policy: Arc<SecurityPolicy>) -> Self {
        Self { policy }
    }

    fn client(&self) -> Result<reqwest::Client, ToolError> {
        reqwest::Client::builder()
            .redirect(redirect_policy(self.policy.clone()))
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("ferrule/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| failed(format!("cannot build HTTP client: {e}")))
    }
}

fn failed(reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "http_get".into(),
        reason: reason.into(),
    }
}

/// Follow at most [`MAX_REDIRECTS`] hops, each of which must pass the policy.
fn redirect_policy(policy: Arc<SecurityPolicy>) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {MAX_REDIRECTS} redirects"));
        }
        match policy.check_url(attempt.url().as_str()) {
            Ok(_) => attempt.follow(),
            Err(e) => attempt.error(e),
        }
    })
}

#[async_trait]
impl Tool for HttpGetTool {
    fn name(&self) -> &str {
        "http_get"
    }

    fn description(&self) -> &str {
        "Fetch a public http(s) URL. GET returns the status line and body; \
         HEAD returns the status line and headers."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new("http_get")
            .required("url", PropertySchema::string("The URL to fetch"))
            .optional(
                "method",
                PropertySchema::string("HTTP method")
                    .with_enum(["GET", "HEAD"])
                    .with_default("GET"),
            )
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::Network
    }

    fn validate(&self, args: &ToolArgs) -> Result<(), ToolError> {
        self.policy.check_url(str_arg(args, "url")?)?;
        Ok(())
    }

    async fn execute(&self, args: ToolArgs, cancel: CancellationToken) -> Result<ToolOutput, ToolError> {
        let url = self.policy.check_url(str_arg(&args, "url")?)?;
        let head = args.get("method").and_then(|v| v.as_str()) == Some("HEAD");
        let client = self.client()?;
        fetch(&client, url.as_str(), head, &cancel).await
    }
}

async fn fetch(
    client: &reqwest::Client,
    url: &str,
    head: bool,
    cancel: &CancellationToken,
) -> Result<ToolOutput, ToolError> {
    let request = if head { client.head(url) } else { client.get(url) };
    debug!(url = %url, head, "Sending tool HTTP request");

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(failed("request cancelled")),
        result = request.send() => result.map_err(|e| failed(describe_transport_error(&e)))?,
    };

    let status = response.status();
    let mut content = format!("HTTP {}", status.as_u16());
    if let Some(reason) = status.canonical_reason() {
        content.push(' ');
        content.push_str(reason);
    }

    if head {
        for (name, value) in response.headers() {
            content.push_str(&format!("\n{name}: {}", value.to_str().unwrap_or("<binary>")));
        }
    } else {
        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(failed("request cancelled")),
            body = response.text() => body.map_err(|e| failed(format!("cannot read body: {e}")))?,
        };
        if !body.is_empty() {
            content.push('\n');
            content.push_str(&body);
        }
    }

    if status.is_success() {
        Ok(ToolOutput::ok(content))
    } else {
        Ok(ToolOutput::failed(content))
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_redirect() {
        format!("redirect blocked: {e}")
    } else if e.is_timeout() {
        format!("request timed out: {e}")
    } else {
        format!("request failed: {e}")
    }
}
