//! End-to-end scenarios: scripted provider, real tool registry, real
//! security policy, full orchestration loop.

use std::sync::Arc;
use std::time::Duration;

use ferrule_agent::scripted::{text_response, tool_call, tool_call_response};
use ferrule_agent::{FINALIZE_INSTRUCTION, FinalizeReason, Orchestrator, OrchestratorConfig, ScriptedProvider};
use ferrule_core::envelope::ResponseStatus;
use ferrule_core::error::ProviderError;
use ferrule_core::message::Role;
use ferrule_providers::RetryPolicy;
use ferrule_security::SecurityPolicy;
use ferrule_tools::default_registry;
use serde_json::json;
use tokio::time::Instant;

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    workspace: tempfile::TempDir,
    provider: Arc<ScriptedProvider>,
    orchestrator: Orchestrator,
}

fn harness(provider: ScriptedProvider, config: OrchestratorConfig) -> Harness {
    let workspace = tempfile::tempdir().unwrap();
    std::fs::write(workspace.path().join("a.txt"), "alpha").unwrap();
    std::fs::write(workspace.path().join("b.txt"), "beta").unwrap();

    let policy = Arc::new(SecurityPolicy::default().with_workspace_dir(workspace.path()));
    let registry = Arc::new(default_registry(policy));
    let provider = Arc::new(provider);
    let orchestrator = Orchestrator::new(
        provider.clone(),
        registry,
        RetryPolicy::new(3, Duration::from_secs(1)),
        config,
    );

    Harness {
        workspace,
        provider,
        orchestrator,
    }
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        model: "e2e-model".into(),
        system_prompt: None,
        ..OrchestratorConfig::default()
    }
}

fn rate_limited() -> Result<ferrule_core::provider::ProviderResponse, ProviderError> {
    Err(ProviderError::RateLimited {
        retry_after_secs: Some(60),
        message: "429 Too Many Requests".into(),
    })
}

// ── Tool round trips ─────────────────────────────────────────────────────

#[tokio::test]
async fn shell_listing_is_fed_back_verbatim() {
    let h = harness(
        ScriptedProvider::new([
            Ok(tool_call_response(vec![tool_call("c1", "shell", json!({"command": "ls"}))])),
            Ok(text_response("There are two files: a.txt and b.txt.")),
        ]),
        config(),
    );

    let envelope = h.orchestrator.run("What files are here?", vec![]).await;

    assert_eq!(envelope.status, ResponseStatus::Success);
    let outcome = envelope.data.unwrap();
    assert_eq!(outcome.answer, "There are two files: a.txt and b.txt.");
    assert_eq!(outcome.tool_calls, 1);
    assert_eq!(outcome.iterations, 2);

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 2);
    let result = requests[1].messages.last().unwrap();
    assert_eq!(result.role, Role::Tool);
    assert_eq!(result.tool_call_id.as_deref(), Some("c1"));
    assert_eq!(result.content, "a.txt\nb.txt");
}

#[tokio::test]
async fn destructive_command_is_rejected_without_running() {
    let h = harness(
        ScriptedProvider::new([
            Ok(tool_call_response(vec![tool_call("c1", "shell", json!({"command": "rm -rf /"}))])),
            Ok(text_response("I cannot do that.")),
        ]),
        config(),
    );

    let envelope = h.orchestrator.run("Clean up everything", vec![]).await;
    assert!(envelope.is_success());

    let result = h.provider.requests()[1].messages.last().cloned().unwrap();
    assert_eq!(result.role, Role::Tool);
    assert!(
        result.content.starts_with("Error [COMMAND_NOT_ALLOWED]"),
        "{}",
        result.content
    );
    assert!(h.workspace.path().join("a.txt").exists());
    assert!(h.workspace.path().join("b.txt").exists());
}

#[tokio::test]
async fn write_then_read_inside_workspace() {
    let h = harness(
        ScriptedProvider::new([
            Ok(tool_call_response(vec![tool_call(
                "w1",
                "file_write",
                json!({"path": "notes/todo.md", "content": "- ship it"}),
            )])),
            Ok(tool_call_response(vec![tool_call(
                "r1",
                "file_read",
                json!({"path": "notes/todo.md"}),
            )])),
            Ok(text_response("Saved and verified.")),
        ]),
        config(),
    );

    let envelope = h.orchestrator.run("Write a todo note", vec![]).await;
    assert!(envelope.is_success());

    let requests = h.provider.requests();
    assert!(requests[1].messages.last().unwrap().content.starts_with("Wrote 9 bytes"));
    assert_eq!(requests[2].messages.last().unwrap().content, "- ship it");
    assert_eq!(
        std::fs::read_to_string(h.workspace.path().join("notes/todo.md")).unwrap(),
        "- ship it"
    );
}

#[tokio::test]
async fn mixed_batch_keeps_call_order() {
    let h = harness(
        ScriptedProvider::new([
            Ok(tool_call_response(vec![
                tool_call("c1", "calculator", json!({"expression": "6 * 7"})),
                tool_call("c2", "file_read", json!({"path": "/etc/passwd"})),
                tool_call("c3", "list_directory", json!({})),
            ])),
            Ok(text_response("Done.")),
        ]),
        config(),
    );

    let envelope = h.orchestrator.run("Do three things", vec![]).await;
    assert!(envelope.is_success());

    let messages = &h.provider.requests()[1].messages;
    let results: Vec<_> = messages.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(results[0].content, "42");
    assert!(results[1].content.starts_with("Error [PATH_NOT_ALLOWED]"), "{}", results[1].content);
    assert_eq!(results[2].content, "a.txt\nb.txt");
}

// ── Retry ────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rate_limits_are_retried_with_backoff() {
    let h = harness(
        ScriptedProvider::new([
            rate_limited(),
            rate_limited(),
            rate_limited(),
            Ok(text_response("Finally.")),
        ]),
        config(),
    );

    let started = Instant::now();
    let envelope = h.orchestrator.run("Hello", vec![]).await;
    let elapsed = started.elapsed();

    assert!(envelope.is_success());
    assert_eq!(envelope.data.unwrap().answer, "Finally.");
    assert_eq!(h.provider.call_count(), 4);
    assert!(elapsed >= Duration::from_secs(7), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(7500), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn exhausted_rate_limit_yields_error_envelope() {
    let h = harness(
        ScriptedProvider::new([rate_limited(), rate_limited(), rate_limited(), rate_limited()]),
        config(),
    );

    let envelope = h.orchestrator.run("Hello", vec![]).await;

    assert_eq!(envelope.status, ResponseStatus::Error);
    assert!(envelope.data.is_none());
    let error = envelope.error.unwrap();
    assert_eq!(error.code, "RATE_LIMIT_EXCEEDED");
    assert!(error.retryable);
    assert_eq!(error.retry_after, Some(60));
    assert_eq!(error.details.unwrap()["attempts"], 4);
    assert_eq!(h.provider.call_count(), 4);
}

// ── Iteration budget ─────────────────────────────────────────────────────

#[tokio::test]
async fn endless_tool_calls_are_finalized() {
    let mut script: Vec<_> = (0..5)
        .map(|i| {
            Ok(tool_call_response(vec![tool_call(
                &format!("c{i}"),
                "calculator",
                json!({"expression": format!("{i} + 1")}),
            )]))
        })
        .collect();
    script.push(Ok(text_response("The sums were 1 through 5.")));

    let h = harness(
        ScriptedProvider::new(script),
        OrchestratorConfig {
            max_iterations: 5,
            ..config()
        },
    );

    let envelope = h.orchestrator.run("Keep adding", vec![]).await;

    assert_eq!(envelope.status, ResponseStatus::Success);
    let outcome = envelope.data.unwrap();
    assert!(outcome.finalized);
    assert_eq!(outcome.finalize_reason, Some(FinalizeReason::MaxIterations));
    assert_eq!(outcome.tool_calls, 5);
    assert_eq!(outcome.answer, "The sums were 1 through 5.");

    let requests = h.provider.requests();
    assert_eq!(requests.len(), 6);
    assert_eq!(requests.iter().filter(|r| r.tools_enabled()).count(), 5);

    let last = requests.last().unwrap();
    assert!(!last.tools_enabled());
    let instruction = last.messages.last().unwrap();
    assert_eq!(instruction.role, Role::User);
    assert_eq!(instruction.content, FINALIZE_INSTRUCTION);
}

#[tokio::test]
async fn tools_enabled_requests_never_exceed_budget() {
    for budget in 1..=3 {
        let script: Vec<_> = (0..10)
            .map(|i| {
                Ok(tool_call_response(vec![tool_call(
                    &format!("c{i}"),
                    "calculator",
                    json!({"expression": "1"}),
                )]))
            })
            .collect();
        let h = harness(
            ScriptedProvider::new(script),
            OrchestratorConfig {
                max_iterations: budget,
                ..config()
            },
        );

        let envelope = h.orchestrator.run("again and again", vec![]).await;

        // The finalize response still asks for a tool, so the answer is partial.
        assert_eq!(envelope.status, ResponseStatus::Partial, "budget {budget}");
        let enabled = h
            .provider
            .requests()
            .iter()
            .filter(|r| r.tools_enabled())
            .count();
        assert_eq!(enabled, budget as usize);
        assert_eq!(h.provider.call_count(), budget as usize + 1);
    }
}

// ── Multi-turn ───────────────────────────────────────────────────────────

#[tokio::test]
async fn transcript_carries_into_next_turn() {
    let h = harness(
        ScriptedProvider::new([
            Ok(tool_call_response(vec![tool_call("c1", "calculator", json!({"expression": "2 ^ 10"}))])),
            Ok(text_response("1024")),
            Ok(text_response("Half of that is 512.")),
        ]),
        config(),
    );

    let first = h.orchestrator.run("What is 2^10?", vec![]).await;
    let history = first.data.unwrap().transcript;
    assert_eq!(history.len(), 4);

    let second = h.orchestrator.run("And half of it?", history.clone()).await;
    assert_eq!(second.data.unwrap().answer, "Half of that is 512.");

    let request = h.provider.requests().pop().unwrap();
    assert_eq!(request.messages.len(), history.len() + 1);
    assert_eq!(request.messages[0].content, "What is 2^10?");
    assert_eq!(request.messages.last().unwrap().content, "And half of it?");
}
