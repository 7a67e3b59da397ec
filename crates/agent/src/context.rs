//! Conversation pruning when the size bound is exceeded.
//!
//! Pruning only drops whole messages, oldest first. The leading system
//! message and the latest user message always survive, and a tool result is
//! never kept without the assistant message that requested it.

use ferrule_core::message::{Message, Role};
use serde::Serialize;
use tracing::warn;

/// What one pruning pass removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    pub messages_before: usize,
    pub messages_after: usize,
    pub chars_before: usize,
    pub chars_after: usize,
}

impl PruneReport {
    pub fn dropped(&self) -> usize {
        self.messages_before - self.messages_after
    }
}

pub fn total_chars(messages: &[Message]) -> usize {
    messages.iter().map(Message::char_len).sum()
}

/// Shrink `messages` below `max_chars`.
///
/// Keeps the leading system message plus the most recent `keep_recent`
/// messages, then drops further from the front while still over the bound.
/// Nothing from the latest user message onward is dropped, so the result can
/// stay over the bound when that tail alone exceeds it.
/// Returns `None` when the conversation was already within the bound.
pub fn prune_conversation(
    messages: &mut Vec<Message>,
    max_chars: usize,
    keep_recent: usize,
) -> Option<PruneReport> {
    let chars_before = total_chars(messages);
    if chars_before <= max_chars {
        return None;
    }
    let messages_before = messages.len();

    let system = if messages.first().is_some_and(|m| m.role == Role::System) {
        Some(messages.remove(0))
    } else {
        None
    };
    let system_chars = system.as_ref().map_or(0, Message::char_len);

    let floor = messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .unwrap_or(messages.len());
    let mut start = skip_orphans(messages, messages.len().saturating_sub(keep_recent)).min(floor);

    let mut body_chars = total_chars(&messages[start..]);
    while start < floor && system_chars + body_chars >= max_chars {
        body_chars -= messages[start].char_len();
        let next = skip_orphans(messages, start + 1).min(floor);
        body_chars -= total_chars(&messages[start + 1..next]);
        start = next;
    }

    messages.drain(..start);
    if let Some(system) = system {
        messages.insert(0, system);
    }

    let report = PruneReport {
        messages_before,
        messages_after: messages.len(),
        chars_before,
        chars_after: total_chars(messages),
    };
    warn!(
        dropped = report.dropped(),
        kept = report.messages_after,
        chars_before = report.chars_before,
        chars_after = report.chars_after,
        max_chars,
        "Conversation over size bound, pruned oldest messages"
    );
    Some(report)
}

/// First index at or after `start` that is not a tool result, so the kept
/// window never opens on results whose request was dropped.
fn skip_orphans(messages: &[Message], mut start: usize) -> usize {
    while start < messages.len() && messages[start].role == Role::Tool {
        start += 1;
    }
    start
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrule_core::message::MessageToolCall;

    fn filler(n: usize) -> String {
        "x".repeat(n)
    }

    fn history(turns: usize, size: usize) -> Vec<Message> {
        let mut messages = vec![Message::system("You are helpful.")];
        for i in 0..turns {
            messages.push(Message::user(format!("{i}:{}", filler(size))));
            messages.push(Message::assistant(format!("{i}:{}", filler(size))));
        }
        messages
    }

    #[test]
    fn within_bound_is_untouched() {
        let mut messages = history(3, 10);
        let before = messages.clone();
        assert_eq!(prune_conversation(&mut messages, 10_000, 10), None);
        assert_eq!(messages.len(), before.len());
    }

    #[test]
    fn keeps_system_plus_recent_window() {
        let mut messages = history(20, 100);
        let last_id = messages.last().unwrap().id.clone();
        let report = prune_conversation(&mut messages, 3_000, 10).unwrap();

        assert_eq!(messages.len(), 11);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.last().unwrap().id, last_id);
        assert!(total_chars(&messages) < 3_000);
        assert_eq!(report.dropped(), 30);
    }

    #[test]
    fn drops_further_when_window_still_too_large() {
        let mut messages = history(20, 1_000);
        prune_conversation(&mut messages, 4_500, 10).unwrap();

        assert_eq!(messages[0].role, Role::System);
        assert!(messages.len() < 11);
        assert!(total_chars(&messages) < 4_500);
    }

    #[test]
    fn latest_exchange_kept_when_nothing_fits() {
        let mut messages = history(2, 5_000);
        prune_conversation(&mut messages, 1_000, 10).unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.starts_with("1:"));
    }

    #[test]
    fn oversized_question_survives_pruning() {
        let mut messages = history(5, 100);
        messages.push(Message::user(filler(5_000)));
        let report = prune_conversation(&mut messages, 1_000, 10).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].char_len(), 5_000);
        assert_eq!(report.dropped(), 10);
    }

    #[test]
    fn current_round_is_not_dropped() {
        let mut messages = history(3, 100);
        messages.push(Message::user("question"));
        messages.push(Message::assistant_with_tool_calls(
            "",
            vec![MessageToolCall::new("a", "file_read", r#"{"path":"big.log"}"#)],
        ));
        messages.push(Message::tool_result("a", filler(2_000)));

        prune_conversation(&mut messages, 1_000, 2).unwrap();

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(messages[1].content, "question");
    }

    #[test]
    fn works_without_system_message() {
        let mut messages: Vec<Message> = history(10, 100).into_iter().skip(1).collect();
        prune_conversation(&mut messages, 500, 4).unwrap();
        assert!(messages.len() <= 4);
        assert!(total_chars(&messages) < 500);
        assert_ne!(messages[0].role, Role::System);
    }

    #[test]
    fn never_opens_on_orphaned_tool_results() {
        let mut messages = vec![Message::system("sys"), Message::user(filler(500))];
        messages.push(Message::assistant_with_tool_calls(
            "",
            vec![
                MessageToolCall::new("a", "shell", r#"{"command":"ls"}"#),
                MessageToolCall::new("b", "shell", r#"{"command":"pwd"}"#),
            ],
        ));
        messages.push(Message::tool_result("a", filler(200)));
        messages.push(Message::tool_result("b", filler(200)));
        messages.push(Message::user("next"));

        // A window of 2 would start on tool result "b".
        prune_conversation(&mut messages, 800, 2).unwrap();

        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "next");
    }

    #[test]
    fn dropping_an_assistant_takes_its_results() {
        let mut messages = vec![Message::system("sys")];
        messages.push(Message::assistant_with_tool_calls(
            filler(300),
            vec![MessageToolCall::new("a", "file_read", r#"{"path":"x"}"#)],
        ));
        messages.push(Message::tool_result("a", filler(300)));
        messages.push(Message::user("next question"));

        prune_conversation(&mut messages, 400, 10).unwrap();

        assert!(messages.iter().all(|m| m.role != Role::Tool));
        assert_eq!(messages.last().unwrap().content, "next question");
    }
}
