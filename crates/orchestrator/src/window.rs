//! Conversation context windowing.
//!
//! Trims history to a token budget while keeping the opener and the most
//! recent tail. Dropped middle context is replaced by a single synthetic
//! marker message.

use axon_domain::Message;

pub const TRUNCATION_MARKER: &str = "[Earlier messages truncated]";

fn marker_message() -> Message {
    Message::system(TRUNCATION_MARKER)
}

/// Estimated token count for one message: `max(1, len/4)`.
pub fn estimate_message_tokens(message: &Message) -> usize {
    (message.content.len() / 4).max(1)
}

pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Trim `messages` to fit `max_tokens - reserved_tokens`.
///
/// Rules: pass through when everything fits; otherwise keep the first
/// message and the largest most-recent suffix that fits, with exactly one
/// truncation marker between them when anything was dropped. An
/// unsupported strategy warns and falls back to `truncate`.
pub fn apply_context_window(
    messages: &[Message],
    max_tokens: usize,
    reserved_tokens: usize,
    strategy: &str,
) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    if strategy != "truncate" {
        tracing::warn!(strategy, "unsupported context strategy, falling back to truncate");
    }

    let budget = max_tokens.saturating_sub(reserved_tokens).max(1);
    if estimate_messages_tokens(messages) <= budget {
        return messages.to_vec();
    }
    if messages.len() == 1 {
        return messages.to_vec();
    }

    let first = &messages[0];
    let remaining = &messages[1..];

    let first_tokens = estimate_message_tokens(first);
    let marker_tokens = estimate_message_tokens(&marker_message());
    let tail_budget = budget.saturating_sub(first_tokens);

    // Walk backwards, keeping every message that still fits the tail
    // budget.
    let mut tail_reversed: Vec<&Message> = Vec::new();
    let mut used = 0usize;
    for message in remaining.iter().rev() {
        let tokens = estimate_message_tokens(message);
        if used + tokens > tail_budget {
            continue;
        }
        tail_reversed.push(message);
        used += tokens;
    }

    let dropped = remaining.len() - tail_reversed.len();
    let mut output: Vec<Message> = vec![first.clone()];
    if dropped > 0 && first_tokens + marker_tokens <= budget {
        output.push(marker_message());
    }
    output.extend(tail_reversed.into_iter().rev().cloned());

    // If the marker (or retained history) pushed us over budget, drop from
    // the oldest retained position until it fits.
    while output.len() > 1 && estimate_messages_tokens(&output) > budget {
        output.remove(1);
    }

    output
}
