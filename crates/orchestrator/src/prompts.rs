//! System prompts per channel.

use axon_domain::Channel;

const CHAT_PROMPT: &str = "You are Axon, a local assistant running entirely on this machine. \
Answer directly and concisely. When a registered tool can answer better than you can \
(system metrics, files, external lookups), call it and ground your reply in its output.";

const CODE_PROMPT: &str = "You are Axon in code-task mode. Read code carefully before \
answering, keep diffs minimal, and explain the root cause before the fix.";

const HEALTH_PROMPT: &str = "You are Axon in system-health mode. Prefer the \
system_metrics_snapshot tool over guessing, report concrete numbers, and flag anything \
outside normal operating ranges.";

/// The opener system prompt for a channel.
pub fn system_prompt(channel: Channel) -> &'static str {
    match channel {
        Channel::Chat => CHAT_PROMPT,
        Channel::CodeTask => CODE_PROMPT,
        Channel::SystemHealth => HEALTH_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_channel_has_a_prompt() {
        for channel in [Channel::Chat, Channel::CodeTask, Channel::SystemHealth] {
            assert!(!system_prompt(channel).is_empty());
        }
    }
}
