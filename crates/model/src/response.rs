use serde::{Deserialize, Serialize};
use serde_json::Value;

use axon_domain::ToolCall;

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Normalized response from a chat-completions call.
///
/// Native tool calls and embedded `[TOOL_REQUEST]` blocks are both folded
/// into `tool_calls` by the client; callers never see the difference.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub reasoning_trace: Option<String>,
    pub usage: Option<Usage>,
    /// Raw backend response for debugging.
    pub raw: Value,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}
