//! Embedded tool-call extraction.
//!
//! Backends without native function calling emit tool requests inline as
//! `[TOOL_REQUEST]{json}[END_TOOL_REQUEST]`; the closing marker
//! `[END_TOOL_RESULT]` is accepted as a synonym. Parsed blocks are removed
//! from the assistant text.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use axon_domain::ToolCall;

fn block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\[TOOL_REQUEST\](.*?)\[(?:END_TOOL_REQUEST|END_TOOL_RESULT)\]")
            .expect("tool request regex")
    })
}

/// Extract embedded tool calls from assistant text.
///
/// Returns the text with the blocks removed and the parsed calls. Blocks
/// whose payload is not a JSON object with a `name` are left out of the
/// call list but still stripped from the text.
pub fn parse_text_tool_calls(content: &str) -> (String, Vec<ToolCall>) {
    let mut calls = Vec::new();

    for (i, captures) in block_regex().captures_iter(content).enumerate() {
        let payload = captures.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        match serde_json::from_str::<Value>(payload) {
            Ok(value) => {
                let Some(name) = value.get("name").and_then(Value::as_str) else {
                    tracing::warn!(block = i, "tool request block missing name");
                    continue;
                };
                let arguments = match value.get("arguments") {
                    // Arguments may arrive as an object or a JSON-encoded string.
                    Some(Value::String(s)) => {
                        serde_json::from_str(s).unwrap_or(Value::Object(Default::default()))
                    }
                    Some(other) => other.clone(),
                    None => Value::Object(Default::default()),
                };
                calls.push(ToolCall {
                    id: format!("embedded-{}", uuid::Uuid::new_v4()),
                    name: name.to_string(),
                    arguments,
                });
            }
            Err(e) => {
                tracing::warn!(block = i, error = %e, "unparseable tool request block");
            }
        }
    }

    let cleaned = block_regex().replace_all(content, "").trim().to_string();
    (cleaned, calls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_single_block() {
        let text = r#"Let me check.
[TOOL_REQUEST]{"name": "system_metrics_snapshot", "arguments": {}}[END_TOOL_REQUEST]"#;
        let (cleaned, calls) = parse_text_tool_calls(text);
        assert_eq!(cleaned, "Let me check.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "system_metrics_snapshot");
        assert_eq!(calls[0].arguments, json!({}));
    }

    #[test]
    fn accepts_end_tool_result_synonym() {
        let text = r#"[TOOL_REQUEST]{"name": "read_file", "arguments": {"path": "/tmp/a"}}[END_TOOL_RESULT]"#;
        let (cleaned, calls) = parse_text_tool_calls(text);
        assert!(cleaned.is_empty());
        assert_eq!(calls[0].arguments["path"], "/tmp/a");
    }

    #[test]
    fn arguments_as_json_string_are_decoded() {
        let text = r#"[TOOL_REQUEST]{"name": "read_file", "arguments": "{\"path\": \"/tmp/a\"}"}[END_TOOL_REQUEST]"#;
        let (_, calls) = parse_text_tool_calls(text);
        assert_eq!(calls[0].arguments["path"], "/tmp/a");
    }

    #[test]
    fn malformed_block_is_stripped_but_not_returned() {
        let text = "before [TOOL_REQUEST]not json[END_TOOL_REQUEST] after";
        let (cleaned, calls) = parse_text_tool_calls(text);
        assert!(calls.is_empty());
        assert_eq!(cleaned, "before  after");
    }

    #[test]
    fn multiple_blocks_in_order() {
        let text = r#"[TOOL_REQUEST]{"name": "a"}[END_TOOL_REQUEST][TOOL_REQUEST]{"name": "b"}[END_TOOL_REQUEST]"#;
        let (_, calls) = parse_text_tool_calls(text);
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn plain_text_passes_through() {
        let (cleaned, calls) = parse_text_tool_calls("just an answer");
        assert_eq!(cleaned, "just an answer");
        assert!(calls.is_empty());
    }
}
