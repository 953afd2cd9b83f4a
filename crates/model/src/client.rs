//! Chat-completions HTTP client for local model backends.
//!
//! Works with LM Studio, Ollama, vLLM, and any other endpoint following the
//! OpenAI chat-completions contract. Role resolution, endpoints, timeouts
//! and concurrency caps come from the validated model configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use axon_domain::models::{ModelConfig, ModelDefinition};
use axon_domain::{Message, ToolCall};
use axon_telemetry::{events, Event, EventLog, TraceContext};

use crate::error::ModelError;
use crate::parser::parse_text_tool_calls;
use crate::response::{LlmResponse, Usage};
use crate::role::ModelRole;

/// The chat interface the orchestrator and router speak.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Issue one chat-completions request for the given role.
    async fn respond(
        &self,
        role: ModelRole,
        messages: &[Message],
        tools: Option<&[Value]>,
        trace: &TraceContext,
    ) -> Result<LlmResponse, ModelError>;

    /// Whether the role's backend supports native function calling.
    fn supports_tools(&self, role: ModelRole) -> bool;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HttpChatClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct HttpChatClient {
    http: reqwest::Client,
    config: ModelConfig,
    base_url: String,
    api_key: Option<String>,
    limits: HashMap<String, Arc<Semaphore>>,
    log: Arc<EventLog>,
}

impl HttpChatClient {
    pub fn new(
        config: ModelConfig,
        base_url: impl Into<String>,
        api_key: Option<String>,
        log: Arc<EventLog>,
    ) -> Self {
        let limits = config
            .models
            .iter()
            .map(|(role, def)| {
                (
                    role.clone(),
                    Arc::new(Semaphore::new(def.max_concurrency.max(1) as usize)),
                )
            })
            .collect();

        Self {
            http: reqwest::Client::new(),
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            limits,
            log,
        }
    }

    /// Resolve a role to its model definition, falling back to `standard`.
    fn resolve(&self, role: ModelRole) -> Result<(&str, &ModelDefinition), ModelError> {
        if let Some(def) = self.config.role(role.as_str()) {
            return Ok((role.as_str(), def));
        }
        self.config
            .role(ModelRole::Standard.as_str())
            .map(|def| (ModelRole::Standard.as_str(), def))
            .ok_or_else(|| ModelError::UnknownRole(role.as_str().to_string()))
    }

    fn chat_url(&self, def: &ModelDefinition) -> String {
        let base = def
            .endpoint
            .as_deref()
            .unwrap_or(&self.base_url)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    fn build_body(&self, def: &ModelDefinition, messages: &[Message], tools: Option<&[Value]>) -> Value {
        let mut body = serde_json::json!({
            "model": def.id,
            "messages": messages,
            "stream": false,
        });
        if let Some(temp) = def.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(tools) = tools {
            if def.supports_function_calling && !tools.is_empty() {
                body["tools"] = Value::Array(tools.to_vec());
            }
        }
        body
    }
}

#[async_trait]
impl ChatBackend for HttpChatClient {
    async fn respond(
        &self,
        role: ModelRole,
        messages: &[Message],
        tools: Option<&[Value]>,
        trace: &TraceContext,
    ) -> Result<LlmResponse, ModelError> {
        let (role_name, def) = self.resolve(role)?;

        // Per-role concurrency cap.
        let _permit = match self.limits.get(role_name) {
            Some(sem) => Some(sem.clone().acquire_owned().await.map_err(|_| {
                ModelError::Connection("model concurrency limiter closed".into())
            })?),
            None => None,
        };

        self.log.emit(
            Event::new(events::MODEL_CALL_STARTED, "model")
                .trace(&trace.trace_id)
                .field("role", role_name)
                .field("model", def.id.clone()),
        );

        let started = std::time::Instant::now();
        let result = self.send_once(def, messages, tools).await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(response) => {
                self.log.emit(
                    Event::new(events::MODEL_CALL_COMPLETED, "model")
                        .trace(&trace.trace_id)
                        .field("role", role_name)
                        .field("latency_ms", latency_ms)
                        .field("tool_calls", response.tool_calls.len() as u64)
                        .field(
                            "completion_tokens",
                            response.usage.map(|u| u.completion_tokens).unwrap_or(0),
                        ),
                );
            }
            Err(e) => {
                self.log.emit(
                    Event::new(events::MODEL_CALL_ERROR, "model")
                        .trace(&trace.trace_id)
                        .field("role", role_name)
                        .field("latency_ms", latency_ms)
                        .field("error", e.to_string()),
                );
            }
        }

        result
    }

    fn supports_tools(&self, role: ModelRole) -> bool {
        self.resolve(role)
            .map(|(_, def)| def.supports_function_calling)
            .unwrap_or(false)
    }
}

impl HttpChatClient {
    async fn send_once(
        &self,
        def: &ModelDefinition,
        messages: &[Message],
        tools: Option<&[Value]>,
    ) -> Result<LlmResponse, ModelError> {
        let url = self.chat_url(def);
        let body = self.build_body(def, messages, tools);

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let timeout = Duration::from_secs(def.default_timeout);
        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| ModelError::Timeout(def.default_timeout))?
            .map_err(map_reqwest)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ModelError::RateLimit);
        }
        if status.is_server_error() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Server {
                status: status.as_u16(),
                message: truncate(&message, 300),
            });
        }
        if !status.is_success() {
            return Err(ModelError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        parse_chat_response(raw)
    }
}

fn map_reqwest(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout(0)
    } else if e.is_connect() {
        ModelError::Connection(e.to_string())
    } else {
        ModelError::Connection(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Normalize the backend payload: native `tool_calls` are preferred; when
/// absent, embedded `[TOOL_REQUEST]` blocks in the content are extracted.
pub fn parse_chat_response(raw: Value) -> Result<LlmResponse, ModelError> {
    let message = raw
        .pointer("/choices/0/message")
        .ok_or_else(|| ModelError::InvalidResponse("no choices in response".into()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let reasoning_trace = message
        .get("reasoning_content")
        .and_then(Value::as_str)
        .map(String::from);

    let mut tool_calls = parse_native_tool_calls(message);
    let content = if tool_calls.is_empty() && content.contains("[TOOL_REQUEST]") {
        let (cleaned, embedded) = parse_text_tool_calls(&content);
        tool_calls = embedded;
        cleaned
    } else {
        content
    };

    let usage = raw.get("usage").and_then(parse_usage);

    Ok(LlmResponse {
        content,
        tool_calls,
        reasoning_trace,
        usage,
        raw,
    })
}

fn parse_native_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(arr) = message.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|tc| {
            let id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            let args_str = func.get("arguments").and_then(Value::as_str).unwrap_or("{}");
            let arguments =
                serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
            Some(ToolCall { id, name, arguments })
        })
        .collect()
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_text_response() {
        let raw = json!({
            "choices": [{ "message": { "role": "assistant", "content": "hello" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12 }
        });
        let response = parse_chat_response(raw).unwrap();
        assert_eq!(response.content, "hello");
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn parses_native_tool_calls() {
        let raw = json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "read_file", "arguments": "{\"path\": \"/tmp/a\"}" }
                }]
            }}]
        });
        let response = parse_chat_response(raw).unwrap();
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "read_file");
        assert_eq!(response.tool_calls[0].arguments["path"], "/tmp/a");
    }

    #[test]
    fn falls_back_to_embedded_tool_calls() {
        let raw = json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": "On it. [TOOL_REQUEST]{\"name\": \"list_directory\", \"arguments\": {\"path\": \".\"}}[END_TOOL_REQUEST]"
            }}]
        });
        let response = parse_chat_response(raw).unwrap();
        assert_eq!(response.content, "On it.");
        assert_eq!(response.tool_calls[0].name, "list_directory");
    }

    #[test]
    fn missing_choices_is_invalid_response() {
        let err = parse_chat_response(json!({})).unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }

    #[test]
    fn resolve_falls_back_to_standard() {
        let mut models = std::collections::BTreeMap::new();
        models.insert(
            "standard".to_string(),
            ModelDefinition {
                id: "test/standard".into(),
                endpoint: None,
                context_length: 8192,
                quantization: "8bit".into(),
                max_concurrency: 1,
                default_timeout: 30,
                temperature: None,
                supports_function_calling: true,
            },
        );
        let dir = tempfile::tempdir().unwrap();
        let client = HttpChatClient::new(
            ModelConfig { models },
            "http://localhost:1234/v1",
            None,
            EventLog::new(dir.path()),
        );

        let (name, def) = client.resolve(ModelRole::Reasoning).unwrap();
        assert_eq!(name, "standard");
        assert_eq!(def.id, "test/standard");
        assert!(client.supports_tools(ModelRole::Coding));
    }
}
