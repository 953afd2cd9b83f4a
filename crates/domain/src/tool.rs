//! Tool definition, parameter, and result types.
//!
//! These cross the registry/executor boundary and are the source of truth
//! for the model-facing function-calling descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }

    /// Check a JSON value against this declared type.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }
}

/// Risk classification used by governance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Parameter definition for a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default: Option<Value>,
    /// Full JSON Schema for complex nested types (arrays, objects). Preserved
    /// verbatim in the model-facing descriptor.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub json_schema: Option<Value>,
}

fn default_true() -> bool {
    true
}

/// A registered tool: the metadata the registry, governance, and the model
/// all see.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// Governance category (e.g. `read_only`, `mcp`).
    pub category: String,
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
    pub risk_level: RiskLevel,
    /// Governance-file spellings of the modes this tool may run in.
    pub allowed_modes: Vec<String>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub requires_sandbox: bool,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rate_limit_per_hour: Option<u32>,
}

fn default_timeout() -> u64 {
    30
}

impl ToolDefinition {
    pub fn allows_mode(&self, mode: &str) -> bool {
        self.allowed_modes.iter().any(|m| m == mode)
    }
}

/// Output of a tool executor. The execution layer never coerces one variant
/// into the other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Json(Value),
}

impl ToolOutput {
    /// Render the output for inclusion in a `tool` chat message.
    pub fn render(&self) -> String {
        match self {
            ToolOutput::Text(s) => s.clone(),
            ToolOutput::Json(v) => v.to_string(),
        }
    }
}

/// Result of one tool invocation. Failure is a value, not an exception
/// across the dispatch boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    pub output: ToolOutput,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    pub latency_ms: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ToolResult {
    pub fn ok(tool_name: impl Into<String>, output: ToolOutput, latency_ms: f64) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            output,
            error: None,
            latency_ms,
            metadata: BTreeMap::new(),
        }
    }

    pub fn failed(
        tool_name: impl Into<String>,
        error: impl Into<String>,
        latency_ms: f64,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            output: ToolOutput::Text(String::new()),
            error: Some(error.into()),
            latency_ms,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
