//! In-memory tool catalogue.
//!
//! Maps tool names to `(definition, executor)` pairs. Registration happens
//! before the first turn (builtins at construction, gateway tools during
//! init); afterwards the registry is effectively read-only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};

use axon_domain::{Error, Mode, Result, ToolDefinition, ToolOutput};

/// An executable tool body. Implementations return domain errors; the
/// execution layer converts them into failed `ToolResult`s.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, args: Value) -> Result<ToolOutput>;
}

pub struct ToolRegistry {
    tools: RwLock<HashMap<String, (ToolDefinition, Arc<dyn ToolExecutor>)>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool. The first registration of a name wins; duplicates
    /// fail deterministically.
    pub fn register(&self, def: ToolDefinition, executor: Arc<dyn ToolExecutor>) -> Result<()> {
        let mut tools = self.tools.write();
        if tools.contains_key(&def.name) {
            return Err(Error::Tool(format!(
                "tool '{}' is already registered",
                def.name
            )));
        }
        tracing::debug!(tool = %def.name, category = %def.category, "tool registered");
        tools.insert(def.name.clone(), (def, executor));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<(ToolDefinition, Arc<dyn ToolExecutor>)> {
        self.tools.read().get(name).cloned()
    }

    /// List definitions, optionally filtered by mode.
    pub fn list(&self, mode: Option<Mode>) -> Vec<ToolDefinition> {
        let tools = self.tools.read();
        tools
            .values()
            .filter(|(def, _)| mode.map_or(true, |m| def.allows_mode(m.as_str())))
            .map(|(def, _)| def.clone())
            .collect()
    }

    pub fn filter_by_category(&self, category: &str) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .values()
            .filter(|(def, _)| def.category == category)
            .map(|(def, _)| def.clone())
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Model-facing descriptors in standard function-calling shape. Complex
    /// parameters keep their full nested JSON schema.
    pub fn tool_definitions_for_llm(&self, mode: Option<Mode>) -> Vec<Value> {
        let mut defs = self.list(mode);
        defs.sort_by(|a, b| a.name.cmp(&b.name));

        defs.iter()
            .map(|def| {
                let mut properties = serde_json::Map::new();
                let mut required = Vec::new();
                for param in &def.parameters {
                    let schema = match &param.json_schema {
                        Some(schema) => schema.clone(),
                        None => json!({
                            "type": param.param_type.as_str(),
                            "description": param.description,
                        }),
                    };
                    properties.insert(param.name.clone(), schema);
                    if param.required {
                        required.push(param.name.clone());
                    }
                }
                json!({
                    "type": "function",
                    "function": {
                        "name": def.name,
                        "description": def.description,
                        "parameters": {
                            "type": "object",
                            "properties": properties,
                            "required": required,
                            "additionalProperties": false,
                        }
                    }
                })
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use axon_domain::{ParamType, RiskLevel, ToolParameter};

    struct Echo;

    #[async_trait]
    impl ToolExecutor for Echo {
        async fn execute(&self, args: Value) -> Result<ToolOutput> {
            Ok(ToolOutput::Json(args))
        }
    }

    fn def(name: &str, modes: &[&str]) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: format!("{name} tool"),
            category: "read_only".into(),
            parameters: vec![],
            risk_level: RiskLevel::Low,
            allowed_modes: modes.iter().map(|s| s.to_string()).collect(),
            requires_approval: false,
            requires_sandbox: false,
            timeout_seconds: 30,
            rate_limit_per_hour: None,
        }
    }

    #[test]
    fn duplicate_registration_fails_first_wins() {
        let registry = ToolRegistry::new();
        registry.register(def("a", &["NORMAL"]), Arc::new(Echo)).unwrap();
        let err = registry.register(def("a", &["NORMAL", "ALERT"]), Arc::new(Echo));
        assert!(err.is_err());

        // First registration's definition is intact.
        let (kept, _) = registry.get("a").unwrap();
        assert_eq!(kept.allowed_modes, vec!["NORMAL"]);
    }

    #[test]
    fn list_filters_by_mode() {
        let registry = ToolRegistry::new();
        registry.register(def("everywhere", &["NORMAL", "LOCKDOWN"]), Arc::new(Echo)).unwrap();
        registry.register(def("normal_only", &["NORMAL"]), Arc::new(Echo)).unwrap();

        assert_eq!(registry.list(None).len(), 2);
        assert_eq!(registry.list(Some(Mode::Lockdown)).len(), 1);
        assert_eq!(registry.list(Some(Mode::Normal)).len(), 2);
    }

    #[test]
    fn llm_descriptors_preserve_nested_schema() {
        let registry = ToolRegistry::new();
        let mut tool = def("search", &["NORMAL"]);
        tool.parameters = vec![
            ToolParameter {
                name: "query".into(),
                param_type: ParamType::String,
                description: "search query".into(),
                required: true,
                default: None,
                json_schema: None,
            },
            ToolParameter {
                name: "filters".into(),
                param_type: ParamType::Array,
                description: "structured filters".into(),
                required: false,
                default: None,
                json_schema: Some(json!({
                    "type": "array",
                    "items": { "type": "object", "properties": { "field": { "type": "string" } } }
                })),
            },
        ];
        registry.register(tool, Arc::new(Echo)).unwrap();

        let descriptors = registry.tool_definitions_for_llm(Some(Mode::Normal));
        assert_eq!(descriptors.len(), 1);
        let params = &descriptors[0]["function"]["parameters"];
        assert_eq!(params["required"], json!(["query"]));
        // The nested items schema survives untouched.
        assert_eq!(
            params["properties"]["filters"]["items"]["properties"]["field"]["type"],
            "string"
        );
    }

    #[test]
    fn filter_by_category() {
        let registry = ToolRegistry::new();
        registry.register(def("a", &["NORMAL"]), Arc::new(Echo)).unwrap();
        let mut gateway_tool = def("mcp_b", &["NORMAL"]);
        gateway_tool.category = "mcp".into();
        registry.register(gateway_tool, Arc::new(Echo)).unwrap();

        assert_eq!(registry.filter_by_category("mcp").len(), 1);
        assert_eq!(registry.filter_by_category("read_only").len(), 1);
    }
}
