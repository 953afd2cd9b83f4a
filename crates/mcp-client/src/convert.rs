//! Conversions between gateway tool schemas and registry definitions.

use serde_json::Value;

use axon_domain::{ParamType, RiskLevel, ToolDefinition, ToolParameter};

use crate::protocol::GatewayToolDef;

/// Keywords marking a tool as high risk.
const HIGH_RISK: [&str; 8] = [
    "write", "delete", "execute", "send", "create", "modify", "update", "remove",
];

/// Keywords marking a tool as low risk.
const LOW_RISK: [&str; 7] = ["read", "get", "list", "search", "query", "view", "show"];

/// Infer a risk level from the gateway-side tool name.
pub fn infer_risk_level(tool_name: &str) -> RiskLevel {
    let lower = tool_name.to_lowercase();
    if HIGH_RISK.iter().any(|kw| lower.contains(kw)) {
        return RiskLevel::High;
    }
    if LOW_RISK.iter().any(|kw| lower.contains(kw)) {
        return RiskLevel::Low;
    }
    RiskLevel::Medium
}

/// Convert a discovered gateway tool into a registry definition.
///
/// The name is prefixed `mcp_` to avoid collisions with built-ins; complex
/// parameter schemas are preserved verbatim so the model-facing descriptor
/// stays faithful.
pub fn mcp_tool_to_definition(
    tool: &GatewayToolDef,
    description_override: Option<&str>,
) -> ToolDefinition {
    let risk_level = infer_risk_level(&tool.name);

    let required: Vec<String> = tool
        .input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let mut parameters = Vec::new();
    if let Some(properties) = tool.input_schema.get("properties").and_then(Value::as_object) {
        for (name, schema) in properties {
            let param_type = match schema.get("type").and_then(Value::as_str) {
                Some("number") | Some("integer") => ParamType::Number,
                Some("boolean") => ParamType::Boolean,
                Some("object") => ParamType::Object,
                Some("array") => ParamType::Array,
                _ => ParamType::String,
            };
            // Complex types keep their full nested schema.
            let json_schema = matches!(param_type, ParamType::Object | ParamType::Array)
                .then(|| schema.clone());

            parameters.push(ToolParameter {
                name: name.clone(),
                param_type,
                description: schema
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string(),
                required: required.contains(name),
                default: schema.get("default").cloned(),
                json_schema,
            });
        }
    }

    ToolDefinition {
        name: format!("mcp_{}", tool.name),
        description: description_override
            .map(String::from)
            .unwrap_or_else(|| tool.description.clone()),
        category: "mcp".into(),
        parameters,
        risk_level,
        allowed_modes: vec!["NORMAL".into(), "DEGRADED".into()],
        requires_approval: risk_level == RiskLevel::High,
        requires_sandbox: false,
        timeout_seconds: 30,
        rate_limit_per_hour: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn risk_inference() {
        assert_eq!(infer_risk_level("write_file"), RiskLevel::High);
        assert_eq!(infer_risk_level("delete_record"), RiskLevel::High);
        assert_eq!(infer_risk_level("send_email"), RiskLevel::High);
        assert_eq!(infer_risk_level("read_page"), RiskLevel::Low);
        assert_eq!(infer_risk_level("search_docs"), RiskLevel::Low);
        assert_eq!(infer_risk_level("transmogrify"), RiskLevel::Medium);
        // High keywords win over low ones.
        assert_eq!(infer_risk_level("update_search_index"), RiskLevel::High);
    }

    fn tool(name: &str, schema: Value) -> GatewayToolDef {
        GatewayToolDef {
            name: name.into(),
            description: "from gateway".into(),
            input_schema: schema,
        }
    }

    #[test]
    fn converts_simple_schema() {
        let def = mcp_tool_to_definition(
            &tool(
                "web_search",
                json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "what to search" },
                        "limit": { "type": "integer", "default": 10 }
                    },
                    "required": ["query"]
                }),
            ),
            None,
        );

        assert_eq!(def.name, "mcp_web_search");
        assert_eq!(def.category, "mcp");
        assert_eq!(def.risk_level, RiskLevel::Low);
        assert!(!def.requires_approval);

        let query = def.parameters.iter().find(|p| p.name == "query").unwrap();
        assert!(query.required);
        assert_eq!(query.param_type, ParamType::String);
        let limit = def.parameters.iter().find(|p| p.name == "limit").unwrap();
        assert!(!limit.required);
        assert_eq!(limit.param_type, ParamType::Number);
        assert_eq!(limit.default, Some(json!(10)));
    }

    #[test]
    fn complex_parameters_keep_nested_schema() {
        let def = mcp_tool_to_definition(
            &tool(
                "query_db",
                json!({
                    "type": "object",
                    "properties": {
                        "filters": {
                            "type": "array",
                            "items": { "type": "object", "properties": { "op": { "type": "string" } } }
                        }
                    }
                }),
            ),
            None,
        );
        let filters = &def.parameters[0];
        assert_eq!(filters.param_type, ParamType::Array);
        let schema = filters.json_schema.as_ref().unwrap();
        assert_eq!(schema["items"]["properties"]["op"]["type"], "string");
    }

    #[test]
    fn high_risk_requires_approval() {
        let def = mcp_tool_to_definition(&tool("delete_everything", json!({})), None);
        assert_eq!(def.risk_level, RiskLevel::High);
        assert!(def.requires_approval);
    }

    #[test]
    fn description_override_applies() {
        let def = mcp_tool_to_definition(&tool("get_page", json!({})), Some("Fetch a web page"));
        assert_eq!(def.description, "Fetch a web page");
    }
}
