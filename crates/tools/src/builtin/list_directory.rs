//! `list_directory`: enumerate a directory's entries.

use async_trait::async_trait;
use serde_json::{json, Value};

use axon_domain::{
    Error, ParamType, Result, RiskLevel, ToolDefinition, ToolOutput, ToolParameter,
};

use crate::registry::ToolExecutor;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "list_directory".into(),
        description: "List the entries of a directory".into(),
        category: "read_only".into(),
        parameters: vec![ToolParameter {
            name: "path".into(),
            param_type: ParamType::String,
            description: "Directory to list".into(),
            required: true,
            default: None,
            json_schema: None,
        }],
        risk_level: RiskLevel::Low,
        allowed_modes: vec!["NORMAL".into(), "ALERT".into(), "DEGRADED".into()],
        requires_approval: false,
        requires_sandbox: false,
        timeout_seconds: 10,
        rate_limit_per_hour: None,
    }
}

pub struct ListDirectory;

#[async_trait]
impl ToolExecutor for ListDirectory {
    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Tool("missing path".into()))?
            .to_string();

        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| Error::Tool(format!("list failed: {e}")))?;
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| Error::Tool(format!("list failed: {e}")))?
        {
            let meta = entry.metadata().await.ok();
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "is_dir": meta.as_ref().map(|m| m.is_dir()).unwrap_or(false),
                "size": meta.map(|m| m.len()).unwrap_or(0),
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(ToolOutput::Json(json!({
            "path": path,
            "entries": entries,
        })))
    }
}
