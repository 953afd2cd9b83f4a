//! `read_file`: read a text file's contents, truncated at a byte cap.

use async_trait::async_trait;
use serde_json::{json, Value};

use axon_domain::{
    Error, ParamType, Result, RiskLevel, ToolDefinition, ToolOutput, ToolParameter,
};

use crate::registry::ToolExecutor;

const MAX_BYTES: usize = 64 * 1024;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "read_file".into(),
        description: "Read the contents of a text file".into(),
        category: "read_only".into(),
        parameters: vec![
            ToolParameter {
                name: "path".into(),
                param_type: ParamType::String,
                description: "Absolute or relative path of the file to read".into(),
                required: true,
                default: None,
                json_schema: None,
            },
            ToolParameter {
                name: "max_bytes".into(),
                param_type: ParamType::Number,
                description: "Maximum bytes to return".into(),
                required: false,
                default: Some(json!(MAX_BYTES)),
                json_schema: None,
            },
        ],
        risk_level: RiskLevel::Low,
        allowed_modes: vec!["NORMAL".into(), "ALERT".into(), "DEGRADED".into()],
        requires_approval: false,
        requires_sandbox: false,
        timeout_seconds: 10,
        rate_limit_per_hour: None,
    }
}

pub struct ReadFile;

#[async_trait]
impl ToolExecutor for ReadFile {
    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Tool("missing path".into()))?
            .to_string();
        let max_bytes = args
            .get("max_bytes")
            .and_then(Value::as_u64)
            .unwrap_or(MAX_BYTES as u64) as usize;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Tool(format!("read failed: {e}")))?;

        let truncated = content.len() > max_bytes;
        let mut end = max_bytes.min(content.len());
        while end > 0 && !content.is_char_boundary(end) {
            end -= 1;
        }

        Ok(ToolOutput::Json(json!({
            "path": path,
            "content": content[..end].to_string(),
            "truncated": truncated,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "hello axon").unwrap();

        let output = ReadFile
            .execute(json!({"path": path.to_string_lossy()}))
            .await
            .unwrap();
        match output {
            ToolOutput::Json(v) => {
                assert_eq!(v["content"], "hello axon");
                assert_eq!(v["truncated"], false);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncates_at_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, "a".repeat(100)).unwrap();

        let output = ReadFile
            .execute(json!({"path": path.to_string_lossy(), "max_bytes": 10}))
            .await
            .unwrap();
        match output {
            ToolOutput::Json(v) => {
                assert_eq!(v["content"].as_str().unwrap().len(), 10);
                assert_eq!(v["truncated"], true);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = ReadFile.execute(json!({"path": "/nope/missing"})).await;
        assert!(err.is_err());
    }
}
