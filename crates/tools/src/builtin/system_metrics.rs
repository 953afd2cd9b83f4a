//! `system_metrics_snapshot`: current CPU/memory/disk (and GPU where
//! available) as a flat metric map.

use async_trait::async_trait;
use serde_json::{json, Value};

use axon_domain::{Result, RiskLevel, ToolDefinition, ToolOutput};

use crate::registry::ToolExecutor;

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "system_metrics_snapshot".into(),
        description: "Get a comprehensive snapshot of system metrics (CPU, memory, disk, GPU)"
            .into(),
        category: "read_only".into(),
        parameters: vec![],
        risk_level: RiskLevel::Low,
        allowed_modes: vec![
            "NORMAL".into(),
            "ALERT".into(),
            "DEGRADED".into(),
            "LOCKDOWN".into(),
            "RECOVERY".into(),
        ],
        requires_approval: false,
        requires_sandbox: false,
        timeout_seconds: 10,
        rate_limit_per_hour: None,
    }
}

pub struct SystemMetricsSnapshot;

#[async_trait]
impl ToolExecutor for SystemMetricsSnapshot {
    async fn execute(&self, _args: Value) -> Result<ToolOutput> {
        let metrics = axon_sensors::system_metrics_snapshot();
        Ok(ToolOutput::Json(json!({
            "metrics": metrics,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_returns_metric_map() {
        let output = SystemMetricsSnapshot.execute(json!({})).await.unwrap();
        match output {
            ToolOutput::Json(v) => assert!(v["metrics"].is_object()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn allowed_in_every_mode() {
        let def = definition();
        assert_eq!(def.allowed_modes.len(), 5);
    }
}
