//! Per-turn execution state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use axon_domain::{Channel, Mode};
use axon_journal::Outcome;

/// States of the per-turn machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Routing,
    ModelCall,
    ToolDispatch,
    Completed,
    Failed,
}

/// One recorded step of a turn, in temporal order.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// Step kind: `routing`, `llm_call`, `tool_call`.
    pub step: String,
    pub at: DateTime<Utc>,
    pub detail: Value,
}

/// Everything a single turn carries. Owned by the orchestrator for the
/// duration of one `handle_user_request` call.
#[derive(Debug)]
pub struct ExecutionContext {
    pub session_id: String,
    pub trace_id: String,
    pub user_message: String,
    pub mode: Mode,
    pub channel: Channel,
    pub state: TaskState,
    pub error: Option<String>,
    pub steps: Vec<StepRecord>,
}

impl ExecutionContext {
    pub fn new(
        session_id: impl Into<String>,
        trace_id: impl Into<String>,
        user_message: impl Into<String>,
        mode: Mode,
        channel: Channel,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            trace_id: trace_id.into(),
            user_message: user_message.into(),
            mode,
            channel,
            state: TaskState::Idle,
            error: None,
            steps: Vec::new(),
        }
    }

    pub fn record_step(&mut self, step: &str, detail: Value) {
        self.steps.push(StepRecord {
            step: step.to_string(),
            at: Utc::now(),
            detail,
        });
    }

    /// Tools invoked during this turn, in order, deduplicated.
    pub fn tools_used(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for record in &self.steps {
            if record.step == "tool_call" {
                if let Some(name) = record.detail.get("tool_name").and_then(Value::as_str) {
                    if !seen.iter().any(|s| s == name) {
                        seen.push(name.to_string());
                    }
                }
            }
        }
        seen
    }
}

/// What the caller gets back. `reply` is always non-empty.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorResult {
    pub reply: String,
    pub trace_id: String,
    pub session_id: String,
    pub steps: Vec<StepRecord>,
    pub outcome: Outcome,
}
