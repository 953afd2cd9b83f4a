//! Semantic event constants for the structured event log.
//!
//! All emitted events use these constants rather than magic strings so the
//! analytics queries and background loops can rely on a closed vocabulary.

// Request edge
pub const REQUEST_RECEIVED: &str = "request_received";
pub const REPLY_READY: &str = "reply_ready";

// Orchestrator
pub const TASK_STARTED: &str = "task_started";
pub const TASK_COMPLETED: &str = "task_completed";
pub const TASK_FAILED: &str = "task_failed";
pub const STEP_EXECUTED: &str = "step_executed";
pub const STATE_TRANSITION: &str = "state_transition";

// Model calls
pub const MODEL_CALL_STARTED: &str = "model_call_started";
pub const MODEL_CALL_COMPLETED: &str = "model_call_completed";
pub const MODEL_CALL_ERROR: &str = "model_call_error";

// Tool execution
pub const TOOL_CALL_STARTED: &str = "tool_call_started";
pub const TOOL_CALL_COMPLETED: &str = "tool_call_completed";
pub const TOOL_CALL_FAILED: &str = "tool_call_failed";

// Brainstem
pub const MODE_TRANSITION: &str = "mode_transition";
pub const SENSOR_POLL: &str = "sensor_poll";
pub const SYSTEM_METRICS_SNAPSHOT: &str = "system_metrics_snapshot";
pub const CONSOLIDATION_TRIGGERED: &str = "consolidation_triggered";
pub const CONSOLIDATION_COMPLETED: &str = "consolidation_completed";
pub const QUALITY_MONITOR_REPORT: &str = "quality_monitor_report";
pub const QUALITY_MONITOR_ANOMALY: &str = "quality_monitor_anomaly";

// Safety and governance
pub const POLICY_VIOLATION: &str = "policy_violation";
pub const APPROVAL_REQUIRED: &str = "approval_required";
pub const APPROVAL_GRANTED: &str = "approval_granted";
pub const APPROVAL_DENIED: &str = "approval_denied";

// Sessions
pub const SESSION_CREATED: &str = "session_created";
pub const SESSION_CLOSED: &str = "session_closed";

// Routing
pub const ROUTING_DECISION: &str = "routing_decision";
pub const ROUTING_DELEGATION: &str = "routing_delegation";
pub const ROUTING_HANDLED: &str = "routing_handled";
pub const ROUTING_PARSE_ERROR: &str = "routing_parse_error";

// Captain's log
pub const JOURNAL_ENTRY_CREATED: &str = "captains_log_entry_created";
pub const JOURNAL_ENTRY_COMMITTED: &str = "captains_log_entry_committed";

// Lifecycle
pub const LIFECYCLE_DISK_CHECK: &str = "lifecycle_disk_check";
pub const LIFECYCLE_DISK_ALERT: &str = "lifecycle_disk_alert";
pub const LIFECYCLE_ARCHIVE: &str = "lifecycle_archive";
pub const LIFECYCLE_PURGE: &str = "lifecycle_purge";
pub const LIFECYCLE_INDEX_CLEANUP: &str = "lifecycle_index_cleanup";
pub const LIFECYCLE_REPORT: &str = "lifecycle_report";

// External tool gateway
pub const GATEWAY_STARTED: &str = "mcp_gateway_started";
pub const GATEWAY_STOPPED: &str = "mcp_gateway_stopped";
pub const GATEWAY_INIT_FAILED: &str = "mcp_gateway_init_failed";
pub const GATEWAY_TOOL_DISCOVERED: &str = "mcp_tool_discovered";
pub const GATEWAY_TOOL_GOVERNANCE_ADDED: &str = "mcp_tool_governance_added";
