//! The gated tool dispatch boundary.
//!
//! `execute_tool` resolves the tool, checks mode permissions, validates
//! arguments against the declared parameters, enforces path policy and
//! rate limits, runs the approval workflow, executes under a deadline, and
//! wraps everything — success or failure — in a `ToolResult`. Nothing ever
//! raises across this boundary.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use axon_brainstem::ModeManager;
use axon_domain::governance::{GovernanceConfig, ToolPolicy};
use axon_domain::{Mode, ToolDefinition, ToolResult};
use axon_telemetry::{events, Event, EventLog, TraceContext};

use crate::approval::{ApprovalBroker, ApprovalDecision};
use crate::registry::ToolRegistry;
use crate::sanitize;

pub struct ToolExecutionLayer {
    registry: Arc<ToolRegistry>,
    governance: Arc<GovernanceConfig>,
    modes: Arc<ModeManager>,
    log: Arc<EventLog>,
    approvals: Option<Arc<ApprovalBroker>>,
    rate_windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl ToolExecutionLayer {
    pub fn new(
        registry: Arc<ToolRegistry>,
        governance: Arc<GovernanceConfig>,
        modes: Arc<ModeManager>,
        log: Arc<EventLog>,
        approvals: Option<Arc<ApprovalBroker>>,
    ) -> Self {
        Self {
            registry,
            governance,
            modes,
            log,
            approvals,
            rate_windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute one tool call. Always returns a `ToolResult`.
    pub async fn execute_tool(&self, name: &str, args: Value, trace: &TraceContext) -> ToolResult {
        let started = Instant::now();
        self.log.emit(
            Event::new(events::TOOL_CALL_STARTED, "tools")
                .trace(&trace.trace_id)
                .field("tool_name", name),
        );

        let result = self.run_gated(name, args, trace, started).await;

        let event_type = if result.success {
            events::TOOL_CALL_COMPLETED
        } else {
            events::TOOL_CALL_FAILED
        };
        let mut event = Event::new(event_type, "tools")
            .trace(&trace.trace_id)
            .field("tool_name", name)
            .field("success", result.success)
            .field("latency_ms", result.latency_ms);
        if let Some(error) = &result.error {
            event = event.field("error", error.clone());
        }
        self.log.emit(event);

        result
    }

    async fn run_gated(
        &self,
        name: &str,
        args: Value,
        trace: &TraceContext,
        started: Instant,
    ) -> ToolResult {
        // 1. Resolution.
        let Some((def, executor)) = self.registry.get(name) else {
            return self.fail(name, format!("tool '{name}' not found"), started);
        };
        let policy = self.governance.tool_policy(name).cloned().unwrap_or_default();

        // 2. Mode check.
        let mode = self.modes.current_mode();
        if !def.allows_mode(mode.as_str()) {
            self.emit_violation(name, trace, "mode", mode);
            return self.fail(name, format!("permission denied: mode {mode}"), started);
        }

        // 3. Argument validation (with default substitution).
        let args = match validate_arguments(&def, args) {
            Ok(args) => args,
            Err(message) => return self.fail(name, message, started),
        };

        // 4. Path policy.
        if let Err(message) = check_path_policy(&policy, &args) {
            self.emit_violation(name, trace, "path", mode);
            return self.fail(name, message, started);
        }

        // 5. Rate limit.
        let limit = def.rate_limit_per_hour.or(policy.rate_limit_per_hour);
        if let Some(limit) = limit {
            if !self.admit_rate(name, limit, Instant::now()) {
                self.emit_violation(name, trace, "rate_limit", mode);
                return self.fail(
                    name,
                    format!("rate limit exceeded: {limit} calls per hour"),
                    started,
                );
            }
        }

        // 6. Approval.
        let needs_approval = def.requires_approval
            || policy.requires_approval
            || self
                .governance
                .approval_demanded(mode, &def.category, def.risk_level);
        if needs_approval {
            self.log.emit(
                Event::new(events::APPROVAL_REQUIRED, "tools")
                    .trace(&trace.trace_id)
                    .field("tool_name", name),
            );
            match &self.approvals {
                Some(broker) => {
                    match broker.request(name, args.clone(), &trace.trace_id).await {
                        ApprovalDecision::Approved => {
                            self.log.emit(
                                Event::new(events::APPROVAL_GRANTED, "tools")
                                    .trace(&trace.trace_id)
                                    .field("tool_name", name),
                            );
                        }
                        ApprovalDecision::Denied { reason } => {
                            self.log.emit(
                                Event::new(events::APPROVAL_DENIED, "tools")
                                    .trace(&trace.trace_id)
                                    .field("tool_name", name),
                            );
                            let detail = reason.unwrap_or_else(|| "approval denied".into());
                            return self.fail(name, format!("permission denied: {detail}"), started);
                        }
                    }
                }
                None => {
                    self.log.emit(
                        Event::new(events::APPROVAL_DENIED, "tools")
                            .trace(&trace.trace_id)
                            .field("tool_name", name)
                            .field("reason", "no approver configured"),
                    );
                    return self.fail(
                        name,
                        "permission denied: approval required but no approver is configured",
                        started,
                    );
                }
            }
        }

        // 7. Execution with deadline, then capture.
        let deadline = Duration::from_secs(def.timeout_seconds.max(1));
        match tokio::time::timeout(deadline, executor.execute(args)).await {
            Ok(Ok(output)) => {
                let latency_ms = ms_since(started);
                ToolResult::ok(name, output, latency_ms)
            }
            Ok(Err(e)) => {
                let scrubbed = sanitize::scrub(&e.to_string());
                let category = sanitize::categorize(&scrubbed);
                self.fail(name, scrubbed, started)
                    .with_metadata("error_category", Value::String(category.as_str().into()))
            }
            Err(_) => self
                .fail(
                    name,
                    format!("timeout: tool exceeded {}s deadline", def.timeout_seconds),
                    started,
                )
                .with_metadata("error_category", Value::String("timeout".into())),
        }
    }

    fn fail(&self, name: &str, message: impl Into<String>, started: Instant) -> ToolResult {
        ToolResult::failed(name, message, ms_since(started))
    }

    fn emit_violation(&self, name: &str, trace: &TraceContext, kind: &str, mode: Mode) {
        self.log.emit(
            Event::new(events::POLICY_VIOLATION, "tools")
                .trace(&trace.trace_id)
                .field("tool_name", name)
                .field("violation", kind)
                .field("mode", mode.as_str()),
        );
    }

    /// Sliding one-hour admission window per tool.
    fn admit_rate(&self, name: &str, limit: u32, now: Instant) -> bool {
        let mut windows = self.rate_windows.lock();
        let window = windows.entry(name.to_string()).or_default();
        while window
            .front()
            .is_some_and(|t| now.duration_since(*t) > Duration::from_secs(3600))
        {
            window.pop_front();
        }
        if window.len() >= limit as usize {
            return false;
        }
        window.push_back(now);
        true
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Check presence and type of declared parameters, substituting defaults
/// for absent optional ones.
fn validate_arguments(def: &ToolDefinition, args: Value) -> Result<Value, String> {
    let mut map = match args {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            return Err(format!(
                "invalid arguments: expected an object, got {}",
                type_name(&other)
            ))
        }
    };

    for param in &def.parameters {
        match map.get(&param.name) {
            Some(value) => {
                if !param.param_type.matches(value) {
                    return Err(format!(
                        "invalid argument '{}': expected {}, got {}",
                        param.name,
                        param.param_type.as_str(),
                        type_name(value)
                    ));
                }
            }
            None if param.required => {
                return Err(format!("missing required argument '{}'", param.name));
            }
            None => {
                if let Some(default) = &param.default {
                    map.insert(param.name.clone(), default.clone());
                }
            }
        }
    }
    Ok(Value::Object(map))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Enforce forbidden/allowed path globs on a `path` argument. `$HOME` in
/// patterns expands to the current user's home directory.
fn check_path_policy(policy: &ToolPolicy, args: &Value) -> Result<(), String> {
    if policy.forbidden_paths.is_empty() && policy.allowed_paths.is_empty() {
        return Ok(());
    }
    let Some(path) = args.get("path").and_then(Value::as_str) else {
        return Ok(());
    };

    for pattern in &policy.forbidden_paths {
        if glob_matches(&expand_home(pattern), path) {
            return Err(format!("path '{path}' is forbidden by policy ({pattern})"));
        }
    }

    if !policy.allowed_paths.is_empty() {
        let allowed = policy
            .allowed_paths
            .iter()
            .any(|pattern| glob_matches(&expand_home(pattern), path));
        if !allowed {
            return Err(format!("path '{path}' is outside the allowed paths"));
        }
    }
    Ok(())
}

fn expand_home(pattern: &str) -> String {
    if let Some(rest) = pattern.strip_prefix("$HOME") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    pattern.to_string()
}

fn glob_matches(pattern: &str, path: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(path))
        .unwrap_or(false)
}

fn ms_since(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ToolExecutor;
    use async_trait::async_trait;
    use axon_domain::governance::{Comparator, TransitionCondition, TransitionRule};
    use axon_domain::{Error, ParamType, RiskLevel, ToolOutput, ToolParameter};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingExecutor {
        calls: Arc<AtomicU32>,
        delay: Duration,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl ToolExecutor for CountingExecutor {
        async fn execute(&self, args: Value) -> axon_domain::Result<ToolOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(message) = &self.fail_with {
                return Err(Error::Tool(message.clone()));
            }
            Ok(ToolOutput::Json(args))
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        layer: ToolExecutionLayer,
        calls: Arc<AtomicU32>,
        modes: Arc<ModeManager>,
    }

    fn definition(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: "test tool".into(),
            category: "read_only".into(),
            parameters: vec![ToolParameter {
                name: "path".into(),
                param_type: ParamType::String,
                description: "target path".into(),
                required: false,
                default: Some(json!("/tmp/default")),
                json_schema: None,
            }],
            risk_level: RiskLevel::Low,
            allowed_modes: vec!["NORMAL".into(), "ALERT".into()],
            requires_approval: false,
            requires_sandbox: false,
            timeout_seconds: 1,
            rate_limit_per_hour: None,
        }
    }

    fn fixture(def: ToolDefinition, policy: Option<ToolPolicy>, executor: CountingExecutor) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());

        let calls = executor.calls.clone();
        let registry = Arc::new(ToolRegistry::new());
        let name = def.name.clone();
        registry.register(def, Arc::new(executor)).unwrap();

        let mut governance = GovernanceConfig::default();
        if let Some(policy) = policy {
            governance.tools.insert(name, policy);
        }

        let rules = vec![TransitionRule {
            from: Mode::Normal,
            to: Mode::Lockdown,
            conditions: vec![TransitionCondition {
                metric: "never".into(),
                op: Comparator::Ge,
                threshold: f64::MAX,
            }],
            reason: "test".into(),
        }];
        let modes = Arc::new(ModeManager::new(rules, log.clone()));

        let layer = ToolExecutionLayer::new(
            registry,
            Arc::new(governance),
            modes.clone(),
            log,
            None,
        );
        Fixture {
            _dir: dir,
            layer,
            calls,
            modes,
        }
    }

    fn counting(calls: &Arc<AtomicU32>) -> CountingExecutor {
        CountingExecutor {
            calls: calls.clone(),
            delay: Duration::ZERO,
            fail_with: None,
        }
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_raising() {
        let calls = Arc::new(AtomicU32::new(0));
        let fx = fixture(definition("known"), None, counting(&calls));

        let result = fx
            .layer
            .execute_tool("ghost", json!({}), &TraceContext::new_trace())
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("tool 'ghost' not found"));
    }

    #[tokio::test]
    async fn mode_gate_blocks_before_executor() {
        let calls = Arc::new(AtomicU32::new(0));
        let fx = fixture(definition("gated"), None, counting(&calls));
        fx.modes.transition_to(Mode::Lockdown, "test", &[]).unwrap();

        let result = fx
            .layer
            .execute_tool("gated", json!({}), &TraceContext::new_trace())
            .await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("permission denied"));
        assert!(error.contains("LOCKDOWN"));
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_required_argument_fails() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = definition("strict");
        def.parameters[0].required = true;
        def.parameters[0].default = None;
        let fx = fixture(def, None, counting(&calls));

        let result = fx
            .layer
            .execute_tool("strict", json!({}), &TraceContext::new_trace())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("missing required argument 'path'"));
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_type_fails_and_default_substitutes() {
        let calls = Arc::new(AtomicU32::new(0));
        let fx = fixture(definition("typed"), None, counting(&calls));

        let bad = fx
            .layer
            .execute_tool("typed", json!({"path": 42}), &TraceContext::new_trace())
            .await;
        assert!(!bad.success);
        assert!(bad.error.unwrap().contains("expected string"));

        let ok = fx
            .layer
            .execute_tool("typed", json!({}), &TraceContext::new_trace())
            .await;
        assert!(ok.success);
        match ok.output {
            ToolOutput::Json(v) => assert_eq!(v["path"], "/tmp/default"),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[tokio::test]
    async fn forbidden_path_blocks_before_executor() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = ToolPolicy {
            forbidden_paths: vec!["/System/**".into()],
            ..Default::default()
        };
        let fx = fixture(definition("restricted_file_tool"), Some(policy), counting(&calls));

        let result = fx
            .layer
            .execute_tool(
                "restricted_file_tool",
                json!({"path": "/System/Library"}),
                &TraceContext::new_trace(),
            )
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("forbidden"));
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn allowed_paths_require_a_match() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = ToolPolicy {
            allowed_paths: vec!["/tmp/**".into()],
            ..Default::default()
        };
        let fx = fixture(definition("scoped"), Some(policy), counting(&calls));

        let outside = fx
            .layer
            .execute_tool("scoped", json!({"path": "/etc/passwd"}), &TraceContext::new_trace())
            .await;
        assert!(!outside.success);

        let inside = fx
            .layer
            .execute_tool("scoped", json!({"path": "/tmp/notes.txt"}), &TraceContext::new_trace())
            .await;
        assert!(inside.success);
    }

    #[tokio::test]
    async fn timeout_produces_timeout_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = CountingExecutor {
            calls: calls.clone(),
            delay: Duration::from_secs(3),
            fail_with: None,
        };
        let fx = fixture(definition("slow"), None, executor);

        let result = fx
            .layer
            .execute_tool("slow", json!({}), &TraceContext::new_trace())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timeout"));
        assert_eq!(
            result.metadata.get("error_category"),
            Some(&Value::String("timeout".into()))
        );
    }

    #[tokio::test]
    async fn executor_error_is_scrubbed_and_categorized() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = CountingExecutor {
            calls: calls.clone(),
            delay: Duration::ZERO,
            fail_with: Some("connection refused to /var/run/backend.sock".into()),
        };
        let fx = fixture(definition("flaky"), None, executor);

        let result = fx
            .layer
            .execute_tool("flaky", json!({}), &TraceContext::new_trace())
            .await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(!error.contains("/var/run"));
        assert!(error.contains("[path]"));
        assert_eq!(
            result.metadata.get("error_category"),
            Some(&Value::String("connection".into()))
        );
    }

    #[tokio::test]
    async fn rate_limit_admits_up_to_the_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = definition("limited");
        def.rate_limit_per_hour = Some(2);
        let fx = fixture(def, None, counting(&calls));
        let trace = TraceContext::new_trace();

        assert!(fx.layer.execute_tool("limited", json!({}), &trace).await.success);
        assert!(fx.layer.execute_tool("limited", json!({}), &trace).await.success);
        let third = fx.layer.execute_tool("limited", json!({}), &trace).await;
        assert!(!third.success);
        assert!(third.error.unwrap().contains("rate limit"));
        assert_eq!(fx.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn approval_without_broker_is_denied() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut def = definition("dangerous");
        def.requires_approval = true;
        let fx = fixture(def, None, counting(&calls));

        let result = fx
            .layer
            .execute_tool("dangerous", json!({}), &TraceContext::new_trace())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("approval"));
        assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn home_expansion() {
        if dirs::home_dir().is_none() {
            return;
        }
        let expanded = expand_home("$HOME/notes/**");
        assert!(!expanded.starts_with("$HOME"));
        assert!(expanded.ends_with("/notes/**"));
    }
}
