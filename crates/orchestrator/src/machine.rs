//! The per-turn state machine.
//!
//! `IDLE → ROUTING → MODEL_CALL → TOOL_DISPATCH → MODEL_CALL → … →
//! COMPLETED`, with a lateral edge to FAILED taken by the caller when this
//! returns an error. Tool-call loops are capped; every state change and
//! step is recorded on the execution context.

use serde_json::{json, Value};

use axon_domain::governance::GovernanceConfig;
use axon_domain::{Message, Mode};
use axon_model::{ChatBackend, ModelError, ModelRole};
use axon_telemetry::{events, Event, EventLog, TraceContext};
use axon_tools::{ToolExecutionLayer, ToolRegistry};

use crate::context::{ExecutionContext, TaskState};
use crate::prompts;
use crate::router::{resolve_role, Router};
use crate::window::apply_context_window;

/// Knobs the machine needs from the runtime settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_tool_steps: u32,
    pub max_context_tokens: usize,
    pub context_reserved_tokens: usize,
    pub router_role: String,
    pub enable_reasoning_role: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_steps: 5,
            max_context_tokens: 8192,
            context_reserved_tokens: 4500,
            router_role: "ROUTER".into(),
            enable_reasoning_role: true,
        }
    }
}

pub struct TurnDeps<'a> {
    pub backend: &'a dyn ChatBackend,
    pub tools: &'a ToolExecutionLayer,
    pub registry: &'a ToolRegistry,
    pub governance: &'a GovernanceConfig,
    pub router: &'a Router,
    pub log: &'a EventLog,
    pub config: &'a OrchestratorConfig,
}

const FALLBACK_REPLY: &str = "I wasn't able to produce a response. Please try again.";

/// Run one turn against the given conversation history (which already ends
/// with the new user message). Returns the assistant reply; errors are for
/// the caller to convert into a FAILED result.
pub async fn run_task(
    deps: &TurnDeps<'_>,
    ctx: &mut ExecutionContext,
    history: &[Message],
) -> axon_domain::Result<String> {
    let trace = TraceContext::from_id(&ctx.trace_id);

    // ROUTING.
    transition(deps, ctx, TaskState::Routing);
    let plan = deps.router.route(&ctx.user_message, &trace).await;
    let mut role = resolve_role(
        plan.target_role,
        &deps.config.router_role,
        deps.config.enable_reasoning_role,
    );

    // Per-mode model-role constraints can force a downgrade to STANDARD.
    let constraints = deps.governance.constraints_for(ctx.mode);
    if let Some(constraints) = constraints {
        if !constraints.allowed_roles.is_empty()
            && !constraints
                .allowed_roles
                .iter()
                .any(|r| r.eq_ignore_ascii_case(role.as_str()))
        {
            tracing::debug!(role = %role, mode = %ctx.mode, "role constrained by mode, using standard");
            role = ModelRole::Standard;
        }
    }

    ctx.record_step(
        "routing",
        json!({
            "target_role": plan.target_role.as_str(),
            "resolved_role": role.as_str(),
            "confidence": plan.confidence,
            "used_heuristics": plan.used_heuristics,
        }),
    );

    // Model-facing tool descriptors, filtered by the current mode.
    let tools_disabled = constraints.map(|c| c.disable_tools).unwrap_or(false);
    let descriptors = if tools_disabled || !deps.backend.supports_tools(role) {
        None
    } else {
        let descriptors = deps.registry.tool_definitions_for_llm(Some(ctx.mode));
        (!descriptors.is_empty()).then_some(descriptors)
    };

    // Windowed working set: opener prompt plus the session history.
    let budget = constraints
        .and_then(|c| c.max_context_tokens)
        .map(|t| t as usize)
        .unwrap_or(deps.config.max_context_tokens);
    let mut working: Vec<Message> = Vec::with_capacity(history.len() + 1);
    working.push(Message::system(prompts::system_prompt(ctx.channel)));
    working.extend_from_slice(history);
    let mut working = apply_context_window(
        &working,
        budget,
        deps.config.context_reserved_tokens,
        "truncate",
    );

    // MODEL_CALL / TOOL_DISPATCH loop.
    let mut last_content = String::new();
    for step in 0..=deps.config.max_tool_steps {
        transition(deps, ctx, TaskState::ModelCall);
        let response = call_model(deps, role, &working, descriptors.as_deref(), &trace).await?;
        ctx.record_step(
            "llm_call",
            json!({
                "role": role.as_str(),
                "tool_calls": response.tool_calls.len(),
                "content_chars": response.content.len(),
            }),
        );

        if !response.content.is_empty() {
            last_content = response.content.clone();
        }

        if response.tool_calls.is_empty() {
            transition(deps, ctx, TaskState::Completed);
            return Ok(non_empty(last_content));
        }

        if step == deps.config.max_tool_steps {
            tracing::warn!(trace_id = %ctx.trace_id, "tool step cap reached, finishing turn");
            transition(deps, ctx, TaskState::Completed);
            return Ok(non_empty(last_content));
        }

        // TOOL_DISPATCH.
        transition(deps, ctx, TaskState::ToolDispatch);
        if !response.content.is_empty() {
            working.push(Message::assistant(response.content.clone()));
        }
        for call in &response.tool_calls {
            let result = deps
                .tools
                .execute_tool(&call.name, call.arguments.clone(), &trace)
                .await;
            ctx.record_step(
                "tool_call",
                json!({
                    "tool_name": call.name,
                    "success": result.success,
                    "latency_ms": result.latency_ms,
                    "error": result.error,
                }),
            );

            let content = if result.success {
                result.output.render()
            } else {
                format!(
                    "error: {}",
                    result.error.as_deref().unwrap_or("tool failed")
                )
            };
            working.push(Message::tool_result(&call.id, &call.name, content));
        }
    }

    transition(deps, ctx, TaskState::Completed);
    Ok(non_empty(last_content))
}

/// One model call; an unparseable response is retried once without tool
/// descriptors (the simpler prompt shape) before giving up.
async fn call_model(
    deps: &TurnDeps<'_>,
    role: ModelRole,
    messages: &[Message],
    descriptors: Option<&[Value]>,
    trace: &TraceContext,
) -> axon_domain::Result<axon_model::LlmResponse> {
    match deps.backend.respond(role, messages, descriptors, trace).await {
        Ok(response) => Ok(response),
        Err(ModelError::InvalidResponse(detail)) if descriptors.is_some() => {
            tracing::warn!(error = %detail, "invalid model response, retrying without tools");
            deps.backend
                .respond(role, messages, None, trace)
                .await
                .map_err(model_error)
        }
        Err(e) => Err(model_error(e)),
    }
}

fn model_error(e: ModelError) -> axon_domain::Error {
    axon_domain::Error::Model {
        role: "chat".into(),
        message: e.to_string(),
    }
}

fn transition(deps: &TurnDeps<'_>, ctx: &mut ExecutionContext, to: TaskState) {
    if ctx.state == to {
        return;
    }
    deps.log.emit(
        Event::new(events::STATE_TRANSITION, "orchestrator")
            .trace(&ctx.trace_id)
            .field("from", format!("{:?}", ctx.state))
            .field("to", format!("{to:?}")),
    );
    ctx.state = to;
}

fn non_empty(content: String) -> String {
    if content.trim().is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        content
    }
}

/// Mode-dependent hard deadline for one turn.
pub fn turn_deadline(mode: Mode) -> std::time::Duration {
    let secs = match mode {
        Mode::Normal => 120,
        Mode::Alert => 90,
        Mode::Degraded => 60,
        Mode::Lockdown => 30,
        Mode::Recovery => 60,
    };
    std::time::Duration::from_secs(secs)
}
