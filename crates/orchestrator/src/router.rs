//! Deterministic pre-router and role resolution.
//!
//! A precompiled set of case-insensitive pattern groups classifies the
//! user message without any model call. Only when the heuristic confidence
//! falls below the configured floor is the router model consulted; a parse
//! failure there falls back to the heuristic plan.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use axon_domain::Message;
use axon_model::{ChatBackend, ModelRole};
use axon_telemetry::{events, Event, EventLog, TraceContext};

/// The routing decision for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingPlan {
    pub target_role: ModelRole,
    pub confidence: f64,
    pub reason: String,
    pub used_heuristics: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pattern groups
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn coding_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)(?:^|\s)(?:def\s|class\s|import\s|from\s|```.*?```|debug|refactor|implement|fix\s+(?:the\s+)?(?:bug|code)|stack\s+trace|traceback|File\s+".*"|AssertionError|TypeError|diff\s|patch\s|\.patch\b|CI\s+(?:failed|error)|build\s+failed)"#,
        )
        .expect("coding regex")
    })
}

const CODING_KEYWORDS: [&str; 10] = [
    "code review",
    "unit test",
    "write a function",
    "write a class",
    "implement ",
    "refactor ",
    "debug ",
    "bug ",
    "syntax error",
    "lint ",
];

fn tool_intent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:search\s+(?:the\s+)?web|look\s+up|list\s+files|read\s+file|check\s+disk\s+usage|open\s+url|latest\s+news|search\s+internet|web\s+search|find\s+(?:on\s+)?(?:the\s+)?web)",
        )
        .expect("tool intent regex")
    })
}

fn reasoning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:prove|derive|rigorously|deep\s+reasoning|research\s+synthesis|multi-step\s+(?:formal\s+)?analysis|step-by-step\s+proof|formal\s+analysis|careful\s+reasoning)",
        )
        .expect("reasoning regex")
    })
}

/// Run the deterministic classifier (no model call).
pub fn heuristic_routing(user_message: &str) -> RoutingPlan {
    let text = user_message.trim();
    if text.is_empty() {
        return plan(ModelRole::Standard, 0.9, "Empty message, default to STANDARD");
    }

    if coding_re().is_match(text) {
        return plan(
            ModelRole::Coding,
            0.9,
            "Code-related patterns (def/class/import/debug/diff/CI)",
        );
    }
    let lower = text.to_lowercase();
    if CODING_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return plan(ModelRole::Coding, 0.85, "Coding keywords detected");
    }

    if tool_intent_re().is_match(text) {
        return plan(
            ModelRole::Standard,
            0.9,
            "Explicit tool intent (search/list/read/open)",
        );
    }

    if reasoning_re().is_match(text) {
        return plan(
            ModelRole::Reasoning,
            0.85,
            "Deep reasoning / proof / research requested",
        );
    }

    plan(ModelRole::Standard, 0.7, "Default to STANDARD")
}

fn plan(target_role: ModelRole, confidence: f64, reason: &str) -> RoutingPlan {
    RoutingPlan {
        target_role,
        confidence,
        reason: reason.to_string(),
        used_heuristics: true,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Role resolution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Map a requested role to the actual runtime role.
///
/// ROUTER downgrades to STANDARD when aliased; REASONING downgrades to
/// STANDARD when disabled; CODING is never downgraded.
pub fn resolve_role(
    requested: ModelRole,
    router_role: &str,
    enable_reasoning_role: bool,
) -> ModelRole {
    match requested {
        ModelRole::Router if router_role.eq_ignore_ascii_case("STANDARD") => ModelRole::Standard,
        ModelRole::Reasoning if !enable_reasoning_role => ModelRole::Standard,
        other => other,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router (heuristics + optional model consult)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const ROUTER_PROMPT: &str = "You classify user requests for a local agent. \
Respond with ONLY a JSON object: {\"target_role\": \"standard|coding|reasoning\", \
\"confidence\": 0.0-1.0, \"reason\": \"short explanation\"}";

pub struct Router {
    backend: Option<Arc<dyn ChatBackend>>,
    log: Arc<EventLog>,
    confidence_floor: f64,
}

impl Router {
    pub fn new(
        backend: Option<Arc<dyn ChatBackend>>,
        log: Arc<EventLog>,
        confidence_floor: f64,
    ) -> Self {
        Self {
            backend,
            log,
            confidence_floor,
        }
    }

    /// Route one message. Heuristics first; the router model is consulted
    /// only below the confidence floor.
    pub async fn route(&self, user_message: &str, trace: &TraceContext) -> RoutingPlan {
        let heuristic = heuristic_routing(user_message);

        let plan = if heuristic.confidence >= self.confidence_floor {
            self.log.emit(
                Event::new(events::ROUTING_HANDLED, "router")
                    .trace(&trace.trace_id)
                    .field("confidence", heuristic.confidence),
            );
            heuristic
        } else if let Some(backend) = &self.backend {
            self.log.emit(
                Event::new(events::ROUTING_DELEGATION, "router")
                    .trace(&trace.trace_id)
                    .field("heuristic_confidence", heuristic.confidence),
            );
            match self.consult_model(backend.as_ref(), user_message, trace).await {
                Some(llm_plan) => llm_plan,
                None => heuristic,
            }
        } else {
            heuristic
        };

        self.log.emit(
            Event::new(events::ROUTING_DECISION, "router")
                .trace(&trace.trace_id)
                .field("target_role", plan.target_role.as_str())
                .field("confidence", plan.confidence)
                .field("used_heuristics", plan.used_heuristics)
                .field("reason", plan.reason.clone()),
        );
        plan
    }

    async fn consult_model(
        &self,
        backend: &dyn ChatBackend,
        user_message: &str,
        trace: &TraceContext,
    ) -> Option<RoutingPlan> {
        let messages = vec![Message::system(ROUTER_PROMPT), Message::user(user_message)];
        let response = match backend.respond(ModelRole::Router, &messages, None, trace).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, "router model unavailable, keeping heuristic plan");
                return None;
            }
        };

        match parse_router_json(&response.content) {
            Some(plan) => Some(plan),
            None => {
                self.log.emit(
                    Event::new(events::ROUTING_PARSE_ERROR, "router")
                        .trace(&trace.trace_id)
                        .field("content", response.content.chars().take(200).collect::<String>()),
                );
                None
            }
        }
    }
}

/// Parse the router model's JSON decision, tolerating surrounding prose.
fn parse_router_json(content: &str) -> Option<RoutingPlan> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    let value: Value = serde_json::from_str(&content[start..=end]).ok()?;

    let target_role = ModelRole::from_str(value.get("target_role")?.as_str()?)?;
    let confidence = value.get("confidence").and_then(Value::as_f64).unwrap_or(0.5);
    let reason = value
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("router model decision")
        .to_string();

    Some(RoutingPlan {
        target_role,
        confidence: confidence.clamp(0.0, 1.0),
        reason,
        used_heuristics: false,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
