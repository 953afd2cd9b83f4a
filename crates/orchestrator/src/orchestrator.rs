//! Public orchestrator API.
//!
//! `handle_user_request` is the single entry point for a user turn: it
//! serializes turns per session, hydrates session state from the
//! repository, runs the state machine under a mode-dependent deadline,
//! always returns a non-empty reply with a trace id, and fires the
//! post-turn capture.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use axon_domain::governance::GovernanceConfig;
use axon_domain::{Channel, Message, Mode};
use axon_brainstem::ModeManager;
use axon_journal::{CaptureStore, Outcome, TaskCapture};
use axon_model::ChatBackend;
use axon_sessions::{SessionLockMap, SessionManager, SessionRepository};
use axon_telemetry::{events, Event, EventLog, RequestTimer, TraceContext};
use axon_tools::ToolExecutionLayer;

use crate::context::{ExecutionContext, OrchestratorResult, TaskState};
use crate::machine::{self, TurnDeps};
use crate::router::Router;
use crate::sanitize_reply;

pub use crate::machine::OrchestratorConfig;

pub struct Orchestrator {
    sessions: Arc<SessionManager>,
    locks: SessionLockMap,
    repo: Option<Arc<dyn SessionRepository>>,
    backend: Arc<dyn ChatBackend>,
    tools: Arc<ToolExecutionLayer>,
    governance: Arc<GovernanceConfig>,
    modes: Arc<ModeManager>,
    captures: Arc<CaptureStore>,
    log: Arc<EventLog>,
    router: Router,
    config: OrchestratorConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionManager>,
        repo: Option<Arc<dyn SessionRepository>>,
        backend: Arc<dyn ChatBackend>,
        tools: Arc<ToolExecutionLayer>,
        governance: Arc<GovernanceConfig>,
        modes: Arc<ModeManager>,
        captures: Arc<CaptureStore>,
        log: Arc<EventLog>,
        router: Router,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            sessions,
            locks: SessionLockMap::new(),
            repo,
            backend,
            tools,
            governance,
            modes,
            captures,
            log,
            router,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Handle a single user turn end to end.
    pub async fn handle_user_request(
        &self,
        session_id: &str,
        user_message: &str,
        mode: Option<Mode>,
        channel: Option<Channel>,
        trace_id: Option<String>,
    ) -> OrchestratorResult {
        // Per-session serialization: a second turn on the same session
        // waits for the first to finish and observes its writes.
        let _permit = match self.locks.acquire(session_id).await {
            Ok(permit) => permit,
            Err(busy) => {
                return failed_result(
                    session_id,
                    trace_id.unwrap_or_else(|| TraceContext::new_trace().trace_id),
                    busy.to_string(),
                )
            }
        };

        let mode = mode.unwrap_or_else(|| self.modes.current_mode());
        let channel = channel.unwrap_or(Channel::Chat);
        let trace = match trace_id {
            Some(id) => TraceContext::from_id(id),
            None => TraceContext::new_trace(),
        };

        self.ensure_session(session_id, mode, channel).await;
        let _ = self
            .sessions
            .append_message(session_id, Message::user(user_message));

        let mut ctx = ExecutionContext::new(session_id, &trace.trace_id, user_message, mode, channel);
        let mut timer = RequestTimer::new(&trace.trace_id);

        self.log.emit(
            Event::new(events::TASK_STARTED, "orchestrator")
                .trace(&ctx.trace_id)
                .field("session_id", session_id)
                .field("channel", channel.as_str())
                .field("mode", mode.as_str()),
        );

        let history = self
            .sessions
            .get(session_id)
            .map(|s| s.messages)
            .unwrap_or_default();

        let deps = TurnDeps {
            backend: self.backend.as_ref(),
            tools: self.tools.as_ref(),
            registry: self.tools.registry().as_ref(),
            governance: self.governance.as_ref(),
            router: &self.router,
            log: self.log.as_ref(),
            config: &self.config,
        };

        timer.start_span("turn");
        let deadline = machine::turn_deadline(mode);
        let outcome_reply =
            tokio::time::timeout(deadline, machine::run_task(&deps, &mut ctx, &history)).await;
        timer.end_span("turn", Default::default());

        let (reply, outcome) = match outcome_reply {
            Ok(Ok(reply)) => {
                self.log.emit(
                    Event::new(events::TASK_COMPLETED, "orchestrator")
                        .trace(&ctx.trace_id)
                        .field("duration_ms", timer.total_ms())
                        .field("steps", ctx.steps.len() as u64),
                );
                (reply, Outcome::Completed)
            }
            Ok(Err(e)) => {
                ctx.state = TaskState::Failed;
                ctx.error = Some(e.to_string());
                self.log.emit(
                    Event::new(events::TASK_FAILED, "orchestrator")
                        .trace(&ctx.trace_id)
                        .field("error", sanitize_reply::scrubbed(&e.to_string())),
                );
                (sanitize_reply::for_error(&e.to_string()), Outcome::Failed)
            }
            Err(_) => {
                ctx.state = TaskState::Failed;
                ctx.error = Some(format!("turn exceeded {}s deadline", deadline.as_secs()));
                self.log.emit(
                    Event::new(events::TASK_FAILED, "orchestrator")
                        .trace(&ctx.trace_id)
                        .field("error", "deadline exceeded"),
                );
                (
                    "The request took too long to process. Please try again with a simpler request."
                        .to_string(),
                    Outcome::Timeout,
                )
            }
        };

        // The assistant turn lands in the session regardless of outcome.
        let _ = self
            .sessions
            .append_message(session_id, Message::assistant(reply.clone()));
        self.persist_turn(session_id, user_message, &reply).await;

        self.write_capture(&ctx, &reply, &timer, outcome);

        OrchestratorResult {
            reply,
            trace_id: ctx.trace_id.clone(),
            session_id: session_id.to_string(),
            steps: ctx.steps,
            outcome,
        }
    }

    /// Hydrate the session from the repository, or create it fresh.
    async fn ensure_session(&self, session_id: &str, mode: Mode, channel: Channel) {
        if self.sessions.contains(session_id) {
            return;
        }
        if let Some(repo) = &self.repo {
            match self.sessions.hydrate(session_id, repo.as_ref()).await {
                Ok(true) => return,
                Ok(false) => {}
                Err(e) => tracing::warn!(session_id, error = %e, "session hydration failed"),
            }
        }
        if let Err(e) = self
            .sessions
            .create(mode, channel, Some(session_id.to_string()))
        {
            // A concurrent creator beat us to it; that's fine.
            tracing::debug!(session_id, error = %e, "session create raced");
        }
        if let Some(repo) = &self.repo {
            if let Some(session) = self.sessions.get(session_id) {
                if let Err(e) = repo.create(&session).await {
                    tracing::debug!(session_id, error = %e, "repository create skipped");
                }
            }
        }
    }

    /// Best-effort repository append of the two turn messages.
    async fn persist_turn(&self, session_id: &str, user_message: &str, reply: &str) {
        let Some(repo) = &self.repo else {
            return;
        };
        for message in [Message::user(user_message), Message::assistant(reply)] {
            if let Err(e) = repo.append_message(session_id, message).await {
                tracing::warn!(session_id, error = %e, "repository append failed");
                break;
            }
        }
    }

    fn write_capture(
        &self,
        ctx: &ExecutionContext,
        reply: &str,
        timer: &RequestTimer,
        outcome: Outcome,
    ) {
        let capture = TaskCapture {
            trace_id: ctx.trace_id.clone(),
            session_id: ctx.session_id.clone(),
            timestamp: Utc::now(),
            user_message: ctx.user_message.clone(),
            assistant_response: Some(reply.to_string()),
            steps: ctx
                .steps
                .iter()
                .map(|s| serde_json::to_value(s).unwrap_or(json!({})))
                .collect(),
            tools_used: ctx.tools_used(),
            duration_ms: Some(timer.total_ms()),
            metrics_summary: Some(json!({ "timing": timer.to_breakdown() })),
            outcome,
        };
        if let Err(e) = self.captures.write(&capture) {
            tracing::warn!(trace_id = %ctx.trace_id, error = %e, "capture write failed");
        }
    }
}

fn failed_result(session_id: &str, trace_id: String, error: String) -> OrchestratorResult {
    OrchestratorResult {
        reply: sanitize_reply::for_error(&error),
        trace_id,
        session_id: session_id.to_string(),
        steps: Vec::new(),
        outcome: Outcome::Failed,
    }
}
