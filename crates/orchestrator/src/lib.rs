//! The orchestrator: per-turn control flow from request to reply.
//!
//! Routing, model calls, gated tool dispatch, context windowing, trace
//! emission, session persistence, and the post-turn capture all meet here.

pub mod context;
pub mod machine;
pub mod orchestrator;
pub mod prompts;
pub mod router;
pub mod sanitize_reply;
pub mod window;

pub use context::{ExecutionContext, OrchestratorResult, StepRecord, TaskState};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use router::{heuristic_routing, resolve_role, Router, RoutingPlan};
pub use window::apply_context_window;
