//! The tool layer: registry, governed execution, approvals, and the
//! built-in tool set.

pub mod approval;
pub mod builtin;
pub mod executor;
pub mod registry;
pub mod sanitize;

pub use approval::{ApprovalBroker, ApprovalDecision};
pub use executor::ToolExecutionLayer;
pub use registry::{ToolExecutor, ToolRegistry};

use std::sync::Arc;

/// Register the built-in tool set.
pub fn register_builtin_tools(registry: &ToolRegistry) {
    for (def, executor) in builtin::builtin_tools() {
        if let Err(e) = registry.register(def, executor) {
            tracing::warn!(error = %e, "builtin tool registration failed");
        }
    }
}

/// Convenience: a fresh registry with builtins installed.
pub fn default_registry() -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(&registry);
    registry
}
