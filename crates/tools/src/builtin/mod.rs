//! Built-in tools: filesystem reads and the system metrics snapshot.

use std::sync::Arc;

use axon_domain::ToolDefinition;

use crate::registry::ToolExecutor;

pub mod list_directory;
pub mod read_file;
pub mod system_metrics;

/// The built-in tool set as `(definition, executor)` pairs.
pub fn builtin_tools() -> Vec<(ToolDefinition, Arc<dyn ToolExecutor>)> {
    vec![
        (read_file::definition(), Arc::new(read_file::ReadFile)),
        (
            list_directory::definition(),
            Arc::new(list_directory::ListDirectory),
        ),
        (
            system_metrics::definition(),
            Arc::new(system_metrics::SystemMetricsSnapshot),
        ),
    ]
}
