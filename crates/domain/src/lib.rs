//! Shared domain types for the Axon runtime.
//!
//! Everything that crosses a crate boundary lives here: the common error
//! type, chat messages, tool definitions and results, operational modes,
//! channels, and the validated governance/model/runtime configuration.

pub mod channel;
pub mod env;
pub mod error;
pub mod governance;
pub mod message;
pub mod mode;
pub mod models;
pub mod settings;
pub mod tool;

pub use channel::Channel;
pub use error::{Error, Result};
pub use message::{Message, Role, ToolCall};
pub use mode::Mode;
pub use tool::{ParamType, RiskLevel, ToolDefinition, ToolOutput, ToolParameter, ToolResult};
