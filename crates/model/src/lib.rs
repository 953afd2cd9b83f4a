//! Model backend access: logical roles, the chat-completions HTTP client,
//! embedded tool-call parsing, and the cost ledger.

pub mod client;
pub mod cost;
pub mod error;
pub mod parser;
pub mod response;
pub mod role;

pub use client::{ChatBackend, HttpChatClient};
pub use cost::{CostLedger, CostRow};
pub use error::ModelError;
pub use parser::parse_text_tool_calls;
pub use response::{LlmResponse, Usage};
pub use role::ModelRole;
