use serde::{Deserialize, Serialize};

/// Interaction class for a session.
///
/// Channels bias routing defaults and which tools are considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    /// General conversation, Q&A, research.
    Chat,
    /// Coding questions and tasks.
    CodeTask,
    /// System health checks and diagnostics.
    SystemHealth,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Chat => "CHAT",
            Channel::CodeTask => "CODE_TASK",
            Channel::SystemHealth => "SYSTEM_HEALTH",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "CHAT" => Some(Channel::Chat),
            "CODE_TASK" => Some(Channel::CodeTask),
            "SYSTEM_HEALTH" => Some(Channel::SystemHealth),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
