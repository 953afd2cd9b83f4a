use serde::{Deserialize, Serialize};

/// Operational posture of the runtime.
///
/// Modes gate which tools and model roles are permissible. A process starts
/// in `Normal`; all transitions go through the mode manager and never decay
/// spontaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    Normal,
    Alert,
    Degraded,
    Lockdown,
    Recovery,
}

impl Mode {
    /// The governance-file spelling of this mode (`"NORMAL"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "NORMAL",
            Mode::Alert => "ALERT",
            Mode::Degraded => "DEGRADED",
            Mode::Lockdown => "LOCKDOWN",
            Mode::Recovery => "RECOVERY",
        }
    }

    /// Parse the governance-file spelling (case-insensitive).
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "NORMAL" => Some(Mode::Normal),
            "ALERT" => Some(Mode::Alert),
            "DEGRADED" => Some(Mode::Degraded),
            "LOCKDOWN" => Some(Mode::Lockdown),
            "RECOVERY" => Some(Mode::Recovery),
            _ => None,
        }
    }

    /// All modes, in severity order.
    pub fn all() -> [Mode; 5] {
        [
            Mode::Normal,
            Mode::Alert,
            Mode::Degraded,
            Mode::Lockdown,
            Mode::Recovery,
        ]
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
