use serde::{Deserialize, Serialize};

/// Logical model roles. Each maps to a configured model in `models.yaml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Router,
    Standard,
    Reasoning,
    Coding,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Router => "router",
            ModelRole::Standard => "standard",
            ModelRole::Reasoning => "reasoning",
            ModelRole::Coding => "coding",
        }
    }

    /// Case-insensitive parse; returns `None` for unknown roles.
    pub fn from_str(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "router" => Some(ModelRole::Router),
            "standard" => Some(ModelRole::Standard),
            "reasoning" => Some(ModelRole::Reasoning),
            "coding" => Some(ModelRole::Coding),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(ModelRole::from_str("CODING"), Some(ModelRole::Coding));
        assert_eq!(ModelRole::from_str("Router"), Some(ModelRole::Router));
        assert_eq!(ModelRole::from_str("other"), None);
    }
}
