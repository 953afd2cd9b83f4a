//! Model configuration (`models.yaml` top-level `models:` section).
//!
//! Maps logical model roles (router, standard, reasoning, coding) to
//! concrete model ids, endpoints and limits.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a single model role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Backend model identifier (e.g. `"qwen/qwen3-4b-thinking-2507"`).
    pub id: String,
    /// Optional base URL override; falls back to the runtime default.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub context_length: u32,
    pub quantization: String,
    pub max_concurrency: u32,
    /// Default request timeout in seconds.
    pub default_timeout: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Whether the backend supports native function calling. When false,
    /// tools are never passed; the model may still emit embedded
    /// `[TOOL_REQUEST]` blocks.
    #[serde(default = "default_true")]
    pub supports_function_calling: bool,
}

fn default_true() -> bool {
    true
}

/// The validated `models.yaml` contents.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelConfig {
    #[serde(default)]
    pub models: BTreeMap<String, ModelDefinition>,
}

impl ModelConfig {
    pub fn role(&self, role: &str) -> Option<&ModelDefinition> {
        self.models.get(role)
    }
}

/// Load and validate `models.yaml`.
pub fn load_model_config(path: &Path) -> Result<ModelConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("model config file not found: {}: {e}", path.display()))
    })?;

    let config: ModelConfig = serde_yaml::from_str(&raw)
        .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

    let mut errors = Vec::new();
    for (role, def) in &config.models {
        if def.id.trim().is_empty() {
            errors.push(format!("models.{role}.id: must not be empty"));
        }
        if def.context_length == 0 {
            errors.push(format!("models.{role}.context_length: must be >= 1"));
        }
        if def.max_concurrency == 0 {
            errors.push(format!("models.{role}.max_concurrency: must be >= 1"));
        }
        if def.default_timeout == 0 {
            errors.push(format!("models.{role}.default_timeout: must be >= 1"));
        }
        if let Some(t) = def.temperature {
            if !(0.0..=2.0).contains(&t) {
                errors.push(format!("models.{role}.temperature: out of range [0, 2]"));
            }
        }
    }
    if !errors.is_empty() {
        return Err(Error::Config(format!(
            "model configuration validation failed:\n{}",
            errors.join("\n")
        )));
    }

    tracing::info!(models = config.models.len(), "model config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(
            &path,
            r#"
models:
  router:
    id: qwen/qwen3-4b-thinking-2507
    context_length: 32768
    quantization: 8bit
    max_concurrency: 2
    default_timeout: 30
  coding:
    id: qwen/qwen2.5-coder-14b
    context_length: 65536
    quantization: 4bit
    max_concurrency: 1
    default_timeout: 120
    temperature: 0.2
    supports_function_calling: false
"#,
        )
        .unwrap();

        let config = load_model_config(&path).unwrap();
        assert_eq!(config.models.len(), 2);
        let coding = config.role("coding").unwrap();
        assert!(!coding.supports_function_calling);
        assert_eq!(coding.temperature, Some(0.2));
        // Unset defaults to true.
        assert!(config.role("router").unwrap().supports_function_calling);
    }

    #[test]
    fn validation_errors_are_role_qualified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.yaml");
        std::fs::write(
            &path,
            r#"
models:
  router:
    id: ""
    context_length: 0
    quantization: 8bit
    max_concurrency: 1
    default_timeout: 30
"#,
        )
        .unwrap();

        let msg = load_model_config(&path).unwrap_err().to_string();
        assert!(msg.contains("models.router.id"));
        assert!(msg.contains("models.router.context_length"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = load_model_config(Path::new("/nope/models.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
