//! Runtime settings resolved from the process environment.
//!
//! `Settings::from_env` reads `AXON_*` variables after the layered `.env`
//! chain has been applied. Everything has a default so a bare checkout can
//! boot; the governance and model files are still validated strictly.

use std::path::PathBuf;
use std::time::Duration;

use crate::env::{detect_environment, Environment};

#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: Environment,
    pub log_level: String,

    // Service
    pub service_host: String,
    pub service_port: u16,

    // Config file locations
    pub governance_dir: PathBuf,
    pub model_config_path: PathBuf,
    pub telemetry_root: PathBuf,

    // Model backend
    pub llm_base_url: String,
    pub llm_api_key: Option<String>,

    // Routing
    pub router_confidence_floor: f64,
    /// When set to `"STANDARD"`, the ROUTER role is aliased to STANDARD.
    pub router_role: String,
    pub enable_reasoning_role: bool,

    // Orchestrator
    pub max_tool_steps: u32,
    pub context_reserved_tokens: u32,

    // External tool gateway
    pub gateway_enabled: bool,
    pub gateway_command: Vec<String>,
    pub gateway_init_timeout: Duration,

    // Brainstem loops
    pub sensor_poll_interval: Duration,
    pub consolidation_enabled: bool,
    pub consolidation_interval: Duration,
    pub quality_monitor_enabled: bool,
    pub quality_monitor_interval: Duration,
    pub optimizer_enabled: bool,
    pub optimizer_interval: Duration,
    pub insights_enabled: bool,
    pub insights_interval: Duration,
    pub lifecycle_enabled: bool,
    pub lifecycle_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "INFO".into(),
            service_host: "127.0.0.1".into(),
            service_port: 8700,
            governance_dir: PathBuf::from("config/governance"),
            model_config_path: PathBuf::from("config/models.yaml"),
            telemetry_root: PathBuf::from("telemetry"),
            llm_base_url: "http://127.0.0.1:1234/v1".into(),
            llm_api_key: None,
            router_confidence_floor: 0.8,
            router_role: "ROUTER".into(),
            enable_reasoning_role: true,
            max_tool_steps: 5,
            context_reserved_tokens: 4500,
            gateway_enabled: false,
            gateway_command: Vec::new(),
            gateway_init_timeout: Duration::from_secs(30),
            sensor_poll_interval: Duration::from_secs(30),
            consolidation_enabled: true,
            consolidation_interval: Duration::from_secs(900),
            quality_monitor_enabled: true,
            quality_monitor_interval: Duration::from_secs(3600),
            optimizer_enabled: true,
            optimizer_interval: Duration::from_secs(6 * 3600),
            insights_enabled: true,
            insights_interval: Duration::from_secs(6 * 3600),
            lifecycle_enabled: true,
            lifecycle_interval: Duration::from_secs(24 * 3600),
        }
    }
}

impl Settings {
    /// Build settings from the current process environment.
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Self {
            environment: detect_environment(),
            log_level: env_str("APP_LOG_LEVEL", &defaults.log_level),
            service_host: env_str("AXON_SERVICE_HOST", &defaults.service_host),
            service_port: env_parse("AXON_SERVICE_PORT", defaults.service_port),
            governance_dir: PathBuf::from(env_str(
                "AXON_GOVERNANCE_DIR",
                &defaults.governance_dir.to_string_lossy(),
            )),
            model_config_path: PathBuf::from(env_str(
                "AXON_MODEL_CONFIG",
                &defaults.model_config_path.to_string_lossy(),
            )),
            telemetry_root: PathBuf::from(env_str(
                "AXON_TELEMETRY_ROOT",
                &defaults.telemetry_root.to_string_lossy(),
            )),
            llm_base_url: env_str("AXON_LLM_BASE_URL", &defaults.llm_base_url),
            llm_api_key: std::env::var("AXON_LLM_API_KEY").ok().filter(|s| !s.is_empty()),
            router_confidence_floor: env_parse(
                "AXON_ROUTER_CONFIDENCE_FLOOR",
                defaults.router_confidence_floor,
            ),
            router_role: env_str("AXON_ROUTER_ROLE", &defaults.router_role),
            enable_reasoning_role: env_parse(
                "AXON_ENABLE_REASONING_ROLE",
                defaults.enable_reasoning_role,
            ),
            max_tool_steps: env_parse("AXON_MAX_TOOL_STEPS", defaults.max_tool_steps),
            context_reserved_tokens: env_parse(
                "AXON_CONTEXT_RESERVED_TOKENS",
                defaults.context_reserved_tokens,
            ),
            gateway_enabled: env_parse("AXON_GATEWAY_ENABLED", defaults.gateway_enabled),
            gateway_command: std::env::var("AXON_GATEWAY_COMMAND")
                .map(|raw| raw.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            gateway_init_timeout: Duration::from_secs(env_parse(
                "AXON_GATEWAY_INIT_TIMEOUT_SECONDS",
                defaults.gateway_init_timeout.as_secs(),
            )),
            sensor_poll_interval: Duration::from_secs(env_parse(
                "AXON_SENSOR_POLL_SECONDS",
                defaults.sensor_poll_interval.as_secs(),
            )),
            consolidation_enabled: env_parse(
                "AXON_CONSOLIDATION_ENABLED",
                defaults.consolidation_enabled,
            ),
            consolidation_interval: Duration::from_secs(env_parse(
                "AXON_CONSOLIDATION_SECONDS",
                defaults.consolidation_interval.as_secs(),
            )),
            quality_monitor_enabled: env_parse(
                "AXON_QUALITY_MONITOR_ENABLED",
                defaults.quality_monitor_enabled,
            ),
            quality_monitor_interval: Duration::from_secs(env_parse(
                "AXON_QUALITY_MONITOR_SECONDS",
                defaults.quality_monitor_interval.as_secs(),
            )),
            optimizer_enabled: env_parse("AXON_OPTIMIZER_ENABLED", defaults.optimizer_enabled),
            optimizer_interval: Duration::from_secs(env_parse(
                "AXON_OPTIMIZER_SECONDS",
                defaults.optimizer_interval.as_secs(),
            )),
            insights_enabled: env_parse("AXON_INSIGHTS_ENABLED", defaults.insights_enabled),
            insights_interval: Duration::from_secs(env_parse(
                "AXON_INSIGHTS_SECONDS",
                defaults.insights_interval.as_secs(),
            )),
            lifecycle_enabled: env_parse("AXON_LIFECYCLE_ENABLED", defaults.lifecycle_enabled),
            lifecycle_interval: Duration::from_secs(env_parse(
                "AXON_LIFECYCLE_SECONDS",
                defaults.lifecycle_interval.as_secs(),
            )),
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|s| !s.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.max_tool_steps, 5);
        assert_eq!(s.router_confidence_floor, 0.8);
        assert!(!s.gateway_enabled);
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("AXON_TEST_PARSE_FALLBACK", "not-a-number");
        assert_eq!(env_parse("AXON_TEST_PARSE_FALLBACK", 7u32), 7);
        std::env::remove_var("AXON_TEST_PARSE_FALLBACK");
    }
}
