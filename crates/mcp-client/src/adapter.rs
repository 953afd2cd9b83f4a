//! Gateway discovery and registration.
//!
//! Bridges the gateway client into the tool registry: discovered tools are
//! converted to definitions (prefixed `mcp_`), governance overlay entries
//! are auto-appended for tools that have none, and each tool gets an
//! executor that forwards to the persistent gateway session.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use axon_domain::governance::{GovernanceConfig, ToolPolicy};
use axon_domain::{Error, Result, ToolDefinition, ToolOutput};
use axon_telemetry::{events, Event, EventLog};
use axon_tools::{ToolExecutor, ToolRegistry};

use crate::convert::mcp_tool_to_definition;
use crate::transport::GatewayClient;

pub struct GatewayAdapter {
    registry: Arc<ToolRegistry>,
    governance: Arc<GovernanceConfig>,
    log: Arc<EventLog>,
    overlay_path: PathBuf,
    client: Mutex<Option<Arc<GatewayClient>>>,
    tool_names: Mutex<Vec<String>>,
}

impl GatewayAdapter {
    pub fn new(
        registry: Arc<ToolRegistry>,
        governance: Arc<GovernanceConfig>,
        log: Arc<EventLog>,
        overlay_path: PathBuf,
    ) -> Self {
        Self {
            registry,
            governance,
            log,
            overlay_path,
            client: Mutex::new(None),
            tool_names: Mutex::new(Vec::new()),
        }
    }

    /// Launch the gateway, run the handshake, and register discovered
    /// tools. Failure is not fatal: the adapter stays disabled and the
    /// agent continues with built-in tools only.
    pub async fn initialize(&self, argv: &[String], init_timeout: Duration) -> bool {
        let client = match GatewayClient::spawn(argv, Duration::from_secs(30)) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                self.init_failed(&e.to_string());
                return false;
            }
        };

        if let Err(e) = client.initialize(init_timeout).await {
            self.init_failed(&e.to_string());
            client.shutdown().await;
            return false;
        }

        let tools = match client.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                self.init_failed(&e.to_string());
                client.shutdown().await;
                return false;
            }
        };

        let mut registered = Vec::new();
        for tool in &tools {
            let prefixed = format!("mcp_{}", tool.name);
            let description_override = self
                .governance
                .tool_policy(&prefixed)
                .and_then(|p| p.description_override.as_deref());

            let def = mcp_tool_to_definition(tool, description_override);
            if let Err(e) = self.ensure_governance_entry(&def) {
                tracing::warn!(tool = %def.name, error = %e, "governance overlay append failed");
            }

            let executor = GatewayToolExecutor {
                client: client.clone(),
                tool_name: tool.name.clone(),
            };
            match self.registry.register(def.clone(), Arc::new(executor)) {
                Ok(()) => {
                    self.log.emit(
                        Event::new(events::GATEWAY_TOOL_DISCOVERED, "gateway")
                            .field("tool_name", def.name.clone())
                            .field("risk_level", serde_json::to_value(def.risk_level).unwrap_or(Value::Null)),
                    );
                    registered.push(def.name);
                }
                Err(e) => {
                    tracing::warn!(tool = %def.name, error = %e, "gateway tool registration failed");
                }
            }
        }

        self.log.emit(
            Event::new(events::GATEWAY_STARTED, "gateway")
                .field("tools_count", registered.len() as u64),
        );
        tracing::info!(tools = registered.len(), "gateway initialized");

        *self.client.lock() = Some(client);
        *self.tool_names.lock() = registered;
        true
    }

    pub fn enabled(&self) -> bool {
        self.client.lock().is_some()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tool_names.lock().clone()
    }

    /// Shut the gateway down and emit the stop event.
    pub async fn shutdown(&self) {
        let client = self.client.lock().take();
        if let Some(client) = client {
            client.shutdown().await;
            self.log.emit(Event::new(events::GATEWAY_STOPPED, "gateway"));
        }
    }

    fn init_failed(&self, error: &str) {
        tracing::warn!(error, "gateway init failed, continuing with built-in tools");
        self.log.emit(
            Event::new(events::GATEWAY_INIT_FAILED, "gateway").field("error", error),
        );
    }

    /// Idempotently append a governance entry for a discovered tool to the
    /// overlay file when neither the main config nor the overlay has one.
    fn ensure_governance_entry(&self, def: &ToolDefinition) -> Result<()> {
        if self.governance.tool_policy(&def.name).is_some() {
            return Ok(());
        }

        let mut overlay: GovernanceOverlay = match std::fs::read_to_string(&self.overlay_path) {
            Ok(raw) => serde_yaml::from_str(&raw).unwrap_or_default(),
            Err(_) => GovernanceOverlay::default(),
        };
        if overlay.tools.contains_key(&def.name) {
            return Ok(());
        }

        overlay.tools.insert(
            def.name.clone(),
            ToolPolicy {
                category: def.category.clone(),
                allowed_in_modes: def.allowed_modes.clone(),
                requires_approval: def.requires_approval,
                ..Default::default()
            },
        );

        if let Some(parent) = self.overlay_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.overlay_path, serde_yaml::to_string(&overlay)?)?;

        self.log.emit(
            Event::new(events::GATEWAY_TOOL_GOVERNANCE_ADDED, "gateway")
                .field("tool_name", def.name.clone()),
        );
        Ok(())
    }
}

/// The overlay file layout: a `tools:` map mirroring `tools.yaml`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct GovernanceOverlay {
    #[serde(default)]
    tools: BTreeMap<String, ToolPolicy>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor bridge
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Forwards one registry tool to the gateway session.
struct GatewayToolExecutor {
    client: Arc<GatewayClient>,
    tool_name: String,
}

#[async_trait]
impl ToolExecutor for GatewayToolExecutor {
    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        if !self.client.is_alive() {
            return Err(Error::Gateway("gateway is not connected".into()));
        }
        let result = self
            .client
            .call_tool(&self.tool_name, args)
            .await
            .map_err(|e| Error::Gateway(e.to_string()))?;

        if result.is_error {
            return Err(Error::Gateway(result.text()));
        }
        // Gateway replies are text content; passed through uncoerced.
        Ok(ToolOutput::Text(result.text()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
