//! Service bootstrap.
//!
//! Hydration order is fixed: config → mode manager → registry → gateway →
//! scheduler. Gateway init failure is non-fatal; invalid configuration is.

use std::sync::Arc;

use axon_brainstem::{
    spawn_standard_loops, BrainstemDeps, BrainstemScheduler, ModeManager,
};
use axon_domain::env::load_env_files;
use axon_domain::governance::load_governance;
use axon_domain::models::load_model_config;
use axon_domain::settings::Settings;
use axon_domain::Result;
use axon_journal::{CaptureStore, JournalStore};
use axon_mcp_client::GatewayAdapter;
use axon_model::HttpChatClient;
use axon_orchestrator::{Orchestrator, OrchestratorConfig, Router};
use axon_sessions::{FileSessionRepository, SessionManager};
use axon_telemetry::lifecycle::DataLifecycleManager;
use axon_telemetry::EventLog;
use axon_tools::{default_registry, ToolExecutionLayer};

use crate::state::AppState;

/// Initialize the tracing subscriber from `APP_LOG_LEVEL`.
pub fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_level.to_lowercase()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Load settings after applying the layered `.env` chain.
pub fn load_settings() -> Settings {
    load_env_files(std::path::Path::new("."));
    Settings::from_env()
}

/// Build the fully wired service state.
pub async fn build_state(settings: Settings) -> Result<AppState> {
    // 1. Config. Strictly validated; any failure aborts startup.
    let governance = Arc::new(load_governance(&settings.governance_dir)?);
    let model_config = load_model_config(&settings.model_config_path)?;

    let log = EventLog::new(&settings.telemetry_root);

    // 2. Mode manager.
    let modes = Arc::new(ModeManager::new(
        governance.transition_rules.clone(),
        log.clone(),
    ));

    // 3. Registry with built-in tools.
    let registry = default_registry();

    // 4. External tool gateway (optional, non-fatal).
    let gateway = if settings.gateway_enabled && !settings.gateway_command.is_empty() {
        let adapter = Arc::new(GatewayAdapter::new(
            registry.clone(),
            governance.clone(),
            log.clone(),
            settings.governance_dir.join("gateway-tools.yaml"),
        ));
        adapter
            .initialize(&settings.gateway_command, settings.gateway_init_timeout)
            .await;
        Some(adapter)
    } else {
        None
    };

    let tools = Arc::new(ToolExecutionLayer::new(
        registry,
        governance.clone(),
        modes.clone(),
        log.clone(),
        None,
    ));

    let backend = Arc::new(HttpChatClient::new(
        model_config,
        settings.llm_base_url.clone(),
        settings.llm_api_key.clone(),
        log.clone(),
    ));

    let sessions = Arc::new(SessionManager::new(log.clone()));
    let repo = Arc::new(FileSessionRepository::new(
        settings.telemetry_root.join("sessions"),
    ));
    let captures = Arc::new(CaptureStore::new(&settings.telemetry_root));
    let journal = Arc::new(JournalStore::new(&settings.telemetry_root, log.clone()));

    let router = Router::new(
        Some(backend.clone()),
        log.clone(),
        settings.router_confidence_floor,
    );

    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        Some(repo.clone()),
        backend,
        tools,
        governance.clone(),
        modes.clone(),
        captures,
        log.clone(),
        router,
        OrchestratorConfig {
            max_tool_steps: settings.max_tool_steps,
            context_reserved_tokens: settings.context_reserved_tokens as usize,
            router_role: settings.router_role.clone(),
            enable_reasoning_role: settings.enable_reasoning_role,
            ..OrchestratorConfig::default()
        },
    ));

    // 5. Scheduler. Loops whose collaborators are absent (graph store,
    // analytics backend, extractor) stay unregistered.
    let scheduler = Arc::new(BrainstemScheduler::new());
    let lifecycle = Arc::new(DataLifecycleManager::new(
        settings.telemetry_root.clone(),
        log.clone(),
        None,
    ));
    spawn_standard_loops(
        &scheduler,
        &settings,
        BrainstemDeps {
            log: log.clone(),
            mode_manager: modes,
            journal,
            consolidator: None,
            quality: None,
            optimizer: None,
            insights: None,
            lifecycle: Some(lifecycle),
        },
    );

    tracing::info!(port = settings.service_port, "service state ready");

    Ok(AppState {
        settings: Arc::new(settings),
        orchestrator,
        sessions,
        repo,
        scheduler,
        gateway,
        log,
    })
}

/// Graceful shutdown: stop loops, then the gateway.
pub async fn shutdown(state: &AppState) {
    state
        .scheduler
        .stop(std::time::Duration::from_secs(10))
        .await;
    if let Some(gateway) = &state.gateway {
        gateway.shutdown().await;
    }
    tracing::info!("service stopped");
}
