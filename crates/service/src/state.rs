//! Shared service state.

use std::sync::Arc;

use axon_brainstem::BrainstemScheduler;
use axon_domain::settings::Settings;
use axon_mcp_client::GatewayAdapter;
use axon_orchestrator::Orchestrator;
use axon_sessions::{FileSessionRepository, SessionManager};
use axon_telemetry::EventLog;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionManager>,
    pub repo: Arc<FileSessionRepository>,
    pub scheduler: Arc<BrainstemScheduler>,
    pub gateway: Option<Arc<GatewayAdapter>>,
    pub log: Arc<EventLog>,
}
