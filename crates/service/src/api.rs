//! HTTP surface: a thin shell over the orchestrator and session manager.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use axon_domain::{Channel, Mode};
use axon_sessions::SessionRepository;
use axon_telemetry::{events, Event};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct ChatParams {
    message: String,
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: String,
    response: String,
    trace_id: String,
}

async fn chat(
    State(state): State<AppState>,
    Query(params): Query<ChatParams>,
) -> (StatusCode, Json<ChatResponse>) {
    let session_id = params
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state.log.emit(
        Event::new(events::REQUEST_RECEIVED, "service")
            .field("session_id", session_id.clone())
            .field("message_chars", params.message.len() as u64),
    );

    let result = state
        .orchestrator
        .handle_user_request(&session_id, &params.message, None, None, None)
        .await;

    state.log.emit(
        Event::new(events::REPLY_READY, "service")
            .trace(&result.trace_id)
            .field("session_id", session_id.clone()),
    );

    (
        StatusCode::OK,
        Json(ChatResponse {
            session_id,
            response: result.reply,
            trace_id: result.trace_id,
        }),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// /sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct SessionCreate {
    mode: Option<String>,
    channel: String,
}

async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<SessionCreate>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let channel = Channel::from_str(&body.channel)
        .ok_or_else(|| bad_request(format!("unknown channel: {}", body.channel)))?;
    let mode = match body.mode {
        Some(raw) => {
            Mode::from_str(&raw).ok_or_else(|| bad_request(format!("unknown mode: {raw}")))?
        }
        None => Mode::Normal,
    };

    let session_id = state
        .sessions
        .create(mode, channel, None)
        .map_err(|e| bad_request(e.to_string()))?;
    let Some(session) = state.sessions.get(&session_id) else {
        return Err(bad_request(format!("session {session_id} vanished")));
    };

    // Best-effort persistence so restarts can hydrate it back.
    if let Err(e) = state.repo.create(&session).await {
        tracing::warn!(session_id, error = %e, "session persistence failed");
    }

    Ok(Json(serde_json::to_value(&session).unwrap_or(json!({}))))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Value> {
    let limit = params.limit.unwrap_or(20);
    let mut sessions = state.sessions.list_active();
    sessions.truncate(limit);
    Json(json!({ "sessions": sessions }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.sessions.get(&id) {
        Some(session) => Ok(Json(serde_json::to_value(&session).unwrap_or(json!({})))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("session {id} not found") })),
        )),
    }
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state.sessions.delete(&id).map_err(|e| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(json!({ "deleted": id })))
}

fn bad_request(message: String) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}
