use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use axon_domain::{Channel, Message, Mode};

/// A single conversation session.
///
/// `messages` is append-only from the caller's view; context-window
/// truncation is a computed projection, never a rewrite of this list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub mode: Mode,
    pub channel: Channel,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, mode: Mode, channel: Channel) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            mode,
            channel,
            messages: Vec::new(),
            metadata: BTreeMap::new(),
            created_at: now,
            last_active_at: now,
        }
    }
}
