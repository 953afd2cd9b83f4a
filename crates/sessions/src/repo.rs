//! Durable session storage contract and the default file-backed
//! implementation.
//!
//! The relational store is an external collaborator; this module pins its
//! surface (`get`, `create`, `append_message`, `list_recent`) and ships a
//! JSON-file backend good enough for single-node use.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use axon_domain::{Error, Message, Result};

use crate::session::Session;

/// Contract the durable session store must expose.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;
    async fn create(&self, session: &Session) -> Result<()>;
    async fn append_message(&self, session_id: &str, message: Message) -> Result<()>;
    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// File-backed implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One JSON file per session under the given directory.
pub struct FileSessionRepository {
    dir: PathBuf,
    // Serializes read-modify-write cycles on session files.
    io_lock: Mutex<()>,
}

impl FileSessionRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            io_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        // Session ids are UUIDs or caller-chosen tokens; refuse separators.
        let safe: String = session_id
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    fn read_session(&self, session_id: &str) -> Result<Option<Session>> {
        let path = self.path_for(session_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn write_session(&self, session: &Session) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&session.session_id);
        std::fs::write(&path, serde_json::to_string_pretty(session)?)?;
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for FileSessionRepository {
    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let _guard = self.io_lock.lock().await;
        self.read_session(session_id)
    }

    async fn create(&self, session: &Session) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        if self.path_for(&session.session_id).exists() {
            return Err(Error::Session(format!(
                "session {} already exists",
                session.session_id
            )));
        }
        self.write_session(session)
    }

    async fn append_message(&self, session_id: &str, message: Message) -> Result<()> {
        let _guard = self.io_lock.lock().await;
        let mut session = self
            .read_session(session_id)?
            .ok_or_else(|| Error::Session(format!("session {session_id} not found")))?;
        session.messages.push(message);
        session.last_active_at = chrono::Utc::now();
        self.write_session(&session)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Session>> {
        let _guard = self.io_lock.lock().await;
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.dir).into_iter().flatten().flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Ok(raw) = std::fs::read_to_string(&path) {
                    if let Ok(session) = serde_json::from_str::<Session>(&raw) {
                        sessions.push(session);
                    }
                }
            }
        }
        sessions.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        sessions.truncate(limit);
        Ok(sessions)
    }
}
