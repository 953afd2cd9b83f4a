//! In-memory session manager.
//!
//! The manager is the only writer of session state; readers get cloned
//! snapshots. Durable storage is delegated to a [`SessionRepository`]
//! collaborator, from which unknown sessions are hydrated on first touch.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use axon_domain::{Channel, Error, Message, Mode, Result};
use axon_telemetry::{events, Event, EventLog};

use crate::repo::SessionRepository;
use crate::session::Session;

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    log: Arc<EventLog>,
}

impl SessionManager {
    pub fn new(log: Arc<EventLog>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            log,
        }
    }

    /// Create a new session and return its id (fresh UUIDv4 when omitted).
    /// Fails if the id collides with an existing session.
    pub fn create(
        &self,
        mode: Mode,
        channel: Channel,
        session_id: Option<String>,
    ) -> Result<String> {
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session_id) {
            return Err(Error::Session(format!(
                "session {session_id} already exists"
            )));
        }
        sessions.insert(session_id.clone(), Session::new(&session_id, mode, channel));
        drop(sessions);

        self.log.emit(
            Event::new(events::SESSION_CREATED, "sessions")
                .field("session_id", session_id.clone())
                .field("channel", channel.as_str())
                .field("mode", mode.as_str()),
        );
        Ok(session_id)
    }

    /// Snapshot a session, touching `last_active_at`.
    pub fn get(&self, session_id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(session_id)?;
        session.last_active_at = Utc::now();
        Some(session.clone())
    }

    /// Whether the session is present in memory (no timestamp touch).
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Replace the message list (full replace, not append) and touch the
    /// timestamp. `None` messages only touches the timestamp.
    pub fn update(&self, session_id: &str, messages: Option<Vec<Message>>) -> Result<()> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::Session(format!("session {session_id} not found")))?;
        if let Some(messages) = messages {
            session.messages = messages;
        }
        session.last_active_at = Utc::now();
        Ok(())
    }

    /// Append one message; atomic with respect to this session.
    pub fn append_message(&self, session_id: &str, message: Message) -> Result<()> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::Session(format!("session {session_id} not found")))?;
        session.messages.push(message);
        session.last_active_at = Utc::now();
        Ok(())
    }

    pub fn delete(&self, session_id: &str) -> Result<()> {
        let removed = self.sessions.write().remove(session_id);
        if removed.is_none() {
            return Err(Error::Session(format!("session {session_id} not found")));
        }
        self.log.emit(
            Event::new(events::SESSION_CLOSED, "sessions").field("session_id", session_id),
        );
        Ok(())
    }

    /// All sessions, most recently active first.
    pub fn list_active(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().values().cloned().collect();
        sessions.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        sessions
    }

    /// Ensure a session is resident: if unknown in memory, load it from the
    /// repository. Returns whether the session exists anywhere.
    pub async fn hydrate(
        &self,
        session_id: &str,
        repo: &dyn SessionRepository,
    ) -> Result<bool> {
        if self.contains(session_id) {
            return Ok(true);
        }
        match repo.get(session_id).await? {
            Some(stored) => {
                tracing::debug!(session_id, messages = stored.messages.len(), "session hydrated");
                self.sessions.write().insert(session_id.to_string(), stored);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, SessionManager) {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());
        (dir, SessionManager::new(log))
    }

    #[test]
    fn create_generates_uuid_when_omitted() {
        let (_dir, mgr) = manager();
        let id = mgr.create(Mode::Normal, Channel::Chat, None).unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert!(mgr.contains(&id));
    }

    #[test]
    fn create_rejects_collisions() {
        let (_dir, mgr) = manager();
        mgr.create(Mode::Normal, Channel::Chat, Some("s-1".into())).unwrap();
        let err = mgr.create(Mode::Normal, Channel::Chat, Some("s-1".into()));
        assert!(err.is_err());
    }

    #[test]
    fn get_touches_last_active() {
        let (_dir, mgr) = manager();
        let id = mgr.create(Mode::Normal, Channel::Chat, None).unwrap();
        let first = mgr.get(&id).unwrap().last_active_at;
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = mgr.get(&id).unwrap().last_active_at;
        assert!(second >= first);
    }

    #[test]
    fn update_replaces_messages() {
        let (_dir, mgr) = manager();
        let id = mgr.create(Mode::Normal, Channel::Chat, None).unwrap();
        mgr.append_message(&id, Message::user("one")).unwrap();
        mgr.update(&id, Some(vec![Message::user("replaced")])).unwrap();

        let session = mgr.get(&id).unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].content, "replaced");
    }

    #[test]
    fn delete_unknown_session_errors() {
        let (_dir, mgr) = manager();
        assert!(mgr.delete("ghost").is_err());
    }

    #[test]
    fn list_active_sorted_by_recency() {
        let (_dir, mgr) = manager();
        let a = mgr.create(Mode::Normal, Channel::Chat, Some("a".into())).unwrap();
        let b = mgr.create(Mode::Normal, Channel::Chat, Some("b".into())).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        mgr.get(&a);

        let listed = mgr.list_active();
        assert_eq!(listed[0].session_id, a);
        assert_eq!(listed[1].session_id, b);
    }

    #[tokio::test]
    async fn hydrate_loads_from_repository() {
        let (dir, mgr) = manager();
        let repo = crate::repo::FileSessionRepository::new(dir.path().join("sessions"));
        let mut stored = Session::new("persisted", Mode::Normal, Channel::Chat);
        stored.messages.push(Message::user("old turn"));
        repo.create(&stored).await.unwrap();

        assert!(!mgr.contains("persisted"));
        assert!(mgr.hydrate("persisted", &repo).await.unwrap());
        let session = mgr.get("persisted").unwrap();
        assert_eq!(session.messages.len(), 1);

        assert!(!mgr.hydrate("missing", &repo).await.unwrap());
    }
}
