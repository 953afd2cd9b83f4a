//! Human-approval broker for gated tool invocations.
//!
//! A pending approval parks the executing turn on a oneshot channel until
//! an operator resolves it (or the timeout elapses, which counts as a
//! denial).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Operator decision on a pending approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Denied { reason: Option<String> },
}

struct Pending {
    info: ApprovalInfo,
    respond: oneshot::Sender<ApprovalDecision>,
}

/// Serializable snapshot of a pending approval for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalInfo {
    pub id: Uuid,
    pub tool_name: String,
    pub arguments: Value,
    pub trace_id: String,
    pub created_at: DateTime<Utc>,
}

pub struct ApprovalBroker {
    pending: RwLock<HashMap<Uuid, Pending>>,
    timeout: Duration,
}

impl ApprovalBroker {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            pending: RwLock::new(HashMap::new()),
            timeout,
        })
    }

    /// Park until the approval is resolved. A timeout is a denial.
    pub async fn request(
        &self,
        tool_name: &str,
        arguments: Value,
        trace_id: &str,
    ) -> ApprovalDecision {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let info = ApprovalInfo {
            id,
            tool_name: tool_name.to_string(),
            arguments,
            trace_id: trace_id.to_string(),
            created_at: Utc::now(),
        };
        self.pending.write().insert(id, Pending { info, respond: tx });

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => decision,
            // Resolver dropped or timeout: clean up and deny.
            _ => {
                self.pending.write().remove(&id);
                ApprovalDecision::Denied {
                    reason: Some("approval timed out".into()),
                }
            }
        }
    }

    /// Resolve a pending approval as approved. Returns false if unknown.
    pub fn approve(&self, id: &Uuid) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            let _ = pending.respond.send(ApprovalDecision::Approved);
            return true;
        }
        false
    }

    /// Resolve a pending approval as denied. Returns false if unknown.
    pub fn deny(&self, id: &Uuid, reason: Option<String>) -> bool {
        if let Some(pending) = self.pending.write().remove(id) {
            let _ = pending.respond.send(ApprovalDecision::Denied { reason });
            return true;
        }
        false
    }

    pub fn list_pending(&self) -> Vec<ApprovalInfo> {
        self.pending.read().values().map(|p| p.info.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn approve_resolves_waiter() {
        let broker = ApprovalBroker::new(Duration::from_secs(5));
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker.request("restricted_file_tool", serde_json::json!({}), "t-1").await
            })
        };

        // Wait for the pending entry to appear, then approve it.
        let id = loop {
            if let Some(info) = broker.list_pending().first() {
                break info.id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert!(broker.approve(&id));
        assert_eq!(waiter.await.unwrap(), ApprovalDecision::Approved);
        assert!(broker.list_pending().is_empty());
    }

    #[tokio::test]
    async fn deny_carries_reason() {
        let broker = ApprovalBroker::new(Duration::from_secs(5));
        let waiter = {
            let broker = broker.clone();
            tokio::spawn(async move {
                broker.request("t", serde_json::json!({}), "t-1").await
            })
        };
        let id = loop {
            if let Some(info) = broker.list_pending().first() {
                break info.id;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        broker.deny(&id, Some("too risky".into()));
        match waiter.await.unwrap() {
            ApprovalDecision::Denied { reason } => assert_eq!(reason.as_deref(), Some("too risky")),
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_denial() {
        let broker = ApprovalBroker::new(Duration::from_millis(30));
        let decision = broker.request("t", serde_json::json!({}), "t-1").await;
        assert!(matches!(decision, ApprovalDecision::Denied { .. }));
        assert!(broker.list_pending().is_empty());
    }

    #[test]
    fn resolving_unknown_id_is_false() {
        let broker = ApprovalBroker::new(Duration::from_secs(1));
        assert!(!broker.approve(&Uuid::new_v4()));
        assert!(!broker.deny(&Uuid::new_v4(), None));
    }
}
