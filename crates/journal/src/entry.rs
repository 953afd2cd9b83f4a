//! Captain's-log journal entries.
//!
//! An entry is an operator-visible record the agent proposes to itself —
//! reflections, config proposals, hypotheses, observations, ideas. Status
//! moves forward only: once approved or implemented it never regresses
//! within a run.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use axon_domain::{Error, Result};
use axon_telemetry::{events, Event, EventLog};
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Reflection,
    ConfigProposal,
    Hypothesis,
    Observation,
    Idea,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    AwaitingApproval,
    Approved,
    Rejected,
    Implemented,
}

impl EntryStatus {
    /// Forward-only ordering used to forbid regressions.
    fn rank(&self) -> u8 {
        match self {
            EntryStatus::AwaitingApproval => 0,
            EntryStatus::Rejected => 1,
            EntryStatus::Approved => 1,
            EntryStatus::Implemented => 2,
        }
    }
}

/// Structured metric attached to an entry for programmatic analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedChange {
    pub what: String,
    pub why: String,
    pub how: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryRef {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metric_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub value: Option<Value>,
}

/// One captain's-log entry (`CL-YYYY-MM-DD-NNN`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub title: String,
    pub rationale: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub proposed_change: Option<ProposedChange>,
    #[serde(default)]
    pub supporting_metrics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metrics_structured: Option<Vec<Metric>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub impact_assessment: Option<String>,
    pub status: EntryStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reviewer_notes: Option<String>,
    #[serde(default)]
    pub telemetry_refs: Vec<TelemetryRef>,
}

/// Everything needed to create an entry except the allocated id/status.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub entry_type: EntryType,
    pub title: String,
    pub rationale: String,
    pub proposed_change: Option<ProposedChange>,
    pub supporting_metrics: Vec<String>,
    pub metrics_structured: Option<Vec<Metric>>,
    pub impact_assessment: Option<String>,
    pub telemetry_refs: Vec<TelemetryRef>,
}

impl EntryDraft {
    pub fn new(entry_type: EntryType, title: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            entry_type,
            title: title.into(),
            rationale: rationale.into(),
            proposed_change: None,
            supporting_metrics: Vec::new(),
            metrics_structured: None,
            impact_assessment: None,
            telemetry_refs: Vec::new(),
        }
    }

    pub fn with_change(mut self, change: ProposedChange) -> Self {
        self.proposed_change = Some(change);
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<Metric>) -> Self {
        self.metrics_structured = Some(metrics);
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// File-backed journal store under `<root>/captains_log/`.
pub struct JournalStore {
    dir: PathBuf,
    log: Arc<EventLog>,
    // Serializes id allocation within this process.
    alloc: Mutex<()>,
}

impl JournalStore {
    pub fn new(telemetry_root: impl Into<PathBuf>, log: Arc<EventLog>) -> Self {
        Self {
            dir: telemetry_root.into().join("captains_log"),
            log,
            alloc: Mutex::new(()),
        }
    }

    /// Create a new entry from a draft, allocate its id, and persist it.
    pub fn create(&self, draft: EntryDraft) -> Result<JournalEntry> {
        std::fs::create_dir_all(&self.dir)?;
        let _guard = self.alloc.lock();

        let now = Utc::now();
        let entry_id = self.next_entry_id(now);
        let entry = JournalEntry {
            entry_id: entry_id.clone(),
            timestamp: now,
            entry_type: draft.entry_type,
            title: draft.title,
            rationale: draft.rationale,
            proposed_change: draft.proposed_change,
            supporting_metrics: draft.supporting_metrics,
            metrics_structured: draft.metrics_structured,
            impact_assessment: draft.impact_assessment,
            status: EntryStatus::AwaitingApproval,
            reviewer_notes: None,
            telemetry_refs: draft.telemetry_refs,
        };

        self.persist(&entry)?;
        self.log.emit(
            Event::new(events::JOURNAL_ENTRY_CREATED, "journal")
                .field("entry_id", entry_id)
                .field("entry_type", serde_json::to_value(entry.entry_type)?),
        );
        Ok(entry)
    }

    /// Advance an entry's status. Approved and implemented are irreversible;
    /// attempts to regress are rejected.
    pub fn set_status(&self, entry_id: &str, status: EntryStatus) -> Result<JournalEntry> {
        let mut entry = self.get(entry_id)?;

        if status.rank() < entry.status.rank()
            || (entry.status == EntryStatus::Rejected && status == EntryStatus::Approved)
            || (entry.status == EntryStatus::Approved && status == EntryStatus::Rejected)
        {
            return Err(Error::Other(format!(
                "journal entry {entry_id} cannot move from {:?} to {status:?}",
                entry.status
            )));
        }

        entry.status = status;
        self.persist(&entry)?;
        self.log.emit(
            Event::new(events::JOURNAL_ENTRY_COMMITTED, "journal")
                .field("entry_id", entry_id)
                .field("status", serde_json::to_value(status)?),
        );
        Ok(entry)
    }

    pub fn get(&self, entry_id: &str) -> Result<JournalEntry> {
        let path = self.dir.join(format!("{entry_id}.json"));
        let raw = std::fs::read_to_string(&path)
            .map_err(|_| Error::Other(format!("journal entry not found: {entry_id}")))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// All entries, newest id first.
    pub fn list(&self) -> Vec<JournalEntry> {
        let mut entries = Vec::new();
        for dir_entry in std::fs::read_dir(&self.dir).into_iter().flatten().flatten() {
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if name.starts_with("CL-") && name.ends_with(".json") {
                if let Ok(raw) = std::fs::read_to_string(dir_entry.path()) {
                    if let Ok(entry) = serde_json::from_str::<JournalEntry>(&raw) {
                        entries.push(entry);
                    }
                }
            }
        }
        entries.sort_by(|a, b| b.entry_id.cmp(&a.entry_id));
        entries
    }

    fn persist(&self, entry: &JournalEntry) -> Result<()> {
        let path = self.dir.join(format!("{}.json", entry.entry_id));
        std::fs::write(&path, serde_json::to_string_pretty(entry)?)?;
        Ok(())
    }

    /// Next `CL-YYYY-MM-DD-NNN` for today, scanning existing files so ids
    /// survive restarts.
    fn next_entry_id(&self, now: DateTime<Utc>) -> String {
        let day = now.format("%Y-%m-%d").to_string();
        let prefix = format!("CL-{day}-");
        let mut max_seq = 0u32;
        for dir_entry in std::fs::read_dir(&self.dir).into_iter().flatten().flatten() {
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if let Some(seq) = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|seq| seq.parse::<u32>().ok())
            {
                max_seq = max_seq.max(seq);
            }
        }
        format!("{prefix}{:03}", max_seq + 1)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &std::path::Path) -> JournalStore {
        JournalStore::new(dir, EventLog::new(dir))
    }

    #[test]
    fn create_allocates_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let a = store
            .create(EntryDraft::new(EntryType::Observation, "first", "because"))
            .unwrap();
        let b = store
            .create(EntryDraft::new(EntryType::Idea, "second", "because"))
            .unwrap();

        let day = Utc::now().format("%Y-%m-%d").to_string();
        assert_eq!(a.entry_id, format!("CL-{day}-001"));
        assert_eq!(b.entry_id, format!("CL-{day}-002"));
        assert_eq!(a.status, EntryStatus::AwaitingApproval);
    }

    #[test]
    fn id_allocation_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store(dir.path());
            store
                .create(EntryDraft::new(EntryType::Observation, "one", "r"))
                .unwrap();
        }
        let reopened = store(dir.path());
        let next = reopened
            .create(EntryDraft::new(EntryType::Observation, "two", "r"))
            .unwrap();
        assert!(next.entry_id.ends_with("-002"));
    }

    #[test]
    fn approved_is_irreversible() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let entry = store
            .create(EntryDraft::new(EntryType::ConfigProposal, "bump", "r"))
            .unwrap();

        store.set_status(&entry.entry_id, EntryStatus::Approved).unwrap();
        assert!(store
            .set_status(&entry.entry_id, EntryStatus::AwaitingApproval)
            .is_err());
        assert!(store.set_status(&entry.entry_id, EntryStatus::Rejected).is_err());

        // Forward to implemented is fine; backwards from there is not.
        store.set_status(&entry.entry_id, EntryStatus::Implemented).unwrap();
        assert!(store.set_status(&entry.entry_id, EntryStatus::Approved).is_err());
    }

    #[test]
    fn rejected_cannot_become_approved() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let entry = store
            .create(EntryDraft::new(EntryType::Hypothesis, "h", "r"))
            .unwrap();
        store.set_status(&entry.entry_id, EntryStatus::Rejected).unwrap();
        assert!(store.set_status(&entry.entry_id, EntryStatus::Approved).is_err());
    }

    #[test]
    fn list_returns_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.create(EntryDraft::new(EntryType::Observation, "a", "r")).unwrap();
        store.create(EntryDraft::new(EntryType::Observation, "b", "r")).unwrap();

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].entry_id > listed[1].entry_id);
    }

    #[test]
    fn unknown_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(store.get("CL-2026-01-01-001").is_err());
    }

    #[test]
    fn proposal_serializes_proposed_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let entry = store
            .create(
                EntryDraft::new(EntryType::ConfigProposal, "raise cpu threshold", "p95 evidence")
                    .with_change(ProposedChange {
                        what: "cpu_threshold 80 -> 85".into(),
                        why: "p95 sits at 62".into(),
                        how: "edit modes.yaml".into(),
                    }),
            )
            .unwrap();

        let raw = std::fs::read_to_string(
            dir.path().join("captains_log").join(format!("{}.json", entry.entry_id)),
        )
        .unwrap();
        assert!(raw.contains("\"type\": \"config_proposal\""));
        assert!(raw.contains("cpu_threshold 80 -> 85"));
    }
}
