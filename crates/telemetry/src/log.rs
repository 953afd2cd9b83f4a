//! The structured event log.
//!
//! Events fan out to two sinks: an append-only file-per-day JSONL journal
//! under `<root>/logs/`, and (when configured) the async index shipper. The
//! file write happens first — an event present in neither sink was never
//! emitted; an event lost by the shipper is still in the file journal.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use crate::shipper::IndexShipper;

/// One structured event, under construction.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event_type.into(),
            component: component.into(),
            trace_id: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn trace(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Append-only structured event log.
///
/// Cheap to clone behind an `Arc`; the per-day file is opened on every write
/// so the journal rolls over at UTC midnight without coordination.
pub struct EventLog {
    root: PathBuf,
    write_lock: Mutex<()>,
    shipper: RwLock<Option<Arc<IndexShipper>>>,
}

impl EventLog {
    /// Create an event log rooted at the telemetry directory. `<root>/logs/`
    /// is created eagerly so the first emit cannot fail on a missing parent.
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        let root = root.into();
        if let Err(e) = std::fs::create_dir_all(root.join("logs")) {
            tracing::warn!(error = %e, "failed to create event log directory");
        }
        Arc::new(Self {
            root,
            write_lock: Mutex::new(()),
            shipper: RwLock::new(None),
        })
    }

    /// Attach (or replace) the index shipper. Installed once at startup,
    /// before the first turn.
    pub fn set_shipper(&self, shipper: Option<Arc<IndexShipper>>) {
        *self.shipper.write() = shipper;
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Emit an event: journal first, then ship. Never fails the caller.
    pub fn emit(&self, event: Event) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, event = %event.event, "unserializable event dropped");
                return;
            }
        };

        let day = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.root.join("logs").join(format!("{day}.jsonl"));
        {
            let _guard = self.write_lock.lock();
            let result = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .and_then(|mut f| writeln!(f, "{line}"));
            if let Err(e) = result {
                tracing::warn!(error = %e, path = %path.display(), "event journal write failed");
            }
        }

        if let Some(shipper) = self.shipper.read().as_ref() {
            if let Ok(doc) = serde_json::to_value(&event) {
                shipper.enqueue(format!("axon-events-{day}"), doc);
            }
        }

        tracing::debug!(event = %event.event, component = %event.component, "event emitted");
    }
}
