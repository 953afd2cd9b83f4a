//! Memory consolidation loop.
//!
//! Scans recent task captures, pulls (user, assistant) conversation pairs,
//! invokes the extraction collaborator, and writes entities/relationships
//! into the graph store. Best-effort: individual capture failures are
//! logged and skipped.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};

use axon_journal::CaptureStore;
use axon_telemetry::{events, Event, EventLog};

use crate::memory::{EntityExtractor, MemoryStore};

/// Summary of one consolidation run.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationSummary {
    pub captures_scanned: usize,
    pub conversations_written: usize,
    pub entities_written: usize,
    pub relationships_written: usize,
    pub failures: usize,
}

pub struct Consolidator {
    captures: Arc<CaptureStore>,
    store: Arc<dyn MemoryStore>,
    extractor: Arc<dyn EntityExtractor>,
    log: Arc<EventLog>,
    /// How far back to scan for unconsolidated captures.
    window_days: i64,
    batch_limit: usize,
}

impl Consolidator {
    pub fn new(
        captures: Arc<CaptureStore>,
        store: Arc<dyn MemoryStore>,
        extractor: Arc<dyn EntityExtractor>,
        log: Arc<EventLog>,
    ) -> Self {
        Self {
            captures,
            store,
            extractor,
            log,
            window_days: 1,
            batch_limit: 50,
        }
    }

    /// One consolidation pass over recent captures.
    pub async fn run_once(&self, sensors: &BTreeMap<String, f64>) -> ConsolidationSummary {
        let mut summary = ConsolidationSummary::default();

        self.log.emit(
            Event::new(events::CONSOLIDATION_TRIGGERED, "brainstem")
                .field("cpu_load", sensors.get("perf_system_cpu_load").copied().unwrap_or(0.0))
                .field("memory_used", sensors.get("perf_system_mem_used").copied().unwrap_or(0.0)),
        );

        let since = (Utc::now() - Duration::days(self.window_days)).date_naive();
        let captures = self.captures.read(Some(since), None, self.batch_limit);
        summary.captures_scanned = captures.len();

        for capture in captures {
            let Some(response) = capture.assistant_response.clone() else {
                continue;
            };
            let pairs = vec![(capture.user_message.clone(), response)];

            match self.consolidate_one(&capture.session_id, &pairs).await {
                Ok((entities, relationships)) => {
                    summary.conversations_written += 1;
                    summary.entities_written += entities;
                    summary.relationships_written += relationships;
                }
                Err(e) => {
                    summary.failures += 1;
                    tracing::warn!(
                        trace_id = %capture.trace_id,
                        error = %e,
                        "capture consolidation failed"
                    );
                }
            }
        }

        self.log.emit(
            Event::new(events::CONSOLIDATION_COMPLETED, "brainstem")
                .field("captures_scanned", summary.captures_scanned as u64)
                .field("entities_written", summary.entities_written as u64)
                .field("failures", summary.failures as u64),
        );
        summary
    }

    async fn consolidate_one(
        &self,
        session_id: &str,
        pairs: &[(String, String)],
    ) -> axon_domain::Result<(usize, usize)> {
        let extraction = self.extractor.extract(pairs).await?;

        let summary = pairs
            .first()
            .map(|(user, _)| user.chars().take(120).collect::<String>())
            .unwrap_or_default();
        let conversation_id = self.store.create_conversation(session_id, &summary).await?;

        let mut entity_ids: BTreeMap<String, String> = BTreeMap::new();
        for entity in &extraction.entities {
            let properties = serde_json::json!({
                "description": entity.description,
            });
            let id = self
                .store
                .create_entity(&entity.name, &entity.kind, properties)
                .await?;
            self.store
                .create_relationship(&conversation_id, &id, "MENTIONS")
                .await?;
            entity_ids.insert(entity.name.clone(), id);
        }

        let mut written = 0;
        for rel in &extraction.relationships {
            if let (Some(from), Some(to)) = (entity_ids.get(&rel.from), entity_ids.get(&rel.to)) {
                self.store.create_relationship(from, to, &rel.kind).await?;
                written += 1;
            }
        }

        Ok((extraction.entities.len(), written))
    }
}
