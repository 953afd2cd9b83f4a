//! Quality monitor: entity-quality and graph-health reports with anomaly
//! detection against the previous run's baseline.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use axon_domain::Result;
use axon_telemetry::{events, Event, EventLog};

use crate::memory::MemoryStore;

/// Snapshot of entity quality in the graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntityQualityReport {
    pub total_entities: usize,
    pub missing_description: usize,
    pub duplicate_names: usize,
    pub duplicate_ratio: f64,
}

/// Snapshot of overall graph health.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphHealthReport {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub orphan_entities: usize,
    pub orphan_ratio: f64,
}

pub struct QualityMonitor {
    store: Arc<dyn MemoryStore>,
    log: Arc<EventLog>,
    baseline: Mutex<Option<(EntityQualityReport, GraphHealthReport)>>,
}

impl QualityMonitor {
    pub fn new(store: Arc<dyn MemoryStore>, log: Arc<EventLog>) -> Self {
        Self {
            store,
            log,
            baseline: Mutex::new(None),
        }
    }

    /// Entity-quality report from the graph's entity rows.
    pub async fn entity_quality_report(&self) -> Result<EntityQualityReport> {
        let rows = self.store.query_memory("entities").await?;
        let total = rows.len();

        let missing_description = rows
            .iter()
            .filter(|row| {
                row.get("description")
                    .map_or(true, |d| d.is_null() || d.as_str() == Some(""))
            })
            .count();

        let mut seen = std::collections::BTreeMap::new();
        for row in &rows {
            if let Some(name) = row.get("name").and_then(Value::as_str) {
                *seen.entry(name.to_lowercase()).or_insert(0usize) += 1;
            }
        }
        let duplicate_names = seen.values().filter(|&&count| count > 1).count();

        Ok(EntityQualityReport {
            total_entities: total,
            missing_description,
            duplicate_names,
            duplicate_ratio: ratio(duplicate_names, total),
        })
    }

    /// Graph-health report from entity and relationship rows.
    pub async fn graph_health_report(&self) -> Result<GraphHealthReport> {
        let entities = self.store.query_memory("entities").await?;
        let relationships = self.store.query_memory("relationships").await?;

        let mut connected = std::collections::BTreeSet::new();
        for rel in &relationships {
            for key in ["from", "to"] {
                if let Some(id) = rel.get(key).and_then(Value::as_str) {
                    connected.insert(id.to_string());
                }
            }
        }
        let orphans = entities
            .iter()
            .filter(|e| {
                e.get("id")
                    .and_then(Value::as_str)
                    .map_or(true, |id| !connected.contains(id))
            })
            .count();

        Ok(GraphHealthReport {
            total_entities: entities.len(),
            total_relationships: relationships.len(),
            orphan_entities: orphans,
            orphan_ratio: ratio(orphans, entities.len()),
        })
    }

    /// Run both reports, compare against the previous baseline, and emit
    /// `quality_monitor_*` events. Returns the anomaly descriptions.
    pub async fn run_once(&self) -> Result<Vec<String>> {
        let quality = self.entity_quality_report().await?;
        let health = self.graph_health_report().await?;

        self.log.emit(
            Event::new(events::QUALITY_MONITOR_REPORT, "brainstem")
                .field("total_entities", quality.total_entities as u64)
                .field("duplicate_ratio", quality.duplicate_ratio)
                .field("orphan_ratio", health.orphan_ratio)
                .field("total_relationships", health.total_relationships as u64),
        );

        let baseline = self.baseline.lock().clone();
        let anomalies = detect_anomalies(&quality, &health, baseline.as_ref());
        for anomaly in &anomalies {
            tracing::warn!(anomaly = %anomaly, "graph quality anomaly");
            self.log.emit(
                Event::new(events::QUALITY_MONITOR_ANOMALY, "brainstem")
                    .field("anomaly", anomaly.clone()),
            );
        }

        *self.baseline.lock() = Some((quality, health));
        Ok(anomalies)
    }
}

/// Pure anomaly rules over the two reports and an optional baseline.
pub fn detect_anomalies(
    quality: &EntityQualityReport,
    health: &GraphHealthReport,
    baseline: Option<&(EntityQualityReport, GraphHealthReport)>,
) -> Vec<String> {
    let mut anomalies = Vec::new();

    if quality.total_entities >= 10 && quality.duplicate_ratio > 0.2 {
        anomalies.push(format!(
            "duplicate entity ratio {:.2} exceeds 0.20",
            quality.duplicate_ratio
        ));
    }
    if health.total_entities >= 10 && health.orphan_ratio > 0.5 {
        anomalies.push(format!(
            "orphan entity ratio {:.2} exceeds 0.50",
            health.orphan_ratio
        ));
    }
    if let Some((prev_quality, _)) = baseline {
        if prev_quality.total_entities >= 10 {
            let prev = prev_quality.total_entities as f64;
            let now = quality.total_entities as f64;
            if now < prev * 0.7 {
                anomalies.push(format!(
                    "entity count dropped from {} to {}",
                    prev_quality.total_entities, quality.total_entities
                ));
            }
        }
    }
    anomalies
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedStore {
        entities: Vec<Value>,
        relationships: Vec<Value>,
    }

    #[async_trait]
    impl MemoryStore for FixedStore {
        async fn create_conversation(&self, _s: &str, _m: &str) -> Result<String> {
            Ok("c".into())
        }
        async fn create_entity(&self, _n: &str, _k: &str, _p: Value) -> Result<String> {
            Ok("e".into())
        }
        async fn create_relationship(&self, _f: &str, _t: &str, _k: &str) -> Result<()> {
            Ok(())
        }
        async fn query_memory(&self, query: &str) -> Result<Vec<Value>> {
            Ok(match query {
                "entities" => self.entities.clone(),
                "relationships" => self.relationships.clone(),
                _ => vec![],
            })
        }
        async fn get_user_interests(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn entity_quality_counts_duplicates_and_gaps() {
        let store = Arc::new(FixedStore {
            entities: vec![
                json!({"id": "1", "name": "Rust", "description": "language"}),
                json!({"id": "2", "name": "rust", "description": null}),
                json!({"id": "3", "name": "Tokio"}),
            ],
            relationships: vec![],
        });
        let dir = tempfile::tempdir().unwrap();
        let monitor = QualityMonitor::new(store, EventLog::new(dir.path()));

        let report = monitor.entity_quality_report().await.unwrap();
        assert_eq!(report.total_entities, 3);
        assert_eq!(report.missing_description, 2);
        assert_eq!(report.duplicate_names, 1);
    }

    #[tokio::test]
    async fn graph_health_counts_orphans() {
        let store = Arc::new(FixedStore {
            entities: vec![
                json!({"id": "1", "name": "a"}),
                json!({"id": "2", "name": "b"}),
                json!({"id": "3", "name": "c"}),
            ],
            relationships: vec![json!({"from": "1", "to": "2", "kind": "REL"})],
        });
        let dir = tempfile::tempdir().unwrap();
        let monitor = QualityMonitor::new(store, EventLog::new(dir.path()));

        let report = monitor.graph_health_report().await.unwrap();
        assert_eq!(report.total_relationships, 1);
        assert_eq!(report.orphan_entities, 1);
    }

    #[test]
    fn anomaly_rules() {
        let quality = EntityQualityReport {
            total_entities: 100,
            missing_description: 0,
            duplicate_names: 30,
            duplicate_ratio: 0.3,
        };
        let health = GraphHealthReport {
            total_entities: 100,
            total_relationships: 5,
            orphan_entities: 80,
            orphan_ratio: 0.8,
        };
        let anomalies = detect_anomalies(&quality, &health, None);
        assert_eq!(anomalies.len(), 2);

        // Shrinking graph versus baseline.
        let baseline = (
            EntityQualityReport {
                total_entities: 200,
                ..Default::default()
            },
            GraphHealthReport::default(),
        );
        let shrunk = EntityQualityReport {
            total_entities: 100,
            ..Default::default()
        };
        let anomalies = detect_anomalies(&shrunk, &GraphHealthReport::default(), Some(&baseline));
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].contains("dropped"));
    }

    #[test]
    fn small_graphs_do_not_alarm() {
        let quality = EntityQualityReport {
            total_entities: 3,
            duplicate_names: 2,
            duplicate_ratio: 0.66,
            ..Default::default()
        };
        assert!(detect_anomalies(&quality, &GraphHealthReport::default(), None).is_empty());
    }
}
