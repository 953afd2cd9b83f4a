//! Read-only aggregations over the event index.
//!
//! These queries feed the brainstem's background loops (threshold
//! optimization, insights, consolidation scheduling). The analytics store is
//! abstracted behind [`SearchBackend`]; query bodies use the standard
//! search-aggregation shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use axon_domain::Result;

/// The search/admin surface of the analytics store.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a search request against indices matching `index_pattern`.
    async fn search(&self, index_pattern: &str, body: Value) -> Result<Value>;

    /// List index names matching a pattern.
    async fn list_indices(&self, pattern: &str) -> Result<Vec<String>>;

    /// Delete one index by exact name.
    async fn delete_index(&self, name: &str) -> Result<()>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One observed mode transition.
#[derive(Debug, Clone)]
pub struct ModeTransitionRecord {
    pub timestamp: DateTime<Utc>,
    pub from_mode: String,
    pub to_mode: String,
    pub reason: String,
    pub trace_id: Option<String>,
}

/// One consolidation trigger with whatever resource fields were recorded.
#[derive(Debug, Clone)]
pub struct ConsolidationEvent {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub idle_seconds: Option<f64>,
    pub trace_id: Option<String>,
}

/// Aggregated task behavior over a window.
#[derive(Debug, Clone, Default)]
pub struct TaskPatternReport {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub most_used_tools: Vec<String>,
    pub hourly_distribution: BTreeMap<u32, u64>,
    pub avg_cpu_percent: f64,
    pub avg_memory_percent: f64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TelemetryQueries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const EVENT_INDEX_PATTERN: &str = "axon-events-*";

pub struct TelemetryQueries {
    backend: Arc<dyn SearchBackend>,
}

impl TelemetryQueries {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// p50/p75/p90/p95/p99 of a resource metric over the last `days`.
    pub async fn resource_percentiles(
        &self,
        metric: &str,
        days: u32,
    ) -> Result<BTreeMap<String, f64>> {
        let field = metric_field(metric);
        let body = json!({
            "size": 0,
            "query": range_query("sensor_poll", days),
            "aggs": {
                "percentiles": {
                    "percentiles": { "field": field, "percents": [50, 75, 90, 95, 99] }
                }
            }
        });
        let resp = self.backend.search(EVENT_INDEX_PATTERN, body).await?;

        let values = resp
            .pointer("/aggregations/percentiles/values")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let mut out = BTreeMap::new();
        for (key, label) in [
            ("50.0", "p50"),
            ("75.0", "p75"),
            ("90.0", "p90"),
            ("95.0", "p95"),
            ("99.0", "p99"),
        ] {
            out.insert(
                label.to_string(),
                values.get(key).and_then(Value::as_f64).unwrap_or(0.0),
            );
        }
        Ok(out)
    }

    /// Mode transitions over the last `days`, newest first.
    pub async fn mode_transitions(&self, days: u32) -> Result<Vec<ModeTransitionRecord>> {
        let body = json!({
            "size": 500,
            "query": range_query("mode_transition", days),
            "sort": [{ "@timestamp": "desc" }]
        });
        let resp = self.backend.search(EVENT_INDEX_PATTERN, body).await?;

        Ok(hits(&resp)
            .into_iter()
            .filter_map(|src| {
                Some(ModeTransitionRecord {
                    timestamp: parse_ts(src.get("@timestamp"))?,
                    from_mode: str_field(src, "from_mode")?,
                    to_mode: str_field(src, "to_mode")?,
                    reason: str_field(src, "reason").unwrap_or_default(),
                    trace_id: str_field(src, "trace_id"),
                })
            })
            .collect())
    }

    /// Consolidation trigger events over the last `days`.
    pub async fn consolidation_triggers(&self, days: u32) -> Result<Vec<ConsolidationEvent>> {
        let body = json!({
            "size": 500,
            "query": range_query("consolidation_triggered", days),
            "sort": [{ "@timestamp": "desc" }]
        });
        let resp = self.backend.search(EVENT_INDEX_PATTERN, body).await?;

        Ok(hits(&resp)
            .into_iter()
            .filter_map(|src| {
                Some(ConsolidationEvent {
                    timestamp: parse_ts(src.get("@timestamp"))?,
                    cpu_percent: src.get("cpu_load").and_then(Value::as_f64),
                    memory_percent: src.get("memory_used").and_then(Value::as_f64),
                    idle_seconds: src.get("idle_time").and_then(Value::as_f64),
                    trace_id: str_field(src, "trace_id"),
                })
            })
            .collect())
    }

    /// Aggregate task-completion behavior over the last `days`.
    pub async fn task_patterns(&self, days: u32) -> Result<TaskPatternReport> {
        let body = json!({
            "size": 0,
            "query": range_query("task_completed", days),
            "aggs": {
                "total": { "value_count": { "field": "trace_id.keyword" } },
                "completed": { "filter": { "term": { "outcome": "completed" } } },
                "avg_duration_ms": { "avg": { "field": "duration_ms" } },
                "avg_cpu": { "avg": { "field": "cpu_percent" } },
                "avg_memory": { "avg": { "field": "memory_percent" } },
                "top_tools": { "terms": { "field": "tools_used.keyword", "size": 10 } },
                "hours": { "histogram": { "field": "hour_of_day", "interval": 1 } }
            }
        });
        let resp = self.backend.search(EVENT_INDEX_PATTERN, body).await?;
        let aggs = resp.get("aggregations").cloned().unwrap_or(Value::Null);

        let total = aggs.pointer("/total/value").and_then(Value::as_f64).unwrap_or(0.0) as u64;
        let completed = aggs
            .pointer("/completed/doc_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let most_used_tools = aggs
            .pointer("/top_tools/buckets")
            .and_then(Value::as_array)
            .map(|buckets| {
                buckets
                    .iter()
                    .filter_map(|b| b.get("key").and_then(Value::as_str).map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let hourly_distribution = aggs
            .pointer("/hours/buckets")
            .and_then(Value::as_array)
            .map(|buckets| {
                buckets
                    .iter()
                    .filter_map(|b| {
                        let hour = b.get("key").and_then(Value::as_f64)? as u32;
                        let count = b.get("doc_count").and_then(Value::as_u64)?;
                        Some((hour, count))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(TaskPatternReport {
            total_tasks: total,
            completed_tasks: completed,
            success_rate: if total > 0 {
                completed as f64 / total as f64
            } else {
                0.0
            },
            avg_duration_ms: agg_value(&aggs, "/avg_duration_ms/value"),
            most_used_tools,
            hourly_distribution,
            avg_cpu_percent: agg_value(&aggs, "/avg_cpu/value"),
            avg_memory_percent: agg_value(&aggs, "/avg_memory/value"),
        })
    }

    /// Count events of one type over the last `days`.
    pub async fn event_count(&self, event_type: &str, days: u32) -> Result<u64> {
        let body = json!({
            "size": 0,
            "query": range_query(event_type, days),
            "track_total_hits": true
        });
        let resp = self.backend.search(EVENT_INDEX_PATTERN, body).await?;
        Ok(resp
            .pointer("/hits/total/value")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    /// Per-day counts of one event type, keyed `YYYY-MM-DD`.
    pub async fn daily_event_counts(
        &self,
        event_type: &str,
        days: u32,
    ) -> Result<BTreeMap<String, u64>> {
        let body = json!({
            "size": 0,
            "query": range_query(event_type, days),
            "aggs": {
                "daily": {
                    "date_histogram": { "field": "@timestamp", "calendar_interval": "day" }
                }
            }
        });
        let resp = self.backend.search(EVENT_INDEX_PATTERN, body).await?;

        Ok(resp
            .pointer("/aggregations/daily/buckets")
            .and_then(Value::as_array)
            .map(|buckets| {
                buckets
                    .iter()
                    .filter_map(|b| {
                        let key = b.get("key_as_string").and_then(Value::as_str)?;
                        let day = key.get(..10)?.to_string();
                        let count = b.get("doc_count").and_then(Value::as_u64)?;
                        Some((day, count))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn metric_field(metric: &str) -> String {
    match metric {
        "cpu" => "perf_system_cpu_load".into(),
        "memory" => "perf_system_mem_used".into(),
        "disk" => "perf_system_disk_used".into(),
        "gpu" => "perf_system_gpu_load".into(),
        other => other.into(),
    }
}

fn range_query(event_type: &str, days: u32) -> Value {
    json!({
        "bool": {
            "filter": [
                { "term": { "event": event_type } },
                { "range": { "@timestamp": { "gte": format!("now-{days}d") } } }
            ]
        }
    })
}

fn hits(resp: &Value) -> Vec<&serde_json::Map<String, Value>> {
    resp.pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|h| h.get("_source").and_then(Value::as_object))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_ts(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn str_field(src: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    src.get(key).and_then(Value::as_str).map(String::from)
}

fn agg_value(aggs: &Value, pointer: &str) -> f64 {
    aggs.pointer(pointer).and_then(Value::as_f64).unwrap_or(0.0)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Backend that returns a canned response and records the query.
    struct CannedBackend {
        response: Value,
        last_body: Mutex<Option<Value>>,
    }

    impl CannedBackend {
        fn new(response: Value) -> Arc<Self> {
            Arc::new(Self {
                response,
                last_body: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl SearchBackend for CannedBackend {
        async fn search(&self, _index: &str, body: Value) -> Result<Value> {
            *self.last_body.lock() = Some(body);
            Ok(self.response.clone())
        }
        async fn list_indices(&self, _pattern: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn delete_index(&self, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn resource_percentiles_maps_keys() {
        let backend = CannedBackend::new(json!({
            "aggregations": { "percentiles": { "values": {
                "50.0": 10.0, "75.0": 15.0, "90.0": 20.0, "95.0": 24.0, "99.0": 30.0
            }}}
        }));
        let queries = TelemetryQueries::new(backend.clone());

        let result = queries.resource_percentiles("cpu", 7).await.unwrap();
        assert_eq!(result["p50"], 10.0);
        assert_eq!(result["p99"], 30.0);

        // The CPU alias resolves to the sensor namespace.
        let body = backend.last_body.lock().clone().unwrap();
        assert_eq!(
            body.pointer("/aggs/percentiles/percentiles/field").unwrap(),
            "perf_system_cpu_load"
        );
    }

    #[tokio::test]
    async fn mode_transitions_parses_hits() {
        let backend = CannedBackend::new(json!({
            "hits": { "hits": [ { "_source": {
                "@timestamp": "2026-07-22T10:00:00+00:00",
                "from_mode": "NORMAL",
                "to_mode": "ALERT",
                "reason": "cpu high",
                "trace_id": "trace-1"
            }}]}
        }));
        let queries = TelemetryQueries::new(backend);

        let transitions = queries.mode_transitions(3).await.unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].from_mode, "NORMAL");
        assert_eq!(transitions[0].to_mode, "ALERT");
        assert_eq!(transitions[0].trace_id.as_deref(), Some("trace-1"));
    }

    #[tokio::test]
    async fn consolidation_triggers_parse_optional_metrics() {
        let backend = CannedBackend::new(json!({
            "hits": { "hits": [ { "_source": {
                "@timestamp": "2026-07-22T10:00:00+00:00",
                "trace_id": "trace-2",
                "cpu_load": 22.5,
                "memory_used": 40.2,
                "idle_time": 600
            }}]}
        }));
        let queries = TelemetryQueries::new(backend);

        let events = queries.consolidation_triggers(7).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].cpu_percent, Some(22.5));
        assert_eq!(events[0].memory_percent, Some(40.2));
        assert_eq!(events[0].idle_seconds, Some(600.0));
    }

    #[tokio::test]
    async fn task_patterns_aggregates_report() {
        let backend = CannedBackend::new(json!({
            "aggregations": {
                "total": { "value": 10 },
                "completed": { "doc_count": 8 },
                "avg_duration_ms": { "value": 2500.0 },
                "avg_cpu": { "value": 14.2 },
                "avg_memory": { "value": 33.6 },
                "top_tools": { "buckets": [
                    { "key": "read_file", "doc_count": 6 },
                    { "key": "list_directory", "doc_count": 4 }
                ]},
                "hours": { "buckets": [
                    { "key": 9, "doc_count": 3 },
                    { "key": 10, "doc_count": 5 }
                ]}
            }
        }));
        let queries = TelemetryQueries::new(backend);

        let report = queries.task_patterns(7).await.unwrap();
        assert_eq!(report.total_tasks, 10);
        assert_eq!(report.completed_tasks, 8);
        assert!((report.success_rate - 0.8).abs() < 1e-9);
        assert_eq!(report.avg_duration_ms, 2500.0);
        assert_eq!(report.most_used_tools, vec!["read_file", "list_directory"]);
        assert_eq!(report.hourly_distribution[&9], 3);
        assert_eq!(report.avg_memory_percent, 33.6);
    }

    #[tokio::test]
    async fn event_count_reads_total_hits() {
        let backend = CannedBackend::new(json!({ "hits": { "total": { "value": 17 } } }));
        let queries = TelemetryQueries::new(backend);
        assert_eq!(queries.event_count("task_failed", 7).await.unwrap(), 17);
    }

    #[tokio::test]
    async fn daily_event_counts_maps_histogram_buckets() {
        let backend = CannedBackend::new(json!({
            "aggregations": { "daily": { "buckets": [
                { "key_as_string": "2026-07-20T00:00:00.000Z", "doc_count": 2 },
                { "key_as_string": "2026-07-21T00:00:00.000Z", "doc_count": 5 }
            ]}}
        }));
        let queries = TelemetryQueries::new(backend);

        let daily = queries.daily_event_counts("task_started", 7).await.unwrap();
        assert_eq!(daily["2026-07-20"], 2);
        assert_eq!(daily["2026-07-21"], 5);
    }

    #[tokio::test]
    async fn empty_response_yields_defaults() {
        let backend = CannedBackend::new(json!({}));
        let queries = TelemetryQueries::new(backend);

        assert_eq!(queries.event_count("x", 1).await.unwrap(), 0);
        let report = queries.task_patterns(1).await.unwrap();
        assert_eq!(report.total_tasks, 0);
        assert_eq!(report.success_rate, 0.0);
        let percentiles = queries.resource_percentiles("cpu", 1).await.unwrap();
        assert_eq!(percentiles["p50"], 0.0);
    }
}
