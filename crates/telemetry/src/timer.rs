//! Inline request timing instrumentation.
//!
//! [`RequestTimer`] records named spans against a monotonic clock as a turn
//! flows through the pipeline. Unlike the event log it captures phases that
//! emit no events of their own (context windowing, session lookups).

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

/// A single timed phase within a request lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct TimingSpan {
    pub name: String,
    /// Milliseconds from timer creation when the span began.
    pub offset_ms: f64,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

/// Records timing spans for a single request.
///
/// Spans may nest, overlap, and repeat names; `get_span` returns the most
/// recently completed match. Ending a span that was never started records
/// nothing and returns `0.0`.
pub struct RequestTimer {
    pub trace_id: String,
    start: Instant,
    spans: Vec<TimingSpan>,
    active: BTreeMap<String, Instant>,
}

impl RequestTimer {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            start: Instant::now(),
            spans: Vec::new(),
            active: BTreeMap::new(),
        }
    }

    fn ms_since(&self, point: Instant) -> f64 {
        round2(point.duration_since(self.start).as_secs_f64() * 1000.0)
    }

    /// Mark the beginning of a named span. An already-active span with the
    /// same name is silently overwritten.
    pub fn start_span(&mut self, name: impl Into<String>) {
        self.active.insert(name.into(), Instant::now());
    }

    /// Mark the end of a named span and record it. Returns the duration in
    /// milliseconds, or `0.0` if the span was never started.
    pub fn end_span(&mut self, name: &str, metadata: BTreeMap<String, Value>) -> f64 {
        let Some(started) = self.active.remove(name) else {
            return 0.0;
        };
        let duration_ms = round2(started.elapsed().as_secs_f64() * 1000.0);
        let offset_ms = self.ms_since(started);
        self.spans.push(TimingSpan {
            name: name.to_string(),
            offset_ms,
            duration_ms,
            metadata,
        });
        duration_ms
    }

    /// Time a closure as a named span.
    pub fn span<T>(&mut self, name: &str, f: impl FnOnce() -> T) -> T {
        self.start_span(name);
        let out = f();
        self.end_span(name, BTreeMap::new());
        out
    }

    /// Record a zero-duration marker at the current point in time.
    pub fn record_instant(&mut self, name: impl Into<String>, metadata: BTreeMap<String, Value>) {
        let offset_ms = self.ms_since(Instant::now());
        self.spans.push(TimingSpan {
            name: name.into(),
            offset_ms,
            duration_ms: 0.0,
            metadata,
        });
    }

    /// Total milliseconds elapsed since the timer was created.
    pub fn total_ms(&self) -> f64 {
        round2(self.start.elapsed().as_secs_f64() * 1000.0)
    }

    /// Most recently completed span with the given name.
    pub fn get_span(&self, name: &str) -> Option<&TimingSpan> {
        self.spans.iter().rev().find(|s| s.name == name)
    }

    /// Export all recorded spans sorted by offset, plus a final `total` entry.
    pub fn to_breakdown(&self) -> Vec<Value> {
        let mut sorted: Vec<&TimingSpan> = self.spans.iter().collect();
        sorted.sort_by(|a, b| {
            a.offset_ms
                .partial_cmp(&b.offset_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut out: Vec<Value> = Vec::with_capacity(sorted.len() + 1);
        for span in sorted {
            let mut entry = serde_json::json!({
                "phase": span.name,
                "offset_ms": span.offset_ms,
                "duration_ms": span.duration_ms,
            });
            if !span.metadata.is_empty() {
                entry["metadata"] = serde_json::to_value(&span.metadata).unwrap_or(Value::Null);
            }
            out.push(entry);
        }
        out.push(serde_json::json!({
            "phase": "total",
            "offset_ms": 0.0,
            "duration_ms": self.total_ms(),
        }));
        out
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_unknown_span_returns_zero() {
        let mut timer = RequestTimer::new("t-1");
        assert_eq!(timer.end_span("never_started", BTreeMap::new()), 0.0);
        assert!(timer.to_breakdown().len() == 1); // only "total"
    }

    #[test]
    fn span_closure_records_duration() {
        let mut timer = RequestTimer::new("t-1");
        let out = timer.span("work", || {
            std::thread::sleep(std::time::Duration::from_millis(5));
            42
        });
        assert_eq!(out, 42);
        let span = timer.get_span("work").unwrap();
        assert!(span.duration_ms >= 4.0);
    }

    #[test]
    fn duplicate_names_allowed_get_span_returns_latest() {
        let mut timer = RequestTimer::new("t-1");
        timer.start_span("llm_call");
        timer.end_span("llm_call", BTreeMap::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        timer.start_span("llm_call");
        let mut meta = BTreeMap::new();
        meta.insert("model_role".to_string(), serde_json::json!("coding"));
        timer.end_span("llm_call", meta);

        let latest = timer.get_span("llm_call").unwrap();
        assert_eq!(latest.metadata.get("model_role"), Some(&serde_json::json!("coding")));
    }

    #[test]
    fn breakdown_sorted_with_total_last() {
        let mut timer = RequestTimer::new("t-1");
        timer.record_instant("routing_decision", BTreeMap::new());
        timer.start_span("llm_call");
        timer.end_span("llm_call", BTreeMap::new());

        let breakdown = timer.to_breakdown();
        assert_eq!(breakdown.last().unwrap()["phase"], "total");
        let offsets: Vec<f64> = breakdown[..breakdown.len() - 1]
            .iter()
            .map(|e| e["offset_ms"].as_f64().unwrap())
            .collect();
        let mut sorted = offsets.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(offsets, sorted);
    }

    #[test]
    fn record_instant_has_zero_duration() {
        let mut timer = RequestTimer::new("t-1");
        timer.record_instant("marker", BTreeMap::new());
        let span = timer.get_span("marker").unwrap();
        assert_eq!(span.duration_ms, 0.0);
    }
}
