//! Platform-aware system metric polling.
//!
//! Two layers: a cross-platform base (CPU, memory, disk via `sysinfo`) and
//! an optional platform module that appends hardware-specific metrics (GPU
//! on Apple silicon). The public calls produce a flat map keyed by the
//! stable `perf_system_*` namespace; sensor errors are logged and swallowed,
//! so the map may be empty but polling never fails.

use std::collections::BTreeMap;

pub mod platforms;

use axon_telemetry::{events, Event, EventLog};

/// Poll the standard sensor set.
///
/// Keys: `perf_system_cpu_load`, `perf_system_mem_used`,
/// `perf_system_disk_used`, plus platform extras such as
/// `perf_system_gpu_load`.
pub fn poll_system_metrics() -> BTreeMap<String, f64> {
    let mut metrics = platforms::base::poll_base_metrics();

    if let Some(platform) = platforms::platform_metrics() {
        metrics.extend(platform);
    }

    tracing::debug!(
        cpu = metrics.get("perf_system_cpu_load"),
        memory = metrics.get("perf_system_mem_used"),
        metrics = metrics.len(),
        "sensor poll"
    );
    metrics
}

/// Poll and emit a `sensor_poll` event into the event log.
pub fn poll_and_record(log: &EventLog) -> BTreeMap<String, f64> {
    let metrics = poll_system_metrics();
    let mut event = Event::new(events::SENSOR_POLL, "sensors");
    for (key, value) in &metrics {
        event = event.field(key.clone(), *value);
    }
    log.emit(event);
    metrics
}

/// A richer snapshot for the `system_metrics_snapshot` tool; currently the
/// same metric set plus a host description.
pub fn system_metrics_snapshot() -> BTreeMap<String, serde_json::Value> {
    let mut snapshot: BTreeMap<String, serde_json::Value> = poll_system_metrics()
        .into_iter()
        .map(|(k, v)| (k, serde_json::json!(v)))
        .collect();
    snapshot.insert(
        "platform".into(),
        serde_json::json!(platforms::detect_platform()),
    );
    snapshot
}
