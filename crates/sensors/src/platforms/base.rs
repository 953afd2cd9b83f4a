//! Cross-platform base sensors: CPU load, memory used, disk used.
//!
//! A single `sysinfo::System` is kept behind a lock so consecutive polls
//! produce meaningful CPU deltas. The very first poll after process start
//! reports a CPU load of zero until the second refresh.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use sysinfo::{Disks, System};

static SYSTEM: Mutex<Option<System>> = Mutex::new(None);

/// Poll CPU/memory/disk. Individual sensor failures are logged and the
/// metric is simply omitted.
pub fn poll_base_metrics() -> BTreeMap<String, f64> {
    let mut metrics = BTreeMap::new();

    {
        let mut guard = SYSTEM.lock();
        let system = guard.get_or_insert_with(System::new);
        system.refresh_cpu();
        system.refresh_memory();

        metrics.insert(
            "perf_system_cpu_load".to_string(),
            system.global_cpu_info().cpu_usage() as f64,
        );

        let total = system.total_memory();
        if total > 0 {
            metrics.insert(
                "perf_system_mem_used".to_string(),
                (system.used_memory() as f64 / total as f64) * 100.0,
            );
        }
    }

    if let Some(disk_used) = disk_used_percent() {
        metrics.insert("perf_system_disk_used".to_string(), disk_used);
    }

    metrics
}

/// Best-effort disk usage for the root filesystem (largest disk as a
/// fallback when no root mount is visible).
fn disk_used_percent() -> Option<f64> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().max_by_key(|d| d.total_space()))?;

    let total = disk.total_space();
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(disk.available_space());
    Some((used as f64 / total as f64) * 100.0)
}
