//! Hot/warm/cold data lifecycle management.
//!
//! Each registered data class has a retention policy. Warm-phase files are
//! compressed into `archive/<class>/`, cold-phase files are purged, and
//! event-index partitions older than the cold window are deleted. Every
//! action emits a lifecycle event and supports dry-run.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::events;
use crate::log::{Event, EventLog};
use crate::queries::SearchBackend;
use axon_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retention policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Retention policy for a data class.
///
/// Hot: keep locally. Warm: archive compressed. Cold: purge after.
/// `cold` of zero means "never purge"; `archive_enabled = false` means the
/// warm phase yields no artifact.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub name: String,
    pub hot: Duration,
    pub warm: Duration,
    pub cold: Duration,
    pub archive_enabled: bool,
}

impl RetentionPolicy {
    pub fn new(name: &str, hot_days: i64, warm_days: i64, cold_days: i64) -> Self {
        Self {
            name: name.into(),
            hot: Duration::days(hot_days),
            warm: Duration::days(warm_days),
            cold: Duration::days(cold_days),
            archive_enabled: true,
        }
    }

    pub fn without_archive(mut self) -> Self {
        self.archive_enabled = false;
        self
    }

    /// True when data of the given age should be purged. Always false when
    /// the cold window is zero.
    pub fn should_purge(&self, age: Duration) -> bool {
        if self.cold <= Duration::zero() {
            return false;
        }
        age > self.cold
    }

    /// True when data of the given age has left the hot window and archiving
    /// is enabled for this class.
    pub fn should_archive(&self, age: Duration) -> bool {
        if !self.archive_enabled {
            return false;
        }
        age > self.hot
    }
}

/// Default retention policies by data class.
pub fn default_policies() -> BTreeMap<String, RetentionPolicy> {
    let mut policies = BTreeMap::new();
    policies.insert("file_logs".into(), RetentionPolicy::new("File Logs", 7, 14, 30));
    policies.insert(
        "task_captures".into(),
        RetentionPolicy::new("Task Captures", 14, 14, 90),
    );
    policies.insert(
        "reflections".into(),
        RetentionPolicy::new("Reflections", 14, 14, 180),
    );
    policies.insert(
        "event_index".into(),
        RetentionPolicy::new("Event Index", 14, 14, 30).without_archive(),
    );
    policies.insert(
        "graph".into(),
        RetentionPolicy::new("Knowledge Graph", 365, 730, 0).without_archive(),
    );
    policies
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct DiskUsageReport {
    pub path: String,
    pub used_bytes: u64,
    pub quota_bytes: u64,
    pub used_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveResult {
    pub data_class: String,
    pub archived: Vec<String>,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurgeResult {
    pub data_class: String,
    pub purged: Vec<String>,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexCleanupResult {
    pub deleted_indices: Vec<String>,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LifecycleReport {
    pub generated_at: DateTime<Utc>,
    pub disk: DiskUsageReport,
    pub would_archive: BTreeMap<String, usize>,
    pub would_purge: BTreeMap<String, usize>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DataLifecycleManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024 * 1024;
const DISK_ALERT_PERCENT: f64 = 80.0;

pub struct DataLifecycleManager {
    root: PathBuf,
    policies: BTreeMap<String, RetentionPolicy>,
    backend: Option<Arc<dyn SearchBackend>>,
    log: Arc<EventLog>,
    quota_bytes: u64,
}

impl DataLifecycleManager {
    pub fn new(
        root: impl Into<PathBuf>,
        log: Arc<EventLog>,
        backend: Option<Arc<dyn SearchBackend>>,
    ) -> Self {
        Self {
            root: root.into(),
            policies: default_policies(),
            backend,
            log,
            quota_bytes: DEFAULT_QUOTA_BYTES,
        }
    }

    pub fn with_quota_bytes(mut self, quota: u64) -> Self {
        self.quota_bytes = quota;
        self
    }

    pub fn policy(&self, data_class: &str) -> Option<&RetentionPolicy> {
        self.policies.get(data_class)
    }

    /// Report telemetry-tree usage against the configured quota; emits a
    /// disk alert when usage crosses the threshold.
    pub fn check_disk_usage(&self) -> DiskUsageReport {
        let used_bytes = dir_size(&self.root);
        let used_percent = if self.quota_bytes > 0 {
            (used_bytes as f64 / self.quota_bytes as f64) * 100.0
        } else {
            0.0
        };
        let report = DiskUsageReport {
            path: self.root.display().to_string(),
            used_bytes,
            quota_bytes: self.quota_bytes,
            used_percent,
        };

        self.log.emit(
            Event::new(events::LIFECYCLE_DISK_CHECK, "lifecycle")
                .field("used_bytes", used_bytes)
                .field("used_percent", used_percent),
        );
        if used_percent >= DISK_ALERT_PERCENT {
            self.log.emit(
                Event::new(events::LIFECYCLE_DISK_ALERT, "lifecycle")
                    .field("used_percent", used_percent)
                    .field("threshold_percent", DISK_ALERT_PERCENT),
            );
        }
        report
    }

    /// Compress files of a data class that have left the hot window,
    /// oldest first. Files already present in the archive are skipped.
    pub fn archive_old_data(&self, data_class: &str, dry_run: bool) -> ArchiveResult {
        let mut result = ArchiveResult {
            data_class: data_class.into(),
            archived: Vec::new(),
            errors: Vec::new(),
            dry_run,
        };
        let Some(policy) = self.policies.get(data_class) else {
            result.errors.push(format!("unknown data class: {data_class}"));
            return result;
        };

        let now = Utc::now();
        let mut files = self.class_files(data_class);
        files.sort_by_key(|(_, aged_at)| *aged_at);

        for (path, aged_at) in files {
            let age = now.signed_duration_since(aged_at);
            if !policy.should_archive(age) {
                continue;
            }
            let target = self.archive_target(data_class, &path);
            if target.exists() {
                continue;
            }
            if dry_run {
                result.archived.push(path.display().to_string());
                continue;
            }
            match gzip_copy(&path, &target) {
                Ok(()) => {
                    result.archived.push(path.display().to_string());
                    self.log.emit(
                        Event::new(events::LIFECYCLE_ARCHIVE, "lifecycle")
                            .field("data_class", data_class)
                            .field("file", path.display().to_string()),
                    );
                }
                Err(e) => result.errors.push(format!("{}: {e}", path.display())),
            }
        }
        result
    }

    /// Delete files of a data class older than the cold window. A zero cold
    /// window disables purging entirely.
    pub fn purge_expired_data(&self, data_class: &str, dry_run: bool) -> PurgeResult {
        let mut result = PurgeResult {
            data_class: data_class.into(),
            purged: Vec::new(),
            errors: Vec::new(),
            dry_run,
        };
        let Some(policy) = self.policies.get(data_class) else {
            result.errors.push(format!("unknown data class: {data_class}"));
            return result;
        };

        let now = Utc::now();
        for (path, aged_at) in self.class_files(data_class) {
            let age = now.signed_duration_since(aged_at);
            if !policy.should_purge(age) {
                continue;
            }
            if dry_run {
                result.purged.push(path.display().to_string());
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    result.purged.push(path.display().to_string());
                    self.log.emit(
                        Event::new(events::LIFECYCLE_PURGE, "lifecycle")
                            .field("data_class", data_class)
                            .field("file", path.display().to_string()),
                    );
                }
                Err(e) => result.errors.push(format!("{}: {e}", path.display())),
            }
        }
        result
    }

    /// Delete event-index partitions older than the cold window.
    pub async fn cleanup_index(&self, dry_run: bool) -> IndexCleanupResult {
        let mut result = IndexCleanupResult {
            deleted_indices: Vec::new(),
            errors: Vec::new(),
            dry_run,
        };
        let Some(backend) = &self.backend else {
            return result;
        };
        let Some(policy) = self.policies.get("event_index") else {
            return result;
        };

        let indices = match backend.list_indices("axon-events-*").await {
            Ok(indices) => indices,
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        };

        let today = Utc::now().date_naive();
        for index in indices {
            let Some(date) = index
                .strip_prefix("axon-events-")
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            let age = Duration::days((today - date).num_days());
            if !policy.should_purge(age) {
                continue;
            }
            if dry_run {
                result.deleted_indices.push(index);
                continue;
            }
            match backend.delete_index(&index).await {
                Ok(()) => {
                    self.log.emit(
                        Event::new(events::LIFECYCLE_INDEX_CLEANUP, "lifecycle")
                            .field("index", index.clone()),
                    );
                    result.deleted_indices.push(index);
                }
                Err(e) => result.errors.push(format!("{index}: {e}")),
            }
        }
        result
    }

    /// Read-only projection of what a full cycle would do.
    pub async fn generate_report(&self) -> LifecycleReport {
        let disk = DiskUsageReport {
            path: self.root.display().to_string(),
            used_bytes: dir_size(&self.root),
            quota_bytes: self.quota_bytes,
            used_percent: if self.quota_bytes > 0 {
                (dir_size(&self.root) as f64 / self.quota_bytes as f64) * 100.0
            } else {
                0.0
            },
        };

        let mut would_archive = BTreeMap::new();
        let mut would_purge = BTreeMap::new();
        for class in self.policies.keys() {
            would_archive.insert(class.clone(), self.archive_old_data(class, true).archived.len());
            would_purge.insert(class.clone(), self.purge_expired_data(class, true).purged.len());
        }

        let report = LifecycleReport {
            generated_at: Utc::now(),
            disk,
            would_archive,
            would_purge,
        };
        self.log.emit(Event::new(events::LIFECYCLE_REPORT, "lifecycle"));
        report
    }

    /// Full cycle: disk check → archive → purge → index cleanup.
    pub async fn run_cycle(&self, dry_run: bool) {
        self.check_disk_usage();
        for class in ["file_logs", "task_captures", "reflections"] {
            let archived = self.archive_old_data(class, dry_run);
            if !archived.errors.is_empty() {
                tracing::warn!(class, errors = ?archived.errors, "archive errors");
            }
            let purged = self.purge_expired_data(class, dry_run);
            if !purged.errors.is_empty() {
                tracing::warn!(class, errors = ?purged.errors, "purge errors");
            }
        }
        let cleanup = self.cleanup_index(dry_run).await;
        if !cleanup.errors.is_empty() {
            tracing::warn!(errors = ?cleanup.errors, "index cleanup errors");
        }
    }

    // ── File discovery per data class ──────────────────────────────

    /// All files of a class with the timestamp their age is measured from.
    fn class_files(&self, data_class: &str) -> Vec<(PathBuf, DateTime<Utc>)> {
        match data_class {
            "file_logs" => list_files(&self.root.join("logs"), |name| {
                name.strip_suffix(".jsonl").and_then(parse_day)
            }),
            "task_captures" => {
                let captures = self.root.join("captains_log").join("captures");
                let mut out = Vec::new();
                for (dir, day) in list_dirs(&captures) {
                    for entry in std::fs::read_dir(&dir).into_iter().flatten().flatten() {
                        if entry.path().is_file() {
                            out.push((entry.path(), day));
                        }
                    }
                }
                out
            }
            "reflections" => list_files(&self.root.join("captains_log"), |name| {
                // CL-YYYY-MM-DD-NNN.json
                let stem = name.strip_prefix("CL-")?.strip_suffix(".json")?;
                parse_day(stem.get(..10)?)
            }),
            _ => Vec::new(),
        }
    }

    fn archive_target(&self, data_class: &str, source: &Path) -> PathBuf {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.root
            .join("archive")
            .join(data_class)
            .join(format!("{name}.gz"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_day(s: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn list_files(
    dir: &Path,
    date_of: impl Fn(&str) -> Option<DateTime<Utc>>,
) -> Vec<(PathBuf, DateTime<Utc>)> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).into_iter().flatten().flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(day) = date_of(&name) {
            out.push((path, day));
        }
    }
    out
}

fn list_dirs(dir: &Path) -> Vec<(PathBuf, DateTime<Utc>)> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).into_iter().flatten().flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(day) = parse_day(&name) {
            out.push((path, day));
        }
    }
    out
}

fn dir_size(dir: &Path) -> u64 {
    let mut total = 0;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).into_iter().flatten().flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(meta) = entry.metadata() {
                total += meta.len();
            }
        }
    }
    total
}

fn gzip_copy(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let data = std::fs::read(source)?;
    let file = std::fs::File::create(target)?;
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(&data)?;
    encoder.finish()?;
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
