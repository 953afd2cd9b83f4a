//! Fast task captures: structured post-turn records written without any
//! model involvement, mined later by the consolidation loop.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use axon_domain::Result;

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Failed,
    Timeout,
}

/// Structured capture of one handled turn. Written exactly once per turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCapture {
    pub trace_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assistant_response: Option<String>,
    #[serde(default)]
    pub steps: Vec<Value>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metrics_summary: Option<Value>,
    pub outcome: Outcome,
}

/// Date-partitioned capture storage under
/// `<root>/captains_log/captures/YYYY-MM-DD/<trace_id>.json`.
pub struct CaptureStore {
    root: PathBuf,
}

impl CaptureStore {
    pub fn new(telemetry_root: impl Into<PathBuf>) -> Self {
        Self {
            root: telemetry_root.into(),
        }
    }

    fn captures_dir(&self) -> PathBuf {
        self.root.join("captains_log").join("captures")
    }

    /// Write a capture, pretty-printed. Returns the file path.
    pub fn write(&self, capture: &TaskCapture) -> Result<PathBuf> {
        let day = capture.timestamp.format("%Y-%m-%d").to_string();
        let dir = self.captures_dir().join(&day);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", capture.trace_id));
        let json = serde_json::to_string_pretty(capture)?;
        std::fs::write(&path, json)?;

        tracing::info!(
            trace_id = %capture.trace_id,
            outcome = ?capture.outcome,
            path = %path.display(),
            "capture written"
        );
        Ok(path)
    }

    /// Read captures newest-day-first, optionally bounded by date, up to
    /// `limit`. Unreadable files are skipped with a warning.
    pub fn read(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: usize,
    ) -> Vec<TaskCapture> {
        let mut captures = Vec::new();
        let mut day_dirs: Vec<(NaiveDate, PathBuf)> = Vec::new();

        for entry in std::fs::read_dir(self.captures_dir()).into_iter().flatten().flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Ok(day) = NaiveDate::parse_from_str(&name, "%Y-%m-%d") {
                if start.is_some_and(|s| day < s) || end.is_some_and(|e| day > e) {
                    continue;
                }
                day_dirs.push((day, path));
            }
        }
        day_dirs.sort_by(|a, b| b.0.cmp(&a.0));

        for (_, dir) in day_dirs {
            for entry in std::fs::read_dir(&dir).into_iter().flatten().flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    match read_capture(&path) {
                        Ok(capture) => {
                            captures.push(capture);
                            if captures.len() >= limit {
                                return captures;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "capture read failed");
                        }
                    }
                }
            }
        }
        captures
    }
}

fn read_capture(path: &Path) -> Result<TaskCapture> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn capture(trace_id: &str, at: DateTime<Utc>) -> TaskCapture {
        TaskCapture {
            trace_id: trace_id.into(),
            session_id: "s-1".into(),
            timestamp: at,
            user_message: "hello".into(),
            assistant_response: Some("hi".into()),
            steps: vec![json!({"state": "llm_call"})],
            tools_used: vec!["read_file".into()],
            duration_ms: Some(120.5),
            metrics_summary: None,
            outcome: Outcome::Completed,
        }
    }

    #[test]
    fn write_lands_in_date_partition() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::new(dir.path());
        let now = Utc::now();

        let path = store.write(&capture("t-abc", now)).unwrap();
        let day = now.format("%Y-%m-%d").to_string();
        assert!(path.ends_with(format!("captains_log/captures/{day}/t-abc.json")));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"outcome\": \"completed\""));
    }

    #[test]
    fn read_honors_limit_and_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::new(dir.path());
        let now = Utc::now();
        for i in 0..5 {
            store.write(&capture(&format!("t-{i}"), now)).unwrap();
        }

        let read = store.read(None, None, 3);
        assert_eq!(read.len(), 3);
        assert_eq!(read[0].session_id, "s-1");
    }

    #[test]
    fn read_skips_out_of_range_days() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::new(dir.path());
        let old = Utc::now() - chrono::Duration::days(30);
        store.write(&capture("t-old", old)).unwrap();
        store.write(&capture("t-new", Utc::now())).unwrap();

        let cutoff = (Utc::now() - chrono::Duration::days(7)).date_naive();
        let read = store.read(Some(cutoff), None, 10);
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].trace_id, "t-new");
    }

    #[test]
    fn read_from_empty_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CaptureStore::new(dir.path());
        assert!(store.read(None, None, 10).is_empty());
    }
}
