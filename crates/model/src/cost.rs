//! Cost ledger for external model usage.
//!
//! Rows are appended to a JSONL file; the weekly reduction feeds the
//! insights engine's budget check.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use axon_domain::Result;

/// One ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRow {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub purpose: Option<String>,
}

/// Append-only JSONL cost ledger.
pub struct CostLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CostLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn append(&self, row: &CostRow) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(row)?;
        let _guard = self.write_lock.lock();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// All rows; unreadable lines are skipped.
    pub fn rows(&self) -> Vec<CostRow> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        raw.lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Total USD spent in the trailing seven days.
    pub fn weekly_cost(&self, now: DateTime<Utc>) -> f64 {
        let cutoff = now - Duration::days(7);
        self.rows()
            .iter()
            .filter(|row| row.timestamp >= cutoff && row.timestamp <= now)
            .map(|row| row.cost_usd)
            .sum()
    }
}
