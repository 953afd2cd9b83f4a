//! Adaptive threshold optimizer.
//!
//! Reads resource percentiles, transition history, and consolidation
//! triggers from the telemetry queries, flags suspected false-positive
//! consolidations, and drafts `config_proposal` journal entries when a
//! threshold looks miscalibrated.

use std::collections::BTreeMap;
use std::sync::Arc;

use axon_journal::entry::{EntryDraft, EntryType, Metric, ProposedChange};
use axon_telemetry::queries::{
    ConsolidationEvent, ModeTransitionRecord, TaskPatternReport, TelemetryQueries,
};
use axon_domain::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Report types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ResourceAnalysis {
    pub days: u32,
    pub cpu_percentiles: BTreeMap<String, f64>,
    pub memory_percentiles: BTreeMap<String, f64>,
    pub transitions: Vec<ModeTransitionRecord>,
    pub consolidations: Vec<ConsolidationEvent>,
    pub task_patterns: TaskPatternReport,
}

#[derive(Debug, Clone)]
pub struct FalsePositiveReport {
    pub total_consolidations: usize,
    pub suspected_false_positives: usize,
    pub false_positive_rate: f64,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ThresholdProposal {
    pub metric: String,
    pub current_value: f64,
    pub proposed_value: f64,
    pub rationale: String,
    /// Ready-to-file captain's-log draft for this proposal.
    pub journal_draft: EntryDraft,
}

#[derive(Debug, Clone)]
pub struct AbTestResult {
    pub metric: String,
    pub baseline_value: f64,
    pub candidate_value: f64,
    pub baseline_fp_rate: f64,
    pub projected_fp_rate: f64,
    pub recommended: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Optimizer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Modes whose entry indicates genuine resource pressure. A consolidation
/// with no such transition nearby is suspect when resources were low.
const RISKY_MODES: [&str; 3] = ["ALERT", "DEGRADED", "LOCKDOWN"];

pub struct ThresholdOptimizer {
    queries: Arc<TelemetryQueries>,
    /// Current configured thresholds, keyed by proposal metric name.
    thresholds: BTreeMap<String, f64>,
    window_days: u32,
}

impl ThresholdOptimizer {
    pub fn new(queries: Arc<TelemetryQueries>, thresholds: BTreeMap<String, f64>) -> Self {
        Self {
            queries,
            thresholds,
            window_days: 7,
        }
    }

    /// Combined percentile / transition / task-pattern analysis.
    pub async fn analyze_resource_patterns(&self, days: u32) -> Result<ResourceAnalysis> {
        let cpu_percentiles = self.queries.resource_percentiles("cpu", days).await?;
        let memory_percentiles = self.queries.resource_percentiles("memory", days).await?;
        let transitions = self.queries.mode_transitions(days).await?;
        let consolidations = self.queries.consolidation_triggers(days).await?;
        let task_patterns = self.queries.task_patterns(days).await?;

        Ok(ResourceAnalysis {
            days,
            cpu_percentiles,
            memory_percentiles,
            transitions,
            consolidations,
            task_patterns,
        })
    }

    /// Flag consolidations that fired at low resource pressure with no
    /// risky mode transition in the same window.
    pub async fn detect_false_positives(&self) -> Result<FalsePositiveReport> {
        let consolidations = self.queries.consolidation_triggers(self.window_days).await?;
        let transitions = self.queries.mode_transitions(self.window_days).await?;

        let report = classify_false_positives(&consolidations, &transitions, 30.0, 50.0);
        Ok(report)
    }

    /// Draft a threshold adjustment for `metric` from observed percentiles.
    pub async fn propose_threshold_adjustment(&self, metric: &str) -> Result<ThresholdProposal> {
        let analysis = self.analyze_resource_patterns(self.window_days).await?;

        let percentiles = match metric {
            "memory_threshold" => &analysis.memory_percentiles,
            _ => &analysis.cpu_percentiles,
        };
        let p90 = percentiles.get("p90").copied().unwrap_or(0.0);
        let p99 = percentiles.get("p99").copied().unwrap_or(0.0);
        let current = self.thresholds.get(metric).copied().unwrap_or(80.0);

        // Headroom over routine load and over the observed extremes.
        let proposed = ((p90 * 1.25).max(p99 * 1.05)).clamp(10.0, 100.0);

        let rationale = format!(
            "over {} days p90={p90:.1} and p99={p99:.1}; current threshold {current:.1} \
             leaves little separation from routine load",
            analysis.days
        );

        let journal_draft = EntryDraft::new(
            EntryType::ConfigProposal,
            format!("adjust {metric} from {current:.1} to {proposed:.1}"),
            rationale.clone(),
        )
        .with_change(ProposedChange {
            what: format!("{metric}: {current:.1} -> {proposed:.1}"),
            why: rationale.clone(),
            how: "update the mode thresholds in modes.yaml".into(),
        })
        .with_metrics(vec![
            Metric {
                name: "p90".into(),
                value: serde_json::json!(p90),
                unit: Some("%".into()),
            },
            Metric {
                name: "p99".into(),
                value: serde_json::json!(p99),
                unit: Some("%".into()),
            },
        ]);

        Ok(ThresholdProposal {
            metric: metric.to_string(),
            current_value: current,
            proposed_value: proposed,
            rationale,
            journal_draft,
        })
    }

    /// Project the false-positive rate under the candidate threshold and
    /// compare with the baseline.
    pub async fn run_ab_test(&self, proposal: &ThresholdProposal) -> Result<AbTestResult> {
        let consolidations = self.queries.consolidation_triggers(self.window_days).await?;
        let transitions = self.queries.mode_transitions(self.window_days).await?;

        // Resources below ~40% of the threshold are considered "quiet".
        let baseline_floor = proposal.current_value * 0.4;
        let candidate_floor = proposal.proposed_value * 0.4;

        let baseline =
            classify_false_positives(&consolidations, &transitions, baseline_floor, 50.0);
        let projected =
            classify_false_positives(&consolidations, &transitions, candidate_floor, 50.0);

        Ok(AbTestResult {
            metric: proposal.metric.clone(),
            baseline_value: proposal.current_value,
            candidate_value: proposal.proposed_value,
            baseline_fp_rate: baseline.false_positive_rate,
            projected_fp_rate: projected.false_positive_rate,
            recommended: projected.false_positive_rate <= baseline.false_positive_rate,
        })
    }
}

/// Pure classification: a consolidation is a suspected false positive when
/// it fired below the resource floors and no risky transition exists in the
/// window.
fn classify_false_positives(
    consolidations: &[ConsolidationEvent],
    transitions: &[ModeTransitionRecord],
    cpu_floor: f64,
    memory_floor: f64,
) -> FalsePositiveReport {
    let risky_present = transitions
        .iter()
        .any(|t| RISKY_MODES.contains(&t.to_mode.to_ascii_uppercase().as_str()));

    let mut evidence = Vec::new();
    let mut suspected = 0;
    for event in consolidations {
        let cpu = event.cpu_percent.unwrap_or(0.0);
        let memory = event.memory_percent.unwrap_or(0.0);
        if cpu < cpu_floor && memory < memory_floor && !risky_present {
            suspected += 1;
            evidence.push(format!(
                "consolidation at {} with cpu={cpu:.1}% mem={memory:.1}% and no risky transition",
                event.timestamp.to_rfc3339()
            ));
        }
    }

    let total = consolidations.len();
    FalsePositiveReport {
        total_consolidations: total,
        suspected_false_positives: suspected,
        false_positive_rate: if total > 0 {
            suspected as f64 / total as f64
        } else {
            0.0
        },
        evidence,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axon_telemetry::queries::SearchBackend;
    use chrono::Utc;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    /// Replays canned search responses in call order.
    struct ScriptedBackend {
        responses: Mutex<std::collections::VecDeque<Value>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(&self, _index: &str, _body: Value) -> Result<Value> {
            Ok(self.responses.lock().pop_front().unwrap_or(json!({})))
        }
        async fn list_indices(&self, _pattern: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn delete_index(&self, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    fn percentiles(p50: f64, p75: f64, p90: f64, p95: f64, p99: f64) -> Value {
        json!({ "aggregations": { "percentiles": { "values": {
            "50.0": p50, "75.0": p75, "90.0": p90, "95.0": p95, "99.0": p99
        }}}})
    }

    fn task_patterns_response() -> Value {
        json!({ "aggregations": {
            "total": { "value": 12 },
            "completed": { "doc_count": 11 },
            "avg_duration_ms": { "value": 2200.0 },
            "avg_cpu": { "value": 18.0 },
            "avg_memory": { "value": 35.0 },
            "top_tools": { "buckets": [ { "key": "read_file", "doc_count": 4 } ] },
            "hours": { "buckets": [ { "key": 10, "doc_count": 4 } ] }
        }})
    }

    fn optimizer(responses: Vec<Value>) -> ThresholdOptimizer {
        let backend = ScriptedBackend::new(responses);
        let queries = Arc::new(TelemetryQueries::new(backend));
        let mut thresholds = BTreeMap::new();
        thresholds.insert("cpu_threshold".to_string(), 80.0);
        ThresholdOptimizer::new(queries, thresholds)
    }

    #[tokio::test]
    async fn analyze_combines_reports() {
        // Query order: cpu percentiles, memory percentiles, transitions,
        // consolidations, task patterns.
        let opt = optimizer(vec![
            percentiles(10.0, 14.0, 18.0, 22.0, 30.0),
            percentiles(20.0, 30.0, 40.0, 48.0, 60.0),
            json!({}),
            json!({}),
            task_patterns_response(),
        ]);

        let analysis = opt.analyze_resource_patterns(7).await.unwrap();
        assert_eq!(analysis.days, 7);
        assert_eq!(analysis.cpu_percentiles["p90"], 18.0);
        assert_eq!(analysis.memory_percentiles["p95"], 48.0);
        assert_eq!(analysis.task_patterns.total_tasks, 12);
    }

    #[tokio::test]
    async fn detect_false_positives_flags_quiet_consolidations() {
        let now = Utc::now().to_rfc3339();
        let opt = optimizer(vec![
            json!({ "hits": { "hits": [ { "_source": {
                "@timestamp": now,
                "cpu_load": 15.0,
                "memory_used": 20.0,
                "idle_time": 600
            }}]}}),
            json!({ "hits": { "hits": [ { "_source": {
                "@timestamp": now,
                "from_mode": "NORMAL",
                "to_mode": "NORMAL",
                "reason": "steady state"
            }}]}}),
        ]);

        let report = opt.detect_false_positives().await.unwrap();
        assert_eq!(report.total_consolidations, 1);
        assert_eq!(report.suspected_false_positives, 1);
        assert_eq!(report.false_positive_rate, 1.0);
        assert_eq!(report.evidence.len(), 1);
    }

    #[tokio::test]
    async fn risky_transition_clears_suspicion() {
        let now = Utc::now().to_rfc3339();
        let opt = optimizer(vec![
            json!({ "hits": { "hits": [ { "_source": {
                "@timestamp": now, "cpu_load": 15.0, "memory_used": 20.0
            }}]}}),
            json!({ "hits": { "hits": [ { "_source": {
                "@timestamp": now, "from_mode": "NORMAL", "to_mode": "ALERT", "reason": "cpu"
            }}]}}),
        ]);

        let report = opt.detect_false_positives().await.unwrap();
        assert_eq!(report.suspected_false_positives, 0);
    }

    #[tokio::test]
    async fn proposal_carries_journal_draft() {
        let opt = optimizer(vec![
            percentiles(10.0, 20.0, 30.0, 35.0, 45.0),
            percentiles(20.0, 30.0, 40.0, 45.0, 55.0),
            json!({}),
            json!({}),
            task_patterns_response(),
        ]);

        let proposal = opt.propose_threshold_adjustment("cpu_threshold").await.unwrap();
        assert_eq!(proposal.metric, "cpu_threshold");
        assert_eq!(proposal.current_value, 80.0);
        assert!(proposal.proposed_value > 0.0);
        assert!(matches!(
            proposal.journal_draft.entry_type,
            EntryType::ConfigProposal
        ));
        assert!(proposal.journal_draft.proposed_change.is_some());
    }

    #[tokio::test]
    async fn ab_test_compares_rates() {
        let now = Utc::now().to_rfc3339();
        let consolidation = json!({ "hits": { "hits": [ { "_source": {
            "@timestamp": now, "cpu_load": 25.0, "memory_used": 30.0
        }}]}});
        let opt = optimizer(vec![
            // propose_threshold_adjustment queries
            percentiles(10.0, 20.0, 30.0, 35.0, 45.0),
            percentiles(20.0, 30.0, 40.0, 45.0, 55.0),
            json!({}),
            json!({}),
            task_patterns_response(),
            // run_ab_test queries
            consolidation,
            json!({}),
        ]);

        let proposal = opt.propose_threshold_adjustment("cpu_threshold").await.unwrap();
        let result = opt.run_ab_test(&proposal).await.unwrap();
        assert_eq!(result.metric, "cpu_threshold");
        assert_eq!(result.baseline_value, proposal.current_value);
        assert_eq!(result.candidate_value, proposal.proposed_value);
        assert!(result.baseline_fp_rate >= 0.0 && result.baseline_fp_rate <= 1.0);
    }

    #[test]
    fn empty_history_has_zero_rate() {
        let report = classify_false_positives(&[], &[], 30.0, 50.0);
        assert_eq!(report.total_consolidations, 0);
        assert_eq!(report.false_positive_rate, 0.0);
    }
}
