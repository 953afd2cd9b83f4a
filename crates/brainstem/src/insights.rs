//! Insights engine: correlates task telemetry with the cost ledger and
//! turns high-confidence actionable findings into journal proposals.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use axon_journal::entry::{EntryDraft, EntryType, Metric, ProposedChange};
use axon_journal::JournalStore;
use axon_model::CostLedger;
use axon_telemetry::queries::{TaskPatternReport, TelemetryQueries};
use axon_domain::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    SuccessRate,
    Latency,
    Cost,
    ToolConcentration,
}

/// One structured insight.
#[derive(Debug, Clone, Serialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub detail: String,
    pub confidence: f64,
    pub actionable: bool,
}

pub struct InsightsConfig {
    /// Minimum tasks in the window before rate insights are trusted.
    pub min_tasks: u64,
    pub success_rate_floor: f64,
    pub latency_ceiling_ms: f64,
    pub weekly_budget_usd: f64,
    /// Confidence needed before an actionable insight becomes a proposal.
    pub proposal_confidence_floor: f64,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            min_tasks: 10,
            success_rate_floor: 0.8,
            latency_ceiling_ms: 10_000.0,
            weekly_budget_usd: 25.0,
            proposal_confidence_floor: 0.7,
        }
    }
}

pub struct InsightsEngine {
    queries: Arc<TelemetryQueries>,
    ledger: Arc<CostLedger>,
    journal: Arc<JournalStore>,
    config: InsightsConfig,
}

impl InsightsEngine {
    pub fn new(
        queries: Arc<TelemetryQueries>,
        ledger: Arc<CostLedger>,
        journal: Arc<JournalStore>,
        config: InsightsConfig,
    ) -> Self {
        Self {
            queries,
            ledger,
            journal,
            config,
        }
    }

    /// Generate insights for the trailing week.
    pub async fn generate(&self) -> Result<Vec<Insight>> {
        let patterns = self.queries.task_patterns(7).await?;
        let weekly_cost = self.ledger.weekly_cost(Utc::now());
        Ok(derive_insights(&patterns, weekly_cost, &self.config))
    }

    /// Generate, then convert actionable high-confidence insights into
    /// journal entries. Returns (insights, created entry ids).
    pub async fn run_once(&self) -> Result<(Vec<Insight>, Vec<String>)> {
        let insights = self.generate().await?;
        let mut created = Vec::new();

        for insight in &insights {
            if !insight.actionable || insight.confidence < self.config.proposal_confidence_floor {
                continue;
            }
            let draft = EntryDraft::new(
                EntryType::ConfigProposal,
                insight.title.clone(),
                insight.detail.clone(),
            )
            .with_change(ProposedChange {
                what: insight.title.clone(),
                why: insight.detail.clone(),
                how: "review the correlated telemetry and adjust configuration".into(),
            })
            .with_metrics(vec![Metric {
                name: "confidence".into(),
                value: serde_json::json!(insight.confidence),
                unit: None,
            }]);

            let entry = self.journal.create(draft)?;
            created.push(entry.entry_id);
        }
        Ok((insights, created))
    }
}

/// Pure insight derivation from a task report and the weekly spend.
pub fn derive_insights(
    patterns: &TaskPatternReport,
    weekly_cost_usd: f64,
    config: &InsightsConfig,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    if patterns.total_tasks >= config.min_tasks && patterns.success_rate < config.success_rate_floor
    {
        insights.push(Insight {
            kind: InsightKind::SuccessRate,
            title: format!(
                "task success rate {:.0}% below {:.0}% target",
                patterns.success_rate * 100.0,
                config.success_rate_floor * 100.0
            ),
            detail: format!(
                "{} of {} tasks completed over 7 days",
                patterns.completed_tasks, patterns.total_tasks
            ),
            confidence: 0.9,
            actionable: true,
        });
    }

    if patterns.total_tasks >= config.min_tasks
        && patterns.avg_duration_ms > config.latency_ceiling_ms
    {
        insights.push(Insight {
            kind: InsightKind::Latency,
            title: format!(
                "average turn latency {:.1}s exceeds {:.1}s",
                patterns.avg_duration_ms / 1000.0,
                config.latency_ceiling_ms / 1000.0
            ),
            detail: "consider a smaller default model or tighter context windows".into(),
            confidence: 0.75,
            actionable: true,
        });
    }

    if weekly_cost_usd > config.weekly_budget_usd {
        insights.push(Insight {
            kind: InsightKind::Cost,
            title: format!(
                "weekly model spend ${weekly_cost_usd:.2} over ${:.2} budget",
                config.weekly_budget_usd
            ),
            detail: "deep-extraction calls dominate the ledger; lower the consolidation cadence"
                .into(),
            confidence: 0.95,
            actionable: true,
        });
    }

    if let Some(top) = patterns.most_used_tools.first() {
        if patterns.most_used_tools.len() == 1 && patterns.total_tasks >= config.min_tasks {
            insights.push(Insight {
                kind: InsightKind::ToolConcentration,
                title: format!("all tool traffic flows through {top}"),
                detail: "a single tool dominates; descriptors for the others may be unclear".into(),
                confidence: 0.5,
                actionable: false,
            });
        }
    }

    insights
}
