//! Wiring of the standard background loops onto the scheduler.
//!
//! The service constructs the collaborators; this module decides what each
//! loop actually does per tick. Every tick body returns `()` — failures are
//! logged inside the tick so one bad run never ends a loop.

use std::sync::Arc;

use axon_domain::settings::Settings;
use axon_journal::JournalStore;
use axon_telemetry::lifecycle::DataLifecycleManager;
use axon_telemetry::EventLog;

use crate::consolidation::Consolidator;
use crate::insights::InsightsEngine;
use crate::mode::ModeManager;
use crate::optimizer::ThresholdOptimizer;
use crate::quality::QualityMonitor;
use crate::scheduler::BrainstemScheduler;

/// Everything the standard loops need. Optional collaborators simply leave
/// their loop unregistered.
pub struct BrainstemDeps {
    pub log: Arc<EventLog>,
    pub mode_manager: Arc<ModeManager>,
    pub journal: Arc<JournalStore>,
    pub consolidator: Option<Arc<Consolidator>>,
    pub quality: Option<Arc<QualityMonitor>>,
    pub optimizer: Option<Arc<ThresholdOptimizer>>,
    pub insights: Option<Arc<InsightsEngine>>,
    pub lifecycle: Option<Arc<DataLifecycleManager>>,
}

/// Register the standard loops according to the settings flags.
pub fn spawn_standard_loops(
    scheduler: &BrainstemScheduler,
    settings: &Settings,
    deps: BrainstemDeps,
) {
    // Sensor poll drives mode evaluation. Always on.
    {
        let log = deps.log.clone();
        let mode_manager = deps.mode_manager.clone();
        scheduler.spawn_loop(
            "sensor_poll",
            settings.sensor_poll_interval,
            Arc::new(move || {
                let log = log.clone();
                let mode_manager = mode_manager.clone();
                Box::pin(async move {
                    let metrics = axon_sensors::poll_and_record(&log);
                    if !metrics.is_empty() {
                        mode_manager.evaluate_transitions(&metrics);
                    }
                })
            }),
        );
    }

    if settings.consolidation_enabled {
        if let Some(consolidator) = deps.consolidator {
            scheduler.spawn_loop(
                "consolidation",
                settings.consolidation_interval,
                Arc::new(move || {
                    let consolidator = consolidator.clone();
                    Box::pin(async move {
                        let metrics = axon_sensors::poll_system_metrics();
                        let summary = consolidator.run_once(&metrics).await;
                        tracing::info!(
                            scanned = summary.captures_scanned,
                            entities = summary.entities_written,
                            failures = summary.failures,
                            "consolidation pass finished"
                        );
                    })
                }),
            );
        }
    }

    if settings.quality_monitor_enabled {
        if let Some(quality) = deps.quality {
            scheduler.spawn_loop(
                "quality_monitor",
                settings.quality_monitor_interval,
                Arc::new(move || {
                    let quality = quality.clone();
                    Box::pin(async move {
                        if let Err(e) = quality.run_once().await {
                            tracing::warn!(error = %e, "quality monitor run failed");
                        }
                    })
                }),
            );
        }
    }

    if settings.optimizer_enabled {
        if let Some(optimizer) = deps.optimizer {
            let journal = deps.journal.clone();
            scheduler.spawn_loop(
                "threshold_optimizer",
                settings.optimizer_interval,
                Arc::new(move || {
                    let optimizer = optimizer.clone();
                    let journal = journal.clone();
                    Box::pin(async move {
                        if let Err(e) = optimizer_tick(&optimizer, &journal).await {
                            tracing::warn!(error = %e, "threshold optimizer run failed");
                        }
                    })
                }),
            );
        }
    }

    if settings.insights_enabled {
        if let Some(insights) = deps.insights {
            scheduler.spawn_loop(
                "insights",
                settings.insights_interval,
                Arc::new(move || {
                    let insights = insights.clone();
                    Box::pin(async move {
                        match insights.run_once().await {
                            Ok((found, created)) => tracing::info!(
                                insights = found.len(),
                                proposals = created.len(),
                                "insights pass finished"
                            ),
                            Err(e) => tracing::warn!(error = %e, "insights run failed"),
                        }
                    })
                }),
            );
        }
    }

    if settings.lifecycle_enabled {
        if let Some(lifecycle) = deps.lifecycle {
            scheduler.spawn_loop(
                "lifecycle",
                settings.lifecycle_interval,
                Arc::new(move || {
                    let lifecycle = lifecycle.clone();
                    Box::pin(async move {
                        lifecycle.run_cycle(false).await;
                    })
                }),
            );
        }
    }
}

/// One optimizer pass: only miscalibration evidence produces a proposal.
async fn optimizer_tick(
    optimizer: &ThresholdOptimizer,
    journal: &JournalStore,
) -> axon_domain::Result<()> {
    let report = optimizer.detect_false_positives().await?;
    if report.total_consolidations < 5 || report.false_positive_rate <= 0.3 {
        return Ok(());
    }

    let proposal = optimizer.propose_threshold_adjustment("cpu_threshold").await?;
    let ab = optimizer.run_ab_test(&proposal).await?;
    if ab.recommended {
        let entry = journal.create(proposal.journal_draft)?;
        tracing::info!(
            entry_id = %entry.entry_id,
            fp_rate = report.false_positive_rate,
            "threshold proposal filed"
        );
    }
    Ok(())
}
