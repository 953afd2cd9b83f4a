//! Mode state machine.
//!
//! The process starts in NORMAL. Transitions happen either by rule
//! evaluation against a sensor map or by an explicit override — and the
//! override must still correspond to a declared rule edge. Modes never
//! decay spontaneously.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use axon_domain::governance::TransitionRule;
use axon_domain::Mode;
use axon_telemetry::{events, Event, EventLog};

/// Raised on a transition that no rule permits.
#[derive(Debug, thiserror::Error)]
#[error("illegal mode transition {from} -> {to}: {detail}")]
pub struct ModeTransitionError {
    pub from: Mode,
    pub to: Mode,
    pub detail: String,
}

pub struct ModeManager {
    current: RwLock<Mode>,
    rules: Vec<TransitionRule>,
    log: Arc<EventLog>,
}

impl ModeManager {
    pub fn new(rules: Vec<TransitionRule>, log: Arc<EventLog>) -> Self {
        Self {
            current: RwLock::new(Mode::Normal),
            rules,
            log,
        }
    }

    /// Cheap read of the current mode.
    pub fn current_mode(&self) -> Mode {
        *self.current.read()
    }

    /// Evaluate transition rules against a sensor map. The first rule whose
    /// `from` matches the current mode and whose conditions are all
    /// satisfied wins. Returns the new mode when a transition fired.
    pub fn evaluate_transitions(&self, sensors: &BTreeMap<String, f64>) -> Option<Mode> {
        let current = self.current_mode();
        let rule = self.rules.iter().find(|r| r.matches(current, sensors))?;

        let evidence: Vec<String> = rule.conditions.iter().map(|c| c.metric.clone()).collect();
        self.apply(current, rule.to, &rule.reason, &evidence);
        Some(rule.to)
    }

    /// Explicit override. Still restricted to declared rule edges; anything
    /// else raises a [`ModeTransitionError`].
    pub fn transition_to(
        &self,
        to: Mode,
        reason: &str,
        evidence: &[String],
    ) -> Result<(), ModeTransitionError> {
        let from = self.current_mode();
        if from == to {
            return Err(ModeTransitionError {
                from,
                to,
                detail: "self transitions are forbidden".into(),
            });
        }
        let permitted = self.rules.iter().any(|r| r.from == from && r.to == to);
        if !permitted {
            return Err(ModeTransitionError {
                from,
                to,
                detail: "no transition rule declares this edge".into(),
            });
        }
        self.apply(from, to, reason, evidence);
        Ok(())
    }

    fn apply(&self, from: Mode, to: Mode, reason: &str, evidence: &[String]) {
        *self.current.write() = to;
        tracing::info!(from = %from, to = %to, reason, "mode transition");
        self.log.emit(
            Event::new(events::MODE_TRANSITION, "brainstem")
                .field("from_mode", from.as_str())
                .field("to_mode", to.as_str())
                .field("reason", reason)
                .field("evidence_metric_ids", serde_json::json!(evidence)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_domain::governance::{Comparator, TransitionCondition};

    fn rules() -> Vec<TransitionRule> {
        vec![
            TransitionRule {
                from: Mode::Normal,
                to: Mode::Alert,
                conditions: vec![TransitionCondition {
                    metric: "perf_system_cpu_load".into(),
                    op: Comparator::Ge,
                    threshold: 80.0,
                }],
                reason: "cpu pressure".into(),
            },
            TransitionRule {
                from: Mode::Alert,
                to: Mode::Normal,
                conditions: vec![TransitionCondition {
                    metric: "perf_system_cpu_load".into(),
                    op: Comparator::Lt,
                    threshold: 50.0,
                }],
                reason: "recovered".into(),
            },
            TransitionRule {
                from: Mode::Normal,
                to: Mode::Lockdown,
                conditions: vec![],
                reason: "manual lockdown".into(),
            },
        ]
    }

    fn manager() -> (tempfile::TempDir, ModeManager) {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());
        (dir, ModeManager::new(rules(), log))
    }

    #[test]
    fn starts_in_normal() {
        let (_dir, mgr) = manager();
        assert_eq!(mgr.current_mode(), Mode::Normal);
    }

    #[test]
    fn evaluate_fires_first_matching_rule() {
        let (_dir, mgr) = manager();
        let mut sensors = BTreeMap::new();
        sensors.insert("perf_system_cpu_load".to_string(), 91.0);

        assert_eq!(mgr.evaluate_transitions(&sensors), Some(Mode::Alert));
        assert_eq!(mgr.current_mode(), Mode::Alert);

        // Same sensors, now in ALERT: the recovery rule does not match.
        assert_eq!(mgr.evaluate_transitions(&sensors), None);

        sensors.insert("perf_system_cpu_load".to_string(), 20.0);
        assert_eq!(mgr.evaluate_transitions(&sensors), Some(Mode::Normal));
    }

    #[test]
    fn unconditional_rule_matches_empty_sensors() {
        let (_dir, mgr) = manager();
        let sensors = BTreeMap::new();
        // The NORMAL->LOCKDOWN rule has no conditions and therefore always
        // matches — with no sensor readings the CPU rule cannot fire first.
        assert_eq!(mgr.evaluate_transitions(&sensors), Some(Mode::Lockdown));
    }

    #[test]
    fn explicit_override_follows_declared_edges() {
        let (_dir, mgr) = manager();
        mgr.transition_to(Mode::Lockdown, "incident", &[]).unwrap();
        assert_eq!(mgr.current_mode(), Mode::Lockdown);

        // No rule LOCKDOWN -> ALERT.
        let err = mgr.transition_to(Mode::Alert, "nope", &[]).unwrap_err();
        assert_eq!(err.from, Mode::Lockdown);
        assert_eq!(err.to, Mode::Alert);
    }

    #[test]
    fn self_transition_is_rejected() {
        let (_dir, mgr) = manager();
        assert!(mgr.transition_to(Mode::Normal, "noop", &[]).is_err());
    }
}
