//! Alert evaluation and acknowledgment.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, info};

use jobgrid_state::{
    AckState, Alert, AlertMetric, AlertRule, AlertSeverity, ScalingMetrics, StateError, StateStore,
};

use crate::suppression::{Signature, SuppressionCache, SuppressionEntry};

/// Errors from alert operations.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert not found: {0}")]
    NotFound(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

/// Evaluates alert rules against metrics snapshots and manages
/// acknowledgments.
pub struct AlertEngine {
    state: StateStore,
    suppression: Mutex<SuppressionCache>,
    seq: AtomicU64,
}

impl AlertEngine {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            suppression: Mutex::new(SuppressionCache::new()),
            seq: AtomicU64::new(0),
        }
    }

    /// Evaluate every configured rule against one queue's snapshot.
    ///
    /// Returns the freshly emitted alerts. Suppressed duplicates are not
    /// returned but have their `current_value` refreshed in the store.
    /// Rules iterate in stable (alphabetical) order, so evaluation is
    /// deterministic for a given snapshot.
    pub fn evaluate(&self, metrics: &ScalingMetrics, now: u64) -> Result<Vec<Alert>, AlertError> {
        let rules = self.state.list_alert_rules()?;
        let mut emitted = Vec::new();

        for rule in rules {
            let Some(value) = metric_value(rule.metric, metrics) else {
                continue; // Snapshot does not report this metric.
            };

            // Highest breached tier wins.
            let breached = rule
                .tiers()
                .filter(|(_, threshold)| value >= *threshold)
                .last();

            let signature: Signature = (rule.alert_type.clone(), rule.period_secs);

            match breached {
                None => {
                    // Condition clear: the next breach alerts immediately.
                    self.suppression.lock().unwrap().remove(&signature);
                }
                Some((severity, threshold)) => {
                    if self.refresh_suppressed(&signature, severity, value, now)? {
                        continue;
                    }

                    let alert = self.build_alert(&rule, metrics, severity, value, threshold, now);
                    self.state.put_alert(&alert)?;
                    self.suppression.lock().unwrap().insert(
                        signature,
                        SuppressionEntry {
                            alert_id: alert.id.clone(),
                            severity,
                            suppressed_at: now,
                        },
                    );
                    info!(
                        queue = %metrics.queue,
                        alert_type = %alert.alert_type,
                        ?severity,
                        value,
                        threshold,
                        "alert emitted"
                    );
                    emitted.push(alert);
                }
            }
        }

        Ok(emitted)
    }

    /// Raise an alert outside rule evaluation (e.g. spawn failures
    /// surfaced by the lifecycle manager). Subject to the same
    /// signature suppression; returns `None` when suppressed.
    pub fn raise(
        &self,
        queue: &str,
        alert_type: &str,
        severity: AlertSeverity,
        message: &str,
        recommendation: &str,
        now: u64,
    ) -> Result<Option<Alert>, AlertError> {
        let signature: Signature = (alert_type.to_string(), 0);
        if self.refresh_suppressed(&signature, severity, 0.0, now)? {
            return Ok(None);
        }

        let alert = Alert {
            id: self.next_id(now),
            queue: queue.to_string(),
            alert_type: alert_type.to_string(),
            severity,
            current_value: 0.0,
            threshold: 0.0,
            message: message.to_string(),
            recommendation: recommendation.to_string(),
            triggered_at: now,
            ack: AckState::Active,
        };
        self.state.put_alert(&alert)?;
        self.suppression.lock().unwrap().insert(
            signature,
            SuppressionEntry {
                alert_id: alert.id.clone(),
                severity,
                suppressed_at: now,
            },
        );
        info!(%queue, %alert_type, ?severity, %message, "alert raised");
        Ok(Some(alert))
    }

    /// Acknowledge an alert. The acknowledgment expires after one hour;
    /// a condition still breaching after expiry emits a fresh alert.
    pub fn acknowledge(
        &self,
        alert_id: &str,
        actor: &str,
        notes: Option<String>,
        now: u64,
    ) -> Result<Alert, AlertError> {
        let mut alert = self
            .state
            .get_alert(alert_id)?
            .ok_or_else(|| AlertError::NotFound(alert_id.to_string()))?;

        alert.ack = AckState::Acknowledged {
            by: actor.to_string(),
            at: now,
            notes,
        };
        self.state.put_alert(&alert)?;
        info!(%alert_id, %actor, "alert acknowledged");
        Ok(alert)
    }

    // ── Internal ───────────────────────────────────────────────────

    /// If a still-valid suppression entry covers this signature at a
    /// severity at least as high, refresh the open alert's value and
    /// report the duplicate as suppressed.
    fn refresh_suppressed(
        &self,
        signature: &Signature,
        severity: AlertSeverity,
        value: f64,
        now: u64,
    ) -> Result<bool, AlertError> {
        let alert_id = {
            let suppression = self.suppression.lock().unwrap();
            match suppression.lookup(signature, now) {
                // An escalation is not a duplicate.
                Some(entry) if severity <= entry.severity => entry.alert_id.clone(),
                _ => return Ok(false),
            }
        };

        if let Some(mut existing) = self.state.get_alert(&alert_id)?
            && existing.ack.suppresses(now)
        {
            existing.current_value = value;
            self.state.put_alert(&existing)?;
            debug!(alert_id = %existing.id, value, "duplicate alert suppressed");
            return Ok(true);
        }

        // Acknowledgment expired (or the alert vanished): re-fire.
        Ok(false)
    }

    fn build_alert(
        &self,
        rule: &AlertRule,
        metrics: &ScalingMetrics,
        severity: AlertSeverity,
        value: f64,
        threshold: f64,
        now: u64,
    ) -> Alert {
        Alert {
            id: self.next_id(now),
            queue: metrics.queue.clone(),
            alert_type: rule.alert_type.clone(),
            severity,
            current_value: value,
            threshold,
            message: format!("{}: {value} >= {threshold}", rule.metric.label()),
            recommendation: recommendation_for(rule.metric).to_string(),
            triggered_at: now,
            ack: AckState::Active,
        }
    }

    fn next_id(&self, now: u64) -> String {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        format!("al-{now}-{n}")
    }
}

/// The snapshot value an alert metric watches, when reported.
fn metric_value(metric: AlertMetric, metrics: &ScalingMetrics) -> Option<f64> {
    match metric {
        AlertMetric::QueueDepth => Some(metrics.queue_depth as f64),
        AlertMetric::QueueLatencyMs => Some(metrics.queue_latency_ms as f64),
        AlertMetric::ErrorRate => Some(metrics.error_rate),
        AlertMetric::CompletedRate => Some(metrics.completed_rate),
        AlertMetric::CpuPercent => metrics.cpu_percent,
        AlertMetric::MemoryPercent => metrics.memory_percent,
    }
}

/// Operator guidance attached to each alert.
fn recommendation_for(metric: AlertMetric) -> &'static str {
    match metric {
        AlertMetric::QueueDepth => "raise max_workers or check for stuck jobs holding the queue",
        AlertMetric::QueueLatencyMs => "add workers or move slow job types onto their own queue",
        AlertMetric::ErrorRate => "inspect recent failures before retrying; a bad deploy may be failing jobs",
        AlertMetric::CompletedRate => "throughput collapsed; check worker health and upstream dependencies",
        AlertMetric::CpuPercent => "workers are CPU-bound; raise max_workers or reduce per-job work",
        AlertMetric::MemoryPercent => "workers are memory-bound; lower the recycle hard limit or fix a leak",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobgrid_state::{ACK_EXPIRY_SECS, SUPPRESSION_WINDOW_SECS};

    fn engine_with_rule(rule: AlertRule) -> AlertEngine {
        let state = StateStore::open_in_memory().unwrap();
        state.put_alert_rule(&rule).unwrap();
        AlertEngine::new(state)
    }

    fn backlog_rule() -> AlertRule {
        AlertRule {
            alert_type: "queue_backlog".to_string(),
            metric: AlertMetric::QueueDepth,
            warning: Some(100.0),
            critical: Some(500.0),
            urgent: Some(1000.0),
            period_secs: 300,
        }
    }

    fn metrics_with_depth(depth: u64) -> ScalingMetrics {
        ScalingMetrics {
            queue: "emails".to_string(),
            queue_depth: depth,
            queue_latency_ms: 100,
            active_jobs: 5,
            completed_rate: 20.0,
            error_rate: 0.01,
            current_workers: 5,
            cpu_percent: None,
            memory_percent: None,
            timestamp: 1000,
        }
    }

    #[test]
    fn breach_emits_highest_severity() {
        let engine = engine_with_rule(backlog_rule());

        let emitted = engine.evaluate(&metrics_with_depth(700), 1000).unwrap();

        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].severity, AlertSeverity::Critical);
        assert_eq!(emitted[0].current_value, 700.0);
        assert_eq!(emitted[0].threshold, 500.0);
        assert_eq!(emitted[0].message, "queue depth: 700 >= 500");
        assert!(matches!(emitted[0].ack, AckState::Active));
    }

    #[test]
    fn value_below_all_tiers_emits_nothing() {
        let engine = engine_with_rule(backlog_rule());
        assert!(engine.evaluate(&metrics_with_depth(50), 1000).unwrap().is_empty());
    }

    #[test]
    fn sparse_tiers_skip_missing_severities() {
        let mut rule = backlog_rule();
        rule.critical = None;
        let engine = engine_with_rule(rule);

        let emitted = engine.evaluate(&metrics_with_depth(700), 1000).unwrap();
        assert_eq!(emitted[0].severity, AlertSeverity::Warning);

        let emitted = engine.evaluate(&metrics_with_depth(1500), 2000).unwrap();
        assert_eq!(emitted[0].severity, AlertSeverity::Urgent);
    }

    #[test]
    fn duplicate_within_window_is_suppressed_with_value_refresh() {
        let engine = engine_with_rule(backlog_rule());

        let first = engine.evaluate(&metrics_with_depth(215), 1000).unwrap();
        assert_eq!(first.len(), 1);

        // Same signature an hour later: no new alert, value refreshed.
        let second = engine.evaluate(&metrics_with_depth(260), 4600).unwrap();
        assert!(second.is_empty());

        let stored = engine.state.list_alerts().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].current_value, 260.0);
    }

    #[test]
    fn suppression_lapses_after_four_hours() {
        let engine = engine_with_rule(backlog_rule());

        engine.evaluate(&metrics_with_depth(215), 1000).unwrap();
        let refire = engine
            .evaluate(&metrics_with_depth(215), 1000 + SUPPRESSION_WINDOW_SECS)
            .unwrap();

        assert_eq!(refire.len(), 1);
        assert_eq!(engine.state.list_alerts().unwrap().len(), 2);
    }

    #[test]
    fn escalation_bypasses_suppression() {
        let engine = engine_with_rule(backlog_rule());

        let first = engine.evaluate(&metrics_with_depth(215), 1000).unwrap();
        assert_eq!(first[0].severity, AlertSeverity::Warning);

        // Minutes later the backlog blows past the urgent tier.
        let escalated = engine.evaluate(&metrics_with_depth(1200), 1300).unwrap();
        assert_eq!(escalated.len(), 1);
        assert_eq!(escalated[0].severity, AlertSeverity::Urgent);
    }

    #[test]
    fn acknowledged_alert_keeps_suppressing_for_an_hour() {
        let engine = engine_with_rule(backlog_rule());

        let emitted = engine.evaluate(&metrics_with_depth(215), 1000).unwrap();
        engine
            .acknowledge(&emitted[0].id, "ops", Some("known burst".to_string()), 1100)
            .unwrap();

        // Still inside the acknowledgment hold.
        let held = engine
            .evaluate(&metrics_with_depth(220), 1100 + ACK_EXPIRY_SECS - 1)
            .unwrap();
        assert!(held.is_empty());

        // Acknowledgment expired and the condition still breaches.
        let refired = engine
            .evaluate(&metrics_with_depth(220), 1100 + ACK_EXPIRY_SECS)
            .unwrap();
        assert_eq!(refired.len(), 1);
        assert_eq!(engine.state.list_alerts().unwrap().len(), 2);
    }

    #[test]
    fn cleared_condition_resets_suppression() {
        let engine = engine_with_rule(backlog_rule());

        engine.evaluate(&metrics_with_depth(215), 1000).unwrap();
        // Backlog drains.
        assert!(engine.evaluate(&metrics_with_depth(5), 1600).unwrap().is_empty());
        // A new breach minutes later alerts immediately.
        let refired = engine.evaluate(&metrics_with_depth(300), 1900).unwrap();
        assert_eq!(refired.len(), 1);
    }

    #[test]
    fn unreported_metric_is_skipped() {
        let engine = engine_with_rule(AlertRule {
            alert_type: "cpu_hot".to_string(),
            metric: AlertMetric::CpuPercent,
            warning: Some(80.0),
            critical: None,
            urgent: None,
            period_secs: 300,
        });

        // cpu_percent is None in the snapshot.
        assert!(engine.evaluate(&metrics_with_depth(50), 1000).unwrap().is_empty());
    }

    #[test]
    fn acknowledge_unknown_alert_errors() {
        let engine = AlertEngine::new(StateStore::open_in_memory().unwrap());
        assert!(matches!(
            engine.acknowledge("ghost", "ops", None, 0),
            Err(AlertError::NotFound(_))
        ));
    }

    #[test]
    fn acknowledge_records_actor_and_notes() {
        let engine = engine_with_rule(backlog_rule());
        let emitted = engine.evaluate(&metrics_with_depth(215), 1000).unwrap();

        let acked = engine
            .acknowledge(&emitted[0].id, "ops", Some("on it".to_string()), 1200)
            .unwrap();

        assert!(matches!(
            acked.ack,
            AckState::Acknowledged { ref by, at: 1200, .. } if by == "ops"
        ));
    }

    #[test]
    fn raised_conditions_dedup_by_signature() {
        let engine = AlertEngine::new(StateStore::open_in_memory().unwrap());

        let first = engine
            .raise(
                "emails",
                "worker_spawn_failed",
                AlertSeverity::Critical,
                "spawn failed after 3 attempts",
                "check the orchestrator",
                1000,
            )
            .unwrap();
        assert!(first.is_some());

        let duplicate = engine
            .raise(
                "emails",
                "worker_spawn_failed",
                AlertSeverity::Critical,
                "spawn failed after 3 attempts",
                "check the orchestrator",
                1500,
            )
            .unwrap();
        assert!(duplicate.is_none());
        assert_eq!(engine.state.list_alerts().unwrap().len(), 1);
    }

    #[test]
    fn multiple_rules_evaluate_independently() {
        let state = StateStore::open_in_memory().unwrap();
        state.put_alert_rule(&backlog_rule()).unwrap();
        state
            .put_alert_rule(&AlertRule {
                alert_type: "error_spike".to_string(),
                metric: AlertMetric::ErrorRate,
                warning: Some(0.05),
                critical: Some(0.2),
                urgent: None,
                period_secs: 300,
            })
            .unwrap();
        let engine = AlertEngine::new(state);

        let mut metrics = metrics_with_depth(215);
        metrics.error_rate = 0.25;

        let emitted = engine.evaluate(&metrics, 1000).unwrap();
        assert_eq!(emitted.len(), 2);
        // Stable rule order: alphabetical by alert_type.
        assert_eq!(emitted[0].alert_type, "error_spike");
        assert_eq!(emitted[1].alert_type, "queue_backlog");
    }
}
