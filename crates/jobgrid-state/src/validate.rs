//! Configuration validation.
//!
//! Policies and alert rules are validated field-by-field before they are
//! written; a failed validation rejects the whole update so the stored
//! record is never partially applied.

use thiserror::Error;

use crate::types::{AlertRule, ScaleMetric, ScalingPolicy, ThresholdSet};

/// Hard ceiling on `max_workers` for any queue.
pub const MAX_WORKER_CEILING: u32 = 50;

/// Minimum cooldown per scaling direction (seconds).
pub const MIN_COOLDOWN_SECS: u64 = 10;

/// Minimum configurable queue-latency threshold (milliseconds).
pub const MIN_LATENCY_THRESHOLD_MS: f64 = 1000.0;

/// Field-level configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("policy {queue}: min_workers must be at least 1 (got {got})")]
    MinWorkersTooLow { queue: String, got: u32 },

    #[error("policy {queue}: min_workers ({min}) must be less than max_workers ({max})")]
    MinNotBelowMax { queue: String, min: u32, max: u32 },

    #[error("policy {queue}: max_workers must be at most {MAX_WORKER_CEILING} (got {got})")]
    MaxWorkersTooHigh { queue: String, got: u32 },

    #[error("policy {queue}: {direction} {metric} threshold must be positive (got {got})")]
    ThresholdNotPositive {
        queue: String,
        direction: &'static str,
        metric: &'static str,
        got: f64,
    },

    #[error(
        "policy {queue}: {direction} queue latency threshold must be at least \
         {MIN_LATENCY_THRESHOLD_MS} ms (got {got})"
    )]
    LatencyThresholdTooLow {
        queue: String,
        direction: &'static str,
        got: f64,
    },

    #[error("policy {queue}: {direction} threshold set configures no metrics")]
    EmptyThresholdSet {
        queue: String,
        direction: &'static str,
    },

    #[error(
        "policy {queue}: {direction} cooldown must be at least {MIN_COOLDOWN_SECS}s (got {got})"
    )]
    CooldownTooShort {
        queue: String,
        direction: &'static str,
        got: u64,
    },

    #[error("alert rule {alert_type}: no severity thresholds configured")]
    NoAlertTiers { alert_type: String },

    #[error("alert rule {alert_type}: severity thresholds must be strictly increasing")]
    AlertTiersNotIncreasing { alert_type: String },

    #[error("alert rule {alert_type}: period_secs must be positive")]
    AlertPeriodZero { alert_type: String },
}

/// Validate a scaling policy before it is stored.
pub fn validate_policy(policy: &ScalingPolicy) -> Result<(), ConfigError> {
    let queue = &policy.queue;

    if policy.min_workers < 1 {
        return Err(ConfigError::MinWorkersTooLow {
            queue: queue.clone(),
            got: policy.min_workers,
        });
    }
    if policy.max_workers > MAX_WORKER_CEILING {
        return Err(ConfigError::MaxWorkersTooHigh {
            queue: queue.clone(),
            got: policy.max_workers,
        });
    }
    if policy.min_workers >= policy.max_workers {
        return Err(ConfigError::MinNotBelowMax {
            queue: queue.clone(),
            min: policy.min_workers,
            max: policy.max_workers,
        });
    }

    if let Some(set) = &policy.scale_up {
        validate_threshold_set(queue, "scale-up", set)?;
    }
    if let Some(set) = &policy.scale_down {
        validate_threshold_set(queue, "scale-down", set)?;
    }

    if policy.cooldown.scale_up_secs < MIN_COOLDOWN_SECS {
        return Err(ConfigError::CooldownTooShort {
            queue: queue.clone(),
            direction: "scale-up",
            got: policy.cooldown.scale_up_secs,
        });
    }
    if policy.cooldown.scale_down_secs < MIN_COOLDOWN_SECS {
        return Err(ConfigError::CooldownTooShort {
            queue: queue.clone(),
            direction: "scale-down",
            got: policy.cooldown.scale_down_secs,
        });
    }

    Ok(())
}

fn validate_threshold_set(
    queue: &str,
    direction: &'static str,
    set: &ThresholdSet,
) -> Result<(), ConfigError> {
    if set.is_empty() {
        return Err(ConfigError::EmptyThresholdSet {
            queue: queue.to_string(),
            direction,
        });
    }

    for (metric, value) in set.configured() {
        if value <= 0.0 {
            return Err(ConfigError::ThresholdNotPositive {
                queue: queue.to_string(),
                direction,
                metric: metric.label(),
                got: value,
            });
        }
        if metric == ScaleMetric::QueueLatencyMs && value < MIN_LATENCY_THRESHOLD_MS {
            return Err(ConfigError::LatencyThresholdTooLow {
                queue: queue.to_string(),
                direction,
                got: value,
            });
        }
    }

    Ok(())
}

/// Validate an alert rule before it is stored.
pub fn validate_alert_rule(rule: &AlertRule) -> Result<(), ConfigError> {
    let tiers: Vec<f64> = rule.tiers().map(|(_, t)| t).collect();

    if tiers.is_empty() {
        return Err(ConfigError::NoAlertTiers {
            alert_type: rule.alert_type.clone(),
        });
    }
    if tiers.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(ConfigError::AlertTiersNotIncreasing {
            alert_type: rule.alert_type.clone(),
        });
    }
    if rule.period_secs == 0 {
        return Err(ConfigError::AlertPeriodZero {
            alert_type: rule.alert_type.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertMetric, CooldownConfig};

    fn valid_policy() -> ScalingPolicy {
        ScalingPolicy {
            queue: "emails".to_string(),
            min_workers: 1,
            max_workers: 10,
            scale_up: Some(ThresholdSet {
                queue_depth: Some(100.0),
                ..ThresholdSet::default()
            }),
            scale_down: Some(ThresholdSet {
                queue_depth: Some(10.0),
                ..ThresholdSet::default()
            }),
            cooldown: CooldownConfig {
                scale_up_secs: 60,
                scale_down_secs: 300,
            },
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn valid_rule() -> AlertRule {
        AlertRule {
            alert_type: "queue_backlog".to_string(),
            metric: AlertMetric::QueueDepth,
            warning: Some(100.0),
            critical: Some(500.0),
            urgent: Some(1000.0),
            period_secs: 300,
        }
    }

    #[test]
    fn valid_policy_passes() {
        assert!(validate_policy(&valid_policy()).is_ok());
    }

    #[test]
    fn min_workers_zero_rejected() {
        let mut p = valid_policy();
        p.min_workers = 0;
        assert!(matches!(
            validate_policy(&p),
            Err(ConfigError::MinWorkersTooLow { got: 0, .. })
        ));
    }

    #[test]
    fn min_equal_to_max_rejected() {
        let mut p = valid_policy();
        p.min_workers = 10;
        p.max_workers = 10;
        assert!(matches!(
            validate_policy(&p),
            Err(ConfigError::MinNotBelowMax { min: 10, max: 10, .. })
        ));
    }

    #[test]
    fn max_workers_over_ceiling_rejected() {
        let mut p = valid_policy();
        p.max_workers = 51;
        assert!(matches!(
            validate_policy(&p),
            Err(ConfigError::MaxWorkersTooHigh { got: 51, .. })
        ));
    }

    #[test]
    fn non_positive_threshold_rejected() {
        let mut p = valid_policy();
        p.scale_up = Some(ThresholdSet {
            cpu_percent: Some(0.0),
            ..ThresholdSet::default()
        });
        assert!(matches!(
            validate_policy(&p),
            Err(ConfigError::ThresholdNotPositive { .. })
        ));
    }

    #[test]
    fn latency_threshold_below_floor_rejected() {
        let mut p = valid_policy();
        p.scale_up = Some(ThresholdSet {
            queue_latency_ms: Some(500.0),
            ..ThresholdSet::default()
        });
        assert!(matches!(
            validate_policy(&p),
            Err(ConfigError::LatencyThresholdTooLow { got, .. }) if got == 500.0
        ));
    }

    #[test]
    fn empty_threshold_set_rejected() {
        let mut p = valid_policy();
        p.scale_down = Some(ThresholdSet::default());
        assert!(matches!(
            validate_policy(&p),
            Err(ConfigError::EmptyThresholdSet {
                direction: "scale-down",
                ..
            })
        ));
    }

    #[test]
    fn short_cooldown_rejected() {
        let mut p = valid_policy();
        p.cooldown.scale_down_secs = 9;
        assert!(matches!(
            validate_policy(&p),
            Err(ConfigError::CooldownTooShort { got: 9, .. })
        ));
    }

    #[test]
    fn policy_without_thresholds_is_valid() {
        // A policy may configure no thresholds at all; the engine then
        // always maintains.
        let mut p = valid_policy();
        p.scale_up = None;
        p.scale_down = None;
        assert!(validate_policy(&p).is_ok());
    }

    #[test]
    fn valid_rule_passes() {
        assert!(validate_alert_rule(&valid_rule()).is_ok());
    }

    #[test]
    fn rule_without_tiers_rejected() {
        let mut r = valid_rule();
        r.warning = None;
        r.critical = None;
        r.urgent = None;
        assert!(matches!(
            validate_alert_rule(&r),
            Err(ConfigError::NoAlertTiers { .. })
        ));
    }

    #[test]
    fn rule_with_non_increasing_tiers_rejected() {
        let mut r = valid_rule();
        r.critical = Some(100.0); // equal to warning
        assert!(matches!(
            validate_alert_rule(&r),
            Err(ConfigError::AlertTiersNotIncreasing { .. })
        ));
    }

    #[test]
    fn rule_with_sparse_tiers_is_valid() {
        let mut r = valid_rule();
        r.critical = None; // warning + urgent only
        assert!(validate_alert_rule(&r).is_ok());
    }

    #[test]
    fn rule_with_zero_period_rejected() {
        let mut r = valid_rule();
        r.period_secs = 0;
        assert!(matches!(
            validate_alert_rule(&r),
            Err(ConfigError::AlertPeriodZero { .. })
        ));
    }
}
