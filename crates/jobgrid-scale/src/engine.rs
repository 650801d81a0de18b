//! The scaling decision engine.
//!
//! `decide()` is a pure function: policy + metrics + cooldown state in,
//! one decision out. Applying the decision (and recording the cooldown)
//! belongs to the control loop.

use tracing::debug;

use jobgrid_state::{
    ScaleAction, ScaleDirection, ScalingDecision, ScalingMetrics, ScalingPolicy, ThresholdSet,
};

use crate::cooldown::CooldownTracker;

/// Fraction of the current pool added or removed per scaling step.
pub const SCALE_STEP_FRACTION: f64 = 0.2;

/// Evaluate one queue tick and produce a scaling decision.
pub fn decide(
    policy: &ScalingPolicy,
    metrics: &ScalingMetrics,
    cooldowns: &CooldownTracker,
    now: u64,
) -> ScalingDecision {
    let current = metrics.current_workers;
    let queue = &policy.queue;

    // Scale-up: ANY configured threshold breached.
    let breaches = policy
        .scale_up
        .as_ref()
        .map(|set| up_breaches(set, metrics))
        .unwrap_or_default();

    if !breaches.is_empty() {
        let summary = breaches.join(", ");

        if !cooldowns.ready(queue, ScaleDirection::Up, policy.cooldown.scale_up_secs, now) {
            debug!(%queue, %summary, "scale-up blocked by cooldown");
            return maintain(
                policy,
                metrics,
                format!("{summary}, but scale-up cooldown active"),
                now,
            );
        }

        let target = (current + step(current)).min(policy.max_workers);
        if target <= current {
            return maintain(
                policy,
                metrics,
                format!(
                    "{summary}, but pool already at max_workers ({})",
                    policy.max_workers
                ),
                now,
            );
        }

        return ScalingDecision {
            queue: queue.clone(),
            action: ScaleAction::ScaleUp,
            target_workers: target,
            current_workers: current,
            reason: summary,
            metrics: metrics.clone(),
            decided_at: now,
        };
    }

    // Scale-down: ALL configured thresholds simultaneously clear.
    if let Some(set) = &policy.scale_down
        && let Some(clear) = down_clearances(set, metrics)
    {
        let summary = clear.join(", ");

        if !cooldowns.ready(
            queue,
            ScaleDirection::Down,
            policy.cooldown.scale_down_secs,
            now,
        ) {
            debug!(%queue, %summary, "scale-down blocked by cooldown");
            return maintain(
                policy,
                metrics,
                format!("{summary}, but scale-down cooldown active"),
                now,
            );
        }

        let target = current.saturating_sub(step(current)).max(policy.min_workers);
        if target >= current {
            return maintain(
                policy,
                metrics,
                format!(
                    "{summary}, but pool already at min_workers ({})",
                    policy.min_workers
                ),
                now,
            );
        }

        return ScalingDecision {
            queue: queue.clone(),
            action: ScaleAction::ScaleDown,
            target_workers: target,
            current_workers: current,
            reason: summary,
            metrics: metrics.clone(),
            decided_at: now,
        };
    }

    maintain(policy, metrics, "all metrics within thresholds".to_string(), now)
}

/// Step size: 20% of the current pool, at least one worker.
fn step(current: u32) -> u32 {
    ((current as f64 * SCALE_STEP_FRACTION).round() as u32).max(1)
}

/// Descriptions of every breached scale-up threshold (OR semantics).
fn up_breaches(set: &ThresholdSet, metrics: &ScalingMetrics) -> Vec<String> {
    set.configured()
        .filter_map(|(metric, threshold)| {
            let value = metrics.value_of(metric)?;
            (value >= threshold).then(|| format!("{}: {value} >= {threshold}", metric.label()))
        })
        .collect()
}

/// Descriptions of the clear scale-down thresholds, or `None` unless ALL
/// configured thresholds are clear (AND semantics). A metric the snapshot
/// does not report cannot be confirmed clear, so it blocks scale-down.
fn down_clearances(set: &ThresholdSet, metrics: &ScalingMetrics) -> Option<Vec<String>> {
    let mut clear = Vec::new();
    for (metric, threshold) in set.configured() {
        let value = metrics.value_of(metric)?;
        if value >= threshold {
            return None;
        }
        clear.push(format!("{}: {value} < {threshold}", metric.label()));
    }
    (!clear.is_empty()).then_some(clear)
}

fn maintain(
    policy: &ScalingPolicy,
    metrics: &ScalingMetrics,
    reason: String,
    now: u64,
) -> ScalingDecision {
    ScalingDecision {
        queue: policy.queue.clone(),
        action: ScaleAction::Maintain,
        target_workers: metrics.current_workers,
        current_workers: metrics.current_workers,
        reason,
        metrics: metrics.clone(),
        decided_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobgrid_state::CooldownConfig;

    fn test_policy(min: u32, max: u32) -> ScalingPolicy {
        ScalingPolicy {
            queue: "emails".to_string(),
            min_workers: min,
            max_workers: max,
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
            created_at: 0,
            updated_at: 0,
        }
    }

    fn test_metrics(depth: u64, workers: u32) -> ScalingMetrics {
        ScalingMetrics {
            queue: "emails".to_string(),
            queue_depth: depth,
            queue_latency_ms: 500,
            active_jobs: workers,
            completed_rate: 20.0,
            error_rate: 0.01,
            current_workers: workers,
            cpu_percent: None,
            memory_percent: None,
            timestamp: 0,
        }
    }

    #[test]
    fn breach_scales_up_by_twenty_percent() {
        let policy = test_policy(1, 20);
        let metrics = test_metrics(215, 10);
        let cooldowns = CooldownTracker::new();

        let decision = decide(&policy, &metrics, &cooldowns, 0);

        assert_eq!(decision.action, ScaleAction::ScaleUp);
        assert_eq!(decision.target_workers, 12); // step = round(10 * 0.2) = 2
        assert_eq!(decision.current_workers, 10);
        assert_eq!(decision.reason, "queue depth: 215 >= 100");
    }

    #[test]
    fn breach_at_max_workers_maintains() {
        let policy = test_policy(1, 10);
        let metrics = test_metrics(215, 10);
        let cooldowns = CooldownTracker::new();

        let decision = decide(&policy, &metrics, &cooldowns, 0);

        assert_eq!(decision.action, ScaleAction::Maintain);
        assert_eq!(decision.target_workers, 10);
        assert!(decision.reason.contains("max_workers"));
    }

    #[test]
    fn up_cooldown_blocks_despite_breach() {
        let policy = test_policy(1, 20);
        let mut cooldowns = CooldownTracker::new();
        cooldowns.record("emails", ScaleDirection::Up, 0);

        // t=30, within the 60s up-cooldown, depth even higher.
        let decision = decide(&policy, &test_metrics(300, 12), &cooldowns, 30);

        assert_eq!(decision.action, ScaleAction::Maintain);
        assert!(decision.reason.contains("cooldown"));
    }

    #[test]
    fn up_cooldown_elapsed_allows_scaling() {
        let policy = test_policy(1, 20);
        let mut cooldowns = CooldownTracker::new();
        cooldowns.record("emails", ScaleDirection::Up, 0);

        let decision = decide(&policy, &test_metrics(300, 12), &cooldowns, 60);

        assert_eq!(decision.action, ScaleAction::ScaleUp);
        assert_eq!(decision.target_workers, 14); // step = round(12 * 0.2) = 2
    }

    #[test]
    fn quiet_queue_scales_down_toward_min() {
        let policy = test_policy(1, 20);
        let metrics = test_metrics(5, 10);
        let cooldowns = CooldownTracker::new();

        let decision = decide(&policy, &metrics, &cooldowns, 0);

        assert_eq!(decision.action, ScaleAction::ScaleDown);
        assert_eq!(decision.target_workers, 8);
        assert_eq!(decision.reason, "queue depth: 5 < 10");
    }

    #[test]
    fn scale_down_clamps_to_min_workers() {
        let mut policy = test_policy(4, 20);
        policy.min_workers = 4;
        let decision = decide(&policy, &test_metrics(0, 5), &CooldownTracker::new(), 0);

        assert_eq!(decision.action, ScaleAction::ScaleDown);
        assert_eq!(decision.target_workers, 4);
    }

    #[test]
    fn at_min_workers_maintains() {
        let policy = test_policy(2, 20);
        let decision = decide(&policy, &test_metrics(0, 2), &CooldownTracker::new(), 0);

        assert_eq!(decision.action, ScaleAction::Maintain);
        assert!(decision.reason.contains("min_workers"));
    }

    #[test]
    fn down_cooldown_blocks_scale_down() {
        let policy = test_policy(1, 20);
        let mut cooldowns = CooldownTracker::new();
        cooldowns.record("emails", ScaleDirection::Down, 0);

        let decision = decide(&policy, &test_metrics(0, 10), &cooldowns, 299);
        assert_eq!(decision.action, ScaleAction::Maintain);

        let decision = decide(&policy, &test_metrics(0, 10), &cooldowns, 300);
        assert_eq!(decision.action, ScaleAction::ScaleDown);
    }

    #[test]
    fn scale_up_is_or_across_thresholds() {
        let mut policy = test_policy(1, 20);
        policy.scale_up = Some(ThresholdSet {
            queue_depth: Some(100.0),
            queue_latency_ms: Some(5000.0),
            ..ThresholdSet::default()
        });

        // Depth fine, latency breached.
        let mut metrics = test_metrics(50, 10);
        metrics.queue_latency_ms = 8000;

        let decision = decide(&policy, &metrics, &CooldownTracker::new(), 0);
        assert_eq!(decision.action, ScaleAction::ScaleUp);
        assert_eq!(decision.reason, "queue latency ms: 8000 >= 5000");
    }

    #[test]
    fn multiple_breaches_all_named_in_reason() {
        let mut policy = test_policy(1, 20);
        policy.scale_up = Some(ThresholdSet {
            queue_depth: Some(100.0),
            queue_latency_ms: Some(5000.0),
            ..ThresholdSet::default()
        });

        let mut metrics = test_metrics(215, 10);
        metrics.queue_latency_ms = 8000;

        let decision = decide(&policy, &metrics, &CooldownTracker::new(), 0);
        assert_eq!(
            decision.reason,
            "queue depth: 215 >= 100, queue latency ms: 8000 >= 5000"
        );
    }

    #[test]
    fn scale_down_is_and_across_thresholds() {
        let mut policy = test_policy(1, 20);
        policy.scale_down = Some(ThresholdSet {
            queue_depth: Some(10.0),
            cpu_percent: Some(50.0),
            ..ThresholdSet::default()
        });

        // Depth clear but CPU still hot: one improving metric must not
        // shrink the pool.
        let mut metrics = test_metrics(5, 10);
        metrics.cpu_percent = Some(80.0);
        let decision = decide(&policy, &metrics, &CooldownTracker::new(), 0);
        assert_eq!(decision.action, ScaleAction::Maintain);

        // Both clear.
        metrics.cpu_percent = Some(20.0);
        let decision = decide(&policy, &metrics, &CooldownTracker::new(), 0);
        assert_eq!(decision.action, ScaleAction::ScaleDown);
        assert_eq!(
            decision.reason,
            "queue depth: 5 < 10, cpu percent: 20 < 50"
        );
    }

    #[test]
    fn unreported_metric_blocks_scale_down() {
        let mut policy = test_policy(1, 20);
        policy.scale_down = Some(ThresholdSet {
            queue_depth: Some(10.0),
            cpu_percent: Some(50.0),
            ..ThresholdSet::default()
        });

        // cpu_percent is None in the snapshot: cannot be confirmed clear.
        let decision = decide(&policy, &test_metrics(5, 10), &CooldownTracker::new(), 0);
        assert_eq!(decision.action, ScaleAction::Maintain);
    }

    #[test]
    fn unreported_metric_never_breaches_scale_up() {
        let mut policy = test_policy(1, 20);
        policy.scale_up = Some(ThresholdSet {
            cpu_percent: Some(50.0),
            ..ThresholdSet::default()
        });

        let decision = decide(&policy, &test_metrics(500, 10), &CooldownTracker::new(), 0);
        assert_eq!(decision.action, ScaleAction::Maintain);
    }

    #[test]
    fn no_thresholds_always_maintains() {
        let mut policy = test_policy(1, 20);
        policy.scale_up = None;
        policy.scale_down = None;

        let decision = decide(&policy, &test_metrics(10_000, 10), &CooldownTracker::new(), 0);
        assert_eq!(decision.action, ScaleAction::Maintain);
        assert_eq!(decision.target_workers, 10);
    }

    #[test]
    fn step_is_at_least_one_worker() {
        let policy = test_policy(1, 20);

        // 20% of 3 rounds to 1.
        let decision = decide(&policy, &test_metrics(215, 3), &CooldownTracker::new(), 0);
        assert_eq!(decision.target_workers, 4);

        // 20% of 2 rounds to 0, floored to 1.
        let decision = decide(&policy, &test_metrics(215, 2), &CooldownTracker::new(), 0);
        assert_eq!(decision.target_workers, 3);
    }

    #[test]
    fn step_rounds_to_nearest() {
        let policy = test_policy(1, 50);

        // round(13 * 0.2) = round(2.6) = 3.
        let decision = decide(&policy, &test_metrics(215, 13), &CooldownTracker::new(), 0);
        assert_eq!(decision.target_workers, 16);
    }

    #[test]
    fn decision_carries_snapshot_and_timestamp() {
        let policy = test_policy(1, 20);
        let metrics = test_metrics(215, 10);

        let decision = decide(&policy, &metrics, &CooldownTracker::new(), 1234);

        assert_eq!(decision.decided_at, 1234);
        assert_eq!(decision.metrics, metrics);
        assert_eq!(decision.queue, "emails");
    }

    #[test]
    fn breach_beats_clear_scale_down() {
        // Both conditions can hold when up and down sets overlap oddly;
        // scale-up wins because falling behind is the worse failure mode.
        let mut policy = test_policy(1, 20);
        policy.scale_up = Some(ThresholdSet {
            queue_latency_ms: Some(1000.0),
            ..ThresholdSet::default()
        });
        policy.scale_down = Some(ThresholdSet {
            queue_depth: Some(10.0),
            ..ThresholdSet::default()
        });

        let mut metrics = test_metrics(5, 10);
        metrics.queue_latency_ms = 2000;

        let decision = decide(&policy, &metrics, &CooldownTracker::new(), 0);
        assert_eq!(decision.action, ScaleAction::ScaleUp);
    }
}
