//! Control loop scheduler — background tick tasks per queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use jobgrid_alert::AlertEngine;
use jobgrid_broker::JobBroker;
use jobgrid_scale::CooldownTracker;
use jobgrid_state::{AlertSeverity, StateStore};
use jobgrid_worker::{ConditionCallback, LifecycleCondition, WorkerLifecycleManager};

/// Per-queue loop state.
struct LoopSlot {
    /// Handle to the background tick task.
    handle: JoinHandle<()>,
    /// Shutdown signal for this loop.
    shutdown_tx: watch::Sender<bool>,
}

/// Runs the scaling/recycling/alerting tick for every registered queue.
#[derive(Clone)]
pub struct ControlLoopScheduler {
    state: StateStore,
    broker: Arc<dyn JobBroker>,
    lifecycle: WorkerLifecycleManager,
    alerts: Arc<AlertEngine>,
    tick_interval: Duration,
    /// Bound on the external metrics fetch; a timeout skips the tick.
    metrics_timeout: Duration,
    /// Active loops: queue -> slot.
    loops: Arc<RwLock<HashMap<String, LoopSlot>>>,
}

impl ControlLoopScheduler {
    pub fn new(
        state: StateStore,
        broker: Arc<dyn JobBroker>,
        lifecycle: WorkerLifecycleManager,
        alerts: Arc<AlertEngine>,
    ) -> Self {
        Self {
            state,
            broker,
            lifecycle,
            alerts,
            tick_interval: Duration::from_secs(15),
            metrics_timeout: Duration::from_secs(5),
            loops: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Override the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Override the metrics fetch timeout.
    pub fn with_metrics_timeout(mut self, timeout: Duration) -> Self {
        self.metrics_timeout = timeout;
        self
    }

    /// Start the control loop for a queue, replacing any existing loop.
    pub async fn register_queue(&self, queue: &str) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = self.clone();
        let queue_owned = queue.to_string();
        let handle = tokio::spawn(async move {
            scheduler.run_queue_loop(&queue_owned, shutdown_rx).await;
        });

        let mut loops = self.loops.write().await;
        if let Some(old) = loops.insert(
            queue.to_string(),
            LoopSlot {
                handle,
                shutdown_tx,
            },
        ) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(%queue, interval = ?self.tick_interval, "control loop started");
    }

    /// Stop the control loop for a queue.
    pub async fn deregister_queue(&self, queue: &str) {
        let mut loops = self.loops.write().await;
        if let Some(slot) = loops.remove(queue) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(%queue, "control loop stopped");
        }
    }

    /// Stop every control loop (for graceful shutdown).
    pub async fn stop_all(&self) {
        let mut loops = self.loops.write().await;
        for (queue, slot) in loops.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(%queue, "control loop stopped");
        }
        info!("all control loops stopped");
    }

    /// Queues with an active control loop.
    pub async fn active_queues(&self) -> Vec<String> {
        let loops = self.loops.read().await;
        loops.keys().cloned().collect()
    }

    /// One queue's loop: bootstrap the pool to the policy floor, then
    /// tick until shutdown. The cooldown tracker lives here, owned by
    /// the loop, so nothing else can race on it.
    async fn run_queue_loop(&self, queue: &str, mut shutdown: watch::Receiver<bool>) {
        let mut cooldowns = CooldownTracker::new();

        if let Err(e) = self.bootstrap_pool(queue).await {
            warn!(%queue, error = %e, "pool bootstrap failed, first tick will retry");
        }

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {
                    if let Err(e) = self.tick(queue, &mut cooldowns).await {
                        error!(%queue, error = %e, "control tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    debug!(%queue, "control loop shutting down");
                    break;
                }
            }
        }
    }

    /// Bring a fresh queue up to its policy's `min_workers`.
    async fn bootstrap_pool(&self, queue: &str) -> anyhow::Result<()> {
        let Some(policy) = self.state.get_policy(queue)? else {
            return Ok(());
        };
        let active = self.lifecycle.active_workers(queue)?.len() as u32;
        if active < policy.min_workers {
            info!(%queue, from = active, to = policy.min_workers, "bootstrapping pool to floor");
            self.lifecycle.resize(queue, policy.min_workers).await?;
        }
        Ok(())
    }

    /// Run one control tick for a queue.
    pub async fn tick(&self, queue: &str, cooldowns: &mut CooldownTracker) -> anyhow::Result<()> {
        let Some(policy) = self.state.get_policy(queue)? else {
            debug!(%queue, "no policy, skipping tick");
            return Ok(());
        };

        // Metrics fetch is external I/O: bound it, and skip the tick on
        // failure rather than failing the loop.
        let metrics = match tokio::time::timeout(
            self.metrics_timeout,
            self.broker.queue_metrics(queue),
        )
        .await
        {
            Ok(Ok(metrics)) => metrics,
            Ok(Err(e)) => {
                warn!(%queue, error = %e, "metrics unavailable, skipping tick");
                return Ok(());
            }
            Err(_) => {
                warn!(%queue, timeout = ?self.metrics_timeout, "metrics fetch timed out, skipping tick");
                return Ok(());
            }
        };

        let now = epoch_secs();

        // Decide and apply.
        let decision = jobgrid_scale::decide(&policy, &metrics, cooldowns, now);
        if let Some(direction) = decision.direction() {
            match self.lifecycle.resize(queue, decision.target_workers).await {
                Ok(()) => {
                    // Cooldown only starts once the resize took effect;
                    // a failure leaves it clear so the next tick retries.
                    cooldowns.record(queue, direction, now);
                    self.state.append_decision(&decision)?;
                    info!(
                        %queue,
                        action = ?decision.action,
                        from = decision.current_workers,
                        to = decision.target_workers,
                        reason = %decision.reason,
                        "scaling decision applied"
                    );
                }
                Err(e) => {
                    warn!(%queue, error = %e, "resize failed, cooldown left clear for retry");
                }
            }
        } else {
            debug!(%queue, reason = %decision.reason, "maintaining pool");
        }

        // Recycle triggers, independent of scaling.
        for worker in self.lifecycle.active_workers(queue)? {
            if let Some(trigger) = self.lifecycle.evaluate_recycle(&worker, now) {
                info!(
                    %queue,
                    worker_id = %worker.id,
                    reason = %trigger.describe(),
                    forced = trigger.forced(),
                    "recycle trigger fired"
                );
                if let Err(e) = self.lifecycle.recycle_for(&worker, &trigger).await {
                    warn!(%queue, worker_id = %worker.id, error = %e, "recycle failed");
                }
            }
        }

        // Alerts evaluate the same snapshot the decision used.
        match self.alerts.evaluate(&metrics, now) {
            Ok(emitted) if !emitted.is_empty() => {
                debug!(%queue, count = emitted.len(), "alerts emitted");
            }
            Ok(_) => {}
            Err(e) => warn!(%queue, error = %e, "alert evaluation failed"),
        }

        Ok(())
    }
}

/// Bridge lifecycle conditions into the alert engine.
///
/// Spawn/terminate failures become critical alerts, deduplicated by the
/// engine's signature suppression like any other alert type.
pub fn condition_bridge(alerts: Arc<AlertEngine>) -> ConditionCallback {
    Arc::new(move |condition: LifecycleCondition| {
        let result = match &condition {
            LifecycleCondition::SpawnFailed {
                queue,
                attempts,
                reason,
            } => alerts.raise(
                queue,
                "worker_spawn_failed",
                AlertSeverity::Critical,
                &format!("worker spawn failed after {attempts} attempts: {reason}"),
                "check orchestrator capacity and recent deploys",
                epoch_secs(),
            ),
            LifecycleCondition::TerminateFailed {
                queue,
                worker_id,
                reason,
            } => alerts.raise(
                queue,
                "worker_terminate_failed",
                AlertSeverity::Critical,
                &format!("worker {worker_id} failed to terminate: {reason}"),
                "the worker may be orphaned; verify it exited at the orchestrator",
                epoch_secs(),
            ),
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to raise lifecycle alert");
        }
    })
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
