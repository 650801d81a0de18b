//! Worker lifecycle manager.
//!
//! Owns the worker records for every queue: resizes pools toward the
//! scaling target, runs the drain protocol, and replaces recycled
//! workers. All record mutation for a queue happens from that queue's
//! control loop, so there is no cross-queue contention on records.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use jobgrid_broker::WorkerOrchestrator;
use jobgrid_state::{StateError, StateStore, WorkerRecord, WorkerState};

use crate::recycle::{self, RecycleLimits, RecycleTrigger};

/// Spawn/terminate attempts before the failure is surfaced as a condition.
pub const SPAWN_RETRY_ATTEMPTS: u32 = 3;

/// Operational conditions the manager surfaces to the alert engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleCondition {
    /// All spawn attempts for a replacement or resize failed.
    SpawnFailed {
        queue: String,
        attempts: u32,
        reason: String,
    },
    /// All terminate attempts for a worker failed.
    TerminateFailed {
        queue: String,
        worker_id: String,
        reason: String,
    },
}

/// Callback invoked when the manager surfaces a [`LifecycleCondition`].
pub type ConditionCallback = Arc<dyn Fn(LifecycleCondition) + Send + Sync>;

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("worker not found: {queue}/{worker_id}")]
    WorkerNotFound { queue: String, worker_id: String },

    #[error("a reason is required for a manual recycle")]
    ReasonRequired,

    #[error("spawn failed for queue {queue} after {SPAWN_RETRY_ATTEMPTS} attempts")]
    SpawnFailed { queue: String },

    #[error("terminate failed for worker {worker_id} after {SPAWN_RETRY_ATTEMPTS} attempts")]
    TerminateFailed { worker_id: String },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

/// Manages worker pools across queues.
#[derive(Clone)]
pub struct WorkerLifecycleManager {
    state: StateStore,
    orchestrator: Arc<dyn WorkerOrchestrator>,
    limits: RecycleLimits,
    /// Base delay for spawn/terminate retries (doubles per attempt).
    retry_backoff: Duration,
    on_condition: Option<ConditionCallback>,
    /// Current resize target per queue.
    targets: Arc<Mutex<HashMap<String, u32>>>,
    /// Drain waiters keyed by `{queue}:{worker_id}`; notified when the
    /// in-flight job finishes.
    draining: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl WorkerLifecycleManager {
    /// Create a manager with default recycle limits.
    pub fn new(state: StateStore, orchestrator: Arc<dyn WorkerOrchestrator>) -> Self {
        Self {
            state,
            orchestrator,
            limits: RecycleLimits::default(),
            retry_backoff: Duration::from_secs(1),
            on_condition: None,
            targets: Arc::new(Mutex::new(HashMap::new())),
            draining: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Override the recycle limits.
    pub fn with_limits(mut self, limits: RecycleLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Override the retry backoff base (tests use a short one).
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the callback for surfaced conditions.
    pub fn with_condition_callback(mut self, callback: ConditionCallback) -> Self {
        self.on_condition = Some(callback);
        self
    }

    /// The active recycle limits.
    pub fn limits(&self) -> &RecycleLimits {
        &self.limits
    }

    /// The current resize target for a queue, if one was ever set.
    pub fn target(&self, queue: &str) -> Option<u32> {
        self.targets.lock().unwrap().get(queue).copied()
    }

    /// Active (non-draining) workers for a queue.
    pub fn active_workers(&self, queue: &str) -> Result<Vec<WorkerRecord>, LifecycleError> {
        let mut workers: Vec<WorkerRecord> = self
            .state
            .list_workers_for_queue(queue)?
            .into_iter()
            .filter(|w| w.state == WorkerState::Active)
            .collect();
        workers.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(workers)
    }

    // ── Resize ─────────────────────────────────────────────────────

    /// Bring a queue's pool to `target` workers.
    ///
    /// Scale-up fires spawn requests and records the new workers; it does
    /// not wait for them to come online. Scale-down drains the oldest
    /// active workers first, bounding long-tail memory growth. Returns an
    /// error if any required spawn ultimately failed, so the caller skips
    /// recording the cooldown and the next tick retries.
    pub async fn resize(&self, queue: &str, target: u32) -> Result<(), LifecycleError> {
        self.targets
            .lock()
            .unwrap()
            .insert(queue.to_string(), target);

        let active = self.active_workers(queue)?;
        let current = active.len() as u32;

        if target > current {
            let deficit = target - current;
            info!(%queue, from = current, to = target, "scaling up worker pool");
            let mut failed = false;
            for _ in 0..deficit {
                if self.spawn_recorded(queue).await.is_none() {
                    failed = true;
                }
            }
            if failed {
                return Err(LifecycleError::SpawnFailed {
                    queue: queue.to_string(),
                });
            }
        } else if target < current {
            let excess = (current - target) as usize;
            info!(%queue, from = current, to = target, "scaling down worker pool");
            // `active_workers` sorts oldest-first.
            for worker in active.into_iter().take(excess) {
                self.begin_drain(worker, "scale-down".to_string(), false)?;
            }
        } else {
            debug!(%queue, target, "pool already at target");
        }

        Ok(())
    }

    // ── Recycling ──────────────────────────────────────────────────

    /// Evaluate the recycle triggers for one worker.
    pub fn evaluate_recycle(&self, worker: &WorkerRecord, now: u64) -> Option<RecycleTrigger> {
        recycle::evaluate(worker, &self.limits, now)
    }

    /// Recycle a worker because a trigger fired.
    pub async fn recycle_for(
        &self,
        worker: &WorkerRecord,
        trigger: &RecycleTrigger,
    ) -> Result<(), LifecycleError> {
        self.recycle(&worker.queue, &worker.id, &trigger.describe(), !trigger.forced())
            .await
    }

    /// Recycle a worker. `graceful = false` terminates without waiting
    /// for the in-flight job. A reason is always required.
    pub async fn recycle(
        &self,
        queue: &str,
        worker_id: &str,
        reason: &str,
        graceful: bool,
    ) -> Result<(), LifecycleError> {
        if reason.trim().is_empty() {
            return Err(LifecycleError::ReasonRequired);
        }

        let worker = self
            .state
            .get_worker(queue, worker_id)?
            .ok_or_else(|| LifecycleError::WorkerNotFound {
                queue: queue.to_string(),
                worker_id: worker_id.to_string(),
            })?;

        info!(%queue, %worker_id, %reason, graceful, "recycling worker");

        if graceful {
            self.begin_drain(worker, reason.to_string(), true)?;
            Ok(())
        } else {
            self.terminate(&worker, true, true).await
        }
    }

    /// A worker finished a job: bump its count and release its drain
    /// waiter if it was draining.
    pub fn record_job_complete(&self, queue: &str, worker_id: &str) -> Result<(), LifecycleError> {
        let mut worker = self
            .state
            .get_worker(queue, worker_id)?
            .ok_or_else(|| LifecycleError::WorkerNotFound {
                queue: queue.to_string(),
                worker_id: worker_id.to_string(),
            })?;
        worker.jobs_processed += 1;
        worker.updated_at = epoch_secs();
        self.state.put_worker(&worker)?;

        let key = format!("{queue}:{worker_id}");
        if let Some(notify) = self.draining.lock().unwrap().get(&key) {
            notify.notify_one();
        }
        Ok(())
    }

    /// Update a worker's reported memory usage.
    pub fn update_worker_usage(
        &self,
        queue: &str,
        worker_id: &str,
        memory_mb: u64,
    ) -> Result<(), LifecycleError> {
        let mut worker = self
            .state
            .get_worker(queue, worker_id)?
            .ok_or_else(|| LifecycleError::WorkerNotFound {
                queue: queue.to_string(),
                worker_id: worker_id.to_string(),
            })?;
        worker.memory_mb = memory_mb;
        worker.updated_at = epoch_secs();
        self.state.put_worker(&worker)?;
        Ok(())
    }

    // ── Internal ───────────────────────────────────────────────────

    /// Spawn one worker with retries and record it. Returns `None` after
    /// exhausting the retry budget (the condition is surfaced, never
    /// panicked on).
    async fn spawn_recorded(&self, queue: &str) -> Option<String> {
        let mut last_error = String::new();
        for attempt in 0..SPAWN_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(self.retry_backoff * 2u32.pow(attempt - 1)).await;
            }
            match self.orchestrator.spawn_worker(queue).await {
                Ok(worker_id) => {
                    let now = epoch_secs();
                    let record = WorkerRecord {
                        id: worker_id.clone(),
                        queue: queue.to_string(),
                        started_at: now,
                        jobs_processed: 0,
                        memory_mb: 0,
                        state: WorkerState::Active,
                        updated_at: now,
                    };
                    if let Err(e) = self.state.put_worker(&record) {
                        warn!(%queue, %worker_id, error = %e, "failed to record spawned worker");
                    }
                    return Some(worker_id);
                }
                Err(e) => {
                    warn!(%queue, attempt = attempt + 1, error = %e, "worker spawn failed");
                    last_error = e.to_string();
                }
            }
        }

        self.surface(LifecycleCondition::SpawnFailed {
            queue: queue.to_string(),
            attempts: SPAWN_RETRY_ATTEMPTS,
            reason: last_error,
        });
        None
    }

    /// Mark a worker draining and start its bounded drain task.
    ///
    /// `replace` is false when the drain is part of a scale-down;
    /// recycling never counts as a scale-down, so recycles replace.
    fn begin_drain(
        &self,
        mut worker: WorkerRecord,
        reason: String,
        replace: bool,
    ) -> Result<(), LifecycleError> {
        worker.state = WorkerState::Draining;
        worker.updated_at = epoch_secs();
        self.state.put_worker(&worker)?;

        let key = worker.table_key();
        let notify = Arc::new(Notify::new());
        self.draining
            .lock()
            .unwrap()
            .insert(key.clone(), Arc::clone(&notify));

        let manager = self.clone();
        let drain_timeout = Duration::from_secs(self.limits.drain_timeout_secs);
        tokio::spawn(async move {
            let finished = tokio::time::timeout(drain_timeout, notify.notified())
                .await
                .is_ok();
            manager.draining.lock().unwrap().remove(&key);

            if !finished {
                warn!(
                    queue = %worker.queue,
                    worker_id = %worker.id,
                    %reason,
                    "drain timed out, terminating with in-flight job"
                );
            }
            // Timeout escalates to a forced terminate.
            if let Err(e) = manager.terminate(&worker, !finished, replace).await {
                warn!(
                    queue = %worker.queue,
                    worker_id = %worker.id,
                    error = %e,
                    "drain termination failed"
                );
            }
        });

        Ok(())
    }

    /// Terminate a worker, remove its record, and spawn a replacement if
    /// the pool fell below its target.
    async fn terminate(
        &self,
        worker: &WorkerRecord,
        forced: bool,
        replace: bool,
    ) -> Result<(), LifecycleError> {
        let mut terminated = false;
        let mut last_error = String::new();
        for attempt in 0..SPAWN_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(self.retry_backoff * 2u32.pow(attempt - 1)).await;
            }
            match self.orchestrator.terminate_worker(&worker.id, forced).await {
                Ok(()) => {
                    terminated = true;
                    break;
                }
                Err(e) => {
                    warn!(worker_id = %worker.id, attempt = attempt + 1, error = %e, "terminate failed");
                    last_error = e.to_string();
                }
            }
        }

        if !terminated {
            self.surface(LifecycleCondition::TerminateFailed {
                queue: worker.queue.clone(),
                worker_id: worker.id.clone(),
                reason: last_error,
            });
            return Err(LifecycleError::TerminateFailed {
                worker_id: worker.id.clone(),
            });
        }

        self.state.delete_worker(&worker.queue, &worker.id)?;
        debug!(queue = %worker.queue, worker_id = %worker.id, forced, "worker terminated");

        if replace {
            let active = self.active_workers(&worker.queue)?.len() as u32;
            let target = self.target(&worker.queue).unwrap_or(active + 1);
            if active < target {
                self.spawn_recorded(&worker.queue).await;
            }
        }

        Ok(())
    }

    fn surface(&self, condition: LifecycleCondition) {
        if let Some(ref callback) = self.on_condition {
            callback(condition);
        }
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
