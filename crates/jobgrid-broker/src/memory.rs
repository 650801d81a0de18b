//! In-memory broker and orchestrator.
//!
//! Deterministic stand-ins for the external collaborators, used by the
//! test suites and the daemon's dev loop. Job ages are explicit fields
//! rather than wall-clock derived so tests control them exactly.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use jobgrid_state::{ScalingMetrics, WorkerId};

use crate::error::{BrokerError, BrokerResult, OrchestratorError, OrchestratorResult};
use crate::traits::{JobBroker, JobId, JobStatus, RetryOutcome, WorkerOrchestrator};

/// A simulated job held by the in-memory broker.
#[derive(Debug, Clone)]
pub struct SimJob {
    pub id: JobId,
    pub status: JobStatus,
    /// Age relative to "now" in milliseconds.
    pub age_ms: u64,
    pub attempts: u32,
    pub max_attempts: u32,
}

impl SimJob {
    /// A failed job with the given age and attempt counts.
    pub fn failed(id: &str, age_ms: u64, attempts: u32, max_attempts: u32) -> Self {
        Self {
            id: id.to_string(),
            status: JobStatus::Failed,
            age_ms,
            attempts,
            max_attempts,
        }
    }

    /// A completed job with the given age.
    pub fn completed(id: &str, age_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            status: JobStatus::Completed,
            age_ms,
            attempts: 1,
            max_attempts: 3,
        }
    }
}

struct QueueSim {
    paused: bool,
    /// When set, `queue_metrics` fails with `Unavailable`.
    metrics_unavailable: bool,
    metrics: ScalingMetrics,
    jobs: Vec<SimJob>,
}

/// In-memory [`JobBroker`].
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, QueueSim>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue with an initial metrics snapshot.
    pub fn add_queue(&self, queue: &str, metrics: ScalingMetrics) {
        let mut queues = self.queues.lock().unwrap();
        queues.insert(
            queue.to_string(),
            QueueSim {
                paused: false,
                metrics_unavailable: false,
                metrics,
                jobs: Vec::new(),
            },
        );
    }

    /// Replace a queue's metrics snapshot.
    pub fn set_metrics(&self, queue: &str, metrics: ScalingMetrics) {
        let mut queues = self.queues.lock().unwrap();
        if let Some(sim) = queues.get_mut(queue) {
            sim.metrics = metrics;
        }
    }

    /// Make `queue_metrics` fail for a queue, to exercise skipped ticks.
    pub fn set_metrics_unavailable(&self, queue: &str, unavailable: bool) {
        let mut queues = self.queues.lock().unwrap();
        if let Some(sim) = queues.get_mut(queue) {
            sim.metrics_unavailable = unavailable;
        }
    }

    /// Add a job to a queue.
    pub fn push_job(&self, queue: &str, job: SimJob) {
        let mut queues = self.queues.lock().unwrap();
        if let Some(sim) = queues.get_mut(queue) {
            sim.jobs.push(job);
        }
    }

    /// Whether dispatch is currently paused for a queue.
    pub fn is_paused(&self, queue: &str) -> bool {
        let queues = self.queues.lock().unwrap();
        queues.get(queue).map(|sim| sim.paused).unwrap_or(false)
    }

    /// A job's current state, for assertions.
    pub fn job(&self, queue: &str, id: &str) -> Option<SimJob> {
        let queues = self.queues.lock().unwrap();
        queues
            .get(queue)
            .and_then(|sim| sim.jobs.iter().find(|j| j.id == id).cloned())
    }

    /// Number of jobs currently held for a queue.
    pub fn job_count(&self, queue: &str) -> usize {
        let queues = self.queues.lock().unwrap();
        queues.get(queue).map(|sim| sim.jobs.len()).unwrap_or(0)
    }
}

#[async_trait]
impl JobBroker for MemoryBroker {
    async fn queue_metrics(&self, queue: &str) -> BrokerResult<ScalingMetrics> {
        let queues = self.queues.lock().unwrap();
        let sim = queues
            .get(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        if sim.metrics_unavailable {
            return Err(BrokerError::Unavailable(format!(
                "metrics collection failed for {queue}"
            )));
        }
        Ok(sim.metrics.clone())
    }

    async fn pause_dispatch(&self, queue: &str) -> BrokerResult<()> {
        let mut queues = self.queues.lock().unwrap();
        let sim = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        sim.paused = true;
        debug!(%queue, "dispatch paused");
        Ok(())
    }

    async fn resume_dispatch(&self, queue: &str) -> BrokerResult<()> {
        let mut queues = self.queues.lock().unwrap();
        let sim = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        sim.paused = false;
        debug!(%queue, "dispatch resumed");
        Ok(())
    }

    async fn list_jobs(
        &self,
        queue: &str,
        status: JobStatus,
        older_than_ms: u64,
        limit: usize,
    ) -> BrokerResult<Vec<JobId>> {
        let queues = self.queues.lock().unwrap();
        let sim = queues
            .get(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        Ok(sim
            .jobs
            .iter()
            .filter(|j| j.status == status && j.age_ms > older_than_ms)
            .take(limit)
            .map(|j| j.id.clone())
            .collect())
    }

    async fn remove_jobs(&self, queue: &str, ids: &[JobId]) -> BrokerResult<u64> {
        let mut queues = self.queues.lock().unwrap();
        let sim = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        let before = sim.jobs.len();
        sim.jobs.retain(|j| !ids.contains(&j.id));
        Ok((before - sim.jobs.len()) as u64)
    }

    async fn retry_job(&self, queue: &str, id: &JobId) -> BrokerResult<RetryOutcome> {
        let mut queues = self.queues.lock().unwrap();
        let sim = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        let job = sim
            .jobs
            .iter_mut()
            .find(|j| j.id == *id)
            .ok_or_else(|| BrokerError::JobNotFound(id.clone()))?;

        if job.attempts >= job.max_attempts {
            return Ok(RetryOutcome::MaxAttempts);
        }
        job.attempts += 1;
        job.status = JobStatus::Waiting;
        job.age_ms = 0;
        Ok(RetryOutcome::Retried)
    }
}

/// In-memory [`WorkerOrchestrator`].
///
/// Spawns are recorded, not executed; IDs are sequential. A configurable
/// number of upcoming spawns can be made to fail, to exercise the
/// lifecycle manager's retry path.
#[derive(Default)]
pub struct MemoryOrchestrator {
    counter: AtomicU64,
    fail_spawns: AtomicU64,
    spawned: Mutex<Vec<(String, WorkerId)>>,
    terminated: Mutex<Vec<(WorkerId, bool)>>,
}

impl MemoryOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` spawn calls fail.
    pub fn fail_next_spawns(&self, n: u64) {
        self.fail_spawns.store(n, Ordering::SeqCst);
    }

    /// All (queue, worker_id) spawn requests so far.
    pub fn spawned(&self) -> Vec<(String, WorkerId)> {
        self.spawned.lock().unwrap().clone()
    }

    /// All (worker_id, forced) terminate requests so far.
    pub fn terminated(&self) -> Vec<(WorkerId, bool)> {
        self.terminated.lock().unwrap().clone()
    }

    /// Number of successful spawns so far.
    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkerOrchestrator for MemoryOrchestrator {
    async fn spawn_worker(&self, queue: &str) -> OrchestratorResult<WorkerId> {
        let remaining = self.fail_spawns.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_spawns.store(remaining - 1, Ordering::SeqCst);
            return Err(OrchestratorError::SpawnFailed {
                queue: queue.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("wrk-{n}");
        self.spawned
            .lock()
            .unwrap()
            .push((queue.to_string(), id.clone()));
        debug!(%queue, worker_id = %id, "worker spawn requested");
        Ok(id)
    }

    async fn terminate_worker(&self, worker_id: &str, forced: bool) -> OrchestratorResult<()> {
        self.terminated
            .lock()
            .unwrap()
            .push((worker_id.to_string(), forced));
        debug!(%worker_id, forced, "worker terminate requested");
        Ok(())
    }
}
