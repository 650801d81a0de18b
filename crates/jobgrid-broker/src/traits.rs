//! Collaborator trait interfaces.
//!
//! [`JobBroker`] covers the queue backend: metrics snapshots, dispatch
//! pause/resume, and the job-level operations the queue controller needs.
//! [`WorkerOrchestrator`] covers the process manager that actually spawns
//! and terminates worker processes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use jobgrid_state::{ScalingMetrics, WorkerId};

use crate::error::{BrokerResult, OrchestratorResult};

/// Opaque job identifier assigned by the broker.
pub type JobId = String;

/// Job states the broker can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

/// Outcome of asking the broker to retry a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The job was re-enqueued.
    Retried,
    /// The job is at its max-attempts ceiling and was left failed.
    MaxAttempts,
}

/// The job broker as seen by the control plane.
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Current metrics snapshot for a queue.
    async fn queue_metrics(&self, queue: &str) -> BrokerResult<ScalingMetrics>;

    /// Stop dispatching jobs from a queue. Idempotent at the broker.
    async fn pause_dispatch(&self, queue: &str) -> BrokerResult<()>;

    /// Resume dispatching jobs from a queue. Idempotent at the broker.
    async fn resume_dispatch(&self, queue: &str) -> BrokerResult<()>;

    /// IDs of jobs in `status` older than `older_than_ms`, at most `limit`.
    async fn list_jobs(
        &self,
        queue: &str,
        status: JobStatus,
        older_than_ms: u64,
        limit: usize,
    ) -> BrokerResult<Vec<JobId>>;

    /// Remove the given jobs from a queue. Returns the number removed.
    async fn remove_jobs(&self, queue: &str, ids: &[JobId]) -> BrokerResult<u64>;

    /// Re-enqueue a failed job unless it is at its max-attempts ceiling.
    async fn retry_job(&self, queue: &str, id: &JobId) -> BrokerResult<RetryOutcome>;
}

/// The worker process orchestrator as seen by the control plane.
#[async_trait]
pub trait WorkerOrchestrator: Send + Sync {
    /// Spawn a worker process for a queue. Returns its ID once the spawn
    /// request is accepted; the worker comes online asynchronously.
    async fn spawn_worker(&self, queue: &str) -> OrchestratorResult<WorkerId>;

    /// Terminate a worker process. `forced` kills without waiting for the
    /// in-flight job.
    async fn terminate_worker(&self, worker_id: &str, forced: bool) -> OrchestratorResult<()>;
}
