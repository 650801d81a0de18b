//! Broker and orchestrator error types.

use thiserror::Error;

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors returned by a [`crate::JobBroker`] implementation.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors returned by a [`crate::WorkerOrchestrator`] implementation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("spawn failed for queue {queue}: {reason}")]
    SpawnFailed { queue: String, reason: String },

    #[error("terminate failed for worker {worker_id}: {reason}")]
    TerminateFailed { worker_id: String, reason: String },

    #[error("worker not found: {0}")]
    WorkerNotFound(String),
}
