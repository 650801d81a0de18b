//! The queue controller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use jobgrid_broker::{BrokerError, JobBroker, JobStatus, RetryOutcome};

/// Default command timeout when the caller does not configure one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from operator commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("broker error: {0}")]
    Broker(BrokerError),
}

impl From<BrokerError> for CommandError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::QueueNotFound(queue) => Self::QueueNotFound(queue),
            other => Self::Broker(other),
        }
    }
}

/// Per-job outcome summary of a retry-failed command.
///
/// `total == retried + failed` always holds; jobs at their max-attempts
/// ceiling are counted in `failed` and described in `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryReport {
    pub total: u64,
    pub retried: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

/// Executes operator commands against the broker.
#[derive(Clone)]
pub struct QueueController {
    broker: Arc<dyn JobBroker>,
    timeout: Duration,
}

impl QueueController {
    pub fn new(broker: Arc<dyn JobBroker>) -> Self {
        Self {
            broker,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the caller's command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Pause dispatch for a queue. Pausing an already-paused queue
    /// succeeds with no state change.
    pub async fn pause(&self, queue: &str) -> Result<(), CommandError> {
        self.bounded(self.broker.pause_dispatch(queue)).await??;
        info!(%queue, "queue paused");
        Ok(())
    }

    /// Resume dispatch for a queue. Idempotent like `pause`.
    pub async fn resume(&self, queue: &str) -> Result<(), CommandError> {
        self.bounded(self.broker.resume_dispatch(queue)).await??;
        info!(%queue, "queue resumed");
        Ok(())
    }

    /// Remove jobs in `status` older than `grace_ms`, at most `limit`.
    /// The limit bounds the broker scan; callers page through repeated
    /// calls for larger cleanups. Returns the number removed.
    pub async fn clean(
        &self,
        queue: &str,
        status: JobStatus,
        grace_ms: u64,
        limit: usize,
    ) -> Result<u64, CommandError> {
        let removed = self
            .bounded(async {
                let ids = self.broker.list_jobs(queue, status, grace_ms, limit).await?;
                if ids.is_empty() {
                    return Ok::<u64, BrokerError>(0);
                }
                self.broker.remove_jobs(queue, &ids).await
            })
            .await??;

        info!(%queue, ?status, grace_ms, removed, "queue cleaned");
        Ok(removed)
    }

    /// Retry failed jobs, up to `limit`. Jobs at their max-attempts
    /// ceiling are reported in `errors` and counted as `failed`.
    pub async fn retry_failed(&self, queue: &str, limit: usize) -> Result<RetryReport, CommandError> {
        let report = self
            .bounded(async {
                let ids = self
                    .broker
                    .list_jobs(queue, JobStatus::Failed, 0, limit)
                    .await?;

                let mut report = RetryReport::default();
                for id in &ids {
                    match self.broker.retry_job(queue, id).await {
                        Ok(RetryOutcome::Retried) => report.retried += 1,
                        Ok(RetryOutcome::MaxAttempts) => {
                            report.failed += 1;
                            report.errors.push(format!("{id}: max attempts reached"));
                        }
                        Err(e) => {
                            report.failed += 1;
                            report.errors.push(format!("{id}: {e}"));
                        }
                    }
                }
                report.total = report.retried + report.failed;
                Ok::<RetryReport, BrokerError>(report)
            })
            .await??;

        info!(
            %queue,
            total = report.total,
            retried = report.retried,
            failed = report.failed,
            "failed jobs retried"
        );
        Ok(report)
    }

    /// Run a command future under the configured timeout.
    async fn bounded<T, E>(
        &self,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<Result<T, E>, CommandError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result),
            Err(_) => {
                debug!(timeout = ?self.timeout, "command timed out");
                Err(CommandError::Timeout(self.timeout))
            }
        }
    }
}
