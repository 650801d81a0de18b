//! Recycle triggers — when a worker must be replaced.
//!
//! Evaluated per worker on every tick, independent of scaling. A memory
//! breach forces an immediate recycle; job-count and uptime triggers wait
//! for the in-flight job.

use serde::{Deserialize, Serialize};

use jobgrid_state::{WorkerRecord, WorkerState};

/// Resource and age limits that force a worker to recycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecycleLimits {
    /// Resident memory (MB) above which a worker is recycled immediately.
    pub memory_hard_limit_mb: u64,
    /// Jobs processed after which a worker is gracefully recycled.
    pub max_jobs_processed: u64,
    /// Uptime (seconds) after which a worker is gracefully recycled.
    pub max_uptime_secs: u64,
    /// How long a draining worker may keep its in-flight job.
    pub drain_timeout_secs: u64,
}

impl Default for RecycleLimits {
    fn default() -> Self {
        Self {
            memory_hard_limit_mb: 512,
            max_jobs_processed: 1000,
            max_uptime_secs: 4 * 3600,
            drain_timeout_secs: 30,
        }
    }
}

/// Why a worker is being recycled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum RecycleTrigger {
    /// Over the memory hard limit; terminated without grace.
    MemoryHardLimit { memory_mb: u64, limit_mb: u64 },
    /// Processed its job budget; drained after the current job.
    JobsProcessed { jobs: u64, limit: u64 },
    /// Exceeded its age budget; drained after the current job.
    MaxUptime { uptime_secs: u64, limit_secs: u64 },
}

impl RecycleTrigger {
    /// True when the trigger terminates without waiting for the
    /// in-flight job.
    pub fn forced(&self) -> bool {
        matches!(self, Self::MemoryHardLimit { .. })
    }

    /// Reason string recorded against the recycle.
    pub fn describe(&self) -> String {
        match self {
            Self::MemoryHardLimit { memory_mb, limit_mb } => {
                format!("memory {memory_mb} MB over hard limit {limit_mb} MB")
            }
            Self::JobsProcessed { jobs, limit } => {
                format!("processed {jobs} jobs (limit {limit})")
            }
            Self::MaxUptime {
                uptime_secs,
                limit_secs,
            } => format!("uptime {uptime_secs}s over limit {limit_secs}s"),
        }
    }
}

/// Evaluate the recycle triggers for a worker. Memory wins over the
/// graceful triggers; draining and terminated workers never re-trigger.
pub fn evaluate(worker: &WorkerRecord, limits: &RecycleLimits, now: u64) -> Option<RecycleTrigger> {
    if worker.state != WorkerState::Active {
        return None;
    }

    if worker.memory_mb >= limits.memory_hard_limit_mb {
        return Some(RecycleTrigger::MemoryHardLimit {
            memory_mb: worker.memory_mb,
            limit_mb: limits.memory_hard_limit_mb,
        });
    }
    if worker.jobs_processed >= limits.max_jobs_processed {
        return Some(RecycleTrigger::JobsProcessed {
            jobs: worker.jobs_processed,
            limit: limits.max_jobs_processed,
        });
    }
    let uptime = worker.uptime_secs(now);
    if uptime >= limits.max_uptime_secs {
        return Some(RecycleTrigger::MaxUptime {
            uptime_secs: uptime,
            limit_secs: limits.max_uptime_secs,
        });
    }

    None
}
