//! jobgrid-worker — worker pool lifecycle management.
//!
//! The [`WorkerLifecycleManager`] keeps each queue's worker pool at the
//! target the scaling engine asks for, evaluates per-worker recycle
//! triggers on every tick, and drives the graceful drain protocol:
//! a draining worker takes no new jobs, gets up to 30 seconds to finish
//! its in-flight job, and is then terminated unconditionally. Recycled
//! workers are replaced so recycling never counts as a scale-down.
//!
//! Spawn failures are retried with exponential backoff and surfaced to
//! the alert engine through a callback; they never crash the control loop.

pub mod manager;
pub mod recycle;

pub use manager::{
    ConditionCallback, LifecycleCondition, LifecycleError, SPAWN_RETRY_ATTEMPTS,
    WorkerLifecycleManager,
};
pub use recycle::{RecycleLimits, RecycleTrigger};
