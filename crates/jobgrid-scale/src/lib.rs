//! jobgrid-scale — metrics-driven worker scaling decisions.
//!
//! The engine compares a queue's metrics snapshot against its policy
//! thresholds and emits one [`jobgrid_state::ScalingDecision`] per tick.
//! Scale-up triggers when ANY configured threshold is breached; scale-down
//! only when ALL configured thresholds are clear, which keeps a single
//! improving metric from flapping the pool. Cooldown windows per direction
//! prevent rapid oscillation.
//!
//! # Scaling Algorithm
//!
//! ```text
//! step   = max(1, round(current_workers * 0.2))
//!
//! if any up-threshold breached and up-cooldown elapsed:
//!     ScaleUp to min(max_workers, current + step)
//!
//! if all down-thresholds clear and down-cooldown elapsed:
//!     ScaleDown to max(min_workers, current - step)
//!
//! otherwise Maintain
//! ```
//!
//! `decide()` is a pure function of (policy, metrics, cooldowns, now); the
//! control loop records the cooldown only after the resize is applied, so
//! a failed resize is retried on the next tick.

pub mod cooldown;
pub mod engine;

pub use cooldown::CooldownTracker;
pub use engine::{SCALE_STEP_FRACTION, decide};
