//! jobgrid-control — the per-queue control loop.
//!
//! The [`ControlLoopScheduler`] runs one lightweight task per registered
//! queue on an independent timer. Within a queue the tick sequence is
//! serialized by single-task ownership, so two scaling decisions can
//! never race on the same cooldown entry or worker set; across queues
//! the loops run in parallel with no shared lock.
//!
//! A tick: fetch metrics (bounded by a timeout; failure skips the tick)
//! -> decide -> apply the resize -> record the cooldown and append the
//! decision -> evaluate recycle triggers -> evaluate alerts on the same
//! snapshot. Every failure is contained to the owning queue's loop.

pub mod scheduler;

pub use scheduler::{ControlLoopScheduler, condition_bridge};
