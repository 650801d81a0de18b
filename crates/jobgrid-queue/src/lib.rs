//! jobgrid-queue — operator commands against the broker.
//!
//! The [`QueueController`] executes the four operator commands: pause,
//! resume, clean, and retry-failed. Commands run synchronously under a
//! caller-supplied timeout; on timeout the broker-side effect is
//! undefined and the controller reports [`CommandError::Timeout`] rather
//! than silently succeeding. Broker errors propagate verbatim inside a
//! wrapping error kind, and partial failure is never swallowed:
//! `retry_failed` reports a per-job outcome for every job it touched.

pub mod controller;

pub use controller::{CommandError, DEFAULT_COMMAND_TIMEOUT, QueueController, RetryReport};
