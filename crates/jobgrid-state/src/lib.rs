//! jobgrid-state — embedded state store for JobGrid.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state management for scaling policies, worker records, applied decision
//! history, alert rules, alerts, and rate-limiter window state.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{queue}`, `{queue}:{worker_id}`,
//! `{queue}:{zero-padded timestamp}`) enable efficient prefix scans for
//! related records.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks. Rate-limiter window state is only
//! mutated through [`StateStore::with_rate_windows`], which runs the caller's
//! closure inside a single write transaction so check-and-increment is a
//! serialized critical section.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;
pub mod validate;

pub use error::{StateError, StateResult};
pub use store::{DECISION_HISTORY_LIMIT, StateStore};
pub use types::*;
pub use validate::{
    ConfigError, MAX_WORKER_CEILING, MIN_COOLDOWN_SECS, MIN_LATENCY_THRESHOLD_MS,
    validate_alert_rule, validate_policy,
};
