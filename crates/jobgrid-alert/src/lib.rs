//! jobgrid-alert — threshold alerts with suppression and acknowledgment.
//!
//! The engine evaluates each configured [`jobgrid_state::AlertRule`]
//! against a queue's metrics snapshot, picks the highest breached
//! severity tier, and emits an alert unless the `(alert_type, period)`
//! signature fired within the last four hours. A suppressed alert still
//! has its `current_value` refreshed, so the open alert tracks the
//! incident without multiplying notifications.
//!
//! Acknowledgment is a small state machine
//! (`active -> acknowledged -> expired -> active`): an acknowledgment
//! holds for one hour, after which a still-breaching condition emits a
//! fresh alert. A severity escalation bypasses suppression outright.

pub mod engine;
pub mod suppression;

pub use engine::{AlertEngine, AlertError};
pub use suppression::{SuppressionCache, SuppressionEntry};
