//! redb table definitions for the JobGrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow the pattern `{queue}:{child_id}` or
//! `{queue}:{zero-padded timestamp}` for prefix scans.

use redb::TableDefinition;

/// Scaling policies keyed by `{queue}`.
pub const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");

/// Worker records keyed by `{queue}:{worker_id}`.
pub const WORKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("workers");

/// Applied scaling decisions keyed by `{queue}:{decided_at:020}`.
pub const DECISIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("decisions");

/// Alert rules keyed by `{alert_type}`.
pub const ALERT_RULES: TableDefinition<&str, &[u8]> = TableDefinition::new("alert_rules");

/// Alerts keyed by `{alert_id}`.
pub const ALERTS: TableDefinition<&str, &[u8]> = TableDefinition::new("alerts");

/// Rate-limiter window state keyed by `{limiter_name}`.
pub const RATE_LIMITERS: TableDefinition<&str, &[u8]> = TableDefinition::new("rate_limiters");
