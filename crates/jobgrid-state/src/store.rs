//! StateStore — redb-backed state persistence for JobGrid.
//!
//! Provides typed CRUD operations over scaling policies, worker records,
//! applied decision history, alert rules, alerts, and rate-limiter window
//! state. All values are JSON-serialized into redb's `&[u8]` value columns.
//! The store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Applied decisions retained per queue; older entries are pruned on append.
pub const DECISION_HISTORY_LIMIT: usize = 500;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(POLICIES).map_err(map_err!(Table))?;
        txn.open_table(WORKERS).map_err(map_err!(Table))?;
        txn.open_table(DECISIONS).map_err(map_err!(Table))?;
        txn.open_table(ALERT_RULES).map_err(map_err!(Table))?;
        txn.open_table(ALERTS).map_err(map_err!(Table))?;
        txn.open_table(RATE_LIMITERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Scaling policies ───────────────────────────────────────────

    /// Insert or replace a scaling policy. Callers must have validated the
    /// policy first; the single insert makes the replacement atomic.
    pub fn put_policy(&self, policy: &ScalingPolicy) -> StateResult<()> {
        let key = policy.table_key();
        let value = serde_json::to_vec(policy).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(queue = %key, "policy stored");
        Ok(())
    }

    /// Get the policy for a queue.
    pub fn get_policy(&self, queue: &str) -> StateResult<Option<ScalingPolicy>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
        match table.get(queue).map_err(map_err!(Read))? {
            Some(guard) => {
                let policy: ScalingPolicy =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(policy))
            }
            None => Ok(None),
        }
    }

    /// List all scaling policies.
    pub fn list_policies(&self) -> StateResult<Vec<ScalingPolicy>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let policy: ScalingPolicy =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(policy);
        }
        Ok(results)
    }

    /// Delete a queue's policy. Returns true if it existed.
    pub fn delete_policy(&self, queue: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            existed = table.remove(queue).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%queue, existed, "policy deleted");
        Ok(existed)
    }

    // ── Workers ────────────────────────────────────────────────────

    /// Insert or update a worker record.
    pub fn put_worker(&self, worker: &WorkerRecord) -> StateResult<()> {
        let key = worker.table_key();
        let value = serde_json::to_vec(worker).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a worker record by queue and worker ID.
    pub fn get_worker(&self, queue: &str, worker_id: &str) -> StateResult<Option<WorkerRecord>> {
        let key = format!("{queue}:{worker_id}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let worker: WorkerRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(worker))
            }
            None => Ok(None),
        }
    }

    /// List all worker records for a queue.
    pub fn list_workers_for_queue(&self, queue: &str) -> StateResult<Vec<WorkerRecord>> {
        let prefix = format!("{queue}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let worker: WorkerRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(worker);
            }
        }
        Ok(results)
    }

    /// Delete a worker record. Returns true if it existed.
    pub fn delete_worker(&self, queue: &str, worker_id: &str) -> StateResult<bool> {
        let key = format!("{queue}:{worker_id}");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Decision history ───────────────────────────────────────────

    /// Append an applied scaling decision, pruning the queue's history to
    /// [`DECISION_HISTORY_LIMIT`] entries.
    pub fn append_decision(&self, decision: &ScalingDecision) -> StateResult<()> {
        let key = decision.table_key();
        let prefix = format!("{}:", decision.queue);
        let value = serde_json::to_vec(decision).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DECISIONS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            // Zero-padded timestamps sort chronologically, so prefix order
            // is oldest-first.
            let keys: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    k.starts_with(&prefix).then_some(k)
                })
                .collect();
            if keys.len() > DECISION_HISTORY_LIMIT {
                for stale in &keys[..keys.len() - DECISION_HISTORY_LIMIT] {
                    table.remove(stale.as_str()).map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Recent applied decisions for a queue, most recent first.
    pub fn list_decisions(&self, queue: &str, limit: usize) -> StateResult<Vec<ScalingDecision>> {
        let prefix = format!("{queue}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DECISIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let decision: ScalingDecision =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(decision);
            }
        }
        // Prefix iteration is oldest-first; flip and cut.
        results.reverse();
        results.truncate(limit);
        Ok(results)
    }

    // ── Alert rules ────────────────────────────────────────────────

    /// Insert or replace an alert rule.
    pub fn put_alert_rule(&self, rule: &AlertRule) -> StateResult<()> {
        let key = rule.table_key();
        let value = serde_json::to_vec(rule).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ALERT_RULES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(alert_type = %key, "alert rule stored");
        Ok(())
    }

    /// Get an alert rule by alert type.
    pub fn get_alert_rule(&self, alert_type: &str) -> StateResult<Option<AlertRule>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALERT_RULES).map_err(map_err!(Table))?;
        match table.get(alert_type).map_err(map_err!(Read))? {
            Some(guard) => {
                let rule: AlertRule =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(rule))
            }
            None => Ok(None),
        }
    }

    /// List all alert rules.
    pub fn list_alert_rules(&self) -> StateResult<Vec<AlertRule>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALERT_RULES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let rule: AlertRule =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(rule);
        }
        Ok(results)
    }

    /// Delete an alert rule. Returns true if it existed.
    pub fn delete_alert_rule(&self, alert_type: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ALERT_RULES).map_err(map_err!(Table))?;
            existed = table.remove(alert_type).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Alerts ─────────────────────────────────────────────────────

    /// Insert or update an alert.
    pub fn put_alert(&self, alert: &Alert) -> StateResult<()> {
        let key = alert.table_key();
        let value = serde_json::to_vec(alert).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ALERTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get an alert by ID.
    pub fn get_alert(&self, alert_id: &str) -> StateResult<Option<Alert>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALERTS).map_err(map_err!(Table))?;
        match table.get(alert_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let alert: Alert =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(alert))
            }
            None => Ok(None),
        }
    }

    /// List all alerts, most recently triggered first.
    pub fn list_alerts(&self) -> StateResult<Vec<Alert>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ALERTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let alert: Alert =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(alert);
        }
        results.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        Ok(results)
    }

    /// Delete an alert. Returns true if it existed.
    pub fn delete_alert(&self, alert_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(ALERTS).map_err(map_err!(Table))?;
            existed = table.remove(alert_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Rate-limiter windows ───────────────────────────────────────

    /// Read-modify-write a limiter's windows inside one write transaction.
    ///
    /// redb allows a single write transaction at a time, so the closure is
    /// a serialized critical section: concurrent callers on the same store
    /// observe each other's increments.
    pub fn with_rate_windows<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Vec<RateWindow>) -> R,
    ) -> StateResult<R> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let result;
        {
            let mut table = txn.open_table(RATE_LIMITERS).map_err(map_err!(Table))?;
            let mut windows: Vec<RateWindow> = match table.get(name).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => Vec::new(),
            };
            result = f(&mut windows);
            let value = serde_json::to_vec(&windows).map_err(map_err!(Serialize))?;
            table
                .insert(name, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(result)
    }

    /// Read a limiter's windows without modifying them.
    pub fn rate_windows(&self, name: &str) -> StateResult<Option<Vec<RateWindow>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RATE_LIMITERS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let windows: Vec<RateWindow> =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(windows))
            }
            None => Ok(None),
        }
    }

    /// Names of all limiters with stored window state.
    pub fn list_limiter_names(&self) -> StateResult<Vec<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RATE_LIMITERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            results.push(key.value().to_string());
        }
        Ok(results)
    }
}
