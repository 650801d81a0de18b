//! Time-windowed alert dedup keyed by `(alert_type, period)`.

use std::collections::HashMap;

use jobgrid_state::{AlertId, AlertSeverity, SUPPRESSION_WINDOW_SECS};

/// Dedup signature of an alert.
pub type Signature = (String, u64);

/// One live suppression entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppressionEntry {
    /// The alert currently representing this signature.
    pub alert_id: AlertId,
    /// Severity of that alert; higher breaches bypass suppression.
    pub severity: AlertSeverity,
    /// When the signature last fired a fresh alert.
    pub suppressed_at: u64,
}

/// In-memory suppression cache. Entries outside the window are ignored
/// on lookup and dropped on prune.
#[derive(Debug, Default)]
pub struct SuppressionCache {
    entries: HashMap<Signature, SuppressionEntry>,
}

impl SuppressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live entry for a signature, if it fired within the window.
    pub fn lookup(&self, signature: &Signature, now: u64) -> Option<&SuppressionEntry> {
        self.entries
            .get(signature)
            .filter(|entry| now.saturating_sub(entry.suppressed_at) < SUPPRESSION_WINDOW_SECS)
    }

    /// Record a fresh alert for a signature.
    pub fn insert(&mut self, signature: Signature, entry: SuppressionEntry) {
        self.entries.insert(signature, entry);
    }

    /// Drop a signature (its condition cleared).
    pub fn remove(&mut self, signature: &Signature) {
        self.entries.remove(signature);
    }

    /// Drop every entry outside the suppression window.
    pub fn prune(&mut self, now: u64) {
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.suppressed_at) < SUPPRESSION_WINDOW_SECS);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(alert_id: &str, at: u64) -> SuppressionEntry {
        SuppressionEntry {
            alert_id: alert_id.to_string(),
            severity: AlertSeverity::Warning,
            suppressed_at: at,
        }
    }

    fn sig(alert_type: &str) -> Signature {
        (alert_type.to_string(), 300)
    }

    #[test]
    fn lookup_within_window() {
        let mut cache = SuppressionCache::new();
        cache.insert(sig("queue_backlog"), entry("al-1", 1000));

        assert!(cache.lookup(&sig("queue_backlog"), 1000).is_some());
        assert!(
            cache
                .lookup(&sig("queue_backlog"), 1000 + SUPPRESSION_WINDOW_SECS - 1)
                .is_some()
        );
    }

    #[test]
    fn lookup_outside_window_is_none() {
        let mut cache = SuppressionCache::new();
        cache.insert(sig("queue_backlog"), entry("al-1", 1000));

        assert!(
            cache
                .lookup(&sig("queue_backlog"), 1000 + SUPPRESSION_WINDOW_SECS)
                .is_none()
        );
    }

    #[test]
    fn signatures_differ_by_period() {
        let mut cache = SuppressionCache::new();
        cache.insert(("queue_backlog".to_string(), 300), entry("al-1", 1000));

        assert!(
            cache
                .lookup(&("queue_backlog".to_string(), 600), 1000)
                .is_none()
        );
    }

    #[test]
    fn prune_drops_stale_entries() {
        let mut cache = SuppressionCache::new();
        cache.insert(sig("old"), entry("al-1", 0));
        cache.insert(sig("fresh"), entry("al-2", 20_000));

        cache.prune(SUPPRESSION_WINDOW_SECS + 100);

        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(&sig("fresh"), 20_100).is_some());
    }
}
