//! Cooldown tracking — last applied scale action per (queue, direction).
//!
//! Entries are recorded only when a non-maintain decision is actually
//! applied, so a breach observed during a failed resize is retried on the
//! next tick. Each queue's control loop owns its tracker; trackers are
//! never shared across loops.

use std::collections::HashMap;

use jobgrid_state::{QueueName, ScaleDirection};

/// Records the last applied scale-action timestamp per (queue, direction).
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: HashMap<(QueueName, ScaleDirection), u64>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the last action of this direction was applied, if ever.
    pub fn last_action(&self, queue: &str, direction: ScaleDirection) -> Option<u64> {
        self.entries
            .get(&(queue.to_string(), direction))
            .copied()
    }

    /// Record an applied action. Call only after the resize succeeded.
    pub fn record(&mut self, queue: &str, direction: ScaleDirection, at: u64) {
        self.entries.insert((queue.to_string(), direction), at);
    }

    /// True if no prior action exists or the cooldown has elapsed.
    pub fn ready(
        &self,
        queue: &str,
        direction: ScaleDirection,
        cooldown_secs: u64,
        now: u64,
    ) -> bool {
        match self.last_action(queue, direction) {
            Some(last) => now.saturating_sub(last) >= cooldown_secs,
            None => true,
        }
    }

    /// Drop all entries for a queue (on deregistration).
    pub fn forget_queue(&mut self, queue: &str) {
        self.entries.retain(|(q, _), _| q != queue);
    }
}
