//! The rate limiter core.
//!
//! `try_consume` rolls over any expired windows, then admits the request
//! only if every configured window is under its limit. Increments are
//! all-or-nothing: a single saturated window leaves every other window
//! untouched, so concurrent callers can never jointly exceed a limit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use jobgrid_state::{RateWindow, WindowGranularity};

use crate::store::{LimiterStore, StoreError};

/// Maximum number of windows a limiter may configure.
pub const MAX_WINDOWS: usize = 4;

/// Limit for one granularity of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub granularity: WindowGranularity,
    pub limit: u64,
}

/// Configuration of one named limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    pub name: String,
    pub windows: Vec<WindowLimit>,
}

/// Point-in-time view of one window, for the admin surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowStatus {
    pub granularity: WindowGranularity,
    pub current: u64,
    pub limit: u64,
    pub remaining: u64,
    pub resets_at: u64,
}

/// Errors from limiter operations. A denied request is NOT an error; it is
/// `Ok(false)` from `try_consume`.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("unknown limiter: {0}")]
    UnknownLimiter(String),

    #[error("limiter {name}: {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Multi-window fixed-window rate limiter over a shared counter store.
pub struct RateLimiter {
    store: Arc<dyn LimiterStore>,
    configs: HashMap<String, Vec<WindowLimit>>,
}

impl RateLimiter {
    /// Create a limiter with no registered names.
    pub fn new(store: Arc<dyn LimiterStore>) -> Self {
        Self {
            store,
            configs: HashMap::new(),
        }
    }

    /// Register (or replace) a named limiter's window configuration.
    pub fn register(&mut self, config: LimiterConfig) -> Result<(), RateLimitError> {
        let invalid = |reason: &str| RateLimitError::InvalidConfig {
            name: config.name.clone(),
            reason: reason.to_string(),
        };

        if config.windows.is_empty() || config.windows.len() > MAX_WINDOWS {
            return Err(invalid("between 1 and 4 windows required"));
        }
        if config.windows.iter().any(|w| w.limit == 0) {
            return Err(invalid("window limits must be positive"));
        }
        for (i, w) in config.windows.iter().enumerate() {
            if config.windows[..i]
                .iter()
                .any(|other| other.granularity == w.granularity)
            {
                return Err(invalid("duplicate window granularity"));
            }
        }

        self.configs.insert(config.name, config.windows);
        Ok(())
    }

    /// Registered limiter names.
    pub fn limiter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Try to consume one permit from every window of the named limiter.
    ///
    /// Returns `Ok(false)` when any window is saturated; in that case no
    /// window is incremented.
    pub fn try_consume(&self, name: &str) -> Result<bool, RateLimitError> {
        self.try_consume_at(name, epoch_secs())
    }

    /// `try_consume` with an explicit clock, for deterministic tests.
    pub fn try_consume_at(&self, name: &str, now: u64) -> Result<bool, RateLimitError> {
        let limits = self
            .configs
            .get(name)
            .ok_or_else(|| RateLimitError::UnknownLimiter(name.to_string()))?;

        let allowed = self.store.update(name, &mut |windows| {
            sync_windows(windows, limits, now);
            if windows.iter().all(|w| w.current < w.limit) {
                for w in windows.iter_mut() {
                    w.current += 1;
                }
                true
            } else {
                false
            }
        })?;

        if !allowed {
            debug!(limiter = %name, "request denied by rate limit");
        }
        Ok(allowed)
    }

    /// Per-window status snapshot for the named limiter.
    pub fn status(&self, name: &str) -> Result<Vec<WindowStatus>, RateLimitError> {
        self.status_at(name, epoch_secs())
    }

    /// `status` with an explicit clock, for deterministic tests.
    ///
    /// Read-only: an expired stored window is reported as empty without
    /// being rewritten.
    pub fn status_at(&self, name: &str, now: u64) -> Result<Vec<WindowStatus>, RateLimitError> {
        let limits = self
            .configs
            .get(name)
            .ok_or_else(|| RateLimitError::UnknownLimiter(name.to_string()))?;

        let stored = self.store.read(name)?;
        let statuses = limits
            .iter()
            .map(|l| {
                let live = stored
                    .iter()
                    .find(|w| w.granularity == l.granularity)
                    .filter(|w| now < w.resets_at());
                let current = live.map(|w| w.current).unwrap_or(0);
                let window_start = live
                    .map(|w| w.window_start_at)
                    .unwrap_or_else(|| l.granularity.window_start(now));
                WindowStatus {
                    granularity: l.granularity,
                    current,
                    limit: l.limit,
                    remaining: l.limit.saturating_sub(current),
                    resets_at: window_start + l.granularity.secs(),
                }
            })
            .collect();
        Ok(statuses)
    }
}

/// Bring stored windows in line with the configuration and roll over any
/// window whose boundary has passed. Counts only ever reset at the
/// boundary; within a window they are monotonically non-decreasing.
fn sync_windows(windows: &mut Vec<RateWindow>, limits: &[WindowLimit], now: u64) {
    windows.retain(|w| limits.iter().any(|l| l.granularity == w.granularity));

    for l in limits {
        match windows.iter_mut().find(|w| w.granularity == l.granularity) {
            Some(w) => {
                w.limit = l.limit;
                if now >= w.resets_at() {
                    w.current = 0;
                    w.window_start_at = l.granularity.window_start(now);
                }
            }
            None => windows.push(RateWindow::new(l.granularity, l.limit, now)),
        }
    }
}

/// Current Unix epoch in seconds.
fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLimiterStore;

    fn limiter_with(name: &str, windows: Vec<WindowLimit>) -> RateLimiter {
        let mut limiter = RateLimiter::new(Arc::new(MemoryLimiterStore::new()));
        limiter
            .register(LimiterConfig {
                name: name.to_string(),
                windows,
            })
            .unwrap();
        limiter
    }

    fn minute(limit: u64) -> WindowLimit {
        WindowLimit {
            granularity: WindowGranularity::Minute,
            limit,
        }
    }

    fn hour(limit: u64) -> WindowLimit {
        WindowLimit {
            granularity: WindowGranularity::Hour,
            limit,
        }
    }

    #[test]
    fn admits_until_limit_then_denies() {
        let limiter = limiter_with("api", vec![minute(3)]);

        let now = 1_000_000;
        assert!(limiter.try_consume_at("api", now).unwrap());
        assert!(limiter.try_consume_at("api", now).unwrap());
        assert!(limiter.try_consume_at("api", now).unwrap());
        assert!(!limiter.try_consume_at("api", now).unwrap());
    }

    #[test]
    fn window_resets_at_boundary() {
        let limiter = limiter_with("api", vec![minute(1)]);

        // 1_000_020 is a minute boundary.
        assert!(limiter.try_consume_at("api", 1_000_025).unwrap());
        assert!(!limiter.try_consume_at("api", 1_000_079).unwrap());
        // Next minute window starts at 1_000_080.
        assert!(limiter.try_consume_at("api", 1_000_080).unwrap());
    }

    #[test]
    fn saturated_window_blocks_without_incrementing_others() {
        let limiter = limiter_with("api", vec![minute(2), hour(100)]);
        let now = 1_000_000;

        assert!(limiter.try_consume_at("api", now).unwrap());
        assert!(limiter.try_consume_at("api", now).unwrap());
        // Minute window saturated: denied, and the hour count must NOT move.
        assert!(!limiter.try_consume_at("api", now).unwrap());
        assert!(!limiter.try_consume_at("api", now).unwrap());

        let status = limiter.status_at("api", now).unwrap();
        assert_eq!(status[0].current, 2); // minute
        assert_eq!(status[1].current, 2); // hour: only the admitted calls
    }

    #[test]
    fn hour_budget_outlives_minute_windows() {
        let limiter = limiter_with("api", vec![minute(2), hour(3)]);

        let minute_one = 1_000_020;
        assert!(limiter.try_consume_at("api", minute_one).unwrap());
        assert!(limiter.try_consume_at("api", minute_one).unwrap());

        // Fresh minute window, but the hour window has a single permit left.
        let minute_two = minute_one + 60;
        assert!(limiter.try_consume_at("api", minute_two).unwrap());
        assert!(!limiter.try_consume_at("api", minute_two).unwrap());
    }

    #[test]
    fn status_reports_remaining_and_reset() {
        let limiter = limiter_with("api", vec![minute(10)]);
        let now = 1_000_025; // window start 1_000_020

        limiter.try_consume_at("api", now).unwrap();
        limiter.try_consume_at("api", now).unwrap();

        let status = limiter.status_at("api", now).unwrap();
        assert_eq!(
            status,
            vec![WindowStatus {
                granularity: WindowGranularity::Minute,
                current: 2,
                limit: 10,
                remaining: 8,
                resets_at: 1_000_080,
            }]
        );
    }

    #[test]
    fn status_of_expired_window_reads_empty() {
        let limiter = limiter_with("api", vec![minute(10)]);

        limiter.try_consume_at("api", 1_000_025).unwrap();
        let status = limiter.status_at("api", 1_000_085).unwrap();
        assert_eq!(status[0].current, 0);
        assert_eq!(status[0].remaining, 10);
        assert_eq!(status[0].resets_at, 1_000_140);
    }

    #[test]
    fn status_before_first_consume() {
        let limiter = limiter_with("api", vec![minute(10)]);
        let status = limiter.status_at("api", 1_000_025).unwrap();
        assert_eq!(status[0].current, 0);
        assert_eq!(status[0].remaining, 10);
    }

    #[test]
    fn unknown_limiter_is_an_error() {
        let limiter = RateLimiter::new(Arc::new(MemoryLimiterStore::new()));
        assert!(matches!(
            limiter.try_consume_at("nope", 0),
            Err(RateLimitError::UnknownLimiter(_))
        ));
        assert!(matches!(
            limiter.status_at("nope", 0),
            Err(RateLimitError::UnknownLimiter(_))
        ));
    }

    #[test]
    fn register_rejects_bad_configs() {
        let mut limiter = RateLimiter::new(Arc::new(MemoryLimiterStore::new()));

        assert!(matches!(
            limiter.register(LimiterConfig {
                name: "api".to_string(),
                windows: vec![],
            }),
            Err(RateLimitError::InvalidConfig { .. })
        ));
        assert!(matches!(
            limiter.register(LimiterConfig {
                name: "api".to_string(),
                windows: vec![minute(0)],
            }),
            Err(RateLimitError::InvalidConfig { .. })
        ));
        assert!(matches!(
            limiter.register(LimiterConfig {
                name: "api".to_string(),
                windows: vec![minute(1), minute(2)],
            }),
            Err(RateLimitError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn limit_change_applies_to_live_window() {
        let store = Arc::new(MemoryLimiterStore::new());
        let mut limiter = RateLimiter::new(Arc::clone(&store) as Arc<dyn LimiterStore>);
        limiter
            .register(LimiterConfig {
                name: "api".to_string(),
                windows: vec![minute(1)],
            })
            .unwrap();

        let now = 1_000_000;
        assert!(limiter.try_consume_at("api", now).unwrap());
        assert!(!limiter.try_consume_at("api", now).unwrap());

        // Raising the limit mid-window keeps the current count.
        limiter
            .register(LimiterConfig {
                name: "api".to_string(),
                windows: vec![minute(3)],
            })
            .unwrap();
        assert!(limiter.try_consume_at("api", now).unwrap());

        let status = limiter.status_at("api", now).unwrap();
        assert_eq!(status[0].current, 2);
        assert_eq!(status[0].limit, 3);
    }

    #[test]
    fn concurrent_callers_never_exceed_any_window() {
        let limiter = std::sync::Arc::new(limiter_with("api", vec![minute(30), hour(30)]));
        let now = 1_000_000;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = std::sync::Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                let mut admitted = 0u64;
                for _ in 0..10 {
                    if limiter.try_consume_at("api", now).unwrap() {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }

        let total: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // 100 attempts against a budget of 30: exactly 30 admitted.
        assert_eq!(total, 30);

        let status = limiter.status_at("api", now).unwrap();
        assert_eq!(status[0].current, 30);
        assert_eq!(status[1].current, 30);
    }
}
