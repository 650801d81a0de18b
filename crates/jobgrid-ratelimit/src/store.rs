//! Counter stores backing the rate limiter.
//!
//! A [`LimiterStore`] gives the limiter an atomic read-modify-write over
//! one limiter's windows. Both implementations guarantee that two
//! concurrent `update` calls for the same limiter never interleave.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use jobgrid_state::{RateWindow, StateStore};

/// Errors from a counter store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store error: {0}")]
    Backend(String),
}

/// Atomic access to a named limiter's window state.
pub trait LimiterStore: Send + Sync {
    /// Run `f` against the limiter's windows as one serialized critical
    /// section, persisting whatever `f` leaves behind. Returns `f`'s
    /// verdict (true = request admitted).
    fn update(
        &self,
        name: &str,
        f: &mut dyn FnMut(&mut Vec<RateWindow>) -> bool,
    ) -> Result<bool, StoreError>;

    /// Read the limiter's windows without modifying them.
    fn read(&self, name: &str) -> Result<Vec<RateWindow>, StoreError>;
}

/// Mutex-serialized in-memory store, for single-process deployments and
/// tests.
#[derive(Default)]
pub struct MemoryLimiterStore {
    limiters: Mutex<HashMap<String, Vec<RateWindow>>>,
}

impl MemoryLimiterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LimiterStore for MemoryLimiterStore {
    fn update(
        &self,
        name: &str,
        f: &mut dyn FnMut(&mut Vec<RateWindow>) -> bool,
    ) -> Result<bool, StoreError> {
        let mut limiters = self
            .limiters
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let windows = limiters.entry(name.to_string()).or_default();
        Ok(f(windows))
    }

    fn read(&self, name: &str) -> Result<Vec<RateWindow>, StoreError> {
        let limiters = self
            .limiters
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(limiters.get(name).cloned().unwrap_or_default())
    }
}

/// Store backed by the shared [`StateStore`].
///
/// redb allows one write transaction at a time, so
/// [`StateStore::with_rate_windows`] is the serialized critical section;
/// any process opening the same database shares the counters.
pub struct StateLimiterStore {
    state: StateStore,
}

impl StateLimiterStore {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }
}

impl LimiterStore for StateLimiterStore {
    fn update(
        &self,
        name: &str,
        f: &mut dyn FnMut(&mut Vec<RateWindow>) -> bool,
    ) -> Result<bool, StoreError> {
        self.state
            .with_rate_windows(name, |windows| f(windows))
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn read(&self, name: &str) -> Result<Vec<RateWindow>, StoreError> {
        self.state
            .rate_windows(name)
            .map(Option::unwrap_or_default)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
