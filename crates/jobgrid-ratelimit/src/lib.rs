//! jobgrid-ratelimit — fixed-window rate limiting shared across callers.
//!
//! A named limiter carries 1-4 independent fixed windows (second, minute,
//! hour, day). A request is admitted only if every configured window is
//! under its limit, and the check-and-increment across all windows is one
//! atomic unit: either every window is incremented or none is.
//!
//! Counters live behind the [`LimiterStore`] abstraction rather than in
//! process memory, because workers run as multiple concurrent processes
//! that must share one budget. [`MemoryLimiterStore`] serializes through a
//! mutex; [`StateLimiterStore`] serializes through redb's single-writer
//! transactions, so every process opening the same database observes the
//! same counters.

pub mod limiter;
pub mod store;

pub use limiter::{LimiterConfig, RateLimitError, RateLimiter, WindowLimit, WindowStatus};
pub use store::{LimiterStore, MemoryLimiterStore, StateLimiterStore, StoreError};
