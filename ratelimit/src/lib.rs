//! Keyed token-bucket rate limiting.
//!
//! A [`RateLimiter`] holds one bucket per caller-chosen key (an action name,
//! a user, an endpoint). Buckets are created full on first use and refilled
//! lazily by whole time windows. The limiter never schedules anything itself:
//! the owner calls [`RateLimiter::cleanup`] periodically to drop idle buckets.

pub mod config;
pub mod error;
pub mod limiter;

pub use config::RateLimitConfig;
pub use error::RateLimitError;
pub use limiter::{BucketStatus, RateLimitDecision, RateLimiter, DEFAULT_STALE_AFTER};
