//! Nullable infrastructure for deterministic testing.
//!
//! Everything the tracker and rate limiter touch outside the process (wall
//! clock, chain node, persistent storage) sits behind a trait. This crate
//! provides implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod chain;
pub mod clock;
pub mod store;

pub use chain::NullChainClient;
pub use clock::NullClock;
pub use store::NullStore;
