//! Transaction confirmation tracking.
//!
//! [`TransactionTracker`] follows submitted transactions until they reach a
//! terminal status:
//! - polls the injected [`ChainClient`](ambience_chain::ChainClient) with
//!   exponential backoff until a receipt appears and is confirmed deeply enough
//! - fails transactions that exceed the tracking timeout or whose network
//!   changed underneath them
//! - records concluded transactions into a bounded history, optionally saved
//!   through a [`PersistenceStore`](ambience_store::PersistenceStore)
//! - reports every transition to a [`TrackerObserver`]

pub mod backoff;
pub mod config;
pub mod error;
pub mod history;
pub mod observer;
pub mod tracker;

pub use backoff::Backoff;
pub use config::TrackerConfig;
pub use error::{normalize_chain_error, TrackerError};
pub use history::TransactionHistory;
pub use observer::{ClosureObserver, NoopObserver, TrackerObserver};
pub use tracker::{TrackerBuilder, TransactionTracker};
