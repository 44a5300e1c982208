//! Fundamental types for Ambience transaction tracking.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! transaction hashes, chain identifiers, timestamps and clocks, transaction
//! statuses, receipts, structured errors, and the tracked/history records.

pub mod error;
pub mod hash;
pub mod network;
pub mod receipt;
pub mod record;
pub mod state;
pub mod time;

pub use error::{ErrorCode, ParseHashError, TxError};
pub use hash::TxHash;
pub use network::ChainId;
pub use receipt::Receipt;
pub use record::{HistoryEntry, TransactionRecord, TxMetadata};
pub use state::TxStatus;
pub use time::{Clock, SystemClock, Timestamp};
