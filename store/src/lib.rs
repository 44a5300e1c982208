//! Abstract persistence for Ambience transaction tracking.
//!
//! The tracker keeps its history under a single well-known key and rewrites
//! the whole value on every change. Any backend (browser storage bridge,
//! file system, in-memory for testing) implements [`PersistenceStore`]; the
//! rest of the codebase depends only on the trait.

pub mod error;
pub mod file;

pub use error::StoreError;
pub use file::FileStore;

use async_trait::async_trait;

/// Durable string key/value storage.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Load the value stored under `key`, or `None` if absent.
    async fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
