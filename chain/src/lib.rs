//! Chain access for Ambience transaction tracking.
//!
//! The tracker only needs three things from a chain: a transaction's receipt,
//! the current block height, and (best effort) why a transaction reverted.
//! [`ChainClient`] captures exactly that; [`RpcChainClient`] implements it
//! over Ethereum JSON-RPC.

pub mod error;
pub mod revert;
pub mod rpc;

pub use error::ChainError;
pub use revert::{decode_revert_data, decode_revert_hex};
pub use rpc::RpcChainClient;

use ambience_types::{Receipt, TxHash};
use async_trait::async_trait;

/// Read access to a chain node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch the receipt for `hash`.
    ///
    /// Fails with [`ChainError::NotYetMined`] while the transaction has no receipt.
    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Receipt, ChainError>;

    /// Current block height.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Human-readable reason a mined transaction reverted, if recoverable.
    ///
    /// Best effort: callers treat any error as "no reason available".
    async fn revert_reason(
        &self,
        _hash: &TxHash,
        _receipt: &Receipt,
    ) -> Result<Option<String>, ChainError> {
        Ok(None)
    }
}
