//! Transaction receipt as returned by the chain once mined.

use serde::{Deserialize, Serialize};

use crate::hash::TxHash;

/// Outcome of a mined transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: TxHash,
    /// Number of the block that includes the transaction.
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    /// Execution status flag: `false` means the transaction reverted.
    pub success: bool,
    #[serde(default)]
    pub gas_used: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

impl Receipt {
    /// Blocks mined on top of the including block at `current_height`.
    ///
    /// The including block itself does not count: a receipt in the head block
    /// has zero confirmations, so even `confirmations = 1` waits for one more
    /// block before the transaction reads as `Success`. With 3 required, a
    /// transaction mined at N is still confirming at N+2 and final at N+3.
    ///
    /// A node lagging behind the one that produced the receipt reads as zero.
    pub fn confirmations_at(&self, current_height: u64) -> u64 {
        current_height.saturating_sub(self.block_number)
    }
}
