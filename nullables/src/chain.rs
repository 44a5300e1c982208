//! Nullable chain: a scriptable node for testing.

use ambience_chain::{ChainClient, ChainError};
use ambience_types::{Receipt, TxHash};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

/// A chain node whose receipts and height are set by the test.
///
/// Hashes with no scripted receipt report [`ChainError::NotYetMined`].
/// Receipt lookups can be held at a gate with [`pause`](Self::pause) to
/// simulate a slow node while the test acts on the tracker.
pub struct NullChainClient {
    state: Mutex<ChainState>,
    gate: watch::Sender<bool>,
}

#[derive(Default)]
struct ChainState {
    height: u64,
    receipts: HashMap<TxHash, Result<Receipt, ChainError>>,
    revert_reasons: HashMap<TxHash, String>,
    block_error: Option<ChainError>,
    receipt_calls: HashMap<TxHash, usize>,
    block_calls: usize,
}

impl NullChainClient {
    pub fn new(height: u64) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(ChainState {
                height,
                ..ChainState::default()
            }),
            gate,
        }
    }

    pub fn height(&self) -> u64 {
        self.state.lock().unwrap().height
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    /// Mine `n` more blocks.
    pub fn advance_blocks(&self, n: u64) {
        self.state.lock().unwrap().height += n;
    }

    /// Include `hash` in `block_number` with the given execution status.
    pub fn mine(&self, hash: TxHash, block_number: u64, success: bool) {
        self.set_receipt(Receipt {
            transaction_hash: hash,
            block_number,
            block_hash: Some(format!("0x{:064x}", block_number)),
            success,
            gas_used: 21_000,
            from: None,
            to: None,
            contract_address: None,
        });
    }

    pub fn set_receipt(&self, receipt: Receipt) {
        self.state
            .lock()
            .unwrap()
            .receipts
            .insert(receipt.transaction_hash, Ok(receipt));
    }

    /// Make receipt lookups for `hash` fail with `err`.
    pub fn fail_receipt(&self, hash: TxHash, err: ChainError) {
        self.state.lock().unwrap().receipts.insert(hash, Err(err));
    }

    /// Make block height lookups fail with `err`, or succeed again with `None`.
    pub fn fail_block_number(&self, err: Option<ChainError>) {
        self.state.lock().unwrap().block_error = err;
    }

    pub fn set_revert_reason(&self, hash: TxHash, reason: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .revert_reasons
            .insert(hash, reason.into());
    }

    /// Number of receipt lookups made for `hash`.
    pub fn receipt_calls(&self, hash: &TxHash) -> usize {
        self.state
            .lock()
            .unwrap()
            .receipt_calls
            .get(hash)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_receipt_calls(&self) -> usize {
        self.state.lock().unwrap().receipt_calls.values().sum()
    }

    pub fn block_calls(&self) -> usize {
        self.state.lock().unwrap().block_calls
    }

    /// Hold every subsequent receipt lookup until [`release`](Self::release).
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Receipt lookups currently waiting at the gate.
    pub fn in_flight(&self) -> usize {
        self.gate.receiver_count()
    }
}

impl Default for NullChainClient {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl ChainClient for NullChainClient {
    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Receipt, ChainError> {
        *self
            .state
            .lock()
            .unwrap()
            .receipt_calls
            .entry(*hash)
            .or_default() += 1;

        let mut gate = self.gate.subscribe();
        let opened = gate.wait_for(|open| *open).await.is_ok();
        drop(gate);
        if !opened {
            return Err(ChainError::Client("null chain gate closed".into()));
        }

        self.state
            .lock()
            .unwrap()
            .receipts
            .get(hash)
            .cloned()
            .unwrap_or(Err(ChainError::NotYetMined))
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.block_calls += 1;
        match &state.block_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.height),
        }
    }

    async fn revert_reason(
        &self,
        hash: &TxHash,
        _receipt: &Receipt,
    ) -> Result<Option<String>, ChainError> {
        Ok(self.state.lock().unwrap().revert_reasons.get(hash).cloned())
    }
}
