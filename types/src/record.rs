//! Tracked transaction records and history snapshots.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TxError;
use crate::hash::TxHash;
use crate::receipt::Receipt;
use crate::state::TxStatus;
use crate::time::Timestamp;

/// Caller-supplied annotation. Has no effect on tracking.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TxMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Free-form extra fields, stored verbatim.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TxMetadata {
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Default::default()
        }
    }
}

/// One tracked transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub submitted_at: Timestamp,
    pub status: TxStatus,
    /// Blocks mined on top of the including block. Absent until mined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TxError>,
    #[serde(default)]
    pub metadata: TxMetadata,
}

impl TransactionRecord {
    /// A freshly registered record in `Pending`.
    pub fn new(hash: TxHash, submitted_at: Timestamp, metadata: TxMetadata) -> Self {
        Self {
            hash,
            submitted_at,
            status: TxStatus::Pending,
            confirmations: None,
            receipt: None,
            error: None,
            metadata,
        }
    }

    /// Move to `next` if that is a forward transition.
    ///
    /// Returns `true` only when the status actually changed.
    pub fn advance(&mut self, next: TxStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    /// Record a confirmation count, never lowering a previously seen one.
    pub fn observe_confirmations(&mut self, confirmations: u64) {
        let current = self.confirmations.unwrap_or(0);
        self.confirmations = Some(current.max(confirmations));
    }
}

/// Immutable snapshot of a record taken when tracking concluded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// `"{hash}-{completed_at}"`, unique even when a hash is tracked again.
    pub id: String,
    pub record: TransactionRecord,
    pub completed_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl HistoryEntry {
    pub fn snapshot(record: &TransactionRecord, completed_at: Timestamp) -> Self {
        Self {
            id: format!("{}-{}", record.hash, completed_at.as_millis()),
            record: record.clone(),
            completed_at,
            expires_at: None,
        }
    }

    pub fn hash(&self) -> TxHash {
        self.record.hash
    }

    pub fn status(&self) -> TxStatus {
        self.record.status
    }

    /// Whether this entry survives a restore at `now` under `retention`.
    pub fn is_retained(&self, now: Timestamp, retention: Duration) -> bool {
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return false;
            }
        }
        !self.completed_at.has_expired(retention, now)
    }
}
