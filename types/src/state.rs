//! Transaction status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a tracked transaction stands.
///
/// Status only ever moves forward: `Pending -> Confirming -> {Success | Reverted}`,
/// or from `Pending`/`Confirming` straight to `Error`. `Idle` is reported for
/// hashes that are not tracked and never appears on a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Not tracked.
    Idle,
    /// Submitted, no receipt yet.
    Pending,
    /// Mined, waiting for the required number of confirmations.
    Confirming,
    /// Mined, executed successfully and sufficiently confirmed.
    Success,
    /// Mined, execution failed on-chain, sufficiently confirmed.
    Reverted,
    /// Tracking failed (timeout, network change, collaborator failure).
    Error,
}

impl TxStatus {
    /// Whether the tracker will not move this status any further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Reverted | Self::Error)
    }

    /// Whether the transaction is still being polled.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirming)
    }

    /// Whether a record in this status may move to `next`.
    ///
    /// Re-entering the same status is not a transition and returns `false`.
    pub fn can_advance_to(&self, next: TxStatus) -> bool {
        match self {
            Self::Idle => next == Self::Pending,
            Self::Pending => matches!(
                next,
                Self::Confirming | Self::Success | Self::Reverted | Self::Error
            ),
            Self::Confirming => matches!(next, Self::Success | Self::Reverted | Self::Error),
            Self::Success | Self::Reverted | Self::Error => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Confirming => "confirming",
            Self::Success => "success",
            Self::Reverted => "reverted",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
