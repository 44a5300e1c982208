//! Chain identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies which chain (network) the tracker is following.
///
/// Transactions tracked against one chain stop being meaningful once the
/// active chain changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const MAINNET: Self = Self(1);
    pub const SEPOLIA: Self = Self(11_155_111);

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Human-readable name for well-known chains.
    pub fn name(&self) -> &'static str {
        match self.0 {
            1 => "mainnet",
            11_155_111 => "sepolia",
            31_337 => "local",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
