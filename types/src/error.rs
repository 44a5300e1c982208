//! Error types shared across crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::time::Timestamp;

/// Failure to parse a hex-encoded hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseHashError {
    #[error("expected 64 hex digits, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Classification carried by a [`TxError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Mined, but execution failed on-chain.
    Reverted,
    /// No terminal state within the tracking timeout.
    Timeout,
    /// The active chain switched while tracking was in progress.
    NetworkChanged,
    /// Transport-level failure talking to the chain.
    NetworkError,
    /// The chain answered with an error.
    RpcError,
    /// A response or stored value could not be decoded.
    SerializationError,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reverted => "REVERTED",
            Self::Timeout => "TIMEOUT",
            Self::NetworkChanged => "NETWORK_CHANGED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::RpcError => "RPC_ERROR",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing error attached to a transaction record.
///
/// Carries no stack traces or internal identifiers, only what a UI would show.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxError {
    pub message: String,
    pub code: ErrorCode,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl TxError {
    pub fn new(code: ErrorCode, message: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            message: message.into(),
            code,
            timestamp,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Generic revert error, used when no reason could be recovered.
    pub fn reverted(timestamp: Timestamp) -> Self {
        Self::new(ErrorCode::Reverted, "transaction reverted", timestamp)
    }

    pub fn timeout(timestamp: Timestamp) -> Self {
        Self::new(
            ErrorCode::Timeout,
            "transaction was not confirmed in time",
            timestamp,
        )
    }

    pub fn network_changed(timestamp: Timestamp) -> Self {
        Self::new(
            ErrorCode::NetworkChanged,
            "network changed while transaction was pending",
            timestamp,
        )
    }
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}
