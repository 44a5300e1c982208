use ambience_chain::ChainError;
use ambience_store::StoreError;
use ambience_types::{ErrorCode, Timestamp, TxError};
use thiserror::Error;

/// Failures of the tracker itself. Per-transaction failures never surface
/// here; they land on the record as a [`TxError`].
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Turn a collaborator error into the caller-facing shape.
///
/// Transport messages can carry URLs and other local detail, so only the
/// classification and the node's own RPC error text are passed through.
pub fn normalize_chain_error(err: &ChainError, now: Timestamp) -> TxError {
    match err {
        ChainError::NotYetMined => {
            TxError::new(ErrorCode::UnknownError, "transaction not yet mined", now)
        }
        ChainError::Transport(_) => {
            TxError::new(ErrorCode::NetworkError, "could not reach the chain node", now)
        }
        ChainError::Rpc { code, message, .. } => TxError::new(ErrorCode::RpcError, message, now)
            .with_details(format!("rpc code {code}")),
        ChainError::InvalidResponse(_) => TxError::new(
            ErrorCode::SerializationError,
            "unexpected response from the chain node",
            now,
        ),
        ChainError::Client(_) => {
            TxError::new(ErrorCode::UnknownError, "chain client unavailable", now)
        }
    }
}
