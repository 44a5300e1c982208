use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The chain has no receipt for the transaction yet.
    #[error("transaction not yet mined")]
    NotYetMined,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        /// Hex-encoded error payload, when the node supplied one.
        data: Option<String>,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("client error: {0}")]
    Client(String),
}

impl ChainError {
    pub fn is_not_yet_mined(&self) -> bool {
        matches!(self, Self::NotYetMined)
    }
}
