use std::time::Duration;
use thiserror::Error;

/// Outcome of a rate-limited call that did not produce a value.
#[derive(Debug, Error)]
pub enum RateLimitError<E> {
    /// Denied before the call was made.
    #[error("rate limit exceeded, retry in {}ms", retry_after.as_millis())]
    Limited { retry_after: Duration },

    /// The call itself failed; its token was refunded.
    #[error(transparent)]
    Inner(E),
}

impl<E> RateLimitError<E> {
    /// How long to wait before retrying, if the call was denied.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Limited { retry_after } => Some(*retry_after),
            Self::Inner(_) => None,
        }
    }

    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}
