//! A [`ChainClient`] decorator that spends rate limit tokens per node call.

use ambience_chain::{ChainClient, ChainError};
use ambience_ratelimit::{RateLimitConfig, RateLimitError, RateLimiter};
use ambience_types::{Receipt, TxHash};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Bucket key for node calls.
pub const RPC_LIMIT_KEY: &str = "rpc";

/// Routes every call through a shared [`RateLimiter`]. Denied calls wait
/// out `retry_after` and try again rather than failing.
pub struct RateLimitedChainClient {
    inner: Arc<dyn ChainClient>,
    limiter: Arc<RateLimiter>,
    config: RateLimitConfig,
}

impl RateLimitedChainClient {
    pub fn new(inner: Arc<dyn ChainClient>, limiter: Arc<RateLimiter>, config: RateLimitConfig) -> Self {
        Self {
            inner,
            limiter,
            config,
        }
    }

    async fn throttled<T, F, Fut>(&self, call: F) -> Result<T, ChainError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        loop {
            match self
                .limiter
                .with_rate_limit(RPC_LIMIT_KEY, Some(&self.config), &call)
                .await
            {
                Ok(value) => return Ok(value),
                Err(RateLimitError::Inner(e)) => return Err(e),
                Err(RateLimitError::Limited { retry_after }) => {
                    tracing::trace!(retry_after_ms = retry_after.as_millis() as u64, "node call throttled");
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }
}

#[async_trait]
impl ChainClient for RateLimitedChainClient {
    async fn transaction_receipt(&self, hash: &TxHash) -> Result<Receipt, ChainError> {
        // An unmined lookup is still a node call and keeps its token.
        let receipt = self
            .throttled(|| async {
                match self.inner.transaction_receipt(hash).await {
                    Ok(receipt) => Ok(Some(receipt)),
                    Err(ChainError::NotYetMined) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await?;
        receipt.ok_or(ChainError::NotYetMined)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.throttled(|| self.inner.block_number()).await
    }

    async fn revert_reason(
        &self,
        hash: &TxHash,
        receipt: &Receipt,
    ) -> Result<Option<String>, ChainError> {
        self.throttled(|| self.inner.revert_reason(hash, receipt))
            .await
    }
}
