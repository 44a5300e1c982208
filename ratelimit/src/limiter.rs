//! The keyed token-bucket limiter.

use ambience_types::{Clock, SystemClock, Timestamp};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RateLimitConfig;
use crate::error::RateLimitError;

/// Buckets untouched for this long are removed by [`RateLimiter::cleanup`].
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Result of a single admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Time until the next token, present only when denied.
    pub retry_after: Option<Duration>,
}

impl RateLimitDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }
}

/// Read-only view of a bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketStatus {
    pub tokens: u32,
    pub max_tokens: u32,
    /// When the next whole window elapses and tokens are restored.
    pub reset_time: Timestamp,
}

#[derive(Clone, Copy, Debug)]
struct TokenBucket {
    tokens: u32,
    last_refill: Timestamp,
    last_access: Timestamp,
}

impl TokenBucket {
    fn full(config: &RateLimitConfig, now: Timestamp) -> Self {
        Self {
            tokens: config.max_requests,
            last_refill: now,
            last_access: now,
        }
    }

    /// Credit one token per whole window since the last refill. The partial
    /// window carries over.
    fn refill(&mut self, config: &RateLimitConfig, now: Timestamp) {
        let window_ms = config.time_window.as_millis() as u64;
        if window_ms == 0 {
            self.tokens = config.max_requests;
            self.last_refill = now;
            return;
        }

        let elapsed_ms = now.as_millis().saturating_sub(self.last_refill.as_millis());
        let windows = elapsed_ms / window_ms;
        if windows > 0 {
            let added = u32::try_from(windows).unwrap_or(u32::MAX);
            self.tokens = self.tokens.saturating_add(added).min(config.max_requests);
            self.last_refill = Timestamp::new(self.last_refill.as_millis() + windows * window_ms);
        }
        // A smaller config applied to an existing bucket still caps it.
        self.tokens = self.tokens.min(config.max_requests);
    }

    fn retry_after(&self, config: &RateLimitConfig, now: Timestamp) -> Duration {
        config
            .time_window
            .saturating_sub(self.last_refill.elapsed_since(now))
    }

    fn reset_time(&self, config: &RateLimitConfig) -> Timestamp {
        self.last_refill.saturating_add(config.time_window)
    }
}

/// Token buckets keyed by caller-chosen strings.
///
/// Construct one per application and share it (it is `Send + Sync`); there
/// is no global instance.
pub struct RateLimiter {
    default_config: RateLimitConfig,
    stale_after: Duration,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self::with_clock(default_config, Arc::new(SystemClock))
    }

    pub fn with_clock(default_config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            default_config,
            stale_after: DEFAULT_STALE_AFTER,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Override how long an idle bucket survives [`cleanup`](Self::cleanup).
    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Consume one token for `key` if available.
    ///
    /// `config` falls back to the limiter's default.
    pub fn check_rate_limit(&self, key: &str, config: Option<&RateLimitConfig>) -> RateLimitDecision {
        let config = config.unwrap_or(&self.default_config);
        let now = self.clock.now();

        let mut buckets = self.buckets.lock();
        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(config, now));
        bucket.refill(config, now);
        bucket.last_access = now;

        if bucket.tokens > 0 {
            bucket.tokens -= 1;
            return RateLimitDecision::allow();
        }

        let retry_after = bucket.retry_after(config, now);
        tracing::debug!(key, retry_after_ms = retry_after.as_millis() as u64, "rate limited");
        RateLimitDecision::deny(retry_after)
    }

    /// Run `f` if `key` has a token.
    ///
    /// A denied call never runs `f`. When `f` fails its token is given back,
    /// so failed attempts do not count against the quota.
    pub async fn with_rate_limit<F, Fut, T, E>(
        &self,
        key: &str,
        config: Option<&RateLimitConfig>,
        f: F,
    ) -> Result<T, RateLimitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let decision = self.check_rate_limit(key, config);
        if let Some(retry_after) = decision.retry_after {
            return Err(RateLimitError::Limited { retry_after });
        }

        match f().await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.refund(key, config);
                Err(RateLimitError::Inner(e))
            }
        }
    }

    /// Return one token to `key`, never above capacity. A bucket removed in
    /// the meantime stays removed.
    fn refund(&self, key: &str, config: Option<&RateLimitConfig>) {
        let config = config.unwrap_or(&self.default_config);
        if let Some(bucket) = self.buckets.lock().get_mut(key) {
            bucket.tokens = bucket.tokens.saturating_add(1).min(config.max_requests);
        }
    }

    /// Drop buckets idle for longer than the staleness window. Returns how
    /// many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let stale_after = self.stale_after;
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.last_access.has_expired(stale_after, now));
        let removed = before - buckets.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = buckets.len(), "removed idle rate limit buckets");
        }
        removed
    }

    /// Forget `key`; its next check starts from a full bucket.
    pub fn reset_limit(&self, key: &str) {
        self.buckets.lock().remove(key);
    }

    /// Inspect `key` without consuming a token or creating a bucket.
    pub fn status(&self, key: &str, config: Option<&RateLimitConfig>) -> Option<BucketStatus> {
        let config = config.unwrap_or(&self.default_config);
        let now = self.clock.now();
        let mut bucket = *self.buckets.lock().get(key)?;
        bucket.refill(config, now);
        Some(BucketStatus {
            tokens: bucket.tokens,
            max_tokens: config.max_requests,
            reset_time: bucket.reset_time(config),
        })
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.lock().len()
    }
}
