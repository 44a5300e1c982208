//! Bucket sizing and the named presets.

use ambience_types::time::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How many requests a key may make per time window.
///
/// In TOML the window is written in milliseconds (`time_window_ms`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket capacity, and tokens restored per elapsed window.
    pub max_requests: u32,

    #[serde(rename = "time_window_ms", with = "duration_ms")]
    pub time_window: Duration,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, time_window: Duration) -> Self {
        Self {
            max_requests,
            time_window,
        }
    }

    /// Chat messages: 10 per minute.
    pub const fn send_message() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    /// Room creation: 3 per minute.
    pub const fn create_room() -> Self {
        Self::new(3, Duration::from_secs(60))
    }

    /// Chain node calls: 20 per second.
    pub const fn rpc() -> Self {
        Self::new(20, Duration::from_secs(1))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::send_message()
    }
}
