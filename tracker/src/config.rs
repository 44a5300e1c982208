//! Tracker configuration with TOML support.

use ambience_types::time::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backoff::Backoff;
use crate::TrackerError;

/// Store key the history list is saved under.
pub const HISTORY_KEY: &str = "transaction_history";

/// Configuration for a [`TransactionTracker`](crate::TransactionTracker).
///
/// Durations are written in TOML as milliseconds (`*_ms` keys).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Blocks required on top of the including block before a transaction is final.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Whether history survives restarts through the persistence store.
    #[serde(default = "default_true")]
    pub persist: bool,

    /// Maximum retained history entries; the oldest are evicted first.
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,

    /// Delay before the second poll.
    #[serde(
        rename = "initial_poll_interval_ms",
        with = "duration_ms",
        default = "default_initial_poll_interval"
    )]
    pub initial_poll_interval: Duration,

    /// Growth factor applied to the poll interval after every poll.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on the poll interval.
    #[serde(
        rename = "max_poll_interval_ms",
        with = "duration_ms",
        default = "default_max_poll_interval"
    )]
    pub max_poll_interval: Duration,

    /// Hard cap from registration to terminal status.
    #[serde(
        rename = "tracking_timeout_ms",
        with = "duration_ms",
        default = "default_tracking_timeout"
    )]
    pub tracking_timeout: Duration,

    /// History entries older than this are dropped when history is restored.
    #[serde(
        rename = "history_retention_ms",
        with = "duration_ms",
        default = "default_history_retention"
    )]
    pub history_retention: Duration,

    /// Store key used for the persisted history.
    #[serde(default = "default_history_key")]
    pub history_key: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_confirmations() -> u64 {
    1
}

fn default_true() -> bool {
    true
}

fn default_max_history_size() -> usize {
    50
}

fn default_initial_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_multiplier() -> f64 {
    1.5
}

fn default_max_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_tracking_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_history_retention() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_history_key() -> String {
    HISTORY_KEY.to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl TrackerConfig {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, TrackerError> {
        let config: Self = toml::from_str(s).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the poll loop cannot run with.
    pub fn validate(&self) -> Result<(), TrackerError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(TrackerError::Config(format!(
                "backoff_multiplier must be a finite value >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_poll_interval.is_zero() {
            return Err(TrackerError::Config(
                "initial_poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.max_poll_interval < self.initial_poll_interval {
            return Err(TrackerError::Config(format!(
                "max_poll_interval_ms ({}) is below initial_poll_interval_ms ({})",
                self.max_poll_interval.as_millis(),
                self.initial_poll_interval.as_millis()
            )));
        }
        if self.history_key.is_empty() {
            return Err(TrackerError::Config("history_key must not be empty".into()));
        }
        Ok(())
    }

    /// A fresh backoff schedule for one tracked transaction.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.initial_poll_interval,
            self.backoff_multiplier,
            self.max_poll_interval,
        )
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confirmations: default_confirmations(),
            persist: default_true(),
            max_history_size: default_max_history_size(),
            initial_poll_interval: default_initial_poll_interval(),
            backoff_multiplier: default_backoff_multiplier(),
            max_poll_interval: default_max_poll_interval(),
            tracking_timeout: default_tracking_timeout(),
            history_retention: default_history_retention(),
            history_key: default_history_key(),
        }
    }
}
