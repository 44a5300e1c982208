//! `ambience-watch` configuration with TOML support.

use ambience_ratelimit::RateLimitConfig;
use ambience_tracker::TrackerConfig;
use ambience_types::time::duration_ms;
use ambience_utils::LogFormat;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything the watcher needs. File values are the base; CLI flags and
/// environment variables override them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// JSON-RPC endpoint of the chain node.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Directory the history file lives in.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Expected chain. When unset the node is asked once at startup.
    #[serde(default)]
    pub chain_id: Option<u64>,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How often the node's chain id is re-read to detect a network switch.
    #[serde(
        rename = "network_check_interval_ms",
        with = "duration_ms",
        default = "default_network_check_interval"
    )]
    pub network_check_interval: Duration,

    /// How often idle rate limit buckets are dropped.
    #[serde(
        rename = "limiter_cleanup_interval_ms",
        with = "duration_ms",
        default = "default_limiter_cleanup_interval"
    )]
    pub limiter_cleanup_interval: Duration,

    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Budget for calls to the chain node.
    #[serde(default = "RateLimitConfig::rpc")]
    pub rpc_rate_limit: RateLimitConfig,
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./ambience_data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_network_check_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_limiter_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            data_dir: default_data_dir(),
            chain_id: None,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            network_check_interval: default_network_check_interval(),
            limiter_cleanup_interval: default_limiter_cleanup_interval(),
            tracker: TrackerConfig::default(),
            rpc_rate_limit: RateLimitConfig::rpc(),
        }
    }
}

impl WatchConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(s).context("invalid config file")?;
        config.tracker.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub rpc_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub chain_id: Option<u64>,
    pub confirmations: Option<u64>,
    pub log_format: Option<LogFormat>,
    pub log_level: Option<String>,
}

impl WatchConfig {
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(rpc_url) = overrides.rpc_url {
            self.rpc_url = rpc_url;
        }
        if let Some(data_dir) = overrides.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(chain_id) = overrides.chain_id {
            self.chain_id = Some(chain_id);
        }
        if let Some(confirmations) = overrides.confirmations {
            self.tracker.confirmations = confirmations;
        }
        if let Some(log_format) = overrides.log_format {
            self.log_format = log_format;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
        self
    }
}
