//! ambience-watch: follow submitted transactions until they are final.

mod config;
mod throttle;

use ambience_chain::{ChainClient, RpcChainClient};
use ambience_ratelimit::RateLimiter;
use ambience_store::{FileStore, PersistenceStore};
use ambience_tracker::{ClosureObserver, TransactionTracker};
use ambience_types::{ChainId, Clock, HistoryEntry, SystemClock, TxHash, TxMetadata, TxStatus};
use ambience_utils::{format_duration, init_logging, LogFormat};
use anyhow::Context;
use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::config::{Overrides, WatchConfig};
use crate::throttle::RateLimitedChainClient;

#[derive(Parser)]
#[command(name = "ambience-watch", about = "Follow chain transactions until they are final")]
struct Cli {
    /// JSON-RPC endpoint of the chain node.
    #[arg(long, env = "AMBIENCE_RPC_URL")]
    rpc_url: Option<String>,

    /// Directory for the persisted transaction history.
    #[arg(long, env = "AMBIENCE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Expected chain id. Queried from the node when omitted.
    #[arg(long, env = "AMBIENCE_CHAIN_ID")]
    chain_id: Option<u64>,

    /// Blocks required on top of the including block.
    #[arg(long, env = "AMBIENCE_CONFIRMATIONS")]
    confirmations: Option<u64>,

    /// Log output: "human" or "json".
    #[arg(long, env = "AMBIENCE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "AMBIENCE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. If provided, file settings
    /// are used as the base; CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Track transactions until each succeeds, reverts, or fails.
    Track {
        /// Transaction hashes (0x-prefixed hex).
        #[arg(required = true)]
        hashes: Vec<TxHash>,

        /// Free-form label stored with every tracked transaction.
        #[arg(long)]
        description: Option<String>,
    },
    /// Print the persisted history, most recent first.
    History,
    /// Delete the persisted history.
    ClearHistory,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => WatchConfig::load(path)?,
        None => WatchConfig::default(),
    };
    let config = base.apply(Overrides {
        rpc_url: cli.rpc_url,
        data_dir: cli.data_dir,
        chain_id: cli.chain_id,
        confirmations: cli.confirmations,
        log_format: cli.log_format,
        log_level: cli.log_level,
    });

    init_logging(config.log_format, &config.log_level);
    if let Some(path) = &cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }

    match cli.command {
        Command::Track {
            hashes,
            description,
        } => track(&config, hashes, description).await,
        Command::History => history(&config).await,
        Command::ClearHistory => {
            let store = FileStore::new(&config.data_dir);
            store.remove(&config.tracker.history_key).await?;
            tracing::info!(dir = %config.data_dir.display(), "transaction history cleared");
            Ok(())
        }
    }
}

async fn track(
    config: &WatchConfig,
    hashes: Vec<TxHash>,
    description: Option<String>,
) -> anyhow::Result<()> {
    let rpc = Arc::new(
        RpcChainClient::new(config.rpc_url.clone()).context("failed to create RPC client")?,
    );
    let chain_id = match config.chain_id {
        Some(id) => ChainId(id),
        None => rpc
            .chain_id()
            .await
            .with_context(|| format!("failed to query chain id from {}", config.rpc_url))?,
    };
    tracing::info!(%chain_id, rpc_url = %config.rpc_url, "Connected to {}", chain_id.name());

    let limiter = Arc::new(RateLimiter::new(config.rpc_rate_limit));
    let chain: Arc<dyn ChainClient> = Arc::new(RateLimitedChainClient::new(
        rpc.clone(),
        limiter.clone(),
        config.rpc_rate_limit,
    ));

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let observer = ClosureObserver::new()
        .with_status_change(move |hash, status| {
            tracing::info!(%hash, %status, "status changed");
            if status.is_terminal() {
                let _ = done_tx.send(*hash);
            }
        })
        .with_success(|hash, receipt| {
            tracing::info!(%hash, block = receipt.block_number, gas_used = receipt.gas_used, "transaction confirmed");
        })
        .with_error(|hash, error| {
            tracing::warn!(%hash, code = %error.code, "{}", error.message);
        });

    let tracker = TransactionTracker::builder(chain)
        .store(Arc::new(FileStore::new(&config.data_dir)))
        .observer(Arc::new(observer))
        .config(config.tracker.clone())
        .chain_id(chain_id)
        .build()
        .await?;

    let (network_tx, network_rx) = watch::channel(chain_id);
    tracker.observe_network(network_rx);
    let network_task = tokio::spawn(watch_network(
        rpc,
        network_tx,
        config.network_check_interval,
    ));

    let cleanup_task = tokio::spawn({
        let limiter = limiter.clone();
        let period = config.limiter_cleanup_interval;
        async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                limiter.cleanup();
            }
        }
    });

    let metadata = description.map(TxMetadata::described).unwrap_or_default();
    let mut remaining = HashSet::new();
    for hash in &hashes {
        if tracker.track_transaction(*hash, metadata.clone()) {
            remaining.insert(*hash);
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    while !remaining.is_empty() {
        tokio::select! {
            Some(hash) = done_rx.recv() => {
                remaining.remove(&hash);
            }
            _ = &mut ctrl_c => {
                tracing::info!(pending = remaining.len(), "Shutdown signal received, stopping");
                break;
            }
        }
    }

    tracker.shutdown();
    network_task.abort();
    cleanup_task.abort();

    for hash in &hashes {
        let status = tracker.status(hash);
        match tracker.error(hash) {
            Some(error) => println!("{hash} {status} {error}"),
            None => println!("{hash} {status}"),
        }
    }

    let failed = hashes
        .iter()
        .any(|h| matches!(tracker.status(h), TxStatus::Reverted | TxStatus::Error));
    if failed {
        anyhow::bail!("one or more transactions did not succeed");
    }
    Ok(())
}

/// Re-read the node's chain id and publish changes to the tracker.
async fn watch_network(rpc: Arc<RpcChainClient>, tx: watch::Sender<ChainId>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        match rpc.chain_id().await {
            Ok(chain_id) => {
                tx.send_if_modified(|current| {
                    if *current == chain_id {
                        return false;
                    }
                    tracing::warn!(from = %*current, to = %chain_id, "node switched networks");
                    *current = chain_id;
                    true
                });
            }
            Err(e) => tracing::debug!(error = %e, "chain id check failed"),
        }
    }
}

async fn history(config: &WatchConfig) -> anyhow::Result<()> {
    let store = FileStore::new(&config.data_dir);
    let Some(json) = store.load(&config.tracker.history_key).await? else {
        println!("no transaction history in {}", config.data_dir.display());
        return Ok(());
    };
    let entries: Vec<HistoryEntry> =
        serde_json::from_str(&json).context("persisted history is not valid JSON")?;

    let now = SystemClock.now();
    for entry in &entries {
        let age = format_duration(entry.completed_at.elapsed_since(now));
        let label = entry
            .record
            .metadata
            .description
            .as_deref()
            .unwrap_or("-");
        match &entry.record.error {
            Some(error) => println!("{} {} {age} ago {label} {error}", entry.hash(), entry.status()),
            None => println!("{} {} {age} ago {label}", entry.hash(), entry.status()),
        }
    }
    Ok(())
}
