//! The transaction tracker and its per-hash polling tasks.
//!
//! Each tracked hash owns exactly one tokio task. The task polls the chain,
//! sleeps for the next backoff delay, and repeats until the record reaches a
//! terminal status or is cleared. Results are committed under the state lock
//! only if the record still belongs to the same registration (its
//! `generation`), so a poll that was in flight when its record was cleared
//! is discarded.
//!
//! A concluded transaction is written to history (and persisted) before its
//! callbacks fire.

use ambience_chain::{ChainClient, ChainError};
use ambience_store::PersistenceStore;
use ambience_types::{
    ChainId, Clock, ErrorCode, HistoryEntry, Receipt, SystemClock, TransactionRecord, TxError,
    TxHash, TxMetadata, TxStatus,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::TrackerConfig;
use crate::error::{normalize_chain_error, TrackerError};
use crate::history::TransactionHistory;
use crate::observer::{NoopObserver, TrackerObserver};

// ── Builder ─────────────────────────────────────────────────────────────

/// Assembles a [`TransactionTracker`] from its collaborators.
pub struct TrackerBuilder {
    chain: Arc<dyn ChainClient>,
    store: Option<Arc<dyn PersistenceStore>>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn TrackerObserver>,
    config: TrackerConfig,
    chain_id: Option<ChainId>,
}

impl TrackerBuilder {
    /// Where history is persisted. Without a store history is memory-only.
    pub fn store(mut self, store: Arc<dyn PersistenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn TrackerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// The chain the caller is currently connected to.
    pub fn chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Validate the configuration and restore persisted history.
    ///
    /// Must be awaited inside a tokio runtime; polling tasks are spawned on it.
    pub async fn build(self) -> Result<TransactionTracker, TrackerError> {
        self.config.validate()?;

        let mut history = TransactionHistory::new(self.config.max_history_size);
        if self.config.persist {
            match &self.store {
                Some(store) => {
                    match load_history(store.as_ref(), &self.config, self.clock.as_ref()).await {
                        Ok(restored) => {
                            tracing::debug!(entries = restored.len(), "restored transaction history");
                            history = restored;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "could not restore transaction history, starting empty");
                        }
                    }
                }
                None => {
                    tracing::warn!("history persistence enabled but no store configured, keeping history in memory");
                }
            }
        }

        let inner = Arc::new(Inner {
            chain: self.chain,
            store: self.store,
            clock: self.clock,
            observer: self.observer,
            config: self.config,
            runtime: Handle::current(),
            state: Mutex::new(TrackerState {
                active: HashMap::new(),
                history,
                chain_id: self.chain_id,
                next_generation: 0,
                network_task: None,
                shut_down: false,
            }),
            persist_lock: tokio::sync::Mutex::new(()),
        });
        Ok(TransactionTracker { inner })
    }
}

async fn load_history(
    store: &dyn PersistenceStore,
    config: &TrackerConfig,
    clock: &dyn Clock,
) -> Result<TransactionHistory, TrackerError> {
    let entries: Vec<HistoryEntry> = match store.load(&config.history_key).await? {
        Some(json) => serde_json::from_str(&json)?,
        None => Vec::new(),
    };
    Ok(TransactionHistory::restore(
        entries,
        config.max_history_size,
        clock.now(),
        config.history_retention,
    ))
}

// ── Tracker ─────────────────────────────────────────────────────────────

/// Tracks submitted transactions until they succeed, revert, or fail.
///
/// Cheap to clone; all clones share the same state. Dropping the last clone
/// stops every polling task.
#[derive(Clone)]
pub struct TransactionTracker {
    inner: Arc<Inner>,
}

struct Inner {
    chain: Arc<dyn ChainClient>,
    store: Option<Arc<dyn PersistenceStore>>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn TrackerObserver>,
    config: TrackerConfig,
    runtime: Handle,
    state: Mutex<TrackerState>,
    /// Serializes history writes so the store always ends with the latest list.
    persist_lock: tokio::sync::Mutex<()>,
}

struct TrackerState {
    active: HashMap<TxHash, Tracked>,
    history: TransactionHistory,
    chain_id: Option<ChainId>,
    next_generation: u64,
    network_task: Option<JoinHandle<()>>,
    shut_down: bool,
}

struct Tracked {
    record: TransactionRecord,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

/// What a poll concluded.
enum Conclusion {
    Mined {
        receipt: Receipt,
        confirmations: u64,
        revert_reason: Option<String>,
    },
    Failed(TxError),
}

enum PollOutcome {
    Continue,
    Done,
}

enum Notice {
    Status(TxHash, TxStatus),
    Success(TxHash, Receipt),
    Error(TxHash, TxError),
}

impl TransactionTracker {
    pub fn builder(chain: Arc<dyn ChainClient>) -> TrackerBuilder {
        TrackerBuilder {
            chain,
            store: None,
            clock: Arc::new(SystemClock),
            observer: Arc::new(NoopObserver),
            config: TrackerConfig::default(),
            chain_id: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Start tracking `hash`. The first poll runs immediately.
    ///
    /// Returns `false` without side effects when `hash` is already tracked
    /// (in any status) or the tracker has been shut down.
    pub fn track_transaction(&self, hash: TxHash, metadata: TxMetadata) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.shut_down {
            tracing::warn!(%hash, "tracker is shut down, ignoring transaction");
            return false;
        }
        if state.active.contains_key(&hash) {
            tracing::debug!(%hash, "transaction already tracked");
            return false;
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        let record = TransactionRecord::new(hash, inner.clock.now(), metadata);
        let task = inner.runtime.spawn(poll_loop(
            Arc::downgrade(inner),
            hash,
            generation,
            Instant::now(),
        ));
        state.active.insert(
            hash,
            Tracked {
                record,
                generation,
                task: Some(task),
            },
        );
        drop(state);

        tracing::info!(%hash, "tracking transaction");
        true
    }

    pub fn transaction(&self, hash: &TxHash) -> Option<TransactionRecord> {
        self.inner
            .state
            .lock()
            .active
            .get(hash)
            .map(|t| t.record.clone())
    }

    /// Current status, or `Idle` for hashes that are not tracked.
    pub fn status(&self, hash: &TxHash) -> TxStatus {
        self.inner
            .state
            .lock()
            .active
            .get(hash)
            .map(|t| t.record.status)
            .unwrap_or(TxStatus::Idle)
    }

    pub fn receipt(&self, hash: &TxHash) -> Option<Receipt> {
        self.inner
            .state
            .lock()
            .active
            .get(hash)
            .and_then(|t| t.record.receipt.clone())
    }

    pub fn error(&self, hash: &TxHash) -> Option<TxError> {
        self.inner
            .state
            .lock()
            .active
            .get(hash)
            .and_then(|t| t.record.error.clone())
    }

    /// Forget `hash` and cancel its polling. Idempotent.
    pub fn clear_transaction(&self, hash: &TxHash) {
        let removed = self.inner.state.lock().active.remove(hash);
        if let Some(mut tracked) = removed {
            if let Some(task) = tracked.task.take() {
                task.abort();
            }
            tracing::debug!(%hash, "cleared transaction");
        }
    }

    /// Forget every tracked transaction and cancel all polling.
    pub fn clear_all_transactions(&self) {
        let drained: Vec<Tracked> = {
            let mut state = self.inner.state.lock();
            state.active.drain().map(|(_, t)| t).collect()
        };
        for mut tracked in drained {
            if let Some(task) = tracked.task.take() {
                task.abort();
            }
        }
    }

    /// Records still being polled, oldest submission first.
    pub fn pending_transactions(&self) -> Vec<TransactionRecord> {
        let mut pending: Vec<TransactionRecord> = self
            .inner
            .state
            .lock()
            .active
            .values()
            .filter(|t| t.record.status.is_in_flight())
            .map(|t| t.record.clone())
            .collect();
        pending.sort_by_key(|r| r.submitted_at);
        pending
    }

    pub fn has_pending_transactions(&self) -> bool {
        self.inner
            .state
            .lock()
            .active
            .values()
            .any(|t| t.record.status.is_in_flight())
    }

    /// Concluded transactions, most recent first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.inner.state.lock().history.entries()
    }

    /// Empty the history and delete its persisted copy.
    pub async fn clear_history(&self) {
        self.inner.state.lock().history.clear();
        self.inner.persist_history().await;
    }

    /// Delete one history entry by id. Returns whether it existed.
    pub async fn remove_history_entry(&self, id: &str) -> bool {
        let removed = self.inner.state.lock().history.remove(id);
        if removed {
            self.inner.persist_history().await;
        }
        removed
    }

    pub fn chain_id(&self) -> Option<ChainId> {
        self.inner.state.lock().chain_id
    }

    /// Record the active chain.
    ///
    /// When it differs from the previous one, every pending or confirming
    /// transaction fails with `NETWORK_CHANGED` and stops polling. The first
    /// observed chain id only seeds the state.
    pub async fn set_chain_id(&self, chain_id: ChainId) {
        let inner = &self.inner;
        let now = inner.clock.now();
        let notices = {
            let mut state = inner.state.lock();
            match state.chain_id.replace(chain_id) {
                None => {
                    tracing::debug!(%chain_id, "chain id set");
                    return;
                }
                Some(previous) if previous == chain_id => return,
                Some(previous) => {
                    tracing::info!(from = %previous, to = %chain_id, "network changed");
                }
            }

            let mut invalidated = Vec::new();
            for tracked in state.active.values_mut() {
                if !tracked.record.status.is_in_flight() {
                    continue;
                }
                if let Some(task) = tracked.task.take() {
                    task.abort();
                }
                tracked.record.error = Some(TxError::network_changed(now));
                tracked.record.advance(TxStatus::Error);
                invalidated.push(tracked.record.clone());
            }

            let mut notices = Vec::new();
            for record in &invalidated {
                tracing::warn!(hash = %record.hash, "transaction invalidated by network change");
                state.history.push(HistoryEntry::snapshot(record, now));
                notices.extend(terminal_notices(record));
            }
            notices
        };

        if notices.is_empty() {
            return;
        }
        inner.persist_history().await;
        inner.notify(notices);
    }

    /// Follow chain id changes published on `rx` until the tracker goes away.
    pub fn observe_network(&self, mut rx: watch::Receiver<ChainId>) {
        let weak = Arc::downgrade(&self.inner);
        let task = self.inner.runtime.spawn(async move {
            let mut chain_id = *rx.borrow_and_update();
            loop {
                let Some(inner) = weak.upgrade() else { break };
                TransactionTracker { inner }.set_chain_id(chain_id).await;
                if rx.changed().await.is_err() {
                    break;
                }
                chain_id = *rx.borrow_and_update();
            }
        });

        let mut state = self.inner.state.lock();
        if state.shut_down {
            task.abort();
            return;
        }
        if let Some(previous) = state.network_task.replace(task) {
            previous.abort();
        }
    }

    /// Cancel all polling and network observation. Records stay readable.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shut_down = true;
        state.abort_all();
        tracing::info!(tracked = state.active.len(), "transaction tracker shut down");
    }
}

impl TrackerState {
    /// The entry for `hash` if it still belongs to registration `generation`
    /// and is being polled.
    fn live_mut(&mut self, hash: &TxHash, generation: u64) -> Option<&mut Tracked> {
        self.active
            .get_mut(hash)
            .filter(|t| t.generation == generation && t.record.status.is_in_flight())
    }

    fn is_live(&self, hash: &TxHash, generation: u64) -> bool {
        self.active
            .get(hash)
            .is_some_and(|t| t.generation == generation && t.record.status.is_in_flight())
    }

    fn abort_all(&mut self) {
        for tracked in self.active.values_mut() {
            if let Some(task) = tracked.task.take() {
                task.abort();
            }
        }
        if let Some(task) = self.network_task.take() {
            task.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state.get_mut().abort_all();
    }
}

impl Inner {
    fn is_live(&self, hash: &TxHash, generation: u64) -> bool {
        self.state.lock().is_live(hash, generation)
    }

    async fn poll_once(&self, hash: &TxHash, generation: u64, started: Instant) -> PollOutcome {
        if !self.is_live(hash, generation) {
            return PollOutcome::Done;
        }

        if started.elapsed() >= self.config.tracking_timeout {
            tracing::warn!(%hash, timeout = ?self.config.tracking_timeout, "transaction tracking timed out");
            let error = TxError::timeout(self.clock.now());
            self.conclude(hash, generation, Conclusion::Failed(error))
                .await;
            return PollOutcome::Done;
        }

        let receipt = match self.chain.transaction_receipt(hash).await {
            Ok(receipt) => receipt,
            Err(e) if e.is_not_yet_mined() => {
                tracing::trace!(%hash, "transaction not yet mined");
                return PollOutcome::Continue;
            }
            Err(e) => return self.fail(hash, generation, &e).await,
        };

        let height = match self.chain.block_number().await {
            Ok(height) => height,
            Err(e) => return self.fail(hash, generation, &e).await,
        };

        let confirmations = receipt.confirmations_at(height);
        if confirmations < self.config.confirmations {
            return if self.mark_confirming(hash, generation, receipt, confirmations) {
                PollOutcome::Continue
            } else {
                PollOutcome::Done
            };
        }

        let revert_reason = if receipt.success {
            None
        } else {
            self.revert_reason(hash, &receipt).await
        };
        self.conclude(
            hash,
            generation,
            Conclusion::Mined {
                receipt,
                confirmations,
                revert_reason,
            },
        )
        .await;
        PollOutcome::Done
    }

    async fn fail(&self, hash: &TxHash, generation: u64, err: &ChainError) -> PollOutcome {
        tracing::warn!(%hash, error = %err, "chain query failed, giving up on transaction");
        let error = normalize_chain_error(err, self.clock.now());
        self.conclude(hash, generation, Conclusion::Failed(error))
            .await;
        PollOutcome::Done
    }

    /// Best effort: any failure means no reason.
    async fn revert_reason(&self, hash: &TxHash, receipt: &Receipt) -> Option<String> {
        match self.chain.revert_reason(hash, receipt).await {
            Ok(reason) => reason,
            Err(e) => {
                tracing::debug!(%hash, error = %e, "revert reason unavailable");
                None
            }
        }
    }

    /// Returns `false` if the record is gone and polling should stop.
    fn mark_confirming(
        &self,
        hash: &TxHash,
        generation: u64,
        receipt: Receipt,
        confirmations: u64,
    ) -> bool {
        let changed = {
            let mut state = self.state.lock();
            let Some(tracked) = state.live_mut(hash, generation) else {
                return false;
            };
            tracked.record.observe_confirmations(confirmations);
            tracked.record.receipt = Some(receipt);
            tracked.record.advance(TxStatus::Confirming)
        };

        tracing::debug!(%hash, confirmations, required = self.config.confirmations, "transaction confirming");
        if changed {
            self.observer.on_status_change(hash, TxStatus::Confirming);
        }
        true
    }

    async fn conclude(&self, hash: &TxHash, generation: u64, conclusion: Conclusion) {
        let now = self.clock.now();
        let notices = {
            let mut state = self.state.lock();
            let Some(tracked) = state.live_mut(hash, generation) else {
                tracing::debug!(%hash, "discarding poll result for cleared transaction");
                return;
            };

            let record = &mut tracked.record;
            match conclusion {
                Conclusion::Mined {
                    receipt,
                    confirmations,
                    revert_reason,
                } => {
                    record.observe_confirmations(confirmations);
                    let status = if receipt.success {
                        TxStatus::Success
                    } else {
                        // A revert always carries an error, reason or not.
                        record.error = Some(match revert_reason {
                            Some(reason) => TxError::new(ErrorCode::Reverted, reason, now),
                            None => TxError::reverted(now),
                        });
                        TxStatus::Reverted
                    };
                    record.receipt = Some(receipt);
                    record.advance(status);
                }
                Conclusion::Failed(error) => {
                    record.error = Some(error);
                    record.advance(TxStatus::Error);
                }
            }

            // The task is finishing on its own; dropping the handle detaches it.
            tracked.task = None;
            let snapshot = tracked.record.clone();
            state.history.push(HistoryEntry::snapshot(&snapshot, now));
            match snapshot.status {
                TxStatus::Success => tracing::info!(%hash, "transaction confirmed"),
                status => tracing::warn!(%hash, %status, "transaction failed"),
            }
            terminal_notices(&snapshot)
        };

        self.persist_history().await;
        self.notify(notices);
    }

    fn notify(&self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::Status(hash, status) => self.observer.on_status_change(&hash, status),
                Notice::Success(hash, receipt) => self.observer.on_success(&hash, &receipt),
                Notice::Error(hash, error) => self.observer.on_error(&hash, &error),
            }
        }
    }

    async fn persist_history(&self) {
        if let Err(e) = self.try_persist_history().await {
            tracing::warn!(error = %e, "failed to persist transaction history");
        }
    }

    /// Whole-list overwrite; an empty history deletes the stored copy.
    async fn try_persist_history(&self) -> Result<(), TrackerError> {
        if !self.config.persist {
            return Ok(());
        }
        let Some(store) = &self.store else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let json = {
            let state = self.state.lock();
            if state.history.is_empty() {
                None
            } else {
                Some(state.history.to_json()?)
            }
        };
        match json {
            Some(json) => store.save(&self.config.history_key, &json).await?,
            None => store.remove(&self.config.history_key).await?,
        }
        Ok(())
    }
}

/// Status change plus the matching success or error callback.
fn terminal_notices(record: &TransactionRecord) -> Vec<Notice> {
    let mut notices = vec![Notice::Status(record.hash, record.status)];
    match record.status {
        TxStatus::Success => {
            if let Some(receipt) = &record.receipt {
                notices.push(Notice::Success(record.hash, receipt.clone()));
            }
        }
        TxStatus::Reverted | TxStatus::Error => {
            let error = record
                .error
                .clone()
                .unwrap_or_else(|| TxError::reverted(record.submitted_at));
            notices.push(Notice::Error(record.hash, error));
        }
        _ => {}
    }
    notices
}

async fn poll_loop(inner: Weak<Inner>, hash: TxHash, generation: u64, started: Instant) {
    let mut backoff = {
        let Some(tracker) = inner.upgrade() else {
            return;
        };
        if !tracker.is_live(&hash, generation) {
            return;
        }
        // Emitted from the task so it always precedes the poll's own transitions.
        tracker.observer.on_status_change(&hash, TxStatus::Pending);
        tracker.config.backoff()
    };

    loop {
        let Some(tracker) = inner.upgrade() else {
            return;
        };
        if let PollOutcome::Done = tracker.poll_once(&hash, generation, started).await {
            return;
        }
        drop(tracker);
        tokio::time::sleep(backoff.next_delay()).await;
    }
}
