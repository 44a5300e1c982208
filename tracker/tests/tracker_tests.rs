//! End-to-end tracker behaviour against the nullable chain, store, and clock.
//!
//! Every test runs on a paused current-thread runtime, so tokio's clock only
//! moves when all tasks are idle and backoff schedules play out instantly.

use ambience_chain::ChainError;
use ambience_nullables::{NullChainClient, NullClock, NullStore};
use ambience_tracker::config::HISTORY_KEY;
use ambience_tracker::{TrackerConfig, TrackerObserver, TransactionTracker};
use ambience_types::{
    ChainId, ErrorCode, HistoryEntry, Receipt, Timestamp, TransactionRecord, TxError, TxHash,
    TxMetadata, TxStatus,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Clone, Debug, PartialEq)]
enum Event {
    Status(TxHash, TxStatus),
    Success(TxHash, u64),
    Error(TxHash, ErrorCode, String),
}

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn for_hash(&self, hash: TxHash) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| match e {
                Event::Status(h, _) | Event::Success(h, _) | Event::Error(h, _, _) => *h == hash,
            })
            .collect()
    }

    fn errors(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Error(..)))
            .count()
    }

    fn successes(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Success(..)))
            .count()
    }
}

impl TrackerObserver for RecordingObserver {
    fn on_status_change(&self, hash: &TxHash, status: TxStatus) {
        self.events.lock().unwrap().push(Event::Status(*hash, status));
    }

    fn on_success(&self, hash: &TxHash, receipt: &Receipt) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Success(*hash, receipt.block_number));
    }

    fn on_error(&self, hash: &TxHash, error: &TxError) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Error(*hash, error.code, error.message.clone()));
    }
}

struct Harness {
    tracker: TransactionTracker,
    chain: Arc<NullChainClient>,
    store: Arc<NullStore>,
    observer: Arc<RecordingObserver>,
}

async fn harness_with(config: TrackerConfig, store: Arc<NullStore>, clock: Arc<NullClock>) -> Harness {
    let chain = Arc::new(NullChainClient::new(100));
    let observer = Arc::new(RecordingObserver::default());
    let tracker = TransactionTracker::builder(chain.clone())
        .store(store.clone())
        .clock(clock)
        .observer(observer.clone())
        .config(config)
        .chain_id(ChainId::MAINNET)
        .build()
        .await
        .unwrap();
    Harness {
        tracker,
        chain,
        store,
        observer,
    }
}

async fn harness(config: TrackerConfig) -> Harness {
    harness_with(
        config,
        Arc::new(NullStore::new()),
        Arc::new(NullClock::new(10 * DAY_MS)),
    )
    .await
}

fn hash(byte: u8) -> TxHash {
    TxHash::new([byte; 32])
}

/// Let spawned tasks run without reaching the next backoff deadline.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn stored_history(store: &NullStore) -> Vec<HistoryEntry> {
    store
        .get(HISTORY_KEY)
        .map(|json| serde_json::from_str(&json).unwrap())
        .unwrap_or_default()
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn tracking_twice_is_a_no_op() {
    let h = harness(TrackerConfig::default()).await;

    assert!(h.tracker.track_transaction(hash(1), TxMetadata::described("send")));
    assert!(!h.tracker.track_transaction(hash(1), TxMetadata::described("again")));
    settle().await;

    assert_eq!(h.chain.receipt_calls(&hash(1)), 1);
    assert_eq!(h.tracker.pending_transactions().len(), 1);
    let record = h.tracker.transaction(&hash(1)).unwrap();
    assert_eq!(record.metadata.description.as_deref(), Some("send"));
    assert_eq!(
        h.observer.for_hash(hash(1)),
        vec![Event::Status(hash(1), TxStatus::Pending)]
    );
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn unknown_hash_reads_as_idle() {
    let h = harness(TrackerConfig::default()).await;
    assert_eq!(h.tracker.status(&hash(9)), TxStatus::Idle);
    assert!(h.tracker.receipt(&hash(9)).is_none());
    assert!(h.tracker.error(&hash(9)).is_none());
    assert!(!h.tracker.has_pending_transactions());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn polls_follow_the_backoff_schedule() {
    let h = harness(TrackerConfig::default()).await;
    h.tracker.track_transaction(hash(1), TxMetadata::default());

    // Polls at 0s, 2s, 5s, 9.5s.
    settle().await;
    assert_eq!(h.chain.receipt_calls(&hash(1)), 1);
    tokio::time::sleep(Duration::from_millis(1_995)).await;
    assert_eq!(h.chain.receipt_calls(&hash(1)), 2);
    tokio::time::sleep(Duration::from_millis(2_990)).await;
    assert_eq!(h.chain.receipt_calls(&hash(1)), 2);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.chain.receipt_calls(&hash(1)), 3);
    tokio::time::sleep(Duration::from_millis(4_500)).await;
    assert_eq!(h.chain.receipt_calls(&hash(1)), 4);
    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Pending);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn succeeds_only_once_confirmations_are_reached() {
    let h = harness(TrackerConfig {
        confirmations: 3,
        ..TrackerConfig::default()
    })
    .await;
    h.chain.mine(hash(1), 100, true);
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Confirming);
    assert_eq!(h.tracker.transaction(&hash(1)).unwrap().confirmations, Some(0));
    assert_eq!(h.tracker.receipt(&hash(1)).unwrap().block_number, 100);

    h.chain.advance_blocks(2);
    assert_eq!(h.chain.height(), 102);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Confirming);
    assert_eq!(h.tracker.transaction(&hash(1)).unwrap().confirmations, Some(2));

    h.chain.advance_blocks(1);
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Success);
    assert_eq!(h.tracker.transaction(&hash(1)).unwrap().confirmations, Some(3));
    assert!(!h.tracker.has_pending_transactions());

    assert_eq!(
        h.observer.for_hash(hash(1)),
        vec![
            Event::Status(hash(1), TxStatus::Pending),
            Event::Status(hash(1), TxStatus::Confirming),
            Event::Status(hash(1), TxStatus::Success),
            Event::Success(hash(1), 100),
        ]
    );

    // Concluded: no further polling.
    let calls = h.chain.receipt_calls(&hash(1));
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(h.chain.receipt_calls(&hash(1)), calls);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn lagging_node_keeps_confirmations_monotonic() {
    let h = harness(TrackerConfig {
        confirmations: 5,
        ..TrackerConfig::default()
    })
    .await;
    h.chain.mine(hash(1), 100, true);
    h.chain.set_height(103);
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;
    assert_eq!(h.tracker.transaction(&hash(1)).unwrap().confirmations, Some(3));

    h.chain.set_height(101);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.chain.receipt_calls(&hash(1)), 2);
    assert_eq!(h.tracker.transaction(&hash(1)).unwrap().confirmations, Some(3));

    // Confirming is reported once even though it was observed twice.
    let confirming = h
        .observer
        .for_hash(hash(1))
        .into_iter()
        .filter(|e| *e == Event::Status(hash(1), TxStatus::Confirming))
        .count();
    assert_eq!(confirming, 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn revert_uses_the_chain_reason() {
    let h = harness(TrackerConfig::default()).await;
    h.chain.mine(hash(1), 100, false);
    h.chain.set_height(101);
    h.chain.set_revert_reason(hash(1), "insufficient balance");

    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Reverted);
    let error = h.tracker.error(&hash(1)).unwrap();
    assert_eq!(error.code, ErrorCode::Reverted);
    assert_eq!(error.message, "insufficient balance");
    assert!(h.tracker.receipt(&hash(1)).is_some());

    assert_eq!(
        h.observer.for_hash(hash(1)),
        vec![
            Event::Status(hash(1), TxStatus::Pending),
            Event::Status(hash(1), TxStatus::Reverted),
            Event::Error(hash(1), ErrorCode::Reverted, "insufficient balance".into()),
        ]
    );
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn revert_without_reason_gets_a_generic_error() {
    let h = harness(TrackerConfig::default()).await;
    h.chain.mine(hash(1), 100, false);
    h.chain.set_height(101);

    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    let error = h.tracker.error(&hash(1)).unwrap();
    assert_eq!(error.code, ErrorCode::Reverted);
    assert_eq!(error.message, "transaction reverted");
    assert_eq!(h.observer.errors(), 1);
    assert_eq!(h.observer.successes(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn times_out_and_stops_polling() {
    let h = harness(TrackerConfig::default()).await;
    h.tracker.track_transaction(hash(1), TxMetadata::default());

    tokio::time::sleep(Duration::from_secs(31 * 60)).await;

    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Error);
    let error = h.tracker.error(&hash(1)).unwrap();
    assert_eq!(error.code, ErrorCode::Timeout);
    assert_eq!(
        h.observer.for_hash(hash(1)).last(),
        Some(&Event::Error(hash(1), ErrorCode::Timeout, error.message.clone()))
    );

    let calls = h.chain.receipt_calls(&hash(1));
    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    assert_eq!(h.chain.receipt_calls(&hash(1)), calls);
    assert_eq!(h.tracker.history().len(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn transport_failure_becomes_network_error() {
    let h = harness(TrackerConfig::default()).await;
    h.chain.fail_receipt(
        hash(1),
        ChainError::Transport("connection refused: http://127.0.0.1:8545".into()),
    );

    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Error);
    let error = h.tracker.error(&hash(1)).unwrap();
    assert_eq!(error.code, ErrorCode::NetworkError);
    assert!(!error.message.contains("127.0.0.1"));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn block_height_failure_becomes_rpc_error() {
    let h = harness(TrackerConfig::default()).await;
    h.chain.mine(hash(1), 100, true);
    h.chain.fail_block_number(Some(ChainError::Rpc {
        code: -32000,
        message: "header not found".into(),
        data: None,
    }));

    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    let error = h.tracker.error(&hash(1)).unwrap();
    assert_eq!(error.code, ErrorCode::RpcError);
    assert_eq!(error.message, "header not found");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn history_is_bounded_most_recent_first() {
    let h = harness(TrackerConfig {
        max_history_size: 3,
        ..TrackerConfig::default()
    })
    .await;
    h.chain.set_height(101);
    for byte in 1..=5 {
        h.chain.mine(hash(byte), 100, true);
        h.tracker.track_transaction(hash(byte), TxMetadata::default());
        settle().await;
    }

    let hashes: Vec<TxHash> = h.tracker.history().iter().map(|e| e.hash()).collect();
    assert_eq!(hashes, vec![hash(5), hash(4), hash(3)]);

    let stored: Vec<TxHash> = stored_history(&h.store).iter().map(|e| e.hash()).collect();
    assert_eq!(stored, hashes);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn history_entries_snapshot_the_concluded_record() {
    let h = harness(TrackerConfig::default()).await;
    h.chain.mine(hash(1), 100, true);
    h.chain.set_height(101);
    h.tracker
        .track_transaction(hash(1), TxMetadata::described("join room"));
    settle().await;

    let history = h.tracker.history();
    assert_eq!(history.len(), 1);
    let entry = &history[0];
    assert_eq!(entry.status(), TxStatus::Success);
    assert_eq!(entry.completed_at, Timestamp::new(10 * DAY_MS));
    assert_eq!(entry.record.metadata.description.as_deref(), Some("join room"));
    assert_eq!(entry.id, format!("{}-{}", hash(1), 10 * DAY_MS));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn persisted_history_is_restored_and_filtered() {
    let store = Arc::new(NullStore::new());
    let fresh = HistoryEntry::snapshot(
        &TransactionRecord::new(hash(1), Timestamp::new(9 * DAY_MS), TxMetadata::default()),
        Timestamp::new(9 * DAY_MS),
    );
    let stale = HistoryEntry::snapshot(
        &TransactionRecord::new(hash(2), Timestamp::new(2 * DAY_MS), TxMetadata::default()),
        Timestamp::new(2 * DAY_MS),
    );
    store.insert(
        HISTORY_KEY,
        serde_json::to_string(&vec![fresh.clone(), stale]).unwrap(),
    );

    let h = harness_with(
        TrackerConfig::default(),
        store,
        Arc::new(NullClock::new(10 * DAY_MS)),
    )
    .await;
    assert_eq!(h.tracker.history(), vec![fresh]);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn corrupt_persisted_history_starts_empty() {
    let store = Arc::new(NullStore::new());
    store.insert(HISTORY_KEY, "{not json");
    let h = harness_with(
        TrackerConfig::default(),
        store,
        Arc::new(NullClock::new(10 * DAY_MS)),
    )
    .await;
    assert!(h.tracker.history().is_empty());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn persistence_disabled_never_writes() {
    let h = harness(TrackerConfig {
        persist: false,
        ..TrackerConfig::default()
    })
    .await;
    h.chain.mine(hash(1), 100, true);
    h.chain.set_height(101);
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    assert_eq!(h.tracker.history().len(), 1);
    assert_eq!(h.store.saves(), 0);
    assert!(h.store.get(HISTORY_KEY).is_none());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn failed_save_keeps_history_in_memory() {
    let h = harness(TrackerConfig::default()).await;
    h.store.fail_saves(true);
    h.chain.mine(hash(1), 100, true);
    h.chain.set_height(101);
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Success);
    assert_eq!(h.tracker.history().len(), 1);
    assert!(h.store.get(HISTORY_KEY).is_none());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn clear_and_remove_history() {
    let h = harness(TrackerConfig::default()).await;
    h.chain.set_height(101);
    for byte in 1..=2 {
        h.chain.mine(hash(byte), 100, true);
        h.tracker.track_transaction(hash(byte), TxMetadata::default());
        settle().await;
    }

    let id = h.tracker.history()[0].id.clone();
    assert!(h.tracker.remove_history_entry(&id).await);
    assert!(!h.tracker.remove_history_entry(&id).await);
    assert_eq!(stored_history(&h.store).len(), 1);

    h.tracker.clear_history().await;
    assert!(h.tracker.history().is_empty());
    assert!(h.store.get(HISTORY_KEY).is_none());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn clearing_during_a_poll_discards_its_result() {
    let h = harness(TrackerConfig::default()).await;
    h.chain.mine(hash(1), 100, true);
    h.chain.set_height(101);
    h.chain.pause();

    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;
    assert_eq!(h.chain.in_flight(), 1);

    h.tracker.clear_transaction(&hash(1));
    h.chain.release();
    settle().await;

    assert!(h.tracker.transaction(&hash(1)).is_none());
    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Idle);
    assert!(h.tracker.history().is_empty());
    assert_eq!(h.observer.successes(), 0);
    assert_eq!(h.chain.in_flight(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn retracking_after_clear_starts_fresh() {
    let h = harness(TrackerConfig::default()).await;
    h.chain.pause();
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    h.tracker.clear_all_transactions();
    h.chain.mine(hash(1), 100, true);
    h.chain.set_height(101);
    h.chain.release();
    assert!(h.tracker.track_transaction(hash(1), TxMetadata::default()));
    settle().await;

    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Success);
    assert_eq!(h.observer.successes(), 1);
    assert_eq!(h.tracker.history().len(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn network_change_fails_everything_in_flight() {
    let h = harness(TrackerConfig::default()).await;
    h.chain.mine(hash(3), 100, true);
    h.chain.set_height(101);
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    h.tracker.track_transaction(hash(2), TxMetadata::default());
    h.tracker.track_transaction(hash(3), TxMetadata::default());
    settle().await;
    assert_eq!(h.tracker.status(&hash(3)), TxStatus::Success);

    h.tracker.set_chain_id(ChainId::SEPOLIA).await;

    for byte in 1..=2 {
        assert_eq!(h.tracker.status(&hash(byte)), TxStatus::Error);
        assert_eq!(
            h.tracker.error(&hash(byte)).unwrap().code,
            ErrorCode::NetworkChanged
        );
    }
    // Already concluded: untouched.
    assert_eq!(h.tracker.status(&hash(3)), TxStatus::Success);
    assert_eq!(h.observer.errors(), 2);
    assert_eq!(h.tracker.history().len(), 3);
    assert_eq!(stored_history(&h.store).len(), 3);

    let calls = h.chain.total_receipt_calls();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.chain.total_receipt_calls(), calls);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn same_chain_id_is_not_a_change() {
    let h = harness(TrackerConfig::default()).await;
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    h.tracker.set_chain_id(ChainId::MAINNET).await;
    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Pending);
    assert_eq!(h.tracker.chain_id(), Some(ChainId::MAINNET));
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn observed_network_switch_invalidates_pending() {
    let h = harness(TrackerConfig::default()).await;
    let (tx, rx) = watch::channel(ChainId::MAINNET);
    h.tracker.observe_network(rx);
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;
    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Pending);

    tx.send(ChainId::SEPOLIA).unwrap();
    settle().await;

    assert_eq!(h.tracker.chain_id(), Some(ChainId::SEPOLIA));
    assert_eq!(
        h.tracker.error(&hash(1)).unwrap().code,
        ErrorCode::NetworkChanged
    );
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn pending_transactions_are_oldest_first() {
    let clock = Arc::new(NullClock::new(1_000));
    let h = harness_with(TrackerConfig::default(), Arc::new(NullStore::new()), clock.clone()).await;

    h.tracker.track_transaction(hash(2), TxMetadata::default());
    clock.advance(Duration::from_secs(1));
    h.tracker.track_transaction(hash(1), TxMetadata::default());

    let pending: Vec<TxHash> = h
        .tracker
        .pending_transactions()
        .iter()
        .map(|r| r.hash)
        .collect();
    assert_eq!(pending, vec![hash(2), hash(1)]);
    assert!(h.tracker.has_pending_transactions());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn shutdown_stops_polling_and_refuses_new_work() {
    let h = harness(TrackerConfig::default()).await;
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    h.tracker.shutdown();
    assert!(!h.tracker.track_transaction(hash(2), TxMetadata::default()));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.chain.receipt_calls(&hash(1)), 1);
    assert_eq!(h.tracker.status(&hash(1)), TxStatus::Pending);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn dropping_the_tracker_stops_polling() {
    let h = harness(TrackerConfig::default()).await;
    h.tracker.track_transaction(hash(1), TxMetadata::default());
    settle().await;

    let chain = h.chain.clone();
    drop(h);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(chain.receipt_calls(&hash(1)), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn invalid_config_is_rejected_at_build() {
    let chain = Arc::new(NullChainClient::new(0));
    let result = TransactionTracker::builder(chain)
        .config(TrackerConfig {
            backoff_multiplier: 0.5,
            ..TrackerConfig::default()
        })
        .build()
        .await;
    assert!(result.is_err());
}
