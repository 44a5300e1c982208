//! Bounded history of concluded transactions.
//!
//! This is a bounded FIFO list kept most-recent-first: when full, the oldest
//! entry is evicted to make room. Eviction is purely by insertion order,
//! reads never affect it.

use ambience_types::{HistoryEntry, Timestamp};
use std::collections::VecDeque;
use std::time::Duration;

pub struct TransactionHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl TransactionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild from persisted entries (most recent first), dropping entries
    /// past `retention` or their explicit expiry, then trimming to capacity.
    pub fn restore(
        entries: Vec<HistoryEntry>,
        capacity: usize,
        now: Timestamp,
        retention: Duration,
    ) -> Self {
        let mut history = Self::new(capacity);
        history.entries = entries
            .into_iter()
            .filter(|e| e.is_retained(now, retention))
            .take(capacity)
            .collect();
        history
    }

    /// Add the most recent entry, evicting the oldest if at capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Remove the entry with `id`. Returns whether one was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Snapshot of all entries, most recent first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
