//! Callbacks fired on transaction status transitions.

use ambience_types::{Receipt, TxError, TxHash, TxStatus};

/// Receives tracker notifications.
///
/// Methods run on the tracker's polling tasks, outside its internal lock;
/// keep handlers fast to avoid delaying other polls.
pub trait TrackerObserver: Send + Sync {
    /// Every real status transition, including registration (`Pending`).
    fn on_status_change(&self, _hash: &TxHash, _status: TxStatus) {}

    /// Once, when a transaction reaches `Success`.
    fn on_success(&self, _hash: &TxHash, _receipt: &Receipt) {}

    /// Once, when a transaction reaches `Reverted` or `Error`.
    fn on_error(&self, _hash: &TxHash, _error: &TxError) {}
}

/// Ignores every notification.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl TrackerObserver for NoopObserver {}

type StatusFn = Box<dyn Fn(&TxHash, TxStatus) + Send + Sync>;
type SuccessFn = Box<dyn Fn(&TxHash, &Receipt) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&TxHash, &TxError) + Send + Sync>;

/// Observer assembled from optional closures.
///
/// ```ignore
/// let observer = ClosureObserver::new()
///     .with_success(|hash, receipt| println!("{hash} mined in {}", receipt.block_number))
///     .with_error(|hash, err| eprintln!("{hash}: {err}"));
/// ```
#[derive(Default)]
pub struct ClosureObserver {
    status: Option<StatusFn>,
    success: Option<SuccessFn>,
    error: Option<ErrorFn>,
}

impl ClosureObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status_change(
        mut self,
        f: impl Fn(&TxHash, TxStatus) + Send + Sync + 'static,
    ) -> Self {
        self.status = Some(Box::new(f));
        self
    }

    pub fn with_success(mut self, f: impl Fn(&TxHash, &Receipt) + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl Fn(&TxHash, &TxError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl TrackerObserver for ClosureObserver {
    fn on_status_change(&self, hash: &TxHash, status: TxStatus) {
        if let Some(f) = &self.status {
            f(hash, status);
        }
    }

    fn on_success(&self, hash: &TxHash, receipt: &Receipt) {
        if let Some(f) = &self.success {
            f(hash, receipt);
        }
    }

    fn on_error(&self, hash: &TxHash, error: &TxError) {
        if let Some(f) = &self.error {
            f(hash, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambience_types::{ErrorCode, Timestamp};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    #[test]
    fn only_configured_closures_fire() {
        let statuses = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&statuses);
        let e = Arc::clone(&errors);
        let observer = ClosureObserver::new()
            .with_status_change(move |_, _| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .with_error(move |_, err| {
                assert_eq!(err.code, ErrorCode::Timeout);
                e.fetch_add(1, Ordering::SeqCst);
            });

        let hash = TxHash::ZERO;
        observer.on_status_change(&hash, TxStatus::Pending);
        observer.on_status_change(&hash, TxStatus::Error);
        observer.on_error(&hash, &TxError::timeout(Timestamp::EPOCH));

        assert_eq!(statuses.load(Ordering::SeqCst), 2);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_observer_accepts_everything() {
        let observer = NoopObserver;
        observer.on_status_change(&TxHash::ZERO, TxStatus::Pending);
        observer.on_error(&TxHash::ZERO, &TxError::reverted(Timestamp::EPOCH));
    }
}
