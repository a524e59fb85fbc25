//! Aggregate sync status derived from the record store.

use driftsync_types::{RecordStore, SyncStatus};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Aggregate view over all records in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    /// Overall status: any conflict wins, else any pending, else synced.
    pub status: SyncStatus,
    /// Number of records awaiting acknowledgment.
    pub pending_count: usize,
    /// Number of records parked as conflicts.
    pub conflict_count: usize,
}

impl SyncSummary {
    /// The summary of an empty (fully reconciled) store.
    #[must_use]
    pub fn synced() -> Self {
        Self {
            status: SyncStatus::Synced,
            pending_count: 0,
            conflict_count: 0,
        }
    }
}

/// Handle identifying one subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Derives the aggregate sync status and notifies subscribers.
///
/// The engine publishes after every persisted record transition;
/// subscribers receive the latest aggregate eventually, with no
/// guaranteed cadence. Dropped receivers are cleaned up on the next
/// publish.
pub struct StatusMonitor {
    store: Arc<dyn RecordStore>,
    subscribers: RwLock<Vec<(SubscriptionId, UnboundedSender<SyncSummary>)>>,
    next_id: AtomicU64,
}

impl StatusMonitor {
    /// Creates a monitor over the given store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Computes the current aggregate by scanning the store.
    pub fn summary(&self) -> SyncSummary {
        let records = match self.store.all() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("status scan failed: {e}");
                return SyncSummary::synced();
            }
        };

        let pending_count = records
            .iter()
            .filter(|r| r.sync_status == SyncStatus::Pending)
            .count();
        let conflict_count = records
            .iter()
            .filter(|r| r.sync_status == SyncStatus::Conflict)
            .count();

        let status = if conflict_count > 0 {
            SyncStatus::Conflict
        } else if pending_count > 0 {
            SyncStatus::Pending
        } else {
            SyncStatus::Synced
        };

        SyncSummary {
            status,
            pending_count,
            conflict_count,
        }
    }

    /// Subscribes to aggregate updates.
    ///
    /// Returns the unsubscribe handle and the receiving end. The current
    /// summary is delivered immediately so subscribers need not wait for
    /// the next transition.
    pub fn subscribe(&self) -> (SubscriptionId, UnboundedReceiver<SyncSummary>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(self.summary());
        self.subscribers.write().push((id, tx));
        (id, rx)
    }

    /// Removes a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.write().retain(|(sid, _)| *sid != id);
    }

    /// Publishes the current aggregate to all subscribers.
    ///
    /// Disconnected subscribers are dropped.
    pub fn publish(&self) {
        let summary = self.summary();
        self.subscribers
            .write()
            .retain(|(_, tx)| tx.send(summary).is_ok());
    }

    /// Returns the number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for StatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusMonitor")
            .field("subscriber_count", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}
