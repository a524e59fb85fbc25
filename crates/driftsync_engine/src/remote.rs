//! Remote store contract and scripted mock.

use async_trait::async_trait;
use driftsync_types::{MutationRecord, Operation, RemoteAck, RemoteOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Adapter to the remote authority.
///
/// This trait is the engine's only boundary to the outside world. Each
/// write carries the record — payload plus the current version token as
/// the optimistic-concurrency precondition — and classifies the response
/// into one of the three [`RemoteOutcome`] families. Transport details
/// (headers, framing, endpoints) stay inside the implementation.
///
/// Implementations must be safe to re-issue after a crash or timeout:
/// repeating a write with the same version token must not apply it twice.
/// Deleting an identifier the authority does not know must be
/// acknowledged, not failed, so a tombstone whose ack was lost can drain.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates the entity on the authority.
    async fn create(&self, record: &MutationRecord) -> RemoteOutcome;

    /// Updates the entity on the authority.
    async fn update(&self, record: &MutationRecord) -> RemoteOutcome;

    /// Deletes the entity on the authority.
    async fn delete(&self, record: &MutationRecord) -> RemoteOutcome;
}

/// A scripted remote store for testing.
///
/// Outcomes are queued and consumed in FIFO order by any operation; when
/// the queue is empty every write is acknowledged with the version token
/// advanced by one. All attempted writes are logged for verification.
#[derive(Debug, Default, Clone)]
pub struct MockRemoteStore {
    inner: Arc<Mutex<MockRemoteInner>>,
}

#[derive(Debug, Default)]
struct MockRemoteInner {
    outcomes: VecDeque<RemoteOutcome>,
    attempts: Vec<MutationRecord>,
    latency: Option<Duration>,
}

impl MockRemoteStore {
    /// Creates a mock that acknowledges every write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an outcome for the next write, FIFO.
    pub fn enqueue(&self, outcome: RemoteOutcome) {
        self.inner.lock().outcomes.push_back(outcome);
    }

    /// Queues `count` retryable failures.
    pub fn enqueue_failures(&self, count: usize, cause: &str) {
        let mut inner = self.inner.lock();
        for _ in 0..count {
            inner
                .outcomes
                .push_back(RemoteOutcome::failure_retryable(cause));
        }
    }

    /// Adds an artificial delay before each response.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().latency = Some(latency);
    }

    /// Returns every record the mock has seen, in attempt order.
    #[must_use]
    pub fn attempts(&self) -> Vec<MutationRecord> {
        self.inner.lock().attempts.clone()
    }

    /// Returns the number of write attempts.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.inner.lock().attempts.len()
    }

    /// Returns the most recent write attempt.
    #[must_use]
    pub fn last_attempt(&self) -> Option<MutationRecord> {
        self.inner.lock().attempts.last().cloned()
    }

    async fn respond(&self, record: &MutationRecord) -> RemoteOutcome {
        let (latency, outcome) = {
            let mut inner = self.inner.lock();
            inner.attempts.push(record.clone());
            let outcome = inner.outcomes.pop_front().unwrap_or_else(|| {
                let mut ack =
                    RemoteAck::new(record.version_or_zero() + 1, record.last_modified);
                if record.operation() == Operation::Create {
                    ack = ack.with_remote_id(format!("srv-{}", record.local_id));
                }
                RemoteOutcome::Ack(ack)
            });
            (inner.latency, outcome)
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        outcome
    }
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn create(&self, record: &MutationRecord) -> RemoteOutcome {
        self.respond(record).await
    }

    async fn update(&self, record: &MutationRecord) -> RemoteOutcome {
        self.respond(record).await
    }

    async fn delete(&self, record: &MutationRecord) -> RemoteOutcome {
        self.respond(record).await
    }
}
