//! The sync engine: mutation queue and per-record state machine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::monitor::StatusMonitor;
use crate::remote::RemoteStore;
use crate::resolver::ConflictResolver;
use crate::retry::RetryScheduler;
use dashmap::DashMap;
use driftsync_types::{
    now_millis, ManualResolution, Mutation, MutationRecord, Operation, RecordId, RecordStore,
    RemoteOutcome, SyncStatus,
};
use futures_util::future::join_all;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Upper bound on conflict-resolution rounds within one sync attempt.
///
/// Resolutions are idempotent, so a re-push normally succeeds on the
/// next round; the bound keeps an authority that conflicts forever from
/// pinning the loop. A record parked here stays `Pending` and resumes on
/// the next online transition.
const MAX_CONFLICT_ROUNDS: u32 = 3;

/// The mutation-queue sync engine.
///
/// Owns the record store and reconciles it with the remote authority:
/// local edits persist immediately and, while online, push through the
/// per-record state machine. The engine is constructed explicitly and
/// shared by reference; it holds no global state.
///
/// Read-modify-persist sequences are serialized per record ID with a
/// keyed lock held across the remote round trip and any backoff wait, so
/// a concurrent local edit on the same ID cannot be lost. Distinct IDs
/// proceed fully concurrently.
pub struct SyncEngine<R: RemoteStore, S: RecordStore> {
    config: SyncConfig,
    remote: Arc<R>,
    store: Arc<S>,
    resolver: ConflictResolver,
    retry: RetryScheduler,
    monitor: Arc<StatusMonitor>,
    online: AtomicBool,
    shutdown: AtomicBool,
    /// Per-record locks serializing read-modify-persist sequences.
    locks: DashMap<RecordId, Arc<Mutex<()>>>,
    /// Records with a sync attempt dispatched and not yet finished.
    in_flight: DashMap<RecordId, ()>,
}

/// Removes a record from the in-flight set when its attempt finishes.
struct InFlightGuard<'a> {
    set: &'a DashMap<RecordId, ()>,
    id: RecordId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

impl<R, S> SyncEngine<R, S>
where
    R: RemoteStore + 'static,
    S: RecordStore + 'static,
{
    /// Creates a new engine over the given remote adapter and store.
    ///
    /// The engine starts offline; connect it with [`Self::set_online`] or
    /// [`Self::watch_connectivity`]. Fails with a configuration error if
    /// the config is unusable.
    pub fn new(config: SyncConfig, remote: R, store: S) -> SyncResult<Self> {
        config.validate()?;
        let store = Arc::new(store);
        let monitor = Arc::new(StatusMonitor::new(
            Arc::clone(&store) as Arc<dyn RecordStore>
        ));
        Ok(Self {
            resolver: ConflictResolver::new(&config),
            retry: RetryScheduler::new(&config),
            config,
            remote: Arc::new(remote),
            store,
            monitor,
            online: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            locks: DashMap::new(),
            in_flight: DashMap::new(),
        })
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the underlying record store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Returns the status monitor.
    pub fn monitor(&self) -> &Arc<StatusMonitor> {
        &self.monitor
    }

    /// Returns true if the engine currently considers itself online.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns true if the engine has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Shuts the engine down.
    ///
    /// No further retries or batch dispatches are scheduled. A remote
    /// call already in flight is not cancelled; its outcome is still
    /// persisted, after which the record parks.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        tracing::info!(namespace = %self.config.namespace, "engine shut down");
    }

    fn ensure_running(&self) -> SyncResult<()> {
        if self.is_shut_down() {
            Err(SyncError::Shutdown)
        } else {
            Ok(())
        }
    }

    /// Flips the connectivity state.
    ///
    /// Any transition to online drains the pending queue. Repeated online
    /// signals are safe: records already mid-sync are not re-dispatched.
    pub async fn set_online(&self, online: bool) -> SyncResult<()> {
        self.ensure_running()?;
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online {
            if !was_online {
                tracing::info!(namespace = %self.config.namespace, "engine online");
            }
            self.sync_pending().await
        } else {
            if was_online {
                tracing::info!(namespace = %self.config.namespace, "engine offline");
            }
            Ok(())
        }
    }

    /// Subscribes the engine to an injected connectivity signal.
    ///
    /// The current value of the channel is applied immediately, then
    /// every change until the sender drops or the engine shuts down. The
    /// listener holds only a weak reference, so it does not keep the
    /// engine alive; the returned handle can await or abort it.
    pub fn watch_connectivity(
        self: Arc<Self>,
        mut connectivity: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(&self);
        drop(self);
        tokio::spawn(async move {
            loop {
                let online = *connectivity.borrow_and_update();
                let Some(engine) = weak.upgrade() else { break };
                // set_online only fails once the engine is shut down.
                if engine.set_online(online).await.is_err() {
                    break;
                }
                drop(engine);
                if connectivity.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Creates a new local entity.
    ///
    /// The record persists as a pending create with `version = 1`; while
    /// online the engine pushes it immediately. Returns the assigned ID.
    pub async fn create(&self, payload: Value) -> SyncResult<RecordId> {
        self.ensure_running()?;
        let record = MutationRecord::create(payload, now_millis());
        let id = record.local_id;
        {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;
            self.store.put(record)?;
        }
        self.monitor.publish();
        tracing::debug!(%id, "created local record");

        if self.is_online() {
            self.sync(id).await?;
        }
        Ok(id)
    }

    /// Applies a local edit to an existing record.
    ///
    /// Fails with [`SyncError::RecordNotFound`] before any network
    /// attempt if the record does not exist.
    pub async fn update(&self, id: RecordId, payload: Value) -> SyncResult<()> {
        self.ensure_running()?;
        {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;
            let mut record = self
                .store
                .get(id)?
                .ok_or_else(|| SyncError::record_not_found(id))?;
            record.apply_update(payload, now_millis());
            self.store.put(record)?;
        }
        self.monitor.publish();
        tracing::debug!(%id, "updated local record");

        if self.is_online() {
            self.sync(id).await?;
        }
        Ok(())
    }

    /// Tombstones a record for deletion.
    ///
    /// The tombstone is retained until the authority acknowledges the
    /// delete, at which point the record is removed entirely.
    pub async fn delete(&self, id: RecordId) -> SyncResult<()> {
        self.ensure_running()?;
        {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;
            let mut record = self
                .store
                .get(id)?
                .ok_or_else(|| SyncError::record_not_found(id))?;
            record.apply_delete(now_millis());
            self.store.put(record)?;
        }
        self.monitor.publish();
        tracing::debug!(%id, "tombstoned local record");

        if self.is_online() {
            self.sync(id).await?;
        }
        Ok(())
    }

    /// Gets a record by ID.
    pub fn get(&self, id: RecordId) -> SyncResult<Option<MutationRecord>> {
        Ok(self.store.get(id)?)
    }

    /// Returns all records, tombstones included.
    pub fn all(&self) -> SyncResult<Vec<MutationRecord>> {
        Ok(self.store.all()?)
    }

    /// Runs the sync state machine for one record.
    ///
    /// Every outcome folds back into persisted record state: an ack marks
    /// the record synced (or removes an acknowledged tombstone), a
    /// conflict runs the configured policy and may re-push, a failure
    /// feeds the retry scheduler until retries exhaust and the record
    /// parks as pending. Routine sync traffic never returns an error;
    /// only store failures and shutdown do.
    ///
    /// A record already mid-sync is not dispatched again; the attempt in
    /// flight sees the latest persisted state.
    pub async fn sync(&self, id: RecordId) -> SyncResult<()> {
        self.ensure_running()?;
        if self.in_flight.insert(id, ()).is_some() {
            return Ok(());
        }
        let in_flight = InFlightGuard {
            set: &self.in_flight,
            id,
        };

        let lock = self.lock_for(id);
        let guard = lock.lock().await;

        let result = self.run_sync_loop(id).await;

        // Leave the in-flight set before releasing the record lock, so an
        // edit waiting on the lock can dispatch its own attempt.
        drop(in_flight);
        drop(guard);
        result
    }

    /// The state-machine loop proper. Caller holds the record lock and
    /// the in-flight marker.
    async fn run_sync_loop(&self, id: RecordId) -> SyncResult<()> {
        let mut conflict_rounds = 0u32;
        loop {
            let Some(mut record) = self.store.get(id)? else {
                return Ok(());
            };
            if record.sync_status != SyncStatus::Pending {
                return Ok(());
            }

            tracing::debug!(%id, operation = ?record.operation(), "dispatching sync attempt");
            let outcome = self.dispatch(&record).await;

            match outcome {
                RemoteOutcome::Ack(ack) => {
                    if record.operation() == Operation::Delete {
                        self.store.remove(id)?;
                        self.locks.remove(&id);
                        tracing::debug!(%id, "delete acknowledged, record removed");
                    } else {
                        record.acknowledge(ack);
                        self.store.put(record)?;
                        tracing::debug!(%id, "sync acknowledged");
                    }
                    self.monitor.publish();
                    return Ok(());
                }
                RemoteOutcome::Conflict(snapshot) => {
                    tracing::debug!(%id, policy = ?self.resolver.policy(), "version conflict");
                    self.resolver.resolve(&mut record, snapshot)?;
                    let resolved_status = record.sync_status;
                    self.store.put(record)?;
                    self.monitor.publish();

                    if resolved_status != SyncStatus::Pending {
                        return Ok(());
                    }
                    conflict_rounds += 1;
                    if conflict_rounds > MAX_CONFLICT_ROUNDS {
                        tracing::warn!(%id, rounds = conflict_rounds, "conflict persists after resolution, parking record");
                        return Ok(());
                    }
                    if self.is_shut_down() {
                        return Ok(());
                    }
                }
                RemoteOutcome::Failure { cause, retryable } => {
                    if !retryable {
                        tracing::warn!(%id, cause = %cause, "non-retryable failure, parking record");
                        record.sync_status = SyncStatus::Pending;
                        self.store.put(record)?;
                        self.monitor.publish();
                        return Ok(());
                    }

                    record.retry_count += 1;
                    if !self.retry.should_retry(&record) {
                        tracing::warn!(%id, retry_count = record.retry_count, "retries exhausted, parking record");
                        record.sync_status = SyncStatus::Pending;
                        self.store.put(record)?;
                        self.monitor.publish();
                        return Ok(());
                    }

                    let retry_count = record.retry_count;
                    self.store.put(record)?;
                    self.monitor.publish();
                    tracing::debug!(%id, retry_count, cause = %cause, "transient failure, backing off");
                    self.retry.wait(retry_count).await;
                    if self.is_shut_down() {
                        tracing::debug!(%id, "shutdown during backoff, parking record");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Drains every pending record, batch by batch.
    ///
    /// Records within a batch sync concurrently, bounding network fan-out
    /// to the configured batch size; batches run sequentially. Invoked on
    /// every transition to online.
    pub async fn sync_pending(&self) -> SyncResult<()> {
        self.ensure_running()?;
        let pending = self.store.by_status(SyncStatus::Pending)?;
        if pending.is_empty() {
            return Ok(());
        }
        tracing::info!(count = pending.len(), "draining pending records");

        for batch in pending.chunks(self.config.batch_size) {
            if self.is_shut_down() {
                break;
            }
            let attempts = batch
                .iter()
                .filter(|record| !self.in_flight.contains_key(&record.local_id))
                .map(|record| self.sync(record.local_id));
            for result in join_all(attempts).await {
                if let Err(e) = result {
                    tracing::warn!("sync attempt failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// Resolves a record parked as a conflict, then re-pushes if the
    /// resolution leaves local state unacknowledged.
    pub async fn resolve_conflict(
        &self,
        id: RecordId,
        resolution: ManualResolution,
    ) -> SyncResult<()> {
        self.resolve_conflict_with_options(id, resolution, true).await
    }

    /// Resolves a parked conflict with explicit control over the re-push.
    ///
    /// Fails with [`SyncError::RecordNotFound`] if the record does not
    /// exist and [`SyncError::InvalidState`] if it is not in conflict.
    /// `repush = false` skips the re-push; the record then waits for the
    /// next online transition.
    pub async fn resolve_conflict_with_options(
        &self,
        id: RecordId,
        resolution: ManualResolution,
        repush: bool,
    ) -> SyncResult<()> {
        self.ensure_running()?;
        let needs_push = {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;
            let mut record = self
                .store
                .get(id)?
                .ok_or_else(|| SyncError::record_not_found(id))?;
            if record.sync_status != SyncStatus::Conflict {
                return Err(SyncError::invalid_state("record is not in conflict"));
            }
            let snapshot = record
                .conflict
                .take()
                .ok_or_else(|| SyncError::invalid_state("conflict record missing snapshot"))?;

            match resolution {
                ManualResolution::AcceptClient => {
                    // Bump the version token so the re-push can pass the
                    // authority's precondition.
                    record.version = Some(record.version_or_zero() + 1);
                    record.sync_status = SyncStatus::Pending;
                }
                ManualResolution::AcceptServer => {
                    // The conflict proves the authority knows the entity,
                    // so the record becomes a synced update; a tombstone
                    // resolved in the server's favor is live again.
                    record.mutation = Mutation::Update(snapshot.payload);
                    record.version = Some(snapshot.version);
                    record.last_modified = snapshot.last_modified;
                    record.sync_status = SyncStatus::Synced;
                    record.retry_count = 0;
                }
                ManualResolution::Custom(payload) => {
                    record.mutation = record.mutation.with_payload(payload);
                    record.version = Some(record.version_or_zero() + 1);
                    record.sync_status = SyncStatus::Pending;
                }
            }

            let needs_push = record.sync_status == SyncStatus::Pending;
            self.store.put(record)?;
            needs_push
        };
        self.monitor.publish();
        tracing::debug!(%id, "conflict resolved");

        if needs_push && repush && self.is_online() {
            self.sync(id).await?;
        }
        Ok(())
    }

    async fn dispatch(&self, record: &MutationRecord) -> RemoteOutcome {
        match record.operation() {
            Operation::Create => self.remote.create(record).await,
            Operation::Update => self.remote.update(record).await,
            Operation::Delete => self.remote.delete(record).await,
        }
    }

    fn lock_for(&self, id: RecordId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}

impl<R: RemoteStore, S: RecordStore> fmt::Debug for SyncEngine<R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("online", &self.online)
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}
