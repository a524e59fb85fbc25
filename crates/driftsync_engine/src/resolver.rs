//! Conflict-resolution strategy dispatch.

use crate::config::{MergeFn, SyncConfig};
use crate::error::{SyncError, SyncResult};
use driftsync_types::{ConflictPolicy, ConflictSnapshot, Mutation, MutationRecord, SyncStatus};

/// Resolves version conflicts according to the configured policy.
///
/// Resolution is a pure function of the record and the remote snapshot:
/// it rewrites the record in place and performs no I/O. The engine
/// persists the result and, when the resolved status is still
/// [`SyncStatus::Pending`], re-pushes it. Resolutions are idempotent:
/// resolving the same record against the same snapshot twice yields the
/// same record.
pub struct ConflictResolver {
    policy: ConflictPolicy,
    merge_fn: Option<MergeFn>,
}

impl ConflictResolver {
    /// Creates a resolver from the engine configuration.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            policy: config.policy,
            merge_fn: config.merge_fn.clone(),
        }
    }

    /// Returns the configured policy.
    #[must_use]
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Applies the configured policy to a conflicted record.
    pub fn resolve(
        &self,
        record: &mut MutationRecord,
        snapshot: ConflictSnapshot,
    ) -> SyncResult<()> {
        match self.policy {
            ConflictPolicy::ClientWins => {
                client_wins(record);
                Ok(())
            }
            ConflictPolicy::ServerWins => {
                server_wins(record, snapshot);
                Ok(())
            }
            ConflictPolicy::LastWriteWins => {
                // Equal timestamps resolve to the server.
                if snapshot.last_modified >= record.last_modified {
                    server_wins(record, snapshot);
                } else {
                    client_wins(record);
                }
                Ok(())
            }
            ConflictPolicy::Merge => {
                let merge_fn = self.merge_fn.as_ref().ok_or_else(|| {
                    SyncError::configuration("merge policy requires a merge function")
                })?;
                match record.payload() {
                    Some(local) => {
                        let merged = merge_fn(local, &snapshot.payload);
                        record.mutation = record.mutation.with_payload(merged);
                        record.version = Some(record.version_or_zero() + 1);
                        record.sync_status = SyncStatus::Pending;
                        record.conflict = None;
                    }
                    // A tombstone has nothing to merge; the remote state
                    // is the only input left, so the server wins.
                    None => server_wins(record, snapshot),
                }
                Ok(())
            }
            ConflictPolicy::Manual => {
                record.sync_status = SyncStatus::Conflict;
                record.conflict = Some(snapshot);
                Ok(())
            }
        }
    }
}

/// Keeps the local change and forces a re-push over the remote state.
fn client_wins(record: &mut MutationRecord) {
    record.version = Some(record.version_or_zero() + 1);
    record.sync_status = SyncStatus::Pending;
    record.conflict = None;
}

/// Adopts the remote snapshot as the record's acknowledged state.
///
/// The record becomes a synced update whatever its change kind was: the
/// conflict proves the authority knows the entity, and a tombstone
/// resolved in the server's favor is live again.
fn server_wins(record: &mut MutationRecord, snapshot: ConflictSnapshot) {
    record.mutation = Mutation::Update(snapshot.payload);
    record.version = Some(snapshot.version);
    record.last_modified = snapshot.last_modified;
    record.sync_status = SyncStatus::Synced;
    record.retry_count = 0;
    record.conflict = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_types::Operation;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn resolver(policy: ConflictPolicy) -> ConflictResolver {
        ConflictResolver::new(&SyncConfig::new("test").with_policy(policy))
    }

    fn conflicted_record(last_modified: u64) -> MutationRecord {
        let mut record = MutationRecord::create(json!({"title": "local"}), last_modified);
        record.version = Some(2);
        record
    }

    fn snapshot(last_modified: u64) -> ConflictSnapshot {
        ConflictSnapshot::new(json!({"title": "remote"}), 5, last_modified)
    }

    #[test]
    fn client_wins_bumps_version_and_repushes() {
        let mut record = conflicted_record(1_000);
        resolver(ConflictPolicy::ClientWins)
            .resolve(&mut record, snapshot(2_000))
            .unwrap();

        assert_eq!(record.payload(), Some(&json!({"title": "local"})));
        assert_eq!(record.version, Some(3));
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert!(record.conflict.is_none());
    }

    #[test]
    fn server_wins_adopts_snapshot_and_syncs() {
        let mut record = conflicted_record(1_000);
        record.retry_count = 2;
        resolver(ConflictPolicy::ServerWins)
            .resolve(&mut record, snapshot(2_000))
            .unwrap();

        assert_eq!(record.payload(), Some(&json!({"title": "remote"})));
        assert_eq!(record.version, Some(5));
        assert_eq!(record.last_modified, 2_000);
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.retry_count, 0);
        assert!(record.conflict.is_none());
    }

    #[test]
    fn server_wins_revives_a_tombstone() {
        let mut record = conflicted_record(1_000);
        record.apply_delete(1_500);
        resolver(ConflictPolicy::ServerWins)
            .resolve(&mut record, snapshot(2_000))
            .unwrap();

        assert_eq!(record.operation(), Operation::Update);
        assert_eq!(record.payload(), Some(&json!({"title": "remote"})));
        assert_eq!(record.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn last_write_wins_picks_newer_side() {
        // Remote strictly newer: server wins.
        let mut record = conflicted_record(1_000);
        resolver(ConflictPolicy::LastWriteWins)
            .resolve(&mut record, snapshot(2_000))
            .unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.payload(), Some(&json!({"title": "remote"})));

        // Local strictly newer: client wins.
        let mut record = conflicted_record(3_000);
        resolver(ConflictPolicy::LastWriteWins)
            .resolve(&mut record, snapshot(2_000))
            .unwrap();
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.payload(), Some(&json!({"title": "local"})));
    }

    #[test]
    fn last_write_wins_tie_goes_to_server() {
        let mut record = conflicted_record(2_000);
        resolver(ConflictPolicy::LastWriteWins)
            .resolve(&mut record, snapshot(2_000))
            .unwrap();
        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.payload(), Some(&json!({"title": "remote"})));
    }

    #[test]
    fn merge_runs_configured_function_and_repushes() {
        let config = SyncConfig::new("test")
            .with_policy(ConflictPolicy::Merge)
            .with_merge_fn(Arc::new(|local: &Value, remote: &Value| {
                json!({
                    "local": local["title"].clone(),
                    "remote": remote["title"].clone(),
                })
            }));
        let resolver = ConflictResolver::new(&config);

        let mut record = conflicted_record(1_000);
        resolver.resolve(&mut record, snapshot(2_000)).unwrap();

        assert_eq!(
            record.payload(),
            Some(&json!({"local": "local", "remote": "remote"}))
        );
        assert_eq!(record.version, Some(3));
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert!(record.conflict.is_none());
    }

    #[test]
    fn merge_on_a_tombstone_behaves_as_server_wins() {
        let config = SyncConfig::new("test")
            .with_policy(ConflictPolicy::Merge)
            .with_merge_fn(Arc::new(|local: &Value, _remote: &Value| local.clone()));
        let resolver = ConflictResolver::new(&config);

        let mut record = conflicted_record(1_000);
        record.apply_delete(1_500);
        resolver.resolve(&mut record, snapshot(2_000)).unwrap();

        assert_eq!(record.payload(), Some(&json!({"title": "remote"})));
        assert_eq!(record.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn merge_without_function_is_a_configuration_error() {
        let mut record = conflicted_record(1_000);
        let result = resolver(ConflictPolicy::Merge).resolve(&mut record, snapshot(2_000));
        assert!(matches!(result, Err(SyncError::Configuration { .. })));
    }

    #[test]
    fn manual_parks_the_record_with_the_snapshot() {
        let mut record = conflicted_record(1_000);
        resolver(ConflictPolicy::Manual)
            .resolve(&mut record, snapshot(2_000))
            .unwrap();

        // Payload untouched until resolved explicitly.
        assert_eq!(record.payload(), Some(&json!({"title": "local"})));
        assert_eq!(record.sync_status, SyncStatus::Conflict);
        assert_eq!(record.conflict, Some(snapshot(2_000)));
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut once = conflicted_record(1_000);
        let mut twice = conflicted_record(1_000);
        once.local_id = twice.local_id;

        let resolver = resolver(ConflictPolicy::ServerWins);
        resolver.resolve(&mut once, snapshot(2_000)).unwrap();
        resolver.resolve(&mut twice, snapshot(2_000)).unwrap();
        resolver.resolve(&mut twice, snapshot(2_000)).unwrap();

        assert_eq!(once, twice);
    }
}
