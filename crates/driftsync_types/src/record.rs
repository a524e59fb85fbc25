//! Mutation records: one row per locally known entity.

use crate::remote::RemoteAck;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Returns the current wall-clock time in unix milliseconds.
///
/// Local mutation timestamps use millisecond resolution; the remote
/// authority reports its own `last_modified` in the same unit.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Unique identifier for a mutation record.
///
/// Record IDs are 128-bit UUIDs that are:
/// - Assigned once at record creation
/// - Immutable and never reused
/// - Independent of any identifier the remote authority assigns
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record ID from a UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RecordId> for Uuid {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// The kind of a pending change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// The entity has never been acknowledged by the authority.
    Create,
    /// The entity exists remotely and has local changes.
    Update,
    /// The entity is tombstoned locally, pending remote deletion.
    Delete,
}

/// The pending change carried by a mutation record.
///
/// The payload lives inside the variant, so a tombstone cannot carry
/// data that only matters to creates and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "payload", rename_all = "lowercase")]
pub enum Mutation {
    /// Create the entity with this payload.
    Create(Value),
    /// Replace the entity's remote state with this payload.
    Update(Value),
    /// Delete the entity; a tombstone carries no payload.
    Delete,
}

impl Mutation {
    /// Returns the change kind.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Mutation::Create(_) => Operation::Create,
            Mutation::Update(_) => Operation::Update,
            Mutation::Delete => Operation::Delete,
        }
    }

    /// Returns the payload, if this change carries one.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Mutation::Create(payload) | Mutation::Update(payload) => Some(payload),
            Mutation::Delete => None,
        }
    }

    /// Returns a change with the payload replaced.
    ///
    /// The kind is preserved; a tombstone becomes an update, since it
    /// now carries data again.
    #[must_use]
    pub fn with_payload(&self, payload: Value) -> Self {
        match self {
            Mutation::Create(_) => Mutation::Create(payload),
            Mutation::Update(_) | Mutation::Delete => Mutation::Update(payload),
        }
    }
}

/// Synchronization status of a mutation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// The authority has acknowledged the record's current state.
    Synced,
    /// The record carries local changes not yet acknowledged.
    Pending,
    /// A version conflict awaits manual resolution.
    Conflict,
}

/// The authority's state of an entity, captured when a write conflicts.
///
/// Present on a record if and only if its status is [`SyncStatus::Conflict`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSnapshot {
    /// The authority's current payload for the entity.
    pub payload: Value,
    /// The authority's current version token.
    pub version: u64,
    /// When the authority last modified the entity, unix milliseconds.
    pub last_modified: u64,
}

impl ConflictSnapshot {
    /// Creates a new conflict snapshot.
    pub fn new(payload: Value, version: u64, last_modified: u64) -> Self {
        Self {
            payload,
            version,
            last_modified,
        }
    }
}

/// One locally known entity and its pending or completed change.
///
/// A record is created by a local create call, mutated in place by every
/// subsequent local edit and by every sync attempt, and destroyed when a
/// delete is acknowledged by the authority. There is never more than one
/// record per [`RecordId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationRecord {
    /// Primary key, assigned at creation, never reused.
    pub local_id: RecordId,
    /// Identifier assigned by the authority once a create is acknowledged.
    pub remote_id: Option<String>,
    /// The pending change, carrying the entity's current data.
    #[serde(flatten)]
    pub mutation: Mutation,
    /// Current synchronization status.
    pub sync_status: SyncStatus,
    /// Monotonic token advanced only on confirmed remote acknowledgment.
    pub version: Option<u64>,
    /// Timestamp of the last local mutation, unix milliseconds.
    pub last_modified: u64,
    /// Consecutive failed sync attempts since the last success.
    pub retry_count: u32,
    /// The remote state captured on conflict. Non-empty iff status is
    /// [`SyncStatus::Conflict`].
    pub conflict: Option<ConflictSnapshot>,
}

impl MutationRecord {
    /// Creates a record for a brand-new local entity.
    ///
    /// The record starts as a pending create with `version = 1`.
    #[must_use]
    pub fn create(payload: Value, now: u64) -> Self {
        Self {
            local_id: RecordId::new(),
            remote_id: None,
            mutation: Mutation::Create(payload),
            sync_status: SyncStatus::Pending,
            version: Some(1),
            last_modified: now,
            retry_count: 0,
            conflict: None,
        }
    }

    /// Returns the pending change kind.
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.mutation.operation()
    }

    /// Returns the entity's current data; a tombstone carries none.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.mutation.payload()
    }

    /// Applies a local edit to the record.
    ///
    /// Replaces the payload, refreshes `last_modified`, and recomputes the
    /// status to [`SyncStatus::Pending`]. A record whose create has never
    /// been acknowledged stays a create, so the authority sees a single
    /// create carrying the latest payload; anything else becomes an update.
    pub fn apply_update(&mut self, payload: Value, now: u64) {
        self.mutation = if self.operation() == Operation::Create
            && self.sync_status != SyncStatus::Synced
        {
            Mutation::Create(payload)
        } else {
            Mutation::Update(payload)
        };
        self.last_modified = now;
        self.sync_status = SyncStatus::Pending;
        self.conflict = None;
    }

    /// Tombstones the record for deletion.
    ///
    /// The record is retained as a payload-less tombstone until the
    /// authority acknowledges the deletion, at which point it is removed
    /// entirely.
    pub fn apply_delete(&mut self, now: u64) {
        self.mutation = Mutation::Delete;
        self.last_modified = now;
        self.sync_status = SyncStatus::Pending;
        self.conflict = None;
    }

    /// Applies a remote acknowledgment to a non-delete record.
    ///
    /// Merges server-returned fields into the payload, adopts the
    /// authority-assigned identifier and version token, and marks the
    /// record [`SyncStatus::Synced`] with the retry counter cleared.
    pub fn acknowledge(&mut self, ack: RemoteAck) {
        if let Some(remote_id) = ack.remote_id {
            self.remote_id = Some(remote_id);
        }
        if let Some(server_payload) = ack.payload {
            if let Mutation::Create(payload) | Mutation::Update(payload) = &mut self.mutation {
                merge_server_fields(payload, server_payload);
            }
        }
        self.version = Some(ack.version);
        self.last_modified = ack.last_modified;
        self.sync_status = SyncStatus::Synced;
        self.retry_count = 0;
        self.conflict = None;
    }

    /// Returns true if the record is a tombstone awaiting remote deletion.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.operation() == Operation::Delete
    }

    /// Returns the version token, or 0 if none has been assigned.
    #[must_use]
    pub fn version_or_zero(&self) -> u64 {
        self.version.unwrap_or(0)
    }
}

/// Overlays server-returned fields onto a local payload.
///
/// Two JSON objects merge key-by-key with the server winning; any other
/// shape is replaced wholesale.
fn merge_server_fields(local: &mut Value, server: Value) {
    match (local, server) {
        (Value::Object(local_map), Value::Object(server_map)) => {
            for (key, value) in server_map {
                local_map.insert(key, value);
            }
        }
        (slot, server) => *slot = server,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_id_is_unique() {
        let a = RecordId::new();
        let b = RecordId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn create_starts_pending_at_version_one() {
        let record = MutationRecord::create(json!({"title": "Buy milk"}), 1_000);
        assert_eq!(record.operation(), Operation::Create);
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.version, Some(1));
        assert_eq!(record.retry_count, 0);
        assert!(record.conflict.is_none());
        assert!(record.remote_id.is_none());
    }

    #[test]
    fn update_on_unacknowledged_create_stays_create() {
        let mut record = MutationRecord::create(json!({"title": "a"}), 1_000);
        record.apply_update(json!({"title": "b"}), 2_000);

        assert_eq!(record.operation(), Operation::Create);
        assert_eq!(record.payload(), Some(&json!({"title": "b"})));
        assert_eq!(record.last_modified, 2_000);
    }

    #[test]
    fn update_on_synced_record_becomes_update() {
        let mut record = MutationRecord::create(json!({"title": "a"}), 1_000);
        record.acknowledge(RemoteAck::new(2, 1_500));

        record.apply_update(json!({"title": "b"}), 2_000);
        assert_eq!(record.operation(), Operation::Update);
        assert_eq!(record.sync_status, SyncStatus::Pending);
    }

    #[test]
    fn acknowledge_adopts_remote_fields() {
        let mut record = MutationRecord::create(json!({"title": "a"}), 1_000);
        record.retry_count = 3;

        let ack = RemoteAck::new(7, 5_000)
            .with_remote_id("srv-42")
            .with_payload(json!({"title": "a", "etag": "abc"}));
        record.acknowledge(ack);

        assert_eq!(record.sync_status, SyncStatus::Synced);
        assert_eq!(record.version, Some(7));
        assert_eq!(record.last_modified, 5_000);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.remote_id.as_deref(), Some("srv-42"));
        assert_eq!(record.payload(), Some(&json!({"title": "a", "etag": "abc"})));
    }

    #[test]
    fn acknowledge_merges_server_fields_over_local() {
        let mut record = MutationRecord::create(json!({"title": "local", "done": false}), 1_000);
        record.acknowledge(RemoteAck::new(2, 2_000).with_payload(json!({"title": "server"})));

        // Server fields win; untouched local fields survive.
        assert_eq!(
            record.payload(),
            Some(&json!({"title": "server", "done": false}))
        );
    }

    #[test]
    fn delete_drops_the_payload() {
        let mut record = MutationRecord::create(json!({"title": "a"}), 1_000);
        record.apply_delete(3_000);

        assert!(record.is_tombstone());
        assert!(record.payload().is_none());
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.last_modified, 3_000);
    }

    #[test]
    fn with_payload_revives_a_tombstone_as_update() {
        assert_eq!(
            Mutation::Delete.with_payload(json!({"a": 1})),
            Mutation::Update(json!({"a": 1}))
        );
        assert_eq!(
            Mutation::Create(json!({})).with_payload(json!({"a": 1})),
            Mutation::Create(json!({"a": 1}))
        );
    }

    #[test]
    fn local_edit_clears_conflict_snapshot() {
        let mut record = MutationRecord::create(json!({"title": "a"}), 1_000);
        record.sync_status = SyncStatus::Conflict;
        record.conflict = Some(ConflictSnapshot::new(json!({"title": "remote"}), 3, 4_000));

        record.apply_update(json!({"title": "b"}), 5_000);
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert!(record.conflict.is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let record = MutationRecord::create(json!({"title": "a"}), 1_000);
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: MutationRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);

        let mut tombstone = record;
        tombstone.apply_delete(2_000);
        let encoded = serde_json::to_string(&tombstone).unwrap();
        let decoded: MutationRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, tombstone);
    }

    #[test]
    fn mutation_flattens_into_operation_and_payload() {
        let record = MutationRecord::create(json!({"title": "a"}), 1_000);
        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded["operation"], json!("create"));
        assert_eq!(encoded["payload"], json!({"title": "a"}));

        assert_eq!(
            serde_json::to_string(&SyncStatus::Pending).unwrap(),
            "\"pending\""
        );
    }
}
