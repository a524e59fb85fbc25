//! Record store contract and in-memory implementation.

use crate::error::StoreResult;
use crate::record::{MutationRecord, RecordId, SyncStatus};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A durable keyed table of mutation records.
///
/// One table exists per entity type, primary-keyed by [`RecordId`], with
/// secondary lookups by sync status (the pending scan on reconnect) and by
/// last-modified time (monitoring and ordering). The engine is the single
/// writer; implementations only need interior mutability, not their own
/// cross-record transactions.
pub trait RecordStore: Send + Sync {
    /// Gets a record by ID.
    fn get(&self, id: RecordId) -> StoreResult<Option<MutationRecord>>;

    /// Inserts or overwrites the record with the same `local_id`.
    fn put(&self, record: MutationRecord) -> StoreResult<()>;

    /// Removes a record, returning it if it existed.
    fn remove(&self, id: RecordId) -> StoreResult<Option<MutationRecord>>;

    /// Returns all records.
    fn all(&self) -> StoreResult<Vec<MutationRecord>>;

    /// Returns all records with the given status.
    fn by_status(&self, status: SyncStatus) -> StoreResult<Vec<MutationRecord>>;

    /// Returns records modified at or after `since`, ordered by
    /// `last_modified` ascending.
    fn modified_since(&self, since: u64) -> StoreResult<Vec<MutationRecord>>;

    /// Returns the number of records.
    fn len(&self) -> StoreResult<usize>;

    /// Returns true if the store holds no records.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// An in-memory record store.
///
/// Used by tests and by embedders that bring no persistence of their own.
/// Secondary lookups scan the map; at mutation-queue sizes that is cheaper
/// than maintaining separate indexes.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<RecordId, MutationRecord>>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, id: RecordId) -> StoreResult<Option<MutationRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    fn put(&self, record: MutationRecord) -> StoreResult<()> {
        self.records.write().insert(record.local_id, record);
        Ok(())
    }

    fn remove(&self, id: RecordId) -> StoreResult<Option<MutationRecord>> {
        Ok(self.records.write().remove(&id))
    }

    fn all(&self) -> StoreResult<Vec<MutationRecord>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn by_status(&self, status: SyncStatus) -> StoreResult<Vec<MutationRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.sync_status == status)
            .cloned()
            .collect())
    }

    fn modified_since(&self, since: u64) -> StoreResult<Vec<MutationRecord>> {
        let mut records: Vec<MutationRecord> = self
            .records
            .read()
            .values()
            .filter(|r| r.last_modified >= since)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.last_modified);
        Ok(records)
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.records.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_at(now: u64) -> MutationRecord {
        MutationRecord::create(json!({"t": now}), now)
    }

    #[test]
    fn put_get_remove() {
        let store = MemoryRecordStore::new();
        let record = record_at(1);
        let id = record.local_id;

        store.put(record.clone()).unwrap();
        assert_eq!(store.get(id).unwrap(), Some(record));
        assert_eq!(store.len().unwrap(), 1);

        let removed = store.remove(id).unwrap();
        assert!(removed.is_some());
        assert!(store.get(id).unwrap().is_none());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn put_overwrites_same_id() {
        let store = MemoryRecordStore::new();
        let mut record = record_at(1);
        let id = record.local_id;
        store.put(record.clone()).unwrap();

        record.apply_update(json!({"t": 2}), 2);
        store.put(record).unwrap();

        assert_eq!(store.len().unwrap(), 1);
        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.payload(), Some(&json!({"t": 2})));
    }

    #[test]
    fn by_status_filters() {
        let store = MemoryRecordStore::new();
        let pending = record_at(1);
        let mut synced = record_at(2);
        synced.sync_status = SyncStatus::Synced;

        store.put(pending.clone()).unwrap();
        store.put(synced).unwrap();

        let found = store.by_status(SyncStatus::Pending).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].local_id, pending.local_id);
        assert!(store.by_status(SyncStatus::Conflict).unwrap().is_empty());
    }

    #[test]
    fn modified_since_orders_ascending() {
        let store = MemoryRecordStore::new();
        store.put(record_at(30)).unwrap();
        store.put(record_at(10)).unwrap();
        store.put(record_at(20)).unwrap();

        let records = store.modified_since(15).unwrap();
        let stamps: Vec<u64> = records.iter().map(|r| r.last_modified).collect();
        assert_eq!(stamps, vec![20, 30]);
    }
}
