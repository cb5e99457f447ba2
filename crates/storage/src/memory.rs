//! Sharded in-memory record store
//!
//! DashMap gives lock-free reads and sharded writes, so concurrent
//! transactions touching different records never contend here. Deleted ids
//! move to a tombstone set and are never handed out again; every operation
//! against a tombstoned id fails with `StaleRecordId`.

use chrono::Utc;
use dashmap::{DashMap, DashSet};
use rivet_core::{Error, RecordId, RecordStore, Result, StoredRecord};

/// In-memory [`RecordStore`] implementation
///
/// Versions advance by exactly 1 per mutation via `compare_and_swap`, which
/// is the optimistic primitive the commit path is built on.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<RecordId, StoredRecord>,
    tombstones: DashSet<RecordId>,
    // next free position per container; kept ahead of anything persisted
    positions: DashMap<u32, i64>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the store holds no live records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn read_current_version(&self, id: &RecordId) -> Option<u64> {
        self.records.get(id).map(|r| r.version)
    }

    fn load(&self, id: &RecordId) -> Option<StoredRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    fn persist(&self, id: RecordId, version: u64, payload: Vec<u8>) -> Result<()> {
        if self.tombstones.contains(&id) {
            return Err(Error::StaleRecordId(id));
        }
        let now = Utc::now();
        match self.records.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                stored.version = version;
                stored.payload = payload;
                stored.updated_at = now;
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(StoredRecord {
                    version,
                    payload,
                    created_at: now,
                    updated_at: now,
                });
            }
        }
        // keep the position sequence ahead of externally chosen positions
        if id.position >= 0 {
            let mut next = self.positions.entry(id.container).or_insert(0);
            if id.position >= *next {
                *next = id.position + 1;
            }
        }
        Ok(())
    }

    fn compare_and_swap(&self, id: RecordId, expected: u64, payload: Vec<u8>) -> Result<u64> {
        if self.tombstones.contains(&id) {
            return Err(Error::StaleRecordId(id));
        }
        let mut stored = self
            .records
            .get_mut(&id)
            .ok_or(Error::StaleRecordId(id))?;
        if stored.version != expected {
            return Err(Error::Conflict {
                id,
                expected,
                actual: stored.version,
            });
        }
        stored.version += 1;
        stored.payload = payload;
        stored.updated_at = Utc::now();
        Ok(stored.version)
    }

    fn delete(&self, id: &RecordId) -> Result<()> {
        if self.records.remove(id).is_none() {
            return Err(Error::StaleRecordId(*id));
        }
        self.tombstones.insert(*id);
        Ok(())
    }

    fn is_deleted(&self, id: &RecordId) -> bool {
        self.tombstones.contains(id)
    }

    fn assign_position(&self, container: u32) -> i64 {
        let mut next = self.positions.entry(container).or_insert(0);
        let position = *next;
        *next += 1;
        position
    }

    fn scan(&self) -> Vec<(RecordId, StoredRecord)> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}
