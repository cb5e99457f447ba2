//! Collaborator seams
//!
//! The engine core treats physical storage as a black-box key to bytes
//! store addressed by record ids; [`RecordStore`] is that seam. Hook and
//! event dispatch around the commit boundary goes through
//! [`CommitObserver`], an ordered observer list that is empty by default.

use crate::error::Result;
use crate::rid::RecordId;
use chrono::{DateTime, Utc};

/// Stored state of a record as the store holds it
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Current committed version
    pub version: u64,
    /// Opaque encoded payload
    pub payload: Vec<u8>,
    /// When the record was first persisted
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated
    pub updated_at: DateTime<Utc>,
}

/// Version and timestamp metadata for a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Current committed version
    pub version: u64,
    /// When the record was first persisted
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated
    pub updated_at: DateTime<Utc>,
}

/// Durable record store collaborator
///
/// The core never defines the physical byte layout; it hands the store an
/// opaque payload per record id and relies on these operations:
///
/// - versions are monotonic per id and advance by exactly 1 per mutation
/// - a deleted id is tombstoned and never reused
/// - `compare_and_swap` is the single optimistic building block every
///   higher-level retry behavior composes from
pub trait RecordStore: Send + Sync {
    /// Current committed version of a record, `None` if absent or deleted
    fn read_current_version(&self, id: &RecordId) -> Option<u64>;

    /// Load a record's stored state, `None` if absent or deleted
    fn load(&self, id: &RecordId) -> Option<StoredRecord>;

    /// Write a record at an explicit version (first persist or replay)
    ///
    /// # Errors
    /// Fails with `StaleRecordId` when the id is tombstoned.
    fn persist(&self, id: RecordId, version: u64, payload: Vec<u8>) -> Result<()>;

    /// Atomically replace the payload if the stored version matches
    ///
    /// On success the stored version becomes `expected + 1`, the mutation
    /// is timestamped, and the new version is returned.
    ///
    /// # Errors
    /// - `Conflict` when the stored version differs from `expected`
    /// - `StaleRecordId` when the id is absent or tombstoned
    fn compare_and_swap(&self, id: RecordId, expected: u64, payload: Vec<u8>) -> Result<u64>;

    /// Tombstone a record; its id is never reused
    ///
    /// # Errors
    /// Fails with `StaleRecordId` when the id is absent or already deleted.
    fn delete(&self, id: &RecordId) -> Result<()>;

    /// True if the id was deleted earlier
    fn is_deleted(&self, id: &RecordId) -> bool;

    /// True if a live record exists under the id
    fn contains(&self, id: &RecordId) -> bool {
        self.read_current_version(id).is_some()
    }

    /// Next free persistent position in a container
    fn assign_position(&self, container: u32) -> i64;

    /// Snapshot of every live record, for index rebuilds
    fn scan(&self) -> Vec<(RecordId, StoredRecord)>;
}

/// Observer invoked synchronously around the commit boundary
///
/// Observers are held in an ordered list on the engine and called in
/// registration order. The default list is empty; every hook point is a
/// no-op unless overridden.
pub trait CommitObserver: Send + Sync {
    /// Called when a commit begins, before validation or application
    ///
    /// # Errors
    /// An error vetoes the commit; the transaction is rolled back.
    fn before_commit(&self, tx_id: u64) -> Result<()> {
        let _ = tx_id;
        Ok(())
    }

    /// Called once the commit has been fully applied
    fn after_commit(&self, tx_id: u64) {
        let _ = tx_id;
    }

    /// Called when a transaction is rolled back, for any reason
    fn after_rollback(&self, tx_id: u64) {
        let _ = tx_id;
    }
}
