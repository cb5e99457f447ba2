//! Database facade
//!
//! [`Database`] owns the record store, the index engine, and the
//! concurrency controller, and keeps them coherent: saving or deleting a
//! record through a transaction stages the matching index deltas
//! automatically, by diffing the record's indexed fields against what the
//! transaction (or the committed store) last saw for that record.
//!
//! Commit observers registered on the database are invoked synchronously
//! around the commit boundary, in registration order. The list is empty by
//! default.

use chrono::Utc;
use parking_lot::RwLock;
use rivet_concurrency::{CommitOutcome, ConcurrencyController, StagedWrite, Transaction};
use rivet_core::{
    CommitObserver, Error, IdAllocator, IndexKey, RecordId, RecordMetadata, RecordStore, Result,
    Value, VersionedRecord,
};
use rivet_index::{EntryCursor, IndexDefinition, IndexEngine, KeyCursor, RidCursor};
use rivet_storage::{decode_fields, MemoryStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Caller-side retry policy for optimistic conflicts
///
/// The engine core never sleeps or retries on its own; this policy only
/// drives the [`Database::run_with_retry`] convenience wrapper. The delay
/// grows linearly with the attempt number.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts before the conflict is surfaced
    pub attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(2),
        }
    }
}

/// The assembled data engine
pub struct Database {
    store: Arc<MemoryStore>,
    indexes: IndexEngine,
    controller: ConcurrencyController,
    allocator: IdAllocator,
    observers: RwLock<Vec<Box<dyn CommitObserver>>>,
}

impl Database {
    /// Create an empty database
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            indexes: IndexEngine::new(),
            controller: ConcurrencyController::new(),
            allocator: IdAllocator::new(),
            observers: RwLock::new(Vec::new()),
        }
    }

    // === Index DDL ===

    /// Register an index and backfill it from the current records
    ///
    /// # Errors
    /// `IndexExists`; `DuplicateKey` or `TypeMismatch` when existing data
    /// violates the new definition, in which case the index is not kept.
    pub fn create_index(&self, def: IndexDefinition) -> Result<()> {
        let name = def.name().to_string();
        self.indexes.create_index(def.clone())?;
        if let Err(e) = self.populate(&def) {
            let _ = self.indexes.drop_index(&name);
            return Err(e);
        }
        Ok(())
    }

    /// Drop an index and all its entries
    ///
    /// # Errors
    /// `IndexNotFound`.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.indexes.drop_index(name)
    }

    /// Rebuild an index by replaying every current record through `put`
    ///
    /// Returns the number of entries written.
    ///
    /// # Errors
    /// `IndexNotFound`; errors from replaying the records.
    pub fn rebuild(&self, name: &str) -> Result<usize> {
        let def = self.indexes.definition(name)?;
        self.indexes.clear(name)?;
        let count = self.populate(&def)?;
        tracing::debug!(index = name, entries = count, "index rebuilt");
        Ok(count)
    }

    fn populate(&self, def: &IndexDefinition) -> Result<usize> {
        let mut count = 0;
        for (id, stored) in self.store.scan() {
            let fields = decode_fields(&stored.payload)?;
            if let Some(key) = def.extract_key(&fields)? {
                self.indexes.put(def.name(), key, id)?;
                count += 1;
            }
        }
        Ok(count)
    }

    // === Transaction boundary ===

    /// Open a new transaction
    pub fn begin(&self) -> Transaction {
        self.controller.begin()
    }

    /// Commit a transaction
    ///
    /// Observers run `before_commit` first; any veto rolls the transaction
    /// back. After a successful commit `after_commit` runs; after any
    /// rollback path `after_rollback` runs.
    ///
    /// # Errors
    /// `Conflict`, `StaleRecordId`, or `DuplicateKey` from commit-time
    /// validation; the transaction is rolled back in every error case.
    pub fn commit(&self, tx: &mut Transaction) -> Result<CommitOutcome> {
        let veto = {
            let observers = self.observers.read();
            let mut veto = None;
            for observer in observers.iter() {
                if let Err(e) = observer.before_commit(tx.id()) {
                    veto = Some(e);
                    break;
                }
            }
            veto
        };
        if let Some(e) = veto {
            tx.mark_rolled_back()?;
            self.notify_rollback(tx.id());
            return Err(e);
        }

        match self
            .controller
            .commit(tx, self.store.as_ref(), &self.indexes)
        {
            Ok(outcome) => {
                let observers = self.observers.read();
                for observer in observers.iter() {
                    observer.after_commit(tx.id());
                }
                Ok(outcome)
            }
            Err(e) => {
                self.notify_rollback(tx.id());
                Err(e)
            }
        }
    }

    /// Roll a transaction back, discarding all staged state
    ///
    /// # Errors
    /// `InvalidState` on an already committed transaction.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<()> {
        self.controller.rollback(tx)?;
        self.notify_rollback(tx.id());
        Ok(())
    }

    fn notify_rollback(&self, tx_id: u64) {
        let observers = self.observers.read();
        for observer in observers.iter() {
            observer.after_rollback(tx_id);
        }
    }

    /// Register a commit observer; observers run in registration order
    pub fn add_observer(&self, observer: Box<dyn CommitObserver>) {
        self.observers.write().push(observer);
    }

    /// Run a closure in a transaction, retrying on optimistic conflicts
    ///
    /// The whole closure re-executes on `Conflict` or `StaleRecordId`, up
    /// to the default [`RetryPolicy`]. Any other error surfaces at once.
    ///
    /// # Errors
    /// The closure's error, or the final conflict when attempts run out.
    pub fn run_in_transaction<T>(
        &self,
        f: impl FnMut(&mut Transaction) -> Result<T>,
    ) -> Result<T> {
        self.run_with_retry(RetryPolicy::default(), f)
    }

    /// [`Database::run_in_transaction`] with an explicit retry policy
    ///
    /// # Errors
    /// The closure's error, or the final conflict when attempts run out.
    pub fn run_with_retry<T>(
        &self,
        policy: RetryPolicy,
        mut f: impl FnMut(&mut Transaction) -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut tx = self.begin();
            let result = f(&mut tx).and_then(|value| self.commit(&mut tx).map(|_| value));
            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if tx.is_open() {
                        let _ = self.rollback(&mut tx);
                    }
                    let retryable =
                        matches!(e, Error::Conflict { .. } | Error::StaleRecordId(_));
                    if !retryable || attempt >= policy.attempts {
                        return Err(e);
                    }
                    tracing::debug!(attempt, error = %e, "retrying transaction after conflict");
                    std::thread::sleep(policy.base_delay * attempt);
                }
            }
        }
    }

    // === Records ===

    /// Allocate a temporary id in a container
    pub fn allocate(&self, container: u32) -> RecordId {
        self.allocator.allocate(container)
    }

    /// Convenience: a fresh record under a newly allocated temporary id
    pub fn new_record(&self, container: u32) -> VersionedRecord {
        VersionedRecord::new(self.allocate(container))
    }

    /// Stage a record save and the index deltas its field changes imply
    ///
    /// For every index whose key changes between the previously visible
    /// fields (staged in this transaction, or committed) and the record's
    /// current fields, a removal of the old key and an insertion of the new
    /// key are staged. Unique violations surface here, before anything is
    /// staged, and leave the transaction open.
    ///
    /// # Errors
    /// `InvalidState`, `StaleRecordId`, `TypeMismatch`, `DuplicateKey`.
    pub fn save(&self, tx: &mut Transaction, record: &VersionedRecord) -> Result<()> {
        let id = record.id();
        let prior = self.prior_fields(tx, id)?;

        // plan the index delta set before mutating any transaction state
        let mut removes: Vec<(String, IndexKey)> = Vec::new();
        let mut puts: Vec<(IndexDefinition, IndexKey)> = Vec::new();
        for def in self.indexes.definitions() {
            let old_key = match &prior {
                Some(fields) => def.extract_key(fields)?,
                None => None,
            };
            let new_key = def.extract_key(record.fields())?;
            if old_key == new_key {
                continue;
            }
            if let Some(key) = old_key {
                removes.push((def.name().to_string(), key));
            }
            if let Some(key) = new_key {
                puts.push((def, key));
            }
        }

        // fail fast on unique collisions; the statement is rejected whole
        for (def, key) in &puts {
            if !def.is_unique() {
                continue;
            }
            let committed: BTreeSet<RecordId> = self.indexes.get(def.name(), key)?.collect();
            let visible = tx.overlay().merge(def.name(), key, committed);
            if visible.iter().any(|existing| *existing != id) {
                return Err(Error::DuplicateKey {
                    index: def.name().to_string(),
                    key: key.clone(),
                });
            }
        }

        if tx.staged(&id).is_some() || id.is_persistent() {
            tx.stage_update(id, record.version(), record.fields().clone())?;
        } else {
            tx.stage_create(id, record.fields().clone())?;
        }

        for (name, key) in removes {
            tx.staged_remove(&self.indexes, &name, key, id)?;
        }
        for (def, key) in puts {
            tx.staged_put(&self.indexes, def.name(), key, id)?;
        }
        Ok(())
    }

    /// Stage a record deletion and the removal of its index entries
    ///
    /// Deleting a record created in the same transaction cancels the
    /// create; nothing reaches the store or the indexes for it.
    ///
    /// # Errors
    /// `InvalidState`, `StaleRecordId`, `TypeMismatch`.
    pub fn delete(&self, tx: &mut Transaction, record: &VersionedRecord) -> Result<()> {
        let id = record.id();
        let prior = self
            .prior_fields(tx, id)?
            .ok_or(Error::StaleRecordId(id))?;

        let mut removes: Vec<(String, IndexKey)> = Vec::new();
        for def in self.indexes.definitions() {
            if let Some(key) = def.extract_key(&prior)? {
                removes.push((def.name().to_string(), key));
            }
        }

        tx.stage_delete(id, record.version())?;
        for (name, key) in removes {
            tx.staged_remove(&self.indexes, &name, key, id)?;
        }
        Ok(())
    }

    /// The fields a save or delete in this transaction diffs against
    fn prior_fields(
        &self,
        tx: &Transaction,
        id: RecordId,
    ) -> Result<Option<BTreeMap<String, Value>>> {
        match tx.staged(&id) {
            Some(StagedWrite::Delete { .. }) => Err(Error::StaleRecordId(id)),
            Some(StagedWrite::Create { fields })
            | Some(StagedWrite::Update { fields, .. }) => Ok(Some(fields.clone())),
            None => {
                if id.is_temporary() {
                    return Ok(None);
                }
                match self.store.load(&id) {
                    Some(stored) => Ok(Some(decode_fields(&stored.payload)?)),
                    None => Err(Error::StaleRecordId(id)),
                }
            }
        }
    }

    /// Load a record through a transaction (read-your-own-writes)
    ///
    /// # Errors
    /// `Serialization` on a corrupt stored payload.
    pub fn load(&self, tx: &Transaction, id: RecordId) -> Result<Option<VersionedRecord>> {
        match tx.staged(&id) {
            Some(StagedWrite::Delete { .. }) => Ok(None),
            Some(StagedWrite::Create { fields }) => {
                let now = Utc::now();
                Ok(Some(VersionedRecord::from_parts(
                    id,
                    0,
                    fields.clone(),
                    now,
                    now,
                )))
            }
            Some(StagedWrite::Update {
                base_version,
                fields,
            }) => {
                let (created_at, updated_at) = match self.store.load(&id) {
                    Some(stored) => (stored.created_at, stored.updated_at),
                    None => {
                        let now = Utc::now();
                        (now, now)
                    }
                };
                Ok(Some(VersionedRecord::from_parts(
                    id,
                    *base_version,
                    fields.clone(),
                    created_at,
                    updated_at,
                )))
            }
            None => self.load_committed(id),
        }
    }

    /// Load a record's committed state
    ///
    /// Deleted and never-persisted ids both read as absent.
    ///
    /// # Errors
    /// `Serialization` on a corrupt stored payload.
    pub fn load_committed(&self, id: RecordId) -> Result<Option<VersionedRecord>> {
        match self.store.load(&id) {
            None => Ok(None),
            Some(stored) => {
                let fields = decode_fields(&stored.payload)?;
                Ok(Some(VersionedRecord::from_parts(
                    id,
                    stored.version,
                    fields,
                    stored.created_at,
                    stored.updated_at,
                )))
            }
        }
    }

    /// Version and timestamp metadata of a committed record
    pub fn metadata(&self, id: &RecordId) -> Option<RecordMetadata> {
        self.store.load(id).map(|stored| RecordMetadata {
            version: stored.version,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }

    /// Number of live committed records
    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    // === Index reads ===

    /// Committed ids for a key
    ///
    /// # Errors
    /// `IndexNotFound`, `TypeMismatch`.
    pub fn get(&self, index: &str, key: &IndexKey) -> Result<RidCursor> {
        self.indexes.get(index, key)
    }

    /// Ids for a key as visible to a transaction (overlay merged)
    ///
    /// # Errors
    /// `IndexNotFound`, `TypeMismatch`.
    pub fn read(&self, tx: &Transaction, index: &str, key: &IndexKey) -> Result<RidCursor> {
        tx.read_index(&self.indexes, index, key)
    }

    /// All distinct committed keys of an index, ascending
    ///
    /// # Errors
    /// `IndexNotFound`.
    pub fn keys(&self, index: &str) -> Result<KeyCursor> {
        self.indexes.keys(index)
    }

    /// Committed range scan, ascending, tuple-wise for composite keys
    ///
    /// # Errors
    /// `IndexNotFound`, `TypeMismatch`.
    pub fn range(
        &self,
        index: &str,
        from: Option<&IndexKey>,
        to: Option<&IndexKey>,
        inclusive: (bool, bool),
    ) -> Result<EntryCursor> {
        self.indexes.range(index, from, to, inclusive)
    }

    /// Names of all indexes, ascending
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.names()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
