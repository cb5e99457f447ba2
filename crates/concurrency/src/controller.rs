//! Two-phase optimistic commit
//!
//! The controller binds record version checks and the index delta batch
//! into one atomic commit. Phase 1 validates every touched record's stored
//! version and every unique-index delta against committed state without
//! mutating anything; phase 2 applies record writes, id bindings, and the
//! overlay batch. Both phases run under a single commit mutex, so a
//! transaction that passes validation cannot lose a race before its writes
//! land. Reads never take that mutex.
//!
//! Any phase-1 failure rolls the whole transaction back and surfaces as
//! `Conflict`, `StaleRecordId`, or `DuplicateKey`; callers restart from
//! `begin()`. Backoff policy is the caller's, not the controller's.

use crate::transaction::{StagedWrite, Transaction};
use parking_lot::Mutex;
use rivet_core::{Error, RecordId, RecordStore, Result};
use rivet_index::IndexEngine;
use rivet_storage::encode_fields;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a successful commit produced
#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    /// Committed version per written record, in apply order
    pub versions: Vec<(RecordId, u64)>,
    /// Temporary-to-persistent id bindings performed by this commit
    pub bound_ids: Vec<(RecordId, RecordId)>,
}

impl CommitOutcome {
    /// Persistent id a temporary id was bound to, if it was
    pub fn bound(&self, temp: RecordId) -> Option<RecordId> {
        self.bound_ids
            .iter()
            .find(|(from, _)| *from == temp)
            .map(|(_, to)| *to)
    }

    /// Committed version of a record written by this transaction
    pub fn version_of(&self, id: RecordId) -> Option<u64> {
        self.versions
            .iter()
            .find(|(written, _)| *written == id)
            .map(|(_, version)| *version)
    }
}

/// Allocates transaction ids and serializes commits
pub struct ConcurrencyController {
    next_tx_id: AtomicU64,
    commit_lock: Mutex<()>,
}

impl ConcurrencyController {
    /// Create a controller
    pub fn new() -> Self {
        Self {
            next_tx_id: AtomicU64::new(1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Open a new transaction
    pub fn begin(&self) -> Transaction {
        let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(tx_id = id, "transaction opened");
        Transaction::new(id)
    }

    /// Roll a transaction back, discarding all staged state
    ///
    /// # Errors
    /// `InvalidState` on an already committed transaction.
    pub fn rollback(&self, tx: &mut Transaction) -> Result<()> {
        tracing::trace!(tx_id = tx.id(), "transaction rolled back");
        tx.mark_rolled_back()
    }

    /// Commit a transaction atomically
    ///
    /// Validation covers, in phase 1:
    /// - every staged update/delete against the record's current stored
    ///   version (lost-update prevention)
    /// - every unique index's staged deltas against committed entries
    ///   (a collision committed concurrently since staging fails here)
    ///
    /// Phase 2 then binds temporary ids, persists record writes, and
    /// applies the overlay's delta batch. Two transactions over disjoint
    /// records and keys both commit regardless of interleaving; two racing
    /// over the same unique key yield at most one success.
    ///
    /// # Errors
    /// - `Conflict` when a version check fails; the transaction is rolled
    ///   back and the caller must restart it
    /// - `StaleRecordId` when a touched record was deleted concurrently
    /// - `DuplicateKey` when a unique collision was committed concurrently
    /// - `InvalidState` when the transaction is not open
    pub fn commit(
        &self,
        tx: &mut Transaction,
        store: &dyn RecordStore,
        engine: &IndexEngine,
    ) -> Result<CommitOutcome> {
        tx.begin_commit()?;

        let guard = self.commit_lock.lock();
        if let Err(e) = self.validate(tx, store, engine) {
            drop(guard);
            tracing::debug!(tx_id = tx.id(), error = %e, "commit validation failed");
            tx.mark_rolled_back()?;
            return Err(e);
        }

        let outcome = match self.apply(tx, store, engine) {
            Ok(outcome) => outcome,
            Err(e) => {
                drop(guard);
                tracing::error!(tx_id = tx.id(), error = %e, "commit application failed");
                tx.mark_rolled_back()?;
                return Err(e);
            }
        };
        drop(guard);

        tx.complete_commit()?;
        tracing::debug!(
            tx_id = tx.id(),
            records = outcome.versions.len(),
            "transaction committed"
        );
        Ok(outcome)
    }

    /// Phase 1: check every precondition without mutating anything
    fn validate(
        &self,
        tx: &Transaction,
        store: &dyn RecordStore,
        engine: &IndexEngine,
    ) -> Result<()> {
        for id in tx.staged_ids() {
            let base_version = match tx.staged(id) {
                Some(StagedWrite::Create { .. }) | None => continue,
                Some(StagedWrite::Update { base_version, .. }) => *base_version,
                Some(StagedWrite::Delete { base_version }) => *base_version,
            };
            match store.read_current_version(id) {
                None => return Err(Error::StaleRecordId(*id)),
                Some(actual) if actual != base_version => {
                    return Err(Error::Conflict {
                        id: *id,
                        expected: base_version,
                        actual,
                    });
                }
                Some(_) => {}
            }
        }

        for index in tx.overlay().index_names() {
            let def = engine.definition(&index)?;
            if !def.is_unique() {
                continue;
            }
            for key in tx.overlay().touched_keys(&index) {
                let committed = engine.get(&index, &key)?.collect();
                let merged = tx.overlay().merge(&index, &key, committed);
                if merged.len() > 1 {
                    return Err(Error::DuplicateKey { index, key });
                }
            }
        }
        Ok(())
    }

    /// Phase 2: bind ids, persist records, apply the index batch
    fn apply(
        &self,
        tx: &mut Transaction,
        store: &dyn RecordStore,
        engine: &IndexEngine,
    ) -> Result<CommitOutcome> {
        let mut outcome = CommitOutcome::default();

        // bind temporary ids first so every staged reference is persistent
        let temp_ids: Vec<RecordId> = tx
            .staged_ids()
            .iter()
            .copied()
            .filter(RecordId::is_temporary)
            .collect();
        for temp in temp_ids {
            let position = store.assign_position(temp.container);
            let bound = RecordId::new(temp.container, position);
            tx.rebind(temp, bound);
            outcome.bound_ids.push((temp, bound));
        }

        for id in tx.staged_ids().to_vec() {
            match tx.staged(&id) {
                Some(StagedWrite::Create { fields }) => {
                    let payload = encode_fields(fields)?;
                    store.persist(id, 0, payload)?;
                    outcome.versions.push((id, 0));
                }
                Some(StagedWrite::Update {
                    base_version,
                    fields,
                }) => {
                    let payload = encode_fields(fields)?;
                    let version = store.compare_and_swap(id, *base_version, payload)?;
                    outcome.versions.push((id, version));
                }
                Some(StagedWrite::Delete { .. }) => {
                    store.delete(&id)?;
                }
                None => {}
            }
        }

        // apply each key's net effect: removals first, then insertions, so a
        // unique entry is freed before its replacement lands
        for index in tx.overlay().index_names() {
            for key in tx.overlay().touched_keys(&index) {
                let committed: BTreeSet<RecordId> = engine.get(&index, &key)?.collect();
                let merged = tx.overlay().merge(&index, &key, committed.clone());
                for id in committed.difference(&merged) {
                    engine.remove(&index, &key, *id)?;
                }
                for id in merged.difference(&committed) {
                    engine.put(&index, key.clone(), *id)?;
                }
            }
        }
        Ok(outcome)
    }
}

impl Default for ConcurrencyController {
    fn default() -> Self {
        Self::new()
    }
}
