//! Transaction state and staged operations
//!
//! A [`Transaction`] owns everything a context has staged but not committed:
//! record creates, updates, and deletes keyed by record id, plus the index
//! overlay. Nothing here is visible to other transactions; the committed
//! engine and store are only touched by the controller at commit time.
//!
//! State machine: `Open` accepts staged operations; `Committing` is entered
//! once and accepts none; the terminal states are `Committed` and
//! `RolledBack`. Rolling back an already rolled-back transaction is a no-op
//! so cleanup paths can call it unconditionally.

use crate::overlay::TransactionIndexOverlay;
use rivet_core::{Error, IndexKey, RecordId, Result, Value};
use rivet_index::{IndexEngine, NullsPolicy, RidCursor};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting staged operations
    Open,
    /// Commit has begun; no further staged operations
    Committing,
    /// Terminal: all staged state applied
    Committed,
    /// Terminal: all staged state discarded
    RolledBack,
}

/// One staged record operation
///
/// A record updated twice keeps the base version of its first read; the
/// later fields simply replace the earlier ones. A record created and then
/// deleted in the same transaction cancels out entirely.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedWrite {
    /// First save of a new record under a temporary id
    Create {
        /// Fields to persist at version 0
        fields: BTreeMap<String, Value>,
    },
    /// Update of an existing record
    Update {
        /// Version observed when the record was loaded
        base_version: u64,
        /// Full replacement fields
        fields: BTreeMap<String, Value>,
    },
    /// Deletion of an existing record
    Delete {
        /// Version observed when the record was loaded
        base_version: u64,
    },
}

/// A transaction's staged state, exclusively owned by one context
#[derive(Debug)]
pub struct Transaction {
    id: u64,
    status: TransactionStatus,
    writes: FxHashMap<RecordId, StagedWrite>,
    write_order: Vec<RecordId>,
    overlay: TransactionIndexOverlay,
}

impl Transaction {
    /// Create an open transaction with the given id
    pub fn new(id: u64) -> Self {
        Self {
            id,
            status: TransactionStatus::Open,
            writes: FxHashMap::default(),
            write_order: Vec::new(),
            overlay: TransactionIndexOverlay::new(),
        }
    }

    /// Transaction id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Current lifecycle state
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// True while the transaction accepts staged operations
    pub fn is_open(&self) -> bool {
        self.status == TransactionStatus::Open
    }

    /// Error unless the transaction is open
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "transaction {} is {:?}, not open",
                self.id, self.status
            )))
        }
    }

    // === Staged record operations ===

    /// Stage the first save of a new record
    ///
    /// # Errors
    /// - `InvalidState` when the transaction is not open or the id is not
    ///   temporary
    /// - `StaleRecordId` when the id was already staged for deletion
    pub fn stage_create(&mut self, id: RecordId, fields: BTreeMap<String, Value>) -> Result<()> {
        self.ensure_open()?;
        if !id.is_temporary() {
            return Err(Error::InvalidState(format!(
                "create must use a temporary id, got {}",
                id
            )));
        }
        match self.writes.get(&id) {
            Some(StagedWrite::Delete { .. }) => return Err(Error::StaleRecordId(id)),
            Some(_) => {
                return Err(Error::InvalidState(format!(
                    "record {} is already staged in transaction {}",
                    id, self.id
                )))
            }
            None => {}
        }
        self.writes.insert(id, StagedWrite::Create { fields });
        self.write_order.push(id);
        Ok(())
    }

    /// Stage an update of an existing record
    ///
    /// `base_version` is the version the caller observed at load time; the
    /// commit fails with `Conflict` when the stored version has moved past
    /// it. Re-staging an already staged record replaces the fields but
    /// keeps the original base version.
    ///
    /// # Errors
    /// - `InvalidState` when the transaction is not open
    /// - `StaleRecordId` when the record was deleted earlier in this
    ///   transaction
    pub fn stage_update(
        &mut self,
        id: RecordId,
        base_version: u64,
        fields: BTreeMap<String, Value>,
    ) -> Result<()> {
        self.ensure_open()?;
        match self.writes.get_mut(&id) {
            Some(StagedWrite::Delete { .. }) => Err(Error::StaleRecordId(id)),
            Some(StagedWrite::Create { fields: staged }) => {
                *staged = fields;
                Ok(())
            }
            Some(StagedWrite::Update { fields: staged, .. }) => {
                *staged = fields;
                Ok(())
            }
            None => {
                self.writes.insert(
                    id,
                    StagedWrite::Update {
                        base_version,
                        fields,
                    },
                );
                self.write_order.push(id);
                Ok(())
            }
        }
    }

    /// Stage a deletion
    ///
    /// Deleting a record created earlier in this transaction cancels the
    /// create; nothing reaches the store for that id.
    ///
    /// # Errors
    /// - `InvalidState` when the transaction is not open
    /// - `StaleRecordId` when the record was already deleted in this
    ///   transaction
    pub fn stage_delete(&mut self, id: RecordId, base_version: u64) -> Result<()> {
        self.ensure_open()?;
        match self.writes.get(&id) {
            Some(StagedWrite::Delete { .. }) => Err(Error::StaleRecordId(id)),
            Some(StagedWrite::Create { .. }) => {
                self.writes.remove(&id);
                self.write_order.retain(|staged| *staged != id);
                Ok(())
            }
            Some(StagedWrite::Update { base_version, .. }) => {
                let base = *base_version;
                self.writes.insert(id, StagedWrite::Delete { base_version: base });
                Ok(())
            }
            None => {
                self.writes.insert(id, StagedWrite::Delete { base_version });
                self.write_order.push(id);
                Ok(())
            }
        }
    }

    /// This transaction's staged operation for a record, if any
    pub fn staged(&self, id: &RecordId) -> Option<&StagedWrite> {
        self.writes.get(id)
    }

    /// Record ids with staged operations, in first-staging order
    pub fn staged_ids(&self) -> &[RecordId] {
        &self.write_order
    }

    /// True if nothing has been staged
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty() && self.overlay.is_empty()
    }

    // === Staged index operations ===

    /// Stage an index insertion, validating unique constraints immediately
    ///
    /// For unique indexes the key is checked against the committed state
    /// merged with this transaction's own prior deltas; a collision fails
    /// now, in the offending statement, not at commit. The transaction
    /// stays open; only this operation is rejected.
    ///
    /// # Errors
    /// `InvalidState`, `IndexNotFound`, `TypeMismatch`, `DuplicateKey`.
    pub fn staged_put(
        &mut self,
        engine: &IndexEngine,
        index: &str,
        key: IndexKey,
        id: RecordId,
    ) -> Result<()> {
        self.ensure_open()?;
        let def = engine.definition(index)?;
        def.check_key(&key)?;
        if def.nulls_policy() == NullsPolicy::Skipped && key.has_null() {
            return Ok(());
        }
        if def.is_unique() {
            let committed: BTreeSet<RecordId> = engine.get(index, &key)?.collect();
            let visible = self.overlay.merge(index, &key, committed);
            if visible.iter().any(|existing| *existing != id) {
                return Err(Error::DuplicateKey {
                    index: index.to_string(),
                    key,
                });
            }
        }
        self.overlay.record_put(index, key, id);
        Ok(())
    }

    /// Stage an index removal
    ///
    /// A staged removal of a mapping this transaction previously staged a
    /// put for cancels that put's visible effect.
    ///
    /// # Errors
    /// `InvalidState`, `IndexNotFound`, `TypeMismatch`.
    pub fn staged_remove(
        &mut self,
        engine: &IndexEngine,
        index: &str,
        key: IndexKey,
        id: RecordId,
    ) -> Result<()> {
        self.ensure_open()?;
        let def = engine.definition(index)?;
        def.check_key(&key)?;
        if def.nulls_policy() == NullsPolicy::Skipped && key.has_null() {
            return Ok(());
        }
        self.overlay.record_remove(index, key, id);
        Ok(())
    }

    /// Read an index key through this transaction's overlay
    ///
    /// The result is the committed id set with this transaction's deltas
    /// applied in staging order. Other open transactions' staged state is
    /// never visible here.
    ///
    /// # Errors
    /// `IndexNotFound`, `TypeMismatch`.
    pub fn read_index(
        &self,
        engine: &IndexEngine,
        index: &str,
        key: &IndexKey,
    ) -> Result<RidCursor> {
        let committed: BTreeSet<RecordId> = engine.get(index, key)?.collect();
        let visible = self.overlay.merge(index, key, committed);
        Ok(RidCursor::from_items(visible.into_iter().collect()))
    }

    /// The staged index overlay
    pub fn overlay(&self) -> &TransactionIndexOverlay {
        &self.overlay
    }

    /// Rewrite every staged reference to a temporary id
    ///
    /// Invoked by the controller when the store assigns the persistent id
    /// at first commit. Covers staged write keys, link values inside staged
    /// fields, and overlay deltas.
    pub fn rebind(&mut self, from: RecordId, to: RecordId) {
        if let Some(mut write) = self.writes.remove(&from) {
            match &mut write {
                StagedWrite::Create { fields } | StagedWrite::Update { fields, .. } => {
                    for value in fields.values_mut() {
                        value.rebind(from, to);
                    }
                }
                StagedWrite::Delete { .. } => {}
            }
            self.writes.insert(to, write);
        }
        for staged in self.write_order.iter_mut() {
            if *staged == from {
                *staged = to;
            }
        }
        // link values in records staged under other ids
        for write in self.writes.values_mut() {
            if let StagedWrite::Create { fields } | StagedWrite::Update { fields, .. } = write {
                for value in fields.values_mut() {
                    value.rebind(from, to);
                }
            }
        }
        self.overlay.rebind(from, to);
    }

    // === State transitions ===

    /// Enter the `Committing` state
    ///
    /// # Errors
    /// `InvalidState` unless the transaction is open.
    pub fn begin_commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.status = TransactionStatus::Committing;
        Ok(())
    }

    /// Enter the terminal `Committed` state
    ///
    /// # Errors
    /// `InvalidState` unless the transaction is committing.
    pub fn complete_commit(&mut self) -> Result<()> {
        if self.status != TransactionStatus::Committing {
            return Err(Error::InvalidState(format!(
                "transaction {} is {:?}, not committing",
                self.id, self.status
            )));
        }
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Discard all staged state and enter `RolledBack`
    ///
    /// Safe to call at any point before a commit completes, and a no-op on
    /// an already rolled-back transaction.
    ///
    /// # Errors
    /// `InvalidState` on a committed transaction.
    pub fn mark_rolled_back(&mut self) -> Result<()> {
        match self.status {
            TransactionStatus::Committed => Err(Error::InvalidState(format!(
                "transaction {} already committed",
                self.id
            ))),
            TransactionStatus::RolledBack => Ok(()),
            TransactionStatus::Open | TransactionStatus::Committing => {
                self.status = TransactionStatus::RolledBack;
                self.writes.clear();
                self.write_order.clear();
                self.overlay.clear();
                Ok(())
            }
        }
    }
}
