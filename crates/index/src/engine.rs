//! Committed index state
//!
//! One ordered map per index, guarded by a readers-writer lock: point reads,
//! key iteration, and range scans take the read side; entry mutation and the
//! delta batches applied at commit take the write side. The registry itself
//! is a second lock so index DDL does not stall reads on other indexes.

use crate::cursor::{EntryCursor, KeyCursor, RidCursor};
use crate::definition::{IndexDefinition, IndexKind, NullsPolicy};
use parking_lot::RwLock;
use rivet_core::{Error, IndexKey, RecordId, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;

struct IndexState {
    def: IndexDefinition,
    entries: RwLock<BTreeMap<IndexKey, BTreeSet<RecordId>>>,
}

/// Registry and committed state of every declared index
///
/// The engine only holds committed entries. Uncommitted mutations stay in
/// the per-transaction overlay until its delta batch is applied here.
#[derive(Default)]
pub struct IndexEngine {
    indexes: RwLock<HashMap<String, Arc<IndexState>>>,
}

impl IndexEngine {
    /// Create an engine with no indexes
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new index
    ///
    /// # Errors
    /// Returns `IndexExists` when the name is already taken.
    pub fn create_index(&self, def: IndexDefinition) -> Result<()> {
        let mut registry = self.indexes.write();
        if registry.contains_key(def.name()) {
            return Err(Error::IndexExists(def.name().to_string()));
        }
        tracing::debug!(index = def.name(), kind = ?def.kind(), "creating index");
        registry.insert(
            def.name().to_string(),
            Arc::new(IndexState {
                def,
                entries: RwLock::new(BTreeMap::new()),
            }),
        );
        Ok(())
    }

    /// Drop an index and all its entries
    ///
    /// # Errors
    /// Returns `IndexNotFound` when no index has the given name.
    pub fn drop_index(&self, name: &str) -> Result<()> {
        let mut registry = self.indexes.write();
        if registry.remove(name).is_none() {
            return Err(Error::IndexNotFound(name.to_string()));
        }
        tracing::debug!(index = name, "dropped index");
        Ok(())
    }

    /// True if an index with the given name exists
    pub fn contains_index(&self, name: &str) -> bool {
        self.indexes.read().contains_key(name)
    }

    /// Names of all indexes, ascending
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Definition of the named index
    ///
    /// # Errors
    /// Returns `IndexNotFound` when no index has the given name.
    pub fn definition(&self, name: &str) -> Result<IndexDefinition> {
        Ok(self.state(name)?.def.clone())
    }

    /// Definitions of all indexes, ascending by name
    pub fn definitions(&self) -> Vec<IndexDefinition> {
        let registry = self.indexes.read();
        let mut defs: Vec<IndexDefinition> =
            registry.values().map(|state| state.def.clone()).collect();
        defs.sort_by(|a, b| a.name().cmp(b.name()));
        defs
    }

    /// Insert one (key, id) mapping
    ///
    /// Unique indexes reject a key already mapped to a different id with
    /// `DuplicateKey`; re-putting the same (key, id) pair is a no-op for
    /// both kinds. Keys with nulls are silently skipped when the index's
    /// nulls policy says so.
    ///
    /// # Errors
    /// `IndexNotFound`, `TypeMismatch`, `DuplicateKey`.
    pub fn put(&self, name: &str, key: IndexKey, id: RecordId) -> Result<()> {
        let state = self.state(name)?;
        state.def.check_key(&key)?;
        if state.def.nulls_policy() == NullsPolicy::Skipped && key.has_null() {
            return Ok(());
        }
        let mut entries = state.entries.write();
        let ids = entries.entry(key.clone()).or_default();
        if state.def.kind() == IndexKind::Unique && !ids.is_empty() && !ids.contains(&id) {
            // the entry was freshly created iff ids is empty, so nothing to prune
            return Err(Error::DuplicateKey {
                index: name.to_string(),
                key,
            });
        }
        ids.insert(id);
        Ok(())
    }

    /// Remove one (key, id) mapping
    ///
    /// Removing a mapping that is not present is a no-op, never an error;
    /// rollback compensation may issue redundant removals. An entry whose
    /// id-set empties is pruned.
    ///
    /// # Errors
    /// `IndexNotFound`, `TypeMismatch`.
    pub fn remove(&self, name: &str, key: &IndexKey, id: RecordId) -> Result<()> {
        let state = self.state(name)?;
        state.def.check_key(key)?;
        let mut entries = state.entries.write();
        if let Some(ids) = entries.get_mut(key) {
            ids.remove(&id);
            if ids.is_empty() {
                entries.remove(key);
            }
        }
        Ok(())
    }

    /// Committed ids for a key, ascending by id
    ///
    /// For unique indexes the cursor has at most one element.
    ///
    /// # Errors
    /// `IndexNotFound`, `TypeMismatch`.
    pub fn get(&self, name: &str, key: &IndexKey) -> Result<RidCursor> {
        let state = self.state(name)?;
        state.def.check_key(key)?;
        let entries = state.entries.read();
        let ids = entries
            .get(key)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        Ok(RidCursor::from_items(ids))
    }

    /// All distinct keys, ascending
    ///
    /// # Errors
    /// `IndexNotFound`.
    pub fn keys(&self, name: &str) -> Result<KeyCursor> {
        let state = self.state(name)?;
        let entries = state.entries.read();
        Ok(KeyCursor::from_items(entries.keys().cloned().collect()))
    }

    /// Range scan over (key, id) pairs, ascending, tuple-wise for composites
    ///
    /// `None` bounds are open ends. `inclusive` selects whether each given
    /// bound is included.
    ///
    /// # Errors
    /// `IndexNotFound`, `TypeMismatch` on a bound of the wrong shape.
    pub fn range(
        &self,
        name: &str,
        from: Option<&IndexKey>,
        to: Option<&IndexKey>,
        inclusive: (bool, bool),
    ) -> Result<EntryCursor> {
        let state = self.state(name)?;
        if let Some(key) = from {
            state.def.check_key(key)?;
        }
        if let Some(key) = to {
            state.def.check_key(key)?;
        }
        // an inverted or degenerate window is just empty, not a panic
        if let (Some(f), Some(t)) = (from, to) {
            if f > t || (f == t && !(inclusive.0 && inclusive.1)) {
                return Ok(EntryCursor::empty());
            }
        }
        let lower = match (from, inclusive.0) {
            (None, _) => Bound::Unbounded,
            (Some(key), true) => Bound::Included(key.clone()),
            (Some(key), false) => Bound::Excluded(key.clone()),
        };
        let upper = match (to, inclusive.1) {
            (None, _) => Bound::Unbounded,
            (Some(key), true) => Bound::Included(key.clone()),
            (Some(key), false) => Bound::Excluded(key.clone()),
        };

        let entries = state.entries.read();
        let mut items = Vec::new();
        for (key, ids) in entries.range((lower, upper)) {
            for id in ids {
                items.push((key.clone(), *id));
            }
        }
        Ok(EntryCursor::from_items(items))
    }

    /// Number of distinct keys in an index
    ///
    /// # Errors
    /// `IndexNotFound`.
    pub fn key_count(&self, name: &str) -> Result<usize> {
        let state = self.state(name)?;
        let count = state.entries.read().len();
        Ok(count)
    }

    /// Drop every entry of an index, keeping its definition
    ///
    /// Used by rebuilds before replaying the current records.
    ///
    /// # Errors
    /// `IndexNotFound`.
    pub fn clear(&self, name: &str) -> Result<()> {
        let state = self.state(name)?;
        state.entries.write().clear();
        Ok(())
    }

    fn state(&self, name: &str) -> Result<Arc<IndexState>> {
        self.indexes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }
}
