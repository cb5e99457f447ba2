//! Versioned document records
//!
//! A [`VersionedRecord`] is a record's mutable field payload plus the
//! monotonic version counter used for optimistic concurrency. The version a
//! record carries is the version observed when it was loaded; commit fails
//! when the stored version has advanced past it in the meantime.

use crate::rid::RecordId;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record's payload and optimistic version counter
///
/// Versions start at 0 for a new record and increment by exactly 1 on each
/// successful commit that mutates the record. Fields are kept in a
/// `BTreeMap` so the serialized payload is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    id: RecordId,
    version: u64,
    fields: BTreeMap<String, Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VersionedRecord {
    /// Create a new, never-committed record under the given (temporary) id
    pub fn new(id: RecordId) -> Self {
        let now = Utc::now();
        Self {
            id,
            version: 0,
            fields: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a record from stored state, as of load time
    pub fn from_parts(
        id: RecordId,
        version: u64,
        fields: BTreeMap<String, Value>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            version,
            fields,
            created_at,
            updated_at,
        }
    }

    /// The record's id
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// The version observed when this record was loaded or created
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Creation timestamp
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Timestamp of the last committed mutation
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Read a field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a field, returning the previous value if any
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Remove a field, returning its value if it was present
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// All fields in name order
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Consume the record, yielding its fields
    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }

    /// Advance the version after a successful commit
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Replace a temporary id with the persistent id assigned at commit
    ///
    /// A persistent id is immutable; only records still carrying a
    /// temporary id may be rebound.
    pub fn rebind(&mut self, bound: RecordId) {
        debug_assert!(self.id.is_temporary(), "rebind of a persistent id");
        let old = self.id;
        self.id = bound;
        for value in self.fields.values_mut() {
            value.rebind(old, bound);
        }
    }

    /// Replace occurrences of another record's temporary id in link fields
    pub fn rebind_links(&mut self, from: RecordId, to: RecordId) {
        for value in self.fields.values_mut() {
            value.rebind(from, to);
        }
    }
}
