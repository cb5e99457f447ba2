//! Index definitions
//!
//! The schema layer declares an index before the engine accepts entries for
//! it: a name, the record fields it covers, the key type of each position,
//! the kind (unique or not), and what to do with keys containing nulls.
//!
//! Kind-specific behavior (duplicate policy) is driven by the [`IndexKind`]
//! variant, not by separate index types.

use rivet_core::{Error, IndexKey, KeyType, KeyValue, Result, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Duplicate policy of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// At most one record id per key
    Unique,
    /// A set of record ids per key
    NotUnique,
}

/// What to do with keys that contain null components
///
/// The default is `Skipped`: two records with a null in the key never
/// collide on a unique index. Storing null keys, uniqueness included, is
/// the explicit opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullsPolicy {
    /// Null-bearing keys are never stored and never collide
    Skipped,
    /// Null-bearing keys are stored and participate in uniqueness
    Indexed,
}

/// Declared shape and behavior of one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    name: String,
    fields: Vec<String>,
    key_types: Vec<KeyType>,
    kind: IndexKind,
    nulls_policy: NullsPolicy,
}

impl IndexDefinition {
    /// Create a definition over one or more fields
    ///
    /// `fields` and `key_types` are positional and must have equal length;
    /// that length fixes the key arity for the life of the index.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for an empty field list or mismatched arity.
    pub fn new(
        name: impl Into<String>,
        kind: IndexKind,
        fields: Vec<String>,
        key_types: Vec<KeyType>,
    ) -> Result<Self> {
        let name = name.into();
        if fields.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "index '{}' must cover at least one field",
                name
            )));
        }
        if fields.len() != key_types.len() {
            return Err(Error::InvalidConfig(format!(
                "index '{}' declares {} fields but {} key types",
                name,
                fields.len(),
                key_types.len()
            )));
        }
        Ok(Self {
            name,
            fields,
            key_types,
            kind,
            nulls_policy: NullsPolicy::Skipped,
        })
    }

    /// Single-field unique index
    pub fn unique(name: impl Into<String>, field: impl Into<String>, ty: KeyType) -> Self {
        Self {
            name: name.into(),
            fields: vec![field.into()],
            key_types: vec![ty],
            kind: IndexKind::Unique,
            nulls_policy: NullsPolicy::Skipped,
        }
    }

    /// Single-field non-unique index
    pub fn not_unique(name: impl Into<String>, field: impl Into<String>, ty: KeyType) -> Self {
        Self {
            name: name.into(),
            fields: vec![field.into()],
            key_types: vec![ty],
            kind: IndexKind::NotUnique,
            nulls_policy: NullsPolicy::Skipped,
        }
    }

    /// Override the nulls policy
    pub fn with_nulls_policy(mut self, policy: NullsPolicy) -> Self {
        self.nulls_policy = policy;
        self
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Covered record fields, in key order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Key component types, positional with `fields`
    pub fn key_types(&self) -> &[KeyType] {
        &self.key_types
    }

    /// Duplicate policy
    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    /// Null-key handling
    pub fn nulls_policy(&self) -> NullsPolicy {
        self.nulls_policy
    }

    /// True for unique indexes
    pub fn is_unique(&self) -> bool {
        self.kind == IndexKind::Unique
    }

    /// Declared key shape, e.g. `(Int, String)`
    pub fn shape(&self) -> String {
        let parts: Vec<String> = self.key_types.iter().map(|t| t.to_string()).collect();
        format!("({})", parts.join(", "))
    }

    /// Validate a caller-supplied key against this definition
    ///
    /// # Errors
    /// Returns `TypeMismatch` when arity or any component type differs.
    /// Null components match any declared type.
    pub fn check_key(&self, key: &IndexKey) -> Result<()> {
        if key.arity() != self.key_types.len() {
            return Err(self.type_mismatch(key));
        }
        for (component, ty) in key.components().iter().zip(self.key_types.iter()) {
            if !component.matches_type(*ty) {
                return Err(self.type_mismatch(key));
            }
        }
        Ok(())
    }

    /// Build this index's key from a record's fields
    ///
    /// A missing field becomes a null component. Returns `Ok(None)` when the
    /// key contains a null and the nulls policy is `Skipped`; such records
    /// simply have no entry in this index.
    ///
    /// # Errors
    /// Returns `TypeMismatch` when a covered field holds a value that cannot
    /// be a key component (a link, a bag, an array) or has the wrong type.
    pub fn extract_key(&self, fields: &BTreeMap<String, Value>) -> Result<Option<IndexKey>> {
        let mut components = Vec::with_capacity(self.fields.len());
        for (field, ty) in self.fields.iter().zip(self.key_types.iter()) {
            let component = match fields.get(field) {
                None => KeyValue::Null,
                Some(value) => KeyValue::from_value(value).ok_or_else(|| Error::TypeMismatch {
                    index: self.name.clone(),
                    expected: ty.to_string(),
                    actual: value.type_name().to_string(),
                })?,
            };
            if !component.matches_type(*ty) {
                return Err(Error::TypeMismatch {
                    index: self.name.clone(),
                    expected: ty.to_string(),
                    actual: format!("{}", component),
                });
            }
            components.push(component);
        }
        let key = IndexKey::new(components);
        if self.nulls_policy == NullsPolicy::Skipped && key.has_null() {
            return Ok(None);
        }
        Ok(Some(key))
    }

    fn type_mismatch(&self, key: &IndexKey) -> Error {
        Error::TypeMismatch {
            index: self.name.clone(),
            expected: self.shape(),
            actual: key.shape(),
        }
    }
}
