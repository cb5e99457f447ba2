//! Error types for the Rivet engine
//!
//! A single error enum covers every failure mode of the core. We use
//! `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Two groups matter for callers:
//! - Validation errors (`DuplicateKey`, `TypeMismatch`) are statement-local.
//!   The offending operation is rejected and the transaction remains open.
//! - Concurrency errors (`Conflict`, `StaleRecordId` at commit) discard the
//!   whole transaction's staged state. Callers restart from `begin()`.

use crate::key::IndexKey;
use crate::rid::RecordId;
use thiserror::Error;

/// Result type alias for Rivet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Rivet engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Unique index violation
    #[error("duplicate key {key} in index '{index}'")]
    DuplicateKey {
        /// Name of the violated index
        index: String,
        /// The colliding key
        key: IndexKey,
    },

    /// Optimistic version check failed; the caller must reload and retry
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    Conflict {
        /// Record whose version check failed
        id: RecordId,
        /// Version the transaction observed at read time
        expected: u64,
        /// Version currently in the store
        actual: u64,
    },

    /// No index registered under the given name
    #[error("index not found: '{0}'")]
    IndexNotFound(String),

    /// An index with the given name already exists
    #[error("index already exists: '{0}'")]
    IndexExists(String),

    /// Key shape does not match the index key definition
    #[error("type mismatch for index '{index}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// Name of the index the key was offered to
        index: String,
        /// Expected key shape
        expected: String,
        /// What the caller supplied
        actual: String,
    },

    /// Operation on a record id that was deleted, or never persisted
    #[error("stale record id: {0}")]
    StaleRecordId(RecordId),

    /// Operation not permitted in the current transaction state
    #[error("invalid transaction state: {0}")]
    InvalidState(String),

    /// Record payload encode/decode failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Container or threshold configuration rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
