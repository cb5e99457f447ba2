//! Core types for the Rivet data engine
//!
//! This crate defines the foundational types used throughout the system:
//! - RecordId: logical record address (container + position)
//! - Value: field value enum for document records
//! - VersionedRecord: record payload plus optimistic version counter
//! - KeyValue / IndexKey: ordered scalar and composite index keys
//! - LinkBag: size-adaptive adjacency container for graph links
//! - Error: error type hierarchy
//! - Traits: collaborator seams (RecordStore, CommitObserver)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;
pub mod linkbag;
pub mod record;
pub mod rid;
pub mod traits;
pub mod value;

pub use error::{Error, Result};
pub use key::{IndexKey, KeyType, KeyValue};
pub use linkbag::{LinkBag, LinkBagConfig, Representation};
pub use record::VersionedRecord;
pub use rid::{IdAllocator, RecordId};
pub use traits::{CommitObserver, RecordMetadata, RecordStore, StoredRecord};
pub use value::Value;
