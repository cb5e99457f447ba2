//! Rivet - document/graph data engine core
//!
//! Rivet keeps secondary indexes, record versions, and adjacency
//! collections coherent with uncommitted and committed document mutations:
//!
//! - optimistic record versioning with compare-and-swap at commit
//! - per-transaction index overlays (read your own index writes, nothing
//!   from other open transactions)
//! - unique and non-unique ordered indexes with immediate duplicate
//!   detection
//! - size-adaptive adjacency containers for graph links
//!
//! # Quick Start
//!
//! ```
//! use rivet::{Database, IndexDefinition, IndexKey, KeyType};
//!
//! let db = Database::new();
//! db.create_index(IndexDefinition::not_unique("byValue", "value", KeyType::Int))?;
//!
//! let mut tx = db.begin();
//! let mut record = db.new_record(1);
//! record.set("value", 42i64);
//! db.save(&mut tx, &record)?;
//!
//! // visible inside the transaction before commit
//! assert_eq!(db.read(&tx, "byValue", &IndexKey::from(42))?.count(), 1);
//! // not visible outside yet
//! assert_eq!(db.get("byValue", &IndexKey::from(42))?.count(), 0);
//!
//! db.commit(&mut tx)?;
//! assert_eq!(db.get("byValue", &IndexKey::from(42))?.count(), 1);
//! # Ok::<(), rivet::Error>(())
//! ```

// Re-export the public API from the member crates
pub use rivet_concurrency::{
    CommitOutcome, ConcurrencyController, DeltaOp, IndexDelta, StagedWrite, Transaction,
    TransactionIndexOverlay, TransactionStatus,
};
pub use rivet_core::{
    CommitObserver, Error, IdAllocator, IndexKey, KeyType, KeyValue, LinkBag, LinkBagConfig,
    RecordId, RecordMetadata, RecordStore, Representation, Result, StoredRecord, Value,
    VersionedRecord,
};
pub use rivet_engine::{Database, RetryPolicy};
pub use rivet_index::{
    Cursor, EntryCursor, IndexDefinition, IndexEngine, IndexKind, KeyCursor, NullsPolicy,
    RidCursor,
};
pub use rivet_storage::{decode_fields, encode_fields, MemoryStore};
