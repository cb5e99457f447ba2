//! Index engine for the Rivet data engine
//!
//! Maintains the committed state of every declared index: unique or
//! non-unique mappings from scalar or composite keys to record ids, backed
//! by ordered maps so key iteration and range scans come out in key order.
//!
//! Transaction-local visibility of uncommitted index mutations lives one
//! layer up, in `rivet-concurrency`; this crate only ever sees committed
//! state plus the atomic delta batches applied at commit.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cursor;
pub mod definition;
pub mod engine;

pub use cursor::{Cursor, EntryCursor, KeyCursor, RidCursor};
pub use definition::{IndexDefinition, IndexKind, NullsPolicy};
pub use engine::IndexEngine;
