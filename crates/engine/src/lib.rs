//! Engine facade for the Rivet data engine
//!
//! [`Database`] wires the record store, index engine, and concurrency
//! controller together and adds what callers actually work with: record
//! save/load/delete with automatic index maintenance, index DDL with
//! backfill and rebuild, commit observers, and a bounded retry helper for
//! optimistic conflicts.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;

pub use database::{Database, RetryPolicy};
