//! Concurrency layer for the Rivet engine
//!
//! This crate implements optimistic concurrency control:
//! - Transaction: staged record writes plus the per-transaction index
//!   overlay, with the Open / Committing / Committed / RolledBack state
//!   machine
//! - TransactionIndexOverlay: the delta log that makes uncommitted index
//!   mutations visible only inside the owning transaction
//! - ConcurrencyController: two-phase commit with version validation before
//!   anything is applied
//!
//! A transaction is exclusively owned by one execution context until commit.
//! Conflicts are reported as errors, never by blocking the caller; retry
//! policy belongs to the caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod overlay;
pub mod transaction;

pub use controller::{CommitOutcome, ConcurrencyController};
pub use overlay::{DeltaOp, IndexDelta, TransactionIndexOverlay};
pub use transaction::{StagedWrite, Transaction, TransactionStatus};
