//! In-memory record store for the Rivet engine
//!
//! This crate provides the default [`RecordStore`](rivet_core::RecordStore)
//! collaborator: a sharded in-memory map of versioned byte payloads with
//! tombstones, plus the codec that turns record fields into those payloads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod memory;

pub use codec::{decode_fields, encode_fields};
pub use memory::MemoryStore;
