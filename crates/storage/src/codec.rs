//! Record payload codec
//!
//! The store holds opaque bytes per record. This module is the boundary
//! where field maps become those bytes. Fields live in a `BTreeMap`, so the
//! encoded form is deterministic for a given payload.

use rivet_core::{Result, Value};
use std::collections::BTreeMap;

/// Encode a record's fields into the stored payload
pub fn encode_fields(fields: &BTreeMap<String, Value>) -> Result<Vec<u8>> {
    Ok(bincode::serialize(fields)?)
}

/// Decode a stored payload back into record fields
pub fn decode_fields(payload: &[u8]) -> Result<BTreeMap<String, Value>> {
    Ok(bincode::deserialize(payload)?)
}
