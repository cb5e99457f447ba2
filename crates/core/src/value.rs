//! Field values for document records
//!
//! [`Value`] is the unified enum for everything a record field can hold,
//! including single links to other records and link collections backed by
//! [`LinkBag`](crate::linkbag::LinkBag).
//!
//! Float equality follows IEEE-754 semantics: `NaN != NaN`, `-0.0 == 0.0`.
//! Different variants are never equal, even when they look alike
//! (`Int(1) != Float(1.0)`, `Bytes(b"x") != String("x")`).

use crate::linkbag::LinkBag;
use crate::rid::RecordId;
use serde::{Deserialize, Serialize};

/// A single field value in a document record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (IEEE-754)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Link to another record
    Link(RecordId),
    /// Collection of links with adaptive representation
    Links(LinkBag),
    /// Array of values
    Array(Vec<Value>),
}

impl Value {
    /// Get the variant name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Link(_) => "Link",
            Value::Links(_) => "Links",
            Value::Array(_) => "Array",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Replace every occurrence of `from` with `to` in link-bearing variants
    ///
    /// Used when a temporary record id is bound to its persistent id at
    /// first commit. Recurses through arrays and link bags.
    pub fn rebind(&mut self, from: RecordId, to: RecordId) {
        match self {
            Value::Link(id) if *id == from => *id = to,
            Value::Links(bag) => {
                bag.rebind(from, to);
            }
            Value::Array(values) => {
                for v in values {
                    v.rebind(from, to);
                }
            }
            _ => {}
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<RecordId> for Value {
    fn from(v: RecordId) -> Self {
        Value::Link(v)
    }
}
