//! Index key types
//!
//! Index keys are scalars or fixed-arity tuples of scalars (composite keys).
//! [`KeyValue`] is the ordered scalar component; [`IndexKey`] is the tuple.
//! Composite comparison is lexicographic over the tuple in definition order.
//!
//! Ordering rules:
//! - `Null` sorts before every non-null component.
//! - Components of different kinds order by kind, never by coerced value.
//! - Floats use `f64::total_cmp`, so keys have a total order and can back a
//!   `BTreeMap` (ordinary float equality would not).

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Declared component type of an index key position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    /// Boolean component
    Bool,
    /// 64-bit integer component
    Int,
    /// 64-bit float component
    Float,
    /// UTF-8 string component
    String,
    /// Raw bytes component
    Bytes,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyType::Bool => "Bool",
            KeyType::Int => "Int",
            KeyType::Float => "Float",
            KeyType::String => "String",
            KeyType::Bytes => "Bytes",
        };
        write!(f, "{}", name)
    }
}

/// A single ordered scalar component of an index key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum KeyValue {
    /// Null component; sorts first
    Null,
    /// Boolean component
    Bool(bool),
    /// Integer component
    Int(i64),
    /// Float component, totally ordered via `total_cmp`
    Float(f64),
    /// String component
    String(String),
    /// Bytes component
    Bytes(Vec<u8>),
}

impl KeyValue {
    fn rank(&self) -> u8 {
        match self {
            KeyValue::Null => 0,
            KeyValue::Bool(_) => 1,
            KeyValue::Int(_) => 2,
            KeyValue::Float(_) => 3,
            KeyValue::String(_) => 4,
            KeyValue::Bytes(_) => 5,
        }
    }

    /// True if this component is null
    pub fn is_null(&self) -> bool {
        matches!(self, KeyValue::Null)
    }

    /// Check this component against a declared type; null matches any type
    pub fn matches_type(&self, ty: KeyType) -> bool {
        matches!(
            (self, ty),
            (KeyValue::Null, _)
                | (KeyValue::Bool(_), KeyType::Bool)
                | (KeyValue::Int(_), KeyType::Int)
                | (KeyValue::Float(_), KeyType::Float)
                | (KeyValue::String(_), KeyType::String)
                | (KeyValue::Bytes(_), KeyType::Bytes)
        )
    }

    /// Convert a record field value into a key component
    ///
    /// Returns `None` for values that cannot be indexed (links, link bags,
    /// arrays). A missing or `Null` field becomes `KeyValue::Null`.
    pub fn from_value(value: &Value) -> Option<KeyValue> {
        match value {
            Value::Null => Some(KeyValue::Null),
            Value::Bool(b) => Some(KeyValue::Bool(*b)),
            Value::Int(i) => Some(KeyValue::Int(*i)),
            Value::Float(f) => Some(KeyValue::Float(*f)),
            Value::String(s) => Some(KeyValue::String(s.clone())),
            Value::Bytes(b) => Some(KeyValue::Bytes(b.clone())),
            Value::Link(_) | Value::Links(_) | Value::Array(_) => None,
        }
    }
}

impl PartialEq for KeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyValue {}

impl Ord for KeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyValue::Bool(a), KeyValue::Bool(b)) => a.cmp(b),
            (KeyValue::Int(a), KeyValue::Int(b)) => a.cmp(b),
            (KeyValue::Float(a), KeyValue::Float(b)) => a.total_cmp(b),
            (KeyValue::String(a), KeyValue::String(b)) => a.cmp(b),
            (KeyValue::Bytes(a), KeyValue::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Null => write!(f, "null"),
            KeyValue::Bool(b) => write!(f, "{}", b),
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Float(x) => write!(f, "{}", x),
            KeyValue::String(s) => write!(f, "{}", s),
            KeyValue::Bytes(b) => write!(f, "{} bytes", b.len()),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::String(v.to_string())
    }
}

/// Composite index key: an ordered tuple of scalar components
///
/// Arity is fixed at index-creation time. Single-field indexes use a tuple
/// of arity 1. Comparison is lexicographic over the components.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey(Vec<KeyValue>);

impl IndexKey {
    /// Create a composite key from components
    pub fn new(components: Vec<KeyValue>) -> Self {
        Self(components)
    }

    /// Create a single-component key
    pub fn single(component: KeyValue) -> Self {
        Self(vec![component])
    }

    /// Number of components in this key
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// The components in definition order
    pub fn components(&self) -> &[KeyValue] {
        &self.0
    }

    /// True if any component is null
    pub fn has_null(&self) -> bool {
        self.0.iter().any(KeyValue::is_null)
    }

    /// Describe the shape of this key, e.g. `(Int, String)`
    pub fn shape(&self) -> String {
        let parts: Vec<&str> = self
            .0
            .iter()
            .map(|c| match c {
                KeyValue::Null => "Null",
                KeyValue::Bool(_) => "Bool",
                KeyValue::Int(_) => "Int",
                KeyValue::Float(_) => "Float",
                KeyValue::String(_) => "String",
                KeyValue::Bytes(_) => "Bytes",
            })
            .collect();
        format!("({})", parts.join(", "))
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() == 1 {
            return write!(f, "{}", self.0[0]);
        }
        write!(f, "(")?;
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, ")")
    }
}

impl From<KeyValue> for IndexKey {
    fn from(v: KeyValue) -> Self {
        IndexKey::single(v)
    }
}

impl From<i64> for IndexKey {
    fn from(v: i64) -> Self {
        IndexKey::single(KeyValue::Int(v))
    }
}

impl From<&str> for IndexKey {
    fn from(v: &str) -> Self {
        IndexKey::single(KeyValue::String(v.to_string()))
    }
}

/// Helper for tests and callers building two-component keys
impl From<(KeyValue, KeyValue)> for IndexKey {
    fn from((a, b): (KeyValue, KeyValue)) -> Self {
        IndexKey::new(vec![a, b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_first() {
        assert!(KeyValue::Null < KeyValue::Bool(false));
        assert!(KeyValue::Null < KeyValue::Int(i64::MIN));
        assert!(KeyValue::Null < KeyValue::String(String::new()));
    }

    #[test]
    fn test_no_cross_kind_coercion() {
        // Int and Float order by kind, not numeric value
        assert!(KeyValue::Int(100) < KeyValue::Float(1.0));
        assert_ne!(KeyValue::Int(1), KeyValue::Float(1.0));
    }

    #[test]
    fn test_float_total_order() {
        assert_eq!(KeyValue::Float(f64::NAN), KeyValue::Float(f64::NAN));
        assert!(KeyValue::Float(1.0) < KeyValue::Float(2.0));
        assert!(KeyValue::Float(f64::NEG_INFINITY) < KeyValue::Float(0.0));
    }

    #[test]
    fn test_composite_lexicographic() {
        let a = IndexKey::new(vec![KeyValue::Int(1), KeyValue::String("b".into())]);
        let b = IndexKey::new(vec![KeyValue::Int(1), KeyValue::String("c".into())]);
        let c = IndexKey::new(vec![KeyValue::Int(2), KeyValue::String("a".into())]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_has_null() {
        let k = IndexKey::new(vec![KeyValue::Int(1), KeyValue::Null]);
        assert!(k.has_null());
        assert!(!IndexKey::from(1).has_null());
    }

    #[test]
    fn test_from_value_rejects_links() {
        use crate::rid::RecordId;
        assert!(KeyValue::from_value(&Value::Link(RecordId::new(1, 2))).is_none());
        assert_eq!(
            KeyValue::from_value(&Value::Int(7)),
            Some(KeyValue::Int(7))
        );
        assert_eq!(KeyValue::from_value(&Value::Null), Some(KeyValue::Null));
    }

    #[test]
    fn test_matches_type() {
        assert!(KeyValue::Int(1).matches_type(KeyType::Int));
        assert!(!KeyValue::Int(1).matches_type(KeyType::String));
        // null matches any declared type
        assert!(KeyValue::Null.matches_type(KeyType::Bytes));
    }

    #[test]
    fn test_display() {
        assert_eq!(IndexKey::from("bob").to_string(), "bob");
        let k = IndexKey::new(vec![KeyValue::Int(1), KeyValue::String("x".into())]);
        assert_eq!(k.to_string(), "(1, x)");
    }
}
