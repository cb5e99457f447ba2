//! Record identity
//!
//! A [`RecordId`] is the logical address of a record: the id of the container
//! (cluster) holding it plus its sequence position inside that container.
//! Negative positions denote temporary ids handed out for records that have
//! not yet been through their first commit; the storage layer replaces them
//! with persistent ids exactly once, at first successful commit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Logical address of a record: container id plus sequence position
///
/// Equality and ordering are structural (container first, then position),
/// which makes `RecordId` directly usable as a `BTreeMap`/`BTreeSet` key.
/// A persistent id is immutable once assigned.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordId {
    /// Id of the container (cluster) the record lives in
    pub container: u32,
    /// Sequence position inside the container; negative while unassigned
    pub position: i64,
}

impl RecordId {
    /// Create a record id from its parts
    pub fn new(container: u32, position: i64) -> Self {
        Self {
            container,
            position,
        }
    }

    /// True if this id has been assigned by the store
    pub fn is_persistent(&self) -> bool {
        self.position >= 0
    }

    /// True if this id is temporary (pending first commit)
    pub fn is_temporary(&self) -> bool {
        self.position < 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.container, self.position)
    }
}

/// Allocator for temporary record ids
///
/// Hands out record ids with strictly decreasing negative positions. Each
/// allocated id is unique for the lifetime of the allocator, so two open
/// transactions never stage records under the same temporary id.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicI64,
}

impl IdAllocator {
    /// Create an allocator; the first allocated position is -2
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(-2),
        }
    }

    /// Allocate a fresh temporary id in the given container
    pub fn allocate(&self, container: u32) -> RecordId {
        let position = self.next.fetch_sub(1, Ordering::SeqCst);
        RecordId::new(container, position)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistent_and_temporary() {
        assert!(RecordId::new(3, 0).is_persistent());
        assert!(RecordId::new(3, 17).is_persistent());
        assert!(RecordId::new(3, -2).is_temporary());
        assert!(!RecordId::new(3, -2).is_persistent());
    }

    #[test]
    fn test_structural_ordering() {
        let a = RecordId::new(1, 5);
        let b = RecordId::new(1, 6);
        let c = RecordId::new(2, 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a, RecordId::new(1, 5));
    }

    #[test]
    fn test_display() {
        assert_eq!(RecordId::new(12, 0).to_string(), "#12:0");
        assert_eq!(RecordId::new(9, -3).to_string(), "#9:-3");
    }

    #[test]
    fn test_allocator_is_unique_and_negative() {
        let alloc = IdAllocator::new();
        let a = alloc.allocate(1);
        let b = alloc.allocate(1);
        let c = alloc.allocate(2);
        assert!(a.is_temporary());
        assert!(b.is_temporary());
        assert_ne!(a.position, b.position);
        assert_ne!(b.position, c.position);
        assert_eq!(a.container, 1);
        assert_eq!(c.container, 2);
    }
}
