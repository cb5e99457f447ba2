//! Per-transaction index delta log
//!
//! Every index mutation issued inside an open transaction lands here as an
//! ordered delta instead of touching the committed engine. Reads inside the
//! transaction merge the committed state with this log; commit applies the
//! log as one batch; rollback drops it.
//!
//! The log is a staging index, not a diff: replaying it in order against
//! the committed state is exactly equivalent to having applied each
//! operation eagerly. A put followed by a remove of the same (key, id) pair
//! nets out to nothing without the log itself being compacted.

use rivet_core::{IndexKey, RecordId};
use std::collections::{BTreeMap, BTreeSet};

/// Kind of a staged index mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOp {
    /// Stage an insertion
    Put,
    /// Stage a removal
    Remove,
}

/// One staged index mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDelta {
    /// Kind of mutation
    pub op: DeltaOp,
    /// Key the mutation applies to
    pub key: IndexKey,
    /// Record id being inserted or removed
    pub id: RecordId,
}

/// Ordered log of staged index mutations, one log per index
#[derive(Debug, Default)]
pub struct TransactionIndexOverlay {
    deltas: BTreeMap<String, Vec<IndexDelta>>,
}

impl TransactionIndexOverlay {
    /// Create an empty overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no mutation has been staged
    pub fn is_empty(&self) -> bool {
        self.deltas.values().all(Vec::is_empty)
    }

    /// Append a staged insertion
    pub fn record_put(&mut self, index: &str, key: IndexKey, id: RecordId) {
        self.deltas.entry(index.to_string()).or_default().push(IndexDelta {
            op: DeltaOp::Put,
            key,
            id,
        });
    }

    /// Append a staged removal
    pub fn record_remove(&mut self, index: &str, key: IndexKey, id: RecordId) {
        self.deltas.entry(index.to_string()).or_default().push(IndexDelta {
            op: DeltaOp::Remove,
            key,
            id,
        });
    }

    /// Names of indexes with staged mutations, ascending
    pub fn index_names(&self) -> Vec<String> {
        self.deltas
            .iter()
            .filter(|(_, log)| !log.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The staged log for one index, in staging order
    pub fn deltas(&self, index: &str) -> &[IndexDelta] {
        self.deltas.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keys touched by staged mutations of one index
    pub fn touched_keys(&self, index: &str) -> BTreeSet<IndexKey> {
        self.deltas(index).iter().map(|d| d.key.clone()).collect()
    }

    /// Merge this transaction's deltas for one key into a committed id set
    ///
    /// Deltas apply in staging order, which is what makes a staged
    /// put/remove pair cancel without log compaction.
    pub fn merge(&self, index: &str, key: &IndexKey, committed: BTreeSet<RecordId>) -> BTreeSet<RecordId> {
        let mut ids = committed;
        for delta in self.deltas(index) {
            if delta.key != *key {
                continue;
            }
            match delta.op {
                DeltaOp::Put => {
                    ids.insert(delta.id);
                }
                DeltaOp::Remove => {
                    ids.remove(&delta.id);
                }
            }
        }
        ids
    }

    /// Rewrite every staged delta that references a temporary id
    pub fn rebind(&mut self, from: RecordId, to: RecordId) {
        for log in self.deltas.values_mut() {
            for delta in log.iter_mut() {
                if delta.id == from {
                    delta.id = to;
                }
            }
        }
    }

    /// Drop every staged mutation
    pub fn clear(&mut self) {
        self.deltas.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(position: i64) -> RecordId {
        RecordId::new(1, position)
    }

    fn key(v: i64) -> IndexKey {
        IndexKey::from(v)
    }

    #[test]
    fn test_merge_applies_deltas_in_order() {
        let mut overlay = TransactionIndexOverlay::new();
        overlay.record_put("idx", key(1), rid(10));
        overlay.record_remove("idx", key(1), rid(5));
        overlay.record_put("idx", key(1), rid(11));

        let committed: BTreeSet<RecordId> = [rid(5)].into_iter().collect();
        let merged = overlay.merge("idx", &key(1), committed);
        let expected: BTreeSet<RecordId> = [rid(10), rid(11)].into_iter().collect();
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_put_then_remove_cancels() {
        let mut overlay = TransactionIndexOverlay::new();
        overlay.record_put("idx", key(1), rid(10));
        overlay.record_remove("idx", key(1), rid(10));

        let merged = overlay.merge("idx", &key(1), BTreeSet::new());
        assert!(merged.is_empty());
        // the log itself is not compacted
        assert_eq!(overlay.deltas("idx").len(), 2);
    }

    #[test]
    fn test_remove_then_put_reinstates() {
        let mut overlay = TransactionIndexOverlay::new();
        overlay.record_remove("idx", key(1), rid(10));
        overlay.record_put("idx", key(1), rid(10));

        let committed: BTreeSet<RecordId> = [rid(10)].into_iter().collect();
        let merged = overlay.merge("idx", &key(1), committed);
        assert!(merged.contains(&rid(10)));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut overlay = TransactionIndexOverlay::new();
        overlay.record_put("idx", key(1), rid(10));

        let merged = overlay.merge("idx", &key(2), BTreeSet::new());
        assert!(merged.is_empty());
    }

    #[test]
    fn test_indexes_are_independent() {
        let mut overlay = TransactionIndexOverlay::new();
        overlay.record_put("a", key(1), rid(10));

        assert!(overlay.merge("b", &key(1), BTreeSet::new()).is_empty());
        assert_eq!(overlay.index_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_rebind_rewrites_staged_ids() {
        let temp = rid(-2);
        let bound = rid(7);
        let mut overlay = TransactionIndexOverlay::new();
        overlay.record_put("idx", key(1), temp);
        overlay.record_remove("idx", key(2), temp);
        overlay.record_put("idx", key(1), rid(3));

        overlay.rebind(temp, bound);
        let log = overlay.deltas("idx");
        assert_eq!(log[0].id, bound);
        assert_eq!(log[1].id, bound);
        assert_eq!(log[2].id, rid(3));
    }

    #[test]
    fn test_clear_empties_overlay() {
        let mut overlay = TransactionIndexOverlay::new();
        overlay.record_put("idx", key(1), rid(10));
        overlay.clear();
        assert!(overlay.is_empty());
        assert!(overlay.deltas("idx").is_empty());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn overlay_from(ops: &[(bool, i64, i64)]) -> TransactionIndexOverlay {
            let mut overlay = TransactionIndexOverlay::new();
            for (is_put, k, pos) in ops {
                if *is_put {
                    overlay.record_put("idx", key(*k), rid(*pos));
                } else {
                    overlay.record_remove("idx", key(*k), rid(*pos));
                }
            }
            overlay
        }

        proptest! {
            // the log replays in order: appending put(k, pos) followed by
            // remove(k, pos) lands on exactly the previous result minus pos,
            // and never touches any other key
            #[test]
            fn appended_pair_replays_in_order(
                ops in proptest::collection::vec((any::<bool>(), 0i64..4, 0i64..6), 0..30),
                k in 0i64..4,
                pos in 0i64..6,
                committed in proptest::collection::btree_set(0i64..6, 0..4),
            ) {
                let base: BTreeSet<RecordId> = committed.into_iter().map(rid).collect();

                let plain = overlay_from(&ops);
                let mut paired = overlay_from(&ops);
                paired.record_put("idx", key(k), rid(pos));
                paired.record_remove("idx", key(k), rid(pos));

                let mut expected = plain.merge("idx", &key(k), base.clone());
                expected.remove(&rid(pos));
                prop_assert_eq!(paired.merge("idx", &key(k), base.clone()), expected);

                for probe in 0..4 {
                    if probe == k {
                        continue;
                    }
                    prop_assert_eq!(
                        plain.merge("idx", &key(probe), base.clone()),
                        paired.merge("idx", &key(probe), base.clone())
                    );
                }
            }
        }
    }
}
