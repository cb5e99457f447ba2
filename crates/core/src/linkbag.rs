//! Size-adaptive adjacency container
//!
//! A [`LinkBag`] holds the set of record ids a record links to (graph edges,
//! multi-valued links). Two interchangeable representations back it:
//!
//! - **Embedded**: ids stored inline in a small vector. Cheapest for the
//!   common case of a handful of links.
//! - **Tree**: ids stored in an ordered set. Scales to large fan-out.
//!
//! After an `add`, a bag whose size exceeds `promote_threshold` converts to
//! the tree representation. Conversion happens entirely inside the mutating
//! call; the owning record's exclusive borrow means no observer can see a
//! half-converted bag. Demotion back to embedded only happens through
//! [`LinkBag::reconfigure`], never implicitly, so in-flight iterators are
//! never invalidated by a shrinking bag.
//!
//! Thresholds are per-instance configuration. `promote_threshold: None`
//! gives the embedded-only mode used by tests that pin one representation.

use crate::error::{Error, Result};
use crate::rid::RecordId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Inline capacity of the embedded representation
const EMBEDDED_INLINE: usize = 8;

/// Threshold configuration for a [`LinkBag`]
///
/// `demote_threshold` must stay strictly below `promote_threshold`
/// (hysteresis), otherwise a bag sitting at the boundary would oscillate
/// between representations on every reconfigure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkBagConfig {
    /// Size above which an embedded bag converts to tree; `None` disables
    /// promotion entirely (embedded-only mode)
    pub promote_threshold: Option<usize>,
    /// Size at or below which `reconfigure` converts a tree bag back
    pub demote_threshold: usize,
}

impl LinkBagConfig {
    /// Build a validated configuration
    ///
    /// # Errors
    /// Returns `InvalidConfig` when `demote_threshold >= promote_threshold`.
    pub fn new(promote_threshold: Option<usize>, demote_threshold: usize) -> Result<Self> {
        if let Some(promote) = promote_threshold {
            if demote_threshold >= promote {
                return Err(Error::InvalidConfig(format!(
                    "demote threshold {} must be below promote threshold {}",
                    demote_threshold, promote
                )));
            }
        }
        Ok(Self {
            promote_threshold,
            demote_threshold,
        })
    }

    /// Configuration that never leaves the embedded representation
    pub fn embedded_only() -> Self {
        Self {
            promote_threshold: None,
            demote_threshold: 0,
        }
    }
}

impl Default for LinkBagConfig {
    fn default() -> Self {
        Self {
            promote_threshold: Some(40),
            demote_threshold: 20,
        }
    }
}

/// Which representation currently backs a bag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    /// Inline small-vector storage
    Embedded,
    /// Ordered-set storage
    Tree,
}

#[derive(Debug, Clone)]
enum Members {
    Embedded(SmallVec<[RecordId; EMBEDDED_INLINE]>),
    Tree(BTreeSet<RecordId>),
}

/// Collection of record ids with embedded/tree dual representation
///
/// Set semantics: adding an id already present is a no-op. A record owns its
/// bags exclusively; bags are never shared between records.
#[derive(Debug, Clone)]
pub struct LinkBag {
    members: Members,
    config: LinkBagConfig,
}

impl LinkBag {
    /// Create an empty bag with the given threshold configuration
    pub fn new(config: LinkBagConfig) -> Self {
        Self {
            members: Members::Embedded(SmallVec::new()),
            config,
        }
    }

    /// Create an empty bag with default thresholds
    pub fn with_defaults() -> Self {
        Self::new(LinkBagConfig::default())
    }

    /// Current representation
    pub fn representation(&self) -> Representation {
        match self.members {
            Members::Embedded(_) => Representation::Embedded,
            Members::Tree(_) => Representation::Tree,
        }
    }

    /// Current threshold configuration
    pub fn config(&self) -> LinkBagConfig {
        self.config
    }

    /// Number of ids in the bag
    pub fn len(&self) -> usize {
        match &self.members {
            Members::Embedded(v) => v.len(),
            Members::Tree(s) => s.len(),
        }
    }

    /// True if the bag holds no ids
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the bag contains `id`
    pub fn contains(&self, id: RecordId) -> bool {
        match &self.members {
            Members::Embedded(v) => v.contains(&id),
            Members::Tree(s) => s.contains(&id),
        }
    }

    /// Add an id; returns true if it was not already present
    ///
    /// May promote the bag to the tree representation when the size climbs
    /// past the promote threshold. The conversion completes before this call
    /// returns.
    pub fn add(&mut self, id: RecordId) -> bool {
        let added = match &mut self.members {
            Members::Embedded(v) => {
                if v.contains(&id) {
                    false
                } else {
                    v.push(id);
                    true
                }
            }
            Members::Tree(s) => s.insert(id),
        };
        if added {
            self.maybe_promote();
        }
        added
    }

    /// Remove an id; returns true if it was present
    ///
    /// Never demotes. Shrinking below the demote threshold changes the
    /// representation only on the next explicit `reconfigure`.
    pub fn remove(&mut self, id: RecordId) -> bool {
        match &mut self.members {
            Members::Embedded(v) => {
                if let Some(pos) = v.iter().position(|m| *m == id) {
                    v.remove(pos);
                    true
                } else {
                    false
                }
            }
            Members::Tree(s) => s.remove(&id),
        }
    }

    /// Iterate the ids as of now
    ///
    /// The iterator is a snapshot taken at creation time: it is finite,
    /// restartable, and unaffected by later mutation or representation
    /// changes of the bag.
    pub fn iter(&self) -> LinkBagIter {
        let items: Vec<RecordId> = match &self.members {
            Members::Embedded(v) => v.to_vec(),
            Members::Tree(s) => s.iter().copied().collect(),
        };
        LinkBagIter { items, pos: 0 }
    }

    /// Apply a new configuration, converting the representation if needed
    ///
    /// This is the only demotion path: a tree bag at or below the new demote
    /// threshold converts back to embedded. An embedded bag above the new
    /// promote threshold converts to tree.
    pub fn reconfigure(&mut self, config: LinkBagConfig) {
        self.config = config;
        match self.representation() {
            Representation::Tree => {
                if self.len() <= self.config.demote_threshold {
                    self.demote();
                }
            }
            Representation::Embedded => {
                self.maybe_promote();
            }
        }
    }

    /// Replace a temporary member id with its bound persistent id
    pub fn rebind(&mut self, from: RecordId, to: RecordId) {
        if self.remove(from) {
            self.add(to);
        }
    }

    fn maybe_promote(&mut self) {
        let Some(promote) = self.config.promote_threshold else {
            return;
        };
        if self.len() <= promote {
            return;
        }
        if let Members::Embedded(v) = &self.members {
            tracing::debug!(size = v.len(), threshold = promote, "promoting link bag to tree");
            let tree: BTreeSet<RecordId> = v.iter().copied().collect();
            self.members = Members::Tree(tree);
        }
    }

    fn demote(&mut self) {
        if let Members::Tree(s) = &self.members {
            tracing::debug!(size = s.len(), "demoting link bag to embedded");
            let inline: SmallVec<[RecordId; EMBEDDED_INLINE]> = s.iter().copied().collect();
            self.members = Members::Embedded(inline);
        }
    }
}

impl Default for LinkBag {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// Equality is over the member set; representation and thresholds are
// storage details.
impl PartialEq for LinkBag {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.iter().all(|id| other.contains(id))
    }
}

impl Eq for LinkBag {}

impl<'a> IntoIterator for &'a LinkBag {
    type Item = RecordId;
    type IntoIter = LinkBagIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Snapshot iterator over a [`LinkBag`]
///
/// Yields the ids the bag held when the iterator was created. `restart`
/// rewinds to the beginning of the same snapshot.
#[derive(Debug, Clone)]
pub struct LinkBagIter {
    items: Vec<RecordId>,
    pos: usize,
}

impl LinkBagIter {
    /// Rewind to the start of the snapshot
    pub fn restart(&mut self) {
        self.pos = 0;
    }

    /// Total number of ids in the snapshot
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Iterator for LinkBagIter {
    type Item = RecordId;

    fn next(&mut self) -> Option<RecordId> {
        let item = self.items.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }
}

// Serialized form carries the representation tag explicitly so a tree bag
// in the hysteresis band does not come back embedded.
#[derive(Serialize, Deserialize)]
struct LinkBagWire {
    config: LinkBagConfig,
    tree: bool,
    members: Vec<RecordId>,
}

impl Serialize for LinkBag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = LinkBagWire {
            config: self.config,
            tree: self.representation() == Representation::Tree,
            members: self.iter().collect(),
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LinkBag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = LinkBagWire::deserialize(deserializer)?;
        let members = if wire.tree {
            Members::Tree(wire.members.into_iter().collect())
        } else {
            Members::Embedded(wire.members.into_iter().collect())
        };
        Ok(LinkBag {
            members,
            config: wire.config,
        })
    }
}
