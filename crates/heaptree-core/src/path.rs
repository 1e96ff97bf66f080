//! Ancestor address paths used for cycle detection.
//!
//! Every tree node carries the addresses from the root down to itself.
//! Paths are persistent: appending shares the parent's segments, so siblings
//! cost one allocation each regardless of depth.

use serde::ser::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::model::Address;

#[derive(Debug)]
struct Segment {
    address: Address,
    parent: Option<Arc<Segment>>,
}

/// Ordered, non-empty sequence of addresses from the root to a node.
#[derive(Clone)]
pub struct ExpandPath {
    tail: Arc<Segment>,
    len: usize,
}

impl ExpandPath {
    /// Creates the single-element path of a root node.
    #[must_use]
    pub fn root(address: Address) -> Self {
        Self {
            tail: Arc::new(Segment {
                address,
                parent: None,
            }),
            len: 1,
        }
    }

    /// Returns a new path with `address` appended; `self` is unchanged.
    #[must_use]
    pub fn child(&self, address: Address) -> Self {
        Self {
            tail: Arc::new(Segment {
                address,
                parent: Some(Arc::clone(&self.tail)),
            }),
            len: self.len + 1,
        }
    }

    /// Returns true if `address` occurs anywhere on this path.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool {
        self.iter_from_leaf().any(|a| a == address)
    }

    /// Number of addresses on the path (depth + 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false: a path holds at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Address of the node that owns this path.
    #[must_use]
    pub fn last(&self) -> Address {
        self.tail.address
    }

    /// Address of the tree root.
    #[must_use]
    pub fn first(&self) -> Address {
        self.iter_from_leaf().last().unwrap_or(self.tail.address)
    }

    /// Iterates addresses from this node up to the root.
    pub fn iter_from_leaf(&self) -> impl Iterator<Item = Address> + '_ {
        let mut next = Some(&self.tail);
        std::iter::from_fn(move || {
            let segment = next?;
            next = segment.parent.as_ref();
            Some(segment.address)
        })
    }

    /// Collects the path root-first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self.iter_from_leaf().collect();
        out.reverse();
        out
    }
}

impl PartialEq for ExpandPath {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter_from_leaf().eq(other.iter_from_leaf())
    }
}

impl Eq for ExpandPath {}

impl fmt::Debug for ExpandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

impl Serialize for ExpandPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.to_vec())
    }
}
