//! Immutable graph nodes held in an index-addressed arena.
//!
//! Every node lives in a [`NodeStore`] and is referred to by a copyable
//! [`NodeId`] handle. Parent links are fixed at construction; child links are
//! a back-index the store maintains as new nodes name their parents.
//!
//! # Node shapes
//!
//! - **Root** nodes have no parents and sit at generation 0.
//! - **Interior** nodes have a non-empty parent set and sit one generation
//!   above their youngest parent: `1 + max(parent.generation)`.
//!
//! A node may only name parents that already exist in the store, so the
//! parent relation can never form a cycle and no runtime cycle check exists.
//!
//! # Sub-modules
//!
//! - [`store`]: the arena itself ([`NodeStore`]).

pub mod store;

use std::fmt;

pub use store::NodeStore;

/// Generation number of a node: 0 for roots, `1 + max(parent generations)` otherwise.
pub type Generation = u64;

/// Handle to a node in a [`NodeStore`].
///
/// Identity is by handle: two nodes with equal creator and payload are still
/// distinct nodes with distinct handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Build a handle from a raw arena index.
    ///
    /// Stores only hand out handles for nodes they created; a forged index is
    /// reported as unknown by every store and graph operation.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Raw arena index of this handle.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Shape of a node: root, or interior with a non-empty parent set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A node with no parents.
    Root,
    /// A node with at least one parent, sorted and de-duplicated.
    Interior {
        /// Distinct parent handles, in ascending handle order.
        parents: Vec<NodeId>,
    },
}

impl NodeKind {
    /// Parent handles (empty for roots).
    #[must_use]
    pub fn parents(&self) -> &[NodeId] {
        match self {
            Self::Root => &[],
            Self::Interior { parents } => parents,
        }
    }

    /// Returns `true` for root nodes.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }
}

/// Content-independent total-order key used to break ties between nodes of
/// the same generation.
///
/// Derived from the node's creation sequence with a keyed BLAKE3 hash, so it
/// is stable for a given store key and unpredictable without it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TieBreakKey([u8; 32]);

impl TieBreakKey {
    pub(crate) fn derive(store_key: &[u8; 32], sequence: usize) -> Self {
        let sequence = u64::try_from(sequence).unwrap_or(u64::MAX);
        Self(*blake3::keyed_hash(store_key, &sequence.to_le_bytes()).as_bytes())
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TieBreakKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A node record owned by the arena.
#[derive(Debug, Clone)]
pub(crate) struct Node<C, T> {
    pub(crate) creator: C,
    pub(crate) data: T,
    pub(crate) kind: NodeKind,
    pub(crate) generation: Generation,
    pub(crate) children: std::collections::BTreeSet<NodeId>,
    pub(crate) tie_break: TieBreakKey,
}
