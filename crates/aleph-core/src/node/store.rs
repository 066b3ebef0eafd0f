//! Append-only node arena.
//!
//! [`NodeStore`] owns every node and hands out [`NodeId`] handles. Creation
//! goes through `&self` so graph containers can keep borrowing the store while
//! participants keep producing nodes. The store is deliberately `!Sync`: one
//! store, and the containers over it, belong to a single consensus task.

use std::cell::RefCell;
use std::collections::BTreeSet;

use tracing::trace;

use super::{Generation, Node, NodeId, NodeKind, TieBreakKey};
use crate::error::NodeError;

/// Index-addressed arena of immutable nodes.
///
/// `C` is the opaque creator identity, `T` the opaque payload.
#[derive(Debug)]
pub struct NodeStore<C, T> {
    nodes: RefCell<Vec<Node<C, T>>>,
    tie_break_key: [u8; 32],
}

impl<C, T> NodeStore<C, T> {
    /// Create an empty store with the all-zero tie-break key.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_tie_break_key([0; 32])
    }

    /// Create an empty store whose same-generation tie-break order is keyed
    /// by `key`.
    ///
    /// Participants that must agree on a linear order must share the key; an
    /// adversary that does not know it cannot predict the order.
    #[must_use]
    pub const fn with_tie_break_key(key: [u8; 32]) -> Self {
        Self {
            nodes: RefCell::new(Vec::new()),
            tie_break_key: key,
        }
    }

    /// Create a root node. Never fails.
    pub fn create_root(&self, creator: C, data: T) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId::from_index(nodes.len());
        nodes.push(Node {
            creator,
            data,
            kind: NodeKind::Root,
            generation: 0,
            children: BTreeSet::new(),
            tie_break: TieBreakKey::derive(&self.tie_break_key, id.index()),
        });
        trace!(node = %id, "created root node");
        id
    }

    /// Create an interior node whose parents are `parents`.
    ///
    /// Entries may be plain handles or `Option<NodeId>`; `None` entries are
    /// skipped and repeated handles collapse into one parent. Every parent
    /// gains the new node as a child.
    ///
    /// # Errors
    ///
    /// - [`NodeError::InvalidConstruction`] if no parent remains after
    ///   skipping `None` entries.
    /// - [`NodeError::UnknownParent`] if a handle was not issued by this store.
    ///   Nothing is created in either case.
    pub fn create_node<I, P>(&self, creator: C, data: T, parents: I) -> Result<NodeId, NodeError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Option<NodeId>>,
    {
        let mut nodes = self.nodes.borrow_mut();

        let mut resolved = BTreeSet::new();
        for parent in parents.into_iter().filter_map(Into::into) {
            if parent.index() >= nodes.len() {
                return Err(NodeError::UnknownParent(parent));
            }
            resolved.insert(parent);
        }

        let generation = resolved
            .iter()
            .map(|parent| nodes[parent.index()].generation)
            .max()
            .ok_or(NodeError::InvalidConstruction)?
            .saturating_add(1);

        let id = NodeId::from_index(nodes.len());
        for parent in &resolved {
            nodes[parent.index()].children.insert(id);
        }
        nodes.push(Node {
            creator,
            data,
            kind: NodeKind::Interior {
                parents: resolved.into_iter().collect(),
            },
            generation,
            children: BTreeSet::new(),
            tie_break: TieBreakKey::derive(&self.tie_break_key, id.index()),
        });
        trace!(node = %id, generation, "created interior node");
        Ok(id)
    }

    /// Number of nodes ever created in this store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    /// Returns `true` if no node was created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Returns `true` if `id` was issued by this store.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.len()
    }

    /// All handles issued so far, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + use<C, T> {
        (0..self.len()).map(NodeId::from_index)
    }

    /// Generation number of `id`.
    #[must_use]
    pub fn generation(&self, id: NodeId) -> Option<Generation> {
        self.with_node(id, |node| node.generation)
    }

    /// Shape of `id` (root, or interior with its parents).
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.with_node(id, |node| node.kind.clone())
    }

    /// Returns `Some(true)` if `id` is a root node.
    #[must_use]
    pub fn is_root(&self, id: NodeId) -> Option<bool> {
        self.with_node(id, |node| node.kind.is_root())
    }

    /// Parent handles of `id`, ascending; empty for roots.
    #[must_use]
    pub fn parents(&self, id: NodeId) -> Option<Vec<NodeId>> {
        self.with_node(id, |node| node.kind.parents().to_vec())
    }

    /// Child handles of `id` across the whole store.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Option<BTreeSet<NodeId>> {
        self.with_node(id, |node| node.children.clone())
    }

    /// Returns `true` if `child` names `parent` as a direct parent.
    #[must_use]
    pub fn has_child(&self, parent: NodeId, child: NodeId) -> bool {
        self.with_node(parent, |node| node.children.contains(&child))
            .unwrap_or(false)
    }

    /// Same-generation tie-break key of `id`.
    #[must_use]
    pub fn tie_break_key(&self, id: NodeId) -> Option<TieBreakKey> {
        self.with_node(id, |node| node.tie_break)
    }

    /// Run `f` on the payload of `id`. The payload is not borrowed past the
    /// call, so `f` must not create nodes in this store.
    pub fn with_data<R>(&self, id: NodeId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.with_node(id, |node| f(&node.data))
    }

    pub(crate) fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&Node<C, T>) -> R) -> Option<R> {
        self.nodes.borrow().get(id.index()).map(f)
    }
}

impl<C: Clone, T> NodeStore<C, T> {
    /// Creator identity of `id`.
    #[must_use]
    pub fn creator(&self, id: NodeId) -> Option<C> {
        self.with_node(id, |node| node.creator.clone())
    }
}

impl<C, T: Clone> NodeStore<C, T> {
    /// Owned copy of the payload of `id`.
    #[must_use]
    pub fn payload(&self, id: NodeId) -> Option<T> {
        self.with_data(id, T::clone)
    }
}

impl<C, T> Default for NodeStore<C, T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> NodeStore<&'static str, &'static str> {
        NodeStore::new()
    }

    #[test]
    fn root_has_generation_zero() {
        let store = store();
        let root = store.create_root("alice", "payload");
        assert_eq!(store.generation(root), Some(0));
        assert_eq!(store.is_root(root), Some(true));
        assert_eq!(store.parents(root), Some(vec![]));
        assert_eq!(store.with_data(root, |data| *data), Some("payload"));
        assert_eq!(store.creator(root), Some("alice"));
    }

    #[test]
    fn empty_parent_set_is_rejected() {
        let store = store();
        let err = store
            .create_node("alice", "x", Vec::<NodeId>::new())
            .unwrap_err();
        assert_eq!(err, NodeError::InvalidConstruction);
        assert!(store.is_empty());
    }

    #[test]
    fn only_none_parents_is_rejected() {
        let store = store();
        let err = store
            .create_node("alice", "x", [None::<NodeId>, None])
            .unwrap_err();
        assert_eq!(err, NodeError::InvalidConstruction);
    }

    #[test]
    fn none_entries_are_skipped() {
        let store = store();
        let root = store.create_root("alice", "r");
        let child = store
            .create_node("bob", "c", [None, Some(root), None])
            .unwrap();
        assert_eq!(store.parents(child), Some(vec![root]));
        assert_eq!(store.generation(child), Some(1));
    }

    #[test]
    fn unknown_parent_is_rejected_without_side_effects() {
        let store = store();
        let root = store.create_root("alice", "r");
        let forged = NodeId::from_index(99);
        let err = store.create_node("bob", "c", [root, forged]).unwrap_err();
        assert_eq!(err, NodeError::UnknownParent(forged));
        assert_eq!(store.len(), 1);
        assert!(store.children(root).unwrap().is_empty());
    }

    #[test]
    fn repeated_parent_counts_once() {
        let store = store();
        let root = store.create_root("alice", "r");
        let child = store.create_node("bob", "c", [root, root, root]).unwrap();
        assert_eq!(store.parents(child), Some(vec![root]));
        assert_eq!(store.children(root).unwrap().len(), 1);
    }

    #[test]
    fn construction_links_children() {
        let store = store();
        let a = store.create_root("alice", "a");
        let b = store.create_root("bob", "b");
        let c = store.create_node("carol", "c", [a, b]).unwrap();
        assert!(store.has_child(a, c));
        assert!(store.has_child(b, c));
        assert!(!store.has_child(c, a));
    }

    #[test]
    fn generation_is_one_more_than_youngest_parent() {
        let store = store();
        let root_a = store.create_root("alice", "a");
        let root_b = store.create_root("bob", "b");
        let one = store.create_node("carol", "1", [root_a]).unwrap();
        let two = store.create_node("alice", "2", [one, root_b]).unwrap();
        assert_eq!(store.generation(one), Some(1));
        assert_eq!(store.generation(two), Some(2));
    }

    #[test]
    fn kind_reports_shape() {
        let store = store();
        let root = store.create_root("alice", "r");
        let child = store.create_node("bob", "c", [root]).unwrap();
        assert_eq!(store.kind(root), Some(NodeKind::Root));
        assert_eq!(
            store.kind(child),
            Some(NodeKind::Interior {
                parents: vec![root]
            })
        );
    }

    #[test]
    fn equal_payloads_are_distinct_nodes() {
        let store = store();
        let a = store.create_root("alice", "same");
        let b = store.create_root("alice", "same");
        assert_ne!(a, b);
        assert_ne!(store.tie_break_key(a), store.tie_break_key(b));
    }

    #[test]
    fn payload_access_does_not_block_node_creation() {
        let store = store();
        let root = store.create_root("alice", "first");
        let payload = store.payload(root).unwrap();
        let child = store.create_node("bob", payload, [root]).unwrap();

        let len = store.with_data(child, |data| data.len()).unwrap();
        store.create_root("carol", "after");
        assert_eq!(len, 5);
        assert_eq!(store.payload(child), Some("first"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn foreign_handle_lookups_return_none() {
        let store = store();
        let forged = NodeId::from_index(0);
        assert!(!store.contains(forged));
        assert!(store.generation(forged).is_none());
        assert!(store.with_data(forged, |_| ()).is_none());
        assert!(!store.has_child(forged, forged));
    }

    #[test]
    fn ids_follow_creation_order() {
        let store = store();
        let a = store.create_root("alice", "a");
        let b = store.create_root("bob", "b");
        assert_eq!(store.ids().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn tie_break_keys_follow_store_key() {
        let plain: NodeStore<u8, ()> = NodeStore::new();
        let keyed: NodeStore<u8, ()> = NodeStore::with_tie_break_key([7; 32]);
        let a = plain.create_root(1, ());
        let b = keyed.create_root(1, ());
        assert_ne!(plain.tie_break_key(a), keyed.tie_break_key(b));
    }
}
