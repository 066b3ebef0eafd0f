//! Closure-preserving container of graph nodes.
//!
//! A [`Dag`] is a set of [`NodeId`] handles over a borrowed [`NodeStore`],
//! kept **consistent**: if a node is in the container, so is every one of its
//! parents. Every mutation preserves this.
//!
//! # Mutation
//!
//! - [`Dag::add`] is ancestor-closing: missing ancestors are inserted first,
//!   in ascending generation order.
//! - [`Dag::remove`] is descendant-closing: contained descendants are removed
//!   first, in descending generation order.
//!
//! Because of the ordering, the container is consistent after every single
//! insertion or deletion, not just at the end of the call. There is no
//! rollback; a `false` result means some handle was not issued by the store.
//!
//! # Change notification
//!
//! Every structural mutation stamps a fresh [`Dag::revision`] and fires the
//! optional change observer once. This is a "might have changed" signal:
//! intersecting with an identical set still fires. Revisions are drawn from
//! a process-wide counter, so no two containers (or two states of one
//! container) share a revision, and derived layers can memoize against it
//! even when the container behind them is replaced wholesale.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use crate::error::NodeError;
use crate::node::{Generation, NodeId, NodeStore};

type ChangeObserver<'s> = Box<dyn FnMut() + 's>;

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Dag
// ---------------------------------------------------------------------------

/// A consistent set of nodes from one [`NodeStore`].
pub struct Dag<'s, C, T> {
    store: &'s NodeStore<C, T>,
    nodes: HashSet<NodeId>,
    revision: u64,
    observer: Option<ChangeObserver<'s>>,
}

impl<'s, C, T> Dag<'s, C, T> {
    /// Create an empty container over `store`.
    #[must_use]
    pub fn new(store: &'s NodeStore<C, T>) -> Self {
        Self {
            store,
            nodes: HashSet::new(),
            revision: next_revision(),
            observer: None,
        }
    }

    /// Create a container holding `nodes` and all of their ancestors.
    ///
    /// Handles that do not belong to `store` are skipped.
    #[must_use]
    pub fn from_nodes(store: &'s NodeStore<C, T>, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let mut dag = Self::new(store);
        dag.add_all(nodes);
        dag
    }

    /// Shallow copy of the membership, without the change observer.
    #[must_use]
    pub fn clone_members(&self) -> Self {
        Self {
            store: self.store,
            nodes: self.nodes.clone(),
            revision: next_revision(),
            observer: None,
        }
    }

    /// The store this container draws nodes from.
    #[must_use]
    pub const fn store(&self) -> &'s NodeStore<C, T> {
        self.store
    }

    /// Stamp identifying the current membership; replaced on every
    /// structural mutation and unique across all containers.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Install the single change observer, replacing any previous one.
    pub fn set_change_observer(&mut self, observer: impl FnMut() + 's) {
        self.observer = Some(Box::new(observer));
    }

    /// Remove the change observer.
    pub fn clear_change_observer(&mut self) {
        self.observer = None;
    }

    fn notify_change(&mut self) {
        self.revision = next_revision();
        if let Some(observer) = self.observer.as_mut() {
            observer();
        }
    }

    /// Number of contained nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the container holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if `node` is contained.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Iterate contained handles (unordered).
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    /// The contained handles as a set.
    #[must_use]
    pub const fn nodes(&self) -> &HashSet<NodeId> {
        &self.nodes
    }

    fn generation_of(&self, node: NodeId) -> Generation {
        self.store.generation(node).unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Add `node` and every missing ancestor.
    ///
    /// Returns `true` if the node and its full ancestor closure are present
    /// afterwards. Adding a present node is a no-op that returns `true` and
    /// does not notify. Returns `false` only for handles not issued by the
    /// store.
    pub fn add(&mut self, node: NodeId) -> bool {
        if self.nodes.contains(&node) {
            return true;
        }
        if !self.store.contains(node) {
            warn!(node = %node, "refusing to add a node from another store");
            return false;
        }

        self.notify_change();
        let inserted = self.insert_ancestor_closure(node);
        debug!(node = %node, inserted, "added node with ancestor closure");
        true
    }

    fn insert_ancestor_closure(&mut self, node: NodeId) -> usize {
        let mut missing = Vec::new();
        let mut seen = HashSet::from([node]);
        let mut stack = vec![node];

        while let Some(current) = stack.pop() {
            missing.push(current);
            self.store.with_node(current, |record| {
                for &parent in record.kind.parents() {
                    if !self.nodes.contains(&parent) && seen.insert(parent) {
                        stack.push(parent);
                    }
                }
            });
        }

        // Parents strictly precede children in generation order.
        missing.sort_by_key(|&n| (self.generation_of(n), n));
        for current in &missing {
            trace!(node = %current, "insert");
            self.nodes.insert(*current);
        }
        missing.len()
    }

    /// Add every node of `nodes` (ancestor-closing).
    ///
    /// Returns the logical AND of the per-node results; every node is
    /// attempted even after a failure.
    pub fn add_all(&mut self, nodes: impl IntoIterator<Item = NodeId>) -> bool {
        nodes
            .into_iter()
            .fold(true, |all_added, node| self.add(node) && all_added)
    }

    /// Create a root node in the store and add it.
    pub fn add_root_node(&mut self, creator: C, data: T) -> NodeId {
        let node = self.store.create_root(creator, data);
        self.add(node);
        node
    }

    /// Create an interior node in the store and add it (with its ancestors).
    ///
    /// # Errors
    ///
    /// Propagates [`NodeError`] from node construction; the container is not
    /// touched in that case.
    pub fn add_node<I, P>(&mut self, creator: C, data: T, parents: I) -> Result<NodeId, NodeError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Option<NodeId>>,
    {
        let node = self.store.create_node(creator, data, parents)?;
        self.add(node);
        Ok(node)
    }

    /// Remove `node` and every contained descendant.
    ///
    /// Returns `true` if neither the node nor any descendant remains. Removing
    /// an absent node trivially succeeds without notifying.
    pub fn remove(&mut self, node: NodeId) -> bool {
        if !self.nodes.contains(&node) {
            return true;
        }

        self.notify_change();
        let removed = self.remove_descendant_closure(node);
        debug!(node = %node, removed, "removed node with descendant closure");
        true
    }

    fn remove_descendant_closure(&mut self, node: NodeId) -> usize {
        let mut doomed = Vec::new();
        let mut seen = HashSet::from([node]);
        let mut stack = vec![node];

        while let Some(current) = stack.pop() {
            doomed.push(current);
            self.store.with_node(current, |record| {
                for &child in &record.children {
                    if self.nodes.contains(&child) && seen.insert(child) {
                        stack.push(child);
                    }
                }
            });
        }

        // Children strictly follow parents in generation order.
        doomed.sort_by_key(|&n| std::cmp::Reverse((self.generation_of(n), n)));
        for current in &doomed {
            trace!(node = %current, "delete");
            self.nodes.remove(current);
        }
        doomed.len()
    }

    /// Remove every node of `nodes` (descendant-closing).
    ///
    /// Returns the logical AND of the per-node results.
    pub fn remove_all(&mut self, nodes: impl IntoIterator<Item = NodeId>) -> bool {
        nodes
            .into_iter()
            .fold(true, |all_removed, node| self.remove(node) && all_removed)
    }

    /// Remove every node.
    pub fn clear(&mut self) {
        self.notify_change();
        self.nodes.clear();
    }

    // -----------------------------------------------------------------------
    // Invariant oracle
    // -----------------------------------------------------------------------

    /// Brute-force closure check: every parent of every contained node is
    /// contained.
    ///
    /// Meant for tests and debugging, not hot paths.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.nodes.iter().all(|&node| {
            self.store
                .with_node(node, |record| {
                    record
                        .kind
                        .parents()
                        .iter()
                        .all(|parent| self.nodes.contains(parent))
                })
                .unwrap_or(false)
        })
    }

    // -----------------------------------------------------------------------
    // Set algebra
    // -----------------------------------------------------------------------

    /// Contained nodes that are absent from `other`.
    ///
    /// Mutates nothing; the result is generally not ancestor-closed.
    #[must_use]
    pub fn complement(&self, other: &HashSet<NodeId>) -> HashSet<NodeId> {
        self.nodes
            .iter()
            .filter(|node| !other.contains(node))
            .copied()
            .collect()
    }

    /// Add every node of `other` (ancestor-closing).
    pub fn union_with(&mut self, other: impl IntoIterator<Item = NodeId>) -> bool {
        self.add_all(other)
    }

    /// Keep the largest consistent subset of the intersection with `other`.
    ///
    /// Membership in `other` does not imply that a node's ancestors are in
    /// `other`, so every contained node outside `other` is removed together
    /// with its descendants. Always notifies.
    pub fn intersect_with(&mut self, other: impl IntoIterator<Item = NodeId>) {
        let other: HashSet<NodeId> = other.into_iter().collect();
        self.notify_change();

        let outside = self.complement(&other);
        let mut removed = 0;
        for node in outside {
            if self.nodes.contains(&node) {
                removed += self.remove_descendant_closure(node);
            }
        }
        debug!(removed, remaining = self.nodes.len(), "intersected");
    }

    /// Plain set intersection with another consistent container.
    ///
    /// Both sides are ancestor-closed, so the intersection is too. Always
    /// notifies.
    pub fn intersect_with_graph(&mut self, other: &Dag<'_, C, T>) {
        self.notify_change();
        self.nodes.retain(|node| other.nodes.contains(node));
    }

    /// Remove every node of `other` that is present (descendant-closing).
    pub fn except_with(&mut self, other: impl IntoIterator<Item = NodeId>) -> bool {
        self.remove_all(other)
    }

    /// Union with `other`, minus the consistent part of the intersection.
    ///
    /// The union step ancestor-closes `other`, so the result may contain
    /// nodes that neither a naive XOR nor `other` itself listed.
    pub fn symmetric_except_with(&mut self, other: impl IntoIterator<Item = NodeId>) {
        let other: Vec<NodeId> = other.into_iter().collect();

        let mut shared = self.clone_members();
        shared.intersect_with(other.iter().copied());
        let shared: Vec<NodeId> = shared.iter().collect();

        self.union_with(other);
        self.except_with(shared);
    }

    // -----------------------------------------------------------------------
    // Set predicates
    // -----------------------------------------------------------------------

    /// Every contained node is in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: impl IntoIterator<Item = NodeId>) -> bool {
        let other: HashSet<NodeId> = other.into_iter().collect();
        self.nodes.is_subset(&other)
    }

    /// Every node of `other` is contained.
    #[must_use]
    pub fn is_superset_of(&self, other: impl IntoIterator<Item = NodeId>) -> bool {
        other.into_iter().all(|node| self.nodes.contains(&node))
    }

    /// Subset of `other` and strictly smaller.
    #[must_use]
    pub fn is_proper_subset_of(&self, other: impl IntoIterator<Item = NodeId>) -> bool {
        let other: HashSet<NodeId> = other.into_iter().collect();
        self.nodes.is_subset(&other) && self.nodes.len() < other.len()
    }

    /// Superset of `other` and strictly larger.
    #[must_use]
    pub fn is_proper_superset_of(&self, other: impl IntoIterator<Item = NodeId>) -> bool {
        let other: HashSet<NodeId> = other.into_iter().collect();
        self.nodes.is_superset(&other) && self.nodes.len() > other.len()
    }

    /// At least one node of `other` is contained.
    #[must_use]
    pub fn overlaps(&self, other: impl IntoIterator<Item = NodeId>) -> bool {
        other.into_iter().any(|node| self.nodes.contains(&node))
    }

    /// Same membership as `other`.
    #[must_use]
    pub fn set_equals(&self, other: impl IntoIterator<Item = NodeId>) -> bool {
        let other: HashSet<NodeId> = other.into_iter().collect();
        self.nodes == other
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Contained root nodes.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|&node| self.store.is_root(node).unwrap_or(false))
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Contained nodes with no contained child.
    #[must_use]
    pub fn tips(&self) -> Vec<NodeId> {
        let mut tips: Vec<NodeId> = self
            .nodes
            .iter()
            .copied()
            .filter(|&node| {
                self.store
                    .with_node(node, |record| {
                        !record.children.iter().any(|c| self.nodes.contains(c))
                    })
                    .unwrap_or(false)
            })
            .collect();
        tips.sort_unstable();
        tips
    }

    /// Transitive parents of `node`, excluding `node` itself.
    ///
    /// Walks the store, so the result is the same whether or not `node` is
    /// contained; for a contained node every ancestor is contained too.
    #[must_use]
    pub fn ancestors(&self, node: NodeId) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([node]);

        while let Some(current) = queue.pop_front() {
            self.store.with_node(current, |record| {
                for &parent in record.kind.parents() {
                    if visited.insert(parent) {
                        queue.push_back(parent);
                    }
                }
            });
        }

        visited
    }

    /// Contained transitive children of `node`, excluding `node` itself.
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([node]);

        while let Some(current) = queue.pop_front() {
            self.store.with_node(current, |record| {
                for &child in &record.children {
                    if self.nodes.contains(&child) && visited.insert(child) {
                        queue.push_back(child);
                    }
                }
            });
        }

        visited
    }

    /// Returns `true` if `ancestor` is a strict ancestor of `node`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor != node && self.ancestors(node).contains(&ancestor)
    }
}

impl<C, T> fmt::Debug for Dag<'_, C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dag")
            .field("nodes", &self.nodes.len())
            .field("revision", &self.revision)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
