//! Linearization of the communication history.
//!
//! [`AlephDag::order_units`] turns the partial order of the DAG into a total
//! order. For each round below the largest contained generation it asks the
//! head selector for a head, collects the head and all of its ancestors,
//! sorts them by generation and then by tie-break key, and appends the ones
//! not yet ordered. The first undecided round ends the run.
//!
//! # Properties
//!
//! - **Order extension**: an ancestor is always ordered before its
//!   descendants, since it lands in the same or an earlier batch and batches
//!   are sorted by generation.
//! - **Finality**: with the same selector decisions, growing the DAG only
//!   appends to the previous order.
//! - **Well-definedness**: two runs over views that agree on the decided
//!   heads produce prefix-comparable orders.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use super::head::{HeadSelector, NoHead, Round};
use super::history::ChDag;
use crate::node::{Generation, NodeId, NodeStore};

// ---------------------------------------------------------------------------
// LinearOrder
// ---------------------------------------------------------------------------

/// Append-only sequence of node handles with a membership index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearOrder {
    sequence: Vec<NodeId>,
    positions: HashMap<NodeId, usize>,
}

impl LinearOrder {
    /// Empty order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `node` unless it is already ordered. Returns `true` if appended.
    pub fn push_if_absent(&mut self, node: NodeId) -> bool {
        if self.positions.contains_key(&node) {
            return false;
        }
        self.positions.insert(node, self.sequence.len());
        self.sequence.push(node);
        true
    }

    /// Number of ordered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Returns `true` if nothing is ordered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Returns `true` if `node` is ordered.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.positions.contains_key(&node)
    }

    /// Zero-based position of `node`.
    #[must_use]
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.positions.get(&node).copied()
    }

    /// The ordered handles.
    #[must_use]
    pub fn as_slice(&self) -> &[NodeId] {
        &self.sequence
    }

    /// Iterate the ordered handles.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sequence.iter().copied()
    }

    /// Consume into the plain sequence.
    #[must_use]
    pub fn into_vec(self) -> Vec<NodeId> {
        self.sequence
    }

    /// `self` is a (not necessarily proper) prefix of `other`.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.sequence.starts_with(&self.sequence)
    }

    /// One of the two orders is a prefix of the other.
    #[must_use]
    pub fn is_prefix_comparable(&self, other: &Self) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl<'a> IntoIterator for &'a LinearOrder {
    type Item = &'a NodeId;
    type IntoIter = std::slice::Iter<'a, NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.sequence.iter()
    }
}

// ---------------------------------------------------------------------------
// AlephDag
// ---------------------------------------------------------------------------

/// Communication history with a head selector and the ordering procedure.
///
/// Dereferences to [`ChDag`] (and through it to the container).
pub struct AlephDag<'s, C, T, H = NoHead> {
    history: ChDag<'s, C, T>,
    heads: H,
    largest_generation: Cell<Option<(u64, Generation)>>,
}

impl<'s, C, T> AlephDag<'s, C, T, NoHead> {
    /// Empty history over `store` that never elects a head.
    #[must_use]
    pub fn without_heads(store: &'s NodeStore<C, T>) -> Self {
        Self::new(store, NoHead)
    }
}

impl<'s, C, T, H> AlephDag<'s, C, T, H> {
    /// Empty history over `store` ordered by `heads`.
    #[must_use]
    pub fn new(store: &'s NodeStore<C, T>, heads: H) -> Self {
        Self::with_history(ChDag::new(store), heads)
    }

    /// Order an existing history with `heads`.
    #[must_use]
    pub const fn with_history(history: ChDag<'s, C, T>, heads: H) -> Self {
        Self {
            history,
            heads,
            largest_generation: Cell::new(None),
        }
    }

    /// The head selector.
    #[must_use]
    pub const fn heads(&self) -> &H {
        &self.heads
    }

    /// Mutable access to the head selector.
    pub const fn heads_mut(&mut self) -> &mut H {
        &mut self.heads
    }

    /// The wrapped history.
    #[must_use]
    pub const fn history(&self) -> &ChDag<'s, C, T> {
        &self.history
    }

    /// Unwrap into the history and the selector.
    #[must_use]
    pub fn into_parts(self) -> (ChDag<'s, C, T>, H) {
        (self.history, self.heads)
    }

    /// Largest generation among contained nodes; 0 when empty.
    #[must_use]
    pub fn largest_generation(&self) -> Generation {
        let revision = self.history.revision();
        if let Some((seen, largest)) = self.largest_generation.get() {
            if seen == revision {
                return largest;
            }
        }

        let store = self.history.store();
        let largest = self
            .history
            .iter()
            .filter_map(|n| store.generation(n))
            .max()
            .unwrap_or(0);
        self.largest_generation.set(Some((revision, largest)));
        largest
    }

    /// `head` and all of its ancestors, grouped by generation.
    ///
    /// Roots land in generation 0. Unknown handles yield an empty map.
    #[must_use]
    pub fn ancestors_by_generation(&self, head: NodeId) -> BTreeMap<Generation, BTreeSet<NodeId>> {
        let store = self.history.store();
        let mut grouped: BTreeMap<Generation, BTreeSet<NodeId>> = BTreeMap::new();
        let Some(generation) = store.generation(head) else {
            return grouped;
        };
        grouped.entry(generation).or_default().insert(head);

        for ancestor in self.history.ancestors(head) {
            if let Some(generation) = store.generation(ancestor) {
                grouped.entry(generation).or_default().insert(ancestor);
            }
        }
        grouped
    }

    /// Flatten a generation-grouped batch: ascending generation, then
    /// tie-break key within a generation.
    #[must_use]
    pub fn order_nodes_in_batch(&self, batch: &BTreeMap<Generation, BTreeSet<NodeId>>) -> Vec<NodeId> {
        let store = self.history.store();
        let mut ordered = Vec::with_capacity(batch.values().map(BTreeSet::len).sum());
        for nodes in batch.values() {
            let mut level: Vec<NodeId> = nodes.iter().copied().collect();
            level.sort_by_key(|&n| (store.tie_break_key(n), n));
            ordered.extend(level);
        }
        ordered
    }
}

impl<C, T, H> AlephDag<'_, C, T, H>
where
    H: HeadSelector<C, T>,
{
    /// Head of `round`, or `None` if the selector cannot decide it.
    ///
    /// A head outside the container counts as undecided.
    #[must_use]
    pub fn choose_head(&self, round: Round) -> Option<NodeId> {
        let head = self.heads.choose_head(&self.history, round)?;
        if self.history.contains(head) {
            Some(head)
        } else {
            warn!(round, head = %head, "head selector returned a node outside the history");
            None
        }
    }

    /// Compute the linear order from scratch.
    ///
    /// Runs rounds `0..largest_generation()` and stops early at the first
    /// round without a head. Stopping is the normal outcome while the DAG is
    /// still growing.
    #[must_use]
    pub fn order_units(&self) -> LinearOrder {
        let mut order = LinearOrder::new();
        let largest = self.largest_generation();
        let mut seen_heads = HashSet::new();

        for round in 0..largest {
            let Some(head) = self.choose_head(round) else {
                debug!(round, ordered = order.len(), "no head; stopping");
                break;
            };
            if !seen_heads.insert(head) {
                continue;
            }

            let batch = self.ancestors_by_generation(head);
            let before = order.len();
            for node in self.order_nodes_in_batch(&batch) {
                order.push_if_absent(node);
            }
            debug!(round, head = %head, appended = order.len() - before, "ordered round");
        }

        order
    }
}

impl<'s, C, T, H> Deref for AlephDag<'s, C, T, H> {
    type Target = ChDag<'s, C, T>;

    fn deref(&self) -> &Self::Target {
        &self.history
    }
}

impl<C, T, H> DerefMut for AlephDag<'_, C, T, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.history
    }
}

impl<C, T, H: std::fmt::Debug> std::fmt::Debug for AlephDag<'_, C, T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlephDag")
            .field("history", &self.history)
            .field("heads", &self.heads)
            .finish_non_exhaustive()
    }
}
