//! Communication-history validity rules.
//!
//! [`ChDag`] adds creator bookkeeping to a [`Dag`]: the number of distinct
//! creators `N`, the tolerated fault count `f = (N - 1) / 3`, and checks for
//! the three structural rules every honest creator follows:
//!
//! - **Diversity**: a node's parents have pairwise distinct creators.
//! - **Dissemination**: a node has at least `N - f` parents at its youngest
//!   parent generation.
//! - **Chain**: a creator's nodes form a strict parent-to-child chain, so a
//!   fork (two nodes with no linking edge) is detectable.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::hash::Hash;
use std::ops::{Deref, DerefMut};

use tracing::debug;

use super::graph::Dag;
use crate::node::{Generation, NodeId, NodeStore};

/// Largest number of faulty creators tolerated among `n`: `(n - 1) / 3`.
///
/// Zero creators tolerate zero faults.
#[must_use]
pub const fn max_tolerable_faulty(n: usize) -> usize {
    n.saturating_sub(1) / 3
}

/// Parents required at the youngest parent generation among `n` creators:
/// `n - f`.
#[must_use]
pub const fn minimum_young_parents_for(n: usize) -> usize {
    n - max_tolerable_faulty(n)
}

/// A [`Dag`] with creator bookkeeping and validity rules.
///
/// Dereferences to the underlying container, so every container operation is
/// available directly.
pub struct ChDag<'s, C, T> {
    dag: Dag<'s, C, T>,
    creators: RefCell<Option<(u64, HashSet<C>)>>,
}

impl<'s, C, T> ChDag<'s, C, T> {
    /// Create an empty history over `store`.
    #[must_use]
    pub fn new(store: &'s NodeStore<C, T>) -> Self {
        Self::from_dag(Dag::new(store))
    }

    /// Wrap an existing container.
    #[must_use]
    pub const fn from_dag(dag: Dag<'s, C, T>) -> Self {
        Self {
            dag,
            creators: RefCell::new(None),
        }
    }

    /// The underlying container.
    #[must_use]
    pub const fn dag(&self) -> &Dag<'s, C, T> {
        &self.dag
    }

    /// Unwrap into the underlying container.
    #[must_use]
    pub fn into_dag(self) -> Dag<'s, C, T> {
        self.dag
    }

    /// Direct parents of `node` grouped by generation; empty for roots.
    #[must_use]
    pub fn parents_by_generation(&self, node: NodeId) -> BTreeMap<Generation, BTreeSet<NodeId>> {
        let store = self.dag.store();
        let mut grouped: BTreeMap<Generation, BTreeSet<NodeId>> = BTreeMap::new();
        for parent in store.parents(node).unwrap_or_default() {
            if let Some(generation) = store.generation(parent) {
                grouped.entry(generation).or_default().insert(parent);
            }
        }
        grouped
    }

    /// Parents of `node` at the youngest parent generation.
    #[must_use]
    pub fn youngest_parents(&self, node: NodeId) -> BTreeSet<NodeId> {
        self.parents_by_generation(node)
            .pop_last()
            .map(|(_, parents)| parents)
            .unwrap_or_default()
    }
}

impl<C, T> ChDag<'_, C, T>
where
    C: Clone + Eq + Hash,
{
    fn with_creators<R>(&self, f: impl FnOnce(&HashSet<C>) -> R) -> R {
        let revision = self.dag.revision();
        let mut memo = self.creators.borrow_mut();
        let stale = memo.as_ref().is_none_or(|(seen, _)| *seen != revision);
        if stale {
            let store = self.dag.store();
            let creators: HashSet<C> = self.dag.iter().filter_map(|n| store.creator(n)).collect();
            debug!(revision, creators = creators.len(), "recomputed creator set");
            *memo = Some((revision, creators));
        }
        match memo.as_ref() {
            Some((_, set)) => f(set),
            None => f(&HashSet::new()),
        }
    }

    /// Distinct creators of contained nodes.
    ///
    /// Returns an independent copy; the memoized set cannot be changed
    /// through it.
    #[must_use]
    pub fn node_creators(&self) -> HashSet<C> {
        self.with_creators(Clone::clone)
    }

    /// Number of distinct creators, `N`.
    #[must_use]
    pub fn creator_count(&self) -> usize {
        self.with_creators(HashSet::len)
    }

    /// The fault bound `f = (N - 1) / 3`.
    #[must_use]
    pub fn max_tolerable_faulty_creators(&self) -> usize {
        max_tolerable_faulty(self.creator_count())
    }

    /// `N - f`: the dissemination threshold.
    #[must_use]
    pub fn minimum_young_parents(&self) -> usize {
        minimum_young_parents_for(self.creator_count())
    }

    /// No two parents of `node` share a creator. Vacuously true for roots.
    ///
    /// Unknown handles fail.
    #[must_use]
    pub fn has_distinct_parent_creators(&self, node: NodeId) -> bool {
        let store = self.dag.store();
        let Some(parents) = store.parents(node) else {
            return false;
        };
        let mut seen = HashSet::with_capacity(parents.len());
        parents
            .into_iter()
            .all(|parent| store.creator(parent).is_some_and(|c| seen.insert(c)))
    }

    /// At least `N - f` parents sit at the youngest parent generation.
    /// Vacuously true for roots.
    #[must_use]
    pub fn has_enough_young_parents(&self, node: NodeId) -> bool {
        match self.dag.store().is_root(node) {
            Some(true) => true,
            Some(false) => self.youngest_parents(node).len() >= self.minimum_young_parents(),
            None => false,
        }
    }

    /// Diversity and dissemination both hold for `node`.
    #[must_use]
    pub fn node_has_valid_parents(&self, node: NodeId) -> bool {
        self.has_distinct_parent_creators(node) && self.has_enough_young_parents(node)
    }

    /// Contained nodes authored by `creator`, by generation then handle.
    #[must_use]
    pub fn creators_nodes(&self, creator: &C) -> Vec<NodeId> {
        let store = self.dag.store();
        let mut nodes: Vec<(Generation, NodeId)> = self
            .dag
            .iter()
            .filter(|&n| store.creator(n).as_ref() == Some(creator))
            .filter_map(|n| store.generation(n).map(|g| (g, n)))
            .collect();
        nodes.sort_unstable();
        nodes.into_iter().map(|(_, n)| n).collect()
    }

    /// Contained nodes authored by `creator`, grouped by generation.
    #[must_use]
    pub fn creators_nodes_by_generation(
        &self,
        creator: &C,
    ) -> BTreeMap<Generation, BTreeSet<NodeId>> {
        let store = self.dag.store();
        let mut grouped: BTreeMap<Generation, BTreeSet<NodeId>> = BTreeMap::new();
        for node in self.creators_nodes(creator) {
            if let Some(generation) = store.generation(node) {
                grouped.entry(generation).or_default().insert(node);
            }
        }
        grouped
    }

    /// Each consecutive pair of `creator`'s nodes, in generation order, is a
    /// direct parent-child pair. Empty and singleton sets are chains.
    #[must_use]
    pub fn creators_nodes_are_chain(&self, creator: &C) -> bool {
        let store = self.dag.store();
        self.creators_nodes(creator)
            .windows(2)
            .all(|pair| store.has_child(pair[0], pair[1]))
    }

    /// Creators that authored a node with invalid parents, plus the remaining
    /// creators whose nodes do not form a chain.
    #[must_use]
    pub fn find_faulty_node_creators(&self) -> HashSet<C> {
        let store = self.dag.store();
        let mut faulty: HashSet<C> = self
            .dag
            .iter()
            .filter(|&n| !self.node_has_valid_parents(n))
            .filter_map(|n| store.creator(n))
            .collect();

        for creator in self.node_creators() {
            if !faulty.contains(&creator) && !self.creators_nodes_are_chain(&creator) {
                faulty.insert(creator);
            }
        }

        if !faulty.is_empty() {
            debug!(faulty = faulty.len(), "found faulty creators");
        }
        faulty
    }
}

impl<'s, C, T> Deref for ChDag<'s, C, T> {
    type Target = Dag<'s, C, T>;

    fn deref(&self) -> &Self::Target {
        &self.dag
    }
}

impl<C, T> DerefMut for ChDag<'_, C, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.dag
    }
}

impl<'s, C, T> From<Dag<'s, C, T>> for ChDag<'s, C, T> {
    fn from(dag: Dag<'s, C, T>) -> Self {
        Self::from_dag(dag)
    }
}

impl<C, T> std::fmt::Debug for ChDag<'_, C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChDag").field("dag", &self.dag).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Store = NodeStore<u32, ()>;

    /// One root per creator `0..n`.
    fn roots(store: &Store, n: u32) -> Vec<NodeId> {
        (0..n).map(|c| store.create_root(c, ())).collect()
    }

    #[test]
    fn fault_bounds_follow_n() {
        let expected_f = [0, 0, 0, 0, 1, 1, 1, 2, 2, 2, 3];
        let expected_young = [0, 1, 2, 3, 3, 4, 5, 5, 6, 7, 7];
        for n in 0..=10 {
            assert_eq!(max_tolerable_faulty(n), expected_f[n], "f for N={n}");
            assert_eq!(minimum_young_parents_for(n), expected_young[n], "N-f for N={n}");
        }
    }

    #[test]
    fn fault_bounds_track_contained_creators() {
        let store = Store::new();
        let mut history = ChDag::new(&store);
        assert_eq!(history.max_tolerable_faulty_creators(), 0);

        for (i, root) in roots(&store, 10).into_iter().enumerate() {
            history.add(root);
            let n = i + 1;
            assert_eq!(history.creator_count(), n);
            assert_eq!(history.max_tolerable_faulty_creators(), (n - 1) / 3);
            assert_eq!(history.minimum_young_parents(), n - (n - 1) / 3);
        }
    }

    #[test]
    fn creator_memo_is_invalidated_on_removal() {
        let store = Store::new();
        let rs = roots(&store, 4);
        let mut history = ChDag::new(&store);
        history.add_all(rs.iter().copied());
        assert_eq!(history.creator_count(), 4);

        history.remove(rs[0]);
        assert_eq!(history.creator_count(), 3);
        assert!(!history.node_creators().contains(&0));
    }

    #[test]
    fn node_creators_returns_a_copy() {
        let store = Store::new();
        let mut history = ChDag::new(&store);
        history.add_all(roots(&store, 2));
        let mut copy = history.node_creators();
        copy.insert(99);
        copy.clear();
        assert_eq!(history.creator_count(), 2);
    }

    #[test]
    fn duplicate_parent_creator_fails_diversity() {
        let store = Store::new();
        let a1 = store.create_root(0, ());
        let a2 = store.create_root(0, ());
        let b = store.create_root(1, ());
        let child = store.create_node(2, (), [a1, a2, b]).unwrap();
        let history = ChDag::from_dag(Dag::from_nodes(&store, [child]));

        assert!(!history.has_distinct_parent_creators(child));
        assert!(!history.node_has_valid_parents(child));
    }

    #[test]
    fn distinct_young_parents_pass() {
        let store = Store::new();
        let rs = roots(&store, 4);
        let child = store.create_node(0, (), rs[..3].to_vec()).unwrap();
        let history = ChDag::from_dag(Dag::from_nodes(&store, rs.iter().copied().chain([child])));

        // N = 4, f = 1, threshold 3.
        assert!(history.node_has_valid_parents(child));
        assert!(rs.iter().all(|&r| history.node_has_valid_parents(r)));
    }

    #[test]
    fn too_few_young_parents_fail_dissemination() {
        let store = Store::new();
        let rs = roots(&store, 4);
        let child = store.create_node(0, (), rs[..2].to_vec()).unwrap();
        let history = ChDag::from_dag(Dag::from_nodes(&store, rs.iter().copied().chain([child])));

        assert!(history.has_distinct_parent_creators(child));
        assert!(!history.has_enough_young_parents(child));
        assert_eq!(history.find_faulty_node_creators(), HashSet::from([0]));
    }

    #[test]
    fn only_youngest_generation_counts() {
        let store = Store::new();
        let rs = roots(&store, 4);
        let mid = store.create_node(1, (), rs[..3].to_vec()).unwrap();
        // Youngest parent generation is 1, holding only `mid`.
        let top = store.create_node(0, (), [mid, rs[2], rs[3]]).unwrap();
        let history = ChDag::from_dag(Dag::from_nodes(&store, [top, rs[0]]));

        assert_eq!(history.youngest_parents(top), BTreeSet::from([mid]));
        assert!(!history.has_enough_young_parents(top));
    }

    #[test]
    fn parents_grouped_by_generation() {
        let store = Store::new();
        let rs = roots(&store, 3);
        let mid = store.create_node(0, (), [rs[0]]).unwrap();
        let top = store.create_node(1, (), [mid, rs[1], rs[2]]).unwrap();
        let history = ChDag::from_dag(Dag::from_nodes(&store, [top]));

        let grouped = history.parents_by_generation(top);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&0], BTreeSet::from([rs[1], rs[2]]));
        assert_eq!(grouped[&1], BTreeSet::from([mid]));
        assert!(history.parents_by_generation(rs[0]).is_empty());
    }

    #[test]
    fn strict_chain_is_not_flagged() {
        let store = Store::new();
        let root = store.create_root(0, ());
        let one = store.create_node(0, (), [root]).unwrap();
        let two = store.create_node(0, (), [one]).unwrap();
        let history = ChDag::from_dag(Dag::from_nodes(&store, [two]));

        assert!(history.creators_nodes_are_chain(&0));
        assert_eq!(history.creators_nodes(&0), vec![root, one, two]);
        assert!(history.find_faulty_node_creators().is_empty());
    }

    #[test]
    fn empty_and_singleton_are_chains() {
        let store = Store::new();
        let root = store.create_root(0, ());
        let history = ChDag::from_dag(Dag::from_nodes(&store, [root]));
        assert!(history.creators_nodes_are_chain(&0));
        assert!(history.creators_nodes_are_chain(&42));
    }

    #[test]
    fn fork_is_detected() {
        // Creator 0 builds gen 1 and gen 2 nodes that are not linked.
        let store = Store::new();
        let r0 = store.create_root(0, ());
        let r1 = store.create_root(1, ());
        let one = store.create_node(0, (), [r0]).unwrap();
        let side = store.create_node(1, (), [r1]).unwrap();
        let two = store.create_node(0, (), [side]).unwrap();
        let history = ChDag::from_dag(Dag::from_nodes(&store, [one, two]));

        assert_eq!(
            history.creators_nodes_by_generation(&0),
            BTreeMap::from([
                (0, BTreeSet::from([r0])),
                (1, BTreeSet::from([one])),
                (2, BTreeSet::from([two])),
            ])
        );
        assert!(!history.creators_nodes_are_chain(&0));
        assert!(history.find_faulty_node_creators().contains(&0));
    }

    #[test]
    fn same_generation_equivocation_is_detected() {
        let store = Store::new();
        let root = store.create_root(0, ());
        let left = store.create_node(0, (), [root]).unwrap();
        let right = store.create_node(0, (), [root]).unwrap();
        let history = ChDag::from_dag(Dag::from_nodes(&store, [left, right]));

        assert_eq!(history.creators_nodes_by_generation(&0)[&1].len(), 2);
        assert!(history.find_faulty_node_creators().contains(&0));
    }

    #[test]
    fn unknown_handle_has_no_valid_parents() {
        let store = Store::new();
        let history = ChDag::new(&store);
        assert!(!history.node_has_valid_parents(NodeId::from_index(3)));
    }

    #[test]
    fn creator_memo_follows_a_replaced_container() {
        let store = Store::new();
        let rs = roots(&store, 2);
        let mut history = ChDag::new(&store);
        history.add(rs[0]);
        assert_eq!(history.node_creators(), HashSet::from([0]));

        *history = Dag::from_nodes(&store, [rs[1]]);
        assert!(!history.contains(rs[0]));
        assert_eq!(history.node_creators(), HashSet::from([1]));
    }

    #[test]
    fn creator_memo_follows_swapped_containers() {
        let store = Store::new();
        let rs = roots(&store, 3);
        let mut left = ChDag::from_dag(Dag::from_nodes(&store, [rs[0]]));
        let mut right = ChDag::from_dag(Dag::from_nodes(&store, [rs[1], rs[2]]));
        assert_eq!(left.creator_count(), 1);
        assert_eq!(right.creator_count(), 2);

        std::mem::swap(&mut *left, &mut *right);
        assert_eq!(left.node_creators(), HashSet::from([1, 2]));
        assert_eq!(right.node_creators(), HashSet::from([0]));
    }
}
