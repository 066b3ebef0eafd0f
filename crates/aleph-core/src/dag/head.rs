//! Head-selection contract.
//!
//! The ordering engine asks a [`HeadSelector`] for one node per round. The
//! selector must return a node visible to a fault-tolerant majority of
//! participants at that round, or `None` when it cannot tell yet. Selection
//! must be unpredictable to a minority adversary; a common coin or randomness
//! beacon provides that in a real deployment. This crate ships only the
//! deterministic selectors below.

use std::collections::BTreeMap;

use super::history::ChDag;
use crate::node::{Generation, NodeId};

/// Ordering round index; round `r` elects a head of generation `r` or later.
pub type Round = Generation;

/// Picks the head node of a round.
pub trait HeadSelector<C, T> {
    /// Head for `round` given the current `history`, or `None` if the round
    /// cannot be decided with the information at hand.
    fn choose_head(&self, history: &ChDag<'_, C, T>, round: Round) -> Option<NodeId>;
}

/// Selector that never elects a head. Every linear order stays empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoHead;

impl<C, T> HeadSelector<C, T> for NoHead {
    fn choose_head(&self, _history: &ChDag<'_, C, T>, _round: Round) -> Option<NodeId> {
        None
    }
}

impl<C, T, F> HeadSelector<C, T> for F
where
    F: Fn(Round) -> Option<NodeId>,
{
    fn choose_head(&self, _history: &ChDag<'_, C, T>, round: Round) -> Option<NodeId> {
        self(round)
    }
}

/// Explicit round-to-head table, for tests and for replaying decided rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedHeads {
    heads: BTreeMap<Round, NodeId>,
}

impl FixedHeads {
    /// Empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heads: BTreeMap::new(),
        }
    }

    /// Record the head of `round`, returning the previous one.
    pub fn insert(&mut self, round: Round, head: NodeId) -> Option<NodeId> {
        self.heads.insert(round, head)
    }

    /// Head recorded for `round`.
    #[must_use]
    pub fn get(&self, round: Round) -> Option<NodeId> {
        self.heads.get(&round).copied()
    }

    /// Number of decided rounds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    /// Returns `true` if no round is decided.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }
}

impl FromIterator<(Round, NodeId)> for FixedHeads {
    fn from_iter<I: IntoIterator<Item = (Round, NodeId)>>(iter: I) -> Self {
        Self {
            heads: iter.into_iter().collect(),
        }
    }
}

impl<C, T> HeadSelector<C, T> for FixedHeads {
    fn choose_head(&self, _history: &ChDag<'_, C, T>, round: Round) -> Option<NodeId> {
        self.get(round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeStore;

    #[test]
    fn no_head_never_elects() {
        let store: NodeStore<u8, ()> = NodeStore::new();
        let history = ChDag::new(&store);
        assert_eq!(NoHead.choose_head(&history, 0), None);
        assert_eq!(NoHead.choose_head(&history, 10), None);
    }

    #[test]
    fn closures_are_selectors() {
        let store: NodeStore<u8, ()> = NodeStore::new();
        let history = ChDag::new(&store);
        let selector = |round: Round| (round < 2).then_some(NodeId::from_index(7));
        assert_eq!(selector.choose_head(&history, 1), Some(NodeId::from_index(7)));
        assert_eq!(selector.choose_head(&history, 2), None);
    }

    #[test]
    fn fixed_heads_lookup() {
        let store: NodeStore<u8, ()> = NodeStore::new();
        let history = ChDag::new(&store);
        let mut heads: FixedHeads = [(0, NodeId::from_index(1))].into_iter().collect();
        assert_eq!(heads.insert(1, NodeId::from_index(4)), None);
        assert_eq!(heads.len(), 2);
        assert_eq!(heads.choose_head(&history, 1), Some(NodeId::from_index(4)));
        assert_eq!(heads.choose_head(&history, 2), None);
    }
}
