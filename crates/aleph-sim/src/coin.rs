//! Seeded stand-in for a common coin.
//!
//! Every participant shares the seed, so all of them elect the same creator
//! for a round. The elected creator is honest and authors exactly one node
//! per generation, so every participant that decides a round decides it on
//! the same head. A participant decides only once the head is visible to a
//! fault-tolerant majority of its view; until then the round stays open.
//!
//! The seed is known to every simulated participant, so this coin is not
//! unpredictable. It exercises the ordering engine, nothing more.

use std::collections::{BTreeSet, HashSet};

use aleph_core::dag::{ChDag, HeadSelector, Round, minimum_young_parents_for};
use aleph_core::node::NodeId;

use crate::participant::ParticipantId;

/// Head selector electing one honest creator per round from a shared seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedSeedCoin {
    key: [u8; 32],
    participants: usize,
    byzantine: BTreeSet<ParticipantId>,
}

impl SharedSeedCoin {
    #[must_use]
    pub fn new(seed: u64, participants: usize, byzantine: BTreeSet<ParticipantId>) -> Self {
        Self {
            key: *blake3::hash(&seed.to_le_bytes()).as_bytes(),
            participants,
            byzantine,
        }
    }

    /// Creator elected for `round`, skipping byzantine ones.
    ///
    /// `None` only if every participant is byzantine.
    #[must_use]
    pub fn elect(&self, round: Round) -> Option<ParticipantId> {
        if self.participants == 0 {
            return None;
        }
        let digest = blake3::keyed_hash(&self.key, &round.to_le_bytes());
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest.as_bytes()[..8]);
        let participants = u64::try_from(self.participants).unwrap_or(u64::MAX);
        let start = usize::try_from(u64::from_le_bytes(word) % participants).unwrap_or(0);

        (0..self.participants)
            .map(|offset| (start + offset) % self.participants)
            .find(|candidate| !self.byzantine.contains(candidate))
    }

    /// Distinct creators in `history` with a node descending from `node`.
    fn support(history: &ChDag<'_, ParticipantId, u64>, node: NodeId) -> usize {
        let store = history.store();
        history
            .descendants(node)
            .into_iter()
            .filter_map(|n| store.creator(n))
            .collect::<HashSet<_>>()
            .len()
    }
}

impl HeadSelector<ParticipantId, u64> for SharedSeedCoin {
    fn choose_head(&self, history: &ChDag<'_, ParticipantId, u64>, round: Round) -> Option<NodeId> {
        let elected = self.elect(round)?;
        let candidates = history.creators_nodes_by_generation(&elected).remove(&round)?;
        if candidates.len() != 1 {
            return None;
        }
        let head = candidates.into_iter().next()?;
        let needed = minimum_young_parents_for(self.participants);
        (Self::support(history, head) >= needed).then_some(head)
    }
}

#[cfg(test)]
mod tests {
    use aleph_core::node::NodeStore;

    use super::*;

    #[test]
    fn election_is_shared_and_honest() {
        let byzantine = BTreeSet::from([1]);
        let a = SharedSeedCoin::new(42, 4, byzantine.clone());
        let b = SharedSeedCoin::new(42, 4, byzantine);
        for round in 0..64 {
            let elected = a.elect(round);
            assert_eq!(elected, b.elect(round));
            assert_ne!(elected, Some(1));
            assert!(elected.is_some_and(|p| p < 4));
        }
    }

    #[test]
    fn all_byzantine_elects_nobody() {
        let coin = SharedSeedCoin::new(1, 2, BTreeSet::from([0, 1]));
        assert_eq!(coin.elect(0), None);
    }

    #[test]
    fn head_needs_majority_support() {
        let store: NodeStore<ParticipantId, u64> = NodeStore::new();
        let roots: Vec<NodeId> = (0..4).map(|p| store.create_root(p, 0)).collect();
        let coin = SharedSeedCoin::new(5, 4, BTreeSet::new());
        let elected = coin.elect(0).unwrap();
        let head = roots[elected];

        let mut history = ChDag::new(&store);
        history.add_all(roots.iter().copied());
        assert_eq!(coin.choose_head(&history, 0), None);

        // Three creators (N - f for N = 4) build on every root.
        for p in 0..3 {
            history.add_node(p, 1, roots.iter().copied()).unwrap();
        }
        assert_eq!(coin.choose_head(&history, 0), Some(head));
        assert_eq!(coin.choose_head(&history, 1), None);
    }
}
