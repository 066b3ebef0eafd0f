use std::collections::{BTreeMap, BTreeSet};

use aleph_core::dag::{AlephDag, LinearOrder, minimum_young_parents_for};
use aleph_core::node::{Generation, NodeId, NodeStore, TieBreakKey};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::coin::SharedSeedCoin;

/// Stable identifier for a simulated participant; also its creator identity.
pub type ParticipantId = usize;

/// Nodes produced by one creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Created {
    pub node: NodeId,
    pub generation: Generation,
    /// Second node at the same generation, for an equivocating participant.
    pub twin: Option<NodeId>,
}

impl Created {
    /// Every created node, primary first.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + use<> {
        std::iter::once(self.node).chain(self.twin)
    }
}

/// Owned snapshot of a participant's final state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantState {
    pub id: ParticipantId,
    pub byzantine: bool,
    /// Store indices of every node in the participant's view.
    pub known_nodes: BTreeSet<usize>,
    /// Result of the closure check on the view.
    pub consistent: bool,
    /// Every distinct linear order the participant computed, oldest first.
    pub order_history: Vec<Vec<usize>>,
    pub faulty_creators: BTreeSet<ParticipantId>,
}

impl ParticipantState {
    /// Latest computed linear order.
    #[must_use]
    pub fn final_order(&self) -> &[usize] {
        self.order_history.last().map(Vec::as_slice).unwrap_or_default()
    }
}

/// One simulated participant growing its local view of the shared history.
///
/// An honest participant creates its generation-`g` node once its view holds
/// generation `g - 1` nodes from at least `N - f` distinct creators. The new
/// node names its own previous node and one generation `g - 1` node per other
/// creator, so it always passes the diversity, dissemination and chain rules.
pub struct SimulatedParticipant<'s> {
    id: ParticipantId,
    byzantine: bool,
    participants: usize,
    view: AlephDag<'s, ParticipantId, u64, SharedSeedCoin>,
    latest: Option<NodeId>,
    next_payload: u64,
    orders: Vec<LinearOrder>,
}

impl<'s> SimulatedParticipant<'s> {
    #[must_use]
    pub fn new(
        id: ParticipantId,
        participants: usize,
        byzantine: bool,
        store: &'s NodeStore<ParticipantId, u64>,
        coin: SharedSeedCoin,
    ) -> Self {
        Self {
            id,
            byzantine,
            participants,
            view: AlephDag::new(store, coin),
            latest: None,
            next_payload: 0,
            orders: Vec::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> ParticipantId {
        self.id
    }

    #[must_use]
    pub const fn is_byzantine(&self) -> bool {
        self.byzantine
    }

    #[must_use]
    pub const fn view(&self) -> &AlephDag<'s, ParticipantId, u64, SharedSeedCoin> {
        &self.view
    }

    /// The participant's most recent own node.
    #[must_use]
    pub const fn latest(&self) -> Option<NodeId> {
        self.latest
    }

    /// Distinct linear orders computed so far, oldest first.
    #[must_use]
    pub fn orders(&self) -> &[LinearOrder] {
        &self.orders
    }

    fn next_payload(&mut self) -> u64 {
        let payload = self.next_payload;
        self.next_payload = self.next_payload.saturating_add(1);
        payload
    }

    /// Parents for a node one generation above `previous`, or `None` if the
    /// view does not hold enough creators at `previous`'s generation yet.
    fn parent_candidates(&self, previous: NodeId) -> Option<Vec<NodeId>> {
        let store = self.view.store();
        let generation = store.generation(previous)?;

        let mut best: BTreeMap<ParticipantId, (Option<TieBreakKey>, NodeId)> = BTreeMap::new();
        for node in self.view.iter() {
            if store.generation(node) != Some(generation) {
                continue;
            }
            let Some(creator) = store.creator(node) else {
                continue;
            };
            let candidate = (store.tie_break_key(node), node);
            best.entry(creator)
                .and_modify(|current| *current = (*current).min(candidate))
                .or_insert(candidate);
        }
        best.insert(self.id, (store.tie_break_key(previous), previous));

        if best.len() < minimum_young_parents_for(self.participants) {
            return None;
        }
        Some(best.into_values().map(|(_, node)| node).collect())
    }

    /// Create the next own node if the view allows it.
    ///
    /// The first call creates a root. With `equivocate` set, a byzantine
    /// participant also creates a twin node with the same parents and keeps
    /// building on the primary.
    ///
    /// # Errors
    ///
    /// Returns an error if node construction fails, which indicates a bug in
    /// parent selection.
    pub fn try_create(&mut self, equivocate: bool) -> Result<Option<Created>> {
        let Some(previous) = self.latest else {
            let payload = self.next_payload();
            let node = self.view.add_root_node(self.id, payload);
            self.latest = Some(node);
            trace!(participant = self.id, node = %node, "created root");
            return Ok(Some(Created {
                node,
                generation: 0,
                twin: None,
            }));
        };

        let Some(parents) = self.parent_candidates(previous) else {
            return Ok(None);
        };

        let payload = self.next_payload();
        let node = self.view.add_node(self.id, payload, parents.iter().copied())?;
        let twin = if self.byzantine && equivocate {
            let payload = self.next_payload();
            Some(self.view.add_node(self.id, payload, parents)?)
        } else {
            None
        };
        self.latest = Some(node);

        let generation = self.view.store().generation(node).unwrap_or_default();
        trace!(participant = self.id, node = %node, generation, "created node");
        Ok(Some(Created {
            node,
            generation,
            twin,
        }))
    }

    /// Add a gossiped node (with its ancestry) to the view. Returns `true`
    /// if the node was new.
    pub fn receive(&mut self, node: NodeId) -> bool {
        if self.view.contains(node) {
            return false;
        }
        self.view.add(node)
    }

    /// Add every node of `nodes`. Returns how many nodes the view gained.
    pub fn sync_from(&mut self, nodes: impl IntoIterator<Item = NodeId>) -> usize {
        let before = self.view.len();
        self.view.add_all(nodes);
        self.view.len() - before
    }

    /// Recompute the linear order; record and return its length if it
    /// differs from the last recorded one.
    pub fn record_order(&mut self) -> Option<usize> {
        let order = self.view.order_units();
        if self.orders.last() == Some(&order) {
            return None;
        }
        let len = order.len();
        self.orders.push(order);
        Some(len)
    }

    /// Owned snapshot for the oracle.
    #[must_use]
    pub fn snapshot(&self) -> ParticipantState {
        ParticipantState {
            id: self.id,
            byzantine: self.byzantine,
            known_nodes: self.view.iter().map(NodeId::index).collect(),
            consistent: self.view.is_consistent(),
            order_history: self
                .orders
                .iter()
                .map(|order| order.iter().map(NodeId::index).collect())
                .collect(),
            faulty_creators: self.view.find_faulty_node_creators().into_iter().collect(),
        }
    }
}

impl std::fmt::Debug for SimulatedParticipant<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedParticipant")
            .field("id", &self.id)
            .field("byzantine", &self.byzantine)
            .field("latest", &self.latest)
            .field("view", &self.view.len())
            .finish_non_exhaustive()
    }
}
