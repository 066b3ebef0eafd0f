use std::collections::BTreeSet;

use crate::participant::{ParticipantId, ParticipantState};
use crate::{NodeSnapshot, SimulationResult};

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    /// `true` iff no violations were found.
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// Merge another result into this one (failures accumulate).
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

/// A single failed invariant, with enough context to replay and debug it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A view holds a node without one of its parents.
    Closure {
        participant: ParticipantId,
        node: usize,
        missing_parent: Option<usize>,
    },

    /// A node was ordered without, or before, one of its parents.
    OrderExtension {
        participant: ParticipantId,
        node: usize,
        parent: usize,
    },

    /// A later order of a participant rewrote an earlier one.
    Finality {
        participant: ParticipantId,
        /// Index of the order that is not a prefix of its successor.
        snapshot: usize,
    },

    /// Two orders (of any participants, at any time) disagree.
    WellDefinedness {
        participant_a: ParticipantId,
        participant_b: ParticipantId,
        /// First position where the two orders differ.
        position: usize,
    },

    /// Fully synced views or their orders differ.
    Convergence {
        participant_a: ParticipantId,
        participant_b: ParticipantId,
        only_in_a: Vec<usize>,
        only_in_b: Vec<usize>,
        orders_differ: bool,
    },

    /// An equivocating creator went unnoticed by a synced participant.
    UndetectedEquivocation {
        participant: ParticipantId,
        creator: ParticipantId,
    },

    /// An honest creator was reported as faulty.
    HonestCreatorFlagged {
        participant: ParticipantId,
        creator: ParticipantId,
    },
}

// ── Oracle ────────────────────────────────────────────────────────────────────

/// Checks the ordering invariants over a finished simulation.
///
/// # Invariants checked
///
/// 1. **Closure** (`check_closure`): every view is ancestor-closed.
/// 2. **Order extension** (`check_order_extension`): parents are ordered
///    before their children.
/// 3. **Finality** (`check_finality`): each participant's successive orders
///    only append.
/// 4. **Well-definedness** (`check_well_definedness`): all orders ever
///    computed are pairwise prefix-comparable.
/// 5. **Convergence** (`check_convergence`): fully synced views and their
///    orders are identical.
/// 6. **Fault detection** (`check_fault_detection`): every equivocator is
///    flagged and no honest creator is.
pub struct OrderingOracle;

impl OrderingOracle {
    /// Run every check.
    #[must_use]
    pub fn check_all(result: &SimulationResult) -> OracleResult {
        Self::check_closure(&result.participants, &result.nodes)
            .merge(Self::check_order_extension(&result.participants, &result.nodes))
            .merge(Self::check_finality(&result.participants))
            .merge(Self::check_well_definedness(&result.participants))
            .merge(Self::check_convergence(&result.participants))
            .merge(Self::check_fault_detection(
                &result.participants,
                &result.equivocators,
            ))
    }

    // ── Invariant 1: Closure ────────────────────────────────────────────────

    #[must_use]
    pub fn check_closure(states: &[ParticipantState], nodes: &[NodeSnapshot]) -> OracleResult {
        let mut violations = Vec::new();

        for state in states {
            if !state.consistent {
                violations.push(InvariantViolation::Closure {
                    participant: state.id,
                    node: 0,
                    missing_parent: None,
                });
            }
            for &node in &state.known_nodes {
                let Some(snapshot) = nodes.get(node) else {
                    continue;
                };
                if let Some(&missing) = snapshot
                    .parents
                    .iter()
                    .find(|parent| !state.known_nodes.contains(parent))
                {
                    violations.push(InvariantViolation::Closure {
                        participant: state.id,
                        node,
                        missing_parent: Some(missing),
                    });
                }
            }
        }

        OracleResult::from_violations(violations)
    }

    // ── Invariant 2: Order extension ────────────────────────────────────────

    #[must_use]
    pub fn check_order_extension(
        states: &[ParticipantState],
        nodes: &[NodeSnapshot],
    ) -> OracleResult {
        let mut violations = Vec::new();

        for state in states {
            for order in &state.order_history {
                let mut seen = BTreeSet::new();
                for &node in order {
                    let parents = nodes.get(node).map_or(&[][..], |n| n.parents.as_slice());
                    if let Some(&parent) = parents.iter().find(|p| !seen.contains(*p)) {
                        violations.push(InvariantViolation::OrderExtension {
                            participant: state.id,
                            node,
                            parent,
                        });
                    }
                    seen.insert(node);
                }
            }
        }

        OracleResult::from_violations(violations)
    }

    // ── Invariant 3: Finality ───────────────────────────────────────────────

    #[must_use]
    pub fn check_finality(states: &[ParticipantState]) -> OracleResult {
        let violations = states
            .iter()
            .flat_map(|state| {
                state
                    .order_history
                    .windows(2)
                    .enumerate()
                    .filter(|(_, pair)| !pair[1].starts_with(&pair[0]))
                    .map(|(snapshot, _)| InvariantViolation::Finality {
                        participant: state.id,
                        snapshot,
                    })
            })
            .collect();

        OracleResult::from_violations(violations)
    }

    // ── Invariant 4: Well-definedness ───────────────────────────────────────

    /// Every order is a prefix of the longest one, which is the same as all
    /// orders being pairwise prefix-comparable.
    #[must_use]
    pub fn check_well_definedness(states: &[ParticipantState]) -> OracleResult {
        let all: Vec<(ParticipantId, &Vec<usize>)> = states
            .iter()
            .flat_map(|state| state.order_history.iter().map(move |order| (state.id, order)))
            .collect();
        let Some(&(longest_owner, longest)) = all.iter().max_by_key(|(_, order)| order.len()) else {
            return OracleResult::pass();
        };

        let mut violations = Vec::new();
        for &(participant, order) in &all {
            if let Some(position) = order.iter().zip(longest).position(|(a, b)| a != b) {
                violations.push(InvariantViolation::WellDefinedness {
                    participant_a: participant,
                    participant_b: longest_owner,
                    position,
                });
            }
        }

        OracleResult::from_violations(violations)
    }

    // ── Invariant 5: Convergence ────────────────────────────────────────────

    #[must_use]
    pub fn check_convergence(states: &[ParticipantState]) -> OracleResult {
        let Some(first) = states.first() else {
            return OracleResult::pass();
        };

        let violations = states[1..]
            .iter()
            .filter_map(|other| {
                let orders_differ = first.final_order() != other.final_order();
                if first.known_nodes == other.known_nodes && !orders_differ {
                    return None;
                }
                Some(InvariantViolation::Convergence {
                    participant_a: first.id,
                    participant_b: other.id,
                    only_in_a: first.known_nodes.difference(&other.known_nodes).copied().collect(),
                    only_in_b: other.known_nodes.difference(&first.known_nodes).copied().collect(),
                    orders_differ,
                })
            })
            .collect();

        OracleResult::from_violations(violations)
    }

    // ── Invariant 6: Fault detection ────────────────────────────────────────

    #[must_use]
    pub fn check_fault_detection(
        states: &[ParticipantState],
        equivocators: &BTreeSet<ParticipantId>,
    ) -> OracleResult {
        let byzantine: BTreeSet<ParticipantId> =
            states.iter().filter(|s| s.byzantine).map(|s| s.id).collect();
        let mut violations = Vec::new();

        for state in states {
            for &creator in equivocators {
                if !state.faulty_creators.contains(&creator) {
                    violations.push(InvariantViolation::UndetectedEquivocation {
                        participant: state.id,
                        creator,
                    });
                }
            }
            for &creator in &state.faulty_creators {
                if !byzantine.contains(&creator) {
                    violations.push(InvariantViolation::HonestCreatorFlagged {
                        participant: state.id,
                        creator,
                    });
                }
            }
        }

        OracleResult::from_violations(violations)
    }
}
