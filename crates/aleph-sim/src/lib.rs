//! aleph-sim library.
//!
//! Deterministic simulation of participants growing a shared communication
//! history over a fault-injecting network, with an oracle that checks the
//! ordering invariants on the outcome.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod campaign;
pub mod coin;
pub mod config;
pub mod network;
pub mod oracle;
pub mod participant;
pub mod rng;

use std::collections::BTreeSet;

use aleph_core::node::{Generation, NodeId, NodeStore};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use config::{CampaignConfig, SimulationConfig, load_campaign_config, load_simulation_config};

use crate::coin::SharedSeedCoin;
use crate::network::{NetworkMessage, SimulatedNetwork};
use crate::participant::{ParticipantId, ParticipantState, SimulatedParticipant};
use crate::rng::DeterministicRng;

const SCHEDULE_STREAM: u64 = 0;
const NETWORK_STREAM: u64 = 1;

/// One recorded simulation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Step the event happened in; the final sync uses `steps`.
    pub step: u64,
    pub kind: TraceEventKind,
}

/// Node handles appear as store indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEventKind {
    Create {
        participant: ParticipantId,
        node: usize,
        generation: Generation,
    },
    Equivocate {
        participant: ParticipantId,
        node: usize,
        twin: usize,
    },
    Send {
        from: ParticipantId,
        to: ParticipantId,
        node: usize,
        delay_steps: u8,
        duplicated: bool,
    },
    Drop {
        from: ParticipantId,
        to: ParticipantId,
        node: usize,
    },
    Deliver {
        from: ParticipantId,
        to: ParticipantId,
        node: usize,
        fresh: bool,
    },
    Partition {
        participant: ParticipantId,
        isolated: bool,
    },
    Ordered {
        participant: ParticipantId,
        len: usize,
    },
    Sync {
        participant: ParticipantId,
        added: usize,
    },
}

/// Owned copy of one store node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub index: usize,
    pub creator: ParticipantId,
    pub generation: Generation,
    pub parents: Vec<usize>,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    /// Every node ever created, indexed by store index.
    pub nodes: Vec<NodeSnapshot>,
    /// Final per-participant state after the full sync.
    pub participants: Vec<ParticipantState>,
    pub byzantine: BTreeSet<ParticipantId>,
    /// Participants that actually equivocated.
    pub equivocators: BTreeSet<ParticipantId>,
    /// A drop, partition or equivocation happened.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    /// Length of the converged linear order (of the first participant).
    #[must_use]
    pub fn final_order_len(&self) -> usize {
        self.participants
            .first()
            .map_or(0, |state| state.final_order().len())
    }
}

/// Drives one simulation run from a [`SimulationConfig`].
#[derive(Debug, Clone)]
pub struct Simulator {
    config: SimulationConfig,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Run all steps, then heal the network, deliver everything in flight and
    /// fully sync every participant.
    ///
    /// # Errors
    ///
    /// Returns an error if a participant fails to construct a node.
    pub fn run(&self) -> Result<SimulationResult> {
        let config = &self.config;
        let seed_bytes = config.seed.to_le_bytes();
        let store: NodeStore<ParticipantId, u64> =
            NodeStore::with_tie_break_key(blake3::derive_key("aleph-sim tie-break", &seed_bytes));

        let mut schedule_rng = DeterministicRng::fork(config.seed, SCHEDULE_STREAM);
        let network_rng = DeterministicRng::fork(config.seed, NETWORK_STREAM);

        let byzantine = pick_byzantine(config, &mut schedule_rng);
        let coin = SharedSeedCoin::new(config.seed, config.participants, byzantine.clone());
        let mut participants: Vec<SimulatedParticipant<'_>> = (0..config.participants)
            .map(|id| {
                SimulatedParticipant::new(
                    id,
                    config.participants,
                    byzantine.contains(&id),
                    &store,
                    coin.clone(),
                )
            })
            .collect();

        let mut run = Run {
            network: SimulatedNetwork::new(config.fault),
            rng: network_rng,
            trace: Vec::new(),
            participants: config.participants,
            interesting: false,
        };
        let mut equivocators = BTreeSet::new();

        for step in 0..config.steps {
            if let Some(participant) = run
                .network
                .maybe_toggle_partition(config.participants, &mut run.rng)
            {
                let isolated = run.network.is_isolated(participant);
                run.interesting = true;
                run.record(step, TraceEventKind::Partition {
                    participant,
                    isolated,
                });
            }

            let mut order: Vec<ParticipantId> = (0..config.participants).collect();
            schedule_rng.shuffle(&mut order);
            for &id in &order {
                let participant = &mut participants[id];
                let equivocate = participant.is_byzantine()
                    && schedule_rng.hit_rate_percent(config.equivocation_percent);
                let Some(created) = participant.try_create(equivocate)? else {
                    continue;
                };

                run.record(step, TraceEventKind::Create {
                    participant: id,
                    node: created.node.index(),
                    generation: created.generation,
                });
                if let Some(twin) = created.twin {
                    equivocators.insert(id);
                    run.interesting = true;
                    run.record(step, TraceEventKind::Equivocate {
                        participant: id,
                        node: created.node.index(),
                        twin: twin.index(),
                    });
                }
                for node in created.nodes() {
                    run.broadcast(step, id, node);
                }
            }

            for participant in &participants {
                if let Some(latest) = participant.latest() {
                    run.gossip(step, participant.id(), latest, config.gossip_fanout);
                }
            }

            let delivered = run.network.deliver_ready(step, &mut run.rng).delivered;
            run.deliver(step, &mut participants, delivered);

            for participant in &mut participants {
                if let Some(len) = participant.record_order() {
                    run.record(step, TraceEventKind::Ordered {
                        participant: participant.id(),
                        len,
                    });
                }
            }
        }

        // Final phase: heal, flush the network, then anti-entropy with the
        // whole store.
        let final_step = config.steps;
        run.network.heal();
        let in_flight = run.network.drain();
        run.deliver(final_step, &mut participants, in_flight);

        for participant in &mut participants {
            let added = participant.sync_from(store.ids());
            run.record(final_step, TraceEventKind::Sync {
                participant: participant.id(),
                added,
            });
            if let Some(len) = participant.record_order() {
                run.record(final_step, TraceEventKind::Ordered {
                    participant: participant.id(),
                    len,
                });
            }
        }

        let states: Vec<ParticipantState> =
            participants.iter().map(SimulatedParticipant::snapshot).collect();
        let nodes = snapshot_nodes(&store);
        let result = SimulationResult {
            seed: config.seed,
            trace: run.trace,
            nodes,
            participants: states,
            byzantine,
            equivocators,
            interesting_state_reached: run.interesting,
        };

        info!(
            seed = result.seed,
            nodes = result.nodes.len(),
            ordered = result.final_order_len(),
            equivocators = result.equivocators.len(),
            "simulation complete"
        );
        Ok(result)
    }
}

/// Mutable per-run plumbing shared by the step phases.
struct Run {
    network: SimulatedNetwork,
    rng: DeterministicRng,
    trace: Vec<TraceEvent>,
    participants: usize,
    interesting: bool,
}

impl Run {
    fn record(&mut self, step: u64, kind: TraceEventKind) {
        self.trace.push(TraceEvent { step, kind });
    }

    fn send(&mut self, step: u64, from: ParticipantId, to: ParticipantId, node: NodeId) {
        let message = NetworkMessage { from, to, node };
        let outcome = self.network.send(message, step, &mut self.rng);
        let node = node.index();
        if outcome.dropped {
            self.interesting = true;
            self.record(step, TraceEventKind::Drop { from, to, node });
        } else {
            self.record(step, TraceEventKind::Send {
                from,
                to,
                node,
                delay_steps: outcome.delay_steps,
                duplicated: outcome.duplicated,
            });
        }
    }

    fn broadcast(&mut self, step: u64, from: ParticipantId, node: NodeId) {
        for to in (0..self.participants).filter(|&to| to != from) {
            self.send(step, from, to, node);
        }
    }

    /// Re-send `node` to `fanout` random peers.
    fn gossip(&mut self, step: u64, from: ParticipantId, node: NodeId, fanout: usize) {
        let mut peers: Vec<ParticipantId> =
            (0..self.participants).filter(|&to| to != from).collect();
        self.rng.shuffle(&mut peers);
        for to in peers.into_iter().take(fanout) {
            self.send(step, from, to, node);
        }
    }

    fn deliver(
        &mut self,
        step: u64,
        participants: &mut [SimulatedParticipant<'_>],
        messages: Vec<NetworkMessage>,
    ) {
        for message in messages {
            let Some(participant) = participants.get_mut(message.to) else {
                continue;
            };
            let fresh = participant.receive(message.node);
            self.record(step, TraceEventKind::Deliver {
                from: message.from,
                to: message.to,
                node: message.node.index(),
                fresh,
            });
        }
        debug!(step, pending = self.network.pending_len(), "delivered");
    }
}

fn pick_byzantine(config: &SimulationConfig, rng: &mut DeterministicRng) -> BTreeSet<ParticipantId> {
    let mut ids: Vec<ParticipantId> = (0..config.participants).collect();
    rng.shuffle(&mut ids);
    ids.into_iter().take(config.byzantine).collect()
}

fn snapshot_nodes(store: &NodeStore<ParticipantId, u64>) -> Vec<NodeSnapshot> {
    store
        .ids()
        .map(|id| NodeSnapshot {
            index: id.index(),
            creator: store.creator(id).unwrap_or_default(),
            generation: store.generation(id).unwrap_or_default(),
            parents: store
                .parents(id)
                .unwrap_or_default()
                .into_iter()
                .map(NodeId::index)
                .collect(),
        })
        .collect()
}
