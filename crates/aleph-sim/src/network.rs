use std::collections::BTreeSet;

use aleph_core::node::NodeId;
use serde::{Deserialize, Serialize};

use crate::participant::ParticipantId;
use crate::rng::DeterministicRng;

/// Fault injection for simulated node gossip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Maximum delivery delay in steps.
    pub max_delay_steps: u8,
    /// Percentage of sends dropped.
    pub drop_rate_percent: u8,
    /// Percentage of sends duplicated.
    pub duplicate_rate_percent: u8,
    /// Percentage chance of reordering ready messages at each step.
    pub reorder_rate_percent: u8,
    /// Percentage chance per step to toggle isolation of a random participant.
    pub partition_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_steps: 2,
            drop_rate_percent: 5,
            duplicate_rate_percent: 3,
            reorder_rate_percent: 5,
            partition_rate_percent: 2,
        }
    }
}

impl FaultConfig {
    /// No faults at all: every send arrives on the next delivery.
    #[must_use]
    pub const fn reliable() -> Self {
        Self {
            max_delay_steps: 0,
            drop_rate_percent: 0,
            duplicate_rate_percent: 0,
            reorder_rate_percent: 0,
            partition_rate_percent: 0,
        }
    }
}

/// A node handle in flight between two participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkMessage {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub node: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingMessage {
    deliver_at_step: u64,
    message: NetworkMessage,
}

/// Result of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub dropped: bool,
    pub duplicated: bool,
    pub delay_steps: u8,
}

impl SendOutcome {
    const DROPPED: Self = Self {
        dropped: true,
        duplicated: false,
        delay_steps: 0,
    };
}

/// Messages delivered in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverOutcome {
    pub delivered: Vec<NetworkMessage>,
    pub reordered: bool,
}

/// Deterministic fault-injecting gossip network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedNetwork {
    pending: Vec<PendingMessage>,
    isolated: BTreeSet<ParticipantId>,
    fault: FaultConfig,
}

impl SimulatedNetwork {
    #[must_use]
    pub const fn new(fault: FaultConfig) -> Self {
        Self {
            pending: Vec::new(),
            isolated: BTreeSet::new(),
            fault,
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    /// Isolate or reconnect a participant.
    pub fn set_isolated(&mut self, participant: ParticipantId, isolated: bool) {
        if isolated {
            self.isolated.insert(participant);
        } else {
            self.isolated.remove(&participant);
        }
    }

    #[must_use]
    pub fn is_isolated(&self, participant: ParticipantId) -> bool {
        self.isolated.contains(&participant)
    }

    /// Reconnect every participant.
    pub fn heal(&mut self) {
        self.isolated.clear();
    }

    /// With the configured probability, toggle isolation of one random
    /// participant among `participants`. Returns the toggled participant.
    pub fn maybe_toggle_partition(
        &mut self,
        participants: usize,
        rng: &mut DeterministicRng,
    ) -> Option<ParticipantId> {
        if participants == 0 || !rng.hit_rate_percent(self.fault.partition_rate_percent) {
            return None;
        }
        let participant = rng.next_index(participants);
        let isolated = !self.is_isolated(participant);
        self.set_isolated(participant, isolated);
        Some(participant)
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queue `message` for delivery, applying drop, delay and duplication.
    #[must_use]
    pub fn send(
        &mut self,
        message: NetworkMessage,
        step: u64,
        rng: &mut DeterministicRng,
    ) -> SendOutcome {
        if self.is_isolated(message.from) || self.is_isolated(message.to) {
            return SendOutcome::DROPPED;
        }
        if rng.hit_rate_percent(self.fault.drop_rate_percent) {
            return SendOutcome::DROPPED;
        }

        let delay_bound = u64::from(self.fault.max_delay_steps).saturating_add(1);
        let delay = u8::try_from(rng.next_bounded(delay_bound)).unwrap_or(self.fault.max_delay_steps);
        let pending = PendingMessage {
            deliver_at_step: step.saturating_add(u64::from(delay)),
            message,
        };
        self.pending.push(pending);

        let duplicated = rng.hit_rate_percent(self.fault.duplicate_rate_percent);
        if duplicated {
            self.pending.push(pending);
        }

        SendOutcome {
            dropped: false,
            duplicated,
            delay_steps: delay,
        }
    }

    /// Deliver every message due at or before `step`.
    #[must_use]
    pub fn deliver_ready(&mut self, step: u64, rng: &mut DeterministicRng) -> DeliverOutcome {
        let (ready, future): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|pending| pending.deliver_at_step <= step);
        self.pending = future;

        let mut delivered: Vec<NetworkMessage> = ready.into_iter().map(|p| p.message).collect();
        let reordered = delivered.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent);
        if reordered {
            rng.shuffle(&mut delivered);
        }

        DeliverOutcome {
            delivered,
            reordered,
        }
    }

    /// Deliver everything still in flight, ignoring delays.
    #[must_use]
    pub fn drain(&mut self) -> Vec<NetworkMessage> {
        self.pending.drain(..).map(|p| p.message).collect()
    }
}
