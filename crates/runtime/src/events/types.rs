//! Payloads carried by each event topic.

use combat_core::threat::TargetChange;
use combat_core::{AbilityEvent, ActorId, ServerUpdate};

/// Something an actor's ability component reported during a step.
#[derive(Debug, Clone, PartialEq)]
pub struct AbilityNotice {
    pub actor: ActorId,
    pub time: f32,
    pub event: AbilityEvent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThreatNotice {
    TargetChanged(TargetChange),
    CombatChanged { owner: ActorId, in_combat: bool },
}

impl ThreatNotice {
    pub fn owner(&self) -> ActorId {
        match self {
            Self::TargetChanged(change) => change.owner,
            Self::CombatChanged { owner, .. } => *owner,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredictionNotice {
    /// The server handled one message from `actor`'s client.
    Handled { actor: ActorId, update: ServerUpdate },
    /// A snapshot of `actor` went out.
    Replicated { actor: ActorId, version: u64 },
}
