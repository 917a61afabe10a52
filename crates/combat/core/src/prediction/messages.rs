//! Messages exchanged between a predicting client and the server.
//!
//! Delivery order is not guaranteed and messages may arrive twice. Every
//! message that mutates state carries a prediction id so the receiver can
//! discard what it has already seen.

use super::{AbilitySnapshot, CombatParameters};
use crate::ability::{CastFailReason, CastInfo, CastOutcome};
use crate::ids::{AbilityId, PredictedTick, PredictionId};
use crate::resource::AbilityCost;

/// Authoritative answer to a successful activation.
///
/// Lengths are uncompensated so the client compares them directly against
/// its own guess.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerAbilityResult {
    pub prediction_id: PredictionId,
    pub ability: AbilityId,
    /// Client timestamp of the request, echoed back.
    pub client_time: f32,
    pub gcd: Option<f32>,
    pub charges_spent: i32,
    pub cast: Option<CastInfo>,
    pub costs: Vec<AbilityCost>,
}

impl ServerAbilityResult {
    pub fn from_outcome(outcome: &CastOutcome, client_time: f32) -> Self {
        Self {
            prediction_id: outcome.prediction_id,
            ability: outcome.ability,
            client_time,
            gcd: outcome.gcd,
            charges_spent: outcome.charges_spent,
            cast: outcome.cast,
            costs: outcome.costs.clone(),
        }
    }
}

/// Everything sent over the prediction protocol.
#[derive(Clone, Debug, PartialEq, strum::IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum NetMessage {
    /// Client → server. Tick 0 activates the ability, later ticks carry the
    /// parameters of a channel tick.
    AbilityRequest {
        ability: AbilityId,
        prediction_id: PredictionId,
        tick: u32,
        client_time: f32,
        params: CombatParameters,
    },
    /// Client → server. The caster stopped its channel.
    CancelRequest {
        prediction_id: PredictionId,
        client_time: f32,
        params: CombatParameters,
    },
    ServerAbilityResult(ServerAbilityResult),
    /// Server → owning client only.
    AbilityFailure {
        prediction_id: PredictionId,
        reason: CastFailReason,
    },
    /// Server → owning client. Parameters of a channel tick never arrived.
    TickDropped {
        ability: AbilityId,
        prediction_id: PredictionId,
        tick: u32,
    },
    Snapshot(AbilitySnapshot),
    Ping {
        client_time: f32,
    },
    Pong {
        client_time: f32,
        server_time: f32,
    },
}

impl NetMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Prediction the message correlates with, if any.
    pub fn prediction_id(&self) -> Option<PredictionId> {
        match self {
            Self::AbilityRequest { prediction_id, .. }
            | Self::CancelRequest { prediction_id, .. }
            | Self::AbilityFailure { prediction_id, .. }
            | Self::TickDropped { prediction_id, .. } => Some(*prediction_id),
            Self::ServerAbilityResult(result) => Some(result.prediction_id),
            Self::Snapshot(_) | Self::Ping { .. } | Self::Pong { .. } => None,
        }
    }

    pub fn tick_dropped(ability: AbilityId, tick: PredictedTick) -> Self {
        Self::TickDropped {
            ability,
            prediction_id: tick.prediction_id,
            tick: tick.tick,
        }
    }
}
