//! Ability cast state machine.
//!
//! [`AbilityComponent`] tracks the global cooldown, per-ability charges and
//! cooldowns, and the active cast of one actor. The same type runs on the
//! server ([`ComponentRole::Authority`]) and on the owning client
//! ([`ComponentRole::Predicted`]), where it layers predictions over the last
//! replicated state.
//!
//! # Cast lifecycle
//!
//! ```text
//! Idle ──use──▶ Casting(Instant) ──same step──▶ Idle
//!   │
//!   └──use──▶ Casting(Channel, tick = N) ──complete / cancel / interrupt──▶ Idle
//! ```
//!
//! The global cooldown runs orthogonally to casting. All timers live in the
//! component's [`Scheduler`](crate::scheduler::Scheduler) and are driven by
//! [`AbilityComponent::advance`].

mod behavior;
mod cast;
mod component;
mod definition;
mod instance;
mod predicted;
mod state;

pub use behavior::{AbilityBehavior, NoopBehavior, TickContext};
pub use component::{AbilityComponent, ComponentRole, HandlerModifiers};
pub use definition::{AbilityDefinition, CastType, CrowdControl, FixedValues};
pub use instance::{AbilityInstance, AbilityStat};
pub use predicted::{PredictionRecord, Reconciliation};
pub use state::{AbilityCooldown, CastingState, ChargeChange, ChargeModification, GlobalCooldown};

use crate::error::{CombatError, ErrorContext, ErrorSeverity, GameError};
use crate::ids::{AbilityId, ActorId, BuffId, PredictedTick, PredictionId};
use crate::prediction::CombatParameters;
use crate::resource::AbilityCost;
use crate::tokens::AbilityTokenPool;

/// Why a use request was refused. Travels to the owning client on rejection.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::IntoStaticStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CastFailReason {
    InvalidAbility,
    Dead,
    CrowdControlled,
    OnGlobalCooldown,
    AlreadyCasting,
    OnCooldown,
    NoCharges,
    CostsUnaffordable,
    TagRestricted,
    /// NPC only: the shared token pool is exhausted.
    Token,
    CustomRestriction,
    /// The activation reached the server after a newer one from the same
    /// client and was refused unseen.
    Superseded,
}

impl CastFailReason {
    /// Text shown by the client error indicator.
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidAbility => "Unknown ability",
            Self::Dead => "You are dead",
            Self::CrowdControlled => "Can't do that while crowd controlled",
            Self::OnGlobalCooldown => "Not ready yet",
            Self::AlreadyCasting => "Already casting",
            Self::OnCooldown => "Ability is on cooldown",
            Self::NoCharges => "No charges remaining",
            Self::CostsUnaffordable => "Not enough resources",
            Self::TagRestricted => "Can't use that right now",
            Self::Token => "Ability unavailable",
            Self::CustomRestriction => "Can't use that right now",
            Self::Superseded => "Too late, try again",
        }
    }

    /// The error reported to misprediction observers for `prediction_id`.
    pub fn into_error(self, prediction_id: PredictionId) -> CombatError {
        match self {
            Self::Superseded => CombatError::Stale { prediction_id },
            other => other.into(),
        }
    }
}

impl From<CastFailReason> for CombatError {
    fn from(reason: CastFailReason) -> Self {
        match reason {
            CastFailReason::InvalidAbility => Self::InvalidInput { what: "ability" },
            CastFailReason::Dead => Self::Dead,
            CastFailReason::CrowdControlled => Self::CrowdControlled,
            CastFailReason::OnGlobalCooldown => Self::OnGlobalCooldown,
            CastFailReason::AlreadyCasting => Self::AlreadyActive,
            CastFailReason::OnCooldown => Self::OnCooldown,
            CastFailReason::NoCharges => Self::NoCharges,
            CastFailReason::CostsUnaffordable => Self::NotAffordable,
            CastFailReason::TagRestricted => Self::TagRestricted,
            CastFailReason::Token => Self::TokenUnavailable,
            CastFailReason::CustomRestriction => Self::Restricted,
            CastFailReason::Superseded => Self::Stale {
                prediction_id: PredictionId::NONE,
            },
        }
    }
}

/// A refused use request with the context it was refused in.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("cast rejected: {reason}")]
pub struct CastRejection {
    pub reason: CastFailReason,
    pub context: ErrorContext,
}

impl GameError for CastRejection {
    fn severity(&self) -> ErrorSeverity {
        match self.reason {
            CastFailReason::InvalidAbility => ErrorSeverity::Validation,
            _ => ErrorSeverity::Recoverable,
        }
    }

    fn context(&self) -> Option<&ErrorContext> {
        Some(&self.context)
    }

    fn error_code(&self) -> &'static str {
        self.reason.into()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum CancelFailReason {
    NotCasting,
    /// The cancel names a cast other than the active one.
    WrongPrediction,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum InterruptFailReason {
    NotCasting,
    NotInterruptible,
    Restricted,
}

/// Inputs of a use request that are not part of the ability itself.
pub struct CastContext<'a> {
    pub now: f32,
    /// [`PredictionId::NONE`] for unpredicted (NPC or server-driven) casts.
    pub prediction_id: PredictionId,
    /// Requested shortening of timers to hide latency. Clamped by the config.
    pub ping_compensation: f32,
    /// Client parameters of tick 0.
    pub params: CombatParameters,
    pub tokens: Option<&'a mut AbilityTokenPool>,
}

impl<'a> CastContext<'a> {
    pub fn new(now: f32) -> Self {
        Self {
            now,
            prediction_id: PredictionId::NONE,
            ping_compensation: 0.0,
            params: CombatParameters::new(),
            tokens: None,
        }
    }

    #[must_use]
    pub fn predicted(mut self, prediction_id: PredictionId, ping_compensation: f32) -> Self {
        self.prediction_id = prediction_id;
        self.ping_compensation = ping_compensation;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: CombatParameters) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_tokens(mut self, tokens: &'a mut AbilityTokenPool) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

/// Authoritative length and interruptibility of a channel cast.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CastInfo {
    pub length: f32,
    pub interruptible: bool,
}

/// Result of a successful authoritative use.
///
/// Lengths are reported before ping compensation, so they compare directly
/// against the client's own prediction.
#[derive(Clone, Debug, PartialEq)]
pub struct CastOutcome {
    pub ability: AbilityId,
    pub prediction_id: PredictionId,
    pub gcd: Option<f32>,
    pub charges_spent: i32,
    pub cast: Option<CastInfo>,
    pub costs: Vec<AbilityCost>,
}

/// Who or what stopped a cast early.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterruptSource {
    #[default]
    Unknown,
    Ability(AbilityId),
    Buff(BuffId),
    Death,
    CrowdControl,
}

/// Parameters of an interrupt attempt.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InterruptRequest {
    pub applied_by: Option<ActorId>,
    pub source: InterruptSource,
    pub ignore_restrictions: bool,
}

impl InterruptRequest {
    pub fn new(applied_by: Option<ActorId>, source: InterruptSource) -> Self {
        Self {
            applied_by,
            source,
            ignore_restrictions: false,
        }
    }

    #[must_use]
    pub fn ignoring_restrictions(mut self) -> Self {
        self.ignore_restrictions = true;
        self
    }
}

/// A cast stopped by something other than its caster.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterruptEvent {
    pub target: ActorId,
    pub applied_by: Option<ActorId>,
    pub source: InterruptSource,
    pub ability: AbilityId,
    pub prediction_id: PredictionId,
    pub time: f32,
    pub elapsed_ticks: u32,
}

/// A cast stopped by its own caster.
#[derive(Clone, Debug, PartialEq)]
pub struct CancelEvent {
    pub ability: AbilityId,
    pub prediction_id: PredictionId,
    pub time: f32,
    pub elapsed_ticks: u32,
    pub params: CombatParameters,
}

/// One resolved tick of a cast.
#[derive(Clone, Debug, PartialEq)]
pub struct TickEvent {
    pub ability: AbilityId,
    pub prediction_id: PredictionId,
    pub tick: u32,
    pub params: CombatParameters,
}

impl TickEvent {
    pub fn predicted_tick(&self) -> PredictedTick {
        PredictedTick::new(self.prediction_id, self.tick)
    }
}

/// Everything an [`AbilityComponent`] reports to observers.
#[derive(Clone, Debug, PartialEq)]
pub enum AbilityEvent {
    AbilityAdded(AbilityId),
    AbilityRemoved(AbilityId),
    GlobalCooldownChanged {
        previous: GlobalCooldown,
        current: GlobalCooldown,
    },
    CastingChanged {
        previous: CastingState,
        current: CastingState,
    },
    ChargesChanged(ChargeChange),
    /// Client: a tick ran locally. Its parameters go to the server.
    PredictedTick(TickEvent),
    /// Server: a tick ran authoritatively with its broadcast parameters.
    ServerTick(TickEvent),
    /// Server: a predicted tick fired but its client parameters have not arrived.
    TickAwaitingParams {
        ability: AbilityId,
        tick: PredictedTick,
    },
    TickDropped {
        ability: AbilityId,
        tick: PredictedTick,
    },
    CastCompleted {
        ability: AbilityId,
        prediction_id: PredictionId,
    },
    CastCancelled(CancelEvent),
    CastInterrupted(InterruptEvent),
    /// Client: local effects of a prediction were rolled back.
    Mispredicted {
        ability: AbilityId,
        prediction_id: PredictionId,
        reason: CombatError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_reasons_map_onto_the_error_taxonomy() {
        assert_eq!(
            CombatError::from(CastFailReason::AlreadyCasting),
            CombatError::AlreadyActive
        );
        assert_eq!(
            CombatError::from(CastFailReason::Token),
            CombatError::TokenUnavailable
        );
        assert_eq!(
            CombatError::from(CastFailReason::InvalidAbility),
            CombatError::InvalidInput { what: "ability" }
        );
        assert_eq!(
            CastFailReason::Superseded.into_error(PredictionId(4)),
            CombatError::Stale {
                prediction_id: PredictionId(4)
            }
        );
    }

    #[test]
    fn rejection_reports_reason_as_error_code() {
        let rejection = CastRejection {
            reason: CastFailReason::NoCharges,
            context: ErrorContext::new(1.0).with_ability(AbilityId(3)),
        };
        assert_eq!(rejection.error_code(), "no_charges");
        assert!(rejection.severity().is_recoverable());
        assert_eq!(rejection.context().and_then(|c| c.ability), Some(AbilityId(3)));
    }

    #[test]
    fn fail_reasons_parse_case_insensitively() {
        assert_eq!("ON_COOLDOWN".parse::<CastFailReason>(), Ok(CastFailReason::OnCooldown));
        assert_eq!(CastFailReason::CostsUnaffordable.to_string(), "costs_unaffordable");
    }
}
