//! Common error infrastructure for combat-core.
//!
//! Every failure in this crate is a *rejection*: the request is refused and no
//! state changes. [`CombatError`] is the shared taxonomy; the ability module adds
//! the compact [`CastFailReason`](crate::ability::CastFailReason) that travels on
//! the wire and converts into it.
//!
//! # Design Principles
//!
//! - **Rejections, not crashes**: callers receive an error value and state is untouched
//! - **Severity Classification**: errors are categorized for logging and recovery
//! - **Rich Context**: actor, ability and prediction id are attached where known

use crate::ids::{AbilityId, ActorId, PredictionId};

/// Severity level of an error, used for categorization and recovery strategies.
///
/// - **Recoverable**: temporary conditions that may succeed later (cooldowns, costs)
/// - **Validation**: invalid input that should be rejected without retry
/// - **Internal**: unexpected state inconsistencies that require investigation
/// - **Fatal**: unrecoverable errors indicating corrupted combat state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Recoverable error - can retry with same or alternative action.
    ///
    /// Examples: ability on cooldown, resource not affordable
    Recoverable,

    /// Validation error - invalid input, should not retry without changes.
    ///
    /// Examples: unknown ability, unknown token class
    Validation,

    /// Internal error - unexpected state inconsistency.
    Internal,

    /// Fatal error - combat state corrupted, cannot continue.
    Fatal,
}

impl ErrorSeverity {
    /// Returns a human-readable description of this severity level.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Validation => "validation",
            Self::Internal => "internal",
            Self::Fatal => "fatal",
        }
    }

    /// Returns true if this error is potentially recoverable.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    /// Returns true if this error indicates an internal bug.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal | Self::Fatal)
    }
}

/// Contextual information attached to errors for debugging and diagnostics.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorContext {
    /// Actor whose request was rejected (if applicable).
    pub actor: Option<ActorId>,

    /// Ability class involved (if applicable).
    pub ability: Option<AbilityId>,

    /// Prediction the rejection correlates with (if applicable).
    pub prediction_id: Option<PredictionId>,

    /// Simulation time of the rejection in seconds.
    pub time: f32,

    /// Optional static message providing additional context.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub message: Option<&'static str>,
}

impl ErrorContext {
    /// Creates a new error context stamped with the given time.
    #[must_use]
    pub const fn new(time: f32) -> Self {
        Self {
            actor: None,
            ability: None,
            prediction_id: None,
            time,
            message: None,
        }
    }

    /// Attaches an actor to this context (builder pattern).
    #[must_use]
    pub const fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Attaches an ability class to this context (builder pattern).
    #[must_use]
    pub const fn with_ability(mut self, ability: AbilityId) -> Self {
        self.ability = Some(ability);
        self
    }

    /// Attaches a prediction id to this context (builder pattern).
    #[must_use]
    pub const fn with_prediction(mut self, prediction_id: PredictionId) -> Self {
        self.prediction_id = Some(prediction_id);
        self
    }

    /// Attaches a static message to this context (builder pattern).
    #[must_use]
    pub const fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }
}

/// Common trait for all combat-core errors.
///
/// - All error enums implement this trait
/// - Use `#[derive(thiserror::Error)]` for Display/Error impl
/// - Classify severity based on recoverability, not impact
pub trait GameError: core::fmt::Display + core::fmt::Debug {
    /// Returns the severity level of this error.
    fn severity(&self) -> ErrorSeverity;

    /// Returns the context information for this error, if available.
    fn context(&self) -> Option<&ErrorContext> {
        None
    }

    /// Returns a static string identifier for this error variant.
    fn error_code(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

/// Rejection taxonomy shared by abilities, threat and the token pool.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CombatError {
    /// Unknown or malformed reference (caller bug, logged and dropped).
    #[error("invalid input: {what}")]
    InvalidInput { what: &'static str },

    /// A resource cost cannot be paid.
    #[error("resource cost not affordable")]
    NotAffordable,

    /// A single-charge ability is cooling down.
    #[error("ability is on cooldown")]
    OnCooldown,

    /// A multi-charge ability has fewer charges than it costs.
    #[error("not enough charges")]
    NoCharges,

    /// The global cooldown is still running.
    #[error("global cooldown active")]
    OnGlobalCooldown,

    /// An active effect blocks the action by tag.
    #[error("blocked by tag restriction")]
    TagRestricted,

    /// Conflicting state, e.g. already casting or reservation already held.
    #[error("conflicting action already active")]
    AlreadyActive,

    /// The NPC ability token pool has nothing to hand out.
    #[error("no ability token available")]
    TokenUnavailable,

    /// A registered veto predicate rejected the action.
    #[error("vetoed by restriction")]
    Restricted,

    /// The acting combatant is dead.
    #[error("actor is dead")]
    Dead,

    /// The acting combatant is under a blocking crowd control.
    #[error("actor is crowd controlled")]
    CrowdControlled,

    /// Cancel or interrupt with no cast in progress.
    #[error("no cast in progress")]
    NotCasting,

    /// A channel tick never received its client parameters.
    #[error("channel tick {tick} dropped")]
    DroppedTick { tick: u32 },

    /// A message for an already superseded prediction id.
    #[error("stale message for {prediction_id}")]
    Stale { prediction_id: PredictionId },
}

impl GameError for CombatError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidInput { .. } => ErrorSeverity::Validation,
            _ => ErrorSeverity::Recoverable,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::NotAffordable => "NOT_AFFORDABLE",
            Self::OnCooldown => "ON_COOLDOWN",
            Self::NoCharges => "NO_CHARGES",
            Self::OnGlobalCooldown => "ON_GLOBAL_COOLDOWN",
            Self::TagRestricted => "TAG_RESTRICTED",
            Self::AlreadyActive => "ALREADY_ACTIVE",
            Self::TokenUnavailable => "TOKEN_UNAVAILABLE",
            Self::Restricted => "RESTRICTED",
            Self::Dead => "DEAD",
            Self::CrowdControlled => "CROWD_CONTROLLED",
            Self::NotCasting => "NOT_CASTING",
            Self::DroppedTick { .. } => "DROPPED_TICK",
            Self::Stale { .. } => "STALE",
        }
    }
}

/// Convenience alias for fallible combat operations.
pub type CombatResult<T> = Result<T, CombatError>;
