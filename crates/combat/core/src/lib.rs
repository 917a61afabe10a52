//! Deterministic combat rules shared by the server and predicting clients.
//!
//! `combat-core` owns the ability cast state machine, the modifier engine,
//! threat tables, the NPC token pool and the prediction protocol. It performs
//! no I/O: time is passed in explicitly and every timer lives in a
//! [`Scheduler`] that the caller advances. The runtime crate wires these types
//! into a simulation loop and a transport.
pub mod ability;
pub mod actor;
pub mod buff;
pub mod clock;
pub mod config;
pub mod error;
pub mod ids;
pub mod modifier;
pub mod observer;
pub mod prediction;
pub mod resource;
pub mod restriction;
pub mod scheduler;
pub mod threat;
pub mod tokens;

pub use ability::{
    AbilityBehavior, AbilityComponent, AbilityCooldown, AbilityDefinition, AbilityEvent,
    AbilityInstance, AbilityStat, CancelEvent, CancelFailReason, CastContext, CastFailReason,
    CastInfo, CastOutcome, CastRejection, CastType, CastingState, ChargeChange, ComponentRole,
    GlobalCooldown, InterruptEvent, InterruptFailReason, InterruptRequest, InterruptSource,
    TickEvent,
};
pub use actor::CombatActor;
pub use buff::{BuffStacks, StackSource};
pub use clock::{Clock, ClockSync, ManualClock};
pub use config::CombatConfig;
pub use error::{CombatError, CombatResult, ErrorContext, ErrorSeverity, GameError};
pub use ids::{AbilityId, ActorId, BuffId, ListenerId, PredictedTick, PredictionId, ResourceId};
pub use modifier::{CombatModifier, ModifiableFloat, ModifiableInt, ModifierKind, apply_modifiers};
pub use observer::Observers;
pub use prediction::{
    AbilitySnapshot, ClientUpdate, CombatParameters, NetMessage, NetRole, PredictionClient,
    PredictionServer, ServerAbilityResult, ServerUpdate, Transport,
};
pub use resource::{AbilityCost, ResourceHandler, ResourceState};
pub use restriction::{Restriction, RestrictionError, RestrictionList};
pub use scheduler::{Scheduler, TimerHandle};
pub use threat::{
    Faction, ThreatEvent, ThreatKind, ThreatProfile, ThreatRequest, ThreatRoster, ThreatTable,
    ThreatTarget,
};
pub use tokens::{AbilityTokenPool, TokenAvailabilityChanged, TokenHolder, TokenState};
