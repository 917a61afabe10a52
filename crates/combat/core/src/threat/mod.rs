//! Threat (aggro) tracking and NPC target selection.
//!
//! Every actor that can be targeted carries a [`ThreatProfile`] describing its
//! outgoing side (faction, misdirects, fades, outgoing modifiers). Actors that
//! pick targets additionally own a [`ThreatTable`], an ordered list of
//! [`ThreatTarget`]s whose top entry is the current target.
//!
//! # Ordering
//!
//! 1. Blinded or faded entries sort below everything else
//! 2. Among the rest, fixated entries sort above non-fixated ones
//! 3. Ties are broken by raw threat, highest last
//!
//! Fixate, blind and fade only affect priority; they never change raw threat.

mod profile;
mod table;
mod target;

pub use profile::ThreatProfile;
pub use table::{TargetChange, ThreatTable};
pub use target::ThreatTarget;

use std::collections::HashMap;

use crate::ids::{AbilityId, ActorId, BuffId};
use crate::modifier::CombatModifier;

/// Allegiance used to reject threat between allies.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Faction {
    #[default]
    Neutral,
    Player,
    Enemy,
}

/// Origin category of a threat event.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ThreatKind {
    /// Threat generated by dealing damage.
    #[default]
    Damage,
    /// Threat generated by healing, scaled by the global healing modifier.
    Healing,
    /// Raw threat from taunts, transfers and scripted events.
    Absolute,
}

/// What generated a threat event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ThreatSource {
    Ability(AbilityId),
    Buff(BuffId),
}

/// Parameters of a threat application.
#[derive(Clone, Debug)]
pub struct ThreatRequest {
    pub kind: ThreatKind,
    pub base_amount: f32,
    pub applied_by: ActorId,
    pub source: Option<ThreatSource>,
    pub ignore_restrictions: bool,
    pub ignore_modifiers: bool,
    /// Extra outgoing modifier supplied by the source itself.
    pub source_modifier: Option<CombatModifier>,
}

impl ThreatRequest {
    pub fn new(kind: ThreatKind, base_amount: f32, applied_by: ActorId) -> Self {
        Self {
            kind,
            base_amount,
            applied_by,
            source: None,
            ignore_restrictions: false,
            ignore_modifiers: false,
            source_modifier: None,
        }
    }

    /// Raw threat that bypasses both modifiers and restrictions.
    pub fn absolute(base_amount: f32, applied_by: ActorId) -> Self {
        Self::new(ThreatKind::Absolute, base_amount, applied_by)
            .ignoring_modifiers()
            .ignoring_restrictions()
    }

    #[must_use]
    pub fn with_source(mut self, source: ThreatSource) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_source_modifier(mut self, modifier: CombatModifier) -> Self {
        self.source_modifier = Some(modifier);
        self
    }

    #[must_use]
    pub fn ignoring_modifiers(mut self) -> Self {
        self.ignore_modifiers = true;
        self
    }

    #[must_use]
    pub fn ignoring_restrictions(mut self) -> Self {
        self.ignore_restrictions = true;
        self
    }
}

/// Outcome of a threat application. Also the context handed to threat
/// modifiers and restrictions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ThreatEvent {
    pub success: bool,
    pub kind: ThreatKind,
    /// Actor credited with the threat (the misdirect target when one applies).
    pub applied_by: ActorId,
    /// Actor that actually generated the threat.
    pub generator: ActorId,
    /// Owner of the threat table.
    pub applied_to: ActorId,
    pub source: Option<ThreatSource>,
    pub threat: f32,
    /// True when this event added the entry to the table.
    pub initial_threat: bool,
}

/// Lookup of threat profiles by actor, used to resolve generators and
/// misdirect targets.
pub trait ThreatRoster {
    fn profile(&self, actor: ActorId) -> Option<&ThreatProfile>;
}

impl ThreatRoster for HashMap<ActorId, ThreatProfile> {
    fn profile(&self, actor: ActorId) -> Option<&ThreatProfile> {
        self.get(&actor)
    }
}
