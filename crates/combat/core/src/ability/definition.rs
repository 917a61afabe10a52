use arrayvec::ArrayVec;
use tracing::warn;

use crate::config::CombatConfig;
use crate::error::{CombatError, CombatResult};
use crate::ids::{AbilityId, ResourceId};
use crate::resource::AbilityCost;

/// How an ability resolves once activated.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum CastType {
    /// Resolves in a single tick on activation.
    #[default]
    Instant,
    /// Persists over several ticks spread across the cast length.
    Channel,
}

bitflags::bitflags! {
    /// Crowd control categories.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct CrowdControl: u8 {
        const STUN = 1 << 0;
        const INCAPACITATE = 1 << 1;
        const ROOT = 1 << 2;
        const SILENCE = 1 << 3;
        const DISARM = 1 << 4;
    }
}

bitflags::bitflags! {
    /// Values that ignore modifiers entirely.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct FixedValues: u8 {
        const GLOBAL_COOLDOWN = 1 << 0;
        const COOLDOWN = 1 << 1;
        const CAST_LENGTH = 1 << 2;
        const MAX_CHARGES = 1 << 3;
        const CHARGE_COST = 1 << 4;
        const CHARGES_PER_COOLDOWN = 1 << 5;
        const COSTS = 1 << 6;
    }
}

/// Static description of an ability class.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AbilityDefinition {
    pub id: AbilityId,
    pub name: String,
    pub cast_type: CastType,
    pub has_global_cooldown: bool,
    pub global_cooldown: f32,
    pub cooldown: f32,
    pub max_charges: i32,
    pub charge_cost: i32,
    pub charges_per_cooldown: i32,
    /// Channel only.
    pub cast_length: f32,
    /// Channel only. Ticks are spread evenly across the cast length.
    pub ticks: u32,
    /// Channel only. Fires tick 0 on activation.
    pub initial_tick: bool,
    pub interruptible: bool,
    pub castable_while_dead: bool,
    pub restricted_crowd_controls: CrowdControl,
    pub tags: Vec<String>,
    pub costs: ArrayVec<AbilityCost, { CombatConfig::MAX_ABILITY_COSTS }>,
    /// NPC only. Casting claims a token from the shared pool.
    pub requires_token: bool,
    pub fixed: FixedValues,
}

impl Default for AbilityDefinition {
    fn default() -> Self {
        Self {
            id: AbilityId::default(),
            name: String::new(),
            cast_type: CastType::Instant,
            has_global_cooldown: true,
            global_cooldown: 1.5,
            cooldown: 0.0,
            max_charges: 1,
            charge_cost: 1,
            charges_per_cooldown: 1,
            cast_length: 0.0,
            ticks: 1,
            initial_tick: false,
            interruptible: true,
            castable_while_dead: false,
            restricted_crowd_controls: CrowdControl::STUN
                | CrowdControl::INCAPACITATE
                | CrowdControl::SILENCE,
            tags: Vec::new(),
            costs: ArrayVec::new(),
            requires_token: false,
            fixed: FixedValues::empty(),
        }
    }
}

impl AbilityDefinition {
    pub fn instant(id: AbilityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn channel(id: AbilityId, name: impl Into<String>, cast_length: f32, ticks: u32) -> Self {
        Self {
            id,
            name: name.into(),
            cast_type: CastType::Channel,
            cast_length,
            ticks,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: f32) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_global_cooldown(mut self, length: f32) -> Self {
        self.has_global_cooldown = true;
        self.global_cooldown = length;
        self
    }

    #[must_use]
    pub fn without_global_cooldown(mut self) -> Self {
        self.has_global_cooldown = false;
        self
    }

    #[must_use]
    pub fn with_charges(mut self, max: i32, cost: i32, per_cooldown: i32) -> Self {
        self.max_charges = max;
        self.charge_cost = cost;
        self.charges_per_cooldown = per_cooldown;
        self
    }

    /// Adds a resource cost. Costs beyond the per-ability limit are ignored.
    #[must_use]
    pub fn with_cost(mut self, resource: ResourceId, amount: f32) -> Self {
        if self.costs.try_push(AbilityCost::new(resource, amount)).is_err() {
            warn!(
                target: "combat::ability",
                ability = %self.id,
                resource = %resource,
                "cost limit reached, extra cost ignored"
            );
        }
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn with_initial_tick(mut self) -> Self {
        self.initial_tick = true;
        self
    }

    #[must_use]
    pub fn with_restricted_crowd_controls(mut self, restricted: CrowdControl) -> Self {
        self.restricted_crowd_controls = restricted;
        self
    }

    #[must_use]
    pub fn with_fixed(mut self, fixed: FixedValues) -> Self {
        self.fixed = fixed;
        self
    }

    #[must_use]
    pub fn uninterruptible(mut self) -> Self {
        self.interruptible = false;
        self
    }

    #[must_use]
    pub fn castable_while_dead(mut self) -> Self {
        self.castable_while_dead = true;
        self
    }

    #[must_use]
    pub fn requiring_token(mut self) -> Self {
        self.requires_token = true;
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|own| own == tag)
    }

    /// Rejects definitions the cast state machine cannot run.
    pub fn validate(&self) -> CombatResult<()> {
        if self.max_charges < 1 || self.charge_cost < 0 || self.charges_per_cooldown < 0 {
            return Err(CombatError::InvalidInput { what: "ability charges" });
        }
        if self.cooldown < 0.0 || self.global_cooldown < 0.0 {
            return Err(CombatError::InvalidInput { what: "ability cooldown" });
        }
        if self.cast_type == CastType::Channel && (self.ticks == 0 || self.cast_length <= 0.0) {
            return Err(CombatError::InvalidInput { what: "channel cast" });
        }
        if self.costs.iter().any(|cost| cost.cost < 0.0) {
            return Err(CombatError::InvalidInput { what: "ability cost" });
        }
        Ok(())
    }
}
