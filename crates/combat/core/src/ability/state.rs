//! Replicated cooldown and cast state records.

use crate::ids::{AbilityId, PredictionId};

/// Charge and cooldown record of one ability.
///
/// `prediction_id` is the last prediction that mutated the record. A server
/// update carrying an id at or below it is stale.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilityCooldown {
    pub current_charges: i32,
    pub on_cooldown: bool,
    pub cooldown_start: f32,
    pub cooldown_end: f32,
    pub prediction_id: PredictionId,
}

impl AbilityCooldown {
    pub fn full(charges: i32) -> Self {
        Self {
            current_charges: charges,
            ..Self::default()
        }
    }
}

/// Shared lockout after using any ability that triggers it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalCooldown {
    pub active: bool,
    pub prediction_id: PredictionId,
    pub start_time: f32,
    pub end_time: f32,
}

impl GlobalCooldown {
    pub fn length(&self) -> f32 {
        if self.active {
            (self.end_time - self.start_time).max(0.0)
        } else {
            0.0
        }
    }

    pub fn remaining(&self, now: f32) -> f32 {
        if self.active {
            (self.end_time - now).max(0.0)
        } else {
            0.0
        }
    }
}

/// Active cast of an actor. Idle when `ability` is `None`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CastingState {
    pub ability: Option<AbilityId>,
    pub prediction_id: PredictionId,
    pub cast_start: f32,
    pub cast_end: f32,
    pub interruptible: bool,
    pub elapsed_ticks: u32,
}

impl CastingState {
    pub fn is_casting(&self) -> bool {
        self.ability.is_some()
    }

    pub fn length(&self) -> f32 {
        if self.is_casting() {
            (self.cast_end - self.cast_start).max(0.0)
        } else {
            0.0
        }
    }

    pub fn remaining(&self, now: f32) -> f32 {
        if self.is_casting() {
            (self.cast_end - now).max(0.0)
        } else {
            0.0
        }
    }
}

/// How [`super::AbilityComponent::modify_charges`] applies its amount.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ChargeModification {
    #[default]
    Additive,
    Override,
}

/// Charges of an ability changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChargeChange {
    pub ability: AbilityId,
    pub previous: i32,
    pub current: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_states_report_zero_lengths() {
        let gcd = GlobalCooldown::default();
        assert_eq!(gcd.length(), 0.0);
        assert_eq!(gcd.remaining(10.0), 0.0);
        let cast = CastingState::default();
        assert!(!cast.is_casting());
        assert_eq!(cast.remaining(1.0), 0.0);
    }

    #[test]
    fn remaining_counts_down() {
        let cast = CastingState {
            ability: Some(AbilityId(1)),
            cast_start: 1.0,
            cast_end: 4.0,
            ..CastingState::default()
        };
        assert_eq!(cast.length(), 3.0);
        assert_eq!(cast.remaining(2.5), 1.5);
        assert_eq!(cast.remaining(9.0), 0.0);
    }
}
