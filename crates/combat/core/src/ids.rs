//! Identifier newtypes shared by every combat subsystem.
//!
//! All identifiers are small `Copy` values so they can be used as map keys,
//! carried inside protocol messages and compared without allocation.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident($inner:ty), $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(
    /// Unique identifier of a combatant in the simulation.
    ActorId(u32),
    "actor"
);
id_newtype!(
    /// Identifier of an ability class (shared by every instance of the ability).
    AbilityId(u32),
    "ability"
);
id_newtype!(
    /// Identifier of a buff instance that sources modifiers or control effects.
    BuffId(u32),
    "buff"
);
id_newtype!(
    /// Identifier of a resource pool (mana, energy, ammo, ...).
    ResourceId(u16),
    "resource"
);
id_newtype!(
    /// Caller-chosen key for an observer subscription.
    ListenerId(u64),
    "listener"
);

/// Client-assigned correlation id for one predicted action.
///
/// Ids are generated per predicting actor, strictly increase and are never
/// zero. [`PredictionId::NONE`] marks state that was produced by the server
/// without any client prediction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PredictionId(pub u32);

impl PredictionId {
    /// Server-originated, unpredicted state.
    pub const NONE: Self = Self(0);

    /// Returns true when this id was issued by a predicting client.
    #[inline]
    pub const fn is_predicted(self) -> bool {
        self.0 != 0
    }

    /// Returns the id following this one. Wraps past `u32::MAX` to 1, never 0.
    #[must_use]
    pub const fn next(self) -> Self {
        match self.0.checked_add(1) {
            Some(value) => Self(value),
            None => Self(1),
        }
    }
}

impl fmt::Display for PredictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prediction#{}", self.0)
    }
}

/// A single server-validated unit of client-predicted work.
///
/// Tick 0 is the activation itself; channel casts number their ticks from 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PredictedTick {
    pub prediction_id: PredictionId,
    pub tick: u32,
}

impl PredictedTick {
    pub const fn new(prediction_id: PredictionId, tick: u32) -> Self {
        Self {
            prediction_id,
            tick,
        }
    }
}

/// Opaque handle returned when a modifier is attached to a modifiable value.
///
/// Handles come from a process-wide counter so they never collide between
/// values; the zero handle is invalid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModifierHandle(u64);

static NEXT_MODIFIER_HANDLE: AtomicU64 = AtomicU64::new(1);

impl ModifierHandle {
    /// The invalid handle, returned when nothing was attached.
    pub const INVALID: Self = Self(0);

    /// Allocates a fresh handle.
    pub fn allocate() -> Self {
        Self(NEXT_MODIFIER_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prediction_ids_never_wrap_to_zero() {
        assert_eq!(PredictionId(u32::MAX).next(), PredictionId(1));
        assert_eq!(PredictionId::NONE.next(), PredictionId(1));
        assert!(!PredictionId::NONE.is_predicted());
    }

    #[test]
    fn modifier_handles_are_unique_and_valid() {
        let a = ModifierHandle::allocate();
        let b = ModifierHandle::allocate();
        assert_ne!(a, b);
        assert!(a.is_valid() && b.is_valid());
        assert!(!ModifierHandle::INVALID.is_valid());
    }

    #[test]
    fn predicted_ticks_compare_structurally() {
        let a = PredictedTick::new(PredictionId(3), 1);
        assert_eq!(a, PredictedTick::new(PredictionId(3), 1));
        assert_ne!(a, PredictedTick::new(PredictionId(3), 2));
    }
}
