//! Modifier value engine.
//!
//! A [`CombatModifier`] is a single additive or multiplicative adjustment,
//! optionally scaled by the stack count of the buff that applied it.
//! [`ModifiableValue`] owns a base value plus a set of modifiers and keeps a
//! derived current value up to date.
//!
//! Calculation order:
//! 1. Sum additive modifiers (each scaled by stacks when stackable)
//! 2. Floor `base + additive` at 0
//! 3. Multiply by every multiplicative factor, where N stacks of `1 + delta`
//!    contribute `max(0, 1 + N * delta)`
//! 4. Floor the result at 0, then apply the value's optional min/max clamp
//!
//! # Example
//! ```
//! # use combat_core::modifier::{CombatModifier, apply_modifiers};
//! let mods = [
//!     CombatModifier::additive(5.0),
//!     CombatModifier::multiplicative(0.95),
//!     CombatModifier::multiplicative(1.10),
//! ];
//! // (10 + 5) × 0.95 × 1.10
//! let value = apply_modifiers(&mods, 10.0);
//! assert!((value - 15.675).abs() < 1e-4);
//! ```

mod providers;
mod value;

pub use providers::ModifierProviders;
pub use value::{
    CustomCombine, ModValue, ModifiableFloat, ModifiableInt, ModifiableValue, ValueChange,
};

use std::sync::{Arc, Weak};

use crate::buff::StackSource;

/// How a modifier combines with the base value.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ModifierKind {
    /// Never applied.
    #[default]
    Invalid,
    /// Added to the base value.
    Additive,
    /// Multiplies the value; stored as `1.0 + delta`.
    Multiplicative,
}

/// A single adjustment to a modifiable value.
#[derive(Clone, Debug, Default)]
pub struct CombatModifier {
    pub value: f32,
    pub kind: ModifierKind,
    /// Multiply the effect by the source's stack count.
    pub stackable: bool,
    source: Option<Weak<dyn StackSource>>,
}

impl CombatModifier {
    pub const fn additive(value: f32) -> Self {
        Self {
            value,
            kind: ModifierKind::Additive,
            stackable: false,
            source: None,
        }
    }

    /// `factor` is the full multiplier: 0.95 is a 5% reduction.
    pub const fn multiplicative(factor: f32) -> Self {
        Self {
            value: factor,
            kind: ModifierKind::Multiplicative,
            stackable: false,
            source: None,
        }
    }

    pub const fn invalid() -> Self {
        Self {
            value: 0.0,
            kind: ModifierKind::Invalid,
            stackable: false,
            source: None,
        }
    }

    /// Attaches a buff whose stack count scales this modifier.
    #[must_use]
    pub fn with_source<S: StackSource + 'static>(mut self, source: &Arc<S>, stackable: bool) -> Self {
        let source: Arc<dyn StackSource> = source.clone();
        self.source = Some(Arc::downgrade(&source));
        self.stackable = stackable;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.kind != ModifierKind::Invalid
    }

    /// Stack multiplier: the source's stacks when stackable and alive, otherwise 1.
    pub fn stack_count(&self) -> f32 {
        if !self.stackable {
            return 1.0;
        }
        match self.source.as_ref().and_then(Weak::upgrade) {
            Some(source) => source.current_stacks() as f32,
            None => 1.0,
        }
    }
}

/// Combines `modifiers` with `base` using the default algorithm.
pub fn apply_modifiers<'a>(
    modifiers: impl IntoIterator<Item = &'a CombatModifier>,
    base: f32,
) -> f32 {
    let mut additive = 0.0_f32;
    let mut multiplier = 1.0_f32;
    for modifier in modifiers {
        match modifier.kind {
            ModifierKind::Invalid => {}
            ModifierKind::Additive => additive += modifier.value * modifier.stack_count(),
            ModifierKind::Multiplicative => {
                let scaled = modifier.stack_count() * (modifier.value - 1.0) + 1.0;
                multiplier *= scaled.max(0.0);
            }
        }
    }
    ((base + additive).max(0.0) * multiplier).max(0.0)
}
