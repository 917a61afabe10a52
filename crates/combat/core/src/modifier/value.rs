//! Base value + modifier set with a cached, clamped current value.

use std::collections::BTreeMap;

use tracing::trace;

use super::{CombatModifier, apply_modifiers};
use crate::ids::{ListenerId, ModifierHandle};
use crate::observer::Observers;

/// Numeric types a [`ModifiableValue`] can hold. Integers are combined as floats
/// and truncated back.
pub trait ModValue: Copy + PartialOrd + core::fmt::Debug + Send + 'static {
    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

impl ModValue for f32 {
    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }
}

impl ModValue for i32 {
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value as i32
    }
}

/// Replacement for the default combine step. Receives every attached modifier
/// and the base value.
pub type CustomCombine<T> = Box<dyn Fn(&[CombatModifier], T) -> T + Send + Sync>;

/// Notification sent when a recalculation changes the current value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValueChange<T> {
    pub previous: T,
    pub current: T,
}

/// A value derived from a base and a set of modifiers.
///
/// The current value is recomputed on every mutation and observers are told
/// only when the number actually changed.
pub struct ModifiableValue<T: ModValue> {
    base: T,
    current: T,
    modifiable: bool,
    min: Option<T>,
    max: Option<T>,
    modifiers: BTreeMap<ModifierHandle, CombatModifier>,
    custom: Option<CustomCombine<T>>,
    observers: Observers<ValueChange<T>>,
}

pub type ModifiableFloat = ModifiableValue<f32>;
pub type ModifiableInt = ModifiableValue<i32>;

impl<T: ModValue> ModifiableValue<T> {
    pub fn new(base: T) -> Self {
        Self {
            base,
            current: base,
            modifiable: true,
            min: None,
            max: None,
            modifiers: BTreeMap::new(),
            custom: None,
            observers: Observers::new(),
        }
    }

    /// A value that ignores modifiers entirely.
    pub fn fixed(base: T) -> Self {
        let mut value = Self::new(base);
        value.modifiable = false;
        value
    }

    /// Sets clamp bounds, clamping the base as well.
    #[must_use]
    pub fn with_bounds(mut self, min: Option<T>, max: Option<T>) -> Self {
        self.min = min;
        self.max = max;
        self.base = self.clamp(self.base);
        self.current = self.compute();
        self
    }

    #[must_use]
    pub fn with_custom_combine(mut self, combine: CustomCombine<T>) -> Self {
        self.custom = Some(combine);
        self.current = self.compute();
        self
    }

    pub fn value(&self) -> T {
        self.current
    }

    pub fn base(&self) -> T {
        self.base
    }

    pub fn is_modifiable(&self) -> bool {
        self.modifiable
    }

    pub fn modifier_count(&self) -> usize {
        self.modifiers.len()
    }

    pub fn set_base(&mut self, base: T) -> Option<ValueChange<T>> {
        self.base = self.clamp(base);
        self.recalculate()
    }

    /// Replaces or clears the custom combine function.
    pub fn set_custom_combine(&mut self, combine: Option<CustomCombine<T>>) -> Option<ValueChange<T>> {
        self.custom = combine;
        self.recalculate()
    }

    /// Attaches a modifier. Invalid modifiers, and any modifier on a fixed value,
    /// return [`ModifierHandle::INVALID`] without touching the value.
    pub fn add_modifier(&mut self, modifier: CombatModifier) -> ModifierHandle {
        let handle = self.insert(modifier);
        if handle.is_valid() {
            self.recalculate();
        }
        handle
    }

    /// Attaches several modifiers with a single recalculation.
    pub fn add_modifiers(
        &mut self,
        modifiers: impl IntoIterator<Item = CombatModifier>,
    ) -> Vec<ModifierHandle> {
        let handles: Vec<_> = modifiers.into_iter().map(|m| self.insert(m)).collect();
        if handles.iter().any(|h| h.is_valid()) {
            self.recalculate();
        }
        handles
    }

    fn insert(&mut self, modifier: CombatModifier) -> ModifierHandle {
        if !self.modifiable || !modifier.is_valid() {
            return ModifierHandle::INVALID;
        }
        let handle = ModifierHandle::allocate();
        self.modifiers.insert(handle, modifier);
        handle
    }

    /// Detaches a modifier. Returns false if the handle was unknown.
    pub fn remove_modifier(&mut self, handle: ModifierHandle) -> bool {
        if self.modifiers.remove(&handle).is_none() {
            return false;
        }
        self.recalculate();
        true
    }

    /// Replaces the modifier behind `handle`. Updating to an invalid modifier
    /// is rejected; remove the handle instead.
    pub fn update_modifier(&mut self, handle: ModifierHandle, modifier: CombatModifier) -> bool {
        if !modifier.is_valid() {
            return false;
        }
        match self.modifiers.get_mut(&handle) {
            Some(slot) => {
                *slot = modifier;
                self.recalculate();
                true
            }
            None => false,
        }
    }

    /// Recomputes the current value and notifies observers if it changed.
    ///
    /// Call this after the stack count of a modifier source changes.
    pub fn recalculate(&mut self) -> Option<ValueChange<T>> {
        let previous = self.current;
        self.current = self.compute();
        if self.current == previous {
            return None;
        }
        let change = ValueChange {
            previous,
            current: self.current,
        };
        trace!(
            target: "combat::modifier",
            previous = ?change.previous,
            current = ?change.current,
            "modifiable value changed"
        );
        self.observers.notify(&change);
        Some(change)
    }

    fn compute(&self) -> T {
        if !self.modifiable {
            return self.clamp(self.base);
        }
        let combined = match &self.custom {
            Some(combine) => {
                let modifiers: Vec<CombatModifier> = self.modifiers.values().cloned().collect();
                combine(&modifiers, self.base)
            }
            None => T::from_f32(apply_modifiers(self.modifiers.values(), self.base.to_f32())),
        };
        self.clamp(combined)
    }

    fn clamp(&self, mut value: T) -> T {
        if let Some(min) = self.min
            && value < min
        {
            value = min;
        }
        if let Some(max) = self.max
            && value > max
        {
            value = max;
        }
        value
    }

    pub fn subscribe(
        &mut self,
        id: ListenerId,
        callback: impl FnMut(&ValueChange<T>) + Send + 'static,
    ) -> bool {
        self.observers.subscribe(id, callback)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.observers.unsubscribe(id)
    }
}

impl<T: ModValue> core::fmt::Debug for ModifiableValue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModifiableValue")
            .field("base", &self.base)
            .field("current", &self.current)
            .field("modifiable", &self.modifiable)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("modifiers", &self.modifiers.len())
            .field("custom", &self.custom.is_some())
            .finish()
    }
}
