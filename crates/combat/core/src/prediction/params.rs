//! Typed key/value parameters carried by ability ticks and cancels.

use crate::ids::{AbilityId, ActorId};

/// World-space vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Orientation in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotator {
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }
}

/// Value of a single combat parameter.
#[derive(Clone, Debug, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(name(ParamKind), derive(Hash, strum::Display))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    /// Reference to another combatant.
    Object(ActorId),
    /// Reference to an ability class.
    Class(AbilityId),
    Vector(Vec3),
    Rotator(Rotator),
    String(String),
}

/// A named parameter.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CombatParameter {
    pub name: String,
    pub value: ParamValue,
}

/// Ordered parameter list. Names need not be unique; lookups return the first match.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CombatParameters {
    params: Vec<CombatParameter>,
}

impl CombatParameters {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: ParamValue) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: ParamValue) {
        self.params.push(CombatParameter {
            name: name.into(),
            value,
        });
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|param| param.name == name)
            .map(|param| &param.value)
    }

    /// First parameter of the given kind, regardless of name.
    pub fn first_of(&self, kind: ParamKind) -> Option<&CombatParameter> {
        self.params
            .iter()
            .find(|param| ParamKind::from(&param.value) == kind)
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            ParamValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        match self.get(name)? {
            ParamValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn vector(&self, name: &str) -> Option<Vec3> {
        match self.get(name)? {
            ParamValue::Vector(value) => Some(*value),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CombatParameter> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_typed() {
        let params = CombatParameters::new()
            .with("aim", ParamValue::Vector(Vec3::new(1.0, 0.0, 0.0)))
            .with("power", ParamValue::Float(0.5))
            .with("target", ParamValue::Object(ActorId(3)));

        assert_eq!(params.vector("aim"), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(params.float("power"), Some(0.5));
        assert_eq!(params.float("aim"), None);
        assert_eq!(params.int("missing"), None);
        assert_eq!(
            params.first_of(ParamKind::Object).map(|p| p.name.as_str()),
            Some("target")
        );
    }

    #[test]
    fn first_match_wins_for_duplicate_names() {
        let mut params = CombatParameters::new();
        params.push("n", ParamValue::Int(1));
        params.push("n", ParamValue::Int(2));
        assert_eq!(params.int("n"), Some(1));
        assert_eq!(params.len(), 2);
        params.clear();
        assert!(params.is_empty());
    }
}
