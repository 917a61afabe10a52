use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::trace;

use super::component::{AbilityTimer, HandlerModifiers};
use super::{AbilityCooldown, AbilityDefinition, CastType, ChargeChange, ChargeModification, FixedValues};
use crate::config::CombatConfig;
use crate::error::{CombatError, CombatResult};
use crate::ids::{AbilityId, ModifierHandle, PredictionId, ResourceId};
use crate::modifier::{
    CombatModifier, CustomCombine, ModifiableFloat, ModifiableInt, apply_modifiers,
};
use crate::resource::AbilityCost;
use crate::scheduler::{Scheduler, TimerHandle};

pub(super) type SharedModifiers = Arc<RwLock<HandlerModifiers>>;

/// Modifiable value of an ability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AbilityStat {
    GlobalCooldown,
    Cooldown,
    CastLength,
    MaxCharges,
    ChargeCost,
    ChargesPerCooldown,
    Cost(ResourceId),
}

/// Merges ability-local modifiers with the handler-wide ones picked by `pick`.
fn handler_combine(
    definition: &Arc<AbilityDefinition>,
    handler: &SharedModifiers,
    pick: impl Fn(&HandlerModifiers, &AbilityDefinition) -> Vec<CombatModifier> + Send + Sync + 'static,
) -> CustomCombine<f32> {
    let definition = Arc::clone(definition);
    let handler = Arc::clone(handler);
    Box::new(move |local: &[CombatModifier], base: f32| {
        let mut modifiers = local.to_vec();
        if let Ok(handler) = handler.read() {
            modifiers.extend(pick(&handler, &definition));
        }
        apply_modifiers(&modifiers, base)
    })
}

fn float_value(base: f32, fixed: bool, min: f32) -> ModifiableFloat {
    let value = if fixed {
        ModifiableFloat::fixed(base)
    } else {
        ModifiableFloat::new(base)
    };
    value.with_bounds(Some(min), None)
}

fn int_value(base: i32, fixed: bool, min: i32) -> ModifiableInt {
    let value = if fixed {
        ModifiableInt::fixed(base)
    } else {
        ModifiableInt::new(base)
    };
    value.with_bounds(Some(min), None)
}

/// Runtime state of one ability owned by an actor.
///
/// Charges live in the replicated [`AbilityCooldown`] record. On a predicting
/// client, predicted spends are layered on top and [`AbilityInstance::charges`]
/// reports the predicted view.
pub struct AbilityInstance {
    definition: Arc<AbilityDefinition>,
    cooldown: AbilityCooldown,
    global_cooldown_length: ModifiableFloat,
    cooldown_length: ModifiableFloat,
    cast_length: ModifiableFloat,
    max_charges: ModifiableInt,
    charge_cost: ModifiableInt,
    charges_per_cooldown: ModifiableInt,
    costs: Vec<(ResourceId, ModifiableFloat)>,
    min_cooldown: f32,
    cooldown_timer: Option<TimerHandle>,
    predicted_spends: BTreeMap<PredictionId, i32>,
}

impl AbilityInstance {
    pub(super) fn new(
        definition: Arc<AbilityDefinition>,
        handler: &SharedModifiers,
        config: &CombatConfig,
    ) -> Self {
        let fixed = definition.fixed;

        let mut global_cooldown_length = float_value(
            definition.global_cooldown,
            fixed.contains(FixedValues::GLOBAL_COOLDOWN),
            config.min_global_cooldown,
        );
        let mut cooldown_length = float_value(
            definition.cooldown,
            fixed.contains(FixedValues::COOLDOWN),
            config.min_cooldown_length,
        );
        let mut cast_length = float_value(
            definition.cast_length,
            fixed.contains(FixedValues::CAST_LENGTH) || definition.cast_type != CastType::Channel,
            config.min_cast_length,
        );
        if global_cooldown_length.is_modifiable() {
            global_cooldown_length.set_custom_combine(Some(handler_combine(&definition, handler, |h, d| {
                h.global_cooldown.collect(d)
            })));
        }
        if cooldown_length.is_modifiable() {
            cooldown_length.set_custom_combine(Some(handler_combine(&definition, handler, |h, d| {
                h.cooldown.collect(d)
            })));
        }
        if cast_length.is_modifiable() {
            cast_length.set_custom_combine(Some(handler_combine(&definition, handler, |h, d| {
                h.cast_length.collect(d)
            })));
        }

        let costs = definition
            .costs
            .iter()
            .map(|cost| {
                let resource = cost.resource;
                let mut value = float_value(cost.cost, fixed.contains(FixedValues::COSTS), 0.0);
                if value.is_modifiable() {
                    value.set_custom_combine(Some(handler_combine(&definition, handler, move |h, d| {
                        h.costs
                            .get(&resource)
                            .map(|providers| providers.collect(d))
                            .unwrap_or_default()
                    })));
                }
                (resource, value)
            })
            .collect();

        let max_charges = int_value(
            definition.max_charges,
            fixed.contains(FixedValues::MAX_CHARGES),
            1,
        );
        let cooldown = AbilityCooldown::full(max_charges.value());

        Self {
            charge_cost: int_value(definition.charge_cost, fixed.contains(FixedValues::CHARGE_COST), 0),
            charges_per_cooldown: int_value(
                definition.charges_per_cooldown,
                fixed.contains(FixedValues::CHARGES_PER_COOLDOWN),
                0,
            ),
            definition,
            cooldown,
            global_cooldown_length,
            cooldown_length,
            cast_length,
            max_charges,
            costs,
            min_cooldown: config.min_cooldown_length,
            cooldown_timer: None,
            predicted_spends: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> AbilityId {
        self.definition.id
    }

    pub fn definition(&self) -> &AbilityDefinition {
        &self.definition
    }

    /// Replicated cooldown record, without predictions.
    pub fn cooldown(&self) -> AbilityCooldown {
        self.cooldown
    }

    /// Charges including pending predicted spends.
    pub fn charges(&self) -> i32 {
        let predicted: i32 = self.predicted_spends.values().sum();
        (self.cooldown.current_charges - predicted).max(0)
    }

    pub fn max_charges(&self) -> i32 {
        self.max_charges.value()
    }

    pub fn charge_cost(&self) -> i32 {
        self.charge_cost.value()
    }

    pub fn charges_per_cooldown(&self) -> i32 {
        self.charges_per_cooldown.value()
    }

    pub fn charges_met(&self) -> bool {
        self.charges() >= self.charge_cost()
    }

    pub fn is_on_cooldown(&self) -> bool {
        self.cooldown.on_cooldown
    }

    pub fn cooldown_remaining(&self, now: f32) -> f32 {
        if self.cooldown.on_cooldown {
            (self.cooldown.cooldown_end - now).max(0.0)
        } else {
            0.0
        }
    }

    pub fn global_cooldown_length(&self) -> f32 {
        self.global_cooldown_length.value()
    }

    pub fn cooldown_length(&self) -> f32 {
        self.cooldown_length.value()
    }

    /// Channel length after modifiers. Zero for instant abilities.
    pub fn cast_length(&self) -> f32 {
        match self.definition.cast_type {
            CastType::Instant => 0.0,
            CastType::Channel => self.cast_length.value(),
        }
    }

    pub fn costs(&self) -> Vec<AbilityCost> {
        self.costs
            .iter()
            .map(|(resource, value)| AbilityCost::new(*resource, value.value()))
            .collect()
    }

    pub fn cost(&self, resource: ResourceId) -> Option<f32> {
        self.costs
            .iter()
            .find(|(own, _)| *own == resource)
            .map(|(_, value)| value.value())
    }

    fn cost_mut(&mut self, resource: ResourceId) -> Option<&mut ModifiableFloat> {
        self.costs
            .iter_mut()
            .find(|(own, _)| *own == resource)
            .map(|(_, value)| value)
    }

    /// Attaches a local modifier. Returns [`ModifierHandle::INVALID`] for fixed
    /// values, unknown costs, and cast length on instant abilities.
    pub(super) fn add_modifier(&mut self, stat: AbilityStat, modifier: CombatModifier) -> ModifierHandle {
        match stat {
            AbilityStat::GlobalCooldown => self.global_cooldown_length.add_modifier(modifier),
            AbilityStat::Cooldown => self.cooldown_length.add_modifier(modifier),
            AbilityStat::CastLength if self.definition.cast_type == CastType::Channel => {
                self.cast_length.add_modifier(modifier)
            }
            AbilityStat::CastLength => ModifierHandle::INVALID,
            AbilityStat::MaxCharges => self.max_charges.add_modifier(modifier),
            AbilityStat::ChargeCost => self.charge_cost.add_modifier(modifier),
            AbilityStat::ChargesPerCooldown => self.charges_per_cooldown.add_modifier(modifier),
            AbilityStat::Cost(resource) => match self.cost_mut(resource) {
                Some(value) => value.add_modifier(modifier),
                None => ModifierHandle::INVALID,
            },
        }
    }

    pub(super) fn remove_modifier(&mut self, stat: AbilityStat, handle: ModifierHandle) -> bool {
        match stat {
            AbilityStat::GlobalCooldown => self.global_cooldown_length.remove_modifier(handle),
            AbilityStat::Cooldown => self.cooldown_length.remove_modifier(handle),
            AbilityStat::CastLength => self.cast_length.remove_modifier(handle),
            AbilityStat::MaxCharges => self.max_charges.remove_modifier(handle),
            AbilityStat::ChargeCost => self.charge_cost.remove_modifier(handle),
            AbilityStat::ChargesPerCooldown => self.charges_per_cooldown.remove_modifier(handle),
            AbilityStat::Cost(resource) => self
                .cost_mut(resource)
                .is_some_and(|value| value.remove_modifier(handle)),
        }
    }

    /// Picks up changed handler-wide modifiers.
    pub(super) fn recalculate_handler_values(&mut self) {
        self.global_cooldown_length.recalculate();
        self.cooldown_length.recalculate();
        self.cast_length.recalculate();
        for (_, value) in self.costs.iter_mut() {
            value.recalculate();
        }
    }

    fn charge_change(&self, previous: i32) -> Option<ChargeChange> {
        let current = self.charges();
        (previous != current).then_some(ChargeChange {
            ability: self.id(),
            previous,
            current,
        })
    }

    // ===== authoritative charge and cooldown flow =====

    /// Spends the charge cost and starts the cooldown if charges fell below max.
    pub(super) fn commit_charges(
        &mut self,
        prediction_id: PredictionId,
        compensation: f32,
        timers: &Scheduler<AbilityTimer>,
        now: f32,
    ) -> Option<ChargeChange> {
        let previous = self.charges();
        let max = self.max_charges();
        self.cooldown.current_charges = (self.cooldown.current_charges - self.charge_cost()).clamp(0, max);
        if prediction_id > self.cooldown.prediction_id {
            self.cooldown.prediction_id = prediction_id;
        }
        if !self.cooldown.on_cooldown && self.cooldown.current_charges < max {
            self.start_cooldown(compensation, timers, now);
        }
        self.charge_change(previous)
    }

    fn start_cooldown(&mut self, compensation: f32, timers: &Scheduler<AbilityTimer>, now: f32) {
        let length = (self.cooldown_length() - compensation).max(self.min_cooldown);
        self.cooldown.on_cooldown = true;
        self.cooldown.cooldown_start = now;
        self.cooldown.cooldown_end = now + length;
        let delay = (now + length - timers.now()).max(0.0);
        self.cooldown_timer = Some(timers.schedule(delay, AbilityTimer::CooldownEnd(self.id())));
        trace!(
            target: "combat::ability",
            ability = %self.id(),
            length,
            "cooldown started"
        );
    }

    fn cancel_cooldown(&mut self) {
        self.cooldown.on_cooldown = false;
        self.cooldown_timer = None;
    }

    /// Restores `charges_per_cooldown` charges and restarts while below max.
    pub(super) fn complete_cooldown(&mut self, timers: &Scheduler<AbilityTimer>, now: f32) -> Option<ChargeChange> {
        let previous = self.charges();
        let max = self.max_charges();
        self.cooldown.current_charges =
            (self.cooldown.current_charges + self.charges_per_cooldown()).clamp(0, max);
        self.cooldown_timer = None;
        if self.cooldown.current_charges < max {
            // Chained cooldowns start where the previous one ended, even when
            // the timer is serviced late.
            self.start_cooldown(0.0, timers, self.cooldown.cooldown_end.min(now));
        } else {
            self.cooldown.on_cooldown = false;
        }
        self.charge_change(previous)
    }

    pub(super) fn modify_charges(
        &mut self,
        amount: i32,
        mode: ChargeModification,
        timers: &Scheduler<AbilityTimer>,
        now: f32,
    ) -> Option<ChargeChange> {
        let previous = self.charges();
        let max = self.max_charges();
        let target = match mode {
            ChargeModification::Additive => self.cooldown.current_charges + amount,
            ChargeModification::Override => amount,
        };
        self.cooldown.current_charges = target.clamp(0, max);
        self.sync_cooldown(timers, now);
        self.charge_change(previous)
    }

    /// Re-clamps charges after the max charge value moved.
    pub(super) fn adjust_for_max_charges(&mut self, timers: &Scheduler<AbilityTimer>, now: f32) -> Option<ChargeChange> {
        let previous = self.charges();
        self.cooldown.current_charges = self.cooldown.current_charges.min(self.max_charges());
        self.sync_cooldown(timers, now);
        self.charge_change(previous)
    }

    fn sync_cooldown(&mut self, timers: &Scheduler<AbilityTimer>, now: f32) {
        let below_max = self.cooldown.current_charges < self.max_charges();
        if below_max && !self.cooldown.on_cooldown {
            self.start_cooldown(0.0, timers, now);
        } else if !below_max && self.cooldown.on_cooldown {
            self.cancel_cooldown();
        }
    }

    // ===== client prediction =====

    /// Records a predicted spend. Returns the charges spent.
    pub(super) fn predict_charges(&mut self, prediction_id: PredictionId) -> i32 {
        let cost = self.charge_cost();
        if cost > 0 {
            self.predicted_spends.insert(prediction_id, cost);
        }
        cost
    }

    pub(super) fn has_predicted_spend(&self, prediction_id: PredictionId) -> bool {
        self.predicted_spends.contains_key(&prediction_id)
    }

    /// Replaces a predicted spend with the server's count.
    ///
    /// Returns true when the count differed from the guess.
    pub(super) fn confirm_charges(&mut self, prediction_id: PredictionId, spent: i32) -> CombatResult<bool> {
        if prediction_id <= self.cooldown.prediction_id {
            return Err(CombatError::Stale { prediction_id });
        }
        let predicted = self.predicted_spends.get(&prediction_id).copied().unwrap_or(0);
        if predicted == spent {
            return Ok(false);
        }
        if spent > 0 {
            self.predicted_spends.insert(prediction_id, spent);
        } else {
            self.predicted_spends.remove(&prediction_id);
        }
        Ok(true)
    }

    /// Drops a predicted spend, refunding it in the predicted view.
    pub(super) fn rollback_charges(&mut self, prediction_id: PredictionId) -> Option<ChargeChange> {
        let previous = self.charges();
        self.predicted_spends.remove(&prediction_id)?;
        self.charge_change(previous)
    }

    /// Applies a replicated cooldown record.
    ///
    /// Records older than the one already applied are ignored. Predicted
    /// spends the record already includes are discarded.
    pub(super) fn apply_replicated(&mut self, replicated: AbilityCooldown) -> Option<ChargeChange> {
        if replicated.prediction_id < self.cooldown.prediction_id {
            trace!(
                target: "combat::prediction",
                ability = %self.id(),
                prediction_id = %replicated.prediction_id,
                "stale cooldown record ignored"
            );
            return None;
        }
        let previous = self.charges();
        self.cooldown = replicated;
        let committed = replicated.prediction_id;
        self.predicted_spends.retain(|id, _| *id > committed);
        self.charge_change(previous)
    }
}

impl core::fmt::Debug for AbilityInstance {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AbilityInstance")
            .field("id", &self.id())
            .field("cooldown", &self.cooldown)
            .field("charges", &self.charges())
            .field("max_charges", &self.max_charges())
            .field("predicted_spends", &self.predicted_spends.len())
            .finish()
    }
}
