//! Client side of the cast protocol.
//!
//! A predicting component applies the effects it is confident about as soon
//! as the player acts, remembers what it guessed in a [`PredictionRecord`],
//! and later confirms, corrects or rolls back that guess once the server has
//! answered.

use tracing::{debug, trace};

use super::component::AbilityTimer;
use super::{
    AbilityComponent, AbilityEvent, CancelEvent, CancelFailReason, CastFailReason, CastInfo,
    CastRejection, CastType, CastingState, ChargeChange, GlobalCooldown,
};
use crate::error::CombatError;
use crate::ids::{AbilityId, PredictedTick, PredictionId};
use crate::prediction::{AbilitySnapshot, CombatParameters, ServerAbilityResult};
use crate::resource::AbilityCost;

/// Lengths closer than this are treated as equal when comparing with the server.
const LENGTH_TOLERANCE: f32 = 1e-4;

/// What a client guessed when it predicted a cast.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionRecord {
    pub prediction_id: PredictionId,
    pub ability: AbilityId,
    /// Local time of the prediction.
    pub time: f32,
    /// Predicted global cooldown length, if one was started.
    pub gcd: Option<f32>,
    /// Predicted charges spent, if any.
    pub charges: Option<i32>,
    /// Predicted channel, if one was started.
    pub cast: Option<CastInfo>,
    pub costs: Vec<AbilityCost>,
    /// Parameters of tick 0, for the activation request.
    pub params: CombatParameters,
}

/// Outcome of reconciling a prediction with the server's result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Reconciliation {
    /// The guess matched. Nothing visible changed.
    Confirmed,
    /// Visible state was adjusted to the server's values.
    Corrected,
    /// The result was already applied or superseded.
    Stale,
}

fn lengths_differ(predicted: Option<f32>, actual: Option<f32>) -> bool {
    match (predicted, actual) {
        (Some(a), Some(b)) => (a - b).abs() > LENGTH_TOLERANCE,
        (None, None) => false,
        _ => true,
    }
}

impl AbilityComponent {
    /// Client: predicts a use of `ability` under `prediction_id`.
    ///
    /// Fails locally without side effects when the ability is not castable in
    /// the predicted view, so no request is wasted on it.
    pub fn predict_use(
        &mut self,
        ability: AbilityId,
        prediction_id: PredictionId,
        now: f32,
    ) -> Result<PredictionRecord, CastRejection> {
        if !prediction_id.is_predicted() || self.predictions.contains_key(&prediction_id) {
            return Err(self.reject(ability, prediction_id, now, CastFailReason::InvalidAbility));
        }
        if let Err(reason) = self.check_castable(ability, None) {
            return Err(self.reject(ability, prediction_id, now, reason));
        }
        let Some(instance) = self.abilities.get_mut(&ability) else {
            return Err(self.reject(ability, prediction_id, now, CastFailReason::InvalidAbility));
        };
        let definition = instance.definition();
        let cast_type = definition.cast_type;
        let interruptible = definition.interruptible;
        let initial_tick = definition.initial_tick;
        let ticks = definition.ticks;
        let gcd = definition.has_global_cooldown.then(|| instance.global_cooldown_length());
        let cast_length = instance.cast_length();
        let costs = instance.costs();

        let previous = instance.charges();
        let spent = instance.predict_charges(prediction_id);
        let current = instance.charges();
        if previous != current {
            self.emit(AbilityEvent::ChargesChanged(ChargeChange {
                ability,
                previous,
                current,
            }));
        }
        self.resources.predict_costs(prediction_id, &costs);
        if let Some(length) = gcd {
            self.start_global_cooldown(prediction_id, now, length);
        }

        let (cast, params) = match cast_type {
            CastType::Instant => {
                let params = self.run_predicted_tick(ability, prediction_id, 0, now);
                self.finish_cast(ability, prediction_id, 0, now);
                (None, params)
            }
            CastType::Channel => {
                self.begin_channel(ability, prediction_id, now, cast_length, interruptible, ticks);
                let params = if initial_tick {
                    self.run_predicted_tick(ability, prediction_id, 0, now)
                } else {
                    CombatParameters::new()
                };
                let info = CastInfo {
                    length: cast_length,
                    interruptible,
                };
                (Some(info), params)
            }
        };

        let record = PredictionRecord {
            prediction_id,
            ability,
            time: now,
            gcd,
            charges: (spent > 0).then_some(spent),
            cast,
            costs,
            params,
        };
        self.predictions.insert(prediction_id, record.clone());
        trace!(
            target: "combat::prediction",
            actor = %self.owner,
            ability = %ability,
            prediction_id = %prediction_id,
            "cast predicted"
        );
        Ok(record)
    }

    pub fn pending_prediction(&self, prediction_id: PredictionId) -> Option<&PredictionRecord> {
        self.predictions.get(&prediction_id)
    }

    pub fn pending_predictions(&self) -> usize {
        self.predictions.len()
    }

    /// Client: compares a server result with the pending guess.
    ///
    /// Matching guesses are dropped silently. Differences adjust the running
    /// timers in place, keeping their start times. A result without a pending
    /// record is stale and changes nothing.
    pub fn reconcile(&mut self, result: &ServerAbilityResult) -> Reconciliation {
        let prediction_id = result.prediction_id;
        let Some(record) = self.predictions.remove(&prediction_id) else {
            trace!(
                target: "combat::prediction",
                actor = %self.owner,
                prediction_id = %prediction_id,
                "result for unknown prediction ignored"
            );
            return Reconciliation::Stale;
        };
        let now = self.now();
        let mut corrected = false;

        if lengths_differ(record.gcd, result.gcd) {
            self.correct_global_cooldown(&record, result.gcd, now);
            corrected = true;
        }

        if let Some(instance) = self.abilities.get_mut(&record.ability) {
            let previous = instance.charges();
            match instance.confirm_charges(prediction_id, result.charges_spent) {
                Ok(changed) => corrected |= changed,
                Err(error) => trace!(target: "combat::prediction", error = %error, "charges already replicated"),
            }
            let current = instance.charges();
            if previous != current {
                self.emit(AbilityEvent::ChargesChanged(ChargeChange {
                    ability: record.ability,
                    previous,
                    current,
                }));
            }
        }

        match self.resources.confirm_costs(prediction_id, &result.costs) {
            Ok(changed) => corrected |= changed,
            Err(error) => trace!(target: "combat::prediction", error = %error, "costs already replicated"),
        }

        if record.cast != result.cast {
            self.correct_cast(prediction_id, result.cast, now);
            corrected = true;
        }

        let outcome = if corrected {
            Reconciliation::Corrected
        } else {
            Reconciliation::Confirmed
        };
        debug!(
            target: "combat::prediction",
            actor = %self.owner,
            ability = %record.ability,
            prediction_id = %prediction_id,
            outcome = %outcome,
            "prediction reconciled"
        );
        outcome
    }

    fn correct_global_cooldown(&mut self, record: &PredictionRecord, length: Option<f32>, now: f32) {
        let ours = self.global_cooldown.prediction_id == record.prediction_id;
        match length {
            Some(length) if ours && self.global_cooldown.active => {
                let start = self.global_cooldown.start_time;
                if start + length <= now {
                    self.end_global_cooldown();
                } else {
                    self.start_global_cooldown(record.prediction_id, start, length);
                }
            }
            Some(length) => {
                let newer = self.global_cooldown.prediction_id > record.prediction_id;
                if !newer && record.time + length > now {
                    self.start_global_cooldown(record.prediction_id, record.time, length);
                }
            }
            None => {
                if ours && self.global_cooldown.active {
                    self.end_global_cooldown();
                }
            }
        }
    }

    fn correct_cast(&mut self, prediction_id: PredictionId, cast: Option<CastInfo>, now: f32) {
        if self.casting.prediction_id != prediction_id || !self.casting.is_casting() {
            return;
        }
        let Some(info) = cast else {
            self.end_cast();
            return;
        };
        let Some(ability) = self.casting.ability else {
            return;
        };
        let ticks = self
            .abilities
            .get(&ability)
            .map(|instance| instance.definition().ticks)
            .unwrap_or(1)
            .max(1);
        let start = self.casting.cast_start;
        let end = start + info.length;
        let interval = info.length / ticks as f32;
        self.cast_timer = Some(self.schedule_at(end.max(now), AbilityTimer::CastComplete));
        let tick_timer = self.timers.schedule_repeating(interval, AbilityTimer::CastTick);
        tick_timer.reschedule_at(start + (self.casting.elapsed_ticks + 1) as f32 * interval);
        self.tick_timer = Some(tick_timer);
        self.set_casting(CastingState {
            cast_end: end,
            interruptible: info.interruptible,
            ..self.casting
        });
    }

    /// Client: undoes every local effect of a refused prediction and notifies
    /// the behavior and observers. Returns false for unknown predictions.
    pub fn rollback_prediction(&mut self, prediction_id: PredictionId, reason: CombatError) -> bool {
        let Some(record) = self.predictions.remove(&prediction_id) else {
            trace!(
                target: "combat::prediction",
                actor = %self.owner,
                prediction_id = %prediction_id,
                "rollback for unknown prediction ignored"
            );
            return false;
        };
        if let Some(instance) = self.abilities.get_mut(&record.ability)
            && let Some(change) = instance.rollback_charges(prediction_id)
        {
            self.emit(AbilityEvent::ChargesChanged(change));
        }
        self.resources.rollback(prediction_id);
        if self.global_cooldown.prediction_id == prediction_id && self.global_cooldown.active {
            self.end_global_cooldown();
        }
        if self.casting.prediction_id == prediction_id && self.casting.is_casting() {
            self.end_cast();
        }
        self.notify_mispredicted(record.ability, prediction_id, reason);
        true
    }

    /// Client: the server gave up waiting for the parameters of one tick.
    pub fn tick_dropped(&mut self, ability: AbilityId, tick: PredictedTick) {
        self.emit(AbilityEvent::TickDropped { ability, tick });
        self.notify_mispredicted(ability, tick.prediction_id, CombatError::DroppedTick { tick: tick.tick });
    }

    fn notify_mispredicted(&mut self, ability: AbilityId, prediction_id: PredictionId, reason: CombatError) {
        debug!(
            target: "combat::prediction",
            actor = %self.owner,
            ability = %ability,
            prediction_id = %prediction_id,
            reason = %reason,
            "mispredicted"
        );
        if let Some(behavior) = self.behaviors.get_mut(&ability) {
            behavior.mispredicted(prediction_id, &reason);
        }
        self.emit(AbilityEvent::Mispredicted {
            ability,
            prediction_id,
            reason,
        });
    }

    /// Client: stops the active cast locally. The returned event carries the
    /// parameters to send with the cancel request.
    pub fn predict_cancel(&mut self, now: f32) -> Result<CancelEvent, CancelFailReason> {
        let Some(ability) = self.casting.ability else {
            return Err(CancelFailReason::NotCasting);
        };
        let previous = self.casting;
        let ctx = self.tick_context(ability, previous.prediction_id, previous.elapsed_ticks, now);
        let params = self
            .behaviors
            .get_mut(&ability)
            .map(|behavior| behavior.predicted_cancel(&ctx))
            .unwrap_or_default();
        self.end_cast();
        let event = CancelEvent {
            ability,
            prediction_id: previous.prediction_id,
            time: now,
            elapsed_ticks: previous.elapsed_ticks,
            params,
        };
        self.emit(AbilityEvent::CastCancelled(event.clone()));
        Ok(event)
    }

    /// Client: applies a replicated snapshot through the same change events a
    /// local mutation would emit.
    ///
    /// Cooldowns and resources always follow the server, with newer
    /// predictions layered on top. The global cooldown and cast are adopted
    /// only when the server knows a newer prediction than the local one. An
    /// interrupt of the local cast ends it here too.
    pub fn apply_snapshot(&mut self, snapshot: &AbilitySnapshot, now: f32) {
        for (ability, cooldown) in &snapshot.cooldowns {
            if let Some(instance) = self.abilities.get_mut(ability)
                && let Some(change) = instance.apply_replicated(*cooldown)
            {
                self.emit(AbilityEvent::ChargesChanged(change));
            }
        }
        self.resources
            .apply_replicated(&snapshot.resources, snapshot.resource_prediction);

        let gcd = snapshot.global_cooldown;
        if gcd.prediction_id > self.global_cooldown.prediction_id {
            if gcd.active && gcd.end_time > now {
                self.gcd_timer = Some(self.schedule_at(gcd.end_time, AbilityTimer::GlobalCooldownEnd));
                self.set_global_cooldown(gcd);
            } else {
                self.gcd_timer = None;
                self.set_global_cooldown(GlobalCooldown { active: false, ..gcd });
            }
        }

        if let Some(interrupt) = snapshot.last_interrupt
            && self.casting.is_casting()
            && self.casting.ability == Some(interrupt.ability)
            && self.casting.prediction_id == interrupt.prediction_id
        {
            self.apply_interrupt(interrupt);
        }

        let cast = snapshot.casting;
        if cast.prediction_id > self.casting.prediction_id {
            self.adopt_cast(cast, now);
        }
    }

    fn adopt_cast(&mut self, cast: CastingState, now: f32) {
        self.tick_timer = None;
        self.cast_timer = None;
        match cast.ability {
            Some(ability) if cast.cast_end > now => {
                let ticks = self
                    .abilities
                    .get(&ability)
                    .map(|instance| instance.definition().ticks)
                    .unwrap_or_default();
                self.cast_timer = Some(self.schedule_at(cast.cast_end, AbilityTimer::CastComplete));
                // Ticks of a cast this client never predicted are not replayed.
                self.set_casting(CastingState {
                    elapsed_ticks: ticks,
                    ..cast
                });
            }
            _ => self.set_casting(CastingState { ability: None, ..cast }),
        }
    }
}
