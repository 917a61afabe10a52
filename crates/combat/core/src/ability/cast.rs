//! Cast execution shared by both roles, plus the authoritative use path.

use tracing::{debug, error, warn};

use super::component::AbilityTimer;
use super::{
    AbilityComponent, AbilityEvent, CancelEvent, CancelFailReason, CastContext, CastInfo, CastOutcome,
    CastRejection, CastType, CastingState, ComponentRole, GlobalCooldown, InterruptEvent,
    InterruptFailReason, InterruptRequest, InterruptSource, TickEvent,
};
use crate::error::{CombatError, CombatResult};
use crate::ids::{AbilityId, PredictedTick, PredictionId};
use crate::prediction::CombatParameters;
use crate::tokens::TokenHolder;

impl AbilityComponent {
    /// Uses an ability authoritatively.
    ///
    /// Predicted requests get their timers shortened by the clamped ping
    /// compensation. The outcome reports uncompensated lengths.
    pub fn use_ability(&mut self, ability: AbilityId, mut ctx: CastContext<'_>) -> Result<CastOutcome, CastRejection> {
        let now = ctx.now;
        let prediction_id = ctx.prediction_id;
        if let Err(reason) = self.check_castable(ability, ctx.tokens.as_deref()) {
            return Err(self.reject(ability, prediction_id, now, reason));
        }
        let Some(instance) = self.abilities.get(&ability) else {
            return Err(self.reject(ability, prediction_id, now, super::CastFailReason::InvalidAbility));
        };
        let definition = instance.definition();
        let cast_type = definition.cast_type;
        let requires_token = definition.requires_token;
        let interruptible = definition.interruptible;
        let initial_tick = definition.initial_tick;
        let ticks = definition.ticks;
        let gcd = definition.has_global_cooldown.then(|| instance.global_cooldown_length());
        let cast_length = instance.cast_length();
        let costs = instance.costs();
        let charges_spent = instance.charge_cost();

        if requires_token
            && let Some(pool) = ctx.tokens.as_deref_mut()
            && let Err(error) = pool.request_token(ability, TokenHolder::new(self.owner, ability), false)
        {
            debug!(target: "combat::ability", actor = %self.owner, ability = %ability, error = %error, "token request failed");
            return Err(self.reject(ability, prediction_id, now, super::CastFailReason::Token));
        }

        let compensation = if prediction_id.is_predicted() {
            ctx.ping_compensation.clamp(0.0, self.config.max_ping_compensation)
        } else {
            0.0
        };

        if let Some(length) = gcd {
            let length = (length - compensation).max(self.config.min_global_cooldown);
            self.start_global_cooldown(prediction_id, now, length);
        }
        if let Some(instance) = self.abilities.get_mut(&ability)
            && let Some(change) = instance.commit_charges(prediction_id, compensation, &self.timers, now)
        {
            self.emit(AbilityEvent::ChargesChanged(change));
        }
        if let Err(error) = self.resources.commit_costs(prediction_id, &costs) {
            error!(
                target: "combat::ability",
                actor = %self.owner,
                ability = %ability,
                error = %error,
                "validated costs could not be committed"
            );
        }

        let cast = match cast_type {
            CastType::Instant => {
                self.resolve_server_tick_with(ability, prediction_id, 0, ctx.params, now);
                self.finish_cast(ability, prediction_id, 0, now);
                None
            }
            CastType::Channel => {
                let length = (cast_length - compensation).max(self.config.min_cast_length);
                self.begin_channel(ability, prediction_id, now, length, interruptible, ticks);
                if initial_tick {
                    self.resolve_server_tick_with(ability, prediction_id, 0, ctx.params, now);
                }
                Some(CastInfo {
                    length: cast_length,
                    interruptible,
                })
            }
        };

        debug!(
            target: "combat::ability",
            actor = %self.owner,
            ability = %ability,
            prediction_id = %prediction_id,
            "ability used"
        );
        Ok(CastOutcome {
            ability,
            prediction_id,
            gcd,
            charges_spent,
            cast,
            costs,
        })
    }

    /// Drives every timer due at `now`.
    pub fn advance(&mut self, now: f32) {
        for timer in self.timers.advance(now) {
            match timer {
                AbilityTimer::GlobalCooldownEnd => self.end_global_cooldown(),
                AbilityTimer::CooldownEnd(ability) => {
                    if let Some(instance) = self.abilities.get_mut(&ability)
                        && let Some(change) = instance.complete_cooldown(&self.timers, now)
                    {
                        self.emit(AbilityEvent::ChargesChanged(change));
                    }
                }
                AbilityTimer::CastTick => self.on_cast_tick(now),
                AbilityTimer::CastComplete => self.on_cast_complete(now),
                AbilityTimer::TickParamsTimeout(tick) => self.on_tick_params_timeout(tick),
            }
        }
    }

    // ===== global cooldown =====

    pub(super) fn start_global_cooldown(&mut self, prediction_id: PredictionId, start: f32, length: f32) {
        let end_time = start + length;
        self.gcd_timer = Some(self.schedule_at(end_time, AbilityTimer::GlobalCooldownEnd));
        self.set_global_cooldown(GlobalCooldown {
            active: true,
            prediction_id,
            start_time: start,
            end_time,
        });
    }

    pub(super) fn end_global_cooldown(&mut self) {
        self.gcd_timer = None;
        self.set_global_cooldown(GlobalCooldown {
            active: false,
            ..self.global_cooldown
        });
    }

    // ===== casting =====

    /// Enters the channel state. The tick timer is created before the
    /// completion timer so a final tick due together with completion runs first.
    pub(super) fn begin_channel(
        &mut self,
        ability: AbilityId,
        prediction_id: PredictionId,
        start: f32,
        length: f32,
        interruptible: bool,
        ticks: u32,
    ) {
        let interval = length / ticks.max(1) as f32;
        let tick_timer = self.timers.schedule_repeating(interval, AbilityTimer::CastTick);
        tick_timer.reschedule_at(start + interval);
        self.tick_timer = Some(tick_timer);
        self.cast_timer = Some(self.schedule_at(start + length, AbilityTimer::CastComplete));
        self.set_casting(CastingState {
            ability: Some(ability),
            prediction_id,
            cast_start: start,
            cast_end: start + length,
            interruptible,
            elapsed_ticks: 0,
        });
    }

    /// Leaves the cast state, cancelling both cast timers. Returns the state
    /// that was active.
    pub(super) fn end_cast(&mut self) -> CastingState {
        let previous = self.casting;
        self.tick_timer = None;
        self.cast_timer = None;
        self.set_casting(CastingState {
            ability: None,
            ..previous
        });
        previous
    }

    fn ticks_of(&self, ability: AbilityId) -> u32 {
        self.abilities
            .get(&ability)
            .map(|instance| instance.definition().ticks)
            .unwrap_or_default()
    }

    fn requires_token(&self, ability: AbilityId) -> bool {
        self.abilities
            .get(&ability)
            .is_some_and(|instance| instance.definition().requires_token)
    }

    fn on_cast_tick(&mut self, now: f32) {
        let Some(ability) = self.casting.ability else {
            return;
        };
        if self.casting.elapsed_ticks >= self.ticks_of(ability) {
            return;
        }
        self.casting.elapsed_ticks += 1;
        let tick = self.casting.elapsed_ticks;
        let prediction_id = self.casting.prediction_id;
        match self.role {
            ComponentRole::Authority => self.resolve_server_tick(ability, prediction_id, tick, now),
            ComponentRole::Predicted => {
                self.run_predicted_tick(ability, prediction_id, tick, now);
            }
        }
    }

    fn on_cast_complete(&mut self, now: f32) {
        let Some(ability) = self.casting.ability else {
            return;
        };
        while self.casting.elapsed_ticks < self.ticks_of(ability) {
            self.on_cast_tick(now);
        }
        let previous = self.end_cast();
        self.finish_cast(ability, previous.prediction_id, previous.elapsed_ticks, now);
    }

    /// Natural completion of a cast.
    pub(super) fn finish_cast(&mut self, ability: AbilityId, prediction_id: PredictionId, elapsed_ticks: u32, now: f32) {
        let ctx = self.tick_context(ability, prediction_id, elapsed_ticks, now);
        if let Some(behavior) = self.behaviors.get_mut(&ability) {
            behavior.cast_complete(&ctx);
        }
        self.emit(AbilityEvent::CastCompleted {
            ability,
            prediction_id,
        });
        self.queue_token_return(ability);
    }

    fn queue_token_return(&mut self, ability: AbilityId) {
        if self.role == ComponentRole::Authority && self.requires_token(ability) {
            self.token_returns.push(ability);
        }
    }

    /// Client: runs one tick locally and returns the parameters it produced.
    pub(super) fn run_predicted_tick(
        &mut self,
        ability: AbilityId,
        prediction_id: PredictionId,
        tick: u32,
        now: f32,
    ) -> CombatParameters {
        let ctx = self.tick_context(ability, prediction_id, tick, now);
        let params = self
            .behaviors
            .get_mut(&ability)
            .map(|behavior| behavior.predicted_tick(&ctx))
            .unwrap_or_default();
        self.emit(AbilityEvent::PredictedTick(TickEvent {
            ability,
            prediction_id,
            tick,
            params: params.clone(),
        }));
        params
    }

    // ===== server ticks =====

    /// Server: resolves a tick whose client parameters are already known.
    fn resolve_server_tick_with(
        &mut self,
        ability: AbilityId,
        prediction_id: PredictionId,
        tick: u32,
        params: CombatParameters,
        now: f32,
    ) {
        if self.role == ComponentRole::Authority {
            self.run_server_tick(ability, prediction_id, tick, &params, now);
        }
    }

    /// Server: resolves a tick fired by the cast timer. Predicted casts wait
    /// for the client's parameters unless they already arrived.
    fn resolve_server_tick(&mut self, ability: AbilityId, prediction_id: PredictionId, tick: u32, now: f32) {
        if !prediction_id.is_predicted() {
            self.run_server_tick(ability, prediction_id, tick, &CombatParameters::new(), now);
            return;
        }
        let key = PredictedTick::new(prediction_id, tick);
        if let Some(params) = self.buffered_params.remove(&key) {
            self.run_server_tick(ability, prediction_id, tick, &params, now);
            return;
        }
        let timeout = self.timers.schedule(
            self.config.tick_params_timeout,
            AbilityTimer::TickParamsTimeout(key),
        );
        self.pending_ticks.insert(key, (ability, timeout));
        self.emit(AbilityEvent::TickAwaitingParams { ability, tick: key });
    }

    fn run_server_tick(
        &mut self,
        ability: AbilityId,
        prediction_id: PredictionId,
        tick: u32,
        params: &CombatParameters,
        now: f32,
    ) {
        let ctx = self.tick_context(ability, prediction_id, tick, now);
        let broadcast = match self.behaviors.get_mut(&ability) {
            Some(behavior) => behavior.server_tick(&ctx, params),
            None => params.clone(),
        };
        self.mark_tick_resolved(PredictedTick::new(prediction_id, tick));
        self.emit(AbilityEvent::ServerTick(TickEvent {
            ability,
            prediction_id,
            tick,
            params: broadcast,
        }));
    }

    /// Server: delivers client parameters for a channel tick.
    ///
    /// A tick that already fired runs now. A tick that has not fired yet keeps
    /// the parameters until it does. Ticks already resolved or dropped, and
    /// ticks of a finished cast, are stale.
    pub fn supply_tick_params(&mut self, tick: PredictedTick, params: CombatParameters) -> CombatResult<()> {
        if let Some((ability, _timeout)) = self.pending_ticks.remove(&tick) {
            let now = self.now();
            self.run_server_tick(ability, tick.prediction_id, tick.tick, &params, now);
            return Ok(());
        }
        let finished = tick.prediction_id < self.casting.prediction_id
            || (tick.prediction_id == self.casting.prediction_id && !self.casting.is_casting());
        if finished || self.resolved_ticks.contains(&tick) {
            return Err(CombatError::Stale {
                prediction_id: tick.prediction_id,
            });
        }
        self.buffer_tick_params(tick, params);
        Ok(())
    }

    fn on_tick_params_timeout(&mut self, tick: PredictedTick) {
        let Some((ability, _)) = self.pending_ticks.remove(&tick) else {
            return;
        };
        warn!(
            target: "combat::ability",
            actor = %self.owner,
            ability = %ability,
            prediction_id = %tick.prediction_id,
            tick = tick.tick,
            "tick parameters never arrived, dropping tick"
        );
        self.mark_tick_resolved(tick);
        self.emit(AbilityEvent::TickDropped { ability, tick });
    }

    // ===== cancel and interrupt =====

    /// Server: stops the active cast on behalf of its caster.
    ///
    /// A predicted cancel must name the active cast. `params` are the client's
    /// cancel-time parameters.
    pub fn cancel_current_cast(
        &mut self,
        prediction_id: PredictionId,
        params: CombatParameters,
        now: f32,
    ) -> Result<CancelEvent, CancelFailReason> {
        let Some(ability) = self.casting.ability else {
            return Err(CancelFailReason::NotCasting);
        };
        if prediction_id.is_predicted() && prediction_id != self.casting.prediction_id {
            return Err(CancelFailReason::WrongPrediction);
        }
        let previous = self.end_cast();
        let ctx = self.tick_context(ability, previous.prediction_id, previous.elapsed_ticks, now);
        if let Some(behavior) = self.behaviors.get_mut(&ability) {
            behavior.server_cancel(&ctx, &params);
        }
        self.buffered_params
            .retain(|tick, _| tick.prediction_id != previous.prediction_id);
        let event = CancelEvent {
            ability,
            prediction_id: previous.prediction_id,
            time: now,
            elapsed_ticks: previous.elapsed_ticks,
            params,
        };
        self.emit(AbilityEvent::CastCancelled(event.clone()));
        self.queue_token_return(ability);
        Ok(event)
    }

    /// Stops the active cast from outside. Vetoed by non-interruptible casts
    /// and interrupt restrictions unless the request ignores restrictions.
    pub fn interrupt_current_cast(
        &mut self,
        request: InterruptRequest,
        now: f32,
    ) -> Result<InterruptEvent, InterruptFailReason> {
        let Some(ability) = self.casting.ability else {
            return Err(InterruptFailReason::NotCasting);
        };
        if !self.casting.interruptible && !request.ignore_restrictions {
            return Err(InterruptFailReason::NotInterruptible);
        }
        let event = InterruptEvent {
            target: self.owner,
            applied_by: request.applied_by,
            source: request.source,
            ability,
            prediction_id: self.casting.prediction_id,
            time: now,
            elapsed_ticks: self.casting.elapsed_ticks,
        };
        if !request.ignore_restrictions
            && let Some(name) = self.interrupt_restrictions.first_veto(&event)
        {
            debug!(
                target: "combat::ability",
                actor = %self.owner,
                ability = %ability,
                restriction = name,
                "interrupt vetoed"
            );
            return Err(InterruptFailReason::Restricted);
        }
        self.apply_interrupt(event);
        Ok(event)
    }

    pub(super) fn apply_interrupt(&mut self, event: InterruptEvent) {
        self.end_cast();
        let ctx = self.tick_context(event.ability, event.prediction_id, event.elapsed_ticks, event.time);
        if let Some(behavior) = self.behaviors.get_mut(&event.ability) {
            behavior.cast_interrupted(&ctx, &event);
        }
        self.buffered_params
            .retain(|tick, _| tick.prediction_id != event.prediction_id);
        self.last_interrupt = Some(event);
        self.emit(AbilityEvent::CastInterrupted(event));
        self.queue_token_return(event.ability);
    }

    /// Stops the active cast for state changes the caster did not choose, such
    /// as a tag restriction or losing the ability. Reported as an interrupt.
    pub(super) fn force_stop_cast(&mut self, source: InterruptSource, now: f32) {
        let request = InterruptRequest::new(None, source).ignoring_restrictions();
        if let Err(reason) = self.interrupt_current_cast(request, now) {
            debug!(target: "combat::ability", actor = %self.owner, reason = %reason, "no cast to stop");
        }
    }
}
