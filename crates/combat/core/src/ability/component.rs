use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, PoisonError};

use tracing::{debug, error, trace};

use super::instance::SharedModifiers;
use super::predicted::PredictionRecord;
use super::{
    AbilityBehavior, AbilityDefinition, AbilityEvent, AbilityInstance, AbilityStat, CastFailReason,
    CastRejection, CastingState, ChargeModification, CrowdControl, GlobalCooldown, InterruptEvent,
    InterruptRequest, InterruptSource, NoopBehavior, TickContext,
};
use crate::config::CombatConfig;
use crate::error::{CombatError, CombatResult, ErrorContext};
use crate::ids::{AbilityId, ActorId, BuffId, ListenerId, ModifierHandle, PredictedTick, PredictionId, ResourceId};
use crate::modifier::{CombatModifier, ModifierProviders};
use crate::observer::Observers;
use crate::prediction::{AbilitySnapshot, CombatParameters};
use crate::resource::ResourceHandler;
use crate::restriction::{Restriction, RestrictionList};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::tokens::{AbilityTokenPool, TokenHolder};

/// Timer events of an [`AbilityComponent`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum AbilityTimer {
    GlobalCooldownEnd,
    CooldownEnd(AbilityId),
    CastTick,
    CastComplete,
    TickParamsTimeout(PredictedTick),
}

/// Which side of the prediction protocol a component runs on.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ComponentRole {
    /// Server: owns the authoritative state.
    #[default]
    Authority,
    /// Owning client: predicts its own actions over replicated state.
    Predicted,
}

/// Conditional modifiers that apply to every ability of one actor.
#[derive(Debug, Default)]
pub struct HandlerModifiers {
    pub global_cooldown: ModifierProviders<AbilityDefinition>,
    pub cooldown: ModifierProviders<AbilityDefinition>,
    pub cast_length: ModifierProviders<AbilityDefinition>,
    pub costs: BTreeMap<ResourceId, ModifierProviders<AbilityDefinition>>,
}

/// Server-side cap on tick parameters that arrived before their tick fired.
const MAX_BUFFERED_TICK_PARAMS: usize = 16;
/// Ticks remembered as resolved, for rejecting late duplicates.
const RESOLVED_TICK_HISTORY: usize = 32;

/// Ability state of one actor.
pub struct AbilityComponent {
    pub(super) owner: ActorId,
    pub(super) role: ComponentRole,
    pub(super) config: CombatConfig,
    pub(super) abilities: BTreeMap<AbilityId, AbilityInstance>,
    pub(super) behaviors: BTreeMap<AbilityId, Box<dyn AbilityBehavior>>,
    pub(super) handler_mods: SharedModifiers,
    pub(super) resources: ResourceHandler,
    pub(super) global_cooldown: GlobalCooldown,
    pub(super) casting: CastingState,
    pub(super) timers: Scheduler<AbilityTimer>,
    pub(super) gcd_timer: Option<TimerHandle>,
    pub(super) cast_timer: Option<TimerHandle>,
    pub(super) tick_timer: Option<TimerHandle>,
    pub(super) alive: bool,
    pub(super) crowd_controls: BTreeMap<BuffId, CrowdControl>,
    pub(super) tag_restrictions: BTreeMap<String, BTreeSet<BuffId>>,
    pub(super) acquisition_restrictions: RestrictionList<AbilityDefinition>,
    pub(super) cast_restrictions: RestrictionList<AbilityDefinition>,
    pub(super) interrupt_restrictions: RestrictionList<InterruptEvent>,
    pub(super) observers: Observers<AbilityEvent>,
    pub(super) outbox: Vec<AbilityEvent>,
    pub(super) token_returns: Vec<AbilityId>,
    pub(super) last_interrupt: Option<InterruptEvent>,
    pub(super) pending_ticks: BTreeMap<PredictedTick, (AbilityId, TimerHandle)>,
    pub(super) buffered_params: BTreeMap<PredictedTick, CombatParameters>,
    pub(super) resolved_ticks: VecDeque<PredictedTick>,
    pub(super) predictions: BTreeMap<PredictionId, PredictionRecord>,
}

impl AbilityComponent {
    pub fn new(owner: ActorId, role: ComponentRole, config: CombatConfig) -> Self {
        Self {
            owner,
            role,
            config,
            abilities: BTreeMap::new(),
            behaviors: BTreeMap::new(),
            handler_mods: SharedModifiers::default(),
            resources: ResourceHandler::new(),
            global_cooldown: GlobalCooldown::default(),
            casting: CastingState::default(),
            timers: Scheduler::new(),
            gcd_timer: None,
            cast_timer: None,
            tick_timer: None,
            alive: true,
            crowd_controls: BTreeMap::new(),
            tag_restrictions: BTreeMap::new(),
            acquisition_restrictions: RestrictionList::new("ability_acquisition"),
            cast_restrictions: RestrictionList::new("ability_cast"),
            interrupt_restrictions: RestrictionList::new("ability_interrupt"),
            observers: Observers::new(),
            outbox: Vec::new(),
            token_returns: Vec::new(),
            last_interrupt: None,
            pending_ticks: BTreeMap::new(),
            buffered_params: BTreeMap::new(),
            resolved_ticks: VecDeque::new(),
            predictions: BTreeMap::new(),
        }
    }

    /// Starts the component clock at `now` instead of zero.
    #[must_use]
    pub fn starting_at(mut self, now: f32) -> Self {
        self.timers = Scheduler::starting_at(now);
        self
    }

    // ===== queries =====

    pub fn owner(&self) -> ActorId {
        self.owner
    }

    pub fn role(&self) -> ComponentRole {
        self.role
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Time of the most recent [`AbilityComponent::advance`].
    pub fn now(&self) -> f32 {
        self.timers.now()
    }

    pub fn ability(&self, ability: AbilityId) -> Option<&AbilityInstance> {
        self.abilities.get(&ability)
    }

    pub fn abilities(&self) -> impl Iterator<Item = &AbilityInstance> {
        self.abilities.values()
    }

    pub fn has_ability(&self, ability: AbilityId) -> bool {
        self.abilities.contains_key(&ability)
    }

    pub fn global_cooldown(&self) -> GlobalCooldown {
        self.global_cooldown
    }

    pub fn casting(&self) -> CastingState {
        self.casting
    }

    pub fn is_casting(&self) -> bool {
        self.casting.is_casting()
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Union of every active crowd control.
    pub fn crowd_control(&self) -> CrowdControl {
        self.crowd_controls
            .values()
            .fold(CrowdControl::empty(), |all, cc| all | *cc)
    }

    pub fn resources(&self) -> &ResourceHandler {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceHandler {
        &mut self.resources
    }

    /// Charges of `ability` in the predicted view.
    pub fn charges(&self, ability: AbilityId) -> Option<i32> {
        self.abilities.get(&ability).map(AbilityInstance::charges)
    }

    // ===== events =====

    pub fn subscribe(&mut self, id: ListenerId, callback: impl FnMut(&AbilityEvent) + Send + 'static) -> bool {
        self.observers.subscribe(id, callback)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Takes every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<AbilityEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Takes the abilities whose casts ended while holding a pool token.
    pub fn take_token_returns(&mut self) -> Vec<AbilityId> {
        std::mem::take(&mut self.token_returns)
    }

    pub(super) fn emit(&mut self, event: AbilityEvent) {
        self.observers.notify(&event);
        self.outbox.push(event);
    }

    pub(super) fn set_global_cooldown(&mut self, current: GlobalCooldown) {
        let previous = self.global_cooldown;
        if previous == current {
            return;
        }
        self.global_cooldown = current;
        self.emit(AbilityEvent::GlobalCooldownChanged { previous, current });
    }

    pub(super) fn set_casting(&mut self, current: CastingState) {
        let previous = self.casting;
        if previous == current {
            return;
        }
        self.casting = current;
        self.emit(AbilityEvent::CastingChanged { previous, current });
    }

    pub(super) fn error_context(&self, ability: AbilityId, prediction_id: PredictionId, now: f32) -> ErrorContext {
        let context = ErrorContext::new(now).with_actor(self.owner).with_ability(ability);
        if prediction_id.is_predicted() {
            context.with_prediction(prediction_id)
        } else {
            context
        }
    }

    pub(super) fn reject(
        &self,
        ability: AbilityId,
        prediction_id: PredictionId,
        now: f32,
        reason: CastFailReason,
    ) -> CastRejection {
        debug!(
            target: "combat::ability",
            actor = %self.owner,
            ability = %ability,
            prediction_id = %prediction_id,
            reason = %reason,
            "cast rejected"
        );
        CastRejection {
            reason,
            context: self.error_context(ability, prediction_id, now),
        }
    }

    pub(super) fn tick_context(&self, ability: AbilityId, prediction_id: PredictionId, tick: u32, time: f32) -> TickContext {
        TickContext {
            owner: self.owner,
            ability,
            prediction_id,
            tick,
            time,
        }
    }

    /// Schedules `event` at an absolute component time.
    pub(super) fn schedule_at(&self, due: f32, event: AbilityTimer) -> TimerHandle {
        self.timers.schedule((due - self.timers.now()).max(0.0), event)
    }

    // ===== ability management =====

    pub fn add_ability(&mut self, definition: AbilityDefinition) -> CombatResult<()> {
        self.add_ability_with_behavior(definition, Box::new(NoopBehavior))
    }

    /// Grants an ability. Fails on invalid definitions, duplicates, and
    /// definitions vetoed by an acquisition restriction.
    pub fn add_ability_with_behavior(
        &mut self,
        definition: AbilityDefinition,
        behavior: Box<dyn AbilityBehavior>,
    ) -> CombatResult<()> {
        definition.validate()?;
        let id = definition.id;
        if self.abilities.contains_key(&id) {
            return Err(CombatError::AlreadyActive);
        }
        if let Some(name) = self.acquisition_restrictions.first_veto(&definition) {
            debug!(
                target: "combat::ability",
                actor = %self.owner,
                ability = %id,
                restriction = name,
                "ability acquisition vetoed"
            );
            return Err(CombatError::Restricted);
        }
        let instance = AbilityInstance::new(Arc::new(definition), &self.handler_mods, &self.config);
        self.abilities.insert(id, instance);
        self.behaviors.insert(id, behavior);
        trace!(target: "combat::ability", actor = %self.owner, ability = %id, "ability added");
        self.emit(AbilityEvent::AbilityAdded(id));
        Ok(())
    }

    /// Removes an ability, stopping its cast if it is the one being cast.
    pub fn remove_ability(&mut self, ability: AbilityId) -> CombatResult<()> {
        if !self.abilities.contains_key(&ability) {
            return Err(CombatError::InvalidInput { what: "ability" });
        }
        if self.casting.ability == Some(ability) {
            let now = self.now();
            self.force_stop_cast(InterruptSource::Unknown, now);
        }
        self.abilities.remove(&ability);
        self.behaviors.remove(&ability);
        self.emit(AbilityEvent::AbilityRemoved(ability));
        Ok(())
    }

    /// Registers an acquisition restriction and removes every owned ability it
    /// now vetoes.
    pub fn add_acquisition_restriction(&mut self, restriction: Arc<dyn Restriction<AbilityDefinition>>) -> bool {
        if !self.acquisition_restrictions.add(restriction) {
            return false;
        }
        let vetoed: Vec<AbilityId> = self
            .abilities
            .values()
            .filter(|instance| self.acquisition_restrictions.is_restricted(instance.definition()))
            .map(AbilityInstance::id)
            .collect();
        for ability in vetoed {
            if let Err(err) = self.remove_ability(ability) {
                error!(
                    target: "combat::ability",
                    actor = %self.owner,
                    ability = %ability,
                    error = %err,
                    "vetoed ability could not be removed"
                );
            }
        }
        true
    }

    pub fn remove_acquisition_restriction(&mut self, name: &str) -> bool {
        self.acquisition_restrictions.remove(name)
    }

    /// Custom cast restrictions, evaluated last during validation.
    pub fn cast_restrictions_mut(&mut self) -> &mut RestrictionList<AbilityDefinition> {
        &mut self.cast_restrictions
    }

    pub fn interrupt_restrictions_mut(&mut self) -> &mut RestrictionList<InterruptEvent> {
        &mut self.interrupt_restrictions
    }

    // ===== modifiers =====

    /// Attaches a modifier to one ability value.
    pub fn add_ability_modifier(
        &mut self,
        ability: AbilityId,
        stat: AbilityStat,
        modifier: CombatModifier,
    ) -> ModifierHandle {
        let Some(instance) = self.abilities.get_mut(&ability) else {
            return ModifierHandle::INVALID;
        };
        let handle = instance.add_modifier(stat, modifier);
        if handle.is_valid() && stat == AbilityStat::MaxCharges {
            self.after_max_charges_changed(ability);
        }
        handle
    }

    pub fn remove_ability_modifier(&mut self, ability: AbilityId, stat: AbilityStat, handle: ModifierHandle) -> bool {
        let Some(instance) = self.abilities.get_mut(&ability) else {
            return false;
        };
        let removed = instance.remove_modifier(stat, handle);
        if removed && stat == AbilityStat::MaxCharges {
            self.after_max_charges_changed(ability);
        }
        removed
    }

    fn after_max_charges_changed(&mut self, ability: AbilityId) {
        if self.role != ComponentRole::Authority {
            return;
        }
        let now = self.now();
        if let Some(instance) = self.abilities.get_mut(&ability)
            && let Some(change) = instance.adjust_for_max_charges(&self.timers, now)
        {
            self.emit(AbilityEvent::ChargesChanged(change));
        }
    }

    /// Edits the handler-wide modifiers and recalculates every ability.
    pub fn update_handler_modifiers<R>(&mut self, update: impl FnOnce(&mut HandlerModifiers) -> R) -> R {
        let result = {
            let mut handler = self.handler_mods.write().unwrap_or_else(PoisonError::into_inner);
            update(&mut handler)
        };
        for instance in self.abilities.values_mut() {
            instance.recalculate_handler_values();
        }
        result
    }

    /// Authoritatively changes the charges of an ability.
    pub fn modify_charges(&mut self, ability: AbilityId, amount: i32, mode: ChargeModification) -> CombatResult<()> {
        let now = self.now();
        let instance = self
            .abilities
            .get_mut(&ability)
            .ok_or(CombatError::InvalidInput { what: "ability" })?;
        if let Some(change) = instance.modify_charges(amount, mode, &self.timers, now) {
            self.emit(AbilityEvent::ChargesChanged(change));
        }
        Ok(())
    }

    // ===== restrictions and status =====

    /// Blocks every ability tagged `tag` while `source` is active. A matching
    /// cast in progress is stopped.
    pub fn add_tag_restriction(&mut self, source: BuffId, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        let inserted = self.tag_restrictions.entry(tag.clone()).or_default().insert(source);
        if inserted
            && let Some(ability) = self.casting.ability
            && self.abilities.get(&ability).is_some_and(|i| i.definition().has_tag(&tag))
        {
            let now = self.now();
            self.force_stop_cast(InterruptSource::Buff(source), now);
        }
        inserted
    }

    pub fn remove_tag_restriction(&mut self, source: BuffId, tag: &str) -> bool {
        let Some(sources) = self.tag_restrictions.get_mut(tag) else {
            return false;
        };
        let removed = sources.remove(&source);
        if sources.is_empty() {
            self.tag_restrictions.remove(tag);
        }
        removed
    }

    pub fn is_tag_restricted(&self, definition: &AbilityDefinition) -> bool {
        definition
            .tags
            .iter()
            .any(|tag| self.tag_restrictions.contains_key(tag))
    }

    /// Marks the actor alive or dead. Death interrupts the active cast unless
    /// its ability is castable while dead.
    pub fn set_alive(&mut self, alive: bool) {
        if self.alive == alive {
            return;
        }
        self.alive = alive;
        if !alive
            && let Some(ability) = self.casting.ability
            && !self.abilities.get(&ability).is_some_and(|i| i.definition().castable_while_dead)
        {
            let now = self.now();
            let request = InterruptRequest::new(None, InterruptSource::Death).ignoring_restrictions();
            if let Err(reason) = self.interrupt_current_cast(request, now) {
                error!(
                    target: "combat::ability",
                    actor = %self.owner,
                    ability = %ability,
                    reason = %reason,
                    "death did not stop the cast"
                );
            }
        }
    }

    /// Applies a crowd control from `source`. Interrupts the active cast when
    /// its ability is restricted by the new control.
    pub fn apply_crowd_control(&mut self, source: BuffId, crowd_control: CrowdControl) {
        self.crowd_controls.insert(source, crowd_control);
        if let Some(ability) = self.casting.ability
            && self
                .abilities
                .get(&ability)
                .is_some_and(|i| i.definition().restricted_crowd_controls.intersects(crowd_control))
        {
            let now = self.now();
            let request = InterruptRequest::new(None, InterruptSource::CrowdControl);
            if let Err(reason) = self.interrupt_current_cast(request, now) {
                trace!(
                    target: "combat::ability",
                    actor = %self.owner,
                    reason = %reason,
                    "crowd control did not interrupt"
                );
            }
        }
    }

    pub fn remove_crowd_control(&mut self, source: BuffId) -> bool {
        self.crowd_controls.remove(&source).is_some()
    }

    // ===== validation =====

    /// Checks whether `ability` could be used right now.
    ///
    /// The first failing check wins: invalid ability, death, crowd control,
    /// global cooldown, active cast, charges, costs, tags, token, then custom
    /// restrictions.
    pub fn check_castable(&self, ability: AbilityId, tokens: Option<&AbilityTokenPool>) -> Result<(), CastFailReason> {
        let instance = self.abilities.get(&ability).ok_or(CastFailReason::InvalidAbility)?;
        let definition = instance.definition();
        if !self.alive && !definition.castable_while_dead {
            return Err(CastFailReason::Dead);
        }
        if self.crowd_control().intersects(definition.restricted_crowd_controls) {
            return Err(CastFailReason::CrowdControlled);
        }
        if definition.has_global_cooldown && self.global_cooldown.active {
            return Err(CastFailReason::OnGlobalCooldown);
        }
        if self.casting.is_casting() {
            return Err(CastFailReason::AlreadyCasting);
        }
        if !instance.charges_met() {
            return Err(if instance.max_charges() == 1 {
                CastFailReason::OnCooldown
            } else {
                CastFailReason::NoCharges
            });
        }
        if !self.resources.can_afford(&instance.costs()) {
            return Err(CastFailReason::CostsUnaffordable);
        }
        if self.is_tag_restricted(definition) {
            return Err(CastFailReason::TagRestricted);
        }
        if definition.requires_token {
            let holder = TokenHolder::new(self.owner, ability);
            if !tokens.is_some_and(|pool| pool.is_available(ability, holder)) {
                return Err(CastFailReason::Token);
            }
        }
        if self.cast_restrictions.is_restricted(definition) {
            return Err(CastFailReason::CustomRestriction);
        }
        Ok(())
    }

    // ===== replication =====

    /// Authoritative state for the owning client.
    pub fn snapshot(&self, version: u64) -> AbilitySnapshot {
        AbilitySnapshot {
            version,
            global_cooldown: self.global_cooldown,
            casting: self.casting,
            cooldowns: self
                .abilities
                .iter()
                .map(|(id, instance)| (*id, instance.cooldown()))
                .collect(),
            resources: self.resources.snapshot(),
            resource_prediction: self.resources.last_committed(),
            last_interrupt: self.last_interrupt,
        }
    }

    // ===== server tick bookkeeping =====

    pub(super) fn mark_tick_resolved(&mut self, tick: PredictedTick) {
        if self.resolved_ticks.len() >= RESOLVED_TICK_HISTORY {
            self.resolved_ticks.pop_front();
        }
        self.resolved_ticks.push_back(tick);
    }

    pub(super) fn buffer_tick_params(&mut self, tick: PredictedTick, params: CombatParameters) {
        if self.buffered_params.len() >= MAX_BUFFERED_TICK_PARAMS
            && let Some(oldest) = self.buffered_params.keys().next().copied()
        {
            self.buffered_params.remove(&oldest);
        }
        self.buffered_params.insert(tick, params);
    }
}

impl core::fmt::Debug for AbilityComponent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AbilityComponent")
            .field("owner", &self.owner)
            .field("role", &self.role)
            .field("abilities", &self.abilities.len())
            .field("global_cooldown", &self.global_cooldown)
            .field("casting", &self.casting)
            .field("alive", &self.alive)
            .field("pending_predictions", &self.predictions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restriction::{FnRestriction, RestrictionError};

    const MANA: ResourceId = ResourceId(1);

    fn component() -> AbilityComponent {
        let mut component = AbilityComponent::new(ActorId(1), ComponentRole::Authority, CombatConfig::default());
        component.resources_mut().add_resource(MANA, 100.0, 100.0);
        component
    }

    #[test]
    fn add_ability_rejects_duplicates_and_invalid_definitions() {
        let mut component = component();
        let bolt = AbilityDefinition::instant(AbilityId(1), "bolt");
        assert!(component.add_ability(bolt.clone()).is_ok());
        assert_eq!(component.add_ability(bolt), Err(CombatError::AlreadyActive));
        let broken = AbilityDefinition::channel(AbilityId(2), "broken", 0.0, 2);
        assert!(matches!(
            component.add_ability(broken),
            Err(CombatError::InvalidInput { .. })
        ));
        assert_eq!(
            component.drain_events(),
            vec![AbilityEvent::AbilityAdded(AbilityId(1))]
        );
    }

    #[test]
    fn acquisition_restriction_removes_owned_abilities() {
        let mut component = component();
        component
            .add_ability(AbilityDefinition::instant(AbilityId(1), "curse").with_tag("shadow"))
            .unwrap();
        component
            .add_ability(AbilityDefinition::instant(AbilityId(2), "smite").with_tag("holy"))
            .unwrap();
        let no_shadow = FnRestriction::new("no shadow", |d: &AbilityDefinition| {
            Ok::<_, RestrictionError>(d.has_tag("shadow"))
        });
        assert!(component.add_acquisition_restriction(Arc::new(no_shadow)));
        assert!(!component.has_ability(AbilityId(1)));
        assert!(component.has_ability(AbilityId(2)));
        assert!(component
            .drain_events()
            .contains(&AbilityEvent::AbilityRemoved(AbilityId(1))));
        assert_eq!(
            component.add_ability(AbilityDefinition::instant(AbilityId(3), "void").with_tag("shadow")),
            Err(CombatError::Restricted)
        );
    }

    #[test]
    fn validation_order_reports_first_failure() {
        let mut component = component();
        component
            .add_ability(
                AbilityDefinition::instant(AbilityId(1), "nova")
                    .with_cost(MANA, 500.0)
                    .with_tag("fire"),
            )
            .unwrap();
        assert_eq!(
            component.check_castable(AbilityId(9), None),
            Err(CastFailReason::InvalidAbility)
        );
        assert_eq!(
            component.check_castable(AbilityId(1), None),
            Err(CastFailReason::CostsUnaffordable)
        );
        component.apply_crowd_control(BuffId(1), CrowdControl::SILENCE);
        assert_eq!(
            component.check_castable(AbilityId(1), None),
            Err(CastFailReason::CrowdControlled)
        );
        component.set_alive(false);
        assert_eq!(component.check_castable(AbilityId(1), None), Err(CastFailReason::Dead));
    }

    #[test]
    fn root_does_not_block_default_abilities() {
        let mut component = component();
        component.add_ability(AbilityDefinition::instant(AbilityId(1), "bolt")).unwrap();
        component.apply_crowd_control(BuffId(2), CrowdControl::ROOT);
        assert_eq!(component.check_castable(AbilityId(1), None), Ok(()));
        assert!(component.remove_crowd_control(BuffId(2)));
    }

    #[test]
    fn tag_restrictions_track_sources() {
        let mut component = component();
        component
            .add_ability(AbilityDefinition::instant(AbilityId(1), "fireball").with_tag("fire"))
            .unwrap();
        assert!(component.add_tag_restriction(BuffId(1), "fire"));
        assert!(component.add_tag_restriction(BuffId(2), "fire"));
        assert!(!component.add_tag_restriction(BuffId(2), "fire"));
        assert_eq!(
            component.check_castable(AbilityId(1), None),
            Err(CastFailReason::TagRestricted)
        );
        component.remove_tag_restriction(BuffId(1), "fire");
        assert_eq!(
            component.check_castable(AbilityId(1), None),
            Err(CastFailReason::TagRestricted)
        );
        component.remove_tag_restriction(BuffId(2), "fire");
        assert_eq!(component.check_castable(AbilityId(1), None), Ok(()));
    }

    #[test]
    fn failing_custom_restriction_does_not_veto() {
        let mut component = component();
        component.add_ability(AbilityDefinition::instant(AbilityId(1), "bolt")).unwrap();
        component.cast_restrictions_mut().add_fn("broken", |_: &AbilityDefinition| {
            Err(RestrictionError::MissingContext("target"))
        });
        assert_eq!(component.check_castable(AbilityId(1), None), Ok(()));
        component
            .cast_restrictions_mut()
            .add_fn("always", |_: &AbilityDefinition| Ok(true));
        assert_eq!(
            component.check_castable(AbilityId(1), None),
            Err(CastFailReason::CustomRestriction)
        );
    }

    #[test]
    fn token_abilities_need_a_pool() {
        let mut component = component();
        component
            .add_ability(AbilityDefinition::instant(AbilityId(1), "slam").requiring_token())
            .unwrap();
        assert_eq!(component.check_castable(AbilityId(1), None), Err(CastFailReason::Token));
        let mut pool = AbilityTokenPool::new();
        pool.init_class(AbilityId(1), 1, 0.0);
        assert_eq!(component.check_castable(AbilityId(1), Some(&pool)), Ok(()));
    }

    #[test]
    fn handler_modifiers_apply_to_every_ability() {
        let mut component = component();
        component
            .add_ability(AbilityDefinition::instant(AbilityId(1), "a").with_global_cooldown(2.0))
            .unwrap();
        component
            .add_ability(AbilityDefinition::instant(AbilityId(2), "b").with_global_cooldown(1.0))
            .unwrap();
        component.update_handler_modifiers(|h| {
            h.global_cooldown
                .add("haste", |_: &AbilityDefinition| CombatModifier::multiplicative(0.5))
        });
        let lengths: Vec<f32> = component.abilities().map(AbilityInstance::global_cooldown_length).collect();
        assert_eq!(lengths, vec![1.0, CombatConfig::DEFAULT_MIN_GLOBAL_COOLDOWN]);
    }

    #[test]
    fn max_charge_modifiers_adjust_charges() {
        let mut component = component();
        component
            .add_ability(AbilityDefinition::instant(AbilityId(1), "dash").with_charges(2, 1, 1))
            .unwrap();
        let handle = component.add_ability_modifier(AbilityId(1), AbilityStat::MaxCharges, CombatModifier::additive(1.0));
        assert!(handle.is_valid());
        assert_eq!(component.charges(AbilityId(1)), Some(2));
        assert!(component.ability(AbilityId(1)).is_some_and(AbilityInstance::is_on_cooldown));
        assert!(component.remove_ability_modifier(AbilityId(1), AbilityStat::MaxCharges, handle));
        assert!(!component.ability(AbilityId(1)).is_some_and(AbilityInstance::is_on_cooldown));
    }
}
