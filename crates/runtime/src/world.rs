//! Authoritative combat simulation owned by the server.
//!
//! [`CombatWorld`] holds every actor, the shared NPC token pool and the
//! server half of the prediction protocol. It is driven by [`CombatWorld::step`],
//! which processes one server step in a fixed order: timers fire, then client
//! messages are handled, then snapshots are sent to owning clients.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use combat_content::AbilityCatalog;
use combat_core::{
    AbilityId, AbilityTokenPool, ActorId, BuffId, CastOutcome, CombatActor, CombatConfig,
    ComponentRole, Faction, InterruptEvent, InterruptRequest, ListenerId, PredictionServer,
    ResourceId, ThreatEvent, ThreatProfile, ThreatRequest, ThreatTable,
};

use crate::api::{Result, RuntimeError};
use crate::events::{AbilityNotice, Event, EventBus, PredictionNotice, ThreatNotice};
use crate::transport::LoopbackTransport;

/// Listener id the world uses on every NPC threat table.
const WORLD_LISTENER: ListenerId = ListenerId(0);

/// Everything needed to bring an actor into the world.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSpec {
    pub id: ActorId,
    pub faction: Faction,
    pub abilities: Vec<AbilityId>,
    /// `(resource, maximum)`; pools start full.
    pub resources: Vec<(ResourceId, f32)>,
    /// Latency the server hides for this actor's predicted casts.
    pub ping_compensation: f32,
}

impl ActorSpec {
    pub fn player(id: ActorId) -> Self {
        Self {
            id,
            faction: Faction::Player,
            abilities: Vec::new(),
            resources: Vec::new(),
            ping_compensation: 0.0,
        }
    }

    pub fn npc(id: ActorId, faction: Faction) -> Self {
        Self {
            faction,
            ..Self::player(id)
        }
    }

    #[must_use]
    pub fn with_ability(mut self, ability: AbilityId) -> Self {
        self.abilities.push(ability);
        self
    }

    #[must_use]
    pub fn with_resource(mut self, resource: ResourceId, maximum: f32) -> Self {
        self.resources.push((resource, maximum));
        self
    }

    #[must_use]
    pub fn with_ping_compensation(mut self, seconds: f32) -> Self {
        self.ping_compensation = seconds;
        self
    }
}

/// Read-only view of one actor, as exposed to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorView {
    pub id: ActorId,
    pub alive: bool,
    pub casting: Option<AbilityId>,
    pub global_cooldown_remaining: f32,
    pub charges: Vec<(AbilityId, i32)>,
    pub resources: Vec<(ResourceId, f32)>,
    pub current_target: Option<ActorId>,
    pub in_combat: bool,
    /// Threat entries, current target last.
    pub threat: Vec<(ActorId, f32)>,
}

/// Counters of one [`CombatWorld::step`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    pub time: f32,
    pub messages_handled: usize,
    pub snapshots_sent: usize,
}

pub struct CombatWorld {
    config: CombatConfig,
    now: f32,
    actors: BTreeMap<ActorId, CombatActor>,
    roster: HashMap<ActorId, ThreatProfile>,
    tokens: AbilityTokenPool,
    server: PredictionServer,
    links: BTreeMap<ActorId, LoopbackTransport>,
    catalog: AbilityCatalog,
    bus: EventBus,
    threat_tx: mpsc::UnboundedSender<ThreatNotice>,
    threat_rx: mpsc::UnboundedReceiver<ThreatNotice>,
}

impl CombatWorld {
    pub fn new(config: CombatConfig, catalog: AbilityCatalog, tokens: AbilityTokenPool, bus: EventBus) -> Self {
        let (threat_tx, threat_rx) = mpsc::unbounded_channel();
        Self {
            config,
            now: 0.0,
            actors: BTreeMap::new(),
            roster: HashMap::new(),
            tokens,
            server: PredictionServer::new(),
            links: BTreeMap::new(),
            catalog,
            bus,
            threat_tx,
            threat_rx,
        }
    }

    pub fn now(&self) -> f32 {
        self.now
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    pub fn catalog(&self) -> &AbilityCatalog {
        &self.catalog
    }

    pub fn tokens(&self) -> &AbilityTokenPool {
        &self.tokens
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn actor(&self, id: ActorId) -> Option<&CombatActor> {
        self.actors.get(&id)
    }

    pub fn actor_ids(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.actors.keys().copied()
    }

    // ===== actors =====

    /// Adds a player-controlled actor and returns the client end of its link.
    pub fn spawn_player(&mut self, spec: ActorSpec) -> Result<LoopbackTransport> {
        let actor =
            CombatActor::player(spec.id, ComponentRole::Authority, self.config.clone()).starting_at(self.now);
        self.insert_actor(actor, &spec)?;
        self.server.set_ping_compensation(spec.id, spec.ping_compensation);

        let (client, server_end) = LoopbackTransport::pair();
        self.links.insert(spec.id, server_end);
        info!(target: "runtime::world", actor = %spec.id, "player joined");
        Ok(client)
    }

    /// Adds a server-driven actor with a threat table.
    pub fn spawn_npc(&mut self, spec: ActorSpec) -> Result<()> {
        let mut actor = CombatActor::npc(spec.id, spec.faction, self.config.clone()).starting_at(self.now);
        if let Some(table) = actor.threat_mut() {
            let targets = self.threat_tx.clone();
            table.subscribe_target_changed(WORLD_LISTENER, move |change| {
                let _ = targets.send(ThreatNotice::TargetChanged(*change));
            });
            let combat = self.threat_tx.clone();
            let owner = spec.id;
            table.subscribe_combat_changed(WORLD_LISTENER, move |in_combat| {
                let _ = combat.send(ThreatNotice::CombatChanged {
                    owner,
                    in_combat: *in_combat,
                });
            });
        }
        self.insert_actor(actor, &spec)?;
        info!(target: "runtime::world", actor = %spec.id, faction = %spec.faction, "npc spawned");
        Ok(())
    }

    fn insert_actor(&mut self, mut actor: CombatActor, spec: &ActorSpec) -> Result<()> {
        if self.actors.contains_key(&spec.id) {
            return Err(RuntimeError::DuplicateActor { actor: spec.id });
        }
        let abilities = actor.abilities_mut();
        self.catalog
            .grant(abilities, &spec.abilities)
            .map_err(RuntimeError::content)?;
        for &(resource, maximum) in &spec.resources {
            abilities.resources_mut().add_resource(resource, maximum, maximum);
        }
        // Drop the AbilityAdded noise of the initial grant.
        abilities.drain_events();

        self.roster
            .insert(spec.id, ThreatProfile::new(spec.id, spec.faction).with_health(true));
        self.actors.insert(spec.id, actor);
        Ok(())
    }

    /// Removes an actor, its link and every threat entry pointing at it.
    pub fn despawn(&mut self, id: ActorId) -> Result<()> {
        let mut actor = self
            .actors
            .remove(&id)
            .ok_or(RuntimeError::UnknownActor { actor: id })?;
        actor.set_alive(false);
        actor.return_tokens(&mut self.tokens);
        self.roster.remove(&id);
        self.links.remove(&id);
        self.server.remove_actor(id);
        self.forget_target(id);
        self.flush();
        info!(target: "runtime::world", actor = %id, "actor left");
        Ok(())
    }

    /// Death stops the actor's cast, empties its own threat table and takes
    /// it out of every other table.
    pub fn set_alive(&mut self, id: ActorId, alive: bool) -> Result<()> {
        let actor = self
            .actors
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownActor { actor: id })?;
        actor.set_alive(alive);
        actor.return_tokens(&mut self.tokens);
        if let Some(profile) = self.roster.get_mut(&id) {
            profile.set_alive(alive);
        }
        if !alive {
            self.forget_target(id);
        }
        self.flush();
        Ok(())
    }

    fn forget_target(&mut self, target: ActorId) {
        for table in self.actors.values_mut().filter_map(CombatActor::threat_mut) {
            table.remove_target(target);
        }
    }

    // ===== server-initiated actions =====

    /// Casts without a client prediction, drawing tokens from the shared pool.
    pub fn use_ability(&mut self, id: ActorId, ability: AbilityId) -> Result<CastOutcome> {
        let actor = self
            .actors
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownActor { actor: id })?;
        let outcome = actor.use_ability(ability, self.now, &mut self.tokens);
        self.flush();
        outcome.map_err(|rejection| {
            debug!(
                target: "runtime::world",
                actor = %id,
                ability = %ability,
                reason = %rejection.reason,
                "server cast rejected"
            );
            RuntimeError::Cast { actor: id, rejection }
        })
    }

    /// Whether `id` could cast `ability` right now, token included.
    pub fn can_use(&self, id: ActorId, ability: AbilityId) -> Result<bool> {
        let actor = self.actors.get(&id).ok_or(RuntimeError::UnknownActor { actor: id })?;
        Ok(actor.can_use(ability, &self.tokens))
    }

    pub fn interrupt(&mut self, id: ActorId, request: InterruptRequest) -> Result<InterruptEvent> {
        let actor = self
            .actors
            .get_mut(&id)
            .ok_or(RuntimeError::UnknownActor { actor: id })?;
        let result = actor.abilities_mut().interrupt_current_cast(request, self.now);
        actor.return_tokens(&mut self.tokens);
        self.flush();
        result.map_err(|reason| RuntimeError::Interrupt { actor: id, reason })
    }

    // ===== threat =====

    pub fn add_threat(&mut self, npc: ActorId, request: ThreatRequest) -> Result<ThreatEvent> {
        let table = threat_table(&mut self.actors, npc)?;
        let event = table.add_threat(&request, &self.roster);
        self.flush();
        Ok(event)
    }

    pub fn taunt(&mut self, npc: ActorId, applied_by: ActorId) -> Result<ThreatEvent> {
        let table = threat_table(&mut self.actors, npc)?;
        let event = table.taunt(applied_by, &self.roster);
        self.flush();
        Ok(event)
    }

    /// Applies or removes a fixate from `source`. Returns whether anything changed.
    pub fn set_fixate(&mut self, npc: ActorId, target: ActorId, source: BuffId, active: bool) -> Result<bool> {
        let table = threat_table(&mut self.actors, npc)?;
        let changed = if active {
            table.add_fixate(target, source, &self.roster)
        } else {
            table.remove_fixate(target, source)
        };
        self.flush();
        Ok(changed)
    }

    pub fn set_blind(&mut self, npc: ActorId, target: ActorId, source: BuffId, active: bool) -> Result<bool> {
        let table = threat_table(&mut self.actors, npc)?;
        let changed = if active {
            table.add_blind(target, source, &self.roster)
        } else {
            table.remove_blind(target, source)
        };
        self.flush();
        Ok(changed)
    }

    // ===== simulation step =====

    /// Advances the world to `now + dt`.
    pub fn step(&mut self, dt: f32) -> StepReport {
        self.now += dt.max(0.0);
        let now = self.now;
        let mut report = StepReport {
            time: now,
            ..StepReport::default()
        };

        // Timers.
        for actor in self.actors.values_mut() {
            actor.advance(now, Some(&mut self.tokens));
        }
        self.tokens.advance(now);
        self.flush();

        // Client messages.
        for (&id, link) in self.links.iter_mut() {
            let Some(actor) = self.actors.get_mut(&id) else {
                continue;
            };
            let messages = match link.receive() {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(target: "runtime::world", actor = %id, error = %err, "client link unavailable");
                    continue;
                }
            };
            for message in messages {
                let update = self
                    .server
                    .handle_message(id, actor.abilities_mut(), message, now, link);
                self.bus.publish(Event::Prediction(PredictionNotice::Handled { actor: id, update }));
                report.messages_handled += 1;
            }
            actor.return_tokens(&mut self.tokens);
        }
        self.flush();

        // Replication.
        for (&id, link) in self.links.iter_mut() {
            if let Some(actor) = self.actors.get(&id) {
                let version = self.server.replicate(id, actor.abilities(), link);
                self.bus
                    .publish(Event::Prediction(PredictionNotice::Replicated { actor: id, version }));
                report.snapshots_sent += 1;
            }
        }

        report
    }

    /// Publishes whatever the components reported since the last flush and
    /// tells owning clients about dropped ticks.
    fn flush(&mut self) {
        for (&id, actor) in self.actors.iter_mut() {
            let events = actor.abilities_mut().drain_events();
            if events.is_empty() {
                continue;
            }
            if let Some(link) = self.links.get_mut(&id) {
                self.server.forward_dropped_ticks(&events, link);
            }
            for event in events {
                self.bus.publish(Event::Ability(AbilityNotice {
                    actor: id,
                    time: self.now,
                    event,
                }));
            }
        }
        while let Ok(notice) = self.threat_rx.try_recv() {
            self.bus.publish(Event::Threat(notice));
        }
        for change in self.tokens.drain_changes() {
            self.bus.publish(Event::Tokens(change));
        }
    }

    // ===== queries =====

    pub fn view(&self, id: ActorId) -> Result<ActorView> {
        let actor = self.actors.get(&id).ok_or(RuntimeError::UnknownActor { actor: id })?;
        let abilities = actor.abilities();
        let table = actor.threat();
        Ok(ActorView {
            id,
            alive: abilities.is_alive(),
            casting: abilities.casting().ability,
            global_cooldown_remaining: abilities.global_cooldown().remaining(self.now),
            charges: abilities
                .abilities()
                .map(|instance| (instance.id(), instance.charges()))
                .collect(),
            resources: abilities
                .resources()
                .snapshot()
                .into_iter()
                .map(|state| (state.resource, state.current))
                .collect(),
            current_target: actor.current_target(),
            in_combat: table.is_some_and(|table| table.in_combat()),
            threat: table
                .map(|table| {
                    table
                        .targets()
                        .iter()
                        .map(|entry| (entry.target, entry.threat))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn threat_table(
    actors: &mut BTreeMap<ActorId, CombatActor>,
    npc: ActorId,
) -> Result<&mut ThreatTable> {
    actors
        .get_mut(&npc)
        .ok_or(RuntimeError::UnknownActor { actor: npc })?
        .threat_mut()
        .ok_or(RuntimeError::NoThreatTable { actor: npc })
}
