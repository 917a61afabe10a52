//! Aggregate of the combat components owned by one actor.

use tracing::warn;

use crate::ability::{AbilityComponent, CastContext, CastOutcome, CastRejection, ComponentRole};
use crate::config::CombatConfig;
use crate::ids::{AbilityId, ActorId};
use crate::threat::{Faction, ThreatTable};
use crate::tokens::{AbilityTokenPool, TokenHolder};

/// One combatant. Players own only abilities; NPCs also own a threat table
/// and cast through the shared token pool.
#[derive(Debug)]
pub struct CombatActor {
    id: ActorId,
    abilities: AbilityComponent,
    threat: Option<ThreatTable>,
}

impl CombatActor {
    /// A player-controlled actor. The server runs it as
    /// [`ComponentRole::Authority`], its owning client as
    /// [`ComponentRole::Predicted`].
    pub fn player(id: ActorId, role: ComponentRole, config: CombatConfig) -> Self {
        Self {
            id,
            abilities: AbilityComponent::new(id, role, config),
            threat: None,
        }
    }

    /// A server-driven actor that picks targets by threat.
    pub fn npc(id: ActorId, faction: Faction, config: CombatConfig) -> Self {
        let threat = ThreatTable::new(id, faction, &config);
        Self {
            id,
            abilities: AbilityComponent::new(id, ComponentRole::Authority, config),
            threat: Some(threat),
        }
    }

    /// Starts every timer clock of the actor at `now`, for actors that join
    /// a simulation already under way.
    #[must_use]
    pub fn starting_at(self, now: f32) -> Self {
        Self {
            id: self.id,
            abilities: self.abilities.starting_at(now),
            threat: self.threat.map(|table| table.starting_at(now)),
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn abilities(&self) -> &AbilityComponent {
        &self.abilities
    }

    pub fn abilities_mut(&mut self) -> &mut AbilityComponent {
        &mut self.abilities
    }

    pub fn threat(&self) -> Option<&ThreatTable> {
        self.threat.as_ref()
    }

    pub fn threat_mut(&mut self) -> Option<&mut ThreatTable> {
        self.threat.as_mut()
    }

    pub fn current_target(&self) -> Option<ActorId> {
        self.threat.as_ref().and_then(ThreatTable::current_target)
    }

    /// Death stops the active cast and empties the threat table.
    pub fn set_alive(&mut self, alive: bool) {
        self.abilities.set_alive(alive);
        if let Some(threat) = self.threat.as_mut() {
            threat.set_owner_alive(alive);
        }
    }

    /// Unpredicted cast drawing tokens from `tokens`.
    pub fn use_ability(
        &mut self,
        ability: AbilityId,
        now: f32,
        tokens: &mut AbilityTokenPool,
    ) -> Result<CastOutcome, CastRejection> {
        let ctx = CastContext::new(now).with_tokens(tokens);
        let outcome = self.abilities.use_ability(ability, ctx);
        self.return_tokens(tokens);
        outcome
    }

    /// Whether `ability` is castable right now, token included.
    pub fn can_use(&self, ability: AbilityId, tokens: &AbilityTokenPool) -> bool {
        self.abilities.check_castable(ability, Some(tokens)).is_ok()
    }

    /// Advances every timer of the actor and returns tokens of finished casts.
    pub fn advance(&mut self, now: f32, tokens: Option<&mut AbilityTokenPool>) {
        self.abilities.advance(now);
        if let Some(threat) = self.threat.as_mut() {
            threat.advance(now);
        }
        if let Some(tokens) = tokens {
            self.return_tokens(tokens);
        }
    }

    /// Hands tokens of casts that ended back to the pool.
    pub fn return_tokens(&mut self, tokens: &mut AbilityTokenPool) {
        for ability in self.abilities.take_token_returns() {
            if let Err(error) = tokens.return_token(ability, TokenHolder::new(self.id, ability)) {
                warn!(
                    target: "combat::tokens",
                    actor = %self.id,
                    ability = %ability,
                    error = %error,
                    "finished cast held no token"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ability::{AbilityDefinition, CastFailReason};
    use crate::threat::{ThreatKind, ThreatProfile, ThreatRequest};

    const SMASH: AbilityId = AbilityId(1);

    fn ogre(id: u32) -> CombatActor {
        let mut npc = CombatActor::npc(ActorId(id), Faction::Enemy, CombatConfig::default());
        npc.abilities_mut()
            .add_ability(
                AbilityDefinition::channel(SMASH, "smash", 1.0, 1)
                    .requiring_token()
                    .without_global_cooldown(),
            )
            .unwrap();
        npc
    }

    #[test]
    fn npcs_share_one_token() {
        let mut pool = AbilityTokenPool::new();
        pool.init_class(SMASH, 1, 0.0);
        let mut first = ogre(1);
        let mut second = ogre(2);

        assert!(first.use_ability(SMASH, 0.0, &mut pool).is_ok());
        assert!(!second.can_use(SMASH, &pool));
        let rejection = second.use_ability(SMASH, 0.0, &mut pool).unwrap_err();
        assert_eq!(rejection.reason, CastFailReason::Token);

        first.advance(1.0, Some(&mut pool));
        pool.advance(1.0);
        pool.advance(1.1);
        assert!(second.use_ability(SMASH, 1.1, &mut pool).is_ok());
    }

    #[test]
    fn late_joiner_decays_on_its_own_clock() {
        let config = CombatConfig::default();
        let interval = config.threat_decay_interval;
        let mut npc = CombatActor::npc(ActorId(3), Faction::Enemy, config).starting_at(100.0);
        let roster: HashMap<ActorId, ThreatProfile> =
            HashMap::from([(ActorId(7), ThreatProfile::new(ActorId(7), Faction::Player))]);
        if let Some(table) = npc.threat_mut() {
            table.add_threat(&ThreatRequest::new(ThreatKind::Damage, 100.0, ActorId(7)), &roster);
        }

        npc.advance(100.05, None);
        let threat = npc.threat().map(|table| table.threat_of(ActorId(7)));
        assert_eq!(threat, Some(100.0));
        assert!((npc.abilities().now() - 100.05).abs() < 1e-4);

        npc.advance(100.0 + interval + 0.01, None);
        let threat = npc.threat().map(|table| table.threat_of(ActorId(7))).unwrap_or_default();
        assert!(threat < 100.0);
        assert!(threat > 50.0);
    }

    #[test]
    fn death_clears_threat_and_cast() {
        let mut pool = AbilityTokenPool::new();
        pool.init_class(SMASH, 1, 0.0);
        let mut npc = ogre(1);
        let roster: HashMap<ActorId, ThreatProfile> =
            HashMap::from([(ActorId(7), ThreatProfile::new(ActorId(7), Faction::Player))]);
        let request = ThreatRequest::new(ThreatKind::Damage, 10.0, ActorId(7));
        if let Some(table) = npc.threat_mut() {
            table.add_threat(&request, &roster);
        }
        assert_eq!(npc.current_target(), Some(ActorId(7)));

        npc.use_ability(SMASH, 0.0, &mut pool).unwrap();
        npc.set_alive(false);
        assert!(!npc.abilities().is_casting());
        assert_eq!(npc.current_target(), None);
        npc.return_tokens(&mut pool);
        pool.advance(0.1);
        assert_eq!(pool.available_count(SMASH), 1);
    }
}
