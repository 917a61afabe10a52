//! What a threat table needs to know about the actors it tracks.

use crate::ids::{ActorId, BuffId, ListenerId};
use crate::modifier::{CombatModifier, ModifierProviders, apply_modifiers};
use crate::observer::Observers;
use crate::restriction::RestrictionList;

use super::{Faction, ThreatEvent};

/// Outgoing threat state of an actor that can appear in threat tables.
pub struct ThreatProfile {
    actor: ActorId,
    faction: Faction,
    /// `None` for actors that do not track health.
    alive: Option<bool>,
    can_be_in_threat_table: bool,
    fades: Vec<BuffId>,
    misdirects: Vec<(BuffId, ActorId)>,
    outgoing_modifiers: ModifierProviders<ThreatEvent>,
    outgoing_restrictions: RestrictionList<ThreatEvent>,
    fade_observers: Observers<bool>,
}

impl ThreatProfile {
    pub fn new(actor: ActorId, faction: Faction) -> Self {
        Self {
            actor,
            faction,
            alive: None,
            can_be_in_threat_table: true,
            fades: Vec::new(),
            misdirects: Vec::new(),
            outgoing_modifiers: ModifierProviders::new(),
            outgoing_restrictions: RestrictionList::new("outgoing_threat"),
            fade_observers: Observers::new(),
        }
    }

    /// Tracks health so dead generators are rejected.
    #[must_use]
    pub fn with_health(mut self, alive: bool) -> Self {
        self.alive = Some(alive);
        self
    }

    /// Actors that never appear in anyone's threat table (e.g. environment).
    #[must_use]
    pub fn untargetable(mut self) -> Self {
        self.can_be_in_threat_table = false;
        self
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn faction(&self) -> Faction {
        self.faction
    }

    pub fn set_faction(&mut self, faction: Faction) {
        self.faction = faction;
    }

    pub fn can_be_in_threat_table(&self) -> bool {
        self.can_be_in_threat_table
    }

    pub fn is_dead(&self) -> bool {
        self.alive == Some(false)
    }

    pub fn set_alive(&mut self, alive: bool) {
        if self.alive.is_some() {
            self.alive = Some(alive);
        }
    }

    // ===== fade =====

    pub fn is_faded(&self) -> bool {
        !self.fades.is_empty()
    }

    /// Returns true when this buff made the actor faded.
    pub fn add_fade(&mut self, source: BuffId) -> bool {
        if !self.can_be_in_threat_table || self.fades.contains(&source) {
            return false;
        }
        self.fades.push(source);
        let changed = self.fades.len() == 1;
        if changed {
            self.fade_observers.notify(&true);
        }
        changed
    }

    /// Returns true when removing this buff ended the fade.
    pub fn remove_fade(&mut self, source: BuffId) -> bool {
        let before = self.fades.len();
        self.fades.retain(|fade| *fade != source);
        let changed = before > 0 && self.fades.is_empty();
        if changed {
            self.fade_observers.notify(&false);
        }
        changed
    }

    pub fn subscribe_fade_status(
        &mut self,
        id: ListenerId,
        callback: impl FnMut(&bool) + Send + 'static,
    ) -> bool {
        self.fade_observers.subscribe(id, callback)
    }

    pub fn unsubscribe_fade_status(&mut self, id: ListenerId) -> bool {
        self.fade_observers.unsubscribe(id)
    }

    // ===== misdirect =====

    /// Redirects this actor's generated threat to `target`. One entry per buff.
    pub fn add_misdirect(&mut self, source: BuffId, target: ActorId) -> bool {
        if self.misdirects.iter().any(|(buff, _)| *buff == source) {
            return false;
        }
        self.misdirects.push((source, target));
        true
    }

    pub fn remove_misdirect(&mut self, source: BuffId) -> bool {
        let before = self.misdirects.len();
        self.misdirects.retain(|(buff, _)| *buff != source);
        before != self.misdirects.len()
    }

    /// Most recently added misdirect wins.
    pub fn misdirect_target(&self) -> Option<ActorId> {
        self.misdirects.last().map(|(_, target)| *target)
    }

    // ===== outgoing modifiers and restrictions =====

    pub fn outgoing_modifiers_mut(&mut self) -> &mut ModifierProviders<ThreatEvent> {
        &mut self.outgoing_modifiers
    }

    pub fn outgoing_restrictions_mut(&mut self) -> &mut RestrictionList<ThreatEvent> {
        &mut self.outgoing_restrictions
    }

    /// Applies outgoing modifiers plus the source's own modifier to `event.threat`.
    pub fn modified_outgoing(&self, event: &ThreatEvent, source: Option<&CombatModifier>) -> f32 {
        let mut mods = self.outgoing_modifiers.collect(event);
        if let Some(source) = source
            && source.is_valid()
        {
            mods.push(source.clone());
        }
        apply_modifiers(&mods, event.threat)
    }

    pub fn is_outgoing_restricted(&self, event: &ThreatEvent) -> bool {
        self.outgoing_restrictions.is_restricted(event)
    }
}

impl core::fmt::Debug for ThreatProfile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreatProfile")
            .field("actor", &self.actor)
            .field("faction", &self.faction)
            .field("alive", &self.alive)
            .field("faded", &self.is_faded())
            .field("misdirect", &self.misdirect_target())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fade_reports_only_transitions() {
        let mut profile = ThreatProfile::new(ActorId(1), Faction::Player);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        profile.subscribe_fade_status(ListenerId(1), move |faded| sink.lock().unwrap().push(*faded));

        assert!(profile.add_fade(BuffId(1)));
        assert!(!profile.add_fade(BuffId(2)));
        assert!(!profile.add_fade(BuffId(2)));
        assert!(!profile.remove_fade(BuffId(1)));
        assert!(profile.remove_fade(BuffId(2)));
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn last_misdirect_wins() {
        let mut profile = ThreatProfile::new(ActorId(1), Faction::Player);
        profile.add_misdirect(BuffId(1), ActorId(10));
        profile.add_misdirect(BuffId(2), ActorId(20));
        assert!(!profile.add_misdirect(BuffId(2), ActorId(30)));
        assert_eq!(profile.misdirect_target(), Some(ActorId(20)));
        profile.remove_misdirect(BuffId(2));
        assert_eq!(profile.misdirect_target(), Some(ActorId(10)));
    }

    #[test]
    fn outgoing_modifiers_include_source_modifier() {
        let mut profile = ThreatProfile::new(ActorId(1), Faction::Player);
        profile
            .outgoing_modifiers_mut()
            .add("tank_stance", |_| CombatModifier::multiplicative(2.0));
        let event = ThreatEvent {
            threat: 10.0,
            ..ThreatEvent::default()
        };
        let source = CombatModifier::additive(5.0);
        assert_eq!(profile.modified_outgoing(&event, Some(&source)), 30.0);
        assert_eq!(profile.modified_outgoing(&event, None), 20.0);
    }

    #[test]
    fn untracked_health_is_never_dead() {
        let mut profile = ThreatProfile::new(ActorId(1), Faction::Enemy);
        profile.set_alive(false);
        assert!(!profile.is_dead());
        let mut tracked = ThreatProfile::new(ActorId(2), Faction::Enemy).with_health(true);
        tracked.set_alive(false);
        assert!(tracked.is_dead());
    }
}
