//! Per-NPC threat table: accumulation, target selection and decay.

use tracing::{debug, trace};

use crate::config::CombatConfig;
use crate::ids::{ActorId, BuffId, ListenerId};
use crate::modifier::{ModifierProviders, apply_modifiers};
use crate::observer::Observers;
use crate::restriction::RestrictionList;
use crate::scheduler::{Scheduler, TimerHandle};

use super::{Faction, ThreatEvent, ThreatKind, ThreatRequest, ThreatRoster, ThreatTarget};

/// Notification emitted when the current target changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetChange {
    pub owner: ActorId,
    pub previous: Option<ActorId>,
    pub current: Option<ActorId>,
}

#[derive(Clone, Copy, Debug)]
struct DecayPulse;

/// Ordered threat list of one NPC.
///
/// Entries are kept sorted ascending by [`ThreatTarget::priority_cmp`]; the last
/// entry is the current target. Only the owning simulation mutates a table.
pub struct ThreatTable {
    owner: ActorId,
    faction: Faction,
    owner_alive: bool,
    healing_modifier: f32,
    taunt_percentage: f32,
    decay_percentage: f32,
    decay_interval: f32,
    entries: Vec<ThreatTarget>,
    current_target: Option<ActorId>,
    incoming_modifiers: ModifierProviders<ThreatEvent>,
    incoming_restrictions: RestrictionList<ThreatEvent>,
    timers: Scheduler<DecayPulse>,
    decay: Option<TimerHandle>,
    target_observers: Observers<TargetChange>,
    combat_observers: Observers<bool>,
}

impl ThreatTable {
    pub fn new(owner: ActorId, faction: Faction, config: &CombatConfig) -> Self {
        Self {
            owner,
            faction,
            owner_alive: true,
            healing_modifier: config.healing_threat_modifier,
            taunt_percentage: config.taunt_threat_percentage,
            decay_percentage: config.threat_decay_percentage,
            decay_interval: config.threat_decay_interval,
            entries: Vec::new(),
            current_target: None,
            incoming_modifiers: ModifierProviders::new(),
            incoming_restrictions: RestrictionList::new("incoming_threat"),
            timers: Scheduler::new(),
            decay: None,
            target_observers: Observers::new(),
            combat_observers: Observers::new(),
        }
    }

    /// Starts the decay clock at `now` instead of zero.
    #[must_use]
    pub fn starting_at(mut self, now: f32) -> Self {
        self.timers = Scheduler::starting_at(now);
        self
    }

    // ===== queries =====

    pub fn owner(&self) -> ActorId {
        self.owner
    }

    pub fn current_target(&self) -> Option<ActorId> {
        self.current_target
    }

    pub fn in_combat(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, target: ActorId) -> bool {
        self.index_of(target).is_some()
    }

    /// Raw threat of `target`, zero when absent.
    pub fn threat_of(&self, target: ActorId) -> f32 {
        self.index_of(target)
            .map(|index| self.entries[index].threat)
            .unwrap_or_default()
    }

    /// Entries from lowest to highest priority.
    pub fn targets(&self) -> &[ThreatTarget] {
        &self.entries
    }

    /// True while decay pulses are scheduled.
    pub fn is_decaying(&self) -> bool {
        self.decay.as_ref().is_some_and(TimerHandle::is_active)
    }

    fn index_of(&self, target: ActorId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.target == target)
    }

    // ===== observers and pipeline hooks =====

    pub fn subscribe_target_changed(
        &mut self,
        id: ListenerId,
        callback: impl FnMut(&TargetChange) + Send + 'static,
    ) -> bool {
        self.target_observers.subscribe(id, callback)
    }

    pub fn unsubscribe_target_changed(&mut self, id: ListenerId) -> bool {
        self.target_observers.unsubscribe(id)
    }

    pub fn subscribe_combat_changed(
        &mut self,
        id: ListenerId,
        callback: impl FnMut(&bool) + Send + 'static,
    ) -> bool {
        self.combat_observers.subscribe(id, callback)
    }

    pub fn unsubscribe_combat_changed(&mut self, id: ListenerId) -> bool {
        self.combat_observers.unsubscribe(id)
    }

    pub fn incoming_modifiers_mut(&mut self) -> &mut ModifierProviders<ThreatEvent> {
        &mut self.incoming_modifiers
    }

    pub fn incoming_restrictions_mut(&mut self) -> &mut RestrictionList<ThreatEvent> {
        &mut self.incoming_restrictions
    }

    // ===== threat =====

    /// Applies threat from `request.applied_by`, honoring misdirects, modifiers
    /// and restrictions. A failed event leaves the table untouched.
    pub fn add_threat(&mut self, request: &ThreatRequest, roster: &impl ThreatRoster) -> ThreatEvent {
        let mut event = ThreatEvent {
            kind: request.kind,
            applied_by: request.applied_by,
            generator: request.applied_by,
            applied_to: self.owner,
            source: request.source,
            ..ThreatEvent::default()
        };
        if !self.owner_alive || request.base_amount <= 0.0 {
            return event;
        }
        let Some(generator) = roster.profile(request.applied_by) else {
            debug!(target: "combat::threat", owner = %self.owner, applied_by = %request.applied_by, "unknown threat generator");
            return event;
        };
        if !generator.can_be_in_threat_table() {
            return event;
        }

        let misdirect = generator
            .misdirect_target()
            .and_then(|target| roster.profile(target))
            .filter(|profile| {
                profile.can_be_in_threat_table()
                    && !profile.is_dead()
                    && profile.faction() != self.faction
            });
        let credited = match misdirect {
            Some(profile) => profile,
            None => {
                if generator.is_dead() || generator.faction() == self.faction {
                    return event;
                }
                generator
            }
        };
        event.applied_by = credited.actor();
        event.threat = request.base_amount;
        if request.kind == ThreatKind::Healing {
            event.threat *= self.healing_modifier;
        }

        if !request.ignore_modifiers {
            // Outgoing modifiers always come from the generator, even when misdirected.
            event.threat = generator.modified_outgoing(&event, request.source_modifier.as_ref());
            event.threat = apply_modifiers(&self.incoming_modifiers.collect(&event), event.threat);
            if event.threat <= 0.0 {
                return event;
            }
        }

        if !request.ignore_restrictions
            && (self.incoming_restrictions.is_restricted(&event)
                || generator.is_outgoing_restricted(&event))
        {
            debug!(target: "combat::threat", owner = %self.owner, applied_by = %event.applied_by, "threat restricted");
            return event;
        }

        let (index, added) = self.find_or_insert(credited.actor(), credited.is_faded());
        self.entries[index].threat += event.threat;
        self.resort(index);
        event.initial_threat = added;
        event.success = true;
        trace!(
            target: "combat::threat",
            owner = %self.owner,
            applied_by = %event.applied_by,
            threat = event.threat,
            total = self.threat_of(event.applied_by),
            "threat added"
        );
        event
    }

    /// Subtracts raw threat from `target`, flooring at zero. Entries stay in the table.
    pub fn remove_threat(&mut self, amount: f32, target: ActorId) {
        if amount <= 0.0 {
            return;
        }
        let Some(index) = self.index_of(target) else {
            return;
        };
        let entry = &mut self.entries[index];
        entry.threat = (entry.threat - amount).max(0.0);
        self.resort(index);
    }

    /// Raises `applied_by` to the highest raw threat times the taunt percentage.
    /// Never lowers threat.
    pub fn taunt(&mut self, applied_by: ActorId, roster: &impl ThreatRoster) -> ThreatEvent {
        // Highest raw threat, not the current target, which may be fixated or blinded.
        let highest = self
            .entries
            .iter()
            .map(|entry| entry.threat)
            .fold(0.0_f32, f32::max);
        let amount = (highest * self.taunt_percentage - self.threat_of(applied_by)).max(0.0);
        self.add_threat(&ThreatRequest::absolute(amount, applied_by), roster)
    }

    /// Removes `percentage` (clamped to `[0, 1]`) of `target`'s threat.
    pub fn drop_threat(&mut self, target: ActorId, percentage: f32) {
        let amount = self.threat_of(target) * percentage.clamp(0.0, 1.0);
        if amount > 0.0 {
            self.remove_threat(amount, target);
        }
    }

    /// Moves `percentage` (clamped to `[0, 1]`) of `from`'s threat onto `to`.
    pub fn transfer_threat(
        &mut self,
        from: ActorId,
        to: ActorId,
        percentage: f32,
        roster: &impl ThreatRoster,
    ) -> ThreatEvent {
        let amount = self.threat_of(from) * percentage.clamp(0.0, 1.0);
        if amount <= 0.0 {
            return ThreatEvent {
                applied_by: to,
                generator: to,
                applied_to: self.owner,
                kind: ThreatKind::Absolute,
                ..ThreatEvent::default()
            };
        }
        self.remove_threat(amount, from);
        self.add_threat(&ThreatRequest::absolute(amount, to), roster)
    }

    // ===== priority effects =====

    /// Fixates the owner on `target`, entering it at zero threat when absent.
    pub fn add_fixate(&mut self, target: ActorId, source: BuffId, roster: &impl ThreatRoster) -> bool {
        self.add_effect(target, source, roster, |entry| &mut entry.fixates)
    }

    pub fn remove_fixate(&mut self, target: ActorId, source: BuffId) -> bool {
        self.remove_effect(target, source, |entry| &mut entry.fixates)
    }

    /// Blinds the owner to `target`, entering it at zero threat when absent.
    pub fn add_blind(&mut self, target: ActorId, source: BuffId, roster: &impl ThreatRoster) -> bool {
        self.add_effect(target, source, roster, |entry| &mut entry.blinds)
    }

    pub fn remove_blind(&mut self, target: ActorId, source: BuffId) -> bool {
        self.remove_effect(target, source, |entry| &mut entry.blinds)
    }

    /// Mirrors a fade status change of `target` into this table.
    pub fn notify_fade_status(&mut self, target: ActorId, faded: bool) {
        if let Some(index) = self.index_of(target)
            && self.entries[index].faded != faded
        {
            self.entries[index].faded = faded;
            self.resort(index);
        }
    }

    fn add_effect(
        &mut self,
        target: ActorId,
        source: BuffId,
        roster: &impl ThreatRoster,
        effects: impl Fn(&mut ThreatTarget) -> &mut Vec<BuffId>,
    ) -> bool {
        if !self.owner_alive {
            return false;
        }
        let Some(profile) = roster.profile(target).filter(|p| p.can_be_in_threat_table()) else {
            return false;
        };
        let faded = profile.is_faded();
        let (index, _) = self.find_or_insert(target, faded);
        let list = effects(&mut self.entries[index]);
        if list.contains(&source) {
            return false;
        }
        list.push(source);
        self.resort(index);
        true
    }

    fn remove_effect(
        &mut self,
        target: ActorId,
        source: BuffId,
        effects: impl Fn(&mut ThreatTarget) -> &mut Vec<BuffId>,
    ) -> bool {
        let Some(index) = self.index_of(target) else {
            return false;
        };
        let list = effects(&mut self.entries[index]);
        let before = list.len();
        list.retain(|buff| *buff != source);
        if list.len() == before {
            return false;
        }
        self.resort(index);
        true
    }

    // ===== membership =====

    /// Drops `target` from the table entirely.
    pub fn remove_target(&mut self, target: ActorId) -> bool {
        let Some(index) = self.index_of(target) else {
            return false;
        };
        self.entries.remove(index);
        self.after_membership_change();
        true
    }

    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.clear();
        self.after_membership_change();
    }

    /// A dead owner holds no threat.
    pub fn set_owner_alive(&mut self, alive: bool) {
        self.owner_alive = alive;
        if !alive {
            self.clear();
        }
    }

    /// Processes decay pulses up to `now`.
    pub fn advance(&mut self, now: f32) {
        let pulses = self.timers.advance(now).len();
        if pulses == 0 || self.entries.is_empty() {
            return;
        }
        let factor = self.decay_percentage.powi(pulses as i32);
        for entry in &mut self.entries {
            entry.threat *= factor;
        }
        trace!(target: "combat::threat", owner = %self.owner, pulses, "threat decayed");
        // Uniform scaling keeps the order, only ties between suppressed entries
        // can collapse, which leaves them where they are.
        self.update_target();
    }

    fn find_or_insert(&mut self, target: ActorId, faded: bool) -> (usize, bool) {
        if let Some(index) = self.index_of(target) {
            return (index, false);
        }
        let entry = ThreatTarget::new(target, 0.0, faded);
        let index = self
            .entries
            .iter()
            .position(|existing| existing.priority_cmp(&entry).is_ge())
            .unwrap_or(self.entries.len());
        self.entries.insert(index, entry);
        debug!(target: "combat::threat", owner = %self.owner, %target, "entered threat table");
        self.after_membership_change();
        (index, true)
    }

    fn after_membership_change(&mut self) {
        match (self.entries.is_empty(), self.decay.is_some()) {
            (false, false) => {
                self.decay = Some(
                    self.timers
                        .schedule_repeating(self.decay_interval, DecayPulse),
                );
                self.combat_observers.notify(&true);
            }
            (true, true) => {
                self.decay = None;
                self.combat_observers.notify(&false);
            }
            _ => {}
        }
        self.update_target();
    }

    /// Bubbles the entry at `index` into place with adjacent swaps.
    fn resort(&mut self, index: usize) {
        let mut current = index;
        loop {
            if current > 0
                && self.entries[current]
                    .priority_cmp(&self.entries[current - 1])
                    .is_lt()
            {
                self.entries.swap(current, current - 1);
                current -= 1;
            } else if current + 1 < self.entries.len()
                && self.entries[current + 1]
                    .priority_cmp(&self.entries[current])
                    .is_lt()
            {
                self.entries.swap(current, current + 1);
                current += 1;
            } else {
                break;
            }
        }
        self.update_target();
    }

    fn update_target(&mut self) {
        let current = self.entries.last().map(|entry| entry.target);
        if current == self.current_target {
            return;
        }
        let change = TargetChange {
            owner: self.owner,
            previous: self.current_target,
            current,
        };
        self.current_target = current;
        debug!(
            target: "combat::threat",
            owner = %self.owner,
            previous = ?change.previous,
            current = ?change.current,
            "target changed"
        );
        self.target_observers.notify(&change);
    }
}

impl core::fmt::Debug for ThreatTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThreatTable")
            .field("owner", &self.owner)
            .field("current_target", &self.current_target)
            .field("entries", &self.entries)
            .finish()
    }
}
