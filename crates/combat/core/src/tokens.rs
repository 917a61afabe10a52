//! Shared NPC ability tokens.
//!
//! Some NPC abilities may only be in use by a limited number of NPCs at once.
//! Each such ability class owns a fixed set of tokens. A token moves through
//!
//! ```text
//! Available ──reserve──▶ Reserved ──request──▶ InUse
//!     ▲                      │                   │
//!     └──── Cooldown ◀───────┴──────return───────┘
//! ```
//!
//! A token returned with no cooldown, or a released reservation, waits one
//! [`AbilityTokenPool::advance`] before it becomes available again, so it can
//! never be claimed twice within the same step.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::error::{CombatError, CombatResult};
use crate::ids::{AbilityId, ActorId, ListenerId};
use crate::observer::Observers;
use crate::scheduler::{Scheduler, TimerHandle};

/// The NPC ability instance holding a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenHolder {
    pub actor: ActorId,
    pub ability: AbilityId,
}

impl TokenHolder {
    pub const fn new(actor: ActorId, ability: AbilityId) -> Self {
        Self { actor, ability }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum TokenState {
    #[default]
    Available,
    Reserved,
    InUse,
    Cooldown,
}

/// Number of tokens of one class in each state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenCounts {
    pub available: usize,
    pub reserved: usize,
    pub in_use: usize,
    pub cooldown: usize,
}

impl TokenCounts {
    pub fn total(&self) -> usize {
        self.available + self.reserved + self.in_use + self.cooldown
    }
}

/// Availability of a token class flipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenAvailabilityChanged {
    pub ability: AbilityId,
    pub available: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct TokenReady {
    ability: AbilityId,
    index: usize,
}

#[derive(Debug, Default)]
struct Token {
    state: TokenState,
    holder: Option<TokenHolder>,
    cooldown: Option<TimerHandle>,
}

struct TokenClass {
    tokens: Vec<Token>,
    cooldown: f32,
    observers: Observers<bool>,
}

impl TokenClass {
    fn available(&self) -> usize {
        self.tokens
            .iter()
            .filter(|token| token.state == TokenState::Available)
            .count()
    }

    fn held_by(&self, holder: TokenHolder) -> Option<usize> {
        self.tokens.iter().position(|token| token.holder == Some(holder))
    }

    fn first_available(&self) -> Option<usize> {
        self.tokens
            .iter()
            .position(|token| token.state == TokenState::Available)
    }
}

/// Token pools of every NPC ability class.
pub struct AbilityTokenPool {
    classes: BTreeMap<AbilityId, TokenClass>,
    timers: Scheduler<TokenReady>,
    changes: Vec<TokenAvailabilityChanged>,
}

impl AbilityTokenPool {
    pub fn new() -> Self {
        Self {
            classes: BTreeMap::new(),
            timers: Scheduler::new(),
            changes: Vec::new(),
        }
    }

    /// Sizes the pool of `ability` on first use. Later calls keep the
    /// existing pool and return false.
    pub fn init_class(&mut self, ability: AbilityId, max_tokens: usize, cooldown: f32) -> bool {
        if self.classes.contains_key(&ability) {
            return false;
        }
        let tokens = (0..max_tokens).map(|_| Token::default()).collect();
        self.classes.insert(
            ability,
            TokenClass {
                tokens,
                cooldown: cooldown.max(0.0),
                observers: Observers::new(),
            },
        );
        debug!(target: "combat::tokens", ability = %ability, max_tokens, cooldown, "token class initialized");
        true
    }

    pub fn has_class(&self, ability: AbilityId) -> bool {
        self.classes.contains_key(&ability)
    }

    pub fn max_tokens(&self, ability: AbilityId) -> usize {
        self.classes.get(&ability).map_or(0, |class| class.tokens.len())
    }

    pub fn available_count(&self, ability: AbilityId) -> usize {
        self.classes.get(&ability).map_or(0, TokenClass::available)
    }

    pub fn counts(&self, ability: AbilityId) -> Option<TokenCounts> {
        let class = self.classes.get(&ability)?;
        let mut counts = TokenCounts::default();
        for token in &class.tokens {
            match token.state {
                TokenState::Available => counts.available += 1,
                TokenState::Reserved => counts.reserved += 1,
                TokenState::InUse => counts.in_use += 1,
                TokenState::Cooldown => counts.cooldown += 1,
            }
        }
        Some(counts)
    }

    /// State of the token `holder` owns, if any.
    pub fn holder_state(&self, ability: AbilityId, holder: TokenHolder) -> Option<TokenState> {
        let class = self.classes.get(&ability)?;
        class.held_by(holder).map(|index| class.tokens[index].state)
    }

    /// Whether `holder` could get a token right now. A reservation already
    /// held by `holder` counts as available to it.
    pub fn is_available(&self, ability: AbilityId, holder: TokenHolder) -> bool {
        let Some(class) = self.classes.get(&ability) else {
            return false;
        };
        match class.held_by(holder).map(|index| class.tokens[index].state) {
            Some(TokenState::Reserved) => true,
            Some(_) => false,
            None => class.available() > 0,
        }
    }

    /// Claims a token for `holder`.
    ///
    /// A reservation holds an available token until it is spent or returned.
    /// A direct request spends the holder's own reservation first, and
    /// otherwise claims any available token.
    pub fn request_token(&mut self, ability: AbilityId, holder: TokenHolder, reservation: bool) -> CombatResult<()> {
        let class = self
            .classes
            .get_mut(&ability)
            .ok_or(CombatError::InvalidInput { what: "token class" })?;
        let before = class.available();
        let held = class.held_by(holder);

        let (index, state) = match (held, reservation) {
            (Some(_), true) => {
                debug!(target: "combat::tokens", ability = %ability, actor = %holder.actor, "token already reserved");
                return Err(CombatError::AlreadyActive);
            }
            (Some(index), false) if class.tokens[index].state == TokenState::Reserved => (index, TokenState::InUse),
            (Some(_), false) => return Err(CombatError::AlreadyActive),
            (None, _) => {
                let index = class.first_available().ok_or(CombatError::TokenUnavailable)?;
                let state = if reservation {
                    TokenState::Reserved
                } else {
                    TokenState::InUse
                };
                (index, state)
            }
        };

        let token = &mut class.tokens[index];
        token.state = state;
        token.holder = Some(holder);
        trace!(target: "combat::tokens", ability = %ability, actor = %holder.actor, state = %state, "token claimed");

        if before > 0 && class.available() == 0 {
            self.publish(ability, false);
        }
        Ok(())
    }

    /// Puts the token held by `holder` on cooldown.
    pub fn return_token(&mut self, ability: AbilityId, holder: TokenHolder) -> CombatResult<()> {
        let class = self
            .classes
            .get_mut(&ability)
            .ok_or(CombatError::InvalidInput { what: "token class" })?;
        let index = class
            .held_by(holder)
            .ok_or(CombatError::InvalidInput { what: "token holder" })?;
        let cooldown = class.cooldown;
        let token = &mut class.tokens[index];
        let released_reservation = token.state == TokenState::Reserved;
        let ready = TokenReady { ability, index };
        token.cooldown = Some(if released_reservation || cooldown <= 0.0 {
            self.timers.schedule_next_tick(ready)
        } else {
            self.timers.schedule(cooldown, ready)
        });
        token.state = TokenState::Cooldown;
        token.holder = None;
        trace!(target: "combat::tokens", ability = %ability, actor = %holder.actor, "token returned");
        Ok(())
    }

    /// Drives token cooldowns up to `now`.
    pub fn advance(&mut self, now: f32) {
        for ready in self.timers.advance(now) {
            let Some(class) = self.classes.get_mut(&ready.ability) else {
                continue;
            };
            let before = class.available();
            if let Some(token) = class.tokens.get_mut(ready.index)
                && token.state == TokenState::Cooldown
            {
                token.state = TokenState::Available;
                token.cooldown = None;
            }
            if before == 0 && class.available() == 1 {
                self.publish(ready.ability, true);
            }
        }
    }

    pub fn now(&self) -> f32 {
        self.timers.now()
    }

    /// Subscribes to availability flips of one class. Fails for unknown classes.
    pub fn subscribe_availability(
        &mut self,
        ability: AbilityId,
        id: ListenerId,
        callback: impl FnMut(&bool) + Send + 'static,
    ) -> bool {
        self.classes
            .get_mut(&ability)
            .is_some_and(|class| class.observers.subscribe(id, callback))
    }

    pub fn unsubscribe_availability(&mut self, ability: AbilityId, id: ListenerId) -> bool {
        self.classes
            .get_mut(&ability)
            .is_some_and(|class| class.observers.unsubscribe(id))
    }

    /// Takes the availability flips since the last drain.
    pub fn drain_changes(&mut self) -> Vec<TokenAvailabilityChanged> {
        std::mem::take(&mut self.changes)
    }

    fn publish(&mut self, ability: AbilityId, available: bool) {
        if let Some(class) = self.classes.get_mut(&ability) {
            class.observers.notify(&available);
        }
        debug!(target: "combat::tokens", ability = %ability, available, "token availability changed");
        self.changes.push(TokenAvailabilityChanged { ability, available });
    }
}

impl Default for AbilityTokenPool {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for AbilityTokenPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (ability, class) in &self.classes {
            map.entry(ability, &(class.available(), class.tokens.len()));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    const SLAM: AbilityId = AbilityId(7);

    fn holder(actor: u32) -> TokenHolder {
        TokenHolder::new(ActorId(actor), SLAM)
    }

    #[test]
    fn init_sizes_pool_once() {
        let mut pool = AbilityTokenPool::new();
        assert!(pool.init_class(SLAM, 2, 1.0));
        assert!(!pool.init_class(SLAM, 5, 1.0));
        assert_eq!(pool.max_tokens(SLAM), 2);
        assert_eq!(pool.available_count(SLAM), 2);
    }

    #[test]
    fn exhausted_pool_rejects_requests() {
        let mut pool = AbilityTokenPool::new();
        pool.init_class(SLAM, 1, 1.0);
        pool.request_token(SLAM, holder(1), false).unwrap();
        assert_eq!(pool.request_token(SLAM, holder(2), false), Err(CombatError::TokenUnavailable));
        assert!(!pool.is_available(SLAM, holder(2)));
        assert_eq!(
            pool.request_token(AbilityId(99), holder(2), false),
            Err(CombatError::InvalidInput { what: "token class" })
        );
    }

    #[test]
    fn second_reservation_by_same_holder_is_refused() {
        let mut pool = AbilityTokenPool::new();
        pool.init_class(SLAM, 2, 1.0);
        pool.request_token(SLAM, holder(1), true).unwrap();
        assert_eq!(pool.request_token(SLAM, holder(1), true), Err(CombatError::AlreadyActive));
        assert_eq!(pool.available_count(SLAM), 1);
        assert!(pool.is_available(SLAM, holder(1)));
    }

    #[test]
    fn returned_token_waits_out_its_cooldown() {
        let mut pool = AbilityTokenPool::new();
        pool.init_class(SLAM, 1, 2.0);
        pool.request_token(SLAM, holder(1), false).unwrap();
        pool.return_token(SLAM, holder(1)).unwrap();
        assert_eq!(pool.holder_state(SLAM, holder(1)), None);
        pool.advance(1.0);
        assert_eq!(pool.available_count(SLAM), 0);
        pool.advance(2.0);
        assert_eq!(pool.available_count(SLAM), 1);
    }

    #[test]
    fn released_reservation_is_not_reclaimable_in_the_same_step() {
        let mut pool = AbilityTokenPool::new();
        pool.init_class(SLAM, 1, 5.0);
        pool.request_token(SLAM, holder(1), true).unwrap();
        pool.return_token(SLAM, holder(1)).unwrap();
        assert_eq!(pool.request_token(SLAM, holder(2), false), Err(CombatError::TokenUnavailable));
        pool.advance(0.0);
        assert!(pool.request_token(SLAM, holder(2), false).is_ok());
    }

    #[test]
    fn availability_broadcasts_only_on_edges() {
        let mut pool = AbilityTokenPool::new();
        pool.init_class(SLAM, 2, 0.0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        assert!(pool.subscribe_availability(SLAM, ListenerId(1), move |available| {
            if let Ok(mut seen) = sink.lock() {
                seen.push(*available);
            }
        }));

        pool.request_token(SLAM, holder(1), false).unwrap();
        pool.request_token(SLAM, holder(2), false).unwrap();
        pool.return_token(SLAM, holder(1)).unwrap();
        pool.return_token(SLAM, holder(2)).unwrap();
        pool.advance(0.1);

        let seen = seen.lock().map(|seen| seen.clone()).unwrap_or_default();
        assert_eq!(seen, vec![false, true]);
        assert_eq!(pool.drain_changes().len(), 2);
        assert_eq!(pool.available_count(SLAM), 2);
    }
}
