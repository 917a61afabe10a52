//! Invariants of the modifier engine, threat ordering, reconciliation and the
//! token pool, checked over small deterministic grids of inputs.

use std::collections::HashMap;

use combat_core::ability::{ChargeModification, Reconciliation};
use combat_core::prediction::RecordingTransport;
use combat_core::tokens::TokenCounts;
use combat_core::{
    AbilityComponent, AbilityDefinition, AbilityId, AbilityTokenPool, ActorId, BuffId, BuffStacks,
    ClientUpdate, CombatConfig, CombatModifier, ComponentRole, Faction, ModifiableFloat, NetMessage,
    NetRole, PredictionClient, PredictionServer, ResourceId, ThreatKind, ThreatProfile,
    ThreatRequest, ThreatTable, TokenHolder,
};

// ===== P1: modifier idempotence =====

#[test]
fn undoing_every_modifier_restores_the_original_value() {
    let stacks = BuffStacks::new(BuffId(1), 4);
    let bases = [0.0_f32, 1.0, 17.5, 250.0];
    for base in bases {
        let mut value = ModifiableFloat::new(base);
        let before = value.value();

        let handles = [
            value.add_modifier(CombatModifier::additive(12.0)),
            value.add_modifier(CombatModifier::multiplicative(0.85)),
            value.add_modifier(CombatModifier::additive(-400.0)),
            value.add_modifier(CombatModifier::multiplicative(1.3).with_source(&stacks, true)),
            value.add_modifier(CombatModifier::additive(2.5).with_source(&stacks, true)),
        ];
        assert!(handles.iter().all(|handle| handle.is_valid()));

        // Remove out of insertion order.
        for index in [3, 0, 4, 1, 2] {
            assert!(value.remove_modifier(handles[index]));
        }
        assert_eq!(value.value(), before, "base {base}");
        assert_eq!(value.modifier_count(), 0);
    }
}

#[test]
fn partial_undo_matches_a_fresh_value_with_the_survivors() {
    let mut value = ModifiableFloat::new(40.0);
    let keep = value.add_modifier(CombatModifier::multiplicative(1.25));
    let drop_a = value.add_modifier(CombatModifier::additive(-15.0));
    let drop_b = value.add_modifier(CombatModifier::multiplicative(0.5));
    value.remove_modifier(drop_b);
    value.remove_modifier(drop_a);

    let mut fresh = ModifiableFloat::new(40.0);
    fresh.add_modifier(CombatModifier::multiplicative(1.25));
    assert_eq!(value.value(), fresh.value());
    assert!(value.remove_modifier(keep));
    assert_eq!(value.value(), 40.0);
}

// ===== P2: clamp invariant =====

#[test]
fn bounded_value_stays_within_bounds_after_every_mutation() {
    let mut value = ModifiableFloat::new(50.0).with_bounds(Some(0.0), Some(100.0));
    let in_bounds = |value: &ModifiableFloat| (0.0..=100.0).contains(&value.value());
    assert!(in_bounds(&value));

    let huge_negative = value.add_modifier(CombatModifier::additive(-1.0e6));
    assert!(in_bounds(&value));
    assert_eq!(value.value(), 0.0);

    let doubling = value.add_modifier(CombatModifier::multiplicative(2.0));
    assert!(in_bounds(&value));

    value.remove_modifier(huge_negative);
    assert!(in_bounds(&value));
    assert_eq!(value.value(), 100.0);

    let huge_positive = value.add_modifier(CombatModifier::additive(1.0e6));
    assert!(in_bounds(&value));

    value.set_base(-30.0);
    assert!(in_bounds(&value));
    value.set_base(1.0e9);
    assert!(in_bounds(&value));

    value.remove_modifier(huge_positive);
    value.remove_modifier(doubling);
    assert!(in_bounds(&value));
    assert_eq!(value.value(), 100.0);

    let inverted = value.add_modifier(CombatModifier::multiplicative(-3.0));
    assert!(in_bounds(&value));
    value.remove_modifier(inverted);
    assert!(in_bounds(&value));
}

// ===== P3: stack scaling =====

#[test]
fn stackable_modifiers_scale_with_source_stacks() {
    for stacks in [1_u32, 2, 5, 9] {
        let buff = BuffStacks::new(BuffId(7), stacks);
        let n = stacks as f32;

        let mut additive = ModifiableFloat::new(10.0);
        additive.add_modifier(CombatModifier::additive(3.0).with_source(&buff, true));
        assert!((additive.value() - (10.0 + 3.0 * n)).abs() < 1e-4);

        let mut multiplicative = ModifiableFloat::new(10.0);
        multiplicative.add_modifier(CombatModifier::multiplicative(0.9).with_source(&buff, true));
        let expected = 10.0 * (1.0 - 0.1 * n).max(0.0);
        assert!(
            (multiplicative.value() - expected).abs() < 1e-4,
            "{stacks} stacks gave {}",
            multiplicative.value()
        );
    }
}

#[test]
fn stack_changes_apply_on_the_next_recalculation() {
    let buff = BuffStacks::new(BuffId(8), 1);
    let mut value = ModifiableFloat::new(0.0);
    value.add_modifier(CombatModifier::additive(5.0).with_source(&buff, true));
    assert_eq!(value.value(), 5.0);

    buff.set_stacks(3);
    value.recalculate();
    assert_eq!(value.value(), 15.0);
}

// ===== P4: threat ordering =====

#[derive(Clone, Copy, Debug)]
enum Effect {
    Plain,
    Fixated,
    Blinded,
    Faded,
}

const EFFECTS: [Effect; 4] = [Effect::Plain, Effect::Fixated, Effect::Blinded, Effect::Faded];

fn threat_table_with(effects: [Effect; 3]) -> ThreatTable {
    let threats = [30.0, 10.0, 50.0];
    let players: Vec<ActorId> = (1..=3).map(ActorId).collect();
    let roster: HashMap<ActorId, ThreatProfile> = players
        .iter()
        .map(|&actor| (actor, ThreatProfile::new(actor, Faction::Player)))
        .collect();

    let mut table = ThreatTable::new(ActorId(100), Faction::Enemy, &CombatConfig::default());
    for (index, &player) in players.iter().enumerate() {
        table.add_threat(&ThreatRequest::new(ThreatKind::Damage, threats[index], player), &roster);
        match effects[index] {
            Effect::Plain => {}
            Effect::Fixated => {
                table.add_fixate(player, BuffId(index as u32 + 1), &roster);
            }
            Effect::Blinded => {
                table.add_blind(player, BuffId(index as u32 + 1), &roster);
            }
            Effect::Faded => table.notify_fade_status(player, true),
        }
    }
    table
}

#[test]
fn suppressed_entries_sort_below_and_fixates_sort_above() {
    for a in EFFECTS {
        for b in EFFECTS {
            for c in EFFECTS {
                let table = threat_table_with([a, b, c]);
                let entries = table.targets();
                assert_eq!(entries.len(), 3);

                // Ascending: suppressed entries form a prefix.
                let first_active = entries
                    .iter()
                    .position(|entry| !entry.is_suppressed())
                    .unwrap_or(entries.len());
                assert!(
                    entries[first_active..].iter().all(|entry| !entry.is_suppressed()),
                    "{a:?} {b:?} {c:?}: {entries:?}"
                );

                // Among active entries, fixated ones come last.
                let active = &entries[first_active..];
                let first_fixated = active
                    .iter()
                    .position(|entry| entry.is_fixated())
                    .unwrap_or(active.len());
                assert!(
                    active[first_fixated..].iter().all(|entry| entry.is_fixated()),
                    "{a:?} {b:?} {c:?}: {entries:?}"
                );

                let top = entries.last().expect("three entries");
                assert_eq!(table.current_target(), Some(top.target));
                if top.is_suppressed() {
                    assert!(entries.iter().all(|entry| entry.is_suppressed()));
                }
            }
        }
    }
}

// ===== P5: prediction idempotence =====

#[test]
fn replayed_server_result_changes_nothing() {
    let ability = AbilityId(5);
    let mana = ResourceId(1);
    let definition = AbilityDefinition::instant(ability, "frost bolt")
        .with_charges(2, 1, 1)
        .with_cooldown(8.0)
        .with_cost(mana, 20.0);

    let mut client_side = AbilityComponent::new(ActorId(1), ComponentRole::Predicted, CombatConfig::default());
    let mut server_side = AbilityComponent::new(ActorId(1), ComponentRole::Authority, CombatConfig::default());
    for component in [&mut client_side, &mut server_side] {
        component.add_ability(definition.clone()).expect("valid definition");
        component.resources_mut().add_resource(mana, 100.0, 100.0);
    }

    let mut client = PredictionClient::new(ActorId(1), CombatConfig::default());
    let mut server = PredictionServer::new();
    let mut to_server = RecordingTransport::new();
    let mut to_client = RecordingTransport::new();

    client
        .use_ability(&mut client_side, ability, 0.0, &mut to_server)
        .expect("prediction succeeds");
    for sent in to_server.drain() {
        server.handle_message(ActorId(1), &mut server_side, sent.message, 0.05, &mut to_client);
    }
    let result = to_client
        .messages_to(NetRole::OwningClient)
        .find(|message| matches!(message, NetMessage::ServerAbilityResult(_)))
        .cloned()
        .expect("server answered");

    client_side.advance(0.1);
    let first = client.handle_message(&mut client_side, result.clone(), 0.1);
    assert!(matches!(first, ClientUpdate::Reconciled(_, Reconciliation::Confirmed)));

    let charges = client_side.charges(ability);
    let cooldown = client_side.ability(ability).map(|instance| instance.cooldown());
    let gcd = client_side.global_cooldown();
    let mana_left = client_side.resources().value(mana);

    let replay = client.handle_message(&mut client_side, result, 0.1);
    assert!(matches!(replay, ClientUpdate::Reconciled(_, Reconciliation::Stale)));
    assert_eq!(client_side.charges(ability), charges);
    assert_eq!(client_side.ability(ability).map(|instance| instance.cooldown()), cooldown);
    assert_eq!(client_side.global_cooldown(), gcd);
    assert_eq!(client_side.resources().value(mana), mana_left);
    assert_eq!(charges, Some(1));
    assert_eq!(mana_left, Some(80.0));
}

#[test]
fn replicated_charges_are_not_double_counted() {
    let ability = AbilityId(6);
    let mut component = AbilityComponent::new(ActorId(1), ComponentRole::Predicted, CombatConfig::default());
    component
        .add_ability(AbilityDefinition::instant(ability, "blink").with_charges(3, 1, 1).without_global_cooldown())
        .expect("valid definition");
    component
        .modify_charges(ability, 3, ChargeModification::Override)
        .expect("known ability");

    let mut client = PredictionClient::new(ActorId(1), CombatConfig::default());
    let mut outbox = RecordingTransport::new();
    client
        .use_ability(&mut component, ability, 0.0, &mut outbox)
        .expect("prediction succeeds");
    assert_eq!(component.charges(ability), Some(2));

    let mut authority = AbilityComponent::new(ActorId(1), ComponentRole::Authority, CombatConfig::default());
    authority
        .add_ability(AbilityDefinition::instant(ability, "blink").with_charges(3, 1, 1).without_global_cooldown())
        .expect("valid definition");
    let mut server = PredictionServer::new();
    let mut inbox = RecordingTransport::new();
    for sent in outbox.drain() {
        server.handle_message(ActorId(1), &mut authority, sent.message, 0.05, &mut inbox);
    }
    server.replicate(ActorId(1), &authority, &mut inbox);

    for sent in inbox.drain() {
        client.handle_message(&mut component, sent.message, 0.1);
    }
    assert_eq!(component.charges(ability), Some(2));
}

// ===== P6: token pool conservation =====

fn assert_conserved(pool: &AbilityTokenPool, ability: AbilityId) -> TokenCounts {
    let counts = pool.counts(ability).expect("class initialized");
    assert_eq!(counts.total(), pool.max_tokens(ability), "{counts:?}");
    assert_eq!(counts.available, pool.available_count(ability));
    counts
}

#[test]
fn token_states_always_sum_to_the_pool_size() {
    let ability = AbilityId(9);
    let mut pool = AbilityTokenPool::new();
    pool.init_class(ability, 3, 2.0);
    let holders: Vec<TokenHolder> = (1..=5).map(|actor| TokenHolder::new(ActorId(actor), ability)).collect();
    assert_conserved(&pool, ability);

    let _ = pool.request_token(ability, holders[0], true);
    assert_conserved(&pool, ability);
    let _ = pool.request_token(ability, holders[0], true);
    assert_conserved(&pool, ability);
    let _ = pool.request_token(ability, holders[1], false);
    assert_conserved(&pool, ability);
    let _ = pool.request_token(ability, holders[2], false);
    assert_conserved(&pool, ability);
    assert!(pool.request_token(ability, holders[3], false).is_err());
    let counts = assert_conserved(&pool, ability);
    assert_eq!(counts.available, 0);

    let _ = pool.request_token(ability, holders[0], false);
    assert_conserved(&pool, ability);
    let _ = pool.return_token(ability, holders[1]);
    assert_conserved(&pool, ability);
    let _ = pool.return_token(ability, holders[4]);
    assert_conserved(&pool, ability);

    let mut now = 0.0;
    for _ in 0..10 {
        now += 0.5;
        pool.advance(now);
        assert_conserved(&pool, ability);
    }
    for holder in &holders {
        let _ = pool.return_token(ability, *holder);
        assert_conserved(&pool, ability);
    }
    pool.advance(now + 5.0);
    let counts = assert_conserved(&pool, ability);
    assert_eq!(counts.available, 3);
}
