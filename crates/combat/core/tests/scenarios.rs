//! End-to-end exchanges between a predicting client, the authoritative server
//! and the shared NPC systems.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use combat_core::ability::{ChargeModification, Reconciliation};
use combat_core::prediction::RecordingTransport;
use combat_core::{
    AbilityComponent, AbilityDefinition, AbilityEvent, AbilityId, AbilityTokenPool, ActorId, BuffId,
    CastFailReason, ClientUpdate, CombatConfig, ComponentRole, Faction, ListenerId, NetMessage,
    PredictionClient, PredictionServer, ResourceId, ServerUpdate, ThreatKind, ThreatProfile,
    ThreatRequest, ThreatTable, TokenHolder, TokenState,
};

const PLAYER: ActorId = ActorId(1);

/// One player seen from both ends of the connection.
struct Session {
    client: PredictionClient,
    predicted: AbilityComponent,
    server: PredictionServer,
    authority: AbilityComponent,
    to_server: RecordingTransport,
    to_client: RecordingTransport,
}

impl Session {
    fn new(definitions: &[AbilityDefinition]) -> Self {
        let mut predicted = AbilityComponent::new(PLAYER, ComponentRole::Predicted, CombatConfig::default());
        let mut authority = AbilityComponent::new(PLAYER, ComponentRole::Authority, CombatConfig::default());
        for definition in definitions {
            predicted.add_ability(definition.clone()).expect("client accepts definition");
            authority.add_ability(definition.clone()).expect("server accepts definition");
        }
        Self {
            client: PredictionClient::new(PLAYER, CombatConfig::default()),
            predicted,
            server: PredictionServer::new(),
            authority,
            to_server: RecordingTransport::new(),
            to_client: RecordingTransport::new(),
        }
    }

    fn deliver_to_server(&mut self, now: f32) -> Vec<ServerUpdate> {
        let messages = self.to_server.drain().into_iter().map(|sent| sent.message).collect();
        self.deliver_messages(messages, now)
    }

    /// Hands `messages` to the server in the given order.
    fn deliver_messages(&mut self, messages: Vec<NetMessage>, now: f32) -> Vec<ServerUpdate> {
        self.authority.advance(now);
        messages
            .into_iter()
            .map(|message| {
                self.server
                    .handle_message(PLAYER, &mut self.authority, message, now, &mut self.to_client)
            })
            .collect()
    }

    fn replicate(&mut self, now: f32) {
        self.authority.advance(now);
        self.server.replicate(PLAYER, &self.authority, &mut self.to_client);
    }

    fn deliver_to_client(&mut self, now: f32) -> Vec<ClientUpdate> {
        self.predicted.advance(now);
        self.to_client
            .drain()
            .into_iter()
            .map(|sent| self.client.handle_message(&mut self.predicted, sent.message, now))
            .collect()
    }
}

// ===== A: confirmed prediction =====

#[test]
fn matching_server_result_drops_the_prediction_without_correction() {
    let fireball = AbilityId(10);
    let mana = ResourceId(1);
    let mut session = Session::new(&[AbilityDefinition::instant(fireball, "fireball")
        .with_global_cooldown(1.5)
        .with_cost(mana, 10.0)]);
    session.predicted.resources_mut().add_resource(mana, 10.0, 10.0);
    session.authority.resources_mut().add_resource(mana, 10.0, 10.0);

    let prediction = session
        .client
        .use_ability(&mut session.predicted, fireball, 0.0, &mut session.to_server)
        .expect("castable locally");
    assert_eq!(session.predicted.pending_predictions(), 1);
    assert_eq!(session.predicted.resources().value(mana), Some(0.0));
    let predicted_gcd = session.predicted.global_cooldown();
    assert!(predicted_gcd.active);
    assert!((predicted_gcd.length() - 1.5).abs() < 1e-4);

    let server_updates = session.deliver_to_server(0.04);
    assert!(matches!(server_updates.as_slice(), [ServerUpdate::Used(_)]));

    let events_before = session.predicted.drain_events();
    assert!(!events_before.is_empty());
    let client_updates = session.deliver_to_client(0.08);
    assert_eq!(
        client_updates,
        vec![ClientUpdate::Reconciled(prediction, Reconciliation::Confirmed)]
    );

    assert_eq!(session.predicted.pending_predictions(), 0);
    assert_eq!(session.predicted.global_cooldown(), predicted_gcd);
    assert_eq!(session.predicted.resources().value(mana), Some(0.0));
    let corrections = session
        .predicted
        .drain_events()
        .into_iter()
        .filter(|event| {
            matches!(
                event,
                AbilityEvent::GlobalCooldownChanged { .. }
                    | AbilityEvent::ChargesChanged(_)
                    | AbilityEvent::CastingChanged { .. }
            )
        })
        .count();
    assert_eq!(corrections, 0);
}

// ===== B: rejected prediction =====

#[test]
fn rejected_charge_is_refunded_and_shown() {
    let roll = AbilityId(11);
    let definition = AbilityDefinition::instant(roll, "roll")
        .with_charges(2, 1, 1)
        .with_cooldown(10.0)
        .without_global_cooldown();
    let mut session = Session::new(&[definition]);

    // The client last saw one of two charges.
    session
        .predicted
        .modify_charges(roll, 1, ChargeModification::Override)
        .expect("known ability");
    // A concurrent server event consumed the last charge first.
    session
        .authority
        .modify_charges(roll, 0, ChargeModification::Override)
        .expect("known ability");

    let prediction = session
        .client
        .use_ability(&mut session.predicted, roll, 0.0, &mut session.to_server)
        .expect("client still sees a charge");
    assert_eq!(session.predicted.charges(roll), Some(0));

    let server_updates = session.deliver_to_server(0.04);
    assert_eq!(
        server_updates,
        vec![ServerUpdate::Rejected(prediction, CastFailReason::NoCharges)]
    );

    let client_updates = session.deliver_to_client(0.08);
    assert_eq!(
        client_updates,
        vec![ClientUpdate::RolledBack(prediction, CastFailReason::NoCharges)]
    );
    assert_eq!(session.predicted.charges(roll), Some(1));
    assert_eq!(session.predicted.pending_predictions(), 0);
    assert_eq!(session.client.errors().current(0.1), Some(CastFailReason::NoCharges));
    assert_eq!(session.client.errors().message(0.1), Some("No charges remaining"));

    let rolled_back = session
        .predicted
        .drain_events()
        .into_iter()
        .any(|event| matches!(event, AbilityEvent::Mispredicted { prediction_id, .. } if prediction_id == prediction));
    assert!(rolled_back);

    let expiry = CombatConfig::default().error_display_seconds;
    assert_eq!(session.client.errors().current(0.08 + expiry + 0.01), None);
}

// ===== delivery order =====

#[test]
fn reversed_activations_leave_no_phantom_prediction() {
    let first = AbilityId(30);
    let second = AbilityId(31);
    let mut session = Session::new(&[
        AbilityDefinition::instant(first, "first")
            .with_cooldown(1.0)
            .without_global_cooldown(),
        AbilityDefinition::instant(second, "second")
            .with_cooldown(1.0)
            .without_global_cooldown(),
    ]);

    let older = session
        .client
        .use_ability(&mut session.predicted, first, 0.0, &mut session.to_server)
        .expect("first is ready");
    let newer = session
        .client
        .use_ability(&mut session.predicted, second, 0.0, &mut session.to_server)
        .expect("second is ready");
    assert_eq!(session.predicted.charges(first), Some(0));

    let mut in_flight: Vec<NetMessage> = session.to_server.drain().into_iter().map(|sent| sent.message).collect();
    in_flight.reverse();
    let server_updates = session.deliver_messages(in_flight, 0.04);
    assert!(matches!(server_updates[0], ServerUpdate::Used(_)));
    assert_eq!(server_updates[1], ServerUpdate::Rejected(older, CastFailReason::Superseded));
    assert_eq!(session.authority.charges(first), Some(1));

    let client_updates = session.deliver_to_client(0.08);
    assert!(client_updates.contains(&ClientUpdate::RolledBack(older, CastFailReason::Superseded)));
    assert!(client_updates
        .iter()
        .any(|update| matches!(update, ClientUpdate::Reconciled(id, _) if *id == newer)));
    assert_eq!(session.predicted.pending_predictions(), 0);
    assert_eq!(session.predicted.charges(first), Some(1));

    session.replicate(2.0);
    session.deliver_to_client(2.0);
    assert_eq!(session.predicted.charges(first), Some(1));
    assert_eq!(session.predicted.charges(second), Some(1));
    session
        .client
        .use_ability(&mut session.predicted, first, 2.0, &mut session.to_server)
        .expect("first was never spent");
}

#[test]
fn duplicated_activation_is_applied_once() {
    let roll = AbilityId(32);
    let mut session = Session::new(&[AbilityDefinition::instant(roll, "roll")
        .with_charges(2, 1, 1)
        .with_cooldown(10.0)
        .without_global_cooldown()]);

    let prediction = session
        .client
        .use_ability(&mut session.predicted, roll, 0.0, &mut session.to_server)
        .expect("charges available");
    let request = session.to_server.drain().remove(0).message;
    let server_updates = session.deliver_messages(vec![request.clone(), request], 0.04);
    assert!(matches!(server_updates[0], ServerUpdate::Used(_)));
    assert_eq!(server_updates[1], ServerUpdate::Stale(prediction));
    assert_eq!(session.authority.charges(roll), Some(1));

    let client_updates = session.deliver_to_client(0.08);
    assert_eq!(client_updates.len(), 1);
    assert_eq!(session.predicted.charges(roll), Some(1));

    session.replicate(0.1);
    session.deliver_to_client(0.1);
    assert_eq!(session.predicted.charges(roll), Some(1));
    assert_eq!(session.predicted.pending_predictions(), 0);
}

// ===== C: NPC token lifecycle =====

#[test]
fn reserved_token_promotes_returns_and_frees_once() {
    let slam = AbilityId(20);
    let instance = TokenHolder::new(ActorId(50), slam);
    let mut pool = AbilityTokenPool::new();
    assert!(pool.init_class(slam, 1, 0.0));

    let freed = Arc::new(AtomicUsize::new(0));
    let exhausted = Arc::new(AtomicUsize::new(0));
    {
        let freed = Arc::clone(&freed);
        let exhausted = Arc::clone(&exhausted);
        pool.subscribe_availability(slam, ListenerId(1), move |available| {
            if *available {
                freed.fetch_add(1, Ordering::SeqCst);
            } else {
                exhausted.fetch_add(1, Ordering::SeqCst);
            }
        });
    }

    pool.request_token(slam, instance, true).expect("token free");
    assert_eq!(pool.holder_state(slam, instance), Some(TokenState::Reserved));
    assert_eq!(pool.available_count(slam), 0);
    assert_eq!(exhausted.load(Ordering::SeqCst), 1);

    pool.request_token(slam, instance, false).expect("reservation promotes");
    assert_eq!(pool.holder_state(slam, instance), Some(TokenState::InUse));
    assert_eq!(exhausted.load(Ordering::SeqCst), 1);

    pool.return_token(slam, instance).expect("holder owns the token");
    let counts = pool.counts(slam).expect("class exists");
    assert_eq!(counts.cooldown, 1);
    assert_eq!(pool.available_count(slam), 0);

    pool.advance(0.1);
    assert_eq!(pool.available_count(slam), 1);
    pool.advance(0.2);
    pool.advance(0.3);
    assert_eq!(freed.load(Ordering::SeqCst), 1);
}

#[test]
fn second_instance_waits_for_the_returned_token() {
    let slam = AbilityId(21);
    let first = TokenHolder::new(ActorId(50), slam);
    let second = TokenHolder::new(ActorId(51), slam);
    let mut pool = AbilityTokenPool::new();
    pool.init_class(slam, 1, 1.0);

    pool.request_token(slam, first, false).expect("token free");
    assert!(!pool.is_available(slam, second));
    assert!(pool.request_token(slam, second, false).is_err());

    pool.return_token(slam, first).expect("holder owns the token");
    pool.advance(0.5);
    assert!(!pool.is_available(slam, second));
    pool.advance(1.0);
    assert!(pool.is_available(slam, second));
    pool.request_token(slam, second, false).expect("token ready again");

    let flips: Vec<bool> = pool.drain_changes().into_iter().map(|change| change.available).collect();
    assert_eq!(flips, vec![false, true, false]);
}

// ===== D: fixate beats raw threat =====

#[test]
fn fixate_overrides_raw_threat_until_removed() {
    let p1 = ActorId(1);
    let p2 = ActorId(2);
    let roster: HashMap<ActorId, ThreatProfile> = [p1, p2]
        .into_iter()
        .map(|actor| (actor, ThreatProfile::new(actor, Faction::Player)))
        .collect();
    let mut table = ThreatTable::new(ActorId(90), Faction::Enemy, &CombatConfig::default());

    table.add_threat(&ThreatRequest::new(ThreatKind::Damage, 50.0, p1), &roster);
    table.add_threat(&ThreatRequest::new(ThreatKind::Damage, 10.0, p2), &roster);
    assert_eq!(table.current_target(), Some(p1));

    let taunt = BuffId(3);
    assert!(table.add_fixate(p2, taunt, &roster));
    assert_eq!(table.current_target(), Some(p2));
    assert_eq!(table.threat_of(p1), 50.0);
    assert_eq!(table.threat_of(p2), 10.0);

    assert!(table.remove_fixate(p2, taunt));
    assert_eq!(table.current_target(), Some(p1));
}
