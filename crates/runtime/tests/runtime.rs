//! Runtime-level tests: a predicting client, the simulation worker and the
//! event bus working together.

use std::fs;
use std::time::Duration;

use combat_content::{AbilityCatalog, ContentFactory, TokenClassSettings};
use combat_core::ability::Reconciliation;
use combat_core::{
    AbilityDefinition, AbilityId, ActorId, CastFailReason, ClientUpdate, Faction, ResourceId,
    ThreatKind, ThreatRequest,
};
use combat_runtime::{
    ActorSpec, Event, Runtime, RuntimeError, RuntimeHandle, ThreatNotice, Topic,
};
use tokio::sync::broadcast;

const PLAYER: ActorId = ActorId(1);
const MANA: ResourceId = ResourceId(1);
const BOLT: AbilityId = AbilityId(1);
const BEAM: AbilityId = AbilityId(2);
const SLAM: AbilityId = AbilityId(100);

fn catalog() -> AbilityCatalog {
    AbilityCatalog::new([
        AbilityDefinition::instant(BOLT, "bolt")
            .with_cooldown(4.0)
            .with_cost(MANA, 10.0),
        AbilityDefinition::channel(BEAM, "beam", 2.0, 2).without_global_cooldown(),
        AbilityDefinition::channel(SLAM, "slam", 1.0, 1)
            .requiring_token()
            .without_global_cooldown(),
    ])
}

fn start(token_settings: Vec<TokenClassSettings>) -> Runtime {
    Runtime::builder()
        .catalog(catalog())
        .token_settings(token_settings)
        .tick_interval(Duration::from_millis(50))
        .auto_tick(false)
        .build()
        .expect("runtime starts")
}

fn player_spec() -> ActorSpec {
    ActorSpec::player(PLAYER)
        .with_ability(BOLT)
        .with_ability(BEAM)
        .with_resource(MANA, 100.0)
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

async fn now(handle: &RuntimeHandle) -> f32 {
    handle.now().await.expect("worker alive")
}

#[tokio::test]
async fn predicted_cast_is_confirmed_end_to_end() {
    let runtime = start(Vec::new());
    let handle = runtime.handle();
    let mut prediction_rx = handle.subscribe(Topic::Prediction);
    let mut session = handle.spawn_player(player_spec()).await.unwrap();

    let prediction = session.use_ability(BOLT, 0.0).unwrap();
    assert_eq!(session.component().resources().value(MANA), Some(90.0));

    let report = handle.step(1).await.unwrap();
    assert_eq!(report.messages_handled, 1);
    assert_eq!(report.snapshots_sent, 1);

    let update = session.update(now(&handle).await).unwrap();
    assert_eq!(
        update.updates,
        vec![
            ClientUpdate::Reconciled(prediction, Reconciliation::Confirmed),
            ClientUpdate::SnapshotApplied(1),
        ]
    );
    assert_eq!(session.component().resources().value(MANA), Some(90.0));
    assert_eq!(session.component().pending_predictions(), 0);

    let server_view = handle.view(PLAYER).await.unwrap();
    assert_eq!(server_view.resources, vec![(MANA, 90.0)]);

    let published = drain(&mut prediction_rx);
    assert_eq!(published.len(), 2);
    assert!(published.iter().all(|event| event.topic() == Topic::Prediction));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn server_rejection_rolls_the_client_back() {
    let runtime = start(Vec::new());
    let handle = runtime.handle();
    let mut session = handle.spawn_player(player_spec()).await.unwrap();

    // The server knows the player died; the client has not heard yet.
    handle.set_alive(PLAYER, false).await.unwrap();
    let prediction = session.use_ability(BOLT, 0.0).unwrap();

    handle.step(1).await.unwrap();
    let now = now(&handle).await;
    let update = session.update(now).unwrap();
    assert_eq!(
        update.updates.first(),
        Some(&ClientUpdate::RolledBack(prediction, CastFailReason::Dead))
    );
    assert_eq!(session.component().resources().value(MANA), Some(100.0));
    assert_eq!(session.client().errors().current(now), Some(CastFailReason::Dead));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn lost_channel_ticks_are_reported_to_the_owner() {
    let runtime = start(Vec::new());
    let handle = runtime.handle();
    let mut session = handle.spawn_player(player_spec()).await.unwrap();
    session.link().set_drop_unreliable(true);

    session.use_ability(BEAM, 0.0).unwrap();
    handle.step(1).await.unwrap();
    session.update(0.05).unwrap();

    // Tick 1 is predicted at 1.0 and its parameters never arrive.
    handle.step(21).await.unwrap();
    let forwarded = session.update(1.1).unwrap();
    assert!(
        forwarded
            .events
            .iter()
            .any(|event| matches!(event, combat_core::AbilityEvent::PredictedTick(tick) if tick.tick == 1))
    );

    handle.step(14).await.unwrap();
    let update = session.update(now(&handle).await).unwrap();
    assert!(
        update
            .updates
            .iter()
            .any(|update| matches!(update, ClientUpdate::TickDropped(tick) if tick.tick == 1)),
        "{:?}",
        update.updates
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn npc_tokens_gate_casts_across_actors() {
    let runtime = start(vec![TokenClassSettings {
        ability: SLAM,
        max_tokens: 2,
        cooldown: 0.5,
    }]);
    let handle = runtime.handle();
    let mut tokens_rx = handle.subscribe(Topic::Tokens);
    let ogres = [ActorId(10), ActorId(11), ActorId(12)];
    for ogre in ogres {
        handle
            .spawn_npc(ActorSpec::npc(ogre, Faction::Enemy).with_ability(SLAM))
            .await
            .unwrap();
    }

    handle.use_ability(ogres[0], SLAM).await.unwrap();
    handle.use_ability(ogres[1], SLAM).await.unwrap();
    let err = handle.use_ability(ogres[2], SLAM).await.unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::Cast { actor, rejection } if actor == ogres[2] && rejection.reason == CastFailReason::Token
    ));

    let flips: Vec<bool> = drain(&mut tokens_rx)
        .into_iter()
        .filter_map(|event| match event {
            Event::Tokens(change) => Some(change.available),
            _ => None,
        })
        .collect();
    assert_eq!(flips, vec![false]);

    // Slams end at 1.0, tokens cool down for 0.5.
    handle.step(32).await.unwrap();
    handle.use_ability(ogres[2], SLAM).await.unwrap();
    let flips: Vec<bool> = drain(&mut tokens_rx)
        .into_iter()
        .filter_map(|event| match event {
            Event::Tokens(change) => Some(change.available),
            _ => None,
        })
        .collect();
    assert_eq!(flips.first(), Some(&true));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn threat_changes_reach_subscribers() {
    let runtime = start(Vec::new());
    let handle = runtime.handle();
    let mut threat_rx = handle.subscribe(Topic::Threat);
    let npc = ActorId(10);
    let _session = handle.spawn_player(player_spec()).await.unwrap();
    handle.spawn_npc(ActorSpec::npc(npc, Faction::Enemy)).await.unwrap();

    let event = handle
        .add_threat(npc, ThreatRequest::new(ThreatKind::Damage, 25.0, PLAYER))
        .await
        .unwrap();
    assert!(event.success);

    let notices: Vec<ThreatNotice> = drain(&mut threat_rx)
        .into_iter()
        .filter_map(|event| match event {
            Event::Threat(notice) => Some(notice),
            _ => None,
        })
        .collect();
    assert!(notices.contains(&ThreatNotice::CombatChanged {
        owner: npc,
        in_combat: true
    }));
    assert!(notices.iter().any(|notice| matches!(
        notice,
        ThreatNotice::TargetChanged(change) if change.current == Some(PLAYER)
    )));

    let view = handle.view(npc).await.unwrap();
    assert_eq!(view.current_target, Some(PLAYER));
    assert!(view.in_combat);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn actors_joining_late_run_on_the_world_clock() {
    let runtime = start(Vec::new());
    let handle = runtime.handle();
    handle.step(200).await.unwrap();
    let joined_at = now(&handle).await;
    assert!(joined_at > 9.9);

    let npc = ActorId(10);
    let mut session = handle.spawn_player(player_spec()).await.unwrap();
    handle.spawn_npc(ActorSpec::npc(npc, Faction::Enemy)).await.unwrap();
    handle
        .add_threat(npc, ThreatRequest::new(ThreatKind::Damage, 100.0, PLAYER))
        .await
        .unwrap();

    let prediction = session.use_ability(BOLT, joined_at).unwrap();
    handle.step(1).await.unwrap();
    let update = session.update(now(&handle).await).unwrap();
    assert_eq!(
        update.updates.first(),
        Some(&ClientUpdate::Reconciled(prediction, Reconciliation::Confirmed))
    );
    assert_eq!(session.component().pending_predictions(), 0);

    // No decay pulse is due yet for a table created this late.
    let view = handle.view(npc).await.unwrap();
    assert_eq!(view.threat, vec![(PLAYER, 100.0)]);
    let player = handle.view(PLAYER).await.unwrap();
    assert!(player.global_cooldown_remaining > 1.0);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_actors_are_reported() {
    let runtime = start(Vec::new());
    let handle = runtime.handle();

    let err = handle.view(ActorId(99)).await.unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownActor { actor } if actor == ActorId(99)));
    let err = handle.taunt(ActorId(99), PLAYER).await.unwrap_err();
    assert!(matches!(err, RuntimeError::UnknownActor { .. }));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn content_directory_configures_the_runtime() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "min_global_cooldown = 0.75\n").unwrap();
    fs::write(
        dir.path().join("abilities.ron"),
        "(abilities: [(id: (7), name: \"stomp\", requires_token: true, has_global_cooldown: false)])",
    )
    .unwrap();
    fs::write(dir.path().join("tokens.ron"), "(classes: [])").unwrap();

    let runtime = Runtime::builder()
        .content(ContentFactory::new(dir.path()))
        .auto_tick(false)
        .build()
        .unwrap();
    let handle = runtime.handle();
    handle
        .spawn_npc(ActorSpec::npc(ActorId(10), Faction::Enemy).with_ability(AbilityId(7)))
        .await
        .unwrap();
    handle.use_ability(ActorId(10), AbilityId(7)).await.unwrap();
    runtime.shutdown().await.unwrap();

    fs::write(dir.path().join("tokens.ron"), "(classes: [(ability: (7), max_tokens: 0)])").unwrap();
    let result = Runtime::builder()
        .content(ContentFactory::new(dir.path()))
        .auto_tick(false)
        .build();
    assert!(matches!(result, Err(RuntimeError::Content { .. })));
}

#[tokio::test]
async fn auto_tick_advances_time() {
    let runtime = Runtime::builder()
        .catalog(catalog())
        .tick_interval(Duration::from_millis(5))
        .build()
        .unwrap();
    let handle = runtime.handle();

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(now(&handle).await > 0.0);

    runtime.shutdown().await.unwrap();
}
