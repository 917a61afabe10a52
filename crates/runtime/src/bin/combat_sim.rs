//! Scripted combat session against the bundled content.
//!
//! One predicting player fights three NPCs that share two `ground_slam`
//! tokens. Set `RUST_LOG=debug` to follow the protocol.

use anyhow::Result;
use combat_content::ContentFactory;
use combat_core::{AbilityId, ActorId, Faction, ResourceId, ThreatKind, ThreatRequest};
use combat_runtime::{ActorSpec, Event, Runtime, Topic, init_tracing};
use tracing::info;

const PLAYER: ActorId = ActorId(1);
const MANA: ResourceId = ResourceId(1);
const FIREBALL: AbilityId = AbilityId(1);
const ROLL: AbilityId = AbilityId(3);
const GROUND_SLAM: AbilityId = AbilityId(100);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info")?;

    let runtime = Runtime::builder()
        .content(ContentFactory::bundled())
        .auto_tick(false)
        .build()?;
    let handle = runtime.handle();
    let mut threat_rx = handle.subscribe(Topic::Threat);
    let mut token_rx = handle.subscribe(Topic::Tokens);

    let mut session = handle
        .spawn_player(
            ActorSpec::player(PLAYER)
                .with_ability(FIREBALL)
                .with_ability(ROLL)
                .with_resource(MANA, 100.0)
                .with_ping_compensation(0.05),
        )
        .await?;
    let ogres = [ActorId(10), ActorId(11), ActorId(12)];
    for ogre in ogres {
        handle
            .spawn_npc(ActorSpec::npc(ogre, Faction::Enemy).with_ability(GROUND_SLAM))
            .await?;
    }

    // The player opens with a predicted fireball.
    let now = handle.now().await?;
    let prediction = session.use_ability(FIREBALL, now)?;
    info!(%prediction, "fireball predicted");
    session.update(now)?;
    handle.step(2).await?;
    let now = handle.now().await?;
    for update in session.update(now)?.updates {
        info!(?update, "client update");
    }

    // Every ogre wants the player dead and tries to slam.
    for (index, ogre) in ogres.into_iter().enumerate() {
        let threat = 10.0 * (index as f32 + 1.0);
        handle
            .add_threat(ogre, ThreatRequest::new(ThreatKind::Damage, threat, PLAYER))
            .await?;
        match handle.use_ability(ogre, GROUND_SLAM).await {
            Ok(outcome) => info!(actor = %ogre, cast = ?outcome.cast, "slam started"),
            Err(err) => info!(actor = %ogre, error = %err, "slam refused"),
        }
    }

    // Two seconds of slams plus the token cooldown.
    handle.step(130).await?;
    let now = handle.now().await?;
    session.update(now)?;

    while let Ok(event) = threat_rx.try_recv() {
        if let Event::Threat(notice) = event {
            info!(?notice, "threat");
        }
    }
    while let Ok(event) = token_rx.try_recv() {
        if let Event::Tokens(change) = event {
            info!(ability = %change.ability, available = change.available, "tokens");
        }
    }

    for actor in std::iter::once(PLAYER).chain(ogres) {
        let view = handle.view(actor).await?;
        println!("{}", serde_json::to_string_pretty(&view)?);
    }

    runtime.shutdown().await?;
    Ok(())
}
