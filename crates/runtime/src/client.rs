//! Predicting client of one player-controlled actor.

use tracing::debug;

use combat_content::AbilityCatalog;
use combat_core::{
    AbilityComponent, AbilityEvent, AbilityId, ActorId, CancelEvent, CancelFailReason,
    ClientUpdate, CombatConfig, ComponentRole, PredictionClient, PredictionId,
};

use crate::api::{Result, RuntimeError};
use crate::transport::LoopbackTransport;
use crate::world::ActorSpec;

/// What one [`ClientSession::update`] produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionUpdate {
    /// Local component events, in emission order.
    pub events: Vec<AbilityEvent>,
    /// Result of each server message applied.
    pub updates: Vec<ClientUpdate>,
}

/// Client side of a player: a predicted ability component plus the link to
/// the server.
///
/// The session mirrors the ability set the server granted so that local
/// validation sees the same rules.
pub struct ClientSession {
    client: PredictionClient,
    component: AbilityComponent,
    link: LoopbackTransport,
}

impl ClientSession {
    pub fn new(actor: ActorId, config: CombatConfig, link: LoopbackTransport) -> Self {
        Self {
            client: PredictionClient::new(actor, config.clone()),
            component: AbilityComponent::new(actor, ComponentRole::Predicted, config),
            link,
        }
    }

    /// Builds a session matching `spec` as spawned on the server at `now`.
    pub fn from_spec(
        spec: &ActorSpec,
        config: CombatConfig,
        catalog: &AbilityCatalog,
        link: LoopbackTransport,
        now: f32,
    ) -> Result<Self> {
        let mut session = Self::new(spec.id, config, link);
        session.component = session.component.starting_at(now);
        catalog
            .grant(&mut session.component, &spec.abilities)
            .map_err(RuntimeError::content)?;
        for &(resource, maximum) in &spec.resources {
            session
                .component
                .resources_mut()
                .add_resource(resource, maximum, maximum);
        }
        session.component.drain_events();
        Ok(session)
    }

    pub fn actor(&self) -> ActorId {
        self.client.actor()
    }

    pub fn client(&self) -> &PredictionClient {
        &self.client
    }

    pub fn component(&self) -> &AbilityComponent {
        &self.component
    }

    pub fn component_mut(&mut self) -> &mut AbilityComponent {
        &mut self.component
    }

    pub fn link(&self) -> &LoopbackTransport {
        &self.link
    }

    /// Predicts a cast and sends the activation. A local rejection sends
    /// nothing and shows on the error indicator.
    pub fn use_ability(&mut self, ability: AbilityId, now: f32) -> Result<PredictionId> {
        let actor = self.actor();
        self.client
            .use_ability(&mut self.component, ability, now, &mut self.link)
            .map_err(|rejection| {
                debug!(
                    target: "runtime::client",
                    actor = %actor,
                    ability = %ability,
                    reason = %rejection.reason,
                    "local prediction rejected"
                );
                RuntimeError::Cast { actor, rejection }
            })
    }

    pub fn cancel_cast(&mut self, now: f32) -> std::result::Result<CancelEvent, CancelFailReason> {
        self.client.cancel_cast(&mut self.component, now, &mut self.link)
    }

    pub fn ping(&mut self, now: f32) {
        self.client.ping(now, &mut self.link);
    }

    /// Runs local timers, forwards predicted channel ticks and applies
    /// everything the server sent.
    pub fn update(&mut self, now: f32) -> Result<SessionUpdate> {
        self.component.advance(now);
        let mut events = self.component.drain_events();
        self.client.forward_ticks(&events, now, &mut self.link);

        let updates = self
            .link
            .receive()?
            .into_iter()
            .map(|message| self.client.handle_message(&mut self.component, message, now))
            .collect();
        events.extend(self.component.drain_events());
        Ok(SessionUpdate { events, updates })
    }
}

#[cfg(test)]
mod tests {
    use combat_core::{AbilityDefinition, CastFailReason, NetMessage, NetRole, Transport};

    use super::*;

    const BOLT: AbilityId = AbilityId(1);

    fn session() -> (ClientSession, LoopbackTransport) {
        let (client_end, server_end) = LoopbackTransport::pair();
        let catalog = AbilityCatalog::new([AbilityDefinition::instant(BOLT, "bolt").with_cooldown(3.0)]);
        let spec = ActorSpec::player(ActorId(1)).with_ability(BOLT);
        let session = ClientSession::from_spec(&spec, CombatConfig::default(), &catalog, client_end, 0.0).unwrap();
        (session, server_end)
    }

    #[test]
    fn prediction_sends_one_activation() {
        let (mut session, server) = session();
        let prediction = session.use_ability(BOLT, 0.0).unwrap();

        let sent = server.receive().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].prediction_id(), Some(prediction));
    }

    #[test]
    fn local_rejection_sends_nothing() {
        let (mut session, server) = session();
        session.use_ability(BOLT, 0.0).unwrap();
        server.receive().unwrap();

        let err = session.use_ability(BOLT, 0.1).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Cast { rejection, .. } if rejection.reason == CastFailReason::OnGlobalCooldown
        ));
        assert_eq!(server.pending(), 0);
    }

    #[test]
    fn late_session_starts_on_the_world_clock() {
        let (_, client_end) = LoopbackTransport::pair();
        let catalog = AbilityCatalog::new([AbilityDefinition::instant(BOLT, "bolt")]);
        let spec = ActorSpec::player(ActorId(2)).with_ability(BOLT);
        let session = ClientSession::from_spec(&spec, CombatConfig::default(), &catalog, client_end, 42.0).unwrap();
        assert_eq!(session.component().now(), 42.0);
    }

    #[test]
    fn failures_from_the_server_roll_back() {
        let (mut session, mut server) = session();
        let prediction = session.use_ability(BOLT, 0.0).unwrap();
        server.send_reliable(
            NetRole::OwningClient,
            NetMessage::AbilityFailure {
                prediction_id: prediction,
                reason: CastFailReason::OnCooldown,
            },
        );

        let update = session.update(0.1).unwrap();
        assert_eq!(
            update.updates,
            vec![ClientUpdate::RolledBack(prediction, CastFailReason::OnCooldown)]
        );
        assert_eq!(session.component().pending_predictions(), 0);
    }
}
