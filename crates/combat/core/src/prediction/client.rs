//! Owning-client driver of the prediction protocol.

use tracing::{debug, trace};

use super::{NetMessage, NetRole, Reconciliation, Transport};
use crate::ability::{
    AbilityComponent, AbilityEvent, CancelEvent, CancelFailReason, CastFailReason, CastRejection,
};
use crate::clock::ClockSync;
use crate::config::CombatConfig;
use crate::ids::{AbilityId, ActorId, PredictedTick, PredictionId};

/// Most recent cast rejection, shown until it expires.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ErrorIndicator {
    current: Option<(CastFailReason, f32)>,
}

impl ErrorIndicator {
    pub fn show(&mut self, reason: CastFailReason, now: f32, duration: f32) {
        self.current = Some((reason, now + duration));
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    /// The visible reason, if it has not expired at `now`.
    pub fn current(&self, now: f32) -> Option<CastFailReason> {
        self.current
            .filter(|(_, expires_at)| now < *expires_at)
            .map(|(reason, _)| reason)
    }

    pub fn message(&self, now: f32) -> Option<&'static str> {
        self.current(now).map(CastFailReason::message)
    }
}

/// What a handled server message did to the local state.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientUpdate {
    Reconciled(PredictionId, Reconciliation),
    RolledBack(PredictionId, CastFailReason),
    TickDropped(PredictedTick),
    SnapshotApplied(u64),
    ClockSample,
    Ignored,
}

/// Issues prediction ids for one controlled actor and routes server
/// answers into its [`AbilityComponent`].
#[derive(Debug)]
pub struct PredictionClient {
    actor: ActorId,
    config: CombatConfig,
    last_prediction: PredictionId,
    snapshot_version: Option<u64>,
    clock: ClockSync,
    errors: ErrorIndicator,
}

impl PredictionClient {
    pub fn new(actor: ActorId, config: CombatConfig) -> Self {
        Self {
            actor,
            config,
            last_prediction: PredictionId::NONE,
            snapshot_version: None,
            clock: ClockSync::new(),
            errors: ErrorIndicator::default(),
        }
    }

    pub fn actor(&self) -> ActorId {
        self.actor
    }

    pub fn last_prediction(&self) -> PredictionId {
        self.last_prediction
    }

    pub fn snapshot_version(&self) -> Option<u64> {
        self.snapshot_version
    }

    pub fn clock(&self) -> &ClockSync {
        &self.clock
    }

    pub fn errors(&self) -> &ErrorIndicator {
        &self.errors
    }

    /// Estimated latency to hide, clamped by the config.
    pub fn ping_compensation(&self) -> f32 {
        self.clock.ping_compensation(self.config.max_ping_compensation)
    }

    /// Predicts a use locally and sends the activation request.
    ///
    /// A local validation failure shows the error indicator and sends
    /// nothing. Prediction ids are consumed only by successful predictions.
    pub fn use_ability(
        &mut self,
        component: &mut AbilityComponent,
        ability: AbilityId,
        now: f32,
        transport: &mut impl Transport,
    ) -> Result<PredictionId, CastRejection> {
        let prediction_id = self.last_prediction.next();
        let record = match component.predict_use(ability, prediction_id, now) {
            Ok(record) => record,
            Err(rejection) => {
                self.errors
                    .show(rejection.reason, now, self.config.error_display_seconds);
                return Err(rejection);
            }
        };
        self.last_prediction = prediction_id;
        transport.send_reliable(
            NetRole::Server,
            NetMessage::AbilityRequest {
                ability,
                prediction_id,
                tick: 0,
                client_time: now,
                params: record.params,
            },
        );
        Ok(prediction_id)
    }

    /// Predicts a cancel of the active cast and tells the server.
    pub fn cancel_cast(
        &mut self,
        component: &mut AbilityComponent,
        now: f32,
        transport: &mut impl Transport,
    ) -> Result<CancelEvent, CancelFailReason> {
        let event = component.predict_cancel(now)?;
        transport.send_reliable(
            NetRole::Server,
            NetMessage::CancelRequest {
                prediction_id: event.prediction_id,
                client_time: now,
                params: event.params.clone(),
            },
        );
        Ok(event)
    }

    /// Forwards locally predicted channel ticks to the server.
    ///
    /// Tick 0 travels with the activation request and is skipped here.
    pub fn forward_ticks(&self, events: &[AbilityEvent], now: f32, transport: &mut impl Transport) -> usize {
        let mut sent = 0;
        for event in events {
            if let AbilityEvent::PredictedTick(tick) = event
                && tick.tick > 0
                && tick.prediction_id.is_predicted()
            {
                transport.send_unreliable(
                    NetRole::Server,
                    NetMessage::AbilityRequest {
                        ability: tick.ability,
                        prediction_id: tick.prediction_id,
                        tick: tick.tick,
                        client_time: now,
                        params: tick.params.clone(),
                    },
                );
                sent += 1;
            }
        }
        sent
    }

    pub fn ping(&self, now: f32, transport: &mut impl Transport) {
        transport.send_unreliable(NetRole::Server, NetMessage::Ping { client_time: now });
    }

    /// Applies one message from the server.
    pub fn handle_message(&mut self, component: &mut AbilityComponent, message: NetMessage, now: f32) -> ClientUpdate {
        match message {
            NetMessage::ServerAbilityResult(result) => {
                let outcome = component.reconcile(&result);
                ClientUpdate::Reconciled(result.prediction_id, outcome)
            }
            NetMessage::AbilityFailure { prediction_id, reason } => {
                if component.rollback_prediction(prediction_id, reason.into_error(prediction_id)) {
                    self.errors.show(reason, now, self.config.error_display_seconds);
                    ClientUpdate::RolledBack(prediction_id, reason)
                } else {
                    ClientUpdate::Ignored
                }
            }
            NetMessage::TickDropped {
                ability,
                prediction_id,
                tick,
            } => {
                let tick = PredictedTick::new(prediction_id, tick);
                component.tick_dropped(ability, tick);
                ClientUpdate::TickDropped(tick)
            }
            NetMessage::Snapshot(snapshot) => {
                if self.snapshot_version.is_some_and(|seen| snapshot.version <= seen) {
                    trace!(
                        target: "combat::prediction",
                        actor = %self.actor,
                        version = snapshot.version,
                        "stale snapshot ignored"
                    );
                    return ClientUpdate::Ignored;
                }
                self.snapshot_version = Some(snapshot.version);
                component.apply_snapshot(&snapshot, now);
                ClientUpdate::SnapshotApplied(snapshot.version)
            }
            NetMessage::Pong {
                client_time,
                server_time,
            } => {
                self.clock.record(client_time, server_time, now);
                ClientUpdate::ClockSample
            }
            other => {
                debug!(
                    target: "combat::prediction",
                    actor = %self.actor,
                    kind = other.kind(),
                    "server-bound message delivered to client"
                );
                ClientUpdate::Ignored
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ability::{AbilityDefinition, ComponentRole};
    use crate::prediction::RecordingTransport;

    fn client_side() -> (PredictionClient, AbilityComponent) {
        let mut component = AbilityComponent::new(ActorId(1), ComponentRole::Predicted, CombatConfig::default());
        component
            .add_ability(AbilityDefinition::channel(AbilityId(1), "beam", 2.0, 2))
            .unwrap();
        (PredictionClient::new(ActorId(1), CombatConfig::default()), component)
    }

    #[test]
    fn prediction_ids_are_monotonic_and_never_zero() {
        let (mut client, mut component) = client_side();
        let mut transport = RecordingTransport::new();
        let first = client
            .use_ability(&mut component, AbilityId(1), 0.0, &mut transport)
            .unwrap();
        assert_eq!(first, PredictionId(1));
        assert!(client.use_ability(&mut component, AbilityId(1), 0.1, &mut transport).is_err());
        assert_eq!(client.last_prediction(), PredictionId(1));
        assert_eq!(client.errors().current(0.1), Some(CastFailReason::OnGlobalCooldown));
        assert_eq!(client.errors().current(5.0), None);
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn channel_ticks_are_forwarded_after_activation() {
        let (mut client, mut component) = client_side();
        let mut transport = RecordingTransport::new();
        client
            .use_ability(&mut component, AbilityId(1), 0.0, &mut transport)
            .unwrap();
        component.advance(1.0);
        let events = component.drain_events();
        assert_eq!(client.forward_ticks(&events, 1.0, &mut transport), 1);
        assert!(matches!(
            transport.sent().last().map(|sent| &sent.message),
            Some(NetMessage::AbilityRequest { tick: 1, .. })
        ));
    }

    #[test]
    fn old_snapshots_are_ignored() {
        let (mut client, mut component) = client_side();
        let snapshot = component.snapshot(3);
        assert_eq!(
            client.handle_message(&mut component, NetMessage::Snapshot(snapshot.clone()), 0.0),
            ClientUpdate::SnapshotApplied(3)
        );
        assert_eq!(
            client.handle_message(&mut component, NetMessage::Snapshot(snapshot), 0.0),
            ClientUpdate::Ignored
        );
    }

    #[test]
    fn failure_for_unknown_prediction_shows_nothing() {
        let (mut client, mut component) = client_side();
        let failure = NetMessage::AbilityFailure {
            prediction_id: PredictionId(7),
            reason: CastFailReason::NoCharges,
        };
        assert_eq!(client.handle_message(&mut component, failure, 0.0), ClientUpdate::Ignored);
        assert_eq!(client.errors().current(0.0), None);
    }

    #[test]
    fn indicator_expires() {
        let mut indicator = ErrorIndicator::default();
        indicator.show(CastFailReason::NoCharges, 1.0, 2.0);
        assert_eq!(indicator.message(2.9), Some("No charges remaining"));
        assert_eq!(indicator.message(3.0), None);
    }
}
