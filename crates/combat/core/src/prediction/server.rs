//! Server driver of the prediction protocol.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use super::{NetMessage, NetRole, ServerAbilityResult, Transport};
use crate::ability::{AbilityComponent, AbilityEvent, CancelEvent, CastContext, CastFailReason, CastOutcome};
use crate::ids::{ActorId, PredictedTick, PredictionId};

/// What a handled client message did to the authoritative state.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerUpdate {
    Used(CastOutcome),
    Rejected(PredictionId, CastFailReason),
    TickParams(PredictedTick),
    Cancelled(CancelEvent),
    /// Duplicate or superseded message, dropped without a reply.
    Stale(PredictionId),
    Pong,
    Ignored,
}

/// How an activation relates to the ones already seen from its client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Arrival {
    Fresh,
    /// Already handled. Dropped without a reply.
    Duplicate,
    /// Older than a handled activation but never seen itself.
    Superseded,
}

/// Activation ids handled for one client.
#[derive(Debug, Default)]
struct RequestHistory {
    last: PredictionId,
    /// Handled ids within [`RequestHistory::WINDOW`] of `last`.
    handled: BTreeSet<PredictionId>,
}

impl RequestHistory {
    const WINDOW: u32 = 64;

    fn classify(&self, prediction_id: PredictionId) -> Arrival {
        if prediction_id > self.last {
            Arrival::Fresh
        } else if self.handled.contains(&prediction_id) {
            Arrival::Duplicate
        } else {
            Arrival::Superseded
        }
    }

    fn record(&mut self, prediction_id: PredictionId) {
        self.last = self.last.max(prediction_id);
        self.handled.insert(prediction_id);
        let oldest = PredictionId(self.last.0.saturating_sub(Self::WINDOW));
        self.handled = self.handled.split_off(&oldest);
    }
}

/// Validates client requests and answers the owning client.
///
/// Rejections go to the requesting client only. Per actor, an activation
/// that was already handled is dropped. One that arrives after a newer
/// activation is refused as [`CastFailReason::Superseded`], so the client
/// rolls its prediction back.
#[derive(Debug, Default)]
pub struct PredictionServer {
    requests: BTreeMap<ActorId, RequestHistory>,
    ping_compensation: BTreeMap<ActorId, f32>,
    snapshot_versions: BTreeMap<ActorId, u64>,
}

impl PredictionServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latency the server may hide for `actor`. Clamped again at use time.
    pub fn set_ping_compensation(&mut self, actor: ActorId, seconds: f32) {
        self.ping_compensation.insert(actor, seconds.max(0.0));
    }

    pub fn last_request(&self, actor: ActorId) -> PredictionId {
        self.requests
            .get(&actor)
            .map(|history| history.last)
            .unwrap_or_default()
    }

    /// Forgets everything known about a disconnected actor.
    pub fn remove_actor(&mut self, actor: ActorId) {
        self.requests.remove(&actor);
        self.ping_compensation.remove(&actor);
        self.snapshot_versions.remove(&actor);
    }

    /// Applies one message from the client controlling `actor`.
    pub fn handle_message(
        &mut self,
        actor: ActorId,
        component: &mut AbilityComponent,
        message: NetMessage,
        now: f32,
        transport: &mut impl Transport,
    ) -> ServerUpdate {
        match message {
            NetMessage::AbilityRequest {
                ability,
                prediction_id,
                tick: 0,
                client_time,
                params,
            } => {
                let history = self.requests.entry(actor).or_default();
                match history.classify(prediction_id) {
                    Arrival::Fresh => {}
                    Arrival::Duplicate => {
                        trace!(
                            target: "combat::prediction",
                            actor = %actor,
                            prediction_id = %prediction_id,
                            "duplicate activation dropped"
                        );
                        return ServerUpdate::Stale(prediction_id);
                    }
                    Arrival::Superseded => {
                        debug!(
                            target: "combat::prediction",
                            actor = %actor,
                            prediction_id = %prediction_id,
                            last = %history.last,
                            "superseded activation refused"
                        );
                        history.record(prediction_id);
                        let reason = CastFailReason::Superseded;
                        transport.send_reliable(
                            NetRole::OwningClient,
                            NetMessage::AbilityFailure { prediction_id, reason },
                        );
                        return ServerUpdate::Rejected(prediction_id, reason);
                    }
                }
                history.record(prediction_id);
                let ping = self.ping_compensation.get(&actor).copied().unwrap_or_default();
                let ctx = CastContext::new(now)
                    .predicted(prediction_id, ping)
                    .with_params(params);
                match component.use_ability(ability, ctx) {
                    Ok(outcome) => {
                        let result = ServerAbilityResult::from_outcome(&outcome, client_time);
                        transport.send_reliable(NetRole::OwningClient, NetMessage::ServerAbilityResult(result));
                        ServerUpdate::Used(outcome)
                    }
                    Err(rejection) => {
                        transport.send_reliable(
                            NetRole::OwningClient,
                            NetMessage::AbilityFailure {
                                prediction_id,
                                reason: rejection.reason,
                            },
                        );
                        ServerUpdate::Rejected(prediction_id, rejection.reason)
                    }
                }
            }
            NetMessage::AbilityRequest {
                prediction_id,
                tick,
                params,
                ..
            } => {
                let tick = PredictedTick::new(prediction_id, tick);
                match component.supply_tick_params(tick, params) {
                    Ok(()) => ServerUpdate::TickParams(tick),
                    Err(error) => {
                        trace!(
                            target: "combat::prediction",
                            actor = %actor,
                            prediction_id = %prediction_id,
                            tick = tick.tick,
                            error = %error,
                            "tick parameters dropped"
                        );
                        ServerUpdate::Stale(prediction_id)
                    }
                }
            }
            NetMessage::CancelRequest {
                prediction_id, params, ..
            } => match component.cancel_current_cast(prediction_id, params, now) {
                Ok(event) => ServerUpdate::Cancelled(event),
                Err(reason) => {
                    debug!(
                        target: "combat::prediction",
                        actor = %actor,
                        prediction_id = %prediction_id,
                        reason = %reason,
                        "cancel request ignored"
                    );
                    ServerUpdate::Stale(prediction_id)
                }
            },
            NetMessage::Ping { client_time } => {
                transport.send_unreliable(
                    NetRole::OwningClient,
                    NetMessage::Pong {
                        client_time,
                        server_time: now,
                    },
                );
                ServerUpdate::Pong
            }
            other => {
                debug!(
                    target: "combat::prediction",
                    actor = %actor,
                    kind = other.kind(),
                    "client-bound message delivered to server"
                );
                ServerUpdate::Ignored
            }
        }
    }

    /// Tells the owning client about ticks dropped while waiting for
    /// parameters. Returns how many were reported.
    pub fn forward_dropped_ticks(&self, events: &[AbilityEvent], transport: &mut impl Transport) -> usize {
        let mut sent = 0;
        for event in events {
            if let AbilityEvent::TickDropped { ability, tick } = event {
                transport.send_reliable(NetRole::OwningClient, NetMessage::tick_dropped(*ability, *tick));
                sent += 1;
            }
        }
        sent
    }

    /// Sends the next versioned snapshot of `actor`. Returns its version.
    pub fn replicate(&mut self, actor: ActorId, component: &AbilityComponent, transport: &mut impl Transport) -> u64 {
        let version = self.snapshot_versions.entry(actor).or_default();
        *version += 1;
        let version = *version;
        transport.send_unreliable(NetRole::OwningClient, NetMessage::Snapshot(component.snapshot(version)));
        version
    }
}
