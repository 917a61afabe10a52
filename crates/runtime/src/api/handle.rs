//! Cloneable façade for issuing commands to the runtime.
//!
//! [`RuntimeHandle`] hides channel plumbing and offers async helpers for
//! driving the world or streaming events from specific topics.
use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc, oneshot};

use combat_core::{
    AbilityId, ActorId, BuffId, CastOutcome, InterruptEvent, InterruptRequest, ThreatEvent,
    ThreatRequest,
};

use super::errors::{Result, RuntimeError};
use crate::client::ClientSession;
use crate::events::{Event, EventBus, Topic};
use crate::workers::Command;
use crate::world::{ActorSpec, ActorView, StepReport};

/// Client-facing handle to interact with the runtime
#[derive(Clone)]
pub struct RuntimeHandle {
    command_tx: mpsc::Sender<Command>,
    event_bus: EventBus,
}

impl RuntimeHandle {
    pub(crate) fn new(command_tx: mpsc::Sender<Command>, event_bus: EventBus) -> Self {
        Self {
            command_tx,
            event_bus,
        }
    }

    /// Sends one command and waits for the worker's reply.
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| RuntimeError::CommandChannelClosed)?;

        reply_rx.await.map_err(RuntimeError::ReplyChannelClosed)
    }

    /// Spawns a player and returns its predicting client, already mirroring
    /// the granted abilities and resources.
    pub async fn spawn_player(&self, spec: ActorSpec) -> Result<ClientSession> {
        self.request(|reply| Command::SpawnPlayer { spec, reply }).await?
    }

    pub async fn spawn_npc(&self, spec: ActorSpec) -> Result<()> {
        self.request(|reply| Command::SpawnNpc { spec, reply }).await?
    }

    pub async fn despawn(&self, actor: ActorId) -> Result<()> {
        self.request(|reply| Command::Despawn { actor, reply }).await?
    }

    /// Casts on the server without prediction.
    pub async fn use_ability(&self, actor: ActorId, ability: AbilityId) -> Result<CastOutcome> {
        self.request(|reply| Command::UseAbility { actor, ability, reply })
            .await?
    }

    pub async fn add_threat(&self, npc: ActorId, request: ThreatRequest) -> Result<ThreatEvent> {
        self.request(|reply| Command::AddThreat { npc, request, reply })
            .await?
    }

    pub async fn taunt(&self, npc: ActorId, applied_by: ActorId) -> Result<ThreatEvent> {
        self.request(|reply| Command::Taunt {
            npc,
            applied_by,
            reply,
        })
        .await?
    }

    pub async fn set_fixate(&self, npc: ActorId, target: ActorId, source: BuffId, active: bool) -> Result<bool> {
        self.request(|reply| Command::SetFixate {
            npc,
            target,
            source,
            active,
            reply,
        })
        .await?
    }

    pub async fn set_blind(&self, npc: ActorId, target: ActorId, source: BuffId, active: bool) -> Result<bool> {
        self.request(|reply| Command::SetBlind {
            npc,
            target,
            source,
            active,
            reply,
        })
        .await?
    }

    pub async fn interrupt(&self, actor: ActorId, request: InterruptRequest) -> Result<InterruptEvent> {
        self.request(|reply| Command::Interrupt { actor, request, reply })
            .await?
    }

    pub async fn set_alive(&self, actor: ActorId, alive: bool) -> Result<()> {
        self.request(|reply| Command::SetAlive { actor, alive, reply })
            .await?
    }

    /// Runs `steps` fixed steps right away, independent of auto ticking.
    pub async fn step(&self, steps: u32) -> Result<StepReport> {
        self.request(|reply| Command::Step { steps, reply }).await
    }

    pub async fn view(&self, actor: ActorId) -> Result<ActorView> {
        self.request(|reply| Command::ViewActor { actor, reply }).await?
    }

    /// Current server simulation time.
    pub async fn now(&self) -> Result<f32> {
        self.request(|reply| Command::Now { reply }).await
    }

    pub(crate) async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Subscribe to events from a specific topic
    ///
    /// # Topics
    ///
    /// - `Topic::Ability` - Cast lifecycle, charges, cooldowns
    /// - `Topic::Threat` - NPC target and combat status changes
    /// - `Topic::Prediction` - Handled client requests and snapshots
    /// - `Topic::Tokens` - NPC token availability
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use combat_runtime::Topic;
    ///
    /// let mut threat_rx = handle.subscribe(Topic::Threat);
    /// while let Ok(event) = threat_rx.recv().await {
    ///     // React to target changes
    /// }
    /// ```
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Event> {
        self.event_bus.subscribe(topic)
    }

    /// Subscribe to multiple topics at once
    pub fn subscribe_multiple(&self, topics: &[Topic]) -> HashMap<Topic, broadcast::Receiver<Event>> {
        self.event_bus.subscribe_multiple(topics)
    }

    /// Get a reference to the event bus for advanced usage
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }
}
