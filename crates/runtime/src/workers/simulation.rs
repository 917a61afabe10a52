//! Simulation worker that owns the authoritative [`CombatWorld`].
//!
//! Receives commands from [`RuntimeHandle`](crate::RuntimeHandle), applies
//! them to the world and, when auto ticking is enabled, steps the world on a
//! fixed interval. Everything the world reports goes out on the EventBus.

use std::ops::ControlFlow;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use combat_core::{
    AbilityId, ActorId, BuffId, CastOutcome, InterruptEvent, InterruptRequest, ThreatEvent,
    ThreatRequest,
};

use crate::api::Result;
use crate::client::ClientSession;
use crate::world::{ActorSpec, ActorView, CombatWorld, StepReport};

/// Commands that can be sent to the simulation worker
pub enum Command {
    /// Spawn a player and build the predicting client for it.
    SpawnPlayer {
        spec: ActorSpec,
        reply: oneshot::Sender<Result<ClientSession>>,
    },
    SpawnNpc {
        spec: ActorSpec,
        reply: oneshot::Sender<Result<()>>,
    },
    Despawn {
        actor: ActorId,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Server-originated cast, e.g. an NPC decision.
    UseAbility {
        actor: ActorId,
        ability: AbilityId,
        reply: oneshot::Sender<Result<CastOutcome>>,
    },
    AddThreat {
        npc: ActorId,
        request: ThreatRequest,
        reply: oneshot::Sender<Result<ThreatEvent>>,
    },
    Taunt {
        npc: ActorId,
        applied_by: ActorId,
        reply: oneshot::Sender<Result<ThreatEvent>>,
    },
    SetFixate {
        npc: ActorId,
        target: ActorId,
        source: BuffId,
        active: bool,
        reply: oneshot::Sender<Result<bool>>,
    },
    SetBlind {
        npc: ActorId,
        target: ActorId,
        source: BuffId,
        active: bool,
        reply: oneshot::Sender<Result<bool>>,
    },
    Interrupt {
        actor: ActorId,
        request: InterruptRequest,
        reply: oneshot::Sender<Result<InterruptEvent>>,
    },
    SetAlive {
        actor: ActorId,
        alive: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Run `steps` fixed steps immediately.
    Step {
        steps: u32,
        reply: oneshot::Sender<StepReport>,
    },
    ViewActor {
        actor: ActorId,
        reply: oneshot::Sender<Result<ActorView>>,
    },
    Now {
        reply: oneshot::Sender<f32>,
    },
    /// Stop the worker after acknowledging.
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::SpawnPlayer { .. } => "spawn_player",
            Self::SpawnNpc { .. } => "spawn_npc",
            Self::Despawn { .. } => "despawn",
            Self::UseAbility { .. } => "use_ability",
            Self::AddThreat { .. } => "add_threat",
            Self::Taunt { .. } => "taunt",
            Self::SetFixate { .. } => "set_fixate",
            Self::SetBlind { .. } => "set_blind",
            Self::Interrupt { .. } => "interrupt",
            Self::SetAlive { .. } => "set_alive",
            Self::Step { .. } => "step",
            Self::ViewActor { .. } => "view_actor",
            Self::Now { .. } => "now",
            Self::Shutdown { .. } => "shutdown",
        }
    }
}

fn send_reply<T>(reply: oneshot::Sender<T>, value: T, command: &'static str) {
    if reply.send(value).is_err() {
        debug!(target: "runtime::worker", command, "reply channel closed (caller dropped)");
    }
}

/// Background task that owns the world.
///
/// All mutation of actors, threat tables and the token pool happens on this
/// task, one command or step at a time.
pub struct SimulationWorker {
    world: CombatWorld,
    command_rx: mpsc::Receiver<Command>,
    tick_interval: Duration,
    auto_tick: bool,
}

impl SimulationWorker {
    pub fn new(
        world: CombatWorld,
        command_rx: mpsc::Receiver<Command>,
        tick_interval: Duration,
        auto_tick: bool,
    ) -> Self {
        info!(
            target: "runtime::worker",
            tick_ms = tick_interval.as_millis() as u64,
            auto_tick,
            abilities = world.catalog().len(),
            "simulation worker initialized"
        );
        Self {
            world,
            command_rx,
            tick_interval,
            auto_tick,
        }
    }

    fn step_seconds(&self) -> f32 {
        self.tick_interval.as_secs_f32()
    }

    /// Main worker loop. Ends on [`Command::Shutdown`] or when every handle
    /// is dropped.
    pub async fn run(mut self) {
        let mut ticker = time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    if self.handle_command(cmd).is_break() {
                        break;
                    }
                }
                _ = ticker.tick(), if self.auto_tick => {
                    let dt = self.step_seconds();
                    self.world.step(dt);
                }
                else => break,
            }
        }
        info!(target: "runtime::worker", time = self.world.now(), "simulation worker stopped");
    }

    fn handle_command(&mut self, cmd: Command) -> ControlFlow<()> {
        let name = cmd.name();
        let world = &mut self.world;
        match cmd {
            Command::SpawnPlayer { spec, reply } => {
                let session = world.spawn_player(spec.clone()).and_then(|link| {
                    ClientSession::from_spec(&spec, world.config().clone(), world.catalog(), link, world.now())
                });
                send_reply(reply, session, name);
            }
            Command::SpawnNpc { spec, reply } => send_reply(reply, world.spawn_npc(spec), name),
            Command::Despawn { actor, reply } => send_reply(reply, world.despawn(actor), name),
            Command::UseAbility { actor, ability, reply } => {
                send_reply(reply, world.use_ability(actor, ability), name);
            }
            Command::AddThreat { npc, request, reply } => {
                send_reply(reply, world.add_threat(npc, request), name);
            }
            Command::Taunt { npc, applied_by, reply } => {
                send_reply(reply, world.taunt(npc, applied_by), name);
            }
            Command::SetFixate {
                npc,
                target,
                source,
                active,
                reply,
            } => send_reply(reply, world.set_fixate(npc, target, source, active), name),
            Command::SetBlind {
                npc,
                target,
                source,
                active,
                reply,
            } => send_reply(reply, world.set_blind(npc, target, source, active), name),
            Command::Interrupt { actor, request, reply } => {
                send_reply(reply, world.interrupt(actor, request), name);
            }
            Command::SetAlive { actor, alive, reply } => {
                send_reply(reply, world.set_alive(actor, alive), name);
            }
            Command::Step { steps, reply } => {
                let dt = self.tick_interval.as_secs_f32();
                let mut total = StepReport {
                    time: world.now(),
                    ..StepReport::default()
                };
                for _ in 0..steps {
                    let report = world.step(dt);
                    total.time = report.time;
                    total.messages_handled += report.messages_handled;
                    total.snapshots_sent += report.snapshots_sent;
                }
                send_reply(reply, total, name);
            }
            Command::ViewActor { actor, reply } => send_reply(reply, world.view(actor), name),
            Command::Now { reply } => send_reply(reply, world.now(), name),
            Command::Shutdown { reply } => {
                send_reply(reply, (), name);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}
