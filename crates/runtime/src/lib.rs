//! Async orchestration for the combat simulation.
//!
//! This crate wires the synchronous rules of `combat-core` into a server
//! loop. Consumers embed [`Runtime`] to step the world, spawn actors, and
//! subscribe to events through [`RuntimeHandle`]. Players get a
//! [`ClientSession`] that predicts locally and talks to the server over a
//! [`LoopbackTransport`].
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes the types downstream clients interact with
//! - [`world`] owns actors, threat tables and the NPC token pool
//! - [`client`] is the predicting side of one player
//! - [`transport`] carries protocol messages between the two
//! - [`events`] provides topic-based event bus for flexible event routing
//! - [`workers`] keeps background tasks internal to the crate
pub mod api;
pub mod client;
pub mod events;
pub mod runtime;
pub mod telemetry;
pub mod transport;
pub mod world;

mod workers;

pub use api::{Result, RuntimeError, RuntimeHandle};
pub use client::{ClientSession, SessionUpdate};
pub use events::{AbilityNotice, Event, EventBus, PredictionNotice, ThreatNotice, Topic};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
pub use telemetry::{init_file_tracing, init_tracing};
pub use transport::LoopbackTransport;
pub use world::{ActorSpec, ActorView, CombatWorld, StepReport};
