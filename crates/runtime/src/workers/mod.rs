//! Worker tasks that back the runtime orchestration.
//!
//! A single simulation worker owns the world, so every combat mutation is
//! serialized through its command channel.

mod simulation;

pub use simulation::{Command, SimulationWorker};
