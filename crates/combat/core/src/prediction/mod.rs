//! Client prediction and server reconciliation.
//!
//! The protocol runs between one predicting client and the authoritative
//! server:
//!
//! 1. [`PredictionClient::use_ability`] predicts locally under a fresh
//!    [`PredictionId`](crate::ids::PredictionId) and sends an activation request.
//! 2. [`PredictionServer::handle_message`] validates it and answers with a
//!    [`ServerAbilityResult`] or a failure.
//! 3. The client confirms, corrects or rolls back the prediction.
//!
//! Ordering always compares prediction ids, never timestamps. Replicated
//! state travels as versioned [`AbilitySnapshot`]s.

mod client;
mod messages;
mod params;
mod replication;
mod server;
mod transport;

pub use client::{ClientUpdate, ErrorIndicator, PredictionClient};
pub use messages::{NetMessage, ServerAbilityResult};
pub use params::{CombatParameter, CombatParameters, ParamKind, ParamValue, Rotator, Vec3};
pub use replication::AbilitySnapshot;
pub use server::{PredictionServer, ServerUpdate};
pub use transport::{NetRole, RecordingTransport, SentMessage, Transport};

pub use crate::ability::{PredictionRecord, Reconciliation};
