//! Topic-based event bus for runtime events.
//!
//! The simulation worker republishes what the combat components report, so
//! consumers can subscribe only to the topics they need.

mod bus;
mod types;

pub use bus::{Event, EventBus, Topic};
pub use types::{AbilityNotice, PredictionNotice, ThreatNotice};
