use super::InterruptEvent;
use crate::error::CombatError;
use crate::ids::{AbilityId, ActorId, PredictionId};
use crate::prediction::CombatParameters;

/// Where a behavior hook is running.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickContext {
    pub owner: ActorId,
    pub ability: AbilityId,
    pub prediction_id: PredictionId,
    pub tick: u32,
    pub time: f32,
}

/// Ability-specific effects run by the cast state machine.
///
/// Hooks are invoked when the tick fires, never when the cast starts, so the
/// parameters they produce reflect the state at that moment (aim direction,
/// current target). Every hook has a no-op default.
pub trait AbilityBehavior: Send {
    /// Client: runs a tick locally. The returned parameters are sent to the server.
    fn predicted_tick(&mut self, _ctx: &TickContext) -> CombatParameters {
        CombatParameters::new()
    }

    /// Server: runs a tick with the client's parameters (empty when
    /// unpredicted). The returned parameters are broadcast to observers.
    fn server_tick(&mut self, _ctx: &TickContext, prediction_params: &CombatParameters) -> CombatParameters {
        prediction_params.clone()
    }

    /// Client: the caster stopped the cast. Returned parameters go to the server.
    fn predicted_cancel(&mut self, _ctx: &TickContext) -> CombatParameters {
        CombatParameters::new()
    }

    fn server_cancel(&mut self, _ctx: &TickContext, _params: &CombatParameters) {}

    fn cast_complete(&mut self, _ctx: &TickContext) {}

    fn cast_interrupted(&mut self, _ctx: &TickContext, _event: &InterruptEvent) {}

    /// Client: the server refused a prediction, or dropped one of its ticks.
    /// Undo anything spawned for it.
    fn mispredicted(&mut self, _prediction_id: PredictionId, _reason: &CombatError) {}
}

/// Behavior for abilities whose effects live entirely in event observers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopBehavior;

impl AbilityBehavior for NoopBehavior {}
