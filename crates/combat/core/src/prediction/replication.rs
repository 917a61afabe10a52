//! Replicated ability state.

use crate::ability::{AbilityCooldown, CastingState, GlobalCooldown, InterruptEvent};
use crate::ids::{AbilityId, PredictionId};
use crate::resource::ResourceState;

/// Authoritative ability state sent to the owning client.
///
/// `version` increases with every snapshot of one actor. Clients ignore
/// versions they have already passed.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilitySnapshot {
    pub version: u64,
    pub global_cooldown: GlobalCooldown,
    pub casting: CastingState,
    pub cooldowns: Vec<(AbilityId, AbilityCooldown)>,
    pub resources: Vec<ResourceState>,
    /// Highest prediction whose costs are included in `resources`.
    pub resource_prediction: PredictionId,
    /// Most recent interrupt, so a client can end the matching predicted cast.
    pub last_interrupt: Option<InterruptEvent>,
}

impl AbilitySnapshot {
    pub fn cooldown(&self, ability: AbilityId) -> Option<AbilityCooldown> {
        self.cooldowns
            .iter()
            .find(|(id, _)| *id == ability)
            .map(|(_, cooldown)| *cooldown)
    }
}
