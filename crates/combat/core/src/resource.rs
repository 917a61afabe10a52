//! Resource pools paid by ability costs.
//!
//! On the server the handler holds authoritative values. On a predicting client
//! the same type holds the last replicated values plus a set of pending cost
//! predictions layered on top, so a rollback is simply dropping one entry.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{CombatError, CombatResult};
use crate::ids::{PredictionId, ResourceId};

/// A single resource cost of an ability.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AbilityCost {
    pub resource: ResourceId,
    pub cost: f32,
}

impl AbilityCost {
    pub const fn new(resource: ResourceId, cost: f32) -> Self {
        Self { resource, cost }
    }
}

/// Replicated state of one resource.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceState {
    pub resource: ResourceId,
    pub current: f32,
    pub maximum: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Pool {
    current: f32,
    maximum: f32,
}

/// Resource pools of one actor.
#[derive(Clone, Debug, Default)]
pub struct ResourceHandler {
    pools: BTreeMap<ResourceId, Pool>,
    predictions: BTreeMap<PredictionId, Vec<AbilityCost>>,
    last_committed: PredictionId,
}

impl ResourceHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a pool. `current` is clamped to `[0, maximum]`.
    pub fn add_resource(&mut self, resource: ResourceId, current: f32, maximum: f32) {
        let maximum = maximum.max(0.0);
        self.pools.insert(
            resource,
            Pool {
                current: current.clamp(0.0, maximum),
                maximum,
            },
        );
    }

    pub fn has_resource(&self, resource: ResourceId) -> bool {
        self.pools.contains_key(&resource)
    }

    /// Current value including pending predictions, or `None` for an unknown pool.
    pub fn value(&self, resource: ResourceId) -> Option<f32> {
        let pool = self.pools.get(&resource)?;
        let predicted: f32 = self
            .predictions
            .values()
            .flatten()
            .filter(|cost| cost.resource == resource)
            .map(|cost| cost.cost)
            .sum();
        Some((pool.current - predicted).clamp(0.0, pool.maximum))
    }

    /// Returns true when every cost can be paid from the predicted view.
    /// Costs against unknown pools are never affordable.
    pub fn can_afford(&self, costs: &[AbilityCost]) -> bool {
        let mut totals: BTreeMap<ResourceId, f32> = BTreeMap::new();
        for cost in costs {
            *totals.entry(cost.resource).or_default() += cost.cost;
        }
        totals
            .into_iter()
            .all(|(resource, total)| self.value(resource).is_some_and(|value| value >= total))
    }

    /// Pays `costs` authoritatively.
    pub fn commit_costs(&mut self, prediction_id: PredictionId, costs: &[AbilityCost]) -> CombatResult<()> {
        if !self.can_afford(costs) {
            return Err(CombatError::NotAffordable);
        }
        for cost in costs {
            self.modify(cost.resource, -cost.cost);
        }
        if prediction_id > self.last_committed {
            self.last_committed = prediction_id;
        }
        Ok(())
    }

    /// Adds `delta` to a pool, clamped to its bounds. Returns the new value.
    pub fn modify(&mut self, resource: ResourceId, delta: f32) -> Option<f32> {
        let pool = self.pools.get_mut(&resource)?;
        pool.current = (pool.current + delta).clamp(0.0, pool.maximum);
        Some(pool.current)
    }

    /// Gives back previously paid costs.
    pub fn refund(&mut self, costs: &[AbilityCost]) {
        for cost in costs {
            self.modify(cost.resource, cost.cost);
        }
    }

    /// Client: layers a predicted payment over the replicated values.
    pub fn predict_costs(&mut self, prediction_id: PredictionId, costs: &[AbilityCost]) {
        if costs.is_empty() {
            return;
        }
        self.predictions.insert(prediction_id, costs.to_vec());
    }

    /// Client: replaces a prediction with the server's authoritative costs.
    ///
    /// Returns true when the authoritative costs differed from the guess.
    pub fn confirm_costs(&mut self, prediction_id: PredictionId, costs: &[AbilityCost]) -> CombatResult<bool> {
        if prediction_id <= self.last_committed {
            return Err(CombatError::Stale { prediction_id });
        }
        let previous = self.predictions.get(&prediction_id).cloned().unwrap_or_default();
        if previous == costs {
            return Ok(false);
        }
        if costs.is_empty() {
            self.predictions.remove(&prediction_id);
        } else {
            self.predictions.insert(prediction_id, costs.to_vec());
        }
        Ok(true)
    }

    /// Client: drops a prediction, refunding it in the predicted view.
    pub fn rollback(&mut self, prediction_id: PredictionId) -> bool {
        self.predictions.remove(&prediction_id).is_some()
    }

    pub fn has_prediction(&self, prediction_id: PredictionId) -> bool {
        self.predictions.contains_key(&prediction_id)
    }

    /// Client: applies replicated values. Predictions already folded into the
    /// authoritative state (id ≤ `prediction_id`) are discarded.
    pub fn apply_replicated(&mut self, states: &[ResourceState], prediction_id: PredictionId) {
        for state in states {
            self.add_resource(state.resource, state.current, state.maximum);
        }
        if prediction_id > self.last_committed {
            self.last_committed = prediction_id;
        }
        let committed = self.last_committed;
        self.predictions.retain(|id, _| *id > committed);
        trace!(
            target: "combat::prediction",
            committed = %committed,
            pending = self.predictions.len(),
            "applied replicated resources"
        );
    }

    /// Authoritative values, without predictions.
    pub fn snapshot(&self) -> Vec<ResourceState> {
        self.pools
            .iter()
            .map(|(resource, pool)| ResourceState {
                resource: *resource,
                current: pool.current,
                maximum: pool.maximum,
            })
            .collect()
    }

    pub fn last_committed(&self) -> PredictionId {
        self.last_committed
    }
}
