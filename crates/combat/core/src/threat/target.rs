//! Threat entries and the order a table keeps them in.

use core::cmp::Ordering;

use crate::ids::{ActorId, BuffId};

/// One entry of a threat table.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThreatTarget {
    pub target: ActorId,
    pub threat: f32,
    /// Buffs fixating the owner on this target.
    pub fixates: Vec<BuffId>,
    /// Buffs blinding the owner to this target.
    pub blinds: Vec<BuffId>,
    /// Mirrors the target's own fade status.
    pub faded: bool,
}

impl ThreatTarget {
    pub fn new(target: ActorId, threat: f32, faded: bool) -> Self {
        Self {
            target,
            threat,
            fixates: Vec::new(),
            blinds: Vec::new(),
            faded,
        }
    }

    pub fn is_fixated(&self) -> bool {
        !self.fixates.is_empty()
    }

    pub fn is_blinded(&self) -> bool {
        !self.blinds.is_empty()
    }

    /// Blinded or faded entries lose all priority.
    pub fn is_suppressed(&self) -> bool {
        self.is_blinded() || self.faded
    }

    /// Target priority. `Greater` means `self` is more wanted than `other`.
    ///
    /// A fixate on a suppressed entry is ignored, so a blinded and fixated
    /// target ranks with the other suppressed entries by raw threat.
    pub fn priority_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.threat.total_cmp(&other.threat))
    }

    fn rank(&self) -> u8 {
        match (self.is_suppressed(), self.is_fixated()) {
            (true, _) => 0,
            (false, false) => 1,
            (false, true) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: u32, threat: f32) -> ThreatTarget {
        ThreatTarget::new(ActorId(id), threat, false)
    }

    #[test]
    fn higher_threat_wins_without_effects() {
        assert_eq!(target(1, 50.0).priority_cmp(&target(2, 10.0)), Ordering::Greater);
    }

    #[test]
    fn fixate_beats_raw_threat() {
        let mut fixated = target(2, 1.0);
        fixated.fixates.push(BuffId(7));
        assert_eq!(fixated.priority_cmp(&target(1, 500.0)), Ordering::Greater);
    }

    #[test]
    fn blind_and_fade_sort_below_everything() {
        let mut blinded = target(1, 900.0);
        blinded.blinds.push(BuffId(3));
        let mut faded = target(2, 800.0);
        faded.faded = true;
        let plain = target(3, 1.0);
        assert_eq!(blinded.priority_cmp(&plain), Ordering::Less);
        assert_eq!(faded.priority_cmp(&plain), Ordering::Less);
        // Suppressed entries still order among themselves by threat.
        assert_eq!(blinded.priority_cmp(&faded), Ordering::Greater);
    }

    #[test]
    fn blind_overrides_fixate() {
        let mut both = target(1, 100.0);
        both.fixates.push(BuffId(1));
        both.blinds.push(BuffId(2));
        assert!(both.is_suppressed());
        assert_eq!(both.priority_cmp(&target(2, 0.0)), Ordering::Less);
    }
}
