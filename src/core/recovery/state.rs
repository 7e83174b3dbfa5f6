//! Per-(endpoint, domain) recovery states.

use serde::{Deserialize, Serialize};

/// State of one (endpoint, domain) pair. The whole-endpoint `Disabled`
/// lifecycle lives on the health record and overrides all of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum PairState {
    /// Default; failures only accumulate counters.
    #[default]
    Healthy,
    /// Consecutive failures crossed the warning threshold; signals higher
    /// selection cost but has no gating effect yet.
    Degraded,
    /// Suspended behind a backoff deadline.
    CoolingDown,
    /// Excluded from selection until an explicit manual reset. Pair-scoped:
    /// the endpoint stays usable for other domains.
    Retired,
}

impl std::fmt::Display for PairState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::CoolingDown => write!(f, "coolingDown"),
            Self::Retired => write!(f, "retired"),
        }
    }
}

impl PairState {
    /// Check whether a transition is one the coordinator may produce.
    pub fn can_transition_to(self, next: PairState) -> bool {
        use PairState::*;

        matches!(
            (self, next),
            // escalation
            (Healthy, Degraded) |
            // a confident ban classification can skip the degraded stage
            (Healthy, CoolingDown) |
            (Degraded, CoolingDown) |
            // cooldown re-entry without an intervening success
            (CoolingDown, CoolingDown) |
            (CoolingDown, Retired) |
            // any success is a full recovery
            (Healthy, Healthy) |
            (Degraded, Healthy) |
            (CoolingDown, Healthy) |
            // manual reset only
            (Retired, Healthy)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_paths_are_valid() {
        assert!(PairState::Healthy.can_transition_to(PairState::Degraded));
        assert!(PairState::Healthy.can_transition_to(PairState::CoolingDown));
        assert!(PairState::Degraded.can_transition_to(PairState::CoolingDown));
        assert!(PairState::CoolingDown.can_transition_to(PairState::Retired));
    }

    #[test]
    fn recovery_paths_are_valid() {
        assert!(PairState::Degraded.can_transition_to(PairState::Healthy));
        assert!(PairState::CoolingDown.can_transition_to(PairState::Healthy));
        assert!(PairState::Retired.can_transition_to(PairState::Healthy));
    }

    #[test]
    fn skipping_backwards_is_invalid() {
        assert!(!PairState::Retired.can_transition_to(PairState::CoolingDown));
        assert!(!PairState::CoolingDown.can_transition_to(PairState::Degraded));
        assert!(!PairState::Healthy.can_transition_to(PairState::Retired));
    }
}
