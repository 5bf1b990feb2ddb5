// src/reward.rs
//
// Episode outcomes and the deterministic reward function.

use serde::{Deserialize, Serialize};

/// Outcome of an episode (or of the running constraint check).
///
/// Computed at most once per episode at termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Fail,
    NoOutcome,
    Success,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Stable lowercase name (used in logs and the CLI summary).
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Fail => "fail",
            Outcome::NoOutcome => "no_outcome",
            Outcome::Success => "success",
        }
    }
}

/// Per-step reward as a pure function of outcome and the round ceiling.
///
/// Every step costs -1; termination adds -max_round on failure and
/// +2*max_round on success.
pub fn reward_for(outcome: Outcome, max_round: u32) -> f64 {
    let base = -1.0;
    match outcome {
        Outcome::Fail => base - max_round as f64,
        Outcome::NoOutcome => base,
        Outcome::Success => base + 2.0 * max_round as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_fail() {
        assert_eq!(reward_for(Outcome::Fail, 20), -21.0);
        assert_eq!(reward_for(Outcome::Fail, 0), -1.0);
    }

    #[test]
    fn test_reward_success() {
        assert_eq!(reward_for(Outcome::Success, 20), 39.0);
        assert_eq!(reward_for(Outcome::Success, 1), 1.0);
    }

    #[test]
    fn test_reward_no_outcome_is_step_cost() {
        for r in [0u32, 1, 7, 20, 100] {
            assert_eq!(reward_for(Outcome::NoOutcome, r), -1.0);
        }
    }
}
