//! Experiment recommendation policy
//!
//! Stateless: the verdict is recomputed from the latest numbers on every
//! check and no transition history is kept.

use crate::stats::DEFAULT_SIGNIFICANCE_LEVEL;
use serde::{Deserialize, Serialize};

/// What to do with a running experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Keep collecting data
    Continue,
    /// Full power reached without a significant effect
    Stop,
    /// Treatment significantly better; ship it
    Rollout,
    /// Treatment significantly worse; revert to control
    Rollback,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Stop => "stop",
            Self::Rollout => "rollout",
            Self::Rollback => "rollback",
        }
    }

    /// Whether the experiment has reached a conclusion
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Continue)
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide at the default 0.05 significance level.
pub fn decide(
    current_sample_size: u64,
    required_sample_size: u64,
    p_value: f64,
    treatment_winning: bool,
) -> Recommendation {
    decide_at(
        current_sample_size,
        required_sample_size,
        p_value,
        treatment_winning,
        DEFAULT_SIGNIFICANCE_LEVEL,
    )
}

/// Decide at an explicit significance level.
///
/// Below half the required sample size nothing is concluded, however small
/// the p-value.
pub fn decide_at(
    current_sample_size: u64,
    required_sample_size: u64,
    p_value: f64,
    treatment_winning: bool,
    significance_level: f64,
) -> Recommendation {
    if (current_sample_size as f64) < 0.5 * required_sample_size as f64 {
        Recommendation::Continue
    } else if p_value < significance_level {
        if treatment_winning {
            Recommendation::Rollout
        } else {
            Recommendation::Rollback
        }
    } else if current_sample_size >= required_sample_size {
        Recommendation::Stop
    } else {
        Recommendation::Continue
    }
}
