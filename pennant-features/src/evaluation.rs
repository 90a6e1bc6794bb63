//! Evaluation results

use crate::flag::Variation;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why an evaluation produced its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    /// Subject was eligible and included by percentage rollout
    Targeting,
    /// No rule set served the subject; fallthrough variation returned
    Fallthrough,
    /// Flag missing, disabled, or its snapshot could not be read in time
    Default,
    /// A targeting rule set matched and served its own variation
    RuleMatch,
}

impl EvaluationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Targeting => "targeting",
            Self::Fallthrough => "fallthrough",
            Self::Default => "default",
            Self::RuleMatch => "rule_match",
        }
    }
}

impl std::fmt::Display for EvaluationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of evaluating one flag for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub flag_key: String,
    pub value: Variation,
    /// Index into the flag's variations; `None` when the value did not come
    /// from the variation list
    pub variation: Option<usize>,
    pub reason: EvaluationReason,
    pub evaluation_time_ms: f64,
}

impl EvaluationResult {
    pub fn new(
        flag_key: impl Into<String>,
        value: Variation,
        variation: Option<usize>,
        reason: EvaluationReason,
    ) -> Self {
        Self {
            flag_key: flag_key.into(),
            value,
            variation,
            reason,
            evaluation_time_ms: 0.0,
        }
    }

    /// Result for a flag that could not be evaluated.
    pub fn fallback(flag_key: impl Into<String>, value: Variation) -> Self {
        Self::new(flag_key, value, None, EvaluationReason::Default)
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.evaluation_time_ms = elapsed.as_secs_f64() * 1000.0;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&EvaluationReason::RuleMatch).unwrap();
        assert_eq!(json, r#""rule_match""#);
        assert_eq!(EvaluationReason::Fallthrough.to_string(), "fallthrough");
    }

    #[test]
    fn test_elapsed_in_milliseconds() {
        let result = EvaluationResult::fallback("f", Variation::boolean(false))
            .with_elapsed(Duration::from_micros(1500));

        assert_eq!(result.reason, EvaluationReason::Default);
        assert!((result.evaluation_time_ms - 1.5).abs() < 1e-9);
    }
}
