//! Feature Flag Core
//!
//! Defines feature flags, targeting rules, and evaluation logic.

use crate::attribute::{AttributeValue, SubjectContext};
use crate::bucket::BucketAssignor;
use crate::error::{FeatureError, FeatureResult};
use crate::evaluation::{EvaluationReason, EvaluationResult};
use crate::targeting;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn full_rollout() -> u8 {
    100
}

/// Feature flag definition
///
/// Snapshots are immutable from the engine's point of view; the definition
/// source replaces them wholesale and bumps `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Flag key/name
    pub key: String,

    /// Flag description
    #[serde(default)]
    pub description: Option<String>,

    /// Kill switch; a disabled flag always serves `default_value`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Snapshot version
    #[serde(default)]
    pub version: u64,

    /// Value served when the flag is disabled or cannot be evaluated
    pub default_value: Variation,

    /// All available variations
    pub variations: Vec<Variation>,

    /// Targeting rule sets in priority order
    #[serde(default)]
    pub targeting: Vec<TargetingRule>,

    /// Share of eligible subjects (0-100) that receive the rollout variation
    #[serde(default = "full_rollout")]
    pub rollout_percentage: u8,

    /// Variation served to subjects inside the rollout; `None` splits them
    /// evenly across all variations
    #[serde(default)]
    pub rollout_variation: Option<usize>,

    /// Variation served when no rule set or rollout applies
    #[serde(default)]
    pub fallthrough_variation: usize,

    /// Attribute to bucket on instead of the subject id
    #[serde(default)]
    pub bucket_by: Option<String>,
}

impl FeatureFlag {
    /// Create a new simple boolean feature flag
    ///
    /// Every subject receives `default_value` until a rollout percentage or a
    /// targeting rule says otherwise; rollouts serve `true`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pennant_features::FeatureFlag;
    ///
    /// let flag = FeatureFlag::boolean("new-ui", false).with_rollout(25);
    /// assert!(flag.validate().is_ok());
    /// ```
    pub fn boolean(key: impl Into<String>, default_value: bool) -> Self {
        Self {
            key: key.into(),
            description: None,
            enabled: true,
            version: 0,
            default_value: Variation::boolean(default_value),
            variations: vec![Variation::boolean(false), Variation::boolean(true)],
            targeting: Vec::new(),
            rollout_percentage: 0,
            rollout_variation: Some(1),
            fallthrough_variation: usize::from(default_value),
            bucket_by: None,
        }
    }

    /// Create a new multivariate feature flag
    ///
    /// Eligible subjects are spread evenly across `variations`; the first
    /// variation doubles as default and fallthrough.
    pub fn multivariate(key: impl Into<String>, variations: Vec<Variation>) -> Self {
        let default_value = variations
            .first()
            .cloned()
            .unwrap_or(Variation::Boolean(false));

        Self {
            key: key.into(),
            description: None,
            enabled: true,
            version: 0,
            default_value,
            variations,
            targeting: Vec::new(),
            rollout_percentage: 100,
            rollout_variation: None,
            fallthrough_variation: 0,
            bucket_by: None,
        }
    }

    /// Set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add targeting rule set (lowest priority so far)
    pub fn with_rule(mut self, rule: TargetingRule) -> Self {
        self.targeting.push(rule);
        self
    }

    /// Set rollout percentage, clamped to 100
    pub fn with_rollout(mut self, percentage: u8) -> Self {
        self.rollout_percentage = percentage.min(100);
        self
    }

    /// Set the variation served inside the rollout
    pub fn with_rollout_variation(mut self, index: Option<usize>) -> Self {
        self.rollout_variation = index;
        self
    }

    pub fn with_fallthrough(mut self, index: usize) -> Self {
        self.fallthrough_variation = index;
        self
    }

    pub fn with_bucket_by(mut self, attribute: impl Into<String>) -> Self {
        self.bucket_by = Some(attribute.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check internal consistency; run when a definition is loaded
    pub fn validate(&self) -> FeatureResult<()> {
        if self.key.trim().is_empty() {
            return Err(FeatureError::configuration("flag key cannot be empty"));
        }
        if self.variations.is_empty() {
            return Err(FeatureError::configuration(format!(
                "flag '{}' declares no variations",
                self.key
            )));
        }

        let count = self.variations.len();
        let check_index = |index: usize, what: &str| {
            if index >= count {
                Err(FeatureError::configuration(format!(
                    "flag '{}' {} references unknown variation {} (have {})",
                    self.key, what, index, count
                )))
            } else {
                Ok(())
            }
        };

        check_index(self.fallthrough_variation, "fallthrough")?;
        if let Some(index) = self.rollout_variation {
            check_index(index, "rollout")?;
        }
        if self.rollout_percentage > 100 {
            return Err(FeatureError::configuration(format!(
                "flag '{}' rollout percentage {} exceeds 100",
                self.key, self.rollout_percentage
            )));
        }

        for (position, rule) in self.targeting.iter().enumerate() {
            if let Some(index) = rule.variation {
                check_index(index, &format!("rule {}", position))?;
            }
            for condition in &rule.conditions {
                condition
                    .validate()
                    .map_err(|e| FeatureError::configuration(format!("flag '{}': {}", self.key, e)))?;
            }
        }

        Ok(())
    }

    /// Evaluate flag for a context
    pub fn evaluate(&self, context: &SubjectContext) -> EvaluationResult {
        if !self.enabled {
            return EvaluationResult::fallback(&self.key, self.default_value.clone());
        }

        if !self.targeting.is_empty() {
            match targeting::first_match(&self.targeting, context) {
                Some((_, rule)) => {
                    if let Some(index) = rule.variation {
                        return self.serve(index, EvaluationReason::RuleMatch);
                    }
                }
                None => {
                    return self.serve(self.fallthrough_variation, EvaluationReason::Fallthrough);
                }
            }
        }

        let bucket_key = context.bucketing_key(self.bucket_by.as_deref());
        if BucketAssignor::include_in_rollout(&bucket_key, &self.key, self.rollout_percentage) {
            let index = match self.rollout_variation {
                Some(index) => Some(index),
                None => BucketAssignor::assign_even(&bucket_key, &self.key, self.variations.len()),
            };
            if let Some(index) = index {
                return self.serve(index, EvaluationReason::Targeting);
            }
        }

        self.serve(self.fallthrough_variation, EvaluationReason::Fallthrough)
    }

    fn serve(&self, index: usize, reason: EvaluationReason) -> EvaluationResult {
        match self.variations.get(index) {
            Some(value) => EvaluationResult::new(&self.key, value.clone(), Some(index), reason),
            None => EvaluationResult::fallback(&self.key, self.default_value.clone()),
        }
    }
}

/// Feature flag variation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variation {
    Boolean(bool),
    String(String),
    Number(f64),
    Json(serde_json::Value),
}

impl Variation {
    pub fn boolean(value: bool) -> Self {
        Self::Boolean(value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// Targeting rule set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingRule {
    /// Rule conditions (all must match)
    pub conditions: Vec<Condition>,

    /// Variation to serve if the rule set matches; `None` only marks the
    /// subject as eligible for the rollout
    #[serde(default)]
    pub variation: Option<usize>,
}

impl TargetingRule {
    pub fn new(variation: usize) -> Self {
        Self {
            conditions: Vec::new(),
            variation: Some(variation),
        }
    }

    /// Rule set that gates rollout eligibility without serving a variation
    pub fn eligibility() -> Self {
        Self {
            conditions: Vec::new(),
            variation: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn matches(&self, context: &SubjectContext) -> bool {
        targeting::matches(&self.conditions, context)
    }
}

/// Targeting condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Attribute to check
    pub attribute: String,

    /// Operator
    pub operator: Operator,

    /// Values to compare against
    pub values: Vec<AttributeValue>,
}

impl Condition {
    pub fn new(attribute: impl Into<String>, operator: Operator, values: Vec<AttributeValue>) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            values,
        }
    }

    /// Single-operand shorthand, e.g. `Condition::single("role", Operator::Equals, "client")`
    pub fn single(
        attribute: impl Into<String>,
        operator: Operator,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self::new(attribute, operator, vec![value.into()])
    }

    pub fn matches(&self, context: &SubjectContext) -> bool {
        targeting::condition_holds(self, context)
    }

    fn validate(&self) -> FeatureResult<()> {
        if self.attribute.trim().is_empty() {
            return Err(FeatureError::configuration("condition attribute cannot be empty"));
        }
        let Some(first) = self.values.first() else {
            return Err(FeatureError::configuration(format!(
                "condition on '{}' has no operand",
                self.attribute
            )));
        };
        if self.operator.is_ordering()
            && !matches!(first, AttributeValue::Number(_) | AttributeValue::Timestamp(_))
        {
            return Err(FeatureError::configuration(format!(
                "condition on '{}' orders against non-comparable operand {}",
                self.attribute, first
            )));
        }
        Ok(())
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    In,
    NotIn,
}

impl Operator {
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::LessThan | Self::GreaterThan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_rule(variation: usize) -> TargetingRule {
        TargetingRule::new(variation).with_condition(Condition::single(
            "role",
            Operator::Equals,
            "client",
        ))
    }

    #[test]
    fn test_boolean_flag() {
        let flag = FeatureFlag::boolean("test-flag", true);
        let context = SubjectContext::new("user-1");

        let result = flag.evaluate(&context);
        assert_eq!(result.value.as_bool(), Some(true));
        assert_eq!(result.reason, EvaluationReason::Fallthrough);
    }

    #[test]
    fn test_disabled_flag() {
        let flag = FeatureFlag::boolean("test-flag", true).disabled();

        let result = flag.evaluate(&SubjectContext::new("user-1"));
        assert_eq!(result.value.as_bool(), Some(true));
        assert_eq!(result.reason, EvaluationReason::Default);
        assert_eq!(result.variation, None);
    }

    #[test]
    fn test_targeting_rule() {
        let flag = FeatureFlag::boolean("test-flag", false).with_rule(client_rule(1));

        let client = SubjectContext::new("user-1").with_attribute("role", "client");
        let result = flag.evaluate(&client);
        assert_eq!(result.value.as_bool(), Some(true));
        assert_eq!(result.reason, EvaluationReason::RuleMatch);

        let freelancer = SubjectContext::new("user-2").with_attribute("role", "freelancer");
        let result = flag.evaluate(&freelancer);
        assert_eq!(result.value.as_bool(), Some(false));
        assert_eq!(result.reason, EvaluationReason::Fallthrough);
    }

    #[test]
    fn test_rule_priority_order() {
        let flag = FeatureFlag::multivariate(
            "plan-banner",
            vec![
                Variation::string("none"),
                Variation::string("upsell"),
                Variation::string("thanks"),
            ],
        )
        .with_rule(
            TargetingRule::new(2).with_condition(Condition::single("tier", Operator::Equals, "power")),
        )
        .with_rule(
            TargetingRule::new(1).with_condition(Condition::single("tenure_days", Operator::GreaterThan, 30)),
        );

        let both = SubjectContext::new("u")
            .with_attribute("tier", "power")
            .with_attribute("tenure_days", 90);
        assert_eq!(flag.evaluate(&both).value.as_string(), Some("thanks"));

        let veteran = SubjectContext::new("u").with_attribute("tenure_days", 90);
        assert_eq!(flag.evaluate(&veteran).value.as_string(), Some("upsell"));
    }

    #[test]
    fn test_rollout() {
        let flag = FeatureFlag::boolean("test-flag", false).with_rollout(50);

        let mut enabled_count = 0;
        for i in 0..1000 {
            let context = SubjectContext::new(format!("user-{}", i));
            let result = flag.evaluate(&context);
            if result.value.as_bool() == Some(true) {
                assert_eq!(result.reason, EvaluationReason::Targeting);
                enabled_count += 1;
            }
        }

        assert!((400..=600).contains(&enabled_count), "got {}", enabled_count);
    }

    #[test]
    fn test_eligibility_rule_gates_rollout() {
        let flag = FeatureFlag::boolean("beta", false)
            .with_rollout(100)
            .with_rule(
                TargetingRule::eligibility()
                    .with_condition(Condition::single("role", Operator::Equals, "client")),
            );

        let client = SubjectContext::new("c").with_attribute("role", "client");
        assert_eq!(flag.evaluate(&client).reason, EvaluationReason::Targeting);

        let other = SubjectContext::new("o").with_attribute("role", "admin");
        let result = flag.evaluate(&other);
        assert_eq!(result.reason, EvaluationReason::Fallthrough);
        assert_eq!(result.value.as_bool(), Some(false));
    }

    #[test]
    fn test_bucket_by_attribute_groups_subjects() {
        let flag = FeatureFlag::boolean("org-feature", false)
            .with_rollout(50)
            .with_bucket_by("org_id");

        let first = flag.evaluate(&SubjectContext::new("a").with_attribute("org_id", "acme"));
        for i in 0..20 {
            let member = SubjectContext::new(format!("member-{}", i)).with_attribute("org_id", "acme");
            assert_eq!(flag.evaluate(&member).value, first.value);
        }
    }

    #[test]
    fn test_multivariate_flag() {
        let flag = FeatureFlag::multivariate(
            "color-scheme",
            vec![
                Variation::string("red"),
                Variation::string("blue"),
                Variation::string("green"),
            ],
        );

        let mut seen = std::collections::HashSet::new();
        for i in 0..200 {
            let result = flag.evaluate(&SubjectContext::new(format!("user-{}", i)));
            assert_eq!(result.reason, EvaluationReason::Targeting);
            seen.insert(result.value.as_string().unwrap().to_string());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_validate_rejects_dangling_indices() {
        let flag = FeatureFlag::boolean("f", false).with_fallthrough(5);
        assert!(matches!(flag.validate(), Err(FeatureError::Configuration(_))));

        let flag = FeatureFlag::boolean("f", false).with_rule(client_rule(9));
        assert!(matches!(flag.validate(), Err(FeatureError::Configuration(_))));

        let flag = FeatureFlag::boolean("f", false).with_rollout_variation(Some(2));
        assert!(flag.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_conditions() {
        let flag = FeatureFlag::boolean("f", false).with_rule(
            TargetingRule::new(1).with_condition(Condition::new("role", Operator::In, vec![])),
        );
        assert!(flag.validate().is_err());

        let flag = FeatureFlag::boolean("f", false).with_rule(
            TargetingRule::new(1)
                .with_condition(Condition::single("tenure", Operator::LessThan, "ten")),
        );
        assert!(flag.validate().is_err());
    }

    #[test]
    fn test_deserialize_definition_defaults() {
        let flag: FeatureFlag = serde_json::from_str(
            r#"{
                "key": "new-checkout",
                "default_value": false,
                "variations": [false, true],
                "targeting": [
                    {"conditions": [{"attribute": "role", "operator": "notIn", "values": ["admin"]}]}
                ],
                "rollout_variation": 1
            }"#,
        )
        .unwrap();

        assert!(flag.enabled);
        assert_eq!(flag.rollout_percentage, 100);
        assert_eq!(flag.fallthrough_variation, 0);
        assert_eq!(flag.targeting[0].conditions[0].operator, Operator::NotIn);
        assert!(flag.validate().is_ok());
    }
}
