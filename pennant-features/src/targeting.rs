//! Targeting rule evaluation
//!
//! A rule set holds when every condition holds. Rule sets are tried in
//! priority order and the first one that holds governs.
//!
//! Operator semantics:
//!
//! | Operator | Holds when |
//! |----------|------------|
//! | `equals` | attribute equals the first operand |
//! | `notEquals` | attribute differs from the first operand |
//! | `lessThan` / `greaterThan` | attribute and first operand are both numbers or both timestamps, and compare accordingly |
//! | `in` | attribute equals any operand |
//! | `notIn` | attribute equals no operand |
//!
//! A missing attribute never satisfies a condition, negative operators
//! included.

use crate::attribute::SubjectContext;
use crate::flag::{Condition, Operator, TargetingRule};
use std::cmp::Ordering;

/// Whether a single condition holds for the subject.
pub fn condition_holds(condition: &Condition, context: &SubjectContext) -> bool {
    let Some(actual) = context.get(&condition.attribute) else {
        return false;
    };
    let Some(first) = condition.values.first() else {
        return false;
    };

    match condition.operator {
        Operator::Equals => actual == first,
        Operator::NotEquals => actual != first,
        Operator::LessThan => actual.partial_compare(first) == Some(Ordering::Less),
        Operator::GreaterThan => actual.partial_compare(first) == Some(Ordering::Greater),
        Operator::In => condition.values.iter().any(|value| value == actual),
        Operator::NotIn => condition.values.iter().all(|value| value != actual),
    }
}

/// Whether every condition of a rule set holds (AND semantics).
pub fn matches(conditions: &[Condition], context: &SubjectContext) -> bool {
    conditions
        .iter()
        .all(|condition| condition_holds(condition, context))
}

/// First rule set, in priority order, that holds for the subject.
pub fn first_match<'a>(
    rules: &'a [TargetingRule],
    context: &SubjectContext,
) -> Option<(usize, &'a TargetingRule)> {
    rules
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.matches(context))
}
