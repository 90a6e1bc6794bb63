//! Feature flags and experiments for Pennant
//!
//! Deterministic flag evaluation, experiment bucketing and two-proportion
//! statistics behind a single [`FeatureEngine`].
//!
//! # Features
//!
//! - 🎯 **Targeting Rules** - Typed attribute conditions with AND semantics
//! - 🎲 **Gradual Rollout** - Stable percentage-based inclusion
//! - 📊 **Experiments** - Weighted variant assignment with exposure tracking
//! - 📈 **Statistics** - z-test, sample size planning, confidence intervals
//! - 🚦 **Recommendations** - Continue / stop / rollout / rollback verdicts
//!
//! # Quick Start
//!
//! ```
//! use pennant_features::*;
//!
//! // Roll a boolean flag out to 25% of subjects
//! let flag = FeatureFlag::boolean("new-ui", false).with_rollout(25);
//!
//! let context = SubjectContext::new("user-123");
//! let enabled = flag.evaluate(&context).value.as_bool().unwrap_or(false);
//!
//! if enabled {
//!     // Show new UI
//! }
//! ```
//!
//! # Targeting Rules
//!
//! ```
//! use pennant_features::*;
//!
//! let rule = TargetingRule::new(1)
//!     .with_condition(Condition::single("role", Operator::Equals, "client"))
//!     .with_condition(Condition::single("tenure_days", Operator::GreaterThan, 30));
//!
//! let flag = FeatureFlag::boolean("beta-feature", false).with_rule(rule);
//!
//! let veteran = SubjectContext::new("u1")
//!     .with_attribute("role", "client")
//!     .with_attribute("tenure_days", 45);
//! assert_eq!(flag.evaluate(&veteran).reason, EvaluationReason::RuleMatch);
//! ```
//!
//! # Experiments
//!
//! ```
//! use pennant_features::*;
//!
//! let experiment = ExperimentDefinition::ab_test("checkout-copy")
//!     .with_allocation(vec![80.0, 20.0]);
//! assert!(experiment.validate().is_ok());
//!
//! let assignment = experiment.assign(&SubjectContext::new("u1")).unwrap();
//! assert!(["control", "treatment"].contains(&assignment.variant.as_str()));
//!
//! let analysis = ExperimentStatistics::new().analyze(100, 1000, 150, 1000).unwrap();
//! assert!(analysis.is_significant);
//! ```
//!
//! # Engine
//!
//! ```
//! use pennant_features::*;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let definitions = Arc::new(InMemoryDefinitionSource::new());
//! definitions
//!     .upsert_flag(FeatureFlag::boolean("new-ui", false).with_rollout(100))
//!     .unwrap();
//!
//! let engine = FeatureEngine::builder().definitions(definitions).build();
//! assert!(engine.is_enabled("new-ui", "user-123", &Attributes::new()).await);
//! # });
//! ```

pub mod attribute;
pub mod bucket;
pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod flag;
pub mod policy;
pub mod provider;
pub mod stats;
pub mod targeting;
pub mod throttle;

pub use attribute::{AttributeValue, Attributes, SubjectContext};
pub use bucket::BucketAssignor;
pub use cache::{CacheKey, FlagEvaluationCache, cache_key};
pub use config::{EngineConfig, TierThreshold};
pub use context::SubjectContextResolver;
pub use engine::{ArmCounts, EXPOSURE_EVENT, ExperimentReport, FeatureEngine, FeatureEngineBuilder};
pub use error::{FeatureError, FeatureResult};
pub use evaluation::{EvaluationReason, EvaluationResult};
pub use experiment::{ExperimentAssignment, ExperimentDefinition};
pub use flag::{Condition, FeatureFlag, Operator, TargetingRule, Variation};
pub use policy::{Recommendation, decide};
pub use provider::{
    DefinitionSet, DefinitionSource, EventSink, InMemoryDefinitionSource, InMemoryEventSink,
    InteractionEvent, ProfileProvider, StaticProfileProvider,
};
pub use stats::{
    ConfidenceInterval, CriticalValues, ExperimentStatistics, StatisticalAnalysis,
    confidence_interval, required_sample_size,
};
pub use throttle::FailureThrottle;
