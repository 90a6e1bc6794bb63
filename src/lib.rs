// Pennant - feature flag and experimentation decision engine
//
// This library decides whether a feature is on for a subject, which
// experiment variant the subject sees, and what to do with a running
// experiment given its conversion numbers.

// Re-export the engine
pub use pennant_features::*;

// Re-export member crates
pub use pennant_config;
pub use pennant_features;
pub use pennant_log;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ArmCounts,
        AttributeValue,
        Attributes,
        Condition,
        DefinitionSet,
        DefinitionSource,
        EngineConfig,
        EvaluationReason,
        EvaluationResult,
        EventSink,
        ExperimentAssignment,
        ExperimentDefinition,
        ExperimentReport,
        FeatureEngine,
        FeatureError,
        FeatureFlag,
        FeatureResult,
        InMemoryDefinitionSource,
        InMemoryEventSink,
        InteractionEvent,
        Operator,
        ProfileProvider,
        Recommendation,
        StaticProfileProvider,
        StatisticalAnalysis,
        SubjectContext,
        TargetingRule,
        Variation,
    };

    pub use pennant_config::{ConfigManager, Validate};
    pub use pennant_log::{debug, error, info, trace, warn};

    pub use async_trait::async_trait;
}
