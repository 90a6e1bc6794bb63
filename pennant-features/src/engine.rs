//! Evaluation engine
//!
//! [`FeatureEngine`] is the caller-facing entry point. It owns the context
//! resolver and the evaluation cache and talks to its collaborators through
//! the traits in [`crate::provider`]. Construct one per process (or per
//! test) and share it behind an `Arc`.
//!
//! Evaluation never fails: missing flags, slow or broken collaborators all
//! degrade to default values. Analysis (`analyze`, `check_experiment`, ...)
//! returns errors to the caller.

use crate::attribute::Attributes;
use crate::cache::{FlagEvaluationCache, cache_key};
use crate::config::EngineConfig;
use crate::context::SubjectContextResolver;
use crate::error::{FeatureError, FeatureResult};
use crate::evaluation::EvaluationResult;
use crate::experiment::{ExperimentAssignment, ExperimentDefinition};
use crate::flag::{FeatureFlag, Variation};
use crate::policy::{self, Recommendation};
use crate::provider::{
    DefinitionSource, EventSink, InMemoryDefinitionSource, InMemoryEventSink, InteractionEvent,
    ProfileProvider, StaticProfileProvider,
};
use crate::stats::{ConfidenceInterval, ExperimentStatistics, StatisticalAnalysis, confidence_interval};
use crate::throttle::FailureThrottle;
use chrono::Utc;
use pennant_log::{Level, debug, event, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Event recorded when a subject is assigned to an experiment variant
pub const EXPOSURE_EVENT: &str = "$exposure";

/// Conversion counts of one experiment arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmCounts {
    pub conversions: u64,
    pub sample_size: u64,
}

impl ArmCounts {
    pub fn new(conversions: u64, sample_size: u64) -> Self {
        Self {
            conversions,
            sample_size,
        }
    }
}

/// Health check of a running experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment_key: String,
    pub analysis: StatisticalAnalysis,
    pub recommendation: Recommendation,
    /// Smaller of the two arm sizes
    pub current_per_arm: u64,
    /// Planned per-arm size, never below the experiment's minimum
    pub required_per_arm: u64,
    pub control_interval: ConfidenceInterval,
    pub treatment_interval: ConfidenceInterval,
    /// Whether the scheduled duration has elapsed
    pub past_schedule: bool,
}

/// Builder for [`FeatureEngine`].
///
/// Unset collaborators default to the in-memory implementations.
#[derive(Default)]
pub struct FeatureEngineBuilder {
    definitions: Option<Arc<dyn DefinitionSource>>,
    profiles: Option<Arc<dyn ProfileProvider>>,
    events: Option<Arc<dyn EventSink>>,
    config: Option<EngineConfig>,
}

impl FeatureEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn definitions(mut self, source: Arc<dyn DefinitionSource>) -> Self {
        self.definitions = Some(source);
        self
    }

    pub fn profiles(mut self, provider: Arc<dyn ProfileProvider>) -> Self {
        self.profiles = Some(provider);
        self
    }

    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> FeatureEngine {
        let config = self.config.unwrap_or_default();
        let throttle = Arc::new(FailureThrottle::new(config.failure_log_window()));
        let profiles = self
            .profiles
            .unwrap_or_else(|| Arc::new(StaticProfileProvider::new()));

        FeatureEngine {
            definitions: self
                .definitions
                .unwrap_or_else(|| Arc::new(InMemoryDefinitionSource::new())),
            events: self
                .events
                .unwrap_or_else(|| Arc::new(InMemoryEventSink::new())),
            resolver: SubjectContextResolver::from_config(profiles, &config, Arc::clone(&throttle)),
            cache: Arc::new(FlagEvaluationCache::new()),
            statistics: config.statistics(),
            throttle,
            config,
        }
    }
}

/// Feature flag and experiment decision engine.
pub struct FeatureEngine {
    definitions: Arc<dyn DefinitionSource>,
    events: Arc<dyn EventSink>,
    resolver: SubjectContextResolver,
    cache: Arc<FlagEvaluationCache>,
    statistics: ExperimentStatistics,
    throttle: Arc<FailureThrottle>,
    config: EngineConfig,
}

impl FeatureEngine {
    pub fn builder() -> FeatureEngineBuilder {
        FeatureEngineBuilder::new()
    }

    pub fn new(
        definitions: Arc<dyn DefinitionSource>,
        profiles: Arc<dyn ProfileProvider>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self::builder()
            .definitions(definitions)
            .profiles(profiles)
            .events(events)
            .build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<FlagEvaluationCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &SubjectContextResolver {
        &self.resolver
    }

    /// Start the background cache reaper when `reaper_interval_secs` is set.
    pub fn spawn_reaper(&self) -> Option<JoinHandle<()>> {
        let interval = self.config.reaper_interval()?;
        debug!(target: "pennant::engine", "Starting cache reaper every {:?}", interval);
        Some(self.cache.spawn_reaper(interval))
    }

    // ========== Evaluation ==========

    /// Evaluate a flag for a subject.
    ///
    /// `default` is served when the flag is unknown or its definition
    /// cannot be read within the definition timeout. Results are cached
    /// per flag version and subject unless `overrides` is non-empty.
    pub async fn evaluate(
        &self,
        flag_key: &str,
        subject_id: &str,
        overrides: &Attributes,
        default: Variation,
    ) -> EvaluationResult {
        let started = Instant::now();

        let flag = match self.load_flag(flag_key).await {
            Some(flag) => flag,
            None => return self.finish(EvaluationResult::fallback(flag_key, default), started),
        };

        let cacheable = overrides.is_empty() && !self.config.evaluation_ttl().is_zero();
        let key = cache_key(&flag.key, flag.version, subject_id);
        if cacheable && let Some(hit) = self.cache.get(&key) {
            return self.finish(hit, started);
        }

        let context = self.resolver.resolve(subject_id, overrides).await;
        let result = flag.evaluate(&context);

        if cacheable {
            self.cache
                .put(key, result.clone(), self.config.evaluation_ttl());
        }

        self.finish(result, started)
    }

    /// Whether a boolean flag is on for the subject; `false` when unknown.
    pub async fn is_enabled(&self, flag_key: &str, subject_id: &str, overrides: &Attributes) -> bool {
        self.evaluate(flag_key, subject_id, overrides, Variation::boolean(false))
            .await
            .value
            .as_bool()
            .unwrap_or(false)
    }

    /// Value of a flag for the subject, or `default` when unknown.
    pub async fn get_variation(&self, flag_key: &str, subject_id: &str, default: Variation) -> Variation {
        self.evaluate(flag_key, subject_id, &Attributes::new(), default)
            .await
            .value
    }

    /// The subject's experiment variant, or `None` when the experiment is
    /// unknown, disabled or the subject is not eligible.
    pub async fn get_experiment_variant(
        &self,
        experiment_key: &str,
        subject_id: &str,
    ) -> Option<ExperimentAssignment> {
        self.get_experiment_variant_with(experiment_key, subject_id, &Attributes::new())
            .await
    }

    /// Like [`get_experiment_variant`](Self::get_experiment_variant) with
    /// caller-supplied attributes.
    pub async fn get_experiment_variant_with(
        &self,
        experiment_key: &str,
        subject_id: &str,
        overrides: &Attributes,
    ) -> Option<ExperimentAssignment> {
        let started = Instant::now();
        let experiment = self.load_experiment(experiment_key).await?;
        let context = self.resolver.resolve(subject_id, overrides).await;

        let assignment = experiment.assign(&context)?;
        event!(
            Level::Debug,
            target: "pennant::engine",
            "Experiment assigned";
            experiment = experiment_key,
            subject = subject_id,
            variant = assignment.variant
        );

        if self.config.track_exposures {
            self.record(
                InteractionEvent::new(EXPOSURE_EVENT, subject_id, experiment_key)
                    .with_metadata("variant", assignment.variant.clone()),
            );
        }
        self.check_budget(experiment_key, started.elapsed());

        Some(assignment)
    }

    /// Forward an interaction to the event sink without waiting for it.
    ///
    /// Failures are logged and dropped.
    pub fn record_interaction(&self, key: &str, subject_id: &str, event_name: &str) {
        self.record(InteractionEvent::new(event_name, subject_id, key));
    }

    /// Forward a fully built event to the event sink without waiting for it.
    pub fn record(&self, event: InteractionEvent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                target: "pennant::engine",
                "No runtime available, dropping {} event for {}",
                event.event_name,
                event.key
            );
            return;
        };

        let sink = Arc::clone(&self.events);
        let throttle = Arc::clone(&self.throttle);
        runtime.spawn(async move {
            let name = event.event_name.clone();
            if let Err(err) = sink.record(event).await
                && throttle.should_log(&format!("sink:{}", name))
            {
                warn!(target: "pennant::engine", "Failed to record {} event: {}", name, err);
            }
        });
    }

    // ========== Analysis ==========

    /// Two-proportion z-test with the configured planning parameters.
    pub fn analyze(
        &self,
        control_conversions: u64,
        control_n: u64,
        treatment_conversions: u64,
        treatment_n: u64,
    ) -> FeatureResult<StatisticalAnalysis> {
        self.statistics
            .analyze(control_conversions, control_n, treatment_conversions, treatment_n)
    }

    /// Policy verdict at the configured significance level.
    pub fn decide(
        &self,
        current_sample_size: u64,
        required_sample_size: u64,
        p_value: f64,
        treatment_winning: bool,
    ) -> Recommendation {
        policy::decide_at(
            current_sample_size,
            required_sample_size,
            p_value,
            treatment_winning,
            self.config.significance_level,
        )
    }

    /// Per-arm sample size using the configured critical value mode.
    pub fn required_sample_size(
        &self,
        baseline_rate: f64,
        minimum_detectable_effect: f64,
        alpha: f64,
        power: f64,
    ) -> FeatureResult<u64> {
        self.statistics
            .required_sample_size(baseline_rate, minimum_detectable_effect, alpha, power)
    }

    /// Wald interval at the configured confidence level.
    pub fn confidence_interval(&self, conversions: u64, n: u64) -> FeatureResult<ConfidenceInterval> {
        confidence_interval(conversions, n, self.config.confidence_level)
    }

    /// Analyze an experiment and recommend what to do with it.
    ///
    /// Fails when the experiment is unknown or its definition cannot be
    /// read.
    pub async fn check_experiment(
        &self,
        experiment_key: &str,
        control: ArmCounts,
        treatment: ArmCounts,
    ) -> FeatureResult<ExperimentReport> {
        let experiment = self
            .with_timeout(
                self.definitions.get_experiment(experiment_key),
                "experiment lookup",
            )
            .await?
            .ok_or_else(|| {
                FeatureError::configuration(format!("experiment '{}' not found", experiment_key))
            })?;

        let analysis = self.analyze(
            control.conversions,
            control.sample_size,
            treatment.conversions,
            treatment.sample_size,
        )?;

        let current_per_arm = control.sample_size.min(treatment.sample_size);
        let required_per_arm = analysis
            .required_sample_size
            .max(experiment.minimum_sample_size);
        let recommendation = self.decide(
            current_per_arm,
            required_per_arm,
            analysis.p_value,
            analysis.treatment_winning(),
        );

        event!(
            Level::Info,
            target: "pennant::stats",
            "Experiment checked";
            experiment = experiment_key,
            p_value = analysis.p_value,
            effect = analysis.effect_size,
            recommendation = recommendation
        );

        Ok(ExperimentReport {
            experiment_key: experiment.key.clone(),
            control_interval: self.confidence_interval(control.conversions, control.sample_size)?,
            treatment_interval: self
                .confidence_interval(treatment.conversions, treatment.sample_size)?,
            past_schedule: experiment.is_past_schedule(Utc::now()),
            analysis,
            recommendation,
            current_per_arm,
            required_per_arm,
        })
    }

    // ========== Invalidation ==========

    /// Drop cached evaluations of a flag (all versions).
    pub fn invalidate_flag(&self, flag_key: &str) -> usize {
        self.cache.invalidate_flag(flag_key)
    }

    /// Drop the cached profile and evaluations of a subject.
    pub fn invalidate_subject(&self, subject_id: &str) -> usize {
        self.resolver.invalidate(subject_id);
        self.cache.invalidate_subject(subject_id)
    }

    // ========== Internals ==========

    async fn with_timeout<T, F>(&self, future: F, what: &str) -> FeatureResult<T>
    where
        F: Future<Output = FeatureResult<T>>,
    {
        let budget = self.config.definition_timeout();
        match tokio::time::timeout(budget, future).await {
            Ok(result) => result,
            Err(_) => Err(FeatureError::Timeout(format!("{} exceeded {:?}", what, budget))),
        }
    }

    async fn load_flag(&self, key: &str) -> Option<Arc<FeatureFlag>> {
        let result = self
            .with_timeout(self.definitions.get_flag(key), "flag lookup")
            .await;
        self.unwrap_definition(key, result)
    }

    async fn load_experiment(&self, key: &str) -> Option<Arc<ExperimentDefinition>> {
        let result = self
            .with_timeout(self.definitions.get_experiment(key), "experiment lookup")
            .await;
        self.unwrap_definition(key, result)
    }

    fn unwrap_definition<T>(&self, key: &str, result: FeatureResult<Option<T>>) -> Option<T> {
        match result {
            Ok(Some(definition)) => Some(definition),
            Ok(None) => {
                debug!(target: "pennant::engine", "No definition for {}, serving default", key);
                None
            }
            Err(err) => {
                let window_key = match err {
                    FeatureError::Timeout(_) => "definition:timeout",
                    _ => "definition:unavailable",
                };
                if self.throttle.should_log(window_key) {
                    warn!(
                        target: "pennant::engine",
                        "Definition source failed for {}, serving default: {}",
                        key,
                        err
                    );
                }
                None
            }
        }
    }

    fn finish(&self, result: EvaluationResult, started: Instant) -> EvaluationResult {
        let elapsed = started.elapsed();
        self.check_budget(&result.flag_key, elapsed);

        let result = result.with_elapsed(elapsed);
        event!(
            Level::Trace,
            target: "pennant::engine",
            "Flag evaluated";
            flag = result.flag_key,
            reason = result.reason,
            elapsed_ms = format!("{:.3}", result.evaluation_time_ms)
        );
        result
    }

    fn check_budget(&self, key: &str, elapsed: Duration) {
        let budget = self.config.latency_budget();
        if elapsed > budget && self.throttle.should_log(&format!("latency:{}", key)) {
            warn!(
                target: "pennant::engine",
                "Evaluation of {} took {:?}, over the {:?} budget",
                key,
                elapsed,
                budget
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeValue;
    use crate::evaluation::EvaluationReason;
    use crate::flag::{Condition, Operator, TargetingRule};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: InMemoryDefinitionSource,
        flag_reads: AtomicUsize,
    }

    #[async_trait]
    impl DefinitionSource for CountingSource {
        async fn get_flag(&self, key: &str) -> FeatureResult<Option<Arc<FeatureFlag>>> {
            self.flag_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_flag(key).await
        }

        async fn get_experiment(&self, key: &str) -> FeatureResult<Option<Arc<ExperimentDefinition>>> {
            self.inner.get_experiment(key).await
        }
    }

    struct SlowSource;

    #[async_trait]
    impl DefinitionSource for SlowSource {
        async fn get_flag(&self, _key: &str) -> FeatureResult<Option<Arc<FeatureFlag>>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(Some(Arc::new(FeatureFlag::boolean("slow", true))))
        }

        async fn get_experiment(&self, _key: &str) -> FeatureResult<Option<Arc<ExperimentDefinition>>> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(None)
        }
    }

    struct DelayedSource;

    #[async_trait]
    impl DefinitionSource for DelayedSource {
        async fn get_flag(&self, _key: &str) -> FeatureResult<Option<Arc<FeatureFlag>>> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(None)
        }

        async fn get_experiment(&self, _key: &str) -> FeatureResult<Option<Arc<ExperimentDefinition>>> {
            Ok(None)
        }
    }

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn record(&self, _event: InteractionEvent) -> FeatureResult<()> {
            Err(FeatureError::Sink("warehouse offline".to_string()))
        }
    }

    fn engine_with(source: InMemoryDefinitionSource) -> (FeatureEngine, Arc<InMemoryEventSink>) {
        let sink = Arc::new(InMemoryEventSink::new());
        let engine = FeatureEngine::builder()
            .definitions(Arc::new(source))
            .events(sink.clone())
            .build();
        (engine, sink)
    }

    fn client() -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("role".to_string(), AttributeValue::from("client"));
        attrs
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_unknown_flag_serves_caller_default() {
        let (engine, _) = engine_with(InMemoryDefinitionSource::new());

        let result = engine
            .evaluate("missing", "u1", &Attributes::new(), Variation::string("fallback"))
            .await;
        assert_eq!(result.reason, EvaluationReason::Default);
        assert_eq!(result.value, Variation::string("fallback"));
        assert!(!engine.is_enabled("missing", "u1", &Attributes::new()).await);
    }

    #[tokio::test]
    async fn test_rule_match_and_fallthrough() {
        let source = InMemoryDefinitionSource::new();
        source
            .upsert_flag(
                FeatureFlag::boolean("beta", false).with_rule(
                    TargetingRule::new(1)
                        .with_condition(Condition::single("role", Operator::Equals, "client")),
                ),
            )
            .unwrap();
        let (engine, _) = engine_with(source);

        let matched = engine
            .evaluate("beta", "u1", &client(), Variation::boolean(false))
            .await;
        assert_eq!(matched.reason, EvaluationReason::RuleMatch);
        assert_eq!(matched.value, Variation::boolean(true));

        let other = engine
            .evaluate("beta", "u2", &Attributes::new(), Variation::boolean(true))
            .await;
        assert_eq!(other.reason, EvaluationReason::Fallthrough);
        assert_eq!(other.value, Variation::boolean(false));
    }

    #[tokio::test]
    async fn test_results_cached_without_overrides() {
        let inner = InMemoryDefinitionSource::new();
        inner
            .upsert_flag(FeatureFlag::boolean("cached", false).with_rollout(100))
            .unwrap();
        let source = Arc::new(CountingSource {
            inner,
            flag_reads: AtomicUsize::new(0),
        });
        let engine = FeatureEngine::builder().definitions(source.clone()).build();

        assert!(engine.is_enabled("cached", "u1", &Attributes::new()).await);
        assert!(engine.is_enabled("cached", "u1", &Attributes::new()).await);
        assert_eq!(engine.cache().len(), 1);

        // overrides bypass the cache
        engine.is_enabled("cached", "u1", &client()).await;
        assert_eq!(engine.cache().len(), 1);

        assert_eq!(engine.invalidate_flag("cached"), 1);
        assert!(engine.cache().is_empty());
        assert_eq!(source.flag_reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_new_version_is_not_served_stale() {
        let source = Arc::new(InMemoryDefinitionSource::new());
        source.upsert_flag(FeatureFlag::boolean("f", false)).unwrap();
        let engine = FeatureEngine::builder().definitions(source.clone()).build();

        assert!(!engine.is_enabled("f", "u1", &Attributes::new()).await);

        source
            .upsert_flag(FeatureFlag::boolean("f", false).with_rollout(100).with_version(2))
            .unwrap();
        assert!(engine.is_enabled("f", "u1", &Attributes::new()).await);
    }

    #[tokio::test]
    async fn test_replaced_definition_is_not_served_stale() {
        let source = Arc::new(InMemoryDefinitionSource::new());
        source
            .upsert_flag(FeatureFlag::boolean("f", false).with_rollout(100))
            .unwrap();
        let engine = FeatureEngine::builder().definitions(source.clone()).build();

        assert!(engine.is_enabled("f", "u1", &Attributes::new()).await);

        // same caller-set version; the kill switch must win immediately
        source
            .upsert_flag(FeatureFlag::boolean("f", false).with_rollout(100).disabled())
            .unwrap();
        let result = engine
            .evaluate("f", "u1", &Attributes::new(), Variation::boolean(true))
            .await;
        assert_eq!(result.reason, EvaluationReason::Default);
        assert_eq!(result.value, Variation::boolean(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_definition_source_degrades() {
        let engine = FeatureEngine::builder()
            .definitions(Arc::new(SlowSource))
            .build();

        let result = engine
            .evaluate("slow", "u1", &Attributes::new(), Variation::boolean(false))
            .await;
        assert_eq!(result.reason, EvaluationReason::Default);
        assert_eq!(result.value, Variation::boolean(false));

        assert!(engine.get_experiment_variant("exp", "u1").await.is_none());
        assert!(matches!(
            engine
                .check_experiment("exp", ArmCounts::new(1, 10), ArmCounts::new(1, 10))
                .await,
            Err(FeatureError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_experiment_variant_records_exposure() {
        let source = InMemoryDefinitionSource::new();
        source
            .upsert_experiment(
                ExperimentDefinition::ab_test("onboarding")
                    .with_condition(Condition::single("role", Operator::Equals, "client")),
            )
            .unwrap();
        let (engine, sink) = engine_with(source);

        let assignment = engine
            .get_experiment_variant_with("onboarding", "u1", &client())
            .await
            .unwrap();
        settle().await;

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, EXPOSURE_EVENT);
        assert_eq!(
            events[0].metadata.get("variant"),
            Some(&serde_json::Value::from(assignment.variant.clone()))
        );

        assert!(engine.get_experiment_variant("onboarding", "u2").await.is_none());
        assert!(engine.get_experiment_variant("unknown", "u1").await.is_none());
    }

    #[tokio::test]
    async fn test_record_interaction_swallows_sink_errors() {
        let engine = FeatureEngine::builder().events(Arc::new(FailingSink)).build();
        engine.record_interaction("onboarding", "u1", "conversion");
        settle().await;

        // the failure was logged, so the window for this event is now closed
        assert_eq!(engine.throttle.tracked(), 1);
        assert!(!engine.throttle.should_log("sink:conversion"));
    }

    #[tokio::test]
    async fn test_latency_budget_overrun_is_flagged() {
        let engine = FeatureEngine::builder()
            .definitions(Arc::new(DelayedSource))
            .config(EngineConfig::default().with_latency_budget(Duration::from_millis(1)))
            .build();

        let result = engine
            .evaluate("sluggish", "u1", &Attributes::new(), Variation::boolean(true))
            .await;
        assert_eq!(result.value, Variation::boolean(true));
        assert!(result.evaluation_time_ms >= 5.0);
        assert!(!engine.throttle.should_log("latency:sluggish"));

        let (fast, _) = engine_with(InMemoryDefinitionSource::new());
        fast.evaluate("quick", "u1", &Attributes::new(), Variation::boolean(true))
            .await;
        assert!(fast.throttle.should_log("latency:quick"));
    }

    #[test]
    fn test_record_without_runtime_is_dropped() {
        let (engine, sink) = engine_with(InMemoryDefinitionSource::new());
        engine.record_interaction("onboarding", "u1", "view");
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_check_experiment() {
        let source = InMemoryDefinitionSource::new();
        source
            .upsert_experiment(ExperimentDefinition::ab_test("pricing").with_minimum_sample_size(5000))
            .unwrap();
        let (engine, _) = engine_with(source);

        let report = engine
            .check_experiment("pricing", ArmCounts::new(100, 1000), ArmCounts::new(150, 1000))
            .await
            .unwrap();
        assert!(report.analysis.is_significant);
        assert_eq!(report.current_per_arm, 1000);
        assert_eq!(report.required_per_arm, 5000);
        // significant, but below half of the required size
        assert_eq!(report.recommendation, Recommendation::Continue);
        assert!(!report.past_schedule);

        let report = engine
            .check_experiment("pricing", ArmCounts::new(500, 5000), ArmCounts::new(750, 5000))
            .await
            .unwrap();
        assert_eq!(report.recommendation, Recommendation::Rollout);

        assert!(matches!(
            engine
                .check_experiment("missing", ArmCounts::new(1, 10), ArmCounts::new(1, 10))
                .await,
            Err(FeatureError::Configuration(_))
        ));
        assert!(matches!(
            engine
                .check_experiment("pricing", ArmCounts::new(0, 0), ArmCounts::new(1, 10))
                .await,
            Err(FeatureError::InvalidSample(_))
        ));
    }

    #[tokio::test]
    async fn test_invalidate_subject() {
        let source = InMemoryDefinitionSource::new();
        source.upsert_flag(FeatureFlag::boolean("a", true)).unwrap();
        source.upsert_flag(FeatureFlag::boolean("b", true)).unwrap();
        let (engine, _) = engine_with(source);

        for flag in ["a", "b"] {
            engine.is_enabled(flag, "u1", &Attributes::new()).await;
            engine.is_enabled(flag, "u2", &Attributes::new()).await;
        }
        engine.is_enabled("a", "org:u1", &Attributes::new()).await;

        assert_eq!(engine.invalidate_subject("u1"), 2);
        assert_eq!(engine.cache().len(), 3);
    }

    #[test]
    fn test_analysis_delegates_to_configuration() {
        let engine = FeatureEngine::builder().build();
        let analysis = engine.analyze(0, 100, 0, 100).unwrap();
        assert_eq!(analysis.p_value, 1.0);
        assert_eq!(engine.decide(0, 1000, 0.001, true), Recommendation::Continue);
        assert!(engine.confidence_interval(5, 0).is_err());
        assert!(engine.required_sample_size(0.1, 0.02, 0.05, 0.8).unwrap() > 0);
    }
}
