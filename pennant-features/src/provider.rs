//! Collaborator interfaces
//!
//! The engine reads definitions, fetches subject profiles and records
//! interactions through these traits. In-memory implementations are
//! provided for tests, demos and single-process deployments.

use crate::attribute::Attributes;
use crate::error::{FeatureError, FeatureResult};
use crate::experiment::ExperimentDefinition;
use crate::flag::FeatureFlag;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use pennant_config::{ConfigLoader, FileFormat};
use pennant_log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// Read-only source of flag and experiment definitions.
///
/// A missing definition is `Ok(None)`, not an error. Evaluations are cached
/// per flag version, so a source must hand out a higher `version` whenever
/// the content of a flag changes.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn get_flag(&self, key: &str) -> FeatureResult<Option<Arc<FeatureFlag>>>;

    async fn get_experiment(&self, key: &str) -> FeatureResult<Option<Arc<ExperimentDefinition>>>;
}

/// Identity collaborator supplying stored subject attributes.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn get_profile(&self, subject_id: &str) -> FeatureResult<Attributes>;
}

/// Destination for views, conversions, dismissals and exposures.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: InteractionEvent) -> FeatureResult<()>;
}

/// An interaction recorded against a flag or experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub event_name: String,
    pub subject_id: String,
    /// Flag or experiment key
    pub key: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn new(
        event_name: impl Into<String>,
        subject_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            subject_id: subject_id.into(),
            key: key.into(),
            metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(name.into(), value.into());
        self
    }
}

// ========== Definitions ==========

/// A document holding flag and experiment definitions.
///
/// ```toml
/// [[flags]]
/// key = "new-checkout"
/// default_value = false
/// variations = [false, true]
/// rollout_percentage = 25
/// rollout_variation = 1
///
/// [[experiments]]
/// key = "onboarding-copy"
/// variations = ["control", "treatment"]
/// traffic_allocation = [50.0, 50.0]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefinitionSet {
    #[serde(default)]
    pub flags: Vec<FeatureFlag>,
    #[serde(default)]
    pub experiments: Vec<ExperimentDefinition>,
}

impl DefinitionSet {
    /// Parse a document in the given format and validate it.
    pub fn parse(content: &str, format: FileFormat) -> FeatureResult<Self> {
        let value = ConfigLoader::new(format).parse(content)?;
        let set: DefinitionSet = serde_json::from_value(value)?;
        set.validate()?;
        Ok(set)
    }

    /// Load a JSON or TOML document and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> FeatureResult<Self> {
        let path = path.as_ref();
        let set: DefinitionSet = ConfigLoader::auto(path)?.load_typed(path)?;
        set.validate()?;
        Ok(set)
    }

    /// Validate every definition and reject duplicate keys.
    pub fn validate(&self) -> FeatureResult<()> {
        let mut flag_keys = HashSet::new();
        for flag in &self.flags {
            flag.validate()?;
            if !flag_keys.insert(flag.key.as_str()) {
                return Err(FeatureError::configuration(format!(
                    "flag '{}' defined more than once",
                    flag.key
                )));
            }
        }

        let mut experiment_keys = HashSet::new();
        for experiment in &self.experiments {
            experiment.validate()?;
            if !experiment_keys.insert(experiment.key.as_str()) {
                return Err(FeatureError::configuration(format!(
                    "experiment '{}' defined more than once",
                    experiment.key
                )));
            }
        }

        Ok(())
    }
}

/// Concurrent in-memory definition store.
///
/// Republishing a flag key always yields a higher version than any snapshot
/// previously published under that key, even across removals.
#[derive(Default)]
pub struct InMemoryDefinitionSource {
    flags: DashMap<String, Arc<FeatureFlag>>,
    flag_versions: DashMap<String, u64>,
    experiments: DashMap<String, Arc<ExperimentDefinition>>,
}

impl InMemoryDefinitionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from a validated document.
    pub fn from_set(set: DefinitionSet) -> FeatureResult<Self> {
        let source = Self::new();
        source.load(set)?;
        Ok(source)
    }

    pub fn from_file(path: impl AsRef<Path>) -> FeatureResult<Self> {
        Self::from_set(DefinitionSet::from_file(path)?)
    }

    /// Validate a whole document, then publish its definitions.
    ///
    /// Nothing is published when any definition is invalid.
    pub fn load(&self, set: DefinitionSet) -> FeatureResult<()> {
        set.validate()?;
        let (flags, experiments) = (set.flags.len(), set.experiments.len());

        for flag in set.flags {
            self.publish_flag(flag);
        }
        for experiment in set.experiments {
            self.experiments
                .insert(experiment.key.clone(), Arc::new(experiment));
        }

        info!(
            target: "pennant::provider",
            "Loaded {} flags and {} experiments",
            flags,
            experiments
        );
        Ok(())
    }

    pub fn upsert_flag(&self, flag: FeatureFlag) -> FeatureResult<()> {
        flag.validate()?;
        let version = self.publish_flag(flag.clone());
        debug!(target: "pennant::provider", "Published flag {} v{}", flag.key, version);
        Ok(())
    }

    pub fn upsert_experiment(&self, experiment: ExperimentDefinition) -> FeatureResult<()> {
        experiment.validate()?;
        debug!(target: "pennant::provider", "Publishing experiment {}", experiment.key);
        self.experiments
            .insert(experiment.key.clone(), Arc::new(experiment));
        Ok(())
    }

    pub fn remove_flag(&self, key: &str) -> bool {
        self.flags.remove(key).is_some()
    }

    pub fn remove_experiment(&self, key: &str) -> bool {
        self.experiments.remove(key).is_some()
    }

    /// Current snapshot version of a published flag.
    pub fn flag_version(&self, key: &str) -> Option<u64> {
        self.flags.get(key).map(|entry| entry.version)
    }

    pub fn flag_keys(&self) -> Vec<String> {
        self.flags.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn experiment_keys(&self) -> Vec<String> {
        self.experiments
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl InMemoryDefinitionSource {
    fn publish_flag(&self, mut flag: FeatureFlag) -> u64 {
        // the version slot stays locked until the snapshot is in place so
        // concurrent writers of one key publish in version order
        match self.flag_versions.entry(flag.key.clone()) {
            Entry::Vacant(slot) => {
                let version = flag.version;
                let _latest = slot.insert(version);
                self.flags.insert(flag.key.clone(), Arc::new(flag));
                version
            }
            Entry::Occupied(mut slot) => {
                if flag.version <= *slot.get() {
                    flag.version = *slot.get() + 1;
                }
                let version = flag.version;
                slot.insert(version);
                self.flags.insert(flag.key.clone(), Arc::new(flag));
                version
            }
        }
    }
}

#[async_trait]
impl DefinitionSource for InMemoryDefinitionSource {
    async fn get_flag(&self, key: &str) -> FeatureResult<Option<Arc<FeatureFlag>>> {
        Ok(self.flags.get(key).map(|entry| Arc::clone(entry.value())))
    }

    async fn get_experiment(&self, key: &str) -> FeatureResult<Option<Arc<ExperimentDefinition>>> {
        Ok(self
            .experiments
            .get(key)
            .map(|entry| Arc::clone(entry.value())))
    }
}

// ========== Profiles ==========

/// Profiles held in memory; unknown subjects have no stored attributes.
#[derive(Default)]
pub struct StaticProfileProvider {
    profiles: DashMap<String, Attributes>,
}

impl StaticProfileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, subject_id: impl Into<String>, attributes: Attributes) -> Self {
        self.profiles.insert(subject_id.into(), attributes);
        self
    }

    pub fn set_profile(&self, subject_id: impl Into<String>, attributes: Attributes) {
        self.profiles.insert(subject_id.into(), attributes);
    }

    pub fn remove_profile(&self, subject_id: &str) {
        self.profiles.remove(subject_id);
    }
}

#[async_trait]
impl ProfileProvider for StaticProfileProvider {
    async fn get_profile(&self, subject_id: &str) -> FeatureResult<Attributes> {
        Ok(self
            .profiles
            .get(subject_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

// ========== Events ==========

/// Keeps the most recent events in memory.
pub struct InMemoryEventSink {
    events: RwLock<VecDeque<InteractionEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Keep at most `max_events`, dropping the oldest first.
    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    pub fn events(&self) -> Vec<InteractionEvent> {
        self.events.read().iter().cloned().collect()
    }

    /// Number of recorded events named `event_name` for `key`.
    pub fn count(&self, key: &str, event_name: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|event| event.key == key && event.event_name == event_name)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl Default for InMemoryEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn record(&self, event: InteractionEvent) -> FeatureResult<()> {
        let mut events = self.events.write();
        if self.max_events == 0 {
            return Ok(());
        }
        while events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeValue;
    use crate::flag::Variation;

    const DOCUMENT: &str = r#"{
        "flags": [
            {
                "key": "new-checkout",
                "default_value": false,
                "variations": [false, true],
                "rollout_percentage": 25,
                "rollout_variation": 1
            }
        ],
        "experiments": [
            {
                "key": "onboarding-copy",
                "variations": ["control", "treatment"],
                "traffic_allocation": [50.0, 50.0],
                "targeting": [
                    { "attribute": "role", "operator": "equals", "values": ["client"] }
                ],
                "success_metrics": ["signup"],
                "duration_days": 14,
                "minimum_sample_size": 1000
            }
        ]
    }"#;

    #[tokio::test]
    async fn test_load_json_document() {
        let set = DefinitionSet::parse(DOCUMENT, FileFormat::Json).unwrap();
        let source = InMemoryDefinitionSource::from_set(set).unwrap();

        let flag = source.get_flag("new-checkout").await.unwrap().unwrap();
        assert_eq!(flag.rollout_percentage, 25);
        assert_eq!(flag.variations, vec![Variation::boolean(false), Variation::boolean(true)]);
        assert!(flag.enabled);

        let experiment = source.get_experiment("onboarding-copy").await.unwrap().unwrap();
        assert_eq!(experiment.minimum_sample_size, 1000);
        assert_eq!(experiment.targeting[0].values, vec![AttributeValue::from("client")]);

        assert!(source.get_flag("missing").await.unwrap().is_none());
    }

    #[test]
    fn test_load_toml_document() {
        let toml = r#"
            [[flags]]
            key = "dark-mode"
            default_value = "off"
            variations = ["off", "on"]

            [[flags.targeting]]
            variation = 1
            conditions = [{ attribute = "account_tier", operator = "in", values = ["power", "established"] }]
        "#;

        let set = DefinitionSet::parse(toml, FileFormat::Toml).unwrap();
        assert_eq!(set.flags.len(), 1);
        assert_eq!(set.flags[0].targeting[0].variation, Some(1));
        assert!(set.experiments.is_empty());
    }

    #[test]
    fn test_invalid_document_rejected() {
        let bad = r#"{
            "experiments": [
                { "key": "e", "variations": ["a", "b"], "traffic_allocation": [70.0, 20.0] }
            ]
        }"#;
        assert!(matches!(
            DefinitionSet::parse(bad, FileFormat::Json),
            Err(FeatureError::Configuration(_))
        ));

        let dangling = r#"{
            "flags": [
                { "key": "f", "default_value": false, "variations": [false, true], "fallthrough_variation": 5 }
            ]
        }"#;
        assert!(DefinitionSet::parse(dangling, FileFormat::Json).is_err());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let set = DefinitionSet {
            flags: vec![FeatureFlag::boolean("f", false), FeatureFlag::boolean("f", true)],
            experiments: vec![],
        };
        assert!(set.validate().is_err());

        let source = InMemoryDefinitionSource::new();
        assert!(source.load(set).is_err());
        assert!(source.flag_keys().is_empty());
    }

    #[test]
    fn test_republished_flag_gets_newer_version() {
        let source = InMemoryDefinitionSource::new();
        source.upsert_flag(FeatureFlag::boolean("f", false)).unwrap();
        assert_eq!(source.flag_version("f"), Some(0));

        source.upsert_flag(FeatureFlag::boolean("f", false).disabled()).unwrap();
        assert_eq!(source.flag_version("f"), Some(1));

        source
            .upsert_flag(FeatureFlag::boolean("f", false).with_version(7))
            .unwrap();
        assert_eq!(source.flag_version("f"), Some(7));

        // removal does not reset the version history
        assert!(source.remove_flag("f"));
        source
            .load(DefinitionSet {
                flags: vec![FeatureFlag::boolean("f", true).with_version(3)],
                experiments: vec![],
            })
            .unwrap();
        assert_eq!(source.flag_version("f"), Some(8));
    }

    #[tokio::test]
    async fn test_upsert_and_remove() {
        let source = InMemoryDefinitionSource::new();
        source.upsert_flag(FeatureFlag::boolean("f", false)).unwrap();
        source
            .upsert_flag(FeatureFlag::boolean("f", true).with_version(2))
            .unwrap();

        let flag = source.get_flag("f").await.unwrap().unwrap();
        assert_eq!(flag.version, 2);

        assert!(source.remove_flag("f"));
        assert!(!source.remove_flag("f"));

        let invalid = ExperimentDefinition::ab_test("e").with_allocation(vec![10.0, 10.0]);
        assert!(source.upsert_experiment(invalid).is_err());
        assert!(source.experiment_keys().is_empty());
    }

    #[tokio::test]
    async fn test_static_profiles() {
        let mut profile = Attributes::new();
        profile.insert("role".to_string(), "client".into());
        let provider = StaticProfileProvider::new().with_profile("u1", profile);

        let attrs = provider.get_profile("u1").await.unwrap();
        assert_eq!(attrs.get("role"), Some(&AttributeValue::from("client")));
        assert!(provider.get_profile("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_event_sink_is_bounded() {
        let sink = InMemoryEventSink::with_capacity(2);
        for name in ["view", "conversion", "dismissal"] {
            sink.record(InteractionEvent::new(name, "u1", "exp"))
                .await
                .unwrap();
        }

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.count("exp", "view"), 0);
        assert_eq!(sink.count("exp", "dismissal"), 1);

        sink.clear();
        assert!(sink.is_empty());
    }
}
