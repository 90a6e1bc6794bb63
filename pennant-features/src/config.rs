//! Engine configuration
//!
//! Loaded through `pennant-config`: a JSON/TOML file, then `PENNANT_*`
//! environment variables on top (`PENNANT_CONTEXT_TTL_SECS=120`,
//! `PENNANT_CRITICAL_VALUES=fixed`, ...).

use crate::stats::{CriticalValues, ExperimentStatistics};
use pennant_config::{ConfigError, ConfigManager, ConfigValidator, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "PENNANT";

/// Usage-based account tier: subjects with at least `min_usage` get `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierThreshold {
    pub min_usage: f64,
    #[serde(deserialize_with = "pennant_config::scalar_string")]
    pub name: String,
}

impl TierThreshold {
    pub fn new(min_usage: f64, name: impl Into<String>) -> Self {
        Self {
            min_usage,
            name: name.into(),
        }
    }
}

/// Settings for [`FeatureEngine`](crate::FeatureEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a resolved subject context is reused
    pub context_ttl_secs: u64,
    /// How long an evaluation result is reused; 0 disables the cache
    pub evaluation_ttl_secs: u64,
    pub resolution_timeout_ms: u64,
    pub definition_timeout_ms: u64,
    /// Evaluations slower than this are logged
    pub latency_budget_ms: u64,
    pub failure_log_window_secs: u64,
    /// Interval of the background cache reaper; 0 keeps expiry lazy
    pub reaper_interval_secs: u64,
    pub significance_level: f64,
    pub power: f64,
    pub minimum_detectable_effect: f64,
    pub confidence_level: f64,
    pub critical_values: CriticalValues,
    /// Record an `$exposure` event for every experiment assignment
    pub track_exposures: bool,
    /// Numeric attribute the account tier is derived from
    #[serde(deserialize_with = "pennant_config::scalar_string")]
    pub tier_source_attribute: String,
    /// Attribute the derived tier is stored under
    #[serde(deserialize_with = "pennant_config::scalar_string")]
    pub tier_attribute: String,
    pub tiers: Vec<TierThreshold>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_ttl_secs: 300,
            evaluation_ttl_secs: 30,
            resolution_timeout_ms: 250,
            definition_timeout_ms: 250,
            latency_budget_ms: 10,
            failure_log_window_secs: 60,
            reaper_interval_secs: 0,
            significance_level: 0.05,
            power: 0.8,
            minimum_detectable_effect: 0.02,
            confidence_level: 0.95,
            critical_values: CriticalValues::Derived,
            track_exposures: true,
            tier_source_attribute: "usage_count".to_string(),
            tier_attribute: "account_tier".to_string(),
            tiers: vec![
                TierThreshold::new(0.0, "starter"),
                TierThreshold::new(10.0, "established"),
                TierThreshold::new(50.0, "power"),
            ],
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from a populated manager and validate them.
    pub fn from_manager(manager: &ConfigManager) -> Result<Self, ConfigError> {
        manager.load_validated()
    }

    /// Load `path` (JSON, TOML or env format), then `PENNANT_*` variables.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let manager = ConfigManager::with_prefix(ENV_PREFIX.to_string());
        manager.load_file_auto(path)?;
        manager.load_env()?;
        Self::from_manager(&manager)
    }

    /// Defaults overridden by `PENNANT_*` variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let manager = ConfigManager::with_prefix(ENV_PREFIX.to_string());
        manager.load_env()?;
        Self::from_manager(&manager)
    }

    pub fn with_context_ttl(mut self, ttl: Duration) -> Self {
        self.context_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_evaluation_ttl(mut self, ttl: Duration) -> Self {
        self.evaluation_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_resolution_timeout(mut self, timeout: Duration) -> Self {
        self.resolution_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_definition_timeout(mut self, timeout: Duration) -> Self {
        self.definition_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_latency_budget(mut self, budget: Duration) -> Self {
        self.latency_budget_ms = budget.as_millis() as u64;
        self
    }

    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval_secs = interval.as_secs();
        self
    }

    pub fn with_critical_values(mut self, critical_values: CriticalValues) -> Self {
        self.critical_values = critical_values;
        self
    }

    pub fn with_track_exposures(mut self, enabled: bool) -> Self {
        self.track_exposures = enabled;
        self
    }

    pub fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_secs)
    }

    pub fn evaluation_ttl(&self) -> Duration {
        Duration::from_secs(self.evaluation_ttl_secs)
    }

    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_millis(self.resolution_timeout_ms)
    }

    pub fn definition_timeout(&self) -> Duration {
        Duration::from_millis(self.definition_timeout_ms)
    }

    pub fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    pub fn failure_log_window(&self) -> Duration {
        Duration::from_secs(self.failure_log_window_secs)
    }

    pub fn reaper_interval(&self) -> Option<Duration> {
        (self.reaper_interval_secs > 0).then(|| Duration::from_secs(self.reaper_interval_secs))
    }

    /// Statistics engine carrying these planning parameters.
    pub fn statistics(&self) -> ExperimentStatistics {
        ExperimentStatistics::new()
            .with_significance_level(self.significance_level)
            .with_power(self.power)
            .with_minimum_detectable_effect(self.minimum_detectable_effect)
            .with_critical_values(self.critical_values)
    }
}

impl Validate for EngineConfig {
    fn validate(&self) -> pennant_config::Result<()> {
        ConfigValidator::positive(self.context_ttl_secs, "context_ttl_secs")?;
        ConfigValidator::positive(self.resolution_timeout_ms, "resolution_timeout_ms")?;
        ConfigValidator::positive(self.definition_timeout_ms, "definition_timeout_ms")?;
        ConfigValidator::positive(self.latency_budget_ms, "latency_budget_ms")?;
        ConfigValidator::positive(self.failure_log_window_secs, "failure_log_window_secs")?;
        ConfigValidator::open_probability(self.significance_level, "significance_level")?;
        ConfigValidator::open_probability(self.power, "power")?;
        ConfigValidator::open_probability(self.minimum_detectable_effect, "minimum_detectable_effect")?;
        ConfigValidator::open_probability(self.confidence_level, "confidence_level")?;
        ConfigValidator::not_empty(&self.tier_attribute, "tier_attribute")?;
        ConfigValidator::not_empty(&self.tier_source_attribute, "tier_source_attribute")?;

        for tier in &self.tiers {
            ConfigValidator::not_empty(&tier.name, "tiers.name")?;
        }
        if self
            .tiers
            .windows(2)
            .any(|pair| pair[0].min_usage >= pair[1].min_usage)
        {
            return Err(ConfigError::invalid(
                "tiers",
                "thresholds must be strictly increasing",
            ));
        }

        Ok(())
    }
}
