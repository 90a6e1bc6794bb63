//! Experiment definitions and assignments

use crate::attribute::SubjectContext;
use crate::bucket::BucketAssignor;
use crate::error::{FeatureError, FeatureResult};
use crate::flag::Condition;
use crate::targeting;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const ALLOCATION_TOLERANCE: f64 = 1e-6;

fn default_true() -> bool {
    true
}

/// Controlled experiment definition.
///
/// The first variation is the control arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    pub key: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub version: u64,

    pub variations: Vec<String>,

    /// Percentage of eligible traffic per variation; must sum to 100
    pub traffic_allocation: Vec<f64>,

    /// Eligibility conditions (all must hold); empty admits everyone
    #[serde(default)]
    pub targeting: Vec<Condition>,

    #[serde(default)]
    pub success_metrics: Vec<String>,

    #[serde(default)]
    pub duration_days: u32,

    /// Per-arm sample size below which no verdict other than continue is given
    #[serde(default)]
    pub minimum_sample_size: u64,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl ExperimentDefinition {
    /// Create an experiment splitting traffic evenly across `variations`.
    pub fn new<I, S>(key: impl Into<String>, variations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let variations: Vec<String> = variations.into_iter().map(Into::into).collect();
        let traffic_allocation = if variations.is_empty() {
            Vec::new()
        } else {
            vec![100.0 / variations.len() as f64; variations.len()]
        };

        Self {
            key: key.into(),
            description: None,
            enabled: true,
            version: 0,
            variations,
            traffic_allocation,
            targeting: Vec::new(),
            success_metrics: Vec::new(),
            duration_days: 14,
            minimum_sample_size: 0,
            started_at: None,
        }
    }

    /// Classic 50/50 control versus treatment test
    pub fn ab_test(key: impl Into<String>) -> Self {
        Self::new(key, ["control", "treatment"])
    }

    pub fn with_allocation(mut self, allocation: Vec<f64>) -> Self {
        self.traffic_allocation = allocation;
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.targeting.push(condition);
        self
    }

    pub fn with_success_metric(mut self, metric: impl Into<String>) -> Self {
        self.success_metrics.push(metric.into());
        self
    }

    pub fn with_duration_days(mut self, days: u32) -> Self {
        self.duration_days = days;
        self
    }

    pub fn with_minimum_sample_size(mut self, size: u64) -> Self {
        self.minimum_sample_size = size;
        self
    }

    pub fn starting_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn control(&self) -> Option<&str> {
        self.variations.first().map(String::as_str)
    }

    pub fn scheduled_end(&self) -> Option<DateTime<Utc>> {
        self.started_at
            .map(|start| start + Duration::days(i64::from(self.duration_days)))
    }

    pub fn is_past_schedule(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_end().is_some_and(|end| now >= end)
    }

    pub fn validate(&self) -> FeatureResult<()> {
        if self.key.trim().is_empty() {
            return Err(FeatureError::configuration("experiment key cannot be empty"));
        }
        if self.variations.is_empty() {
            return Err(FeatureError::configuration(format!(
                "experiment '{}' declares no variations",
                self.key
            )));
        }

        let mut seen = HashSet::new();
        for variation in &self.variations {
            if !seen.insert(variation.as_str()) {
                return Err(FeatureError::configuration(format!(
                    "experiment '{}' declares variation '{}' twice",
                    self.key, variation
                )));
            }
        }

        if self.traffic_allocation.len() != self.variations.len() {
            return Err(FeatureError::configuration(format!(
                "experiment '{}' has {} variations but {} allocations",
                self.key,
                self.variations.len(),
                self.traffic_allocation.len()
            )));
        }
        if let Some(bad) = self
            .traffic_allocation
            .iter()
            .find(|share| !(0.0..=100.0).contains(*share))
        {
            return Err(FeatureError::configuration(format!(
                "experiment '{}' allocation {} is not a percentage",
                self.key, bad
            )));
        }

        let total: f64 = self.traffic_allocation.iter().sum();
        if (total - 100.0).abs() > ALLOCATION_TOLERANCE {
            return Err(FeatureError::configuration(format!(
                "experiment '{}' allocations sum to {} instead of 100",
                self.key, total
            )));
        }

        Ok(())
    }

    /// Whether the subject may enter the experiment.
    pub fn is_eligible(&self, context: &SubjectContext) -> bool {
        self.enabled && targeting::matches(&self.targeting, context)
    }

    /// Derive the subject's assignment; `None` when ineligible.
    pub fn assign(&self, context: &SubjectContext) -> Option<ExperimentAssignment> {
        if !self.is_eligible(context) {
            return None;
        }

        let (index, variant) = BucketAssignor::assign(
            &context.id,
            &self.key,
            &self.variations,
            &self.traffic_allocation,
        )?;

        Some(ExperimentAssignment {
            subject_id: context.id.clone(),
            experiment_key: self.key.clone(),
            variant: variant.to_string(),
            variant_index: index,
            assigned_at: Utc::now(),
        })
    }
}

/// A subject's variant in an experiment.
///
/// Re-derivable at any time from the subject id, experiment key and the
/// current allocation; never stored as authoritative state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub subject_id: String,
    pub experiment_key: String,
    pub variant: String,
    pub variant_index: usize,
    pub assigned_at: DateTime<Utc>,
}

impl ExperimentAssignment {
    pub fn is_control(&self) -> bool {
        self.variant_index == 0
    }
}
