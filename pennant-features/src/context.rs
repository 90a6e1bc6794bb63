//! Subject context resolution
//!
//! Profiles fetched from the identity collaborator are cached per subject
//! for a fixed TTL. Every resolution layers the caller's override
//! attributes on top of the cached profile and then fills in derived
//! attributes (account tier, tenure).

use crate::attribute::{AttributeValue, Attributes, SubjectContext};
use crate::config::{EngineConfig, TierThreshold};
use crate::error::FeatureError;
use crate::provider::ProfileProvider;
use crate::throttle::FailureThrottle;
use chrono::Utc;
use dashmap::DashMap;
use pennant_log::{debug, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Timestamp attribute tenure is derived from
pub const CREATED_AT_ATTRIBUTE: &str = "created_at";

/// Derived whole days since `created_at`
pub const TENURE_ATTRIBUTE: &str = "tenure_days";

struct CachedProfile {
    attributes: Attributes,
    expires_at: Instant,
}

/// Resolves and caches subject contexts.
pub struct SubjectContextResolver {
    provider: Arc<dyn ProfileProvider>,
    profiles: DashMap<String, CachedProfile>,
    ttl: Duration,
    timeout: Duration,
    tier_source_attribute: String,
    tier_attribute: String,
    tiers: Vec<TierThreshold>,
    throttle: Arc<FailureThrottle>,
}

impl SubjectContextResolver {
    pub fn new(provider: Arc<dyn ProfileProvider>) -> Self {
        let config = EngineConfig::default();
        Self::from_config(
            provider,
            &config,
            Arc::new(FailureThrottle::new(config.failure_log_window())),
        )
    }

    pub fn from_config(
        provider: Arc<dyn ProfileProvider>,
        config: &EngineConfig,
        throttle: Arc<FailureThrottle>,
    ) -> Self {
        Self {
            provider,
            profiles: DashMap::new(),
            ttl: config.context_ttl(),
            timeout: config.resolution_timeout(),
            tier_source_attribute: config.tier_source_attribute.clone(),
            tier_attribute: config.tier_attribute.clone(),
            tiers: config.tiers.clone(),
            throttle,
        }
    }

    /// Resolve the subject's context.
    ///
    /// Never fails: when the profile cannot be fetched in time the context
    /// holds only the overrides (plus derived attributes) and nothing is
    /// cached.
    pub async fn resolve(&self, subject_id: &str, overrides: &Attributes) -> SubjectContext {
        let mut attributes = match self.cached(subject_id) {
            Some(profile) => profile,
            None => self.fetch(subject_id).await.unwrap_or_default(),
        };

        attributes.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.derive(&mut attributes);

        SubjectContext {
            id: subject_id.to_string(),
            attributes,
        }
    }

    fn cached(&self, subject_id: &str) -> Option<Attributes> {
        let now = Instant::now();
        {
            let entry = self.profiles.get(subject_id)?;
            if now < entry.expires_at {
                trace!(target: "pennant::context", "Context cache hit for {}", subject_id);
                return Some(entry.attributes.clone());
            }
        }
        self.profiles
            .remove_if(subject_id, |_, entry| now >= entry.expires_at);
        None
    }

    async fn fetch(&self, subject_id: &str) -> Option<Attributes> {
        debug!(target: "pennant::context", "Fetching profile for {}", subject_id);

        let outcome = match tokio::time::timeout(self.timeout, self.provider.get_profile(subject_id)).await {
            Ok(result) => result,
            Err(_) => Err(FeatureError::Timeout(format!(
                "profile fetch exceeded {:?}",
                self.timeout
            ))),
        };

        match outcome {
            Ok(profile) => {
                self.profiles.insert(
                    subject_id.to_string(),
                    CachedProfile {
                        attributes: profile.clone(),
                        expires_at: Instant::now() + self.ttl,
                    },
                );
                Some(profile)
            }
            Err(err) => {
                let key = match &err {
                    FeatureError::Timeout(_) => "profile:timeout",
                    _ => "profile:unavailable",
                };
                if self.throttle.should_log(key) {
                    warn!(
                        target: "pennant::context",
                        "Profile provider failed, evaluating with overrides only: {}",
                        err
                    );
                }
                None
            }
        }
    }

    fn derive(&self, attributes: &mut Attributes) {
        if !attributes.contains_key(&self.tier_attribute)
            && let Some(usage) = attributes
                .get(&self.tier_source_attribute)
                .and_then(AttributeValue::as_number)
            && let Some(tier) = tier_for(&self.tiers, usage)
        {
            attributes.insert(
                self.tier_attribute.clone(),
                AttributeValue::String(tier.to_string()),
            );
        }

        if !attributes.contains_key(TENURE_ATTRIBUTE)
            && let Some(created_at) = attributes
                .get(CREATED_AT_ATTRIBUTE)
                .and_then(AttributeValue::as_timestamp)
        {
            let days = (Utc::now() - created_at).num_days().max(0);
            attributes.insert(TENURE_ATTRIBUTE.to_string(), AttributeValue::from(days));
        }
    }

    /// Drop the cached profile of one subject.
    pub fn invalidate(&self, subject_id: &str) -> bool {
        self.profiles.remove(subject_id).is_some()
    }

    /// Drop all expired profiles; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.profiles.len();
        self.profiles.retain(|_, entry| now < entry.expires_at);
        before.saturating_sub(self.profiles.len())
    }

    pub fn cached_subjects(&self) -> usize {
        self.profiles.len()
    }
}

/// Highest tier whose threshold `usage` reaches.
pub fn tier_for(tiers: &[TierThreshold], usage: f64) -> Option<&str> {
    tiers
        .iter()
        .filter(|tier| usage >= tier.min_usage)
        .max_by(|a, b| a.min_usage.total_cmp(&b.min_usage))
        .map(|tier| tier.name.as_str())
}
