//! Evaluation cache
//!
//! TTL-bounded map of recent evaluation results. Entries expire lazily when
//! read; `purge_expired` or the optional reaper task bound memory for keys
//! that are never read again.

use crate::evaluation::EvaluationResult;
use dashmap::DashMap;
use pennant_log::{debug, trace};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Cache key: one flag snapshot evaluated for one subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub flag_key: String,
    pub version: u64,
    pub subject_id: String,
}

impl CacheKey {
    pub fn new(flag_key: impl Into<String>, version: u64, subject_id: impl Into<String>) -> Self {
        Self {
            flag_key: flag_key.into(),
            version,
            subject_id: subject_id.into(),
        }
    }
}

/// Rendered as `{flag_key}@{version}:{subject_id}`; prefix invalidation
/// matches against this form.
impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.flag_key, self.version, self.subject_id)
    }
}

/// Key for a flag snapshot and subject.
pub fn cache_key(flag_key: &str, version: u64, subject_id: &str) -> CacheKey {
    CacheKey::new(flag_key, version, subject_id)
}

#[derive(Debug, Clone)]
struct CachedEntry {
    result: EvaluationResult,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent evaluation cache.
///
/// Backed by a sharded `DashMap`; unrelated keys never contend on a single
/// lock.
#[derive(Debug, Default)]
pub struct FlagEvaluationCache {
    entries: DashMap<CacheKey, CachedEntry>,
}

impl FlagEvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `key`, if present and not expired.
    pub fn get(&self, key: &CacheKey) -> Option<EvaluationResult> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                trace!(target: "pennant::cache", "Cache hit: {}", key);
                return Some(entry.result.clone());
            }
        }

        // Re-check under the write lock so a concurrent refresh is not lost.
        self.entries
            .remove_if(key, |_, entry| entry.is_expired(now));
        trace!(target: "pennant::cache", "Cache entry expired: {}", key);
        None
    }

    /// Store `result` under `key` for `ttl`. A zero TTL stores nothing.
    pub fn put(&self, key: CacheKey, result: EvaluationResult, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries.insert(
            key,
            CachedEntry {
                result,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove every entry (`None`) or those whose rendered key starts with
    /// `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&self, prefix: Option<&str>) -> usize {
        let before = self.entries.len();
        match prefix {
            None => self.entries.clear(),
            Some(prefix) => self
                .entries
                .retain(|key, _| !key.to_string().starts_with(prefix)),
        }
        let removed = before.saturating_sub(self.entries.len());
        debug!(
            target: "pennant::cache",
            "Invalidated {} entries (prefix: {})",
            removed,
            prefix.unwrap_or("*")
        );
        removed
    }

    /// Remove every entry cached for `flag_key`, across all versions.
    pub fn invalidate_flag(&self, flag_key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.flag_key != flag_key);
        before.saturating_sub(self.entries.len())
    }

    /// Remove every entry cached for `subject_id`, across all flags.
    pub fn invalidate_subject(&self, subject_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.subject_id != subject_id);
        before.saturating_sub(self.entries.len())
    }

    /// Drop expired entries; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(target: "pennant::cache", "Purged {} expired evaluations", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a background task purging expired entries every `interval`.
    ///
    /// Must be called from within a tokio runtime. Abort the returned handle
    /// to stop the reaper.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.purge_expired();
            }
        })
    }
}
