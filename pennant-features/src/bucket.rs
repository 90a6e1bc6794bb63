//! Deterministic bucketing
//!
//! Subjects are hashed with SHA-256 over `"{subject}:{key}:{salt}"`. Variant
//! assignment and rollout inclusion use different salts, so being inside a
//! rollout says nothing about which variant a subject lands in.
//!
//! # Allocation sensitivity
//!
//! Variant ranges are laid out contiguously in declaration order. Changing
//! the allocation of one variant moves the boundaries of every variant
//! declared after it, so some subjects of untouched variants are reassigned.
//! Append new variants at the end and avoid editing allocations of a running
//! experiment if assignment stability matters more than the new split.

use sha2::{Digest, Sha256};

/// Number of buckets used for variant assignment (0.01% granularity).
pub const VARIANT_RESOLUTION: u32 = 10_000;

/// Number of buckets used for rollout inclusion.
pub const ROLLOUT_RESOLUTION: u32 = 100;

const VARIANT_SALT: &str = "variant";
const ROLLOUT_SALT: &str = "rollout";

/// Pure, stateless bucket assignment.
pub struct BucketAssignor;

impl BucketAssignor {
    fn hash(subject_id: &str, key: &str, salt: &str) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(subject_id.as_bytes());
        hasher.update(b":");
        hasher.update(key.as_bytes());
        hasher.update(b":");
        hasher.update(salt.as_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }

    /// Variant bucket in `0..VARIANT_RESOLUTION`.
    pub fn variant_bucket(subject_id: &str, key: &str) -> u32 {
        (Self::hash(subject_id, key, VARIANT_SALT) % u64::from(VARIANT_RESOLUTION)) as u32
    }

    /// Rollout bucket in `0..100`.
    pub fn rollout_bucket(subject_id: &str, key: &str) -> u8 {
        (Self::hash(subject_id, key, ROLLOUT_SALT) % u64::from(ROLLOUT_RESOLUTION)) as u8
    }

    /// Whether the subject falls inside a `percentage` rollout.
    ///
    /// 0 includes nobody, 100 includes everybody.
    pub fn include_in_rollout(subject_id: &str, key: &str, percentage: u8) -> bool {
        Self::rollout_bucket(subject_id, key) < percentage
    }

    /// Upper (exclusive) bucket bound of each variant.
    ///
    /// Percentages are cumulated before scaling so rounding never opens
    /// gaps; the last bound is pinned to the full resolution.
    pub fn boundaries(allocation: &[f64]) -> Vec<u32> {
        let mut cumulative = 0.0;
        let mut bounds: Vec<u32> = allocation
            .iter()
            .map(|share| {
                cumulative += share.max(0.0);
                let scaled = (cumulative * f64::from(VARIANT_RESOLUTION) / 100.0).round();
                scaled.min(f64::from(VARIANT_RESOLUTION)) as u32
            })
            .collect();

        if let Some(last) = bounds.last_mut() {
            *last = VARIANT_RESOLUTION;
        }
        bounds
    }

    /// Index of the variant owning `bucket`.
    ///
    /// The first variant whose upper bound exceeds the bucket wins, so a
    /// bucket sitting on a shared boundary goes to the lower index and
    /// zero-width variants never receive traffic.
    pub fn index_for_bucket(bucket: u32, boundaries: &[u32]) -> Option<usize> {
        boundaries.iter().position(|&upper| bucket < upper)
    }

    /// Assign a subject to one of `variations` according to `allocation`.
    ///
    /// Returns `None` when the two lists disagree in length or are empty.
    pub fn assign<'a>(
        subject_id: &str,
        key: &str,
        variations: &'a [String],
        allocation: &[f64],
    ) -> Option<(usize, &'a str)> {
        if variations.is_empty() || variations.len() != allocation.len() {
            return None;
        }

        let bucket = Self::variant_bucket(subject_id, key);
        let index = Self::index_for_bucket(bucket, &Self::boundaries(allocation))?;
        variations.get(index).map(|v| (index, v.as_str()))
    }

    /// Assign a subject evenly across `count` variants.
    pub fn assign_even(subject_id: &str, key: &str, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let share = 100.0 / count as f64;
        let allocation = vec![share; count];
        Self::index_for_bucket(
            Self::variant_bucket(subject_id, key),
            &Self::boundaries(&allocation),
        )
    }
}
