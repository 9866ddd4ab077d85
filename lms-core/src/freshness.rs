//! Freshness policy.
//!
//! The single source of truth for refresh decisions. Given the age of a
//! cohort, decides whether it is served as-is, served while a background
//! refresh runs, or refetched before responding.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_HARD_TTL, DEFAULT_SOFT_TTL};
use crate::types::CourseRecord;

/// Classification of a cached cohort.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Nothing cached for the key.
    Missing,
    /// Young enough to serve without network activity.
    Fresh,
    /// Usable, but a background refresh should be started.
    Stale,
    /// Too old to serve; refetch before responding.
    Expired,
}

impl Freshness {
    /// Returns true if the caller must wait for a refetch.
    pub fn needs_sync_refresh(self) -> bool {
        matches!(self, Freshness::Missing | Freshness::Expired)
    }

    /// Returns true if a background refresh should be launched.
    pub fn needs_background_refresh(self) -> bool {
        self == Freshness::Stale
    }
}

/// Soft/hard TTL thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessPolicy {
    /// Above this age a cohort is stale
    pub soft_ttl: Duration,
    /// Above this age a cohort is expired
    pub hard_ttl: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            soft_ttl: DEFAULT_SOFT_TTL,
            hard_ttl: DEFAULT_HARD_TTL,
        }
    }
}

impl FreshnessPolicy {
    /// Creates a policy. The hard TTL is raised to the soft TTL if smaller.
    pub fn new(soft_ttl: Duration, hard_ttl: Duration) -> Self {
        Self {
            soft_ttl,
            hard_ttl: hard_ttl.max(soft_ttl),
        }
    }

    /// Classifies a cohort by its age (`None` when nothing is cached).
    pub fn classify(&self, age: Option<Duration>) -> Freshness {
        match age {
            None => Freshness::Missing,
            Some(age) if age > self.hard_ttl => Freshness::Expired,
            Some(age) if age > self.soft_ttl => Freshness::Stale,
            Some(_) => Freshness::Fresh,
        }
    }

    /// Classifies a cohort directly from its rows.
    pub fn classify_cohort(&self, records: &[CourseRecord], now: DateTime<Utc>) -> Freshness {
        self.classify(cohort_age(records, now))
    }
}

/// Age of a cohort: time since its oldest `cached_at`.
///
/// Returns `None` for an empty cohort. A `cached_at` in the future (clock
/// skew between writers) counts as age zero.
pub fn cohort_age(records: &[CourseRecord], now: DateTime<Utc>) -> Option<Duration> {
    let oldest = records.iter().map(|r| r.cached_at).min()?;
    Some((now - oldest).to_std().unwrap_or(Duration::ZERO))
}
