//! Common traits for the course cache.
//!
//! These traits define the seams between the orchestrator and its
//! collaborators, so stores and upstream sources can be swapped in tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::Result;
use crate::freshness::cohort_age;
use crate::types::{CacheKey, Course, CourseRecord, RawCourse};

// ═══════════════════════════════════════════════════════════════════════════════
// COURSE SOURCE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Upstream provider of enrollment listings.
///
/// Implementations issue at most one bounded-time request per call and never
/// retry; the caller decides what a failure means.
#[async_trait]
pub trait CourseSource: Send + Sync {
    /// Fetches the raw course listing for `lms_user_id`.
    ///
    /// # Errors
    /// - `Timeout` if the time bound is exceeded
    /// - `Upstream`/`UpstreamStatus` for a failed request or a body that is
    ///   not a list of records
    async fn fetch_courses(
        &self,
        base_url: &str,
        token: &str,
        lms_user_id: u64,
    ) -> Result<Vec<RawCourse>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// COURSE STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Persistent home of cached cohorts.
///
/// Implementations might use:
/// - In-memory maps (for testing/development)
/// - Snapshot files (for single-node deployments)
/// - A relational table keyed by (owner, base URL)
#[async_trait]
pub trait CourseStore: Send + Sync {
    /// Returns the current cohort for `key`, empty if nothing is cached.
    async fn get(&self, key: &CacheKey) -> Result<Vec<CourseRecord>>;

    /// Replaces the cohort for `key` with `courses`, stamped with the current time.
    ///
    /// Deletion of the old cohort and insertion of the new one happen as one
    /// step: readers see either the old or the new cohort, never a mix. On
    /// error the old cohort stays intact.
    async fn replace(&self, key: &CacheKey, courses: Vec<Course>) -> Result<()>;

    /// Removes the cohort for `key`. Returns true if anything was removed.
    async fn remove(&self, key: &CacheKey) -> Result<bool>;

    /// Removes every cohort owned by `owner_user_id`. Returns the number of
    /// cohorts removed.
    async fn remove_owner(&self, owner_user_id: &str) -> Result<usize>;

    /// Time since the oldest `cached_at` of the cohort, `None` if empty.
    async fn age_of(&self, key: &CacheKey) -> Result<Option<Duration>> {
        let records = self.get(key).await?;
        Ok(cohort_age(&records, Utc::now()))
    }
}
