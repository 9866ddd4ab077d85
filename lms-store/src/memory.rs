//! In-memory cohort store.
//!
//! Fast, thread-safe storage suitable for development, testing,
//! and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, instrument};

use lms_core::error::Result;
use lms_core::traits::CourseStore;
use lms_core::types::{CacheKey, Course, CourseRecord, StoreStats};

/// In-memory cohort store.
///
/// Each key maps to its whole cohort, so a replace is a single map insert and
/// readers observe either the previous or the new cohort.
///
/// # Thread Safety
///
/// All operations are thread-safe and can be called concurrently.
#[derive(Debug, Default)]
pub struct MemoryCourseStore {
    /// Cohorts by key; never holds an empty cohort
    cohorts: DashMap<CacheKey, Vec<CourseRecord>>,
}

impl MemoryCourseStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with preallocated capacity (number of keys).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cohorts: DashMap::with_capacity(capacity),
        }
    }

    /// Stamps courses into rows of one cohort.
    pub(crate) fn stamp(key: &CacheKey, courses: Vec<Course>, cached_at: DateTime<Utc>) -> Vec<CourseRecord> {
        courses
            .into_iter()
            .map(|course| CourseRecord::new(key, course, cached_at))
            .collect()
    }

    /// Installs a prepared cohort, removing the key when it is empty.
    pub(crate) fn put_cohort(&self, key: &CacheKey, records: Vec<CourseRecord>) {
        if records.is_empty() {
            self.cohorts.remove(key);
        } else {
            self.cohorts.insert(key.clone(), records);
        }
    }

    /// Replaces a cohort with an explicit cache time.
    ///
    /// Useful for restoring backups and for simulating aged data.
    pub fn replace_at(&self, key: &CacheKey, courses: Vec<Course>, cached_at: DateTime<Utc>) {
        self.put_cohort(key, Self::stamp(key, courses, cached_at));
    }

    /// Imports rows, keeping their `cached_at`.
    ///
    /// Rows are grouped by key; each imported key's cohort is replaced as a
    /// whole. Returns the number of rows imported.
    pub fn import(&self, records: Vec<CourseRecord>) -> usize {
        let mut grouped: std::collections::HashMap<CacheKey, Vec<CourseRecord>> =
            std::collections::HashMap::new();
        let count = records.len();

        for record in records {
            grouped.entry(record.key()).or_default().push(record);
        }
        for (key, cohort) in grouped {
            self.put_cohort(&key, cohort);
        }

        count
    }

    /// Returns every cached row (for export/backup).
    pub fn all_records(&self) -> Vec<CourseRecord> {
        self.cohorts
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Returns the cached keys.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.cohorts.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Returns the number of cached cohorts.
    pub fn len(&self) -> usize {
        self.cohorts.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cohorts.is_empty()
    }

    /// Drops every cohort.
    pub fn clear(&self) {
        self.cohorts.clear();
    }

    /// Returns a summary of the store contents.
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for entry in self.cohorts.iter() {
            stats.cohorts += 1;
            stats.records += entry.value().len();
            let oldest = entry.value().iter().map(|r| r.cached_at).min();
            stats.oldest_cached_at = match (stats.oldest_cached_at, oldest) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        stats
    }

    fn get_sync(&self, key: &CacheKey) -> Vec<CourseRecord> {
        self.cohorts
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn remove_sync(&self, key: &CacheKey) -> bool {
        self.cohorts.remove(key).is_some()
    }

    pub(crate) fn keys_of_owner(&self, owner_user_id: &str) -> Vec<CacheKey> {
        self.cohorts
            .iter()
            .filter(|entry| entry.key().owner_user_id() == owner_user_id)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

#[async_trait]
impl CourseStore for MemoryCourseStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &CacheKey) -> Result<Vec<CourseRecord>> {
        Ok(self.get_sync(key))
    }

    #[instrument(skip(self, courses), fields(key = %key, count = courses.len()))]
    async fn replace(&self, key: &CacheKey, courses: Vec<Course>) -> Result<()> {
        self.replace_at(key, courses, Utc::now());
        debug!("Replaced cohort");
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn remove(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.remove_sync(key))
    }

    #[instrument(skip(self))]
    async fn remove_owner(&self, owner_user_id: &str) -> Result<usize> {
        // Collect first: removing while iterating would deadlock the shard.
        let keys = self.keys_of_owner(owner_user_id);
        let removed = keys.iter().filter(|key| self.remove_sync(key)).count();
        debug!(removed, "Removed cohorts of owner");
        Ok(removed)
    }
}
