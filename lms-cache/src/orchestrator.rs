//! Refresh orchestration.
//!
//! Decides, per request, between serving the cached cohort, serving it while a
//! background refresh runs, and refetching before answering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use lms_client::LmsClient;
use lms_core::error::Result;
use lms_core::traits::{CourseSource, CourseStore};
use lms_core::types::{CacheKey, Course, CourseRecord, Credentials, LmsUser};
use lms_core::{Freshness, FreshnessPolicy, DEFAULT_MAX_BACKGROUND_REFRESHES};

use crate::config::CacheConfig;
use crate::inflight::{InFlight, KeyGuard};
use crate::stats::{CacheStats, Counters};

/// Stale-while-revalidate front of a [`CourseStore`].
///
/// Cloning is cheap; clones share the store, the background pool, and the
/// per-key refresh guards.
#[derive(Clone)]
pub struct RefreshOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn CourseStore>,
    source: Arc<dyn CourseSource>,
    policy: FreshnessPolicy,
    in_flight: Arc<InFlight>,
    background: Arc<Semaphore>,
    /// Number of background refreshes not yet finished
    running: watch::Sender<usize>,
    /// Cancels background refreshes at the end of a shutdown grace period
    cancel: CancellationToken,
    closed: AtomicBool,
    counters: Counters,
}

impl RefreshOrchestrator {
    /// Creates an orchestrator with the default policy and pool size.
    pub fn new(store: Arc<dyn CourseStore>, source: Arc<dyn CourseSource>) -> Self {
        Self::with_settings(
            store,
            source,
            FreshnessPolicy::default(),
            DEFAULT_MAX_BACKGROUND_REFRESHES,
        )
    }

    /// Creates an orchestrator with an explicit policy and pool size.
    pub fn with_settings(
        store: Arc<dyn CourseStore>,
        source: Arc<dyn CourseSource>,
        policy: FreshnessPolicy,
        max_background_refreshes: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                source,
                policy,
                in_flight: Arc::new(InFlight::default()),
                background: Arc::new(Semaphore::new(max_background_refreshes)),
                running: watch::channel(0).0,
                cancel: CancellationToken::new(),
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Creates an orchestrator backed by an [`LmsClient`] built from `config`.
    pub fn from_config(config: &CacheConfig, store: Arc<dyn CourseStore>) -> Result<Self> {
        let client = LmsClient::with_config(config.client.clone())?;
        Ok(Self::with_settings(
            store,
            Arc::new(client),
            config.policy(),
            config.max_background_refreshes,
        ))
    }

    /// Returns the active freshness policy.
    pub fn policy(&self) -> FreshnessPolicy {
        self.inner.policy
    }

    /// Returns the courses `user` is enrolled in.
    ///
    /// Never fails: upstream and store errors are logged and degrade to
    /// whatever the store holds (an empty list when a required refetch
    /// fails). The result is the store's cohort at the moment of return.
    #[instrument(skip(self, user), fields(user = %user.id))]
    pub async fn get_user_courses(&self, user: &LmsUser) -> Vec<CourseRecord> {
        let Some(key) = user.cache_key() else {
            debug!("No LMS configured for user");
            return Vec::new();
        };
        let Some(credentials) = user.credentials() else {
            debug!("No LMS token for user, serving cache only");
            return self.inner.read(&key).await;
        };

        let records = self.inner.read(&key).await;
        let freshness = self.inner.policy.classify_cohort(&records, Utc::now());
        self.inner.counters.record_lookup(freshness);
        debug!(?freshness, count = records.len(), "Classified cohort");

        match freshness {
            Freshness::Fresh => records,
            Freshness::Stale => {
                self.spawn_background_refresh(key, credentials, user.lms_user_id);
                records
            }
            Freshness::Missing | Freshness::Expired => {
                self.refresh_now(&key, &credentials, user.lms_user_id).await
            }
        }
    }

    async fn refresh_now(
        &self,
        key: &CacheKey,
        credentials: &Credentials,
        lms_user_id: u64,
    ) -> Vec<CourseRecord> {
        let _guard = self.inner.in_flight.acquire(key).await;

        // A refresh that held the guard before us may already have committed.
        let current = self.inner.read(key).await;
        if !self
            .inner
            .policy
            .classify_cohort(&current, Utc::now())
            .needs_sync_refresh()
        {
            debug!("Cohort refreshed while waiting, reusing it");
            return current;
        }

        match self.inner.refresh(key, credentials, lms_user_id).await {
            Ok(count) => {
                Counters::bump(&self.inner.counters.sync_refreshes);
                info!(count, "Refreshed cohort");
                self.inner.read(key).await
            }
            Err(e) => {
                Counters::bump(&self.inner.counters.sync_failures);
                warn!(error = %e, "Course refresh failed, returning no courses");
                Vec::new()
            }
        }
    }

    fn spawn_background_refresh(&self, key: CacheKey, credentials: Credentials, lms_user_id: u64) {
        let Some(guard) = self.try_claim(&key) else {
            Counters::bump(&self.inner.counters.background_skipped);
            return;
        };
        let Ok(permit) = Arc::clone(&self.inner.background).try_acquire_owned() else {
            warn!("Background refresh pool saturated, skipping");
            Counters::bump(&self.inner.counters.background_skipped);
            return;
        };

        Counters::bump(&self.inner.counters.background_started);
        let span = info_span!("background_refresh", key = %key);
        let running = Running::register(Arc::clone(&self.inner));
        let inner = Arc::clone(&self.inner);
        let task = async move {
            // Declared first so it is released last, after the permit and guard.
            let mut running = running;
            let _permit = permit;
            let _guard: KeyGuard = guard;
            tokio::select! {
                biased;
                _ = inner.cancel.cancelled() => {
                    Counters::bump(&inner.counters.background_aborted);
                    warn!("Background refresh aborted");
                }
                result = inner.refresh(&key, &credentials, lms_user_id) => match result {
                    Ok(count) => {
                        Counters::bump(&inner.counters.background_refreshes);
                        debug!(count, "Background refresh committed");
                    }
                    Err(e) => {
                        Counters::bump(&inner.counters.background_failures);
                        warn!(error = %e, "Background refresh failed");
                    }
                },
            }
            running.finish();
        };

        // Detached: the task is tracked through `running`, not its handle.
        tokio::spawn(task.instrument(span));
    }

    fn try_claim(&self, key: &CacheKey) -> Option<KeyGuard> {
        if self.inner.closed.load(Ordering::Acquire) {
            debug!("Orchestrator shut down, not refreshing");
            return None;
        }
        let guard = self.inner.in_flight.try_acquire(key);
        if guard.is_none() {
            debug!("Refresh already in flight");
        }
        guard
    }

    /// Removes every cached cohort of `owner_user_id`.
    ///
    /// Returns the number of cohorts removed.
    #[instrument(skip(self))]
    pub async fn invalidate_user(&self, owner_user_id: &str) -> Result<usize> {
        let removed = self.inner.store.remove_owner(owner_user_id).await?;
        info!(removed, "Invalidated cached courses");
        Ok(removed)
    }

    /// Waits for every outstanding background refresh, including ones
    /// launched while waiting.
    ///
    /// Dropping the returned future only stops the waiting; the refreshes
    /// keep running.
    pub async fn wait_for_background(&self) {
        let mut running = self.inner.running.subscribe();
        let _ = running.wait_for(|count| *count == 0).await;
    }

    /// Returns the number of background refreshes not yet finished.
    pub fn background_in_flight(&self) -> usize {
        *self.inner.running.borrow()
    }

    /// Stops launching background refreshes, waits up to `grace` for the
    /// running ones, then aborts the rest.
    ///
    /// Returns the number of refreshes aborted. An aborted refresh commits
    /// nothing.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, grace: Duration) -> usize {
        self.inner.closed.store(true, Ordering::Release);

        let drained = tokio::time::timeout(grace, self.wait_for_background())
            .await
            .is_ok();
        if drained {
            return 0;
        }

        let before = self.inner.counters.snapshot().background_aborted;
        warn!(running = self.background_in_flight(), "Grace period over, aborting background refreshes");
        self.inner.cancel.cancel();
        self.wait_for_background().await;
        (self.inner.counters.snapshot().background_aborted - before) as usize
    }

    /// Returns a snapshot of the lookup and refresh counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot()
    }
}

impl std::fmt::Debug for RefreshOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("policy", &self.inner.policy)
            .field("background_available", &self.inner.background.available_permits())
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Counts one background refresh from launch until its task is gone,
/// however it ends.
struct Running {
    inner: Arc<Inner>,
    finished: bool,
}

impl Running {
    fn register(inner: Arc<Inner>) -> Self {
        inner.running.send_modify(|count| *count += 1);
        Self {
            inner,
            finished: false,
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        // Dropped unfinished: the task panicked or was torn down with the runtime.
        if !self.finished {
            Counters::bump(&self.inner.counters.background_failures);
            warn!("Background refresh ended without completing");
        }
        self.inner.running.send_modify(|count| *count -= 1);
    }
}

impl Inner {
    /// Reads a cohort; a failing store reads as empty.
    async fn read(&self, key: &CacheKey) -> Vec<CourseRecord> {
        match self.store.get(key).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, key = %key, "Failed to read cached courses");
                Vec::new()
            }
        }
    }

    /// Fetch, translate, replace. Returns the number of courses committed.
    async fn refresh(&self, key: &CacheKey, credentials: &Credentials, lms_user_id: u64) -> Result<usize> {
        let raw = self
            .source
            .fetch_courses(&credentials.lms_base_url, &credentials.api_token, lms_user_id)
            .await?;
        let courses = Course::from_raw_list(&raw)?;
        let count = courses.len();
        self.store.replace(key, courses).await?;
        Ok(count)
    }
}
