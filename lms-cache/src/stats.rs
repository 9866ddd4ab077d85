//! Orchestrator counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use lms_core::Freshness;

/// Point-in-time copy of the orchestrator counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups served from a fresh cohort
    pub fresh_hits: u64,
    /// Lookups served from a stale cohort
    pub stale_hits: u64,
    /// Lookups that found nothing cached
    pub missing: u64,
    /// Lookups that found an expired cohort
    pub expired: u64,
    /// Synchronous refreshes that committed
    pub sync_refreshes: u64,
    /// Synchronous refreshes that failed
    pub sync_failures: u64,
    /// Background refreshes launched
    pub background_started: u64,
    /// Background refreshes not launched (in flight or pool saturated)
    pub background_skipped: u64,
    /// Background refreshes that committed
    pub background_refreshes: u64,
    /// Background refreshes that failed
    pub background_failures: u64,
    /// Background refreshes cancelled by shutdown
    pub background_aborted: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    fresh_hits: AtomicU64,
    stale_hits: AtomicU64,
    missing: AtomicU64,
    expired: AtomicU64,
    pub(crate) sync_refreshes: AtomicU64,
    pub(crate) sync_failures: AtomicU64,
    pub(crate) background_started: AtomicU64,
    pub(crate) background_skipped: AtomicU64,
    pub(crate) background_refreshes: AtomicU64,
    pub(crate) background_failures: AtomicU64,
    pub(crate) background_aborted: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lookup(&self, freshness: Freshness) {
        Self::bump(match freshness {
            Freshness::Fresh => &self.fresh_hits,
            Freshness::Stale => &self.stale_hits,
            Freshness::Missing => &self.missing,
            Freshness::Expired => &self.expired,
        });
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CacheStats {
            fresh_hits: load(&self.fresh_hits),
            stale_hits: load(&self.stale_hits),
            missing: load(&self.missing),
            expired: load(&self.expired),
            sync_refreshes: load(&self.sync_refreshes),
            sync_failures: load(&self.sync_failures),
            background_started: load(&self.background_started),
            background_skipped: load(&self.background_skipped),
            background_refreshes: load(&self.background_refreshes),
            background_failures: load(&self.background_failures),
            background_aborted: load(&self.background_aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lookup() {
        let counters = Counters::default();
        counters.record_lookup(Freshness::Fresh);
        counters.record_lookup(Freshness::Fresh);
        counters.record_lookup(Freshness::Stale);
        counters.record_lookup(Freshness::Expired);
        Counters::bump(&counters.background_skipped);

        let stats = counters.snapshot();
        assert_eq!(stats.fresh_hits, 2);
        assert_eq!(stats.stale_hits, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.missing, 0);
        assert_eq!(stats.background_skipped, 1);
    }
}
