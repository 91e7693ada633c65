//! Lifetime counters for a single cache instance.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an existing wrapper.
    pub hits: u64,
    /// Wrappers constructed and inserted.
    pub constructions: u64,
    /// Entries removed by `release`.
    pub releases: u64,
    /// Calls made with the null handle.
    pub null_rejections: u64,
    /// Constructions that failed and left the map untouched.
    pub failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    constructions: AtomicU64,
    releases: AtomicU64,
    null_rejections: AtomicU64,
    failures: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            constructions: self.constructions.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            null_rejections: self.null_rejections.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_construction(&self) {
        self.constructions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_release(&self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_null_rejection(&self) {
        self.null_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}
