//! Handle cache: one wrapper object per driver handle.
//!
//! Keyed by the normalized handle (see [`HandleKey`]). The cache owns every
//! wrapper it creates; callers get shared `Arc` references whose identity is
//! stable until the handle is released.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use fxhash::FxHashMap;
use parking_lot::Mutex;

use crate::error::CacheError;
use crate::key::HandleKey;
use crate::stats::{CacheCounters, CacheStats};

/// Construct a wrapper from the raw handle it wraps plus construction
/// arguments (owner references, descriptors).
///
/// Implementations must not call back into the cache they are being created
/// by; construction runs with that cache's lock held.
pub trait FromHandle<H, A>: Sized {
    fn from_handle(handle: H, args: A) -> Result<Self, CacheError>;
}

/// Thread-safe registry mapping each non-null handle to exactly one wrapper.
pub struct HandleCache<W, H: HandleKey> {
    name: &'static str,
    entries: Mutex<FxHashMap<H::Key, Arc<W>>>,
    counters: CacheCounters,
    _handle: PhantomData<fn(H)>,
}

impl<W, H: HandleKey> HandleCache<W, H> {
    /// Create an empty cache. `name` identifies the entity type in logs and
    /// errors (e.g. `"device"`).
    pub fn new(name: &'static str) -> Self {
        HandleCache {
            name,
            entries: Mutex::new(FxHashMap::default()),
            counters: CacheCounters::default(),
            _handle: PhantomData,
        }
    }

    /// Get the wrapper for `handle`, constructing it from `args` on first
    /// sight.
    ///
    /// Returns `Ok(None)` for the null handle. On a hit `args` is dropped
    /// unused.
    pub fn get_or_create<A>(&self, handle: H, args: A) -> Result<Option<Arc<W>>, CacheError>
    where
        W: FromHandle<H, A>,
    {
        self.get_or_try_create_with(handle, |h| W::from_handle(h, args))
    }

    /// Like [`get_or_create`](Self::get_or_create) with an infallible
    /// constructor closure.
    pub fn get_or_create_with<F>(&self, handle: H, construct: F) -> Result<Option<Arc<W>>, CacheError>
    where
        F: FnOnce(H) -> W,
    {
        self.get_or_try_create_with(handle, |h| Ok::<_, CacheError>(construct(h)))
    }

    /// Get the wrapper for `handle`, running `construct` only if no entry
    /// exists yet.
    ///
    /// The lookup, construction and insert happen under one lock, so
    /// concurrent callers with the same handle see exactly one construction.
    /// If `construct` fails, or the map can't grow, nothing is inserted and
    /// the error is returned.
    pub fn get_or_try_create_with<E, F>(&self, handle: H, construct: F) -> Result<Option<Arc<W>>, E>
    where
        E: From<CacheError>,
        F: FnOnce(H) -> Result<W, E>,
    {
        let Some(key) = handle.key() else {
            self.counters.inc_null_rejection();
            return Ok(None);
        };

        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            self.counters.inc_hit();
            return Ok(Some(Arc::clone(existing)));
        }

        if entries.try_reserve(1).is_err() {
            self.counters.inc_failure();
            log::error!("{} cache: out of host memory reserving slot for {:?}", self.name, key);
            return Err(CacheError::OutOfHostMemory { cache: self.name }.into());
        }

        let wrapper = match construct(handle) {
            Ok(wrapper) => Arc::new(wrapper),
            Err(e) => {
                self.counters.inc_failure();
                log::debug!("{} cache: construction failed for {:?}", self.name, key);
                return Err(e);
            }
        };

        entries.insert(key, Arc::clone(&wrapper));
        self.counters.inc_construction();
        log::debug!("{} cache: new wrapper for {:?} ({} live)", self.name, key, entries.len());
        Ok(Some(wrapper))
    }

    /// Get the wrapper for `handle` if one exists. Never constructs.
    pub fn lookup(&self, handle: H) -> Option<Arc<W>> {
        let key = handle.key()?;
        self.entries.lock().get(&key).cloned()
    }

    /// Whether `handle` currently has a wrapper.
    pub fn contains(&self, handle: H) -> bool {
        match handle.key() {
            Some(key) => self.entries.lock().contains_key(&key),
            None => false,
        }
    }

    /// Drop the cache's entry for `handle`. No-op if absent.
    ///
    /// A later `get_or_create` with the same handle builds a new wrapper.
    pub fn release(&self, handle: H) {
        let Some(key) = handle.key() else {
            return;
        };

        // The guard is dropped at the end of this statement, so the wrapper's
        // destructor never runs under the lock.
        let removed = self.entries.lock().remove(&key);
        if removed.is_some() {
            self.counters.inc_release();
            log::debug!("{} cache: released {:?}", self.name, key);
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

impl<W, H: HandleKey> fmt::Debug for HandleCache<W, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleCache")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Widget {
        handle: u64,
        tag: &'static str,
    }

    impl FromHandle<u64, &'static str> for Widget {
        fn from_handle(handle: u64, tag: &'static str) -> Result<Self, CacheError> {
            Ok(Widget { handle, tag })
        }
    }

    #[test]
    fn test_same_handle_same_object() {
        let cache: HandleCache<Widget, u64> = HandleCache::new("widget");

        let a = cache.get_or_create(7, "first").unwrap().unwrap();
        let b = cache.get_or_create(7, "second").unwrap().unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.tag, "first");
        assert_eq!(a.handle, 7);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_null_handle_is_rejected_without_constructing() {
        let cache: HandleCache<Widget, u64> = HandleCache::new("widget");
        let built = AtomicUsize::new(0);

        for _ in 0..3 {
            let got = cache
                .get_or_create_with(0, |h| {
                    built.fetch_add(1, Ordering::SeqCst);
                    Widget { handle: h, tag: "null" }
                })
                .unwrap();
            assert!(got.is_none());
        }

        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().null_rejections, 3);
    }

    #[test]
    fn test_failed_construction_inserts_nothing() {
        let cache: HandleCache<Widget, u64> = HandleCache::new("widget");

        let err = cache
            .get_or_try_create_with(9, |_| {
                Err(CacheError::Construction { cache: "widget", reason: "boom".into() })
            })
            .unwrap_err();
        assert_eq!(err.cache(), "widget");
        assert!(!cache.contains(9));
        assert_eq!(cache.stats().failures, 1);

        let ok = cache.get_or_create(9, "retry").unwrap().unwrap();
        assert_eq!(ok.tag, "retry");
    }

    #[test]
    fn test_caller_error_type_propagates() {
        #[derive(Debug, PartialEq)]
        enum DriverFailure {
            Lost,
            Cache(CacheError),
        }

        impl From<CacheError> for DriverFailure {
            fn from(e: CacheError) -> Self {
                DriverFailure::Cache(e)
            }
        }

        let cache: HandleCache<Widget, u64> = HandleCache::new("widget");
        let result = cache.get_or_try_create_with(3, |_| Err(DriverFailure::Lost));
        assert_eq!(result.unwrap_err(), DriverFailure::Lost);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_release_is_idempotent() {
        let cache: HandleCache<Widget, u64> = HandleCache::new("widget");
        let keep = cache.get_or_create(1, "keep").unwrap().unwrap();
        cache.get_or_create(2, "drop").unwrap();

        cache.release(2);
        cache.release(2);
        cache.release(99);
        cache.release(0);

        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&keep, &cache.lookup(1).unwrap()));
        assert_eq!(cache.stats().releases, 1);
    }

    #[test]
    fn test_lookup_never_constructs() {
        let cache: HandleCache<Widget, u64> = HandleCache::new("widget");
        assert!(cache.lookup(5).is_none());
        assert!(cache.lookup(0).is_none());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_teardown_drops_wrappers() {
        let cache: HandleCache<Widget, u64> = HandleCache::new("widget");
        let held = cache.get_or_create(4, "held").unwrap().unwrap();
        assert_eq!(Arc::strong_count(&held), 2);

        drop(cache);
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn test_stats_track_hits_and_constructions() {
        let cache: HandleCache<Widget, u64> = HandleCache::new("widget");
        cache.get_or_create(1, "a").unwrap();
        cache.get_or_create(1, "a").unwrap();
        cache.get_or_create(2, "b").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.constructions, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(cache.name(), "widget");
    }
}
