//! Identity and concurrency guarantees of `HandleCache`.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use zecompat_cache::{define_handle, CacheError, FromHandle, HandleCache, HandleKey};

fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

define_handle! {
    /// Opaque device handle, as a driver would return it.
    pub DeviceHandle
}

#[derive(Debug)]
struct Owner {
    name: &'static str,
}

#[derive(Debug)]
struct Device {
    handle: DeviceHandle,
    owner: Arc<Owner>,
}

impl FromHandle<DeviceHandle, Arc<Owner>> for Device {
    fn from_handle(handle: DeviceHandle, owner: Arc<Owner>) -> Result<Self, CacheError> {
        Ok(Device { handle, owner })
    }
}

#[test]
fn test_device_scenario() {
    init_logging();
    let owner_a = Arc::new(Owner { name: "A" });
    let owner_b = Arc::new(Owner { name: "B" });
    let devices: HandleCache<Device, DeviceHandle> = HandleCache::new("device");

    let h1 = DeviceHandle::from_addr(0x1000);
    let h2 = DeviceHandle::from_addr(0x2000);

    let d1 = devices.get_or_create(h1, owner_a.clone()).unwrap().unwrap();
    let d2 = devices.get_or_create(h2, owner_a.clone()).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&d1, &d2));

    let again = devices.get_or_create(h1, owner_b.clone()).unwrap().unwrap();
    assert!(Arc::ptr_eq(&d1, &again));
    assert_eq!(again.owner.name, "A");

    devices.release(h1);

    let d3 = devices.get_or_create(h1, owner_a.clone()).unwrap().unwrap();
    assert!(!Arc::ptr_eq(&d1, &d3));
    assert_eq!(d3.handle, h1);

    let d2_again = devices.get_or_create(h2, owner_a).unwrap().unwrap();
    assert!(Arc::ptr_eq(&d2, &d2_again));
}

#[test]
fn test_null_device_handle_yields_no_object() {
    init_logging();
    let devices: HandleCache<Device, DeviceHandle> = HandleCache::new("device");
    let owner = Arc::new(Owner { name: "A" });

    for _ in 0..10 {
        let got = devices.get_or_create(DeviceHandle::null(), owner.clone()).unwrap();
        assert!(got.is_none());
    }
    assert!(devices.is_empty());
    // Only our local clone remains; the cache never kept one.
    assert_eq!(Arc::strong_count(&owner), 1);
}

#[test]
fn test_concurrent_first_sight_constructs_once() {
    init_logging();
    const THREADS: usize = 16;

    let devices: Arc<HandleCache<Device, DeviceHandle>> = Arc::new(HandleCache::new("device"));
    let owner = Arc::new(Owner { name: "A" });
    let built = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));
    let handle = DeviceHandle::from_addr(0xabc0);

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let devices = Arc::clone(&devices);
            let owner = Arc::clone(&owner);
            let built = Arc::clone(&built);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                devices
                    .get_or_create_with(handle, |h| {
                        built.fetch_add(1, Ordering::SeqCst);
                        Device { handle: h, owner }
                    })
                    .unwrap()
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<Arc<Device>> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(built.load(Ordering::SeqCst), 1);
    for device in &results[1..] {
        assert!(Arc::ptr_eq(&results[0], device));
    }
    assert_eq!(devices.stats().constructions, 1);
    assert_eq!(devices.stats().hits, (THREADS - 1) as u64);
}

#[test]
fn test_concurrent_distinct_handles_stay_distinct() {
    init_logging();
    const THREADS: usize = 8;
    const PER_THREAD: usize = 64;

    let devices: Arc<HandleCache<Device, DeviceHandle>> = Arc::new(HandleCache::new("device"));
    let owner = Arc::new(Owner { name: "A" });

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let devices = Arc::clone(&devices);
            let owner = Arc::clone(&owner);
            thread::spawn(move || {
                // Every thread walks every handle so both hits and misses race.
                for round in 0..2 {
                    for i in 0..THREADS * PER_THREAD {
                        let i = (i + t * PER_THREAD + round) % (THREADS * PER_THREAD);
                        let h = DeviceHandle::from_addr(0x1000 + i * 0x10);
                        let d = devices.get_or_create(h, owner.clone()).unwrap().unwrap();
                        assert_eq!(d.handle, h);
                    }
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }

    assert_eq!(devices.len(), THREADS * PER_THREAD);
    assert_eq!(devices.stats().constructions, (THREADS * PER_THREAD) as u64);
}

/// A key whose hash is constant, forcing every entry into one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CollidingHandle(u64);

impl Hash for CollidingHandle {
    fn hash<S: Hasher>(&self, state: &mut S) {
        0u8.hash(state);
    }
}

impl HandleKey for CollidingHandle {
    type Key = CollidingHandle;

    fn key(&self) -> Option<CollidingHandle> {
        (self.0 != 0).then_some(*self)
    }
}

#[test]
fn test_colliding_keys_do_not_alias() {
    init_logging();
    let cache: HandleCache<u64, CollidingHandle> = HandleCache::new("colliding");

    let objects: Vec<Arc<u64>> = (1..=32)
        .map(|n| cache.get_or_create_with(CollidingHandle(n), |h| h.0).unwrap().unwrap())
        .collect();

    for (i, obj) in objects.iter().enumerate() {
        assert_eq!(**obj, (i + 1) as u64);
        let again = cache.lookup(CollidingHandle((i + 1) as u64)).unwrap();
        assert!(Arc::ptr_eq(obj, &again));
    }

    cache.release(CollidingHandle(5));
    assert_eq!(cache.len(), 31);
    assert!(Arc::ptr_eq(&objects[5], &cache.lookup(CollidingHandle(6)).unwrap()));
}

#[test]
fn test_release_then_recreate_under_contention() {
    init_logging();
    let devices: Arc<HandleCache<Device, DeviceHandle>> = Arc::new(HandleCache::new("device"));
    let owner = Arc::new(Owner { name: "A" });
    let h = DeviceHandle::from_addr(0x4000);

    let first = devices.get_or_create(h, owner.clone()).unwrap().unwrap();
    devices.release(h);

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let devices = Arc::clone(&devices);
            let owner = Arc::clone(&owner);
            thread::spawn(move || devices.get_or_create(h, owner).unwrap().unwrap())
        })
        .collect();
    let seen: Vec<Arc<Device>> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    for d in &seen {
        assert!(!Arc::ptr_eq(&first, d));
        assert!(Arc::ptr_eq(&seen[0], d));
    }
}
