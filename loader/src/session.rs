//! Loader session: process-wide state for one client of the API.
//!
//! A session owns the drivers it fans out to and one [`HandleCache`] per
//! entity type. Every query that hands driver handles back to the caller
//! goes through the matching cache, so the caller sees one stable object per
//! handle for as long as the session lives. Dropping the session drops every
//! cached wrapper.

use std::ffi::c_void;
use std::sync::Arc;

use zecompat_cache::{CacheStats, FromHandle, HandleCache, HandleKey};

use crate::config::SessionConfig;
use crate::ddi::*;
use crate::handles::*;
use crate::null_driver::NullDriver;
use crate::objects::*;
use crate::registry::{DriverEntry, DriverRegistry};
use crate::result::{ZeError, ZeResult};

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    entries: Vec<DriverEntry>,
    drivers: HandleCache<Driver, DriverHandle>,
    devices: HandleCache<Device, DeviceHandle>,
    metric_groups: HandleCache<MetricGroup, MetricGroupHandle>,
    metrics: HandleCache<Metric, MetricHandle>,
    command_queues: HandleCache<CommandQueue, CommandQueueHandle>,
    command_lists: HandleCache<CommandList, CommandListHandle>,
    modules: HandleCache<Module, ModuleHandle>,
    event_pools: HandleCache<EventPool, EventPoolHandle>,
    events: HandleCache<Event, EventHandle>,
    fences: HandleCache<Fence, FenceHandle>,
}

impl Session {
    /// Start a session over `registry`. With `null_driver` set in `config`
    /// the null driver is registered first, unless the registry already has
    /// one.
    ///
    /// Fails with `ErrorUninitialized` when no driver is available.
    pub fn new(registry: DriverRegistry, config: SessionConfig) -> Result<Self, ZeError> {
        let mut entries = Vec::with_capacity(registry.len() + 1);

        if config.null_driver && !registry.contains("null") {
            let mut null = DriverRegistry::new();
            null.register(Arc::new(NullDriver::new(config.null_driver_topology.clone())))?;
            entries.extend(null.entries().cloned());
        }
        entries.extend(registry.entries().cloned());

        if entries.is_empty() {
            return Err(ZeError::driver(ZeResult::ErrorUninitialized, "zeInit"));
        }

        log::info!(
            "session started with {} driver(s): {}",
            entries.len(),
            entries.iter().map(DriverEntry::name).collect::<Vec<_>>().join(", ")
        );

        Ok(Session {
            config,
            entries,
            drivers: HandleCache::new("driver"),
            devices: HandleCache::new("device"),
            metric_groups: HandleCache::new("metric group"),
            metrics: HandleCache::new("metric"),
            command_queues: HandleCache::new("command queue"),
            command_lists: HandleCache::new("command list"),
            modules: HandleCache::new("module"),
            event_pools: HandleCache::new("event pool"),
            events: HandleCache::new("event"),
            fences: HandleCache::new("fence"),
        })
    }

    /// Session with only the drivers `config` enables.
    pub fn from_config(config: SessionConfig) -> Result<Self, ZeError> {
        Session::new(DriverRegistry::new(), config)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn driver_names(&self) -> Vec<&str> {
        self.entries.iter().map(DriverEntry::name).collect()
    }

    // -----------------------------------------------------------------------
    // Enumeration
    // -----------------------------------------------------------------------

    /// All driver instances across every registered driver, in registration
    /// order.
    pub fn drivers(&self) -> Result<Vec<Arc<Driver>>, ZeError> {
        const FUNCTION: &str = "zeDriverGet";
        self.trace(FUNCTION);

        let mut out = Vec::new();
        for entry in &self.entries {
            let handles = entry
                .ddi()
                .driver_get()
                .map_err(|code| ZeError::driver(code, FUNCTION))?;
            out.extend(resolve_all(&self.drivers, handles, entry, FUNCTION)?);
        }
        Ok(out)
    }

    pub fn devices(&self, driver: &Arc<Driver>) -> Result<Vec<Arc<Device>>, ZeError> {
        const FUNCTION: &str = "zeDeviceGet";
        self.trace(FUNCTION);
        self.validate(&self.drivers, driver, driver.handle(), FUNCTION)?;

        let handles = driver
            .ddi()
            .device_get(driver.handle())
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        resolve_all(&self.devices, handles, driver, FUNCTION)
    }

    /// Sub-devices of `device`. They live in the same cache as devices.
    pub fn sub_devices(&self, device: &Arc<Device>) -> Result<Vec<Arc<Device>>, ZeError> {
        const FUNCTION: &str = "zeDeviceGetSubDevices";
        self.trace(FUNCTION);
        self.validate(&self.devices, device, device.handle(), FUNCTION)?;

        let handles = device
            .ddi()
            .device_sub_devices(device.handle())
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        resolve_all(&self.devices, handles, device.driver(), FUNCTION)
    }

    /// Properties of the allocation containing `ptr` and the device that owns
    /// it. The device is `None` for allocations not tied to a device.
    pub fn mem_alloc_properties(
        &self,
        driver: &Arc<Driver>,
        ptr: *const c_void,
    ) -> Result<(MemAllocProperties, Option<Arc<Device>>), ZeError> {
        const FUNCTION: &str = "zeDriverGetMemAllocProperties";
        self.trace(FUNCTION);
        self.validate(&self.drivers, driver, driver.handle(), FUNCTION)?;

        let (props, device) = driver
            .ddi()
            .mem_alloc_properties(driver.handle(), ptr)
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        let device = resolve(&self.devices, device, Arc::clone(driver), FUNCTION)?;
        Ok((props, device))
    }

    pub fn metric_groups(&self, device: &Arc<Device>) -> Result<Vec<Arc<MetricGroup>>, ZeError> {
        const FUNCTION: &str = "zetMetricGroupGet";
        self.trace(FUNCTION);
        self.validate(&self.devices, device, device.handle(), FUNCTION)?;

        let handles = device
            .ddi()
            .metric_group_get(device.handle())
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        resolve_all(&self.metric_groups, handles, device, FUNCTION)
    }

    pub fn metrics(&self, group: &Arc<MetricGroup>) -> Result<Vec<Arc<Metric>>, ZeError> {
        const FUNCTION: &str = "zetMetricGet";
        self.trace(FUNCTION);
        self.validate(&self.metric_groups, group, group.handle(), FUNCTION)?;

        let handles = group
            .ddi()
            .metric_get(group.handle())
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        resolve_all(&self.metrics, handles, group, FUNCTION)
    }

    // -----------------------------------------------------------------------
    // Create / destroy
    // -----------------------------------------------------------------------

    pub fn create_command_queue(
        &self,
        device: &Arc<Device>,
        desc: CommandQueueDesc,
    ) -> Result<Arc<CommandQueue>, ZeError> {
        const FUNCTION: &str = "zeCommandQueueCreate";
        self.trace(FUNCTION);
        self.validate(&self.devices, device, device.handle(), FUNCTION)?;

        let handle = device
            .ddi()
            .command_queue_create(device.handle(), &desc)
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        adopt(&self.command_queues, handle, (Arc::clone(device), desc), FUNCTION)
    }

    pub fn destroy_command_queue(&self, queue: Arc<CommandQueue>) -> Result<(), ZeError> {
        self.destroy(&self.command_queues, &queue, queue.handle(), "zeCommandQueueDestroy", |h| {
            queue.ddi().command_queue_destroy(h)
        })
    }

    pub fn create_command_list(
        &self,
        device: &Arc<Device>,
        desc: CommandListDesc,
    ) -> Result<Arc<CommandList>, ZeError> {
        const FUNCTION: &str = "zeCommandListCreate";
        self.trace(FUNCTION);
        self.validate(&self.devices, device, device.handle(), FUNCTION)?;

        let handle = device
            .ddi()
            .command_list_create(device.handle(), &desc)
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        adopt(&self.command_lists, handle, Arc::clone(device), FUNCTION)
    }

    pub fn destroy_command_list(&self, list: Arc<CommandList>) -> Result<(), ZeError> {
        self.destroy(&self.command_lists, &list, list.handle(), "zeCommandListDestroy", |h| {
            list.ddi().command_list_destroy(h)
        })
    }

    pub fn create_module(&self, device: &Arc<Device>, desc: &ModuleDesc) -> Result<Arc<Module>, ZeError> {
        const FUNCTION: &str = "zeModuleCreate";
        self.trace(FUNCTION);
        self.validate(&self.devices, device, device.handle(), FUNCTION)?;

        let handle = device
            .ddi()
            .module_create(device.handle(), desc)
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        adopt(&self.modules, handle, Arc::clone(device), FUNCTION)
    }

    pub fn destroy_module(&self, module: Arc<Module>) -> Result<(), ZeError> {
        self.destroy(&self.modules, &module, module.handle(), "zeModuleDestroy", |h| {
            module.ddi().module_destroy(h)
        })
    }

    /// Create an event pool visible to `devices` (all devices when empty).
    pub fn create_event_pool(
        &self,
        driver: &Arc<Driver>,
        desc: EventPoolDesc,
        devices: &[Arc<Device>],
    ) -> Result<Arc<EventPool>, ZeError> {
        const FUNCTION: &str = "zeEventPoolCreate";
        self.trace(FUNCTION);
        self.validate(&self.drivers, driver, driver.handle(), FUNCTION)?;
        for device in devices {
            self.validate(&self.devices, device, device.handle(), FUNCTION)?;
        }

        let device_handles: Vec<DeviceHandle> = devices.iter().map(|d| d.handle()).collect();
        let handle = driver
            .ddi()
            .event_pool_create(driver.handle(), &desc, &device_handles)
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        adopt(&self.event_pools, handle, (Arc::clone(driver), desc.count), FUNCTION)
    }

    pub fn destroy_event_pool(&self, pool: Arc<EventPool>) -> Result<(), ZeError> {
        self.destroy(&self.event_pools, &pool, pool.handle(), "zeEventPoolDestroy", |h| {
            pool.ddi().event_pool_destroy(h)
        })
    }

    pub fn create_event(&self, pool: &Arc<EventPool>, desc: EventDesc) -> Result<Arc<Event>, ZeError> {
        const FUNCTION: &str = "zeEventCreate";
        self.trace(FUNCTION);
        self.validate(&self.event_pools, pool, pool.handle(), FUNCTION)?;
        if self.config.validation && desc.index >= pool.capacity() {
            return Err(self.reject(
                FUNCTION,
                format!("event index {} out of range for pool of {}", desc.index, pool.capacity()),
            ));
        }

        let handle = pool
            .ddi()
            .event_create(pool.handle(), &desc)
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        adopt(&self.events, handle, Arc::clone(pool), FUNCTION)
    }

    pub fn destroy_event(&self, event: Arc<Event>) -> Result<(), ZeError> {
        self.destroy(&self.events, &event, event.handle(), "zeEventDestroy", |h| {
            event.ddi().event_destroy(h)
        })
    }

    pub fn create_fence(&self, queue: &Arc<CommandQueue>, desc: FenceDesc) -> Result<Arc<Fence>, ZeError> {
        const FUNCTION: &str = "zeFenceCreate";
        self.trace(FUNCTION);
        self.validate(&self.command_queues, queue, queue.handle(), FUNCTION)?;

        let handle = queue
            .ddi()
            .fence_create(queue.handle(), &desc)
            .map_err(|code| ZeError::driver(code, FUNCTION))?;
        adopt(&self.fences, handle, Arc::clone(queue), FUNCTION)
    }

    pub fn destroy_fence(&self, fence: Arc<Fence>) -> Result<(), ZeError> {
        self.destroy(&self.fences, &fence, fence.handle(), "zeFenceDestroy", |h| {
            fence.ddi().fence_destroy(h)
        })
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    /// Counters of every cache, in a fixed order.
    pub fn stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.drivers.name(), self.drivers.stats()),
            (self.devices.name(), self.devices.stats()),
            (self.metric_groups.name(), self.metric_groups.stats()),
            (self.metrics.name(), self.metrics.stats()),
            (self.command_queues.name(), self.command_queues.stats()),
            (self.command_lists.name(), self.command_lists.stats()),
            (self.modules.name(), self.modules.stats()),
            (self.event_pools.name(), self.event_pools.stats()),
            (self.events.name(), self.events.stats()),
            (self.fences.name(), self.fences.stats()),
        ]
    }

    /// Number of live wrapper objects across all caches.
    pub fn live_objects(&self) -> usize {
        self.drivers.len()
            + self.devices.len()
            + self.metric_groups.len()
            + self.metrics.len()
            + self.command_queues.len()
            + self.command_lists.len()
            + self.modules.len()
            + self.event_pools.len()
            + self.events.len()
            + self.fences.len()
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn trace(&self, function: &'static str) {
        if self.config.trace_calls {
            tracing::trace!(target: "zecompat::api", function = function, "forwarding call");
        }
    }

    fn reject(&self, function: &'static str, message: String) -> ZeError {
        log::warn!("{}: {}", function, message);
        ZeError::Validation { function, message }
    }

    /// In validation mode, check that `object` is the wrapper this session
    /// issued for `handle`.
    fn validate<W, H: HandleKey>(
        &self,
        cache: &HandleCache<W, H>,
        object: &Arc<W>,
        handle: H,
        function: &'static str,
    ) -> Result<(), ZeError> {
        if !self.config.validation {
            return Ok(());
        }
        match cache.lookup(handle) {
            Some(issued) if Arc::ptr_eq(&issued, object) => Ok(()),
            _ => Err(self.reject(
                function,
                format!("{} object was not issued by this session", cache.name()),
            )),
        }
    }

    /// Forward a destroy call, then release the cache entry whatever the
    /// driver answered.
    fn destroy<W, H, F>(
        &self,
        cache: &HandleCache<W, H>,
        object: &Arc<W>,
        handle: H,
        function: &'static str,
        forward: F,
    ) -> Result<(), ZeError>
    where
        H: HandleKey,
        F: FnOnce(H) -> Result<(), ZeResult>,
    {
        self.trace(function);
        self.validate(cache, object, handle, function)?;

        let result = forward(handle);
        cache.release(handle);
        result.map_err(|code| ZeError::driver(code, function))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        log::info!("session closed with {} live object(s)", self.live_objects());
    }
}

fn resolve<W, H, A>(
    cache: &HandleCache<W, H>,
    handle: H,
    args: A,
    function: &'static str,
) -> Result<Option<Arc<W>>, ZeError>
where
    H: HandleKey,
    W: FromHandle<H, A>,
{
    cache.get_or_create(handle, args).map_err(|e| {
        log::error!("{}: {}", function, e);
        ZeError::cache(e, function)
    })
}

/// Resolve a whole enumeration. Any cache failure fails the call; null
/// handles are skipped.
fn resolve_all<W, H, A>(
    cache: &HandleCache<W, H>,
    handles: Vec<H>,
    args: &A,
    function: &'static str,
) -> Result<Vec<Arc<W>>, ZeError>
where
    H: HandleKey,
    A: Clone,
    W: FromHandle<H, A>,
{
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        match resolve(cache, handle, args.clone(), function)? {
            Some(object) => out.push(object),
            None => log::warn!("{}: driver returned a null {} handle, skipped", function, cache.name()),
        }
    }
    Ok(out)
}

/// Wrap the handle a create call just returned.
fn adopt<W, H, A>(cache: &HandleCache<W, H>, handle: H, args: A, function: &'static str) -> Result<Arc<W>, ZeError>
where
    H: HandleKey,
    W: FromHandle<H, A>,
{
    resolve(cache, handle, args, function)?.ok_or_else(|| {
        log::warn!("{}: driver returned a null {} handle", function, cache.name());
        ZeError::driver(ZeResult::ErrorInvalidNullHandle, function)
    })
}
