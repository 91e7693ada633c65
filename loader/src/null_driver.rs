//! In-process driver that fabricates handles instead of talking to hardware.
//!
//! Handles come from one process-wide counter starting at `0x8080_0000`, so
//! several null drivers can sit in one registry without sharing a handle.
//! Enumerations are stable: the devices of a driver
//! (and the sub-devices, metric groups and metrics below them) are fixed the
//! first time they are queried, so repeated queries return the same handles
//! just as real hardware does.

use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;
use serde::Deserialize;

use crate::ddi::*;
use crate::handles::*;
use crate::result::ZeResult;

const FIRST_HANDLE: usize = 0x8080_0000;

/// Shared by every `NullDriver` in the process, so two instances never hand
/// out the same handle.
static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(FIRST_HANDLE);

fn next_addr() -> usize {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed) + 1
}

/// Shape of the fake topology.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NullDriverTopology {
    pub drivers: usize,
    pub devices: usize,
    pub sub_devices: usize,
    pub metric_groups: usize,
    pub metrics: usize,
    pub device_type: DeviceType,
}

impl Default for NullDriverTopology {
    fn default() -> Self {
        NullDriverTopology {
            drivers: 1,
            devices: 1,
            sub_devices: 0,
            metric_groups: 1,
            metrics: 2,
            device_type: DeviceType::Gpu,
        }
    }
}

#[derive(Default)]
struct NullState {
    drivers: Vec<DriverHandle>,
    devices: FxHashMap<usize, Vec<DeviceHandle>>,
    sub_devices: FxHashMap<usize, Vec<DeviceHandle>>,
    device_info: FxHashMap<usize, DeviceProperties>,
    metric_groups: FxHashMap<usize, Vec<MetricGroupHandle>>,
    metrics: FxHashMap<usize, Vec<MetricHandle>>,
    allocations: FxHashMap<usize, (MemAllocProperties, DeviceHandle)>,
    live: FxHashSet<usize>,
    failures: FxHashMap<&'static str, ZeResult>,
}

pub struct NullDriver {
    name: String,
    topology: NullDriverTopology,
    state: Mutex<NullState>,
}

impl NullDriver {
    pub fn new(topology: NullDriverTopology) -> Self {
        Self::named("null", topology)
    }

    pub fn named(name: impl Into<String>, topology: NullDriverTopology) -> Self {
        NullDriver {
            name: name.into(),
            topology,
            state: Mutex::new(NullState::default()),
        }
    }

    pub fn topology(&self) -> &NullDriverTopology {
        &self.topology
    }

    /// Make `entry_point` (e.g. `"zeDeviceGet"`) fail with `code` until
    /// cleared.
    pub fn inject_failure(&self, entry_point: &'static str, code: ZeResult) {
        self.state.lock().failures.insert(entry_point, code);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Record an allocation so `mem_alloc_properties` can report it.
    pub fn track_allocation(&self, ptr: *const c_void, memory_type: MemoryType, device: DeviceHandle) {
        let id = next_addr() as u64;
        self.state
            .lock()
            .allocations
            .insert(ptr as usize, (MemAllocProperties { memory_type, id }, device));
    }

    /// Number of created objects not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.state.lock().live.len()
    }

    fn check(&self, state: &NullState, entry_point: &'static str) -> Result<(), ZeResult> {
        match state.failures.get(entry_point) {
            Some(&code) => Err(code),
            None => Ok(()),
        }
    }

    fn create<H>(&self, entry_point: &'static str, parent_null: bool, wrap: fn(usize) -> H) -> Result<H, ZeResult> {
        let mut state = self.state.lock();
        self.check(&state, entry_point)?;
        if parent_null {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        let addr = next_addr();
        state.live.insert(addr);
        Ok(wrap(addr))
    }

    fn destroy(&self, entry_point: &'static str, addr: usize) -> Result<(), ZeResult> {
        let mut state = self.state.lock();
        self.check(&state, entry_point)?;
        if addr == 0 {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        if state.live.remove(&addr) {
            Ok(())
        } else {
            Err(ZeResult::ErrorInvalidArgument)
        }
    }

    fn make_devices(&self, state: &mut NullState, count: usize, sub_device: bool) -> Vec<DeviceHandle> {
        (0..count)
            .map(|i| {
                let addr = next_addr();
                state.device_info.insert(
                    addr,
                    DeviceProperties {
                        name: if sub_device {
                            format!("Null Sub-Device {}", i)
                        } else {
                            format!("Null Device {}", i)
                        },
                        device_type: self.topology.device_type,
                        vendor_id: 0x8086,
                        device_id: 0,
                        is_sub_device: sub_device,
                        sub_device_id: if sub_device { i as u32 } else { 0 },
                    },
                );
                DeviceHandle::from_addr(addr)
            })
            .collect()
    }
}

impl DriverDdi for NullDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver_get(&self) -> Result<Vec<DriverHandle>, ZeResult> {
        let mut state = self.state.lock();
        self.check(&state, "zeDriverGet")?;
        if state.drivers.is_empty() {
            let handles: Vec<DriverHandle> = (0..self.topology.drivers)
                .map(|_| DriverHandle::from_addr(next_addr()))
                .collect();
            state.drivers = handles;
        }
        Ok(state.drivers.clone())
    }

    fn driver_api_version(&self, driver: DriverHandle) -> Result<ApiVersion, ZeResult> {
        let state = self.state.lock();
        self.check(&state, "zeDriverGetApiVersion")?;
        if driver.is_null() {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        Ok(ApiVersion::V1_0)
    }

    fn driver_properties(&self, driver: DriverHandle) -> Result<DriverProperties, ZeResult> {
        let state = self.state.lock();
        self.check(&state, "zeDriverGetProperties")?;
        if driver.is_null() {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        Ok(DriverProperties::default())
    }

    fn device_get(&self, driver: DriverHandle) -> Result<Vec<DeviceHandle>, ZeResult> {
        let mut state = self.state.lock();
        self.check(&state, "zeDeviceGet")?;
        if driver.is_null() {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        if let Some(devices) = state.devices.get(&driver.addr()) {
            return Ok(devices.clone());
        }
        let devices = self.make_devices(&mut state, self.topology.devices, false);
        state.devices.insert(driver.addr(), devices.clone());
        Ok(devices)
    }

    fn device_sub_devices(&self, device: DeviceHandle) -> Result<Vec<DeviceHandle>, ZeResult> {
        let mut state = self.state.lock();
        self.check(&state, "zeDeviceGetSubDevices")?;
        if device.is_null() {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        if let Some(subs) = state.sub_devices.get(&device.addr()) {
            return Ok(subs.clone());
        }
        // Sub-devices don't split further.
        let is_sub = state
            .device_info
            .get(&device.addr())
            .map(|p| p.is_sub_device)
            .unwrap_or(false);
        let count = if is_sub { 0 } else { self.topology.sub_devices };
        let subs = self.make_devices(&mut state, count, true);
        state.sub_devices.insert(device.addr(), subs.clone());
        Ok(subs)
    }

    fn device_properties(&self, device: DeviceHandle) -> Result<DeviceProperties, ZeResult> {
        let state = self.state.lock();
        self.check(&state, "zeDeviceGetProperties")?;
        state
            .device_info
            .get(&device.addr())
            .cloned()
            .ok_or(ZeResult::ErrorInvalidNullHandle)
    }

    fn mem_alloc_properties(
        &self,
        driver: DriverHandle,
        ptr: *const c_void,
    ) -> Result<(MemAllocProperties, DeviceHandle), ZeResult> {
        let state = self.state.lock();
        self.check(&state, "zeDriverGetMemAllocProperties")?;
        if driver.is_null() {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        if ptr.is_null() {
            return Err(ZeResult::ErrorInvalidNullPointer);
        }
        Ok(state.allocations.get(&(ptr as usize)).copied().unwrap_or((
            MemAllocProperties {
                memory_type: MemoryType::Unknown,
                id: 0,
            },
            DeviceHandle::null(),
        )))
    }

    fn command_queue_create(
        &self,
        device: DeviceHandle,
        _desc: &CommandQueueDesc,
    ) -> Result<CommandQueueHandle, ZeResult> {
        self.create("zeCommandQueueCreate", device.is_null(), CommandQueueHandle::from_addr)
    }

    fn command_queue_destroy(&self, queue: CommandQueueHandle) -> Result<(), ZeResult> {
        self.destroy("zeCommandQueueDestroy", queue.addr())
    }

    fn command_list_create(
        &self,
        device: DeviceHandle,
        _desc: &CommandListDesc,
    ) -> Result<CommandListHandle, ZeResult> {
        self.create("zeCommandListCreate", device.is_null(), CommandListHandle::from_addr)
    }

    fn command_list_destroy(&self, list: CommandListHandle) -> Result<(), ZeResult> {
        self.destroy("zeCommandListDestroy", list.addr())
    }

    fn module_create(&self, device: DeviceHandle, desc: &ModuleDesc) -> Result<ModuleHandle, ZeResult> {
        if desc.input.is_empty() {
            return Err(ZeResult::ErrorInvalidArgument);
        }
        self.create("zeModuleCreate", device.is_null(), ModuleHandle::from_addr)
    }

    fn module_destroy(&self, module: ModuleHandle) -> Result<(), ZeResult> {
        self.destroy("zeModuleDestroy", module.addr())
    }

    fn event_pool_create(
        &self,
        driver: DriverHandle,
        desc: &EventPoolDesc,
        _devices: &[DeviceHandle],
    ) -> Result<EventPoolHandle, ZeResult> {
        if desc.count == 0 {
            return Err(ZeResult::ErrorInvalidArgument);
        }
        self.create("zeEventPoolCreate", driver.is_null(), EventPoolHandle::from_addr)
    }

    fn event_pool_destroy(&self, pool: EventPoolHandle) -> Result<(), ZeResult> {
        self.destroy("zeEventPoolDestroy", pool.addr())
    }

    fn event_create(&self, pool: EventPoolHandle, _desc: &EventDesc) -> Result<EventHandle, ZeResult> {
        self.create("zeEventCreate", pool.is_null(), EventHandle::from_addr)
    }

    fn event_destroy(&self, event: EventHandle) -> Result<(), ZeResult> {
        self.destroy("zeEventDestroy", event.addr())
    }

    fn fence_create(&self, queue: CommandQueueHandle, _desc: &FenceDesc) -> Result<FenceHandle, ZeResult> {
        self.create("zeFenceCreate", queue.is_null(), FenceHandle::from_addr)
    }

    fn fence_destroy(&self, fence: FenceHandle) -> Result<(), ZeResult> {
        self.destroy("zeFenceDestroy", fence.addr())
    }

    fn metric_group_get(&self, device: DeviceHandle) -> Result<Vec<MetricGroupHandle>, ZeResult> {
        let mut state = self.state.lock();
        self.check(&state, "zetMetricGroupGet")?;
        if device.is_null() {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        let count = self.topology.metric_groups;
        let groups = state
            .metric_groups
            .entry(device.addr())
            .or_insert_with(|| (0..count).map(|_| MetricGroupHandle::from_addr(next_addr())).collect())
            .clone();
        Ok(groups)
    }

    fn metric_group_properties(&self, group: MetricGroupHandle) -> Result<MetricGroupProperties, ZeResult> {
        let state = self.state.lock();
        self.check(&state, "zetMetricGroupGetProperties")?;
        if group.is_null() {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        Ok(MetricGroupProperties {
            name: format!("NullGroup@{:#x}", group.addr()),
            description: "null driver metric group".to_string(),
            metric_count: self.topology.metrics as u32,
        })
    }

    fn metric_get(&self, group: MetricGroupHandle) -> Result<Vec<MetricHandle>, ZeResult> {
        let mut state = self.state.lock();
        self.check(&state, "zetMetricGet")?;
        if group.is_null() {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        let count = self.topology.metrics;
        let metrics = state
            .metrics
            .entry(group.addr())
            .or_insert_with(|| (0..count).map(|_| MetricHandle::from_addr(next_addr())).collect())
            .clone();
        Ok(metrics)
    }

    fn metric_properties(&self, metric: MetricHandle) -> Result<MetricProperties, ZeResult> {
        let state = self.state.lock();
        self.check(&state, "zetMetricGetProperties")?;
        if metric.is_null() {
            return Err(ZeResult::ErrorInvalidNullHandle);
        }
        Ok(MetricProperties {
            name: format!("NullMetric@{:#x}", metric.addr()),
            description: "null driver metric".to_string(),
            units: "events".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_is_stable() {
        let driver = NullDriver::new(NullDriverTopology {
            devices: 2,
            ..Default::default()
        });
        let drivers = driver.driver_get().unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(driver.driver_get().unwrap(), drivers);

        let first = driver.device_get(drivers[0]).unwrap();
        let second = driver.device_get(drivers[0]).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_handles_start_above_base() {
        let driver = NullDriver::new(NullDriverTopology::default());
        let drivers = driver.driver_get().unwrap();
        assert!(drivers[0].addr() > FIRST_HANDLE);
    }

    #[test]
    fn test_instances_never_share_handles() {
        let a = NullDriver::named("a", NullDriverTopology::default());
        let b = NullDriver::named("b", NullDriverTopology::default());

        let drv_a = a.driver_get().unwrap()[0];
        let drv_b = b.driver_get().unwrap()[0];
        assert_ne!(drv_a, drv_b);

        let dev_a = a.device_get(drv_a).unwrap()[0];
        let dev_b = b.device_get(drv_b).unwrap()[0];
        assert_ne!(dev_a, dev_b);
    }

    #[test]
    fn test_sub_devices_do_not_nest() {
        let driver = NullDriver::new(NullDriverTopology {
            sub_devices: 2,
            ..Default::default()
        });
        let drv = driver.driver_get().unwrap()[0];
        let dev = driver.device_get(drv).unwrap()[0];
        let subs = driver.device_sub_devices(dev).unwrap();
        assert_eq!(subs.len(), 2);
        assert!(driver.device_properties(subs[0]).unwrap().is_sub_device);
        assert!(driver.device_sub_devices(subs[0]).unwrap().is_empty());
    }

    #[test]
    fn test_create_destroy_tracks_live_objects() {
        let driver = NullDriver::new(NullDriverTopology::default());
        let drv = driver.driver_get().unwrap()[0];
        let dev = driver.device_get(drv).unwrap()[0];

        let queue = driver.command_queue_create(dev, &CommandQueueDesc::default()).unwrap();
        assert_eq!(driver.live_objects(), 1);
        driver.command_queue_destroy(queue).unwrap();
        assert_eq!(driver.live_objects(), 0);
        assert_eq!(
            driver.command_queue_destroy(queue),
            Err(ZeResult::ErrorInvalidArgument)
        );
    }

    #[test]
    fn test_injected_failure() {
        let driver = NullDriver::new(NullDriverTopology::default());
        driver.inject_failure("zeDriverGet", ZeResult::ErrorDeviceLost);
        assert_eq!(driver.driver_get(), Err(ZeResult::ErrorDeviceLost));
        driver.clear_failures();
        assert!(driver.driver_get().is_ok());
    }

    #[test]
    fn test_untracked_allocation_has_no_device() {
        let driver = NullDriver::new(NullDriverTopology::default());
        let drv = driver.driver_get().unwrap()[0];
        let value = 0u32;
        let (props, device) = driver
            .mem_alloc_properties(drv, &value as *const u32 as *const c_void)
            .unwrap();
        assert_eq!(props.memory_type, MemoryType::Unknown);
        assert!(device.is_null());
    }
}
