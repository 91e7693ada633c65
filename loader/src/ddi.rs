//! Driver dispatch table: the seam between the loader and a native driver.
//!
//! Each method forwards one C entry point. The C `(pCount, phHandles)`
//! two-call idiom becomes a `Vec` return. Entry points a driver doesn't
//! provide fall back to `ErrorUnsupportedFeature`, the same answer the C
//! loader gives for a null function pointer.

use std::ffi::c_void;

use serde::{Deserialize, Serialize};

use crate::handles::*;
use crate::result::ZeResult;

/// API version reported by a driver, packed as `major << 16 | minor` on the
/// wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ApiVersion {
    pub major: u16,
    pub minor: u16,
}

impl ApiVersion {
    pub const V1_0: ApiVersion = ApiVersion { major: 1, minor: 0 };

    pub fn from_raw(raw: u32) -> Self {
        ApiVersion {
            major: (raw >> 16) as u16,
            minor: (raw & 0xffff) as u16,
        }
    }

    pub fn as_raw(self) -> u32 {
        ((self.major as u32) << 16) | self.minor as u32
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriverProperties {
    pub uuid: [u8; 16],
    pub driver_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Gpu,
    Cpu,
    Fpga,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProperties {
    pub name: String,
    pub device_type: DeviceType,
    pub vendor_id: u32,
    pub device_id: u32,
    pub is_sub_device: bool,
    pub sub_device_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Unknown,
    Host,
    Device,
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemAllocProperties {
    pub memory_type: MemoryType,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricGroupProperties {
    pub name: String,
    pub description: String,
    pub metric_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricProperties {
    pub name: String,
    pub description: String,
    pub units: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandQueueMode {
    #[default]
    Default,
    Synchronous,
    Asynchronous,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandQueueDesc {
    pub ordinal: u32,
    pub mode: CommandQueueMode,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandListDesc {
    pub flags: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModuleFormat {
    #[default]
    IlSpirv,
    Native,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDesc {
    pub format: ModuleFormat,
    pub input: Vec<u8>,
    pub build_flags: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventPoolDesc {
    pub count: u32,
    pub host_visible: bool,
}

impl Default for EventPoolDesc {
    fn default() -> Self {
        EventPoolDesc {
            count: 1,
            host_visible: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventDesc {
    pub index: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceDesc {
    pub flags: u32,
}

fn unsupported<T>() -> Result<T, ZeResult> {
    Err(ZeResult::ErrorUnsupportedFeature)
}

/// Function table a native driver exposes to the loader.
///
/// Implementations must be callable from any thread.
#[allow(unused_variables)]
pub trait DriverDdi: Send + Sync {
    /// Registry name, e.g. `"null"`.
    fn name(&self) -> &str;

    /// Called once when the driver is registered (`zeInit`).
    fn init(&self) -> Result<(), ZeResult> {
        Ok(())
    }

    fn driver_get(&self) -> Result<Vec<DriverHandle>, ZeResult>;

    fn driver_api_version(&self, driver: DriverHandle) -> Result<ApiVersion, ZeResult> {
        unsupported()
    }

    fn driver_properties(&self, driver: DriverHandle) -> Result<DriverProperties, ZeResult> {
        unsupported()
    }

    fn device_get(&self, driver: DriverHandle) -> Result<Vec<DeviceHandle>, ZeResult>;

    fn device_sub_devices(&self, device: DeviceHandle) -> Result<Vec<DeviceHandle>, ZeResult> {
        unsupported()
    }

    fn device_properties(&self, device: DeviceHandle) -> Result<DeviceProperties, ZeResult> {
        unsupported()
    }

    /// Properties of the allocation containing `ptr`, plus the device it
    /// belongs to (null for host allocations). `ptr` is only compared, never
    /// read.
    fn mem_alloc_properties(
        &self,
        driver: DriverHandle,
        ptr: *const c_void,
    ) -> Result<(MemAllocProperties, DeviceHandle), ZeResult> {
        unsupported()
    }

    fn command_queue_create(
        &self,
        device: DeviceHandle,
        desc: &CommandQueueDesc,
    ) -> Result<CommandQueueHandle, ZeResult> {
        unsupported()
    }

    fn command_queue_destroy(&self, queue: CommandQueueHandle) -> Result<(), ZeResult> {
        unsupported()
    }

    fn command_list_create(
        &self,
        device: DeviceHandle,
        desc: &CommandListDesc,
    ) -> Result<CommandListHandle, ZeResult> {
        unsupported()
    }

    fn command_list_destroy(&self, list: CommandListHandle) -> Result<(), ZeResult> {
        unsupported()
    }

    fn module_create(&self, device: DeviceHandle, desc: &ModuleDesc) -> Result<ModuleHandle, ZeResult> {
        unsupported()
    }

    fn module_destroy(&self, module: ModuleHandle) -> Result<(), ZeResult> {
        unsupported()
    }

    fn event_pool_create(
        &self,
        driver: DriverHandle,
        desc: &EventPoolDesc,
        devices: &[DeviceHandle],
    ) -> Result<EventPoolHandle, ZeResult> {
        unsupported()
    }

    fn event_pool_destroy(&self, pool: EventPoolHandle) -> Result<(), ZeResult> {
        unsupported()
    }

    fn event_create(&self, pool: EventPoolHandle, desc: &EventDesc) -> Result<EventHandle, ZeResult> {
        unsupported()
    }

    fn event_destroy(&self, event: EventHandle) -> Result<(), ZeResult> {
        unsupported()
    }

    fn fence_create(&self, queue: CommandQueueHandle, desc: &FenceDesc) -> Result<FenceHandle, ZeResult> {
        unsupported()
    }

    fn fence_destroy(&self, fence: FenceHandle) -> Result<(), ZeResult> {
        unsupported()
    }

    fn metric_group_get(&self, device: DeviceHandle) -> Result<Vec<MetricGroupHandle>, ZeResult> {
        unsupported()
    }

    fn metric_group_properties(&self, group: MetricGroupHandle) -> Result<MetricGroupProperties, ZeResult> {
        unsupported()
    }

    fn metric_get(&self, group: MetricGroupHandle) -> Result<Vec<MetricHandle>, ZeResult> {
        unsupported()
    }

    fn metric_properties(&self, metric: MetricHandle) -> Result<MetricProperties, ZeResult> {
        unsupported()
    }
}
