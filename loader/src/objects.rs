//! Wrapper objects handed to application code.
//!
//! Every wrapper holds the raw driver handle plus a reference to its owner,
//! so property queries can be forwarded through the owning driver's dispatch
//! table. Sessions create them through their handle caches; nothing else
//! constructs one.

use std::fmt;
use std::sync::Arc;

use zecompat_cache::{CacheError, FromHandle};

use crate::ddi::*;
use crate::handles::*;
use crate::registry::DriverEntry;
use crate::result::ZeError;

/// Declares a wrapper `{ handle, owner }` with accessors and its
/// `FromHandle` impl.
macro_rules! owned_wrapper {
    ($(#[$meta:meta])* $name:ident($handle:ty) owned by $owner_field:ident: $owner:ty) => {
        $(#[$meta])*
        pub struct $name {
            handle: $handle,
            $owner_field: Arc<$owner>,
        }

        impl $name {
            pub fn handle(&self) -> $handle {
                self.handle
            }

            pub fn $owner_field(&self) -> &Arc<$owner> {
                &self.$owner_field
            }
        }

        impl FromHandle<$handle, Arc<$owner>> for $name {
            fn from_handle(handle: $handle, $owner_field: Arc<$owner>) -> Result<Self, CacheError> {
                Ok($name { handle, $owner_field })
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("handle", &self.handle)
                    .field(stringify!($owner_field), &self.$owner_field.handle())
                    .finish()
            }
        }
    };
}

/// A driver instance and the dispatch table that serves it.
pub struct Driver {
    handle: DriverHandle,
    entry: DriverEntry,
}

impl Driver {
    pub fn handle(&self) -> DriverHandle {
        self.handle
    }

    /// Name of the registered driver this instance came from.
    pub fn source(&self) -> &str {
        self.entry.name()
    }

    pub fn ddi(&self) -> &dyn DriverDdi {
        self.entry.ddi()
    }

    pub fn api_version(&self) -> Result<ApiVersion, ZeError> {
        self.ddi()
            .driver_api_version(self.handle)
            .map_err(|code| ZeError::driver(code, "zeDriverGetApiVersion"))
    }

    pub fn properties(&self) -> Result<DriverProperties, ZeError> {
        self.ddi()
            .driver_properties(self.handle)
            .map_err(|code| ZeError::driver(code, "zeDriverGetProperties"))
    }
}

impl FromHandle<DriverHandle, DriverEntry> for Driver {
    fn from_handle(handle: DriverHandle, entry: DriverEntry) -> Result<Self, CacheError> {
        Ok(Driver { handle, entry })
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("handle", &self.handle)
            .field("source", &self.source())
            .finish()
    }
}

owned_wrapper! {
    /// A device or sub-device. Sub-devices share the device cache, so a
    /// handle reached through either path is one object.
    Device(DeviceHandle) owned by driver: Driver
}

impl Device {
    pub fn ddi(&self) -> &dyn DriverDdi {
        self.driver.ddi()
    }

    pub fn properties(&self) -> Result<DeviceProperties, ZeError> {
        self.ddi()
            .device_properties(self.handle)
            .map_err(|code| ZeError::driver(code, "zeDeviceGetProperties"))
    }
}

owned_wrapper! {
    MetricGroup(MetricGroupHandle) owned by device: Device
}

impl MetricGroup {
    pub fn ddi(&self) -> &dyn DriverDdi {
        self.device.ddi()
    }

    pub fn properties(&self) -> Result<MetricGroupProperties, ZeError> {
        self.ddi()
            .metric_group_properties(self.handle)
            .map_err(|code| ZeError::driver(code, "zetMetricGroupGetProperties"))
    }
}

owned_wrapper! {
    Metric(MetricHandle) owned by group: MetricGroup
}

impl Metric {
    pub fn ddi(&self) -> &dyn DriverDdi {
        self.group.ddi()
    }

    pub fn properties(&self) -> Result<MetricProperties, ZeError> {
        self.ddi()
            .metric_properties(self.handle)
            .map_err(|code| ZeError::driver(code, "zetMetricGetProperties"))
    }
}

/// A command queue together with the descriptor it was created from.
pub struct CommandQueue {
    handle: CommandQueueHandle,
    device: Arc<Device>,
    desc: CommandQueueDesc,
}

impl CommandQueue {
    pub fn handle(&self) -> CommandQueueHandle {
        self.handle
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn desc(&self) -> &CommandQueueDesc {
        &self.desc
    }

    pub fn ddi(&self) -> &dyn DriverDdi {
        self.device.ddi()
    }
}

impl FromHandle<CommandQueueHandle, (Arc<Device>, CommandQueueDesc)> for CommandQueue {
    fn from_handle(
        handle: CommandQueueHandle,
        (device, desc): (Arc<Device>, CommandQueueDesc),
    ) -> Result<Self, CacheError> {
        Ok(CommandQueue { handle, device, desc })
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandQueue")
            .field("handle", &self.handle)
            .field("device", &self.device.handle())
            .field("desc", &self.desc)
            .finish()
    }
}

owned_wrapper! {
    CommandList(CommandListHandle) owned by device: Device
}

impl CommandList {
    pub fn ddi(&self) -> &dyn DriverDdi {
        self.device.ddi()
    }
}

owned_wrapper! {
    Module(ModuleHandle) owned by device: Device
}

impl Module {
    pub fn ddi(&self) -> &dyn DriverDdi {
        self.device.ddi()
    }
}

/// Event pool; `capacity` is the number of events it was created for.
pub struct EventPool {
    handle: EventPoolHandle,
    driver: Arc<Driver>,
    capacity: u32,
}

impl EventPool {
    pub fn handle(&self) -> EventPoolHandle {
        self.handle
    }

    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn ddi(&self) -> &dyn DriverDdi {
        self.driver.ddi()
    }
}

impl FromHandle<EventPoolHandle, (Arc<Driver>, u32)> for EventPool {
    fn from_handle(handle: EventPoolHandle, (driver, capacity): (Arc<Driver>, u32)) -> Result<Self, CacheError> {
        Ok(EventPool { handle, driver, capacity })
    }
}

impl fmt::Debug for EventPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPool")
            .field("handle", &self.handle)
            .field("capacity", &self.capacity)
            .finish()
    }
}

owned_wrapper! {
    Event(EventHandle) owned by pool: EventPool
}

impl Event {
    pub fn ddi(&self) -> &dyn DriverDdi {
        self.pool.ddi()
    }
}

owned_wrapper! {
    Fence(FenceHandle) owned by queue: CommandQueue
}

impl Fence {
    pub fn ddi(&self) -> &dyn DriverDdi {
        self.queue.ddi()
    }
}
