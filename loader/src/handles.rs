//! Raw driver handle types, one per entity kind.

use zecompat_cache::define_handle;

define_handle! {
    /// Driver instance reported by `zeDriverGet`.
    pub DriverHandle
}
define_handle! {
    /// Device or sub-device.
    pub DeviceHandle
}
define_handle!(pub CommandQueueHandle);
define_handle!(pub CommandListHandle);
define_handle!(pub ModuleHandle);
define_handle!(pub EventPoolHandle);
define_handle!(pub EventHandle);
define_handle!(pub FenceHandle);
define_handle! {
    /// Metric group exposed by a device's tools interface.
    pub MetricGroupHandle
}
define_handle!(pub MetricHandle);
