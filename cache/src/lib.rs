//! Handle-to-wrapper identity cache
//!
//! Drivers name their resources with opaque handles. Application-facing code
//! wants objects instead, and it wants the *same* object every time the same
//! handle comes back from an enumeration call. [`HandleCache`] provides that
//! mapping for one entity type:
//!
//! - a non-null handle maps to exactly one wrapper until it is released
//! - the null handle never creates an entry
//! - concurrent callers with the same handle see a single construction
//!
//! ```rust,ignore
//! use zecompat_cache::{define_handle, HandleCache};
//!
//! define_handle!(pub DeviceHandle);
//!
//! struct Device { handle: DeviceHandle }
//!
//! let devices: HandleCache<Device, DeviceHandle> = HandleCache::new("device");
//! let h = DeviceHandle::from_addr(0x1000);
//! let a = devices.get_or_create_with(h, |handle| Device { handle })?.unwrap();
//! let b = devices.get_or_create_with(h, |handle| Device { handle })?.unwrap();
//! assert!(std::sync::Arc::ptr_eq(&a, &b));
//! ```

mod cache;
mod error;
mod handle;
mod key;
mod stats;

pub use cache::{FromHandle, HandleCache};
pub use error::CacheError;
pub use key::HandleKey;
pub use stats::CacheStats;
