//! Loader layer for a Level-Zero-style compatibility API.
//!
//! A [`Session`] fans calls out to the registered drivers and hands back
//! wrapper objects ([`Driver`], [`Device`], [`CommandQueue`], ...). Wrappers
//! are interned per raw handle, so asking twice for the same device yields
//! the same `Arc` until the handle is destroyed.
//!
//! ```no_run
//! use zecompat_loader::{Session, SessionConfig};
//!
//! let config = SessionConfig { null_driver: true, ..Default::default() };
//! let session = Session::from_config(config)?;
//! for driver in session.drivers()? {
//!     for device in session.devices(&driver)? {
//!         println!("{:?}", device.properties()?);
//!     }
//! }
//! # Ok::<(), zecompat_loader::ZeError>(())
//! ```

pub mod config;
pub mod ddi;
pub mod handles;
pub mod logging;
pub mod null_driver;
pub mod objects;
pub mod registry;
pub mod result;
pub mod session;

pub use config::{SessionConfig, CONFIG_FILE_NAME};
pub use null_driver::{NullDriver, NullDriverTopology};
pub use objects::{
    CommandList, CommandQueue, Device, Driver, Event, EventPool, Fence, Metric, MetricGroup, Module,
};
pub use registry::{DriverEntry, DriverRegistry};
pub use result::{ZeError, ZeResult};
pub use session::Session;
pub use zecompat_cache::CacheStats;
