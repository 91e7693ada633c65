//! Driver registry: the set of dispatch tables a session fans out to.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ddi::DriverDdi;
use crate::result::ZeError;

/// A registered driver: its name and dispatch table.
#[derive(Clone)]
pub struct DriverEntry {
    name: Arc<str>,
    ddi: Arc<dyn DriverDdi>,
}

impl DriverEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ddi(&self) -> &dyn DriverDdi {
        &*self.ddi
    }
}

impl fmt::Debug for DriverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverEntry").field("name", &self.name).finish()
    }
}

/// Ordered set of drivers, keyed by name. Enumeration order is registration
/// order.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: IndexMap<String, DriverEntry>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver and run its `init` hook.
    ///
    /// Fails if a driver with the same name is already registered or if
    /// `init` reports an error; in both cases the registry is unchanged.
    pub fn register(&mut self, ddi: Arc<dyn DriverDdi>) -> Result<(), ZeError> {
        let name = ddi.name().to_string();

        if self.drivers.contains_key(&name) {
            return Err(ZeError::DuplicateDriver(name));
        }

        ddi.init().map_err(|code| ZeError::driver(code, "zeInit"))?;

        log::debug!("registered driver '{}'", name);
        let entry = DriverEntry {
            name: Arc::from(name.as_str()),
            ddi,
        };
        self.drivers.insert(name, entry);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DriverEntry> {
        self.drivers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.drivers.keys().map(String::as_str).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &DriverEntry> {
        self.drivers.values()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.drivers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handles::{DeviceHandle, DriverHandle};
    use crate::result::ZeResult;

    struct Stub {
        name: &'static str,
        init: Result<(), ZeResult>,
    }

    impl DriverDdi for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&self) -> Result<(), ZeResult> {
            self.init
        }

        fn driver_get(&self) -> Result<Vec<DriverHandle>, ZeResult> {
            Ok(Vec::new())
        }

        fn device_get(&self, _driver: DriverHandle) -> Result<Vec<DeviceHandle>, ZeResult> {
            Ok(Vec::new())
        }
    }

    fn stub(name: &'static str) -> Arc<dyn DriverDdi> {
        Arc::new(Stub { name, init: Ok(()) })
    }

    #[test]
    fn test_register_preserves_order() {
        let mut registry = DriverRegistry::new();
        registry.register(stub("b")).unwrap();
        registry.register(stub("a")).unwrap();
        assert_eq!(registry.names(), vec!["b", "a"]);
        assert_eq!(registry.get("a").unwrap().name(), "a");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = DriverRegistry::new();
        registry.register(stub("gpu")).unwrap();
        let err = registry.register(stub("gpu")).unwrap_err();
        assert!(matches!(err, ZeError::DuplicateDriver(ref n) if n == "gpu"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_init_is_not_registered() {
        let mut registry = DriverRegistry::new();
        let err = registry
            .register(Arc::new(Stub {
                name: "broken",
                init: Err(ZeResult::ErrorUninitialized),
            }))
            .unwrap_err();
        assert_eq!(err.code(), ZeResult::ErrorUninitialized);
        assert!(registry.is_empty());
    }
}
