//! Typed handle declarations.
//!
//! Drivers hand out opaque `void*`-sized handles. Each handle kind gets its own
//! newtype so a device handle can't be passed where a metric handle is
//! expected, and conversions to and from the raw pointer are explicit calls
//! instead of casts.

/// Declare an opaque, pointer-sized driver handle type.
///
/// The generated type is `#[repr(transparent)]` over `*mut c_void`, so it has
/// the same ABI as the C handle it mirrors. Its [`HandleKey`](crate::HandleKey)
/// impl keys on the bit pattern.
///
/// ```rust,ignore
/// zecompat_cache::define_handle! {
///     /// Handle of a device owned by the native driver.
///     pub DeviceHandle
/// }
///
/// let h = DeviceHandle::from_addr(0x1000);
/// assert_eq!(h.addr(), 0x1000);
/// ```
#[macro_export]
macro_rules! define_handle {
    ($(#[$meta:meta])* $vis:vis $name:ident) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis struct $name(*mut ::std::ffi::c_void);

        impl $name {
            /// The null handle.
            #[inline]
            pub const fn null() -> Self {
                Self(::std::ptr::null_mut())
            }

            /// Wrap a raw handle received from a driver.
            #[inline]
            pub const fn from_raw(raw: *mut ::std::ffi::c_void) -> Self {
                Self(raw)
            }

            /// Build a handle from its integer address.
            #[inline]
            pub fn from_addr(addr: usize) -> Self {
                Self(addr as *mut ::std::ffi::c_void)
            }

            /// The raw handle, for passing back to the driver.
            #[inline]
            pub const fn as_raw(self) -> *mut ::std::ffi::c_void {
                self.0
            }

            /// The handle's bit pattern.
            #[inline]
            pub fn addr(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub fn is_null(self) -> bool {
                self.0.is_null()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::null()
            }
        }

        // SAFETY: the handle is an opaque value owned by the driver; it is
        // copied and compared but never dereferenced on this side.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}

        impl $crate::HandleKey for $name {
            type Key = usize;

            #[inline]
            fn key(&self) -> Option<usize> {
                $crate::HandleKey::key(&self.0)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::HandleKey;

    define_handle! {
        /// Test handle.
        pub(crate) WidgetHandle
    }

    define_handle!(GadgetHandle);

    #[test]
    fn test_handle_round_trips_address() {
        let h = WidgetHandle::from_addr(0xdead_0000);
        assert_eq!(h.addr(), 0xdead_0000);
        assert_eq!(WidgetHandle::from_raw(h.as_raw()), h);
        assert_eq!(h.key(), Some(0xdead_0000));
    }

    #[test]
    fn test_default_handle_is_null() {
        let h = GadgetHandle::default();
        assert!(h.is_null());
        assert_eq!(h, GadgetHandle::null());
        assert_eq!(h.key(), None);
    }

    #[test]
    fn test_handles_are_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WidgetHandle>();
        assert_send_sync::<GadgetHandle>();
    }
}
