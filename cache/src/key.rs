//! Key normalization for raw driver handles.
//!
//! A handle is either pointer-like, in which case its bit pattern is the key
//! and the pointee is never read, or it is already an integer and is used as
//! the key directly. Which rule applies is decided by the `HandleKey` impl of
//! the handle type, never per call.

use std::fmt::Debug;
use std::hash::Hash;
use std::ptr::NonNull;

/// Maps a raw handle to the key a [`HandleCache`](crate::HandleCache) stores
/// it under.
///
/// The zero value of every handle type is the null handle and has no key.
pub trait HandleKey: Copy {
    /// Normalized map key.
    type Key: Copy + Eq + Hash + Debug;

    /// Returns the normalized key, or `None` for the null handle.
    fn key(&self) -> Option<Self::Key>;

    /// Whether this is the null handle.
    #[inline]
    fn is_null_handle(&self) -> bool {
        self.key().is_none()
    }
}

impl<T> HandleKey for *const T {
    type Key = usize;

    #[inline]
    fn key(&self) -> Option<usize> {
        match *self as usize {
            0 => None,
            addr => Some(addr),
        }
    }
}

impl<T> HandleKey for *mut T {
    type Key = usize;

    #[inline]
    fn key(&self) -> Option<usize> {
        (*self as *const T).key()
    }
}

impl<T> HandleKey for NonNull<T> {
    type Key = usize;

    #[inline]
    fn key(&self) -> Option<usize> {
        Some(self.as_ptr() as usize)
    }
}

macro_rules! integer_handle_key {
    ($($t:ty),* $(,)?) => {
        $(
            impl HandleKey for $t {
                type Key = $t;

                #[inline]
                fn key(&self) -> Option<$t> {
                    if *self == 0 { None } else { Some(*self) }
                }
            }
        )*
    };
}

integer_handle_key!(u16, u32, u64, usize, i32, i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_key_is_address() {
        let ptr = 0x1000usize as *const u8;
        assert_eq!(ptr.key(), Some(0x1000));

        let mut_ptr = 0x2000usize as *mut std::ffi::c_void;
        assert_eq!(mut_ptr.key(), Some(0x2000));
    }

    #[test]
    fn test_null_pointer_has_no_key() {
        assert_eq!(std::ptr::null::<u32>().key(), None);
        assert!(std::ptr::null_mut::<u32>().is_null_handle());
    }

    #[test]
    fn test_dangling_pointer_is_never_read() {
        // An address nothing is mapped at; reading it would fault.
        let bogus = usize::MAX as *const u64;
        assert_eq!(bogus.key(), Some(usize::MAX));
    }

    #[test]
    fn test_integer_handles_are_their_own_key() {
        assert_eq!(42u64.key(), Some(42u64));
        assert_eq!((-7i64).key(), Some(-7i64));
        assert_eq!(0u32.key(), None);
        assert!(0usize.is_null_handle());
    }

    #[test]
    fn test_non_null_always_has_key() {
        let mut value = 5u32;
        let nn = NonNull::from(&mut value);
        assert_eq!(nn.key(), Some(&mut value as *mut u32 as usize));
    }
}
