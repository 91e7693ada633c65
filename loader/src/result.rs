//! Result codes and the loader's error type.

use std::fmt;

use thiserror::Error;
use zecompat_cache::CacheError;

/// Result codes shared with native drivers. Discriminants match the C API.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZeResult {
    Success = 0,
    NotReady = 1,
    ErrorDeviceLost = 0x7000_0001,
    ErrorOutOfHostMemory = 0x7000_0002,
    ErrorOutOfDeviceMemory = 0x7000_0003,
    ErrorUninitialized = 0x7800_0001,
    ErrorUnsupportedVersion = 0x7800_0002,
    ErrorUnsupportedFeature = 0x7800_0003,
    ErrorInvalidArgument = 0x7800_0004,
    ErrorInvalidNullHandle = 0x7800_0005,
    ErrorHandleObjectInUse = 0x7800_0006,
    ErrorInvalidNullPointer = 0x7800_0007,
    ErrorUnknown = 0x7fff_ffff,
}

impl ZeResult {
    /// Decode a raw result code. Unrecognized values become `ErrorUnknown`.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => ZeResult::Success,
            1 => ZeResult::NotReady,
            0x7000_0001 => ZeResult::ErrorDeviceLost,
            0x7000_0002 => ZeResult::ErrorOutOfHostMemory,
            0x7000_0003 => ZeResult::ErrorOutOfDeviceMemory,
            0x7800_0001 => ZeResult::ErrorUninitialized,
            0x7800_0002 => ZeResult::ErrorUnsupportedVersion,
            0x7800_0003 => ZeResult::ErrorUnsupportedFeature,
            0x7800_0004 => ZeResult::ErrorInvalidArgument,
            0x7800_0005 => ZeResult::ErrorInvalidNullHandle,
            0x7800_0006 => ZeResult::ErrorHandleObjectInUse,
            0x7800_0007 => ZeResult::ErrorInvalidNullPointer,
            _ => ZeResult::ErrorUnknown,
        }
    }

    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == ZeResult::Success
    }

    pub fn name(self) -> &'static str {
        match self {
            ZeResult::Success => "ZE_RESULT_SUCCESS",
            ZeResult::NotReady => "ZE_RESULT_NOT_READY",
            ZeResult::ErrorDeviceLost => "ZE_RESULT_ERROR_DEVICE_LOST",
            ZeResult::ErrorOutOfHostMemory => "ZE_RESULT_ERROR_OUT_OF_HOST_MEMORY",
            ZeResult::ErrorOutOfDeviceMemory => "ZE_RESULT_ERROR_OUT_OF_DEVICE_MEMORY",
            ZeResult::ErrorUninitialized => "ZE_RESULT_ERROR_UNINITIALIZED",
            ZeResult::ErrorUnsupportedVersion => "ZE_RESULT_ERROR_UNSUPPORTED_VERSION",
            ZeResult::ErrorUnsupportedFeature => "ZE_RESULT_ERROR_UNSUPPORTED_FEATURE",
            ZeResult::ErrorInvalidArgument => "ZE_RESULT_ERROR_INVALID_ARGUMENT",
            ZeResult::ErrorInvalidNullHandle => "ZE_RESULT_ERROR_INVALID_NULL_HANDLE",
            ZeResult::ErrorHandleObjectInUse => "ZE_RESULT_ERROR_HANDLE_OBJECT_IN_USE",
            ZeResult::ErrorInvalidNullPointer => "ZE_RESULT_ERROR_INVALID_NULL_POINTER",
            ZeResult::ErrorUnknown => "ZE_RESULT_ERROR_UNKNOWN",
        }
    }
}

impl fmt::Display for ZeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors surfaced by loader sessions.
#[derive(Debug, Error)]
pub enum ZeError {
    /// A driver entry point returned a failure code.
    #[error("{function}: {code}")]
    Driver { code: ZeResult, function: &'static str },
    /// The handle cache could not resolve a handle to an object.
    #[error("{function}: {source}")]
    Cache {
        function: &'static str,
        #[source]
        source: CacheError,
    },
    /// Validation mode rejected a call before it reached the driver.
    #[error("{function}: {message}")]
    Validation { function: &'static str, message: String },
    #[error("driver '{0}' is already registered")]
    DuplicateDriver(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ZeError {
    pub fn driver(code: ZeResult, function: &'static str) -> Self {
        ZeError::Driver { code, function }
    }

    pub fn cache(source: CacheError, function: &'static str) -> Self {
        ZeError::Cache { function, source }
    }

    /// The result code a C caller would see for this error.
    pub fn code(&self) -> ZeResult {
        match self {
            ZeError::Driver { code, .. } => *code,
            ZeError::Cache { source: CacheError::OutOfHostMemory { .. }, .. } => {
                ZeResult::ErrorOutOfHostMemory
            }
            ZeError::Cache { source: CacheError::Construction { .. }, .. } => ZeResult::ErrorUnknown,
            ZeError::Validation { .. } | ZeError::DuplicateDriver(_) | ZeError::Config(_) => {
                ZeResult::ErrorInvalidArgument
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_codes_round_trip() {
        for code in [
            ZeResult::Success,
            ZeResult::ErrorDeviceLost,
            ZeResult::ErrorOutOfHostMemory,
            ZeResult::ErrorInvalidNullHandle,
            ZeResult::ErrorUnknown,
        ] {
            assert_eq!(ZeResult::from_raw(code.as_raw()), code);
        }
        assert_eq!(ZeResult::from_raw(0x1234), ZeResult::ErrorUnknown);
    }

    #[test]
    fn test_out_of_host_memory_value() {
        assert_eq!(ZeResult::ErrorOutOfHostMemory.as_raw(), 0x7000_0002);
        assert_eq!(ZeResult::ErrorInvalidNullHandle.as_raw(), 0x7800_0005);
    }

    #[test]
    fn test_cache_errors_map_to_out_of_host_memory() {
        let err = ZeError::cache(CacheError::OutOfHostMemory { cache: "device" }, "zeDeviceGet");
        assert_eq!(err.code(), ZeResult::ErrorOutOfHostMemory);
        assert_eq!(
            err.to_string(),
            "zeDeviceGet: out of host memory while caching a device handle"
        );
    }

    #[test]
    fn test_driver_error_display() {
        let err = ZeError::driver(ZeResult::ErrorDeviceLost, "zeDeviceGetProperties");
        assert_eq!(err.to_string(), "zeDeviceGetProperties: ZE_RESULT_ERROR_DEVICE_LOST");
        assert_eq!(err.code(), ZeResult::ErrorDeviceLost);
    }
}
