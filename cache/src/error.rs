use thiserror::Error;

/// Failures a [`HandleCache`](crate::HandleCache) can report.
///
/// A null handle is not an error; it resolves to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("out of host memory while caching a {cache} handle")]
    OutOfHostMemory { cache: &'static str },
    #[error("failed to construct {cache} wrapper: {reason}")]
    Construction { cache: &'static str, reason: String },
}

impl CacheError {
    /// Name of the cache that raised the error.
    pub fn cache(&self) -> &'static str {
        match self {
            CacheError::OutOfHostMemory { cache } | CacheError::Construction { cache, .. } => cache,
        }
    }
}
