use std::io;
use thiserror::Error;

/// Errors raised while constructing secret-holding memory or deriving keys.
///
/// Every variant is a construction failure: no secure object is ever handed
/// out in a partially initialised state.
#[derive(Debug, Error)]
pub enum SecureMemoryError {
    /// Requested size cannot be represented as a page-aligned allocation
    #[error("Invalid secure allocation size: {0} bytes")]
    InvalidSize(usize),

    /// The allocator returned no memory
    #[error("Failed to allocate {size} bytes of secure memory")]
    Allocation { size: usize },

    /// The kernel refused to pin the pages (usually RLIMIT_MEMLOCK)
    #[error("Failed to lock {size} bytes into RAM: {source}")]
    Lock {
        size: usize,
        #[source]
        source: io::Error,
    },

    /// Changing page protection failed
    #[error("Failed to change protection of {size} bytes: {source}")]
    Protect {
        size: usize,
        #[source]
        source: io::Error,
    },

    /// Anonymous mapping failed
    #[error("Failed to map {size} bytes: {source}")]
    Map {
        size: usize,
        #[source]
        source: io::Error,
    },

    /// Password hashing rejected its inputs or ran out of memory
    #[error("Key derivation failed: {0}")]
    Derivation(String),
}

pub type Result<T> = std::result::Result<T, SecureMemoryError>;
