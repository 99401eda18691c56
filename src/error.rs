//! Error types for device allocation.
//!
//! Allocation failures are fatal for the caller: nothing is retried and no
//! partially-constructed cache is ever returned.

use thiserror::Error;

/// Errors surfaced while acquiring device memory.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Out of device memory: requested {requested} bytes, available {available} bytes")]
    OutOfMemory { requested: usize, available: usize },

    #[error("Device allocation failed: {0}")]
    AllocationFailed(String),
}

impl CacheError {
    /// Returns true if the device ran out of capacity (as opposed to a
    /// malformed request or runtime failure).
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
