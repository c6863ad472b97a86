//! Error types for blockpool.

use thiserror::Error;

/// Result type alias using blockpool's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pool operations.
///
/// Pool exhaustion is not an error: allocation reports it with `None` or a
/// short count.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool parameters were rejected at creation.
    #[error("invalid pool parameter: {0}")]
    InvalidParam(String),

    /// Runtime configuration was rejected at init.
    #[error("invalid runtime configuration: {0}")]
    InvalidConfig(String),

    /// Pool name does not fit the fixed name length.
    #[error("pool name too long: {len} bytes (max {max})")]
    NameTooLong {
        /// Length of the rejected name in bytes.
        len: usize,
        /// Longest accepted name in bytes.
        max: usize,
    },

    /// Every entry of the pool table is occupied.
    #[error("pool table full: {0} pools already exist")]
    TooManyPools(usize),

    /// The pool handle does not refer to a live pool.
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    /// Destroy was attempted while buffers are still allocated.
    #[error("pool '{name}' still has {outstanding} buffers outstanding")]
    PoolInUse {
        /// Name of the pool.
        name: String,
        /// Number of buffers not yet freed.
        outstanding: usize,
    },

    /// Backing memory could not be obtained.
    #[error("memory allocation failed: {0}")]
    AllocationFailed(String),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),
}
