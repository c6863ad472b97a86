//! Pool creation parameters and limits.

use crate::error::{Error, Result};

/// Alignment used when a caller does not pick one (one cache line).
pub const DEFAULT_ALIGNMENT: usize = 64;

/// Size of the fixed pool name buffer, including the terminator slot.
///
/// Names may be at most `POOL_NAME_LEN - 1` bytes long.
pub const POOL_NAME_LEN: usize = 32;

/// Largest alignment a pool accepts (1 GiB, the largest huge page size).
pub const MAX_ALIGNMENT: usize = 1 << 30;

/// Largest block size a pool accepts.
pub const MAX_BLOCK_SIZE: usize = u32::MAX as usize;

/// Largest number of blocks in one pool.
///
/// Bounds the per-block bookkeeping (a state word and a free list bit per
/// block) to 80 MiB.
pub const MAX_CAPACITY: usize = 1 << 24;

/// Parameters for creating a buffer pool.
///
/// `Default` fills in [`DEFAULT_ALIGNMENT`] and leaves the size and count at
/// zero, which must be overwritten before the parameters validate.
///
/// # Example
///
/// ```rust
/// use blockpool::pool::PoolParam;
///
/// let param = PoolParam::default().block_size(1500).capacity(100);
/// assert_eq!(param.alignment, 64);
/// assert!(param.validate(&Default::default()).is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolParam {
    /// Minimum usable bytes per block.
    pub block_size: usize,
    /// Required address alignment (power of two).
    pub alignment: usize,
    /// Fixed number of blocks.
    pub capacity: usize,
}

impl Default for PoolParam {
    fn default() -> Self {
        Self {
            block_size: 0,
            alignment: DEFAULT_ALIGNMENT,
            capacity: 0,
        }
    }
}

impl PoolParam {
    /// Create parameters with every field given explicitly.
    pub const fn new(block_size: usize, alignment: usize, capacity: usize) -> Self {
        Self {
            block_size,
            alignment,
            capacity,
        }
    }

    /// Set the block size.
    pub const fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the alignment.
    pub const fn alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Set the number of blocks.
    pub const fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Check the parameters against `limits`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParam`] naming the first offending field.
    pub fn validate(&self, limits: &PoolCapability) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::InvalidParam("block_size must be > 0".into()));
        }
        if self.block_size > limits.max_block_size {
            return Err(Error::InvalidParam(format!(
                "block_size {} exceeds maximum {}",
                self.block_size, limits.max_block_size
            )));
        }
        if !self.alignment.is_power_of_two() {
            return Err(Error::InvalidParam(format!(
                "alignment {} is not a power of 2",
                self.alignment
            )));
        }
        if self.alignment > limits.max_alignment {
            return Err(Error::InvalidParam(format!(
                "alignment {} exceeds maximum {}",
                self.alignment, limits.max_alignment
            )));
        }
        if self.capacity == 0 {
            return Err(Error::InvalidParam("capacity must be > 0".into()));
        }
        if self.capacity > limits.max_capacity {
            return Err(Error::InvalidParam(format!(
                "capacity {} exceeds maximum {}",
                self.capacity, limits.max_capacity
            )));
        }
        Ok(())
    }
}

/// Limits a runtime enforces on pool creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCapability {
    /// Maximum number of pools alive at once.
    pub max_pools: usize,
    /// Maximum block size in bytes.
    pub max_block_size: usize,
    /// Maximum alignment in bytes.
    pub max_alignment: usize,
    /// Maximum number of blocks per pool.
    pub max_capacity: usize,
    /// Maximum pool name length in bytes.
    pub max_name_len: usize,
}

impl Default for PoolCapability {
    fn default() -> Self {
        Self {
            max_pools: crate::runtime::DEFAULT_MAX_POOLS,
            max_block_size: MAX_BLOCK_SIZE,
            max_alignment: MAX_ALIGNMENT,
            max_capacity: MAX_CAPACITY,
            max_name_len: POOL_NAME_LEN - 1,
        }
    }
}
