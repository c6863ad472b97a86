//! Contiguous backing region for one pool's blocks.
//!
//! A `BlockArena` maps a single anonymous private region large enough for
//! `block_count` blocks and hands out block addresses by index. The block
//! stride is the requested block size rounded up to the alignment, so every
//! block start keeps the alignment of the base.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────┬─────────┬─────────┬─────────┬─────────┐
//! │ (skew)   │ Block 0 │ Block 1 │   ...   │ Block N │
//! └──────────┴─────────┴─────────┴─────────┴─────────┘
//! ^          ^
//! mapping    base (aligned)
//! ```
//!
//! Mappings are page aligned. When the requested alignment exceeds the page
//! size the mapping is over-allocated by `alignment` bytes and the base is
//! moved forward to the first aligned address.

use crate::error::{Error, Result};
use rustix::mm::{MapFlags, ProtFlags};
use std::ptr::NonNull;

/// Round `value` up to a multiple of `align` (a power of two).
#[inline]
fn align_up(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

/// Anonymous memory region subdivided into equally sized, aligned blocks.
pub struct BlockArena {
    /// Start of the mapping returned by the kernel.
    mapping: NonNull<u8>,
    /// Length of the mapping in bytes.
    mapping_len: usize,
    /// First aligned address inside the mapping (block 0).
    base: NonNull<u8>,
    /// Distance between consecutive blocks.
    stride: usize,
    /// Number of blocks.
    block_count: usize,
}

impl BlockArena {
    /// Map an arena for `block_count` blocks of at least `block_size` bytes,
    /// each aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// Returns an error if any argument is zero, `alignment` is not a power
    /// of two, the total size overflows, or the mapping fails.
    pub fn new(block_size: usize, alignment: usize, block_count: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::AllocationFailed("block_size must be > 0".into()));
        }
        if block_count == 0 {
            return Err(Error::AllocationFailed("block_count must be > 0".into()));
        }
        if !alignment.is_power_of_two() {
            return Err(Error::AllocationFailed(
                "alignment must be a power of 2".into(),
            ));
        }

        let stride = align_up(block_size, alignment)
            .ok_or_else(|| Error::AllocationFailed("block stride overflow".into()))?;
        let region_len = stride
            .checked_mul(block_count)
            .ok_or_else(|| Error::AllocationFailed("arena size overflow".into()))?;

        let page_size = rustix::param::page_size();
        let skew = if alignment > page_size { alignment } else { 0 };
        let mapping_len = region_len
            .checked_add(skew)
            .and_then(|len| align_up(len, page_size))
            .ok_or_else(|| Error::AllocationFailed("arena size overflow".into()))?;

        // SAFETY: a fresh anonymous mapping does not alias any existing memory.
        let ptr = unsafe {
            rustix::mm::mmap_anonymous(
                std::ptr::null_mut(),
                mapping_len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::PRIVATE,
            )?
        };

        let mapping = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| Error::AllocationFailed("mmap returned null".into()))?;

        let offset = mapping.as_ptr().align_offset(alignment);
        debug_assert!(offset <= skew);
        // SAFETY: offset < alignment <= skew, so base stays inside the mapping
        // and leaves at least region_len bytes after it.
        let base = unsafe { NonNull::new_unchecked(mapping.as_ptr().add(offset)) };

        Ok(Self {
            mapping,
            mapping_len,
            base,
            stride,
            block_count,
        })
    }

    /// Address of block `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn block_ptr(&self, index: usize) -> NonNull<u8> {
        assert!(index < self.block_count, "block index out of bounds");
        // SAFETY: index < block_count, so the offset is inside the region.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(index * self.stride)) }
    }

    /// Distance in bytes between consecutive blocks.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of blocks.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Address of block 0.
    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// Length of the underlying mapping in bytes.
    #[inline]
    pub fn mapping_len(&self) -> usize {
        self.mapping_len
    }
}

impl Drop for BlockArena {
    fn drop(&mut self) {
        // SAFETY: mapping/mapping_len are exactly what mmap_anonymous returned.
        unsafe {
            let _ = rustix::mm::munmap(self.mapping.as_ptr().cast(), self.mapping_len);
        }
    }
}

// SAFETY: the arena only hands out addresses; access to block contents is
// arbitrated by the owning pool's free list.
unsafe impl Send for BlockArena {}
unsafe impl Sync for BlockArena {}
