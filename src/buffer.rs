//! Buffer handles.
//!
//! A [`Buffer`] names one allocated block: the owning [`Pool`], the block
//! index and the generation the block had when it was handed out. Handles
//! are plain `Copy` values and do not keep the pool alive; queries that need
//! the pool go through [`crate::Runtime`].

use crate::event::Event;
use crate::pool::{Pool, PoolInfo};
use std::fmt;

/// Handle to one allocated block of a pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Buffer {
    pool: Pool,
    index: u32,
    generation: u32,
}

impl Buffer {
    /// The reserved invalid buffer.
    pub const INVALID: Buffer = Buffer {
        pool: Pool::INVALID,
        index: 0,
        generation: 0,
    };

    pub(crate) const fn new(pool: Pool, index: u32, generation: u32) -> Self {
        Self {
            pool,
            index,
            generation,
        }
    }

    /// Pool recorded in the handle, without checking that it is still live.
    ///
    /// Use [`crate::Runtime::buffer_pool`] for the checked query.
    #[inline]
    pub const fn pool(&self) -> Pool {
        self.pool
    }

    /// Block index within the pool.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the block when this handle was handed out.
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Returns true for [`Buffer::INVALID`].
    #[inline]
    pub const fn is_invalid(&self) -> bool {
        self.pool.is_invalid()
    }

    /// Numeric identity of the handle.
    ///
    /// Packs the pool's index and epoch into the high 32 bits and the block
    /// index into the low 32 bits. A block has one live generation at a time,
    /// so two distinct valid handles of one runtime never encode alike. Live
    /// pools are non-zero, so no valid handle encodes as `0`, the value of
    /// [`Buffer::INVALID`].
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        ((self.pool.raw() as u64) << 32) | self.index as u64
    }

    /// View this buffer as a generic event.
    #[inline]
    pub const fn to_event(self) -> Event {
        Event::Buffer(self)
    }

    /// Recover the buffer carried by `event`.
    #[inline]
    pub const fn from_event(event: Event) -> Buffer {
        event.to_buffer()
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "buffer:invalid")
        } else {
            write!(f, "buffer:{}/{}#{}", self.pool, self.index, self.generation)
        }
    }
}

/// Snapshot describing one live buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    /// The buffer handle.
    pub buffer: Buffer,
    /// Name of the owning pool.
    pub pool_name: String,
    /// Usable bytes.
    pub size: usize,
    /// Address of the block.
    pub addr: usize,
}

impl BufferInfo {
    pub(crate) fn new(buffer: Buffer, pool: &PoolInfo, addr: usize) -> Self {
        Self {
            buffer,
            pool_name: pool.name.clone(),
            size: pool.param.block_size,
            addr,
        }
    }
}

impl fmt::Display for BufferInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Buffer info")?;
        writeln!(f, "  handle        {}", self.buffer)?;
        writeln!(f, "  pool          {} ({})", self.buffer.pool(), self.pool_name)?;
        writeln!(f, "  index         {}", self.buffer.index())?;
        writeln!(f, "  generation    {}", self.buffer.generation())?;
        writeln!(f, "  size          {}", self.size)?;
        write!(f, "  addr          {:#x}", self.addr)
    }
}
