//! Fixed-block buffer pools.
//!
//! A pool binds a [`BlockArena`] and a [`FreeList`] under a name and a
//! [`PoolParam`] set. Each block additionally carries an atomic state word
//! that records its generation and whether it is allocated:
//!
//! ```text
//!  31                               1   0
//! ┌──────────────────────────────────┬───┐
//! │ generation                       │ A │   A = 1 while allocated
//! └──────────────────────────────────┴───┘
//! ```
//!
//! The generation advances on every FREE → ALLOCATED transition, so a
//! [`Buffer`] handle matches its slot's state only while that exact
//! allocation is live. Freeing moves the state from `(g << 1) | 1` to
//! `g << 1` with a CAS before the bit goes back to the free list; a stale or
//! repeated free fails the CAS and touches nothing.
//!
//! Pools are created and addressed through [`crate::Runtime`].

mod param;
mod table;

pub use param::{
    DEFAULT_ALIGNMENT, MAX_ALIGNMENT, MAX_BLOCK_SIZE, MAX_CAPACITY, POOL_NAME_LEN, PoolCapability,
    PoolParam,
};
pub(crate) use table::PoolTable;

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::memory::{BlockArena, FreeList};
use crate::observability::PoolMetrics;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

const ALLOCATED: u32 = 1;
const GENERATION_MASK: u32 = u32::MAX >> 1;

/// Largest number of indices claimed per free list call in `alloc_multi`.
const CLAIM_CHUNK: usize = 64;

/// Handle identifying a pool within a runtime.
///
/// The low 16 bits of the slot word hold the table index plus one and the
/// high 16 bits the entry's epoch, so a handle to a destroyed pool does not
/// match a later pool created in the same entry. The runtime id ties the
/// handle to the [`crate::Runtime`] that created it. Neither part of a live
/// pool is ever zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pool {
    runtime: u32,
    slot: u32,
}

impl Pool {
    /// The reserved invalid pool.
    pub const INVALID: Pool = Pool { runtime: 0, slot: 0 };

    pub(crate) const fn from_parts(runtime: u32, index: usize, epoch: u16) -> Self {
        debug_assert!(index < u16::MAX as usize);
        Pool {
            runtime,
            slot: ((epoch as u32) << 16) | (index as u32 + 1),
        }
    }

    /// Table index, or `None` for the invalid pool.
    pub(crate) const fn index(self) -> Option<usize> {
        match self.slot & 0xFFFF {
            0 => None,
            low => Some(low as usize - 1),
        }
    }

    /// Index and epoch packed as one word, unique within a runtime.
    pub(crate) const fn raw(self) -> u32 {
        self.slot
    }

    /// Returns true for [`Pool::INVALID`].
    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.slot == 0
    }

    /// Numeric identity, unique among live pools of the process; `0` for the
    /// invalid pool.
    #[inline]
    pub const fn to_u64(self) -> u64 {
        ((self.runtime as u64) << 32) | self.slot as u64
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(index) => write!(f, "pool:{}.{}@{}", index, self.slot >> 16, self.runtime),
            None => write!(f, "pool:invalid"),
        }
    }
}

/// Snapshot of a pool's configuration and occupancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolInfo {
    /// Pool handle.
    pub pool: Pool,
    /// Pool name.
    pub name: String,
    /// Parameters the pool was created with.
    pub param: PoolParam,
    /// Distance in bytes between consecutive blocks.
    pub stride: usize,
    /// Bytes mapped for the backing region.
    pub region_len: usize,
    /// Address of block 0.
    pub base_addr: usize,
    /// Blocks currently free.
    pub free: usize,
    /// Blocks currently allocated.
    pub outstanding: usize,
}

impl fmt::Display for PoolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pool info")?;
        writeln!(f, "  pool          {}", self.pool)?;
        writeln!(f, "  name          {}", self.name)?;
        writeln!(f, "  block size    {}", self.param.block_size)?;
        writeln!(f, "  alignment     {}", self.param.alignment)?;
        writeln!(f, "  stride        {}", self.stride)?;
        writeln!(f, "  capacity      {}", self.param.capacity)?;
        writeln!(f, "  region        {:#x} ({} bytes)", self.base_addr, self.region_len)?;
        writeln!(f, "  free          {}", self.free)?;
        write!(f, "  outstanding   {}", self.outstanding)
    }
}

/// One pool: arena, free list and per-slot state.
pub(crate) struct BufferPool {
    id: Pool,
    name: String,
    param: PoolParam,
    arena: BlockArena,
    free_list: FreeList,
    states: Box<[AtomicU32]>,
    metrics: PoolMetrics,
}

impl BufferPool {
    /// Map the backing region and start with every block free.
    ///
    /// `param` must already be validated.
    pub(crate) fn new(id: Pool, name: &str, param: PoolParam, metrics: bool) -> Result<Self> {
        let states = slot_states(param.capacity)?;
        let free_list = FreeList::try_new(param.capacity)?;
        let arena = BlockArena::new(param.block_size, param.alignment, param.capacity)?;
        let metrics = if metrics {
            PoolMetrics::register(name, id, param.capacity)
        } else {
            PoolMetrics::disabled()
        };

        Ok(Self {
            id,
            name: name.to_string(),
            param,
            arena,
            free_list,
            states,
            metrics,
        })
    }

    #[inline]
    pub(crate) fn id(&self) -> Pool {
        self.id
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn block_size(&self) -> usize {
        self.param.block_size
    }

    /// Blocks currently allocated.
    #[inline]
    pub(crate) fn outstanding(&self) -> usize {
        self.param.capacity - self.free_list.count_free()
    }

    /// Claim one block.
    pub(crate) fn alloc(&self) -> Option<Buffer> {
        match self.free_list.acquire_slot() {
            Some(index) => {
                self.metrics.record_alloc(1);
                Some(self.activate(index))
            }
            None => {
                self.metrics.record_exhausted();
                None
            }
        }
    }

    /// Claim up to `out.len()` blocks into the front of `out`.
    pub(crate) fn alloc_multi(&self, out: &mut [Buffer]) -> usize {
        let mut indices = [0usize; CLAIM_CHUNK];
        let mut total = 0;

        while total < out.len() {
            let want = (out.len() - total).min(CLAIM_CHUNK);
            let got = self.free_list.acquire_many(&mut indices[..want]);
            for (slot, &index) in out[total..total + got].iter_mut().zip(&indices[..got]) {
                *slot = self.activate(index);
            }
            total += got;
            if got < want {
                self.metrics.record_exhausted();
                break;
            }
        }

        self.metrics.record_alloc(total);
        total
    }

    /// Advance the state of a block whose free list bit the caller now owns.
    fn activate(&self, index: usize) -> Buffer {
        // FREE (g << 1) + 3 == ALLOCATED ((g + 1) << 1) | 1, wrapping with g.
        let previous = self.states[index].fetch_add(3, Ordering::AcqRel);
        debug_assert_eq!(previous & ALLOCATED, 0, "claimed block {index} was live");
        let generation = (previous >> 1).wrapping_add(1) & GENERATION_MASK;
        Buffer::new(self.id, index as u32, generation)
    }

    /// Move a live block back to FREE in its state word.
    ///
    /// Returns false, changing nothing, if `buffer` is not the live allocation.
    fn retire(&self, buffer: Buffer) -> bool {
        let index = buffer.index() as usize;
        match self.states.get(index) {
            Some(state) => {
                let live = (buffer.generation() << 1) | ALLOCATED;
                state
                    .compare_exchange(live, live & !ALLOCATED, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            }
            None => false,
        }
    }

    /// Return one block. Returns false if `buffer` is not a live allocation.
    pub(crate) fn free(&self, buffer: Buffer) -> bool {
        if !self.retire(buffer) {
            return false;
        }
        self.free_list.release_slot(buffer.index() as usize);
        self.metrics.record_free(1);
        true
    }

    /// Return a run of blocks from this pool.
    ///
    /// Handles that are not live allocations are skipped and returned.
    pub(crate) fn free_run(&self, buffers: &[Buffer]) -> Vec<Buffer> {
        let mut rejected = Vec::new();
        let mut freed = 0;

        self.free_list.release_many(buffers.iter().filter_map(|&buffer| {
            if self.retire(buffer) {
                freed += 1;
                Some(buffer.index() as usize)
            } else {
                rejected.push(buffer);
                None
            }
        }));

        self.metrics.record_free(freed);
        rejected
    }

    /// Returns true if `buffer` is the live allocation of its block.
    pub(crate) fn is_live(&self, buffer: Buffer) -> bool {
        buffer.pool() == self.id
            && self
                .states
                .get(buffer.index() as usize)
                .is_some_and(|state| {
                    state.load(Ordering::Acquire) == (buffer.generation() << 1) | ALLOCATED
                })
    }

    /// Address of a block.
    #[inline]
    pub(crate) fn block_addr(&self, index: u32) -> NonNull<u8> {
        self.arena.block_ptr(index as usize)
    }

    pub(crate) fn info(&self) -> PoolInfo {
        let free = self.free_list.count_free();
        PoolInfo {
            pool: self.id,
            name: self.name.clone(),
            param: self.param,
            stride: self.arena.stride(),
            region_len: self.arena.mapping_len(),
            base_addr: self.arena.base().as_ptr() as usize,
            free,
            outstanding: self.param.capacity - free,
        }
    }
}

/// One FREE state word per block, failing instead of aborting on OOM.
fn slot_states(capacity: usize) -> Result<Box<[AtomicU32]>> {
    let mut states = Vec::new();
    states.try_reserve_exact(capacity).map_err(|err| {
        Error::AllocationFailed(format!("slot states for {capacity} blocks: {err}"))
    })?;
    states.extend((0..capacity).map(|_| AtomicU32::new(0)));
    Ok(states.into_boxed_slice())
}

impl Drop for BufferPool {
    fn drop(&mut self) {
        self.metrics.retire();
    }
}
