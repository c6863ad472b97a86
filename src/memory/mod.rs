//! Backing memory and slot bookkeeping for pools.
//!
//! - [`BlockArena`]: one anonymous mapping per pool, subdivided into aligned blocks
//! - [`FreeList`]: lock-free bitmap of free block indices
//!
//! Neither type knows about handles or generations; [`crate::pool`] combines
//! them into a pool.

mod arena;
mod free_list;

pub use arena::BlockArena;
pub use free_list::FreeList;
