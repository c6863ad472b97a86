//! # blockpool
//!
//! Fixed-block buffer pools for data-plane runtimes.
//!
//! A pool is a bounded set of equally sized, equally aligned memory blocks,
//! mapped once at creation and handed out by handle. Handles are small `Copy`
//! values carrying the pool, the block index and a generation, so stale or
//! foreign handles are recognised in O(1) without a global registry.
//!
//! ## Features
//!
//! - **Exact capacity**: a pool of N blocks serves exactly N live buffers
//! - **Alignment**: every block address is a multiple of the pool alignment
//! - **Lock-free slots**: claims and releases are atomic bitmap operations
//! - **Batches**: `alloc_multi` and `free_multi`, the latter across pools
//! - **Typed events**: buffers project to a tagged [`Event`] view
//!
//! ## Quick Start
//!
//! ```rust
//! use blockpool::prelude::*;
//!
//! let rt = Runtime::init(RuntimeConfig::default())?;
//! let pool = rt.pool_create("pkt", &PoolParam::new(1500, 64, 3))?;
//!
//! let mut buffers = [Buffer::INVALID; 10];
//! assert_eq!(rt.buffer_alloc_multi(pool, &mut buffers), 3);
//! assert!(rt.buffer_alloc(pool).is_none());
//!
//! let event = buffers[0].to_event();
//! assert_eq!(event.types(), (EventType::Buffer, EventSubtype::None));
//!
//! rt.buffer_free_multi(&buffers[..3]);
//! rt.pool_destroy(pool)?;
//! # Ok::<(), blockpool::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod error;
pub mod event;
pub mod memory;
pub mod observability;
pub mod pool;
pub mod runtime;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{Buffer, BufferInfo};
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, EventSubtype, EventType};
    pub use crate::pool::{Pool, PoolCapability, PoolInfo, PoolParam};
    pub use crate::runtime::{Runtime, RuntimeConfig};
}

pub use buffer::Buffer;
pub use error::{Error, Result};
pub use event::Event;
pub use pool::Pool;
pub use runtime::{Runtime, RuntimeConfig};
