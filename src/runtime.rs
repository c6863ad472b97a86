//! Runtime: explicit initialization and the pool/buffer operation surface.
//!
//! A [`Runtime`] is created once during process setup with [`Runtime::init`]
//! and owns the pool table. It is cheap to clone and can be shared between
//! threads; all clones address the same pools.
//!
//! # Example
//!
//! ```rust
//! use blockpool::{Runtime, RuntimeConfig};
//! use blockpool::pool::PoolParam;
//!
//! let rt = Runtime::init(RuntimeConfig::default()).unwrap();
//! let pool = rt.pool_create("rx", &PoolParam::new(1500, 64, 3)).unwrap();
//!
//! let buffer = rt.buffer_alloc(pool).expect("pool has blocks");
//! assert!(rt.buffer_size(buffer).unwrap() >= 1500);
//! rt.buffer_free(buffer);
//!
//! rt.pool_destroy(pool).unwrap();
//! ```

use crate::buffer::{Buffer, BufferInfo};
use crate::error::{Error, Result};
use crate::observability::{init_metrics, record_invalid_free, span_pool};
use crate::pool::{BufferPool, Pool, PoolCapability, PoolInfo, PoolParam, PoolTable};
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Version of the buffer subsystem, `0xMMMM_mmmm` (major, minor).
pub const SUBSYSTEM_VERSION: u32 = 0x0001_0000;

/// Human readable description of the subsystem.
pub const SUBSYSTEM_DESCRIPTION: &str = "memory buffer public APIs";

/// Default number of pool table entries.
pub const DEFAULT_MAX_POOLS: usize = 64;

/// Largest number of pool table entries a runtime supports.
pub const MAX_POOLS: usize = u16::MAX as usize - 1;

/// Configuration for [`Runtime::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of pools that may exist at once.
    pub max_pools: usize,
    /// Panic when a free names a buffer that is not a live allocation.
    ///
    /// When false the free is logged, counted and ignored.
    pub trap_on_invalid_free: bool,
    /// Register per-pool metric handles.
    pub metrics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_pools: DEFAULT_MAX_POOLS,
            trap_on_invalid_free: cfg!(debug_assertions),
            metrics: true,
        }
    }
}

impl RuntimeConfig {
    /// Defaults, but always panic on invalid frees.
    pub fn strict() -> Self {
        Self {
            trap_on_invalid_free: true,
            ..Self::default()
        }
    }

    /// Defaults, but never panic on invalid frees.
    pub fn lenient() -> Self {
        Self {
            trap_on_invalid_free: false,
            ..Self::default()
        }
    }

    /// Set the number of pool table entries.
    pub fn with_max_pools(mut self, max_pools: usize) -> Self {
        self.max_pools = max_pools;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_pools == 0 || self.max_pools > MAX_POOLS {
            return Err(Error::InvalidConfig(format!(
                "max_pools must be in 1..={MAX_POOLS}, got {}",
                self.max_pools
            )));
        }
        Ok(())
    }
}

/// Source of runtime ids; `0` is never handed out.
static NEXT_RUNTIME_ID: AtomicU32 = AtomicU32::new(1);

fn next_runtime_id() -> u32 {
    loop {
        let id = NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed);
        if id != 0 {
            return id;
        }
    }
}

struct RuntimeInner {
    config: RuntimeConfig,
    capability: PoolCapability,
    pools: PoolTable,
}

/// Handle to an initialized buffer subsystem.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Initialize the buffer subsystem.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` is out of range.
    pub fn init(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;
        init_metrics();

        let id = next_runtime_id();
        let capability = PoolCapability {
            max_pools: config.max_pools,
            ..PoolCapability::default()
        };

        tracing::info!(
            runtime = id,
            version = SUBSYSTEM_VERSION,
            max_pools = config.max_pools,
            trap_on_invalid_free = config.trap_on_invalid_free,
            "{SUBSYSTEM_DESCRIPTION} initialized"
        );

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                pools: PoolTable::new(id, config.max_pools),
                capability,
                config,
            }),
        })
    }

    /// Subsystem version, see [`SUBSYSTEM_VERSION`].
    pub const fn version() -> u32 {
        SUBSYSTEM_VERSION
    }

    /// Configuration the runtime was initialized with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Limits enforced by [`Runtime::pool_create`].
    pub fn pool_capability(&self) -> PoolCapability {
        self.inner.capability
    }

    // ========================================================================
    // Pools
    // ========================================================================

    /// Create a pool with every block free.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidParam`] for a zero size or capacity, a non power of
    ///   two alignment, or values beyond [`PoolCapability`]
    /// - [`Error::NameTooLong`] for names longer than `max_name_len`
    /// - [`Error::TooManyPools`] if the table is full
    /// - [`Error::AllocationFailed`] / [`Error::System`] if mapping fails
    pub fn pool_create(&self, name: &str, param: &PoolParam) -> Result<Pool> {
        let capability = &self.inner.capability;
        if name.len() > capability.max_name_len {
            return Err(Error::NameTooLong {
                len: name.len(),
                max: capability.max_name_len,
            });
        }
        param.validate(capability)?;

        let pool = self.inner.pools.insert(name, *param, self.inner.config.metrics)?;
        span_pool("create", name, pool).in_scope(|| {
            tracing::debug!(
                block_size = param.block_size,
                alignment = param.alignment,
                capacity = param.capacity,
                "pool created"
            );
        });
        Ok(pool)
    }

    /// Destroy a pool whose buffers have all been freed.
    ///
    /// Not safe to race with alloc or free on the same pool; callers drain
    /// and serialize first. Every handle into the pool becomes invalid.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolInUse`] if buffers are outstanding; the pool is kept
    /// - [`Error::PoolNotFound`] if `pool` is not live
    pub fn pool_destroy(&self, pool: Pool) -> Result<()> {
        match self.inner.pools.remove(pool) {
            Ok(name) => {
                span_pool("destroy", &name, pool).in_scope(|| tracing::debug!("pool destroyed"));
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%pool, error = %err, "pool destroy refused");
                Err(err)
            }
        }
    }

    /// First live pool with the given name.
    pub fn pool_lookup(&self, name: &str) -> Option<Pool> {
        self.inner.pools.lookup(name)
    }

    /// Snapshot of a live pool.
    pub fn pool_info(&self, pool: Pool) -> Option<PoolInfo> {
        self.inner.pools.with(pool, |p| p.info())
    }

    /// Log a pool's [`PoolInfo`] at `INFO`.
    pub fn pool_print(&self, pool: Pool) {
        match self.pool_info(pool) {
            Some(info) => tracing::info!("{info}"),
            None => tracing::info!("{pool}: no such pool"),
        }
    }

    /// Number of live pools.
    pub fn pool_count(&self) -> usize {
        self.inner.pools.len()
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate one buffer.
    ///
    /// Returns `None` when the pool has no free block (an expected outcome)
    /// or `pool` is not live.
    pub fn buffer_alloc(&self, pool: Pool) -> Option<Buffer> {
        let buffer = self.inner.pools.with(pool, |p| p.alloc()).flatten();
        if buffer.is_none() {
            tracing::debug!(%pool, "buffer alloc failed: pool exhausted or not live");
        }
        buffer
    }

    /// Allocate up to `out.len()` buffers into the front of `out`.
    ///
    /// Returns how many were allocated. The count is short only when the pool
    /// has run out of free blocks (or `pool` is not live, giving `0`).
    pub fn buffer_alloc_multi(&self, pool: Pool, out: &mut [Buffer]) -> usize {
        let count = self
            .inner
            .pools
            .with(pool, |p| p.alloc_multi(&mut *out))
            .unwrap_or(0);
        if count < out.len() {
            tracing::debug!(%pool, requested = out.len(), count, "buffer alloc_multi short");
        }
        count
    }

    /// Return a buffer to its pool.
    ///
    /// `buffer` must be a live allocation. Anything else is a caller bug: it
    /// is detected without touching any pool state, then either panics or is
    /// logged and ignored according to
    /// [`RuntimeConfig::trap_on_invalid_free`].
    pub fn buffer_free(&self, buffer: Buffer) {
        match self.inner.pools.with(buffer.pool(), |p| p.free(buffer)) {
            Some(true) => {}
            Some(false) => self.invalid_free(buffer, "not a live allocation"),
            None => self.invalid_free(buffer, "pool not live"),
        }
    }

    /// Return many buffers, possibly from different pools.
    ///
    /// Equivalent to calling [`Runtime::buffer_free`] on each handle. Runs of
    /// handles from the same pool are returned under one lookup.
    pub fn buffer_free_multi(&self, buffers: &[Buffer]) {
        let mut rejected = Vec::new();

        for run in buffers.chunk_by(|a, b| a.pool() == b.pool()) {
            match self.inner.pools.with(run[0].pool(), |p| p.free_run(run)) {
                Some(invalid) => rejected.extend(invalid),
                None => rejected.extend_from_slice(run),
            }
        }

        for buffer in rejected {
            self.invalid_free(buffer, "not a live allocation");
        }
    }

    fn invalid_free(&self, buffer: Buffer, reason: &str) {
        record_invalid_free();
        if self.inner.config.trap_on_invalid_free {
            panic!("invalid buffer free: {buffer} ({reason})");
        }
        tracing::error!(%buffer, reason, "invalid buffer free ignored");
    }

    // ========================================================================
    // Buffer queries
    // ========================================================================

    /// Usable bytes of a live buffer (the pool's block size).
    pub fn buffer_size(&self, buffer: Buffer) -> Option<usize> {
        self.with_live(buffer, |p| p.block_size())
    }

    /// Address of a live buffer's block.
    ///
    /// The block stays reserved for the caller until the buffer is freed.
    pub fn buffer_addr(&self, buffer: Buffer) -> Option<NonNull<u8>> {
        self.with_live(buffer, |p| p.block_addr(buffer.index()))
    }

    /// Owning pool of a live buffer, [`Pool::INVALID`] otherwise.
    pub fn buffer_pool(&self, buffer: Buffer) -> Pool {
        self.with_live(buffer, |p| p.id()).unwrap_or(Pool::INVALID)
    }

    /// Returns true if `buffer` is a live allocation.
    pub fn buffer_is_valid(&self, buffer: Buffer) -> bool {
        self.with_live(buffer, |_| ()).is_some()
    }

    /// Snapshot of a live buffer.
    pub fn buffer_info(&self, buffer: Buffer) -> Option<BufferInfo> {
        self.with_live(buffer, |p| {
            let addr = p.block_addr(buffer.index()).as_ptr() as usize;
            BufferInfo::new(buffer, &p.info(), addr)
        })
    }

    /// Log a buffer's [`BufferInfo`] at `INFO`.
    pub fn buffer_print(&self, buffer: Buffer) {
        match self.buffer_info(buffer) {
            Some(info) => tracing::info!("{info}"),
            None => tracing::info!("{buffer}: not a live buffer"),
        }
    }

    fn with_live<R>(&self, buffer: Buffer, f: impl FnOnce(&BufferPool) -> R) -> Option<R> {
        self.inner
            .pools
            .with(buffer.pool(), |p| p.is_live(buffer).then(|| f(p)))
            .flatten()
    }
}
