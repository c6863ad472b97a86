//! Fixed-size table of live pools.

use super::{BufferPool, Pool, PoolParam};
use crate::error::{Error, Result};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct Entry {
    /// Bumped each time a pool is installed in this entry.
    epoch: u16,
    pool: Option<BufferPool>,
}

/// Table of pools addressed by [`Pool`] handles.
///
/// Each entry has its own lock: alloc and free take the read side of one
/// entry, create and destroy the write side of the entry they change. Every
/// handle minted here carries the table's runtime id, so handles from another
/// runtime never match a live entry.
pub(crate) struct PoolTable {
    runtime: u32,
    entries: Box<[RwLock<Entry>]>,
}

fn read(entry: &RwLock<Entry>) -> RwLockReadGuard<'_, Entry> {
    entry.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(entry: &RwLock<Entry>) -> RwLockWriteGuard<'_, Entry> {
    entry.write().unwrap_or_else(PoisonError::into_inner)
}

impl PoolTable {
    pub(crate) fn new(runtime: u32, max_pools: usize) -> Self {
        let entries = (0..max_pools)
            .map(|_| RwLock::new(Entry { epoch: 0, pool: None }))
            .collect();
        Self { runtime, entries }
    }

    /// Create a pool in the first empty entry.
    ///
    /// Occupied entries are only read-locked while scanning, so traffic on
    /// live pools is not stalled. `param` must already be validated.
    pub(crate) fn insert(&self, name: &str, param: PoolParam, metrics: bool) -> Result<Pool> {
        for (index, entry) in self.entries.iter().enumerate() {
            if read(entry).pool.is_some() {
                continue;
            }

            let mut guard = write(entry);
            // Filled by a concurrent create since the scan.
            if guard.pool.is_some() {
                continue;
            }

            let epoch = guard.epoch.wrapping_add(1);
            let id = Pool::from_parts(self.runtime, index, epoch);
            guard.pool = Some(BufferPool::new(id, name, param, metrics)?);
            guard.epoch = epoch;
            return Ok(id);
        }

        Err(Error::TooManyPools(self.entries.len()))
    }

    /// Remove a pool that has no outstanding buffers, returning its name.
    pub(crate) fn remove(&self, pool: Pool) -> Result<String> {
        let entry = pool
            .index()
            .and_then(|index| self.entries.get(index))
            .ok_or_else(|| Error::PoolNotFound(pool.to_string()))?;

        let removed = {
            let mut guard = write(entry);
            match guard.pool.as_ref() {
                Some(live) if live.id() == pool => {
                    let outstanding = live.outstanding();
                    if outstanding > 0 {
                        return Err(Error::PoolInUse {
                            name: live.name().to_string(),
                            outstanding,
                        });
                    }
                }
                _ => return Err(Error::PoolNotFound(pool.to_string())),
            }
            guard.pool.take()
        };

        // Unmap outside the lock.
        Ok(removed.map(|p| p.name().to_string()).unwrap_or_default())
    }

    /// Run `f` on the live pool `pool` under its entry's read lock.
    ///
    /// Returns `None` if `pool` is invalid, destroyed or out of range.
    #[inline]
    pub(crate) fn with<R>(&self, pool: Pool, f: impl FnOnce(&BufferPool) -> R) -> Option<R> {
        let entry = self.entries.get(pool.index()?)?;
        let guard = read(entry);
        match guard.pool.as_ref() {
            Some(live) if live.id() == pool => Some(f(live)),
            _ => None,
        }
    }

    /// First live pool named `name`, in table order.
    pub(crate) fn lookup(&self, name: &str) -> Option<Pool> {
        self.entries.iter().find_map(|entry| {
            read(entry)
                .pool
                .as_ref()
                .filter(|live| live.name() == name)
                .map(BufferPool::id)
        })
    }

    /// Number of live pools.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| read(entry).pool.is_some())
            .count()
    }
}
