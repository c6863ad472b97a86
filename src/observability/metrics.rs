//! Metrics collection using metrics-rs.

use crate::pool::Pool;
use metrics::{Counter, Gauge, Label, Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const BUFFERS_ALLOCATED: &str = "blockpool_buffers_allocated";
const BUFFERS_FREED: &str = "blockpool_buffers_freed";
const POOL_EXHAUSTED: &str = "blockpool_pool_exhausted";
const INVALID_FREES: &str = "blockpool_invalid_frees";
const POOL_SLOTS_AVAILABLE: &str = "blockpool_pool_slots_available";

/// Initialize metrics descriptions.
///
/// Called by `Runtime::init`. Safe to call multiple times (subsequent calls
/// are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_ALLOCATED,
        Unit::Count,
        "Total number of buffers allocated from a pool"
    );
    metrics::describe_counter!(
        BUFFERS_FREED,
        Unit::Count,
        "Total number of buffers returned to a pool"
    );
    metrics::describe_counter!(
        POOL_EXHAUSTED,
        Unit::Count,
        "Allocation requests that found the pool empty or short"
    );
    metrics::describe_counter!(
        INVALID_FREES,
        Unit::Count,
        "Frees rejected because the handle was not a live allocation"
    );
    metrics::describe_gauge!(
        POOL_SLOTS_AVAILABLE,
        Unit::Count,
        "Free blocks in a buffer pool"
    );
}

/// Record a rejected free.
#[inline]
pub fn record_invalid_free() {
    counter!(INVALID_FREES).increment(1);
}

fn pool_labels(pool_name: &str, pool: Pool) -> Vec<Label> {
    vec![
        Label::new("pool", pool_name.to_string()),
        Label::new("pool_id", pool.to_u64().to_string()),
    ]
}

/// Metric handles for one pool, registered once at pool creation.
pub struct PoolMetrics {
    allocated: Counter,
    freed: Counter,
    exhausted: Counter,
    available: Gauge,
}

impl PoolMetrics {
    /// Register metric handles labelled with the pool name and id.
    ///
    /// Pools may share a name, so the id keeps their series apart.
    pub fn register(pool_name: &str, pool: Pool, capacity: usize) -> Self {
        let labels = pool_labels(pool_name, pool);
        let metrics = Self {
            allocated: counter!(BUFFERS_ALLOCATED, labels.clone()),
            freed: counter!(BUFFERS_FREED, labels.clone()),
            exhausted: counter!(POOL_EXHAUSTED, labels.clone()),
            available: gauge!(POOL_SLOTS_AVAILABLE, labels),
        };
        metrics.available.set(capacity as f64);
        metrics
    }

    /// Handles that record nothing.
    pub fn disabled() -> Self {
        Self {
            allocated: Counter::noop(),
            freed: Counter::noop(),
            exhausted: Counter::noop(),
            available: Gauge::noop(),
        }
    }

    /// Record `count` buffers handed out.
    #[inline]
    pub fn record_alloc(&self, count: usize) {
        self.allocated.increment(count as u64);
        self.available.decrement(count as f64);
    }

    /// Record `count` buffers returned.
    #[inline]
    pub fn record_free(&self, count: usize) {
        self.freed.increment(count as u64);
        self.available.increment(count as f64);
    }

    /// Record a request the pool could not fully satisfy.
    #[inline]
    pub fn record_exhausted(&self) {
        self.exhausted.increment(1);
    }

    /// Clear the availability gauge when the pool goes away.
    pub fn retire(&self) {
        self.available.set(0.0);
    }
}
