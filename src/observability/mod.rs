//! Observability features: metrics and tracing.
//!
//! ## Metrics
//!
//! blockpool exposes the following metrics, all labelled with `pool` (name)
//! and `pool_id` except the invalid free counter:
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `blockpool_buffers_allocated` | Counter | Buffers handed out |
//! | `blockpool_buffers_freed` | Counter | Buffers returned |
//! | `blockpool_pool_exhausted` | Counter | Requests the pool could not fully satisfy |
//! | `blockpool_invalid_frees` | Counter | Frees of handles that were not live |
//! | `blockpool_pool_slots_available` | Gauge | Free blocks |
//!
//! Nothing is recorded unless the application installs a `metrics` recorder.
//!
//! ## Tracing
//!
//! Pool create and destroy run inside a `pool` span at `DEBUG`. The alloc and
//! free fast paths emit no events; exhaustion is reported at `DEBUG` and
//! rejected frees at `ERROR`.

mod metrics;
mod tracing_support;

pub use metrics::{PoolMetrics, init_metrics, record_invalid_free};
pub use tracing_support::span_pool;
