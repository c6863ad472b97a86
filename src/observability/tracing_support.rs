//! Tracing spans for pool lifecycle operations.

use crate::pool::Pool;
use tracing::{Level, Span, span};

/// Create a span covering a lifecycle operation on one pool.
///
/// # Example
///
/// ```rust,ignore
/// let _guard = span_pool("create", "rx_pool", pool).entered();
/// ```
#[inline]
pub fn span_pool(op: &'static str, name: &str, pool: Pool) -> Span {
    span!(Level::DEBUG, "pool", op, name = %name, pool = %pool)
}
