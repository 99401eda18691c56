//! Span helpers for transfers and allocations.

use tracing::{debug_span, Span};

use crate::cache::Transfer;

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Span wrapping one bulk copy across the host/device boundary.
pub fn transfer_span(direction: Transfer, bytes: usize) -> Span {
    debug_span!("transfer", direction = direction.label(), bytes)
}

/// Span wrapping one device allocation.
///
/// `status` and `error.message` are filled in by [`SpanExt::record_result`].
pub fn allocation_span(bytes: usize, allocator: &str) -> Span {
    debug_span!(
        "device_allocation",
        bytes,
        allocator = %allocator,
        status = tracing::field::Empty,
        error.message = tracing::field::Empty,
    )
}
