//! Telemetry: structured logging, spans and transfer counters.

mod logging;
mod spans;
mod stats;

pub use logging::{init_logging, LogError, LogFormat};
pub use spans::{allocation_span, transfer_span, SpanExt};
pub use stats::{TransferSnapshot, TransferStats};
