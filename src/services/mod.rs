//! Business logic services.
//!
//! [`MemoryStore`] is the single entry point. Decay and consolidation are
//! implemented as further methods on it in their own modules.

mod consolidation;
mod decay;
mod store;

pub use consolidation::ConsolidationStats;
pub use decay::DecayPolicy;
pub use store::MemoryStore;

use std::time::Instant;

/// Emits the per-operation counter and duration histogram.
fn record_operation(operation: &'static str, start: Instant, ok: bool) {
    let status = if ok { "success" } else { "error" };
    metrics::counter!(
        "memory_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "memory_operation_duration_ms",
        "operation" => operation
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
