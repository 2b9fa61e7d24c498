//! Diagnostics for the gesture pipeline.
//!
//! Per-cycle latency, drop and queue-occupancy counters exposed as a
//! read-only snapshot that can be sampled while the pipeline runs.

pub mod counters;

// Re-export commonly used types
pub use counters::{
    create_shared_diagnostics, create_shared_diagnostics_with_persistence, Diagnostics,
    DiagnosticsSnapshot, PersistedTotals, PipelineStatus, SharedDiagnostics,
};
