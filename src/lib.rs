//! Posture Control - turn body-landmark streams into debounced control signals.
//!
//! This library takes per-frame body landmarks from an external pose model,
//! calibrates a neutral stance, recognizes a fixed set of gestures and emits
//! one [`ControlEvent`] per intentional gesture to a [`SignalSink`], within a
//! tight end-to-end latency budget.
//!
//! # Guarantees
//!
//! - **Debounced**: a gesture must persist for the confirmation window before
//!   it fires, and cannot fire again until its cooldown has elapsed
//! - **Exclusive**: at most one gesture is confirmed per cycle, by priority
//! - **Fresh**: bounded drop-oldest queues; stale frames are skipped, never
//!   buffered without bound
//! - **Consistent**: every feature vector is computed against a single
//!   baseline snapshot, even across recalibration
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          Posture Control                          │
//! ├───────────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌──────────────────────────────────┐   ┌───────┐  │
//! │  │ Landmark │──▶│ Processing                       │──▶│ Sink  │  │
//! │  │  Source  │   │ calibration → geometry →         │   │(emit) │  │
//! │  └──────────┘   │ detectors → state machine        │   └───────┘  │
//! │       │         └──────────────────────────────────┘       │      │
//! │       ▼                        │                           ▼      │
//! │  ┌──────────────────────────────────────────────────────────────┐ │
//! │  │                         Diagnostics                          │ │
//! │  └──────────────────────────────────────────────────────────────┘ │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use posture_control::{ChannelSink, Config, Pipeline, ReplaySource};
//! use posture_control::source::synthetic::demo_routine;
//!
//! let frames = demo_routine(chrono::Utc::now(), 33);
//! let (sink, events) = ChannelSink::new();
//! let pipeline = Pipeline::new(Config::default(), ReplaySource::new(frames), sink)
//!     .expect("default configuration is valid");
//!
//! let handle = pipeline.start().expect("Failed to start pipeline");
//! let report = handle.wait().expect("Pipeline failed");
//! println!("{} events", report.events_emitted);
//! for event in events.try_iter() {
//!     println!("{} -> {}", event.kind, event.action);
//! }
//! ```

pub mod config;
pub mod core;
pub mod diagnostics;
pub mod pipeline;
pub mod sink;
pub mod source;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use crate::core::{CalibrationBaseline, ControlEvent, GestureKind, GestureState};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot, PipelineStatus, SharedDiagnostics};
pub use pipeline::{ControlCommand, Pipeline, PipelineError, PipelineHandle};
pub use sink::{ActionMap, ChannelSink, JsonLinesSink, LogSink, SignalSink, SinkError};
pub use source::{JsonLinesSource, LandmarkFrame, LandmarkSource, ReplaySource, SourceError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Calibration instructions that can be displayed to users.
pub const CALIBRATION_INSTRUCTIONS: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║               POSTURE CONTROL - CALIBRATION                      ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  Before gestures are recognized, hold the reference stance:      ║
║                                                                  ║
║    • Face the camera, whole body in view                         ║
║    • Arms straight out to the sides at shoulder height           ║
║    • Feet apart, at least hip width                              ║
║    • Stand upright and hold still for 3 seconds                  ║
║                                                                  ║
║  GESTURES:                                                       ║
║    • Lean left / right           → a / d                         ║
║    • Both hands above shoulders  → w                             ║
║    • Squat                       → s                             ║
║    • Right / left punch forward  → j / k                         ║
║    • Arms crossed                → l                             ║
║                                                                  ║
║  Recalibrate anytime with:                                       ║
║    posture-control recalibrate                                   ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_instructions_contents() {
        assert!(CALIBRATION_INSTRUCTIONS.contains("CALIBRATION"));
        assert!(CALIBRATION_INSTRUCTIONS.contains("Arms straight out"));
        assert!(CALIBRATION_INSTRUCTIONS.contains("posture-control recalibrate"));
    }

    #[test]
    fn test_instructions_match_default_actions() {
        for kind in GestureKind::ALL {
            let action = kind.default_action();
            assert!(
                CALIBRATION_INSTRUCTIONS.contains(&format!("→ {action}"))
                    || CALIBRATION_INSTRUCTIONS.contains(&format!("/ {action}")),
                "missing action {action} for {kind}"
            );
        }
    }
}
