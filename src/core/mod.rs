//! Core gesture recognition.
//!
//! This module contains:
//! - Feature extraction from landmark frames against a calibrated baseline
//! - Calibration of the neutral-pose baseline
//! - Stateless gesture detectors
//! - The per-kind confirmation/cooldown state machine with priority arbitration

pub mod calibration;
pub mod detectors;
pub mod geometry;
pub mod gesture;
pub mod state_machine;

// Re-export commonly used types
pub use calibration::{
    CalibrationBaseline, CalibrationEngine, CalibrationState, CalibrationStatus, SharedBaseline,
    StanceViolation,
};
pub use detectors::{CandidateSet, Detection, DetectorSet, FeatureHistory, GestureDetector};
pub use geometry::{ArmFeatures, FeatureVector, GeometryError, GeometryExtractor, PoseGeometry};
pub use gesture::{ControlEvent, GestureKind};
pub use state_machine::{Confirmation, GestureState, GestureStateMachine};
