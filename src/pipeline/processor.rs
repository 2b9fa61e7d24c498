//! One synchronous processing cycle.
//!
//! [`FrameProcessor`] owns every piece of per-session mutable state the
//! processing stage needs (calibration, the short feature history, the
//! gesture state table) and turns one frame into at most one event. It has
//! no threads of its own, so it can be driven directly in tests.

use crate::config::Config;
use crate::core::calibration::{CalibrationEngine, CalibrationState, CalibrationStatus, SharedBaseline};
use crate::core::detectors::{CandidateSet, DetectorSet, FeatureHistory};
use crate::core::geometry::{FeatureVector, GeometryError, GeometryExtractor};
use crate::core::gesture::{ControlEvent, GestureKind};
use crate::core::state_machine::GestureStateMachine;
use crate::sink::ActionMap;
use crate::source::types::LandmarkFrame;
use tracing::{debug, info};

/// What one cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No baseline yet; the frame fed calibration instead
    Calibrating(CalibrationStatus),
    /// The frame lacked required landmarks and was skipped
    NoPose(GeometryError),
    /// Features were extracted; nothing was confirmed
    Tracking { active: usize },
    /// A gesture was confirmed and mapped to an action
    Emitted(ControlEvent),
    /// A gesture was confirmed but has no mapped action
    Unmapped(GestureKind),
}

/// Runs extraction, detection and confirmation for one frame at a time.
pub struct FrameProcessor {
    calibration: CalibrationEngine,
    baseline: SharedBaseline,
    extractor: GeometryExtractor,
    detectors: DetectorSet,
    history: FeatureHistory,
    gestures: GestureStateMachine,
    actions: ActionMap,
    sequence: u64,
    last_features: Option<FeatureVector>,
}

impl FrameProcessor {
    pub fn new(config: &Config, actions: ActionMap) -> Self {
        let calibration = CalibrationEngine::new(
            config.calibration.clone(),
            config.timing.calibration_hold,
            config.thresholds.min_visibility,
        );
        Self {
            baseline: calibration.baseline(),
            calibration,
            extractor: GeometryExtractor::new(config.thresholds.min_visibility),
            detectors: DetectorSet::new(&config.thresholds),
            history: FeatureHistory::default(),
            gestures: GestureStateMachine::new(
                config.priority.clone(),
                config.timing.confirmation,
                config.timing.cooldown,
            ),
            actions,
            sequence: 0,
            last_features: None,
        }
    }

    /// Reader handle for the published baseline.
    pub fn baseline(&self) -> SharedBaseline {
        self.baseline.clone()
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.state()
    }

    pub fn gestures(&self) -> &GestureStateMachine {
        &self.gestures
    }

    /// Features from the most recent complete frame.
    pub fn last_features(&self) -> Option<&FeatureVector> {
        self.last_features.as_ref()
    }

    /// Process one frame.
    pub fn process(&mut self, frame: &LandmarkFrame) -> CycleOutcome {
        // One snapshot per cycle: a concurrent recalibration cannot mix baselines
        let baseline = match self.baseline.ready() {
            Some(baseline) if self.calibration.is_ready() => baseline,
            _ => {
                let status = self.calibration.update(frame);
                if status.state == CalibrationState::Ready {
                    self.reset_motion();
                }
                return CycleOutcome::Calibrating(status);
            }
        };

        let features = match self.extractor.extract(frame, &baseline) {
            Ok(features) => features,
            Err(e) => {
                // Occlusion counts as the gesture not being present
                self.history.clear();
                self.last_features = None;
                self.gestures.update(&CandidateSet::default(), frame.timestamp);
                return CycleOutcome::NoPose(e);
            }
        };

        self.history.push(features.clone());
        let candidates = self.detectors.evaluate(&features, &self.history);
        let confirmed = self.gestures.update(&candidates, features.timestamp);
        let active = candidates.active_kinds().count();
        self.last_features = Some(features);

        let Some(confirmation) = confirmed else {
            return CycleOutcome::Tracking { active };
        };

        match self.actions.action_for(confirmation.kind) {
            Some(action) => {
                self.sequence += 1;
                let event = ControlEvent {
                    kind: confirmation.kind,
                    action: action.to_string(),
                    timestamp: confirmation.timestamp,
                    confidence: confirmation.confidence,
                    sequence: self.sequence,
                };
                debug!(
                    gesture = %event.kind,
                    action = %event.action,
                    confidence = event.confidence,
                    "Gesture confirmed"
                );
                CycleOutcome::Emitted(event)
            }
            None => {
                debug!(gesture = %confirmation.kind, "Gesture confirmed without mapped action");
                CycleOutcome::Unmapped(confirmation.kind)
            }
        }
    }

    /// Drop the baseline and start calibrating again.
    pub fn recalibrate(&mut self) {
        self.calibration.recalibrate();
        self.reset_motion();
    }

    /// Forget velocity history and partial confirmations.
    pub fn reset_motion(&mut self) {
        self.extractor.reset();
        self.history.clear();
        self.gestures.reset();
        self.last_features = None;
        info!("Gesture tracking reset");
    }
}
