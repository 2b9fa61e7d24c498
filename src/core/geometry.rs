//! Feature extraction from landmark frames.
//!
//! Raw landmarks are reduced to a compact [`FeatureVector`] of baseline-relative
//! angles, ratios and velocities. Missing or low-confidence points fail the
//! frame with [`GeometryError::IncompleteLandmarks`] instead of defaulting to
//! zero, so occlusion is never mistaken for a pose.

use crate::core::calibration::CalibrationBaseline;
use crate::source::types::{Landmark, LandmarkFrame, LandmarkId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Below this frame spacing velocities are reported as zero.
const MIN_DT_SECS: f64 = 0.001;

/// A 2D point in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn midpoint(a: &Landmark, b: &Landmark) -> Self {
        Self::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }

    pub fn distance(&self, other: &Point2) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Errors from feature extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Required landmarks are absent or below the visibility minimum
    IncompleteLandmarks { missing: Vec<LandmarkId> },
}

impl std::fmt::Display for GeometryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryError::IncompleteLandmarks { missing } => {
                let names: Vec<String> = missing.iter().map(|id| id.to_string()).collect();
                write!(f, "Incomplete landmarks: {}", names.join(", "))
            }
        }
    }
}

impl std::error::Error for GeometryError {}

/// The validated core points of one frame, before any baseline is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseGeometry {
    pub timestamp: DateTime<Utc>,
    pub left_shoulder: Landmark,
    pub right_shoulder: Landmark,
    pub left_wrist: Landmark,
    pub right_wrist: Landmark,
    pub left_hip: Landmark,
    pub right_hip: Landmark,
}

impl PoseGeometry {
    /// Landmarks every frame must provide.
    pub const REQUIRED: [LandmarkId; 6] = [
        LandmarkId::LeftShoulder,
        LandmarkId::RightShoulder,
        LandmarkId::LeftWrist,
        LandmarkId::RightWrist,
        LandmarkId::LeftHip,
        LandmarkId::RightHip,
    ];

    /// Validate and pick out the core points of a frame.
    pub fn from_frame(frame: &LandmarkFrame, min_visibility: f64) -> Result<Self, GeometryError> {
        let missing = frame.missing(&Self::REQUIRED, min_visibility);
        if !missing.is_empty() {
            return Err(GeometryError::IncompleteLandmarks { missing });
        }

        let point = |id: LandmarkId| -> Result<Landmark, GeometryError> {
            frame
                .visible(id, min_visibility)
                .copied()
                .ok_or_else(|| GeometryError::IncompleteLandmarks { missing: vec![id] })
        };

        Ok(Self {
            timestamp: frame.timestamp,
            left_shoulder: point(LandmarkId::LeftShoulder)?,
            right_shoulder: point(LandmarkId::RightShoulder)?,
            left_wrist: point(LandmarkId::LeftWrist)?,
            right_wrist: point(LandmarkId::RightWrist)?,
            left_hip: point(LandmarkId::LeftHip)?,
            right_hip: point(LandmarkId::RightHip)?,
        })
    }

    pub fn shoulder_center(&self) -> Point2 {
        Point2::midpoint(&self.left_shoulder, &self.right_shoulder)
    }

    pub fn hip_center(&self) -> Point2 {
        Point2::midpoint(&self.left_hip, &self.right_hip)
    }

    /// Distance from hip center to shoulder center.
    pub fn torso_length(&self) -> f64 {
        self.shoulder_center().distance(&self.hip_center())
    }

    pub fn shoulder_width(&self) -> f64 {
        (self.right_shoulder.x - self.left_shoulder.x).hypot(self.right_shoulder.y - self.left_shoulder.y)
    }

    pub fn hip_width(&self) -> f64 {
        (self.right_hip.x - self.left_hip.x).hypot(self.right_hip.y - self.left_hip.y)
    }

    /// Torso angle from vertical in degrees; negative when the shoulders sit
    /// left of the hips.
    pub fn tilt_deg(&self) -> f64 {
        let shoulders = self.shoulder_center();
        let hips = self.hip_center();
        (shoulders.x - hips.x).atan2(hips.y - shoulders.y).to_degrees()
    }

    /// Mean wrist depth.
    pub fn wrist_depth(&self) -> f64 {
        (self.left_wrist.z + self.right_wrist.z) / 2.0
    }

    /// +1 when the body's right side appears at larger x, -1 otherwise.
    pub fn rightward(&self) -> f64 {
        if self.right_shoulder.x >= self.left_shoulder.x {
            1.0
        } else {
            -1.0
        }
    }
}

/// Per-arm features.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArmFeatures {
    /// Wrist height above the shoulder line, in baseline torso lengths
    pub above_shoulder: f64,
    /// Wrist height above the current hip line, in baseline torso lengths
    pub above_hip: f64,
    /// Wrist speed in the image plane, normalized units per second
    pub speed: f64,
    /// Wrist depth relative to the calibrated neutral depth; negative is forward
    pub depth_delta: f64,
    /// Frame-to-frame change in wrist depth, per second
    pub z_velocity: f64,
    /// How far the wrist has crossed past the body center toward the other
    /// side, in baseline torso lengths; negative when it has not crossed
    pub cross_margin: f64,
}

impl ArmFeatures {
    pub fn crosses_center(&self) -> bool {
        self.cross_margin > 0.0
    }

    /// Wrist strictly between the shoulder line and the hip line.
    pub fn in_front_of_torso(&self) -> bool {
        self.above_shoulder < 0.0 && self.above_hip > 0.0
    }
}

/// Features derived from one frame against one baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub timestamp: DateTime<Utc>,
    /// Generation of the baseline every value here was computed against
    pub baseline_generation: u64,
    /// Torso tilt relative to the calibrated neutral angle, in degrees
    pub tilt_deg: f64,
    /// Hip drop below the calibrated hip height, in torso lengths
    pub hip_drop: f64,
    pub left: ArmFeatures,
    pub right: ArmFeatures,
    /// False on the first frame of a run, where velocities are zero
    pub has_motion: bool,
}

#[derive(Debug, Clone)]
struct PriorSample {
    timestamp: DateTime<Utc>,
    left_wrist: Landmark,
    right_wrist: Landmark,
}

/// Turns frames into feature vectors, keeping exactly one prior sample for
/// velocity.
#[derive(Debug)]
pub struct GeometryExtractor {
    min_visibility: f64,
    previous: Option<PriorSample>,
}

impl GeometryExtractor {
    pub fn new(min_visibility: f64) -> Self {
        Self {
            min_visibility,
            previous: None,
        }
    }

    /// Extract features from `frame` against `baseline`.
    ///
    /// An incomplete frame also clears the prior sample, so the next good frame
    /// starts a fresh run with zero velocity.
    pub fn extract(
        &mut self,
        frame: &LandmarkFrame,
        baseline: &CalibrationBaseline,
    ) -> Result<FeatureVector, GeometryError> {
        let pose = match PoseGeometry::from_frame(frame, self.min_visibility) {
            Ok(pose) => pose,
            Err(e) => {
                self.previous = None;
                return Err(e);
            }
        };

        let torso = baseline.torso_length;
        let shoulders = pose.shoulder_center();
        let hips = pose.hip_center();
        let rightward = pose.rightward();

        let dt = self
            .previous
            .as_ref()
            .map(|prev| (pose.timestamp - prev.timestamp).num_microseconds().unwrap_or(0) as f64 / 1e6)
            .filter(|dt| *dt >= MIN_DT_SECS);

        let arm = |wrist: &Landmark, prior: Option<&Landmark>, cross_margin: f64| {
            let (speed, z_velocity) = match (prior, dt) {
                (Some(prev), Some(dt)) => (
                    (wrist.x - prev.x).hypot(wrist.y - prev.y) / dt,
                    (wrist.z - prev.z) / dt,
                ),
                _ => (0.0, 0.0),
            };
            ArmFeatures {
                above_shoulder: (shoulders.y - wrist.y) / torso,
                above_hip: (hips.y - wrist.y) / torso,
                speed,
                depth_delta: wrist.z - baseline.wrist_neutral_z,
                z_velocity,
                cross_margin,
            }
        };

        let left = arm(
            &pose.left_wrist,
            self.previous.as_ref().map(|p| &p.left_wrist),
            rightward * (pose.left_wrist.x - shoulders.x) / torso,
        );
        let right = arm(
            &pose.right_wrist,
            self.previous.as_ref().map(|p| &p.right_wrist),
            rightward * (shoulders.x - pose.right_wrist.x) / torso,
        );

        let features = FeatureVector {
            timestamp: pose.timestamp,
            baseline_generation: baseline.generation,
            tilt_deg: pose.tilt_deg() - baseline.neutral_tilt_deg,
            hip_drop: (hips.y - baseline.hip_center.y) / torso,
            left,
            right,
            has_motion: dt.is_some(),
        };

        self.previous = Some(PriorSample {
            timestamp: pose.timestamp,
            left_wrist: pose.left_wrist,
            right_wrist: pose.right_wrist,
        });

        Ok(features)
    }

    /// Forget the prior sample (after a pause or recalibration).
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
