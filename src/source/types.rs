//! Landmark types delivered by a pose source.
//!
//! Coordinates are normalized image coordinates: `x` grows to the right of the
//! displayed (mirrored) image, `y` grows downward, and `z` is relative depth
//! where negative values are closer to the camera.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Named anatomical points the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkId {
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl LandmarkId {
    /// All landmark ids, in pose-model order.
    pub const ALL: [LandmarkId; 12] = [
        LandmarkId::LeftShoulder,
        LandmarkId::RightShoulder,
        LandmarkId::LeftElbow,
        LandmarkId::RightElbow,
        LandmarkId::LeftWrist,
        LandmarkId::RightWrist,
        LandmarkId::LeftHip,
        LandmarkId::RightHip,
        LandmarkId::LeftKnee,
        LandmarkId::RightKnee,
        LandmarkId::LeftAnkle,
        LandmarkId::RightAnkle,
    ];

    /// Index of this landmark in the 33-point MediaPipe pose topology.
    pub fn pose_index(self) -> usize {
        match self {
            LandmarkId::LeftShoulder => 11,
            LandmarkId::RightShoulder => 12,
            LandmarkId::LeftElbow => 13,
            LandmarkId::RightElbow => 14,
            LandmarkId::LeftWrist => 15,
            LandmarkId::RightWrist => 16,
            LandmarkId::LeftHip => 23,
            LandmarkId::RightHip => 24,
            LandmarkId::LeftKnee => 25,
            LandmarkId::RightKnee => 26,
            LandmarkId::LeftAnkle => 27,
            LandmarkId::RightAnkle => 28,
        }
    }
}

impl fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LandmarkId::LeftShoulder => "left_shoulder",
            LandmarkId::RightShoulder => "right_shoulder",
            LandmarkId::LeftElbow => "left_elbow",
            LandmarkId::RightElbow => "right_elbow",
            LandmarkId::LeftWrist => "left_wrist",
            LandmarkId::RightWrist => "right_wrist",
            LandmarkId::LeftHip => "left_hip",
            LandmarkId::RightHip => "right_hip",
            LandmarkId::LeftKnee => "left_knee",
            LandmarkId::RightKnee => "right_knee",
            LandmarkId::LeftAnkle => "left_ankle",
            LandmarkId::RightAnkle => "right_ankle",
        };
        f.write_str(name)
    }
}

/// A single landmark observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Model confidence that the point is visible, in `[0, 1]`
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self {
            x,
            y,
            z,
            visibility,
        }
    }

    /// Whether this landmark is confident enough to be used.
    pub fn is_visible(&self, min_visibility: f64) -> bool {
        self.visibility >= min_visibility
    }
}

/// One immutable set of landmarks captured at a single instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// Observed landmarks; absent ids were not reported by the model
    pub landmarks: HashMap<LandmarkId, Landmark>,
}

impl LandmarkFrame {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            landmarks: HashMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, id: LandmarkId, landmark: Landmark) -> Self {
        self.landmarks.insert(id, landmark);
        self
    }

    pub fn get(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    /// Return the landmark only if it is present and confident enough.
    pub fn visible(&self, id: LandmarkId, min_visibility: f64) -> Option<&Landmark> {
        self.landmarks
            .get(&id)
            .filter(|lm| lm.is_visible(min_visibility))
    }

    /// Ids from `required` that are missing or below `min_visibility`.
    pub fn missing(&self, required: &[LandmarkId], min_visibility: f64) -> Vec<LandmarkId> {
        required
            .iter()
            .copied()
            .filter(|id| self.visible(*id, min_visibility).is_none())
            .collect()
    }
}
