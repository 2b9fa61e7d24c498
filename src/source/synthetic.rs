//! Synthetic pose generation for demos, simulation mode and tests.
//!
//! The neutral pose has a torso length of 0.30 and a shoulder width of 0.20 in
//! normalized image units.

use crate::source::types::{Landmark, LandmarkFrame, LandmarkId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Torso length of the neutral synthetic pose.
pub const SYNTHETIC_TORSO_LENGTH: f64 = 0.30;

/// Side of the body, used by arm-specific poses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Builds landmark frames for a single synthetic body.
#[derive(Debug, Clone)]
pub struct PoseBuilder {
    points: HashMap<LandmarkId, Landmark>,
}

impl PoseBuilder {
    /// Upright, arms relaxed at the sides.
    pub fn neutral() -> Self {
        use LandmarkId::*;
        let points = [
            (LeftShoulder, 0.40, 0.30),
            (RightShoulder, 0.60, 0.30),
            (LeftElbow, 0.38, 0.45),
            (RightElbow, 0.62, 0.45),
            (LeftWrist, 0.37, 0.58),
            (RightWrist, 0.63, 0.58),
            (LeftHip, 0.43, 0.60),
            (RightHip, 0.57, 0.60),
            (LeftKnee, 0.43, 0.78),
            (RightKnee, 0.57, 0.78),
            (LeftAnkle, 0.43, 0.95),
            (RightAnkle, 0.57, 0.95),
        ]
        .into_iter()
        .map(|(id, x, y)| (id, Landmark::new(x, y, 0.0, 0.99)))
        .collect();

        Self { points }
    }

    /// Calibration stance: arms straight out to the sides, feet apart.
    pub fn t_pose() -> Self {
        use LandmarkId::*;
        Self::neutral()
            .place(LeftElbow, 0.25, 0.30)
            .place(RightElbow, 0.75, 0.30)
            .place(LeftWrist, 0.10, 0.30)
            .place(RightWrist, 0.90, 0.30)
            .place(LeftKnee, 0.40, 0.78)
            .place(RightKnee, 0.60, 0.78)
            .place(LeftAnkle, 0.38, 0.95)
            .place(RightAnkle, 0.62, 0.95)
    }

    /// Rotate the upper body around the hip center; negative degrees lean left.
    pub fn lean(mut self, degrees: f64) -> Self {
        use LandmarkId::*;
        let hip = self.hip_center();
        let (sin, cos) = degrees.to_radians().sin_cos();
        for id in [
            LeftShoulder,
            RightShoulder,
            LeftElbow,
            RightElbow,
            LeftWrist,
            RightWrist,
        ] {
            if let Some(lm) = self.points.get_mut(&id) {
                let dx = lm.x - hip.0;
                let dy = lm.y - hip.1;
                lm.x = hip.0 + dx * cos - dy * sin;
                lm.y = hip.1 + dx * sin + dy * cos;
            }
        }
        self
    }

    /// Both wrists above the shoulder line by `ratio` torso lengths.
    pub fn hands_raised(self, ratio: f64) -> Self {
        use LandmarkId::*;
        let shoulder_y = self.shoulder_y();
        let wrist_y = shoulder_y - ratio * SYNTHETIC_TORSO_LENGTH;
        self.place(LeftElbow, 0.38, (shoulder_y + wrist_y) / 2.0)
            .place(RightElbow, 0.62, (shoulder_y + wrist_y) / 2.0)
            .place(LeftWrist, 0.38, wrist_y)
            .place(RightWrist, 0.62, wrist_y)
    }

    /// Lower everything above the knees by `ratio` torso lengths.
    pub fn squat(mut self, ratio: f64) -> Self {
        use LandmarkId::*;
        let drop = ratio * SYNTHETIC_TORSO_LENGTH;
        for id in [
            LeftShoulder,
            RightShoulder,
            LeftElbow,
            RightElbow,
            LeftWrist,
            RightWrist,
            LeftHip,
            RightHip,
        ] {
            if let Some(lm) = self.points.get_mut(&id) {
                lm.y += drop;
            }
        }
        self
    }

    /// Wrists crossed in front of the chest.
    pub fn arms_crossed(self) -> Self {
        use LandmarkId::*;
        self.place(LeftElbow, 0.45, 0.45)
            .place(RightElbow, 0.55, 0.45)
            .place(LeftWrist, 0.58, 0.42)
            .place(RightWrist, 0.42, 0.42)
    }

    /// Extend one arm toward the camera by `depth`, moving the wrist `reach`
    /// of the way from its current position to the shoulder (values above 1
    /// carry it past the shoulder).
    pub fn punch(self, side: Side, reach: f64, depth: f64) -> Self {
        let (shoulder, elbow, wrist) = match side {
            Side::Left => (
                LandmarkId::LeftShoulder,
                LandmarkId::LeftElbow,
                LandmarkId::LeftWrist,
            ),
            Side::Right => (
                LandmarkId::RightShoulder,
                LandmarkId::RightElbow,
                LandmarkId::RightWrist,
            ),
        };
        let target = match self.points.get(&shoulder) {
            Some(lm) => (lm.x, lm.y),
            None => return self,
        };
        let mut builder = self;
        if let Some(lm) = builder.points.get_mut(&wrist) {
            lm.x += (target.0 - lm.x) * reach;
            lm.y += (target.1 - lm.y) * reach;
            lm.z = -depth;
        }
        if let Some(lm) = builder.points.get_mut(&elbow) {
            lm.z = -depth / 2.0;
        }
        builder
    }

    /// Translate the whole body.
    pub fn shifted(mut self, dx: f64, dy: f64) -> Self {
        for lm in self.points.values_mut() {
            lm.x += dx;
            lm.y += dy;
        }
        self
    }

    /// Override the visibility of one landmark.
    pub fn with_visibility(mut self, id: LandmarkId, visibility: f64) -> Self {
        if let Some(lm) = self.points.get_mut(&id) {
            lm.visibility = visibility;
        }
        self
    }

    /// Drop a landmark entirely, as if the model did not report it.
    pub fn without(mut self, id: LandmarkId) -> Self {
        self.points.remove(&id);
        self
    }

    /// Set a landmark's image position, keeping depth and visibility.
    pub fn place(mut self, id: LandmarkId, x: f64, y: f64) -> Self {
        let lm = self
            .points
            .entry(id)
            .or_insert_with(|| Landmark::new(x, y, 0.0, 0.99));
        lm.x = x;
        lm.y = y;
        self
    }

    /// Produce an immutable frame stamped at `timestamp`.
    pub fn build(&self, timestamp: DateTime<Utc>) -> LandmarkFrame {
        LandmarkFrame {
            timestamp,
            landmarks: self.points.clone(),
        }
    }

    fn hip_center(&self) -> (f64, f64) {
        midpoint(
            self.points.get(&LandmarkId::LeftHip),
            self.points.get(&LandmarkId::RightHip),
        )
    }

    fn shoulder_y(&self) -> f64 {
        midpoint(
            self.points.get(&LandmarkId::LeftShoulder),
            self.points.get(&LandmarkId::RightShoulder),
        )
        .1
    }
}

fn midpoint(a: Option<&Landmark>, b: Option<&Landmark>) -> (f64, f64) {
    match (a, b) {
        (Some(a), Some(b)) => ((a.x + b.x) / 2.0, (a.y + b.y) / 2.0),
        (Some(p), None) | (None, Some(p)) => (p.x, p.y),
        (None, None) => (0.5, 0.5),
    }
}

/// Scripted routine used by `posture-control start --simulate` and the demo:
/// calibrate in a T-pose, then cycle through every gesture with neutral gaps.
pub fn demo_routine(start: DateTime<Utc>, frame_interval_ms: i64) -> Vec<LandmarkFrame> {
    let mut frames = Vec::new();
    let mut t = start;
    let step = chrono::Duration::milliseconds(frame_interval_ms);
    let mut hold = |builder: PoseBuilder, ms: i64, frames: &mut Vec<LandmarkFrame>| {
        let count = (ms / frame_interval_ms).max(1);
        for _ in 0..count {
            frames.push(builder.build(t));
            t += step;
        }
    };

    hold(PoseBuilder::neutral(), 500, &mut frames);
    hold(PoseBuilder::t_pose(), 3_500, &mut frames);
    hold(PoseBuilder::neutral(), 500, &mut frames);

    let poses = [
        PoseBuilder::neutral().lean(-20.0),
        PoseBuilder::neutral().lean(20.0),
        PoseBuilder::neutral().hands_raised(0.3),
        PoseBuilder::neutral().squat(0.35),
        PoseBuilder::neutral().arms_crossed(),
    ];
    for pose in poses {
        hold(pose, 400, &mut frames);
        hold(PoseBuilder::neutral(), 600, &mut frames);
    }

    for side in [Side::Right, Side::Left] {
        for step in 1..=9 {
            let reach = 0.2 * f64::from(step);
            hold(PoseBuilder::neutral().punch(side, reach, 0.2 * reach), 0, &mut frames);
        }
        hold(PoseBuilder::neutral(), 600, &mut frames);
    }

    frames
}
