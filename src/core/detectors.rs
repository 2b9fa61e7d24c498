//! Gesture detectors.
//!
//! Each detector is a stateless predicate over the current [`FeatureVector`]
//! and a short [`FeatureHistory`]. Detectors never share mutable state, so
//! they can be evaluated in any order (or concurrently).

use crate::config::Thresholds;
use crate::core::geometry::{ArmFeatures, FeatureVector};
use crate::core::gesture::GestureKind;
use std::collections::VecDeque;

/// Samples kept for velocity smoothing.
pub const HISTORY_LEN: usize = 3;

/// One detector's raw, unconfirmed opinion about one gesture kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub kind: GestureKind,
    pub active: bool,
    /// Relative distance past (positive) or short of (negative) the threshold
    pub margin: f64,
}

impl Detection {
    fn idle(kind: GestureKind) -> Self {
        Self {
            kind,
            active: false,
            margin: -1.0,
        }
    }

    /// Margin mapped to `[0, 1]`; 0.5 sits exactly on the threshold.
    pub fn confidence(&self) -> f64 {
        (0.5 + 0.5 * self.margin.min(1.0)).clamp(0.0, 1.0)
    }
}

/// Candidate-active signals for every kind in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet {
    detections: [Detection; GestureKind::COUNT],
}

impl Default for CandidateSet {
    fn default() -> Self {
        Self {
            detections: GestureKind::ALL.map(Detection::idle),
        }
    }
}

impl CandidateSet {
    /// A set with only the given kinds active.
    pub fn with_active(kinds: &[GestureKind]) -> Self {
        let mut set = Self::default();
        for kind in kinds {
            set.record(*kind, true, 0.5);
        }
        set
    }

    pub fn record(&mut self, kind: GestureKind, active: bool, margin: f64) {
        self.detections[kind.index()] = Detection {
            kind,
            active,
            margin,
        };
    }

    pub fn get(&self, kind: GestureKind) -> &Detection {
        &self.detections[kind.index()]
    }

    pub fn is_active(&self, kind: GestureKind) -> bool {
        self.get(kind).active
    }

    pub fn active_kinds(&self) -> impl Iterator<Item = GestureKind> + '_ {
        self.detections.iter().filter(|d| d.active).map(|d| d.kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }
}

/// Rolling window of the most recent feature vectors, newest last.
#[derive(Debug, Clone)]
pub struct FeatureHistory {
    samples: VecDeque<FeatureVector>,
    capacity: usize,
}

impl Default for FeatureHistory {
    fn default() -> Self {
        Self::new(HISTORY_LEN)
    }
}

impl FeatureHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, features: FeatureVector) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(features);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&FeatureVector> {
        self.samples.back()
    }

    /// Mean wrist speed of one arm across the window.
    pub fn mean_speed(&self, arm: impl Fn(&FeatureVector) -> &ArmFeatures) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f64 = self.samples.iter().map(|f| arm(f).speed).sum();
        Some(total / self.samples.len() as f64)
    }
}

/// A classifier for one or more gesture kinds.
pub trait GestureDetector: Send + Sync {
    /// Kinds this detector reports on.
    fn kinds(&self) -> &'static [GestureKind];

    /// Record a detection for each of [`kinds`](Self::kinds) into `out`.
    fn detect(&self, features: &FeatureVector, history: &FeatureHistory, out: &mut CandidateSet);
}

/// Torso tilt past the lean angle; the sign picks the side.
pub struct LeanDetector {
    pub angle_deg: f64,
}

impl GestureDetector for LeanDetector {
    fn kinds(&self) -> &'static [GestureKind] {
        &[GestureKind::LeanLeft, GestureKind::LeanRight]
    }

    fn detect(&self, features: &FeatureVector, _history: &FeatureHistory, out: &mut CandidateSet) {
        let tilt = features.tilt_deg;
        let margin = (tilt.abs() - self.angle_deg) / self.angle_deg;
        let active = tilt.abs() > self.angle_deg;
        out.record(GestureKind::LeanLeft, active && tilt < 0.0, margin);
        out.record(GestureKind::LeanRight, active && tilt > 0.0, margin);
    }
}

/// Both wrists above the shoulder line.
pub struct HandsRaisedDetector {
    pub ratio: f64,
}

impl GestureDetector for HandsRaisedDetector {
    fn kinds(&self) -> &'static [GestureKind] {
        &[GestureKind::HandsRaised]
    }

    fn detect(&self, features: &FeatureVector, _history: &FeatureHistory, out: &mut CandidateSet) {
        let lowest = features.left.above_shoulder.min(features.right.above_shoulder);
        out.record(
            GestureKind::HandsRaised,
            lowest > self.ratio,
            (lowest - self.ratio) / self.ratio,
        );
    }
}

/// Hips lowered below the calibrated height.
pub struct SquatDetector {
    pub ratio: f64,
}

impl GestureDetector for SquatDetector {
    fn kinds(&self) -> &'static [GestureKind] {
        &[GestureKind::Squat]
    }

    fn detect(&self, features: &FeatureVector, _history: &FeatureHistory, out: &mut CandidateSet) {
        out.record(
            GestureKind::Squat,
            features.hip_drop > self.ratio,
            (features.hip_drop - self.ratio) / self.ratio,
        );
    }
}

/// Fast forward wrist motion, evaluated per arm.
pub struct PunchDetector {
    pub speed: f64,
    pub depth: f64,
}

impl PunchDetector {
    fn arm(&self, current: &ArmFeatures, smoothed_speed: f64) -> (bool, f64) {
        let speed_margin = (smoothed_speed - self.speed) / self.speed;
        let depth_margin = (-current.depth_delta - self.depth) / self.depth;
        let active = smoothed_speed > self.speed && current.depth_delta < -self.depth;
        (active, speed_margin.min(depth_margin))
    }
}

impl GestureDetector for PunchDetector {
    fn kinds(&self) -> &'static [GestureKind] {
        &[GestureKind::RightPunch, GestureKind::LeftPunch]
    }

    fn detect(&self, features: &FeatureVector, history: &FeatureHistory, out: &mut CandidateSet) {
        let right_speed = history
            .mean_speed(|f| &f.right)
            .unwrap_or(features.right.speed);
        let left_speed = history.mean_speed(|f| &f.left).unwrap_or(features.left.speed);

        let (active, margin) = self.arm(&features.right, right_speed);
        out.record(GestureKind::RightPunch, active, margin);
        let (active, margin) = self.arm(&features.left, left_speed);
        out.record(GestureKind::LeftPunch, active, margin);
    }
}

/// Each wrist past the body center on the opposite side, held between the
/// shoulder line and the hip line.
pub struct ArmsCrossedDetector {
    pub offset: f64,
}

impl GestureDetector for ArmsCrossedDetector {
    fn kinds(&self) -> &'static [GestureKind] {
        &[GestureKind::ArmsCrossed]
    }

    fn detect(&self, features: &FeatureVector, _history: &FeatureHistory, out: &mut CandidateSet) {
        let least = features.left.cross_margin.min(features.right.cross_margin);
        out.record(
            GestureKind::ArmsCrossed,
            features.left.crosses_center()
                && features.right.crosses_center()
                && features.left.in_front_of_torso()
                && features.right.in_front_of_torso()
                && least > self.offset,
            least - self.offset,
        );
    }
}

/// The fixed set of detectors run every cycle.
pub struct DetectorSet {
    detectors: Vec<Box<dyn GestureDetector>>,
}

impl DetectorSet {
    pub fn new(thresholds: &Thresholds) -> Self {
        Self {
            detectors: vec![
                Box::new(LeanDetector {
                    angle_deg: thresholds.lean_angle_deg,
                }),
                Box::new(HandsRaisedDetector {
                    ratio: thresholds.hands_raised_ratio,
                }),
                Box::new(SquatDetector {
                    ratio: thresholds.squat_drop_ratio,
                }),
                Box::new(PunchDetector {
                    speed: thresholds.punch_speed,
                    depth: thresholds.punch_depth,
                }),
                Box::new(ArmsCrossedDetector {
                    offset: thresholds.crossed_arms_offset,
                }),
            ],
        }
    }

    /// Run every detector once against the same inputs.
    pub fn evaluate(&self, features: &FeatureVector, history: &FeatureHistory) -> CandidateSet {
        let mut candidates = CandidateSet::default();
        for detector in &self.detectors {
            detector.detect(features, history, &mut candidates);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calibration::CalibrationBaseline;
    use crate::core::geometry::{GeometryExtractor, PoseGeometry};
    use crate::source::synthetic::{PoseBuilder, Side};
    use crate::source::types::LandmarkFrame;
    use chrono::{Duration, Utc};

    fn baseline() -> CalibrationBaseline {
        CalibrationBaseline::from_geometry(
            &PoseGeometry::from_frame(&PoseBuilder::t_pose().build(Utc::now()), 0.5).unwrap(),
            1,
        )
    }

    /// Run frames through extraction and detection, returning the last set.
    fn evaluate(frames: &[LandmarkFrame]) -> CandidateSet {
        let base = baseline();
        let detectors = DetectorSet::new(&Thresholds::default());
        let mut extractor = GeometryExtractor::new(0.5);
        let mut history = FeatureHistory::default();
        let mut last = CandidateSet::default();
        for frame in frames {
            let features = extractor.extract(frame, &base).unwrap();
            history.push(features.clone());
            last = detectors.evaluate(&features, &history);
        }
        last
    }

    fn single(builder: PoseBuilder) -> CandidateSet {
        evaluate(&[builder.build(Utc::now())])
    }

    #[test]
    fn test_neutral_pose_has_no_candidates() {
        let set = single(PoseBuilder::neutral());
        assert_eq!(set.active_kinds().count(), 0);
    }

    #[test]
    fn test_lean_direction_from_sign() {
        let left = single(PoseBuilder::neutral().lean(-20.0));
        assert!(left.is_active(GestureKind::LeanLeft));
        assert!(!left.is_active(GestureKind::LeanRight));

        let right = single(PoseBuilder::neutral().lean(20.0));
        assert!(right.is_active(GestureKind::LeanRight));
        assert!(!right.is_active(GestureKind::LeanLeft));

        let slight = single(PoseBuilder::neutral().lean(-10.0));
        assert!(!slight.is_active(GestureKind::LeanLeft));
    }

    #[test]
    fn test_hands_raised_threshold() {
        assert!(single(PoseBuilder::neutral().hands_raised(0.25)).is_active(GestureKind::HandsRaised));
        assert!(!single(PoseBuilder::neutral().hands_raised(0.15)).is_active(GestureKind::HandsRaised));
    }

    #[test]
    fn test_squat_threshold() {
        assert!(single(PoseBuilder::neutral().squat(0.3)).is_active(GestureKind::Squat));
        assert!(!single(PoseBuilder::neutral().squat(0.2)).is_active(GestureKind::Squat));
    }

    #[test]
    fn test_arms_crossed() {
        let set = single(PoseBuilder::neutral().arms_crossed());
        assert!(set.is_active(GestureKind::ArmsCrossed));
    }

    #[test]
    fn test_arms_crossed_only_in_front_of_torso() {
        use crate::source::types::LandmarkId;

        // Crossed overhead reads as hands raised only
        let overhead = single(
            PoseBuilder::neutral()
                .place(LandmarkId::LeftWrist, 0.58, 0.05)
                .place(LandmarkId::RightWrist, 0.42, 0.05),
        );
        assert!(!overhead.is_active(GestureKind::ArmsCrossed));
        assert!(overhead.is_active(GestureKind::HandsRaised));

        let below_hips = single(
            PoseBuilder::neutral()
                .place(LandmarkId::LeftWrist, 0.58, 0.75)
                .place(LandmarkId::RightWrist, 0.42, 0.75),
        );
        assert!(!below_hips.is_active(GestureKind::ArmsCrossed));
        assert_eq!(below_hips.active_kinds().count(), 0);
    }

    #[test]
    fn test_punch_needs_speed_and_depth() {
        let t0 = Utc::now();
        let step = Duration::milliseconds(33);
        let frames: Vec<LandmarkFrame> = (0..=5)
            .map(|i| {
                let reach = 0.2 * f64::from(i);
                PoseBuilder::neutral()
                    .punch(Side::Right, reach, 0.2 * reach)
                    .build(t0 + step * i)
            })
            .collect();
        let set = evaluate(&frames);
        assert!(set.is_active(GestureKind::RightPunch));
        assert!(!set.is_active(GestureKind::LeftPunch));

        // Deep but still: no speed
        let still = evaluate(&[
            PoseBuilder::neutral().punch(Side::Left, 1.0, 0.3).build(t0),
            PoseBuilder::neutral().punch(Side::Left, 1.0, 0.3).build(t0 + step),
        ]);
        assert!(!still.is_active(GestureKind::LeftPunch));
    }

    #[test]
    fn test_confidence_is_bounded() {
        let set = single(PoseBuilder::neutral().lean(-40.0));
        let confidence = set.get(GestureKind::LeanLeft).confidence();
        assert!(confidence > 0.5 && confidence <= 1.0);
        assert_eq!(set.get(GestureKind::Squat).confidence(), 0.0);
    }
}
