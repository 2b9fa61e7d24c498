//! Calibration of the neutral-pose baseline.
//!
//! The user holds a reference stance (arms straight out, feet apart, facing
//! the camera). Once the stance has been held continuously for the configured
//! duration, the averaged geometry of the holding window becomes the new
//! [`CalibrationBaseline`], which all feature thresholds are measured against.
//!
//! The baseline is shared as an immutable snapshot behind [`SharedBaseline`]:
//! recalibration swaps the whole snapshot, so a reader either sees the old
//! baseline or the new one, never a mix.

use crate::config::StanceConfig;
use crate::core::geometry::{GeometryError, Point2, PoseGeometry};
use crate::source::types::{LandmarkFrame, LandmarkId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Shortest torso accepted as a baseline, in normalized units.
const MIN_TORSO_LENGTH: f64 = 0.01;

/// Neutral pose reference used to normalize every threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBaseline {
    pub shoulder_center: Point2,
    pub hip_center: Point2,
    pub torso_length: f64,
    pub shoulder_width: f64,
    /// Torso tilt while standing straight, in degrees
    pub neutral_tilt_deg: f64,
    /// Mean wrist depth in the reference stance
    pub wrist_neutral_z: f64,
    /// False once a recalibration has been requested
    pub valid: bool,
    pub created_at: DateTime<Utc>,
    /// Increments with every committed calibration
    pub generation: u64,
    /// Holding samples that contributed to the averages
    pub samples: usize,
}

impl CalibrationBaseline {
    /// A baseline taken from a single pose.
    pub fn from_geometry(pose: &PoseGeometry, generation: u64) -> Self {
        Self::from_samples(&[Sample::from(pose)], generation, pose.timestamp)
    }

    fn from_samples(samples: &[Sample], generation: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            shoulder_center: Point2::new(
                samples.iter().map(|s| s.shoulder_center.x).mean(),
                samples.iter().map(|s| s.shoulder_center.y).mean(),
            ),
            hip_center: Point2::new(
                samples.iter().map(|s| s.hip_center.x).mean(),
                samples.iter().map(|s| s.hip_center.y).mean(),
            ),
            torso_length: samples.iter().map(|s| s.torso_length).mean(),
            shoulder_width: samples.iter().map(|s| s.shoulder_width).mean(),
            neutral_tilt_deg: samples.iter().map(|s| s.tilt_deg).mean(),
            wrist_neutral_z: samples.iter().map(|s| s.wrist_z).mean(),
            valid: true,
            created_at,
            generation,
            samples: samples.len(),
        }
    }
}

/// Single-writer, many-reader handle to the current baseline snapshot.
///
/// The lock only guards the pointer swap; readers clone the `Arc` and work
/// against that snapshot for the rest of their cycle.
#[derive(Debug, Clone, Default)]
pub struct SharedBaseline {
    slot: Arc<RwLock<Option<Arc<CalibrationBaseline>>>>,
}

impl SharedBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest snapshot, valid or not.
    pub fn current(&self) -> Option<Arc<CalibrationBaseline>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The latest snapshot if it is still valid.
    pub fn ready(&self) -> Option<Arc<CalibrationBaseline>> {
        self.current().filter(|b| b.valid)
    }

    fn publish(&self, baseline: CalibrationBaseline) {
        let next = Arc::new(baseline);
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(next);
    }

    /// Swap in an invalidated copy; holders of the old snapshot keep it.
    fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = slot.as_ref() {
            let mut stale = CalibrationBaseline::clone(current);
            stale.valid = false;
            *slot = Some(Arc::new(stale));
        }
    }
}

/// Calibration progress states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationState {
    AwaitingPose,
    Holding,
    Ready,
}

/// Why a frame does not match the reference stance.
#[derive(Debug, Clone, PartialEq)]
pub enum StanceViolation {
    MissingLandmarks(Vec<LandmarkId>),
    TorsoTooShort,
    Tilted { degrees: f64 },
    WristsNotLevel,
    ArmsNotExtended { span: f64 },
    FeetTogether { spread: f64 },
}

impl std::fmt::Display for StanceViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StanceViolation::MissingLandmarks(ids) => {
                let names: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                write!(f, "landmarks not visible: {}", names.join(", "))
            }
            StanceViolation::TorsoTooShort => write!(f, "torso not measurable"),
            StanceViolation::Tilted { degrees } => write!(f, "torso tilted {degrees:.1}°"),
            StanceViolation::WristsNotLevel => write!(f, "wrists not at shoulder height"),
            StanceViolation::ArmsNotExtended { span } => {
                write!(f, "arms not extended (span {span:.2} shoulder widths)")
            }
            StanceViolation::FeetTogether { spread } => {
                write!(f, "feet too close (spread {spread:.2} hip widths)")
            }
        }
    }
}

/// Result of feeding one frame to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStatus {
    pub state: CalibrationState,
    /// Fraction of the hold completed, in `[0, 1]`
    pub progress: f64,
    /// Why the current frame was rejected, if it was
    pub violation: Option<StanceViolation>,
}

#[derive(Debug, Clone)]
struct Sample {
    shoulder_center: Point2,
    hip_center: Point2,
    torso_length: f64,
    shoulder_width: f64,
    tilt_deg: f64,
    wrist_z: f64,
}

impl From<&PoseGeometry> for Sample {
    fn from(pose: &PoseGeometry) -> Self {
        Self {
            shoulder_center: pose.shoulder_center(),
            hip_center: pose.hip_center(),
            torso_length: pose.torso_length(),
            shoulder_width: pose.shoulder_width(),
            tilt_deg: pose.tilt_deg(),
            wrist_z: pose.wrist_depth(),
        }
    }
}

#[derive(Debug)]
enum Phase {
    AwaitingPose,
    Holding {
        since: DateTime<Utc>,
        samples: Vec<Sample>,
    },
    Ready,
}

/// State machine that watches for the reference stance and commits baselines.
pub struct CalibrationEngine {
    stance: StanceConfig,
    hold: chrono::Duration,
    min_visibility: f64,
    phase: Phase,
    shared: SharedBaseline,
    generation: u64,
}

impl CalibrationEngine {
    pub fn new(stance: StanceConfig, hold: Duration, min_visibility: f64) -> Self {
        Self {
            stance,
            hold: chrono::Duration::from_std(hold).unwrap_or_else(|_| chrono::Duration::seconds(3)),
            min_visibility,
            phase: Phase::AwaitingPose,
            shared: SharedBaseline::new(),
            generation: 0,
        }
    }

    /// Reader handle for the baseline this engine publishes.
    pub fn baseline(&self) -> SharedBaseline {
        self.shared.clone()
    }

    pub fn state(&self) -> CalibrationState {
        match self.phase {
            Phase::AwaitingPose => CalibrationState::AwaitingPose,
            Phase::Holding { .. } => CalibrationState::Holding,
            Phase::Ready => CalibrationState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Ready)
    }

    /// Feed one frame. Frames are ignored once the engine is ready.
    pub fn update(&mut self, frame: &LandmarkFrame) -> CalibrationStatus {
        if self.is_ready() {
            return self.status(1.0, None);
        }

        let pose = match self.check_stance(frame) {
            Ok(pose) => pose,
            Err(violation) => {
                if matches!(self.phase, Phase::Holding { .. }) {
                    info!(reason = %violation, "Calibration stance lost, waiting for pose");
                }
                self.phase = Phase::AwaitingPose;
                return self.status(0.0, Some(violation));
            }
        };

        match &mut self.phase {
            Phase::AwaitingPose => {
                info!("Calibration stance detected, holding");
                self.phase = Phase::Holding {
                    since: pose.timestamp,
                    samples: vec![Sample::from(&pose)],
                };
                self.status(0.0, None)
            }
            Phase::Holding { since, samples } => {
                samples.push(Sample::from(&pose));
                let elapsed = pose.timestamp - *since;
                if elapsed >= self.hold {
                    let samples = std::mem::take(samples);
                    self.commit(&samples, pose.timestamp);
                    return self.status(1.0, None);
                }
                let progress = elapsed.num_milliseconds().max(0) as f64
                    / self.hold.num_milliseconds().max(1) as f64;
                self.status(progress.min(1.0), None)
            }
            Phase::Ready => self.status(1.0, None),
        }
    }

    /// Return to `AwaitingPose` and invalidate the current baseline.
    pub fn recalibrate(&mut self) {
        info!(generation = self.generation, "Recalibration requested");
        self.shared.invalidate();
        self.phase = Phase::AwaitingPose;
    }

    /// Check a frame against the reference stance.
    pub fn check_stance(&self, frame: &LandmarkFrame) -> Result<PoseGeometry, StanceViolation> {
        let pose = PoseGeometry::from_frame(frame, self.min_visibility).map_err(
            |GeometryError::IncompleteLandmarks { missing }| StanceViolation::MissingLandmarks(missing),
        )?;

        let torso = pose.torso_length();
        let shoulder_width = pose.shoulder_width();
        if torso < MIN_TORSO_LENGTH || shoulder_width < MIN_TORSO_LENGTH {
            return Err(StanceViolation::TorsoTooShort);
        }

        let tilt = pose.tilt_deg();
        if tilt.abs() > self.stance.max_tilt_deg {
            return Err(StanceViolation::Tilted { degrees: tilt });
        }

        let shoulder_y = pose.shoulder_center().y;
        let tolerance = self.stance.wrist_height_tolerance * torso;
        if (pose.left_wrist.y - shoulder_y).abs() > tolerance
            || (pose.right_wrist.y - shoulder_y).abs() > tolerance
        {
            return Err(StanceViolation::WristsNotLevel);
        }

        let span = (pose.right_wrist.x - pose.left_wrist.x).abs() / shoulder_width;
        if span < self.stance.min_arm_span {
            return Err(StanceViolation::ArmsNotExtended { span });
        }

        if let Some(min_spread) = self.stance.min_feet_spread {
            let (left, right) = match (
                frame.visible(LandmarkId::LeftAnkle, self.min_visibility),
                frame.visible(LandmarkId::RightAnkle, self.min_visibility),
            ) {
                (Some(l), Some(r)) => (l, r),
                _ => {
                    let ankles = [LandmarkId::LeftAnkle, LandmarkId::RightAnkle];
                    return Err(StanceViolation::MissingLandmarks(
                        frame.missing(&ankles, self.min_visibility),
                    ));
                }
            };
            let spread = (right.x - left.x).abs() / pose.hip_width().max(MIN_TORSO_LENGTH);
            if spread < min_spread {
                return Err(StanceViolation::FeetTogether { spread });
            }
        }

        Ok(pose)
    }

    fn commit(&mut self, samples: &[Sample], at: DateTime<Utc>) {
        let trim = (samples.len() as f64 * self.stance.trim_fraction).floor() as usize;
        let kept = if samples.len() > 2 * trim {
            &samples[trim..samples.len() - trim]
        } else {
            samples
        };

        self.generation += 1;
        let baseline = CalibrationBaseline::from_samples(kept, self.generation, at);
        let torso_spread = kept.iter().map(|s| s.torso_length).std_dev();

        info!(
            generation = baseline.generation,
            torso_length = baseline.torso_length,
            shoulder_width = baseline.shoulder_width,
            neutral_tilt_deg = baseline.neutral_tilt_deg,
            samples = baseline.samples,
            "Calibration complete"
        );
        debug!(torso_spread, "Calibration torso length spread");

        self.shared.publish(baseline);
        self.phase = Phase::Ready;
    }

    fn status(&self, progress: f64, violation: Option<StanceViolation>) -> CalibrationStatus {
        CalibrationStatus {
            state: self.state(),
            progress,
            violation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::synthetic::PoseBuilder;
    use chrono::Duration as ChronoDuration;

    fn engine() -> CalibrationEngine {
        CalibrationEngine::new(StanceConfig::default(), Duration::from_secs(3), 0.5)
    }

    fn hold_t_pose(engine: &mut CalibrationEngine, start: DateTime<Utc>, ms: i64) -> CalibrationStatus {
        let mut status = None;
        let mut t = 0;
        while t <= ms {
            status = Some(engine.update(&PoseBuilder::t_pose().build(start + ChronoDuration::milliseconds(t))));
            t += 33;
        }
        status.unwrap()
    }

    #[test]
    fn test_neutral_pose_keeps_awaiting() {
        let mut engine = engine();
        let status = engine.update(&PoseBuilder::neutral().build(Utc::now()));

        assert_eq!(status.state, CalibrationState::AwaitingPose);
        assert!(matches!(
            status.violation,
            Some(StanceViolation::WristsNotLevel)
        ));
        assert!(engine.baseline().current().is_none());
    }

    #[test]
    fn test_first_matching_frame_starts_holding() {
        let mut engine = engine();
        let status = engine.update(&PoseBuilder::t_pose().build(Utc::now()));
        assert_eq!(status.state, CalibrationState::Holding);
        assert_eq!(status.progress, 0.0);
    }

    #[test]
    fn test_hold_commits_baseline() {
        let mut engine = engine();
        let status = hold_t_pose(&mut engine, Utc::now(), 3_100);

        assert_eq!(status.state, CalibrationState::Ready);
        let baseline = engine.baseline().ready().unwrap();
        assert!((baseline.torso_length - 0.30).abs() < 1e-9);
        assert!((baseline.shoulder_width - 0.20).abs() < 1e-9);
        assert!(baseline.neutral_tilt_deg.abs() < 1e-9);
        assert_eq!(baseline.generation, 1);
        assert!(baseline.valid);
    }

    #[test]
    fn test_leaving_stance_resets_hold() {
        let mut engine = engine();
        let start = Utc::now();
        hold_t_pose(&mut engine, start, 2_000);
        assert_eq!(engine.state(), CalibrationState::Holding);

        let status = engine.update(&PoseBuilder::neutral().build(start + ChronoDuration::milliseconds(2_050)));
        assert_eq!(status.state, CalibrationState::AwaitingPose);

        // The hold restarts from scratch
        let restart = start + ChronoDuration::milliseconds(2_100);
        let status = hold_t_pose(&mut engine, restart, 2_000);
        assert_eq!(status.state, CalibrationState::Holding);
        assert!(status.progress < 1.0);
    }

    #[test]
    fn test_feet_together_is_rejected() {
        let engine = engine();
        let frame = PoseBuilder::t_pose()
            .place(LandmarkId::LeftAnkle, 0.49, 0.95)
            .place(LandmarkId::RightAnkle, 0.51, 0.95)
            .build(Utc::now());
        assert!(matches!(
            engine.check_stance(&frame),
            Err(StanceViolation::FeetTogether { .. })
        ));
    }

    #[test]
    fn test_recalibrate_invalidates_but_keeps_old_snapshot() {
        let mut engine = engine();
        let start = Utc::now();
        hold_t_pose(&mut engine, start, 3_100);

        let shared = engine.baseline();
        let held = shared.ready().unwrap();

        engine.recalibrate();
        assert_eq!(engine.state(), CalibrationState::AwaitingPose);
        assert!(shared.ready().is_none());
        assert!(!shared.current().unwrap().valid);
        // A reader mid-cycle still holds the old, intact snapshot
        assert!(held.valid);
        assert_eq!(held.generation, 1);

        let shifted = start + ChronoDuration::seconds(10);
        let mut t = 0;
        while t <= 3_100 {
            engine.update(
                &PoseBuilder::t_pose()
                    .shifted(0.0, 0.05)
                    .build(shifted + ChronoDuration::milliseconds(t)),
            );
            t += 33;
        }
        let next = shared.ready().unwrap();
        assert_eq!(next.generation, 2);
        assert!((next.hip_center.y - 0.65).abs() < 1e-9);
    }
}
