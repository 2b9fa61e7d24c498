//! Integration tests for the threaded gesture pipeline.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use posture_control::source::synthetic::{demo_routine, PoseBuilder};
use posture_control::{
    ChannelSink, Config, ControlEvent, GestureKind, LandmarkFrame, Pipeline, PipelineError,
    PipelineStatus, ReplaySource, SignalSink, SinkError,
};
use std::thread;
use std::time::{Duration, Instant};

const FRAME_MS: i64 = 33;

fn test_config() -> Config {
    let mut config = Config::default();
    config.timing.calibration_hold = Duration::from_millis(300);
    config.source.poll_timeout = Duration::from_millis(10);
    config.source.retry_backoff = Duration::from_millis(1);
    // Room for scheduling hiccups; the queue-bounding test sets its own
    config.queues.frame_capacity = 64;
    config.paused = false;
    config.diagnostics = false;
    config.data_path = std::env::temp_dir().join("posture-control-test");
    config
}

/// Frames holding `pose` for `count` frames starting at `start`.
fn hold(pose: &PoseBuilder, start: DateTime<Utc>, count: i64) -> Vec<LandmarkFrame> {
    (0..count)
        .map(|i| pose.build(start + ChronoDuration::milliseconds(FRAME_MS * i)))
        .collect()
}

/// A calibration run followed by `rest`, with timestamps laid end to end.
fn session(segments: &[(PoseBuilder, i64)]) -> Vec<LandmarkFrame> {
    let mut frames = Vec::new();
    let mut t = Utc::now();
    let calibration = [(PoseBuilder::t_pose(), 12), (PoseBuilder::neutral(), 3)];
    for (pose, count) in calibration.iter().chain(segments.iter()) {
        frames.extend(hold(pose, t, *count));
        t += ChronoDuration::milliseconds(FRAME_MS * count);
    }
    frames
}

fn run_to_end(config: Config, frames: Vec<LandmarkFrame>) -> Vec<ControlEvent> {
    let source = ReplaySource::new(frames).with_interval(Duration::from_millis(2));
    let (sink, events) = ChannelSink::new();
    let handle = Pipeline::new(config, source, sink)
        .expect("valid config")
        .start()
        .expect("pipeline starts");
    handle.wait().expect("pipeline ends cleanly");
    events.try_iter().collect()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_lean_left_emits_exactly_one_event() {
    let frames = session(&[
        (PoseBuilder::neutral().lean(-20.0), 7),
        (PoseBuilder::neutral(), 5),
    ]);
    let events = run_to_end(test_config(), frames);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, GestureKind::LeanLeft);
    assert_eq!(events[0].action, "a");
}

#[test]
fn test_brief_hands_raised_emits_nothing() {
    let mut frames = session(&[]);
    let t = frames.last().map(|f| f.timestamp).unwrap_or_else(Utc::now);
    for ms in [16, 33, 50, 66] {
        frames.push(
            PoseBuilder::neutral()
                .hands_raised(0.25)
                .build(t + ChronoDuration::milliseconds(ms)),
        );
    }
    frames.extend(hold(
        &PoseBuilder::neutral(),
        t + ChronoDuration::milliseconds(83),
        5,
    ));

    let events = run_to_end(test_config(), frames);
    assert!(events.is_empty(), "unexpected events: {events:?}");
}

#[test]
fn test_demo_routine_emits_every_gesture_in_order() {
    let frames = demo_routine(Utc::now(), FRAME_MS);
    let mut config = test_config();
    config.timing.calibration_hold = Duration::from_secs(3);

    let events = run_to_end(config, frames);
    let kinds: Vec<GestureKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            GestureKind::LeanLeft,
            GestureKind::LeanRight,
            GestureKind::HandsRaised,
            GestureKind::Squat,
            GestureKind::ArmsCrossed,
            GestureKind::RightPunch,
            GestureKind::LeftPunch,
        ]
    );
    assert!(events.windows(2).all(|pair| pair[0].sequence < pair[1].sequence
        && pair[0].timestamp < pair[1].timestamp));
}

#[test]
fn test_frame_queue_stays_bounded_and_newest_wins() {
    let mut config = test_config();
    config.paused = true;
    config.queues.frame_capacity = 2;

    let frames = hold(&PoseBuilder::t_pose(), Utc::now(), 500);
    let (sink, _events) = ChannelSink::new();
    let handle = Pipeline::new(config, ReplaySource::new(frames), sink)
        .expect("valid config")
        .start()
        .expect("pipeline starts");

    assert!(wait_until(Duration::from_secs(5), || {
        handle.diagnostics().frames_acquired == 500
    }));
    let paused = handle.diagnostics();
    assert_eq!(paused.frames_processed, 0);
    assert_eq!(paused.frames_dropped, 498);
    assert_eq!(paused.status, PipelineStatus::Paused);

    // Only the two newest frames remain; resuming jumps to the last one
    handle.resume();
    let report = handle.wait().expect("pipeline ends cleanly");
    assert_eq!(report.frames_processed, 1);
    assert_eq!(report.frames_stale, 1);
}

#[test]
fn test_source_lost_after_consecutive_failures() {
    let mut config = test_config();
    config.source.max_consecutive_failures = 5;

    let source = ReplaySource::new(hold(&PoseBuilder::neutral(), Utc::now(), 3)).with_failures(10);
    let (sink, _events) = ChannelSink::new();
    let handle = Pipeline::new(config, source, sink)
        .expect("valid config")
        .start()
        .expect("pipeline starts");

    assert_eq!(
        handle.wait().unwrap_err(),
        PipelineError::SourceLost {
            consecutive_failures: 5
        }
    );
}

#[test]
fn test_transient_source_failures_are_retried() {
    let mut config = test_config();
    config.source.max_consecutive_failures = 5;

    let source = ReplaySource::new(hold(&PoseBuilder::neutral(), Utc::now(), 3)).with_failures(4);
    let (sink, _events) = ChannelSink::new();
    let handle = Pipeline::new(config, source, sink)
        .expect("valid config")
        .start()
        .expect("pipeline starts");

    let report = handle.wait().expect("retries stay under the limit");
    assert_eq!(report.source_failures, 4);
    assert_eq!(report.frames_acquired, 3);
}

#[test]
fn test_invalid_configuration_is_rejected_at_startup() {
    let mut config = test_config();
    config.priority.retain(|k| *k != GestureKind::ArmsCrossed);

    let (sink, _events) = ChannelSink::new();
    let err = Pipeline::new(config, ReplaySource::new(Vec::new()), sink)
        .err()
        .expect("missing kind must be rejected");
    assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
}

#[test]
fn test_pause_stops_processing_but_not_acquisition() {
    let frames = hold(&PoseBuilder::t_pose(), Utc::now(), 30);
    let source = ReplaySource::new(frames)
        .looping()
        .with_interval(Duration::from_millis(2));
    let (sink, _events) = ChannelSink::new();
    let handle = Pipeline::new(test_config(), source, sink)
        .expect("valid config")
        .start()
        .expect("pipeline starts");

    assert!(wait_until(Duration::from_secs(5), || {
        handle.diagnostics().frames_processed > 10
    }));

    handle.pause();
    thread::sleep(Duration::from_millis(50));
    let before = handle.diagnostics();
    thread::sleep(Duration::from_millis(100));
    let during = handle.diagnostics();
    assert_eq!(during.frames_processed, before.frames_processed);
    assert!(during.frames_acquired > before.frames_acquired);
    assert_eq!(during.status, PipelineStatus::Paused);

    handle.resume();
    assert!(wait_until(Duration::from_secs(5), || {
        handle.diagnostics().frames_processed > during.frames_processed
    }));
    handle.shutdown().expect("clean shutdown");
}

#[test]
fn test_recalibration_commits_a_new_baseline() {
    let frames = hold(&PoseBuilder::t_pose(), Utc::now(), 30);
    let source = ReplaySource::new(frames)
        .looping()
        .with_interval(Duration::from_millis(2));
    let (sink, _events) = ChannelSink::new();
    let handle = Pipeline::new(test_config(), source, sink)
        .expect("valid config")
        .start()
        .expect("pipeline starts");

    assert!(wait_until(Duration::from_secs(5), || {
        handle.diagnostics().calibrations_completed == 1
    }));
    handle.recalibrate();
    assert!(wait_until(Duration::from_secs(5), || {
        handle.diagnostics().calibrations_completed == 2
    }));

    let report = handle.shutdown().expect("clean shutdown");
    assert_eq!(report.calibrations_completed, 2);
    assert_eq!(report.status, PipelineStatus::Stopped);
}

#[test]
fn test_replaying_a_static_hold_is_idempotent() {
    let frames = session(&[(PoseBuilder::neutral().squat(0.35), 6)]);

    // Same frames, same timestamps, several times over
    let squat: Vec<LandmarkFrame> = frames[frames.len() - 6..].to_vec();
    let mut replayed = frames.clone();
    for _ in 0..3 {
        replayed.extend(squat.iter().cloned());
    }

    for input in [frames, replayed] {
        let events = run_to_end(test_config(), input);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, GestureKind::Squat);
    }
}

#[test]
fn test_events_carry_configured_actions() {
    let mut config = test_config();
    config
        .key_mapping
        .insert(GestureKind::Squat, "space".to_string());
    config.key_mapping.remove(&GestureKind::LeanRight);

    let frames = session(&[
        (PoseBuilder::neutral().lean(20.0), 7),
        (PoseBuilder::neutral(), 5),
        (PoseBuilder::neutral().squat(0.35), 7),
        (PoseBuilder::neutral(), 5),
    ]);
    let events = run_to_end(config, frames);

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, GestureKind::Squat);
    assert_eq!(events[0].action, "space");
}

/// A sink that takes far longer than any sane timeout.
struct StalledSink {
    delay: Duration,
}

impl SignalSink for StalledSink {
    fn emit(&mut self, _event: &ControlEvent) -> Result<(), SinkError> {
        thread::sleep(self.delay);
        Ok(())
    }
}

#[test]
fn test_slow_sink_cannot_stall_shutdown() {
    let mut config = test_config();
    config.timing.sink_timeout = Duration::from_millis(50);

    let frames = session(&[(PoseBuilder::neutral().lean(-20.0), 60)]);
    let source = ReplaySource::new(frames)
        .looping()
        .with_interval(Duration::from_millis(2));
    let sink = StalledSink {
        delay: Duration::from_secs(3),
    };
    let handle = Pipeline::new(config, source, sink)
        .expect("valid config")
        .start()
        .expect("pipeline starts");

    assert!(wait_until(Duration::from_secs(5), || {
        handle.diagnostics().sink_failures >= 1
    }));

    let started = Instant::now();
    let report = handle.shutdown().expect("clean shutdown");
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "shutdown took {:?}",
        started.elapsed()
    );
    assert_eq!(report.events_emitted, 0);
    assert!(report.sink_failures >= 1);
}
