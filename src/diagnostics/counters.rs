//! Lock-free pipeline counters.
//!
//! Every stage records into the same [`Diagnostics`] through relaxed atomics,
//! so sampling a snapshot from another thread never blocks or slows the
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Coarse, user-facing pipeline status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Starting,
    Calibrating,
    NoPose,
    Tracking,
    Paused,
    Stopped,
}

impl PipelineStatus {
    fn as_u8(self) -> u8 {
        match self {
            PipelineStatus::Starting => 0,
            PipelineStatus::Calibrating => 1,
            PipelineStatus::NoPose => 2,
            PipelineStatus::Tracking => 3,
            PipelineStatus::Paused => 4,
            PipelineStatus::Stopped => 5,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => PipelineStatus::Calibrating,
            2 => PipelineStatus::NoPose,
            3 => PipelineStatus::Tracking,
            4 => PipelineStatus::Paused,
            5 => PipelineStatus::Stopped,
            _ => PipelineStatus::Starting,
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PipelineStatus::Starting => "starting",
            PipelineStatus::Calibrating => "calibrating",
            PipelineStatus::NoPose => "no pose detected",
            PipelineStatus::Tracking => "tracking",
            PipelineStatus::Paused => "paused",
            PipelineStatus::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// Counters for the current session.
#[derive(Debug)]
pub struct Diagnostics {
    /// Frames accepted from the source
    frames_acquired: AtomicU64,
    /// Frames evicted from a full frame queue
    frames_dropped: AtomicU64,
    /// Frames skipped because a newer one was already queued
    frames_stale: AtomicU64,
    /// Frames that completed a processing cycle
    frames_processed: AtomicU64,
    /// Frames rejected for missing or low-visibility landmarks
    frames_incomplete: AtomicU64,
    source_failures: AtomicU64,
    events_emitted: AtomicU64,
    events_dropped: AtomicU64,
    /// Gestures confirmed without a mapped action
    events_unmapped: AtomicU64,
    sink_failures: AtomicU64,
    last_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
    latency_overruns: AtomicU64,
    frame_queue_depth: AtomicU64,
    event_queue_depth: AtomicU64,
    status: AtomicU8,
    /// Calibration hold progress in thousandths
    calibration_progress: AtomicU64,
    /// Baselines committed this session
    calibrations_completed: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
    /// Totals loaded from previous sessions
    previous: PersistedTotals,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            frames_acquired: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            frames_stale: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            frames_incomplete: AtomicU64::new(0),
            source_failures: AtomicU64::new(0),
            events_emitted: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            events_unmapped: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            last_latency_us: AtomicU64::new(0),
            max_latency_us: AtomicU64::new(0),
            latency_overruns: AtomicU64::new(0),
            frame_queue_depth: AtomicU64::new(0),
            event_queue_depth: AtomicU64::new(0),
            status: AtomicU8::new(PipelineStatus::Starting.as_u8()),
            calibration_progress: AtomicU64::new(0),
            calibrations_completed: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
            previous: PersistedTotals::default(),
        }
    }

    /// Create diagnostics that carry cumulative totals across sessions.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut diagnostics = Self::new();
        diagnostics.persist_path = Some(path);

        if let Err(e) = diagnostics.load() {
            debug!(error = %e, "Could not load previous diagnostics totals");
        }

        diagnostics
    }

    pub fn record_frame_acquired(&self) {
        self.frames_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frames_stale(&self, count: u64) {
        self.frames_stale.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_frame_processed(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_incomplete(&self) {
        self.frames_incomplete.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_failure(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_emitted(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_unmapped(&self) {
        self.events_unmapped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one cycle's latency; returns true when it exceeded `budget`.
    pub fn record_latency(&self, latency: Duration, budget: Duration) -> bool {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.last_latency_us.store(micros, Ordering::Relaxed);
        self.max_latency_us.fetch_max(micros, Ordering::Relaxed);
        let over = latency > budget;
        if over {
            self.latency_overruns.fetch_add(1, Ordering::Relaxed);
        }
        over
    }

    pub fn set_queue_depths(&self, frames: usize, events: usize) {
        self.frame_queue_depth.store(frames as u64, Ordering::Relaxed);
        self.event_queue_depth.store(events as u64, Ordering::Relaxed);
    }

    pub fn set_status(&self, status: PipelineStatus) {
        self.status.store(status.as_u8(), Ordering::Relaxed);
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    pub fn set_calibration_progress(&self, progress: f64) {
        let permille = (progress.clamp(0.0, 1.0) * 1000.0).round() as u64;
        self.calibration_progress.store(permille, Ordering::Relaxed);
    }

    pub fn record_calibration_completed(&self) {
        self.calibrations_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            status: self.status(),
            frames_acquired: self.frames_acquired.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_stale: self.frames_stale.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_incomplete: self.frames_incomplete.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_unmapped: self.events_unmapped.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            last_latency_us: self.last_latency_us.load(Ordering::Relaxed),
            max_latency_us: self.max_latency_us.load(Ordering::Relaxed),
            latency_overruns: self.latency_overruns.load(Ordering::Relaxed),
            frame_queue_depth: self.frame_queue_depth.load(Ordering::Relaxed) as usize,
            event_queue_depth: self.event_queue_depth.load(Ordering::Relaxed) as usize,
            calibration_progress: self.calibration_progress.load(Ordering::Relaxed) as f64
                / 1000.0,
            calibrations_completed: self.calibrations_completed.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Human-readable report.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "Pipeline Diagnostics:\n\
             - Status: {}\n\
             - Calibrations completed: {}\n\
             - Frames acquired: {}\n\
             - Frames processed: {}\n\
             - Frames dropped (queue full): {}\n\
             - Frames skipped (stale): {}\n\
             - Frames incomplete: {}\n\
             - Source failures: {}\n\
             - Events emitted: {}\n\
             - Events dropped: {}\n\
             - Gestures without mapping: {}\n\
             - Sink failures: {}\n\
             - Latency: last {:.1}ms, max {:.1}ms, {} over budget\n\
             - Queue depth: {} frames, {} events\n\
             - Session duration: {} seconds",
            s.status,
            s.calibrations_completed,
            s.frames_acquired,
            s.frames_processed,
            s.frames_dropped,
            s.frames_stale,
            s.frames_incomplete,
            s.source_failures,
            s.events_emitted,
            s.events_dropped,
            s.events_unmapped,
            s.sink_failures,
            s.last_latency_us as f64 / 1000.0,
            s.max_latency_us as f64 / 1000.0,
            s.latency_overruns,
            s.frame_queue_depth,
            s.event_queue_depth,
            s.session_duration_secs
        )
    }

    /// Cumulative totals, including previous sessions when persisted.
    pub fn totals(&self) -> PersistedTotals {
        let s = self.snapshot();
        PersistedTotals {
            sessions: self.previous.sessions + 1,
            frames_acquired: self.previous.frames_acquired + s.frames_acquired,
            frames_processed: self.previous.frames_processed + s.frames_processed,
            frames_dropped: self.previous.frames_dropped + s.frames_dropped,
            events_emitted: self.previous.events_emitted + s.events_emitted,
            last_updated: Some(Utc::now()),
        }
    }

    /// Save cumulative totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let json =
                serde_json::to_string_pretty(&self.totals()).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                self.previous = serde_json::from_str(&content).map_err(std::io::Error::other)?;
            }
        }
        Ok(())
    }

    /// Read totals previously saved at `path`, if any.
    pub fn load_totals(path: &std::path::Path) -> Option<PersistedTotals> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the pipeline counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsSnapshot {
    pub status: PipelineStatus,
    pub frames_acquired: u64,
    pub frames_dropped: u64,
    pub frames_stale: u64,
    pub frames_processed: u64,
    pub frames_incomplete: u64,
    pub source_failures: u64,
    pub events_emitted: u64,
    pub events_dropped: u64,
    pub events_unmapped: u64,
    pub sink_failures: u64,
    pub last_latency_us: u64,
    pub max_latency_us: u64,
    pub latency_overruns: u64,
    pub frame_queue_depth: usize,
    pub event_queue_depth: usize,
    pub calibration_progress: f64,
    pub calibrations_completed: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Totals format for persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedTotals {
    pub sessions: u64,
    pub frames_acquired: u64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub events_emitted: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Thread-safe shared diagnostics.
pub type SharedDiagnostics = Arc<Diagnostics>;

/// Create new shared diagnostics.
pub fn create_shared_diagnostics() -> SharedDiagnostics {
    Arc::new(Diagnostics::new())
}

/// Create new shared diagnostics with persistence.
pub fn create_shared_diagnostics_with_persistence(path: PathBuf) -> SharedDiagnostics {
    Arc::new(Diagnostics::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let diagnostics = Diagnostics::new();

        diagnostics.record_frame_acquired();
        diagnostics.record_frame_acquired();
        diagnostics.record_frame_dropped();
        diagnostics.record_frames_stale(3);

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.frames_acquired, 2);
        assert_eq!(snapshot.frames_dropped, 1);
        assert_eq!(snapshot.frames_stale, 3);
    }

    #[test]
    fn test_latency_tracks_max_and_overruns() {
        let diagnostics = Diagnostics::new();
        let budget = Duration::from_millis(150);

        assert!(!diagnostics.record_latency(Duration::from_millis(20), budget));
        assert!(diagnostics.record_latency(Duration::from_millis(200), budget));
        assert!(!diagnostics.record_latency(Duration::from_millis(10), budget));

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot.last_latency_us, 10_000);
        assert_eq!(snapshot.max_latency_us, 200_000);
        assert_eq!(snapshot.latency_overruns, 1);
    }

    #[test]
    fn test_status_round_trip() {
        let diagnostics = Diagnostics::new();
        assert_eq!(diagnostics.status(), PipelineStatus::Starting);
        diagnostics.set_status(PipelineStatus::NoPose);
        assert_eq!(diagnostics.status(), PipelineStatus::NoPose);
    }

    #[test]
    fn test_summary_format() {
        let diagnostics = Diagnostics::new();
        diagnostics.set_status(PipelineStatus::Tracking);
        let summary = diagnostics.summary();

        assert!(summary.contains("Status: tracking"));
        assert!(summary.contains("Frames acquired"));
        assert!(summary.contains("Events emitted"));
    }

    #[test]
    fn test_persistence_accumulates_sessions() {
        let path = std::env::temp_dir().join(format!(
            "posture-control-diagnostics-{}.json",
            uuid::Uuid::new_v4()
        ));

        let first = Diagnostics::with_persistence(path.clone());
        first.record_frame_acquired();
        first.record_event_emitted();
        first.save().unwrap();

        let second = Diagnostics::with_persistence(path.clone());
        second.record_frame_acquired();
        let totals = second.totals();
        assert_eq!(totals.sessions, 2);
        assert_eq!(totals.frames_acquired, 2);
        assert_eq!(totals.events_emitted, 1);

        std::fs::remove_file(&path).ok();
    }
}
