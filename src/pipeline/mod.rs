//! Staged real-time pipeline.
//!
//! ```text
//!  LandmarkSource ──▶ [acquisition] ──frames──▶ [processing] ──events──▶ [emission] ──▶ SignalSink
//!                                   drop-oldest                drop-oldest
//! ```
//!
//! Each stage runs on its own thread. The stages share only the two bounded
//! queues, the atomic [`PipelineControl`] flags and the lock-free
//! diagnostics counters. Every wait is a queue wait with a timeout, which is
//! also where each stage checks for shutdown. The sink itself runs behind a
//! [`SinkWorker`], so a slow sink costs events, never the stage.

pub mod control;
pub mod processor;
pub mod queue;

use crate::config::Config;
use crate::core::calibration::CalibrationState;
use crate::core::gesture::ControlEvent;
use crate::diagnostics::{create_shared_diagnostics, DiagnosticsSnapshot, PipelineStatus, SharedDiagnostics};
use crate::sink::{ActionMap, SignalSink, SinkError, SinkWorker};
use crate::source::{LandmarkSource, SourceError};
use crate::source::types::LandmarkFrame;
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// Re-export commonly used types
pub use control::{ControlCommand, PipelineControl};
pub use processor::{CycleOutcome, FrameProcessor};
pub use queue::DropOldestQueue;

/// Errors that stop the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The source failed too many times in a row
    SourceLost { consecutive_failures: u32 },
    /// Rejected at startup
    InvalidConfiguration(String),
    SpawnFailed(String),
    /// A stage thread panicked
    StageCrashed(&'static str),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::SourceLost {
                consecutive_failures,
            } => write!(
                f,
                "Landmark source lost after {consecutive_failures} consecutive failures"
            ),
            PipelineError::InvalidConfiguration(e) => write!(f, "Invalid configuration: {e}"),
            PipelineError::SpawnFailed(e) => write!(f, "Failed to spawn pipeline stage: {e}"),
            PipelineError::StageCrashed(stage) => write!(f, "Pipeline stage crashed: {stage}"),
        }
    }
}

impl std::error::Error for PipelineError {}

/// A frame plus the instant it entered the frame queue.
struct AcceptedFrame {
    frame: LandmarkFrame,
    accepted_at: Instant,
}

/// An event plus the instant its frame was accepted.
struct PendingEvent {
    event: ControlEvent,
    accepted_at: Instant,
}

/// Completion flags used to drain stages in order.
#[derive(Debug, Default)]
struct StageFlags {
    acquisition_done: AtomicBool,
    processing_done: AtomicBool,
}

/// A configured, not yet running pipeline.
pub struct Pipeline<S: LandmarkSource, K: SignalSink> {
    config: Config,
    source: S,
    sink: K,
    actions: ActionMap,
    diagnostics: SharedDiagnostics,
}

impl<S: LandmarkSource, K: SignalSink> Pipeline<S, K> {
    /// Validate `config` and prepare a pipeline; nothing runs until
    /// [`start`](Self::start).
    pub fn new(config: Config, source: S, sink: K) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::InvalidConfiguration(e.to_string()))?;
        let actions = ActionMap::from_mapping(&config.key_mapping);

        Ok(Self {
            config,
            source,
            sink,
            actions,
            diagnostics: create_shared_diagnostics(),
        })
    }

    /// Replace the action table taken from the configuration.
    pub fn with_actions(mut self, actions: ActionMap) -> Self {
        self.actions = actions;
        self
    }

    /// Record into existing diagnostics (e.g. with persistence).
    pub fn with_diagnostics(mut self, diagnostics: SharedDiagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Spawn the three stages.
    pub fn start(self) -> Result<PipelineHandle, PipelineError> {
        let Pipeline {
            config,
            source,
            sink,
            actions,
            diagnostics,
        } = self;

        let session_id = Uuid::new_v4();
        let control = Arc::new(PipelineControl::new(config.paused, config.diagnostics));
        let flags = Arc::new(StageFlags::default());
        let frames = DropOldestQueue::new(config.queues.frame_capacity);
        let events = DropOldestQueue::new(config.queues.event_capacity);

        info!(
            %session_id,
            target_fps = config.timing.target_fps,
            frame_capacity = frames.capacity(),
            event_capacity = events.capacity(),
            "Starting pipeline"
        );
        diagnostics.set_status(if config.paused {
            PipelineStatus::Paused
        } else {
            PipelineStatus::Starting
        });

        let sink = SinkWorker::spawn(sink)
            .map_err(|e| PipelineError::SpawnFailed(format!("sink: {e}")))?;

        let mut handle = PipelineHandle {
            session_id,
            control: control.clone(),
            diagnostics: diagnostics.clone(),
            acquisition: None,
            processing: None,
            emission: None,
        };

        let acquisition = Acquisition {
            source,
            frames: frames.clone(),
            control: control.clone(),
            flags: flags.clone(),
            diagnostics: diagnostics.clone(),
            poll_timeout: config.source.poll_timeout,
            retry_backoff: config.source.retry_backoff,
            max_failures: config.source.max_consecutive_failures,
        };
        let processing = Processing {
            processor: FrameProcessor::new(&config, actions),
            frames,
            events: events.clone(),
            control: control.clone(),
            flags: flags.clone(),
            diagnostics: diagnostics.clone(),
            poll_timeout: config.source.poll_timeout,
            latency_budget: config.timing.latency_budget,
        };
        let emission = Emission {
            sink,
            events,
            flags: flags.clone(),
            diagnostics,
            poll_timeout: config.source.poll_timeout,
            sink_timeout: config.timing.sink_timeout,
        };

        handle.emission = Some(spawn_stage(&control, &flags, "emission", move || emission.run())?);
        handle.processing = Some(spawn_stage(&control, &flags, "processing", move || {
            processing.run()
        })?);
        handle.acquisition = Some(spawn_stage(&control, &flags, "acquisition", move || {
            acquisition.run()
        })?);

        Ok(handle)
    }
}

fn spawn_stage<T, F>(
    control: &PipelineControl,
    flags: &StageFlags,
    name: &str,
    body: F,
) -> Result<JoinHandle<T>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    thread::Builder::new()
        .name(format!("posture-{name}"))
        .spawn(body)
        .map_err(|e| {
            // Stages already running wind down on their own
            control.apply(ControlCommand::Shutdown);
            flags.acquisition_done.store(true, Ordering::SeqCst);
            flags.processing_done.store(true, Ordering::SeqCst);
            PipelineError::SpawnFailed(format!("{name}: {e}"))
        })
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    session_id: Uuid,
    control: Arc<PipelineControl>,
    diagnostics: SharedDiagnostics,
    acquisition: Option<JoinHandle<Result<(), PipelineError>>>,
    processing: Option<JoinHandle<()>>,
    emission: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn control(&self) -> Arc<PipelineControl> {
        self.control.clone()
    }

    pub fn pause(&self) {
        self.control.apply(ControlCommand::Pause);
    }

    pub fn resume(&self) {
        self.control.apply(ControlCommand::Resume);
    }

    pub fn recalibrate(&self) {
        self.control.apply(ControlCommand::Recalibrate);
    }

    pub fn toggle_diagnostics(&self) {
        self.control.apply(ControlCommand::ToggleDiagnostics);
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn shared_diagnostics(&self) -> SharedDiagnostics {
        self.diagnostics.clone()
    }

    /// True once every stage has exited (end of stream, source lost or
    /// shutdown).
    pub fn is_finished(&self) -> bool {
        [
            self.acquisition.as_ref().map(JoinHandle::is_finished),
            self.processing.as_ref().map(JoinHandle::is_finished),
            self.emission.as_ref().map(JoinHandle::is_finished),
        ]
        .into_iter()
        .all(|done| done.unwrap_or(true))
    }

    /// Request a cooperative shutdown and wait for all stages.
    pub fn shutdown(self) -> Result<DiagnosticsSnapshot, PipelineError> {
        self.control.apply(ControlCommand::Shutdown);
        self.wait()
    }

    /// Wait for the pipeline to end on its own.
    ///
    /// Stages exit in order: acquisition, then processing once the frame
    /// queue is drained, then emission once the event queue is drained.
    pub fn wait(mut self) -> Result<DiagnosticsSnapshot, PipelineError> {
        let mut result = Ok(());

        if let Some(handle) = self.acquisition.take() {
            result = handle
                .join()
                .unwrap_or(Err(PipelineError::StageCrashed("acquisition")));
        }
        if let Some(handle) = self.processing.take() {
            if handle.join().is_err() {
                result = result.and(Err(PipelineError::StageCrashed("processing")));
            }
        }
        if let Some(handle) = self.emission.take() {
            if handle.join().is_err() {
                result = result.and(Err(PipelineError::StageCrashed("emission")));
            }
        }

        self.diagnostics.set_status(PipelineStatus::Stopped);
        let snapshot = self.diagnostics.snapshot();
        info!(
            session_id = %self.session_id,
            frames = snapshot.frames_processed,
            events = snapshot.events_emitted,
            "Pipeline stopped"
        );
        result.map(|()| snapshot)
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        // Threads notice the flag at their next queue wait
        self.control.apply(ControlCommand::Shutdown);
    }
}

struct Acquisition<S> {
    source: S,
    frames: DropOldestQueue<AcceptedFrame>,
    control: Arc<PipelineControl>,
    flags: Arc<StageFlags>,
    diagnostics: SharedDiagnostics,
    poll_timeout: Duration,
    retry_backoff: Duration,
    max_failures: u32,
}

impl<S: LandmarkSource> Acquisition<S> {
    fn run(mut self) -> Result<(), PipelineError> {
        let result = self.pump();
        self.flags.acquisition_done.store(true, Ordering::SeqCst);
        result
    }

    fn pump(&mut self) -> Result<(), PipelineError> {
        let mut failures: u32 = 0;

        while !self.control.is_shutdown() {
            match self.source.next_frame(self.poll_timeout) {
                Ok(Some(frame)) => {
                    failures = 0;
                    self.diagnostics.record_frame_acquired();
                    let accepted = AcceptedFrame {
                        frame,
                        accepted_at: Instant::now(),
                    };
                    if self.frames.push(accepted).is_some() {
                        self.diagnostics.record_frame_dropped();
                    }
                }
                Ok(None) => {}
                Err(SourceError::EndOfStream) => {
                    info!("Landmark source ended");
                    return Ok(());
                }
                Err(SourceError::Unavailable(reason)) => {
                    failures += 1;
                    self.diagnostics.record_source_failure();
                    if failures >= self.max_failures {
                        error!(failures, %reason, "Landmark source lost");
                        self.control.apply(ControlCommand::Shutdown);
                        return Err(PipelineError::SourceLost {
                            consecutive_failures: failures,
                        });
                    }
                    warn!(failures, %reason, "Landmark source unavailable, retrying");
                    thread::sleep(self.retry_backoff);
                }
            }
        }
        Ok(())
    }
}

struct Processing {
    processor: FrameProcessor,
    frames: DropOldestQueue<AcceptedFrame>,
    events: DropOldestQueue<PendingEvent>,
    control: Arc<PipelineControl>,
    flags: Arc<StageFlags>,
    diagnostics: SharedDiagnostics,
    poll_timeout: Duration,
    latency_budget: Duration,
}

impl Processing {
    fn run(mut self) {
        self.consume();
        self.flags.processing_done.store(true, Ordering::SeqCst);
    }

    fn consume(&mut self) {
        let mut was_paused = false;

        while !self.control.is_shutdown() {
            if self.control.is_paused() {
                if !was_paused {
                    info!("Processing paused");
                    self.diagnostics.set_status(PipelineStatus::Paused);
                    was_paused = true;
                }
                if self.input_exhausted() {
                    return;
                }
                thread::sleep(self.poll_timeout);
                continue;
            }
            if was_paused {
                info!("Processing resumed");
                self.processor.reset_motion();
                was_paused = false;
            }

            if self.control.take_recalibration() {
                self.processor.recalibrate();
            }

            let Some((accepted, stale)) = self.frames.recv_latest(self.poll_timeout) else {
                if self.input_exhausted() {
                    return;
                }
                continue;
            };
            if stale > 0 {
                self.diagnostics.record_frames_stale(stale as u64);
            }
            self.cycle(accepted);
        }
    }

    fn input_exhausted(&self) -> bool {
        self.flags.acquisition_done.load(Ordering::SeqCst) && self.frames.is_empty()
    }

    fn cycle(&mut self, accepted: AcceptedFrame) {
        let outcome = self.processor.process(&accepted.frame);
        self.diagnostics.record_frame_processed();

        match &outcome {
            CycleOutcome::Calibrating(status) => {
                self.diagnostics.set_status(PipelineStatus::Calibrating);
                self.diagnostics.set_calibration_progress(status.progress);
                if status.state == CalibrationState::Ready {
                    self.diagnostics.record_calibration_completed();
                }
            }
            CycleOutcome::NoPose(_) => {
                self.diagnostics.record_frame_incomplete();
                self.diagnostics.set_status(PipelineStatus::NoPose);
            }
            CycleOutcome::Tracking { .. } => {
                self.diagnostics.set_status(PipelineStatus::Tracking);
            }
            CycleOutcome::Emitted(event) => {
                self.diagnostics.set_status(PipelineStatus::Tracking);
                let pending = PendingEvent {
                    event: event.clone(),
                    accepted_at: accepted.accepted_at,
                };
                if let Some(dropped) = self.events.push(pending) {
                    warn!(gesture = %dropped.event.kind, "Event queue full, dropped oldest event");
                    self.diagnostics.record_event_dropped();
                }
            }
            CycleOutcome::Unmapped(_) => {
                self.diagnostics.set_status(PipelineStatus::Tracking);
                self.diagnostics.record_event_unmapped();
            }
        }

        let latency = accepted.accepted_at.elapsed();
        if self.diagnostics.record_latency(latency, self.latency_budget) {
            warn!(
                latency_ms = latency.as_secs_f64() * 1000.0,
                budget_ms = self.latency_budget.as_secs_f64() * 1000.0,
                "Processing cycle over latency budget"
            );
        }
        self.diagnostics
            .set_queue_depths(self.frames.len(), self.events.len());

        if self.control.diagnostics_enabled() {
            debug!(
                outcome = ?outcome,
                latency_us = latency.as_micros() as u64,
                frame_queue = self.frames.len(),
                event_queue = self.events.len(),
                "Cycle"
            );
        }
    }
}

struct Emission {
    sink: SinkWorker,
    events: DropOldestQueue<PendingEvent>,
    flags: Arc<StageFlags>,
    diagnostics: SharedDiagnostics,
    poll_timeout: Duration,
    sink_timeout: Duration,
}

impl Emission {
    fn run(mut self) {
        loop {
            match self.events.pop_timeout(self.poll_timeout) {
                Ok(pending) => self.deliver(pending),
                Err(RecvTimeoutError::Timeout) => {
                    if self.flags.processing_done.load(Ordering::SeqCst) && self.events.is_empty() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Err(e) = self.sink.release_all(self.sink_timeout) {
            warn!(error = %e, "Sink failed to release actions");
            self.diagnostics.record_sink_failure();
        }
    }

    fn deliver(&mut self, pending: PendingEvent) {
        let gesture = pending.event.kind;
        match self.sink.emit(pending.event, self.sink_timeout) {
            Ok(()) => {
                self.diagnostics.record_event_emitted();
                debug!(
                    gesture = %gesture,
                    end_to_end_us = pending.accepted_at.elapsed().as_micros() as u64,
                    "Event delivered"
                );
            }
            Err(e @ (SinkError::TimedOut(_) | SinkError::Busy)) => {
                warn!(gesture = %gesture, error = %e, "Sink too slow, event abandoned");
                self.diagnostics.record_sink_failure();
            }
            Err(e) => {
                warn!(gesture = %gesture, error = %e, "Sink rejected event");
                self.diagnostics.record_sink_failure();
            }
        }
    }
}
