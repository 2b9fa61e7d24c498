//! In-memory replay of recorded or synthetic frames.

use crate::source::types::LandmarkFrame;
use crate::source::{LandmarkSource, SourceError};
use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

/// Replays a fixed list of frames in order.
pub struct ReplaySource {
    frames: VecDeque<LandmarkFrame>,
    /// Original recording, kept when looping
    recording: Vec<LandmarkFrame>,
    /// Delay between frames; `None` replays as fast as the consumer pulls
    interval: Option<Duration>,
    looping: bool,
    /// Timestamp shift applied to each new loop so time keeps moving forward
    loop_offset: chrono::Duration,
    /// Injected failures returned before the next frame
    pending_failures: usize,
}

impl ReplaySource {
    /// Create a source that replays `frames` once.
    pub fn new(frames: Vec<LandmarkFrame>) -> Self {
        Self {
            frames: frames.iter().cloned().collect(),
            recording: frames,
            interval: None,
            looping: false,
            loop_offset: chrono::Duration::zero(),
            pending_failures: 0,
        }
    }

    /// Pace the replay at a fixed interval (e.g. 33ms for 30fps).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Restart from the beginning instead of ending the stream.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Report `count` consecutive `Unavailable` errors before the next frame.
    pub fn with_failures(mut self, count: usize) -> Self {
        self.pending_failures = count;
        self
    }

    /// Frames left in the current pass.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    fn rewind(&mut self) -> bool {
        if !self.looping || self.recording.is_empty() {
            return false;
        }
        let (first, last) = match (self.recording.first(), self.recording.last()) {
            (Some(f), Some(l)) => (f.timestamp, l.timestamp),
            _ => return false,
        };
        let period = self.interval.map_or(chrono::Duration::milliseconds(33), |d| {
            chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::milliseconds(33))
        });
        self.loop_offset = self.loop_offset + (last - first) + period;
        let offset = self.loop_offset;
        self.frames = self
            .recording
            .iter()
            .cloned()
            .map(|mut frame| {
                frame.timestamp = frame.timestamp + offset;
                frame
            })
            .collect();
        true
    }
}

impl LandmarkSource for ReplaySource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<LandmarkFrame>, SourceError> {
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            return Err(SourceError::Unavailable("injected failure".to_string()));
        }

        if self.frames.is_empty() && !self.rewind() {
            return Err(SourceError::EndOfStream);
        }

        if let Some(interval) = self.interval {
            thread::sleep(interval.min(timeout));
        }

        Ok(self.frames.pop_front())
    }
}
