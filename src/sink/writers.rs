//! Built-in sinks.

use crate::core::gesture::ControlEvent;
use crate::sink::{SignalSink, SinkError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::Write;
use tracing::info;

/// Logs each action instead of performing it.
#[derive(Debug, Default)]
pub struct LogSink {
    emitted: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalSink for LogSink {
    fn emit(&mut self, event: &ControlEvent) -> Result<(), SinkError> {
        self.emitted += 1;
        info!(
            gesture = %event.kind,
            action = %event.action,
            confidence = event.confidence,
            sequence = event.sequence,
            "Action triggered"
        );
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), SinkError> {
        info!(emitted = self.emitted, "Released all actions");
        Ok(())
    }
}

/// Forwards events to an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<ControlEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that observes its events.
    pub fn new() -> (Self, Receiver<ControlEvent>) {
        let (sender, receiver) = unbounded();
        (Self { sender }, receiver)
    }

    pub fn from_sender(sender: Sender<ControlEvent>) -> Self {
        Self { sender }
    }
}

impl SignalSink for ChannelSink {
    fn emit(&mut self, event: &ControlEvent) -> Result<(), SinkError> {
        self.sender
            .send(event.clone())
            .map_err(|_| SinkError::Disconnected)
    }
}

/// Writes one JSON object per event.
pub struct JsonLinesSink<W: Write + Send + 'static> {
    writer: W,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send + 'static> SignalSink for JsonLinesSink<W> {
    fn emit(&mut self, event: &ControlEvent) -> Result<(), SinkError> {
        let line = serde_json::to_string(event).map_err(|e| SinkError::Io(e.to_string()))?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
