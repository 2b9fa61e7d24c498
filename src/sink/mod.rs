//! Signal sinks.
//!
//! A sink receives confirmed [`ControlEvent`]s from the emission stage and
//! performs the side effect (key simulation, logging, forwarding). Which
//! action each gesture maps to is decided before the sink, by an injectable
//! [`ActionMap`].

pub mod actions;
pub mod worker;
pub mod writers;

use crate::core::gesture::ControlEvent;
use std::time::Duration;

// Re-export commonly used types
pub use actions::ActionMap;
pub use worker::SinkWorker;
pub use writers::{ChannelSink, JsonLinesSink, LogSink};

/// Consumer of confirmed control events.
pub trait SignalSink: Send + 'static {
    /// Perform the action for one event. The pipeline calls this from a
    /// dedicated thread and stops waiting after `timing.sink_timeout`.
    fn emit(&mut self, event: &ControlEvent) -> Result<(), SinkError>;

    /// Release anything still held (pressed keys, open handles). Called once
    /// at shutdown.
    fn release_all(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<K: SignalSink + ?Sized> SignalSink for Box<K> {
    fn emit(&mut self, event: &ControlEvent) -> Result<(), SinkError> {
        (**self).emit(event)
    }

    fn release_all(&mut self) -> Result<(), SinkError> {
        (**self).release_all()
    }
}

/// Errors a sink can report. Always recoverable from the pipeline's view.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    /// The downstream consumer has gone away
    Disconnected,
    Io(String),
    /// The sink refused this action id
    Rejected(String),
    /// The call did not return in time
    TimedOut(Duration),
    /// A previous call has not returned yet
    Busy,
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Disconnected => write!(f, "Sink disconnected"),
            SinkError::Io(e) => write!(f, "Sink IO error: {e}"),
            SinkError::Rejected(action) => write!(f, "Sink rejected action: {action}"),
            SinkError::TimedOut(after) => {
                write!(f, "Sink did not respond within {}ms", after.as_millis())
            }
            SinkError::Busy => write!(f, "Sink still busy with an earlier call"),
        }
    }
}

impl std::error::Error for SinkError {}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e.to_string())
    }
}
