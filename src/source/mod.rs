//! Landmark sources for the pipeline.
//!
//! The pose model itself lives outside this crate. A source hands the pipeline
//! one [`LandmarkFrame`] at a time and must never block longer than the
//! timeout it is given.

pub mod jsonl;
pub mod replay;
pub mod synthetic;
pub mod types;

use std::time::Duration;

// Re-export commonly used types
pub use jsonl::JsonLinesSource;
pub use replay::ReplaySource;
pub use synthetic::PoseBuilder;
pub use types::{Landmark, LandmarkFrame, LandmarkId};

/// Anything that can deliver landmark frames to the acquisition stage.
pub trait LandmarkSource: Send + 'static {
    /// Wait at most `timeout` for the next frame.
    ///
    /// `Ok(None)` means no frame was available in time (no pose, idle camera).
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<LandmarkFrame>, SourceError>;
}

impl<S: LandmarkSource + ?Sized> LandmarkSource for Box<S> {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<LandmarkFrame>, SourceError> {
        (**self).next_frame(timeout)
    }
}

/// Errors a landmark source can report.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Transient failure; the acquisition stage retries
    Unavailable(String),
    /// A finite source has no more frames
    EndOfStream,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable(e) => write!(f, "Source unavailable: {e}"),
            SourceError::EndOfStream => write!(f, "Source reached end of stream"),
        }
    }
}

impl std::error::Error for SourceError {}
