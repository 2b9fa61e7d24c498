//! Landmark frames read as JSON Lines from a file or stdin.
//!
//! Parsing happens on a background thread that feeds a bounded channel, so the
//! acquisition stage only ever waits on `recv_timeout` and never on the reader.

use crate::source::types::LandmarkFrame;
use crate::source::{LandmarkSource, SourceError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lines buffered between the reader thread and the pipeline.
const READ_AHEAD: usize = 256;

type FrameResult = Result<LandmarkFrame, SourceError>;

/// A source that parses one [`LandmarkFrame`] per input line.
pub struct JsonLinesSource {
    receiver: Receiver<FrameResult>,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl JsonLinesSource {
    /// Start reading frames from any buffered reader.
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (sender, receiver) = bounded(READ_AHEAD);
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::spawn(move || {
            for (line_no, line) in reader.lines().enumerate() {
                if !flag.load(Ordering::SeqCst) {
                    return;
                }
                let item = match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => serde_json::from_str::<LandmarkFrame>(&line).map_err(|e| {
                        SourceError::Unavailable(format!("line {}: {e}", line_no + 1))
                    }),
                    Err(e) => Err(SourceError::Unavailable(e.to_string())),
                };
                if sender.send(item).is_err() {
                    return;
                }
            }
            let _ = sender.send(Err(SourceError::EndOfStream));
        });

        Self {
            receiver,
            running,
            thread_handle: Some(handle),
        }
    }

    /// Read frames from a file.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::spawn(BufReader::new(file)))
    }

    /// Read frames from standard input.
    pub fn stdin() -> Self {
        Self::spawn(BufReader::new(io::stdin()))
    }
}

impl LandmarkSource for JsonLinesSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<LandmarkFrame>, SourceError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SourceError::EndOfStream),
        }
    }
}

impl Drop for JsonLinesSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // A reader blocked on stdin cannot be interrupted; only join finished threads.
        if let Some(handle) = self.thread_handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::synthetic::PoseBuilder;
    use chrono::Utc;
    use std::io::Cursor;

    #[test]
    fn test_reads_frames_then_end_of_stream() {
        let frame = PoseBuilder::neutral().build(Utc::now());
        let line = serde_json::to_string(&frame).unwrap();
        let input = format!("{line}\n\n{line}\n");

        let mut source = JsonLinesSource::spawn(Cursor::new(input.into_bytes()));
        let timeout = Duration::from_secs(1);

        assert!(source.next_frame(timeout).unwrap().is_some());
        assert!(source.next_frame(timeout).unwrap().is_some());
        assert_eq!(source.next_frame(timeout), Err(SourceError::EndOfStream));
    }

    #[test]
    fn test_malformed_line_is_unavailable_not_fatal() {
        let frame = PoseBuilder::neutral().build(Utc::now());
        let line = serde_json::to_string(&frame).unwrap();
        let input = format!("not json\n{line}\n");

        let mut source = JsonLinesSource::spawn(Cursor::new(input.into_bytes()));
        let timeout = Duration::from_secs(1);

        assert!(matches!(
            source.next_frame(timeout),
            Err(SourceError::Unavailable(_))
        ));
        assert!(source.next_frame(timeout).unwrap().is_some());
    }
}
