//! Runs a sink on its own thread so every call can be bounded by a timeout.
//!
//! At most one call is outstanding. A call that times out keeps the worker
//! busy until the sink returns; calls made meanwhile fail fast with
//! [`SinkError::Busy`] instead of queueing behind it.

use super::{SignalSink, SinkError};
use crate::core::gesture::ControlEvent;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

enum SinkRequest {
    Emit(ControlEvent),
    Release,
}

/// Owns a [`SignalSink`] on a dedicated thread.
pub struct SinkWorker {
    requests: Option<Sender<SinkRequest>>,
    results: Receiver<Result<(), SinkError>>,
    busy: bool,
    thread_handle: Option<JoinHandle<()>>,
}

impl SinkWorker {
    /// Move `sink` onto a new thread.
    pub fn spawn<K: SignalSink>(mut sink: K) -> std::io::Result<Self> {
        let (request_tx, request_rx) = bounded::<SinkRequest>(1);
        let (result_tx, result_rx) = bounded(1);

        let handle = thread::Builder::new()
            .name("posture-sink".to_string())
            .spawn(move || {
                for request in request_rx {
                    let result = match request {
                        SinkRequest::Emit(event) => sink.emit(&event),
                        SinkRequest::Release => sink.release_all(),
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            requests: Some(request_tx),
            results: result_rx,
            busy: false,
            thread_handle: Some(handle),
        })
    }

    /// Emit one event, waiting at most `timeout`.
    pub fn emit(&mut self, event: ControlEvent, timeout: Duration) -> Result<(), SinkError> {
        self.call(SinkRequest::Emit(event), timeout)
    }

    /// Release held actions, waiting at most `timeout`.
    pub fn release_all(&mut self, timeout: Duration) -> Result<(), SinkError> {
        self.call(SinkRequest::Release, timeout)
    }

    /// Whether an earlier call is still running in the sink.
    pub fn is_busy(&mut self) -> bool {
        self.collect_late_result();
        self.busy
    }

    fn call(&mut self, request: SinkRequest, timeout: Duration) -> Result<(), SinkError> {
        if self.is_busy() {
            return Err(SinkError::Busy);
        }
        let requests = self.requests.as_ref().ok_or(SinkError::Disconnected)?;
        requests
            .try_send(request)
            .map_err(|_| SinkError::Disconnected)?;
        self.busy = true;

        match self.results.recv_timeout(timeout) {
            Ok(result) => {
                self.busy = false;
                result
            }
            Err(RecvTimeoutError::Timeout) => Err(SinkError::TimedOut(timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                self.busy = false;
                Err(SinkError::Disconnected)
            }
        }
    }

    fn collect_late_result(&mut self) {
        if !self.busy {
            return;
        }
        match self.results.try_recv() {
            Ok(result) => {
                debug!(ok = result.is_ok(), "Late sink call returned");
                self.busy = false;
            }
            Err(TryRecvError::Empty) => {}
            // The sink thread is gone; the next send reports it
            Err(TryRecvError::Disconnected) => self.busy = false,
        }
    }
}

impl Drop for SinkWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the thread once the sink returns
        self.requests.take();
        if let Some(handle) = self.thread_handle.take() {
            if !self.busy || handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::gesture::GestureKind;
    use crate::sink::ChannelSink;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn event(sequence: u64) -> ControlEvent {
        ControlEvent {
            kind: GestureKind::LeanLeft,
            action: "a".to_string(),
            timestamp: Utc::now(),
            confidence: 0.9,
            sequence,
        }
    }

    /// Sleeps in `emit` while the gate is closed.
    struct GatedSink {
        open: Arc<AtomicBool>,
    }

    impl SignalSink for GatedSink {
        fn emit(&mut self, _event: &ControlEvent) -> Result<(), SinkError> {
            while !self.open.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(())
        }
    }

    #[test]
    fn test_prompt_sink_delivers() {
        let (sink, events) = ChannelSink::new();
        let mut worker = SinkWorker::spawn(sink).unwrap();

        worker.emit(event(1), Duration::from_secs(1)).unwrap();
        worker.emit(event(2), Duration::from_secs(1)).unwrap();
        worker.release_all(Duration::from_secs(1)).unwrap();

        let sequences: Vec<u64> = events.try_iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_slow_sink_times_out_then_reports_busy() {
        let open = Arc::new(AtomicBool::new(false));
        let mut worker = SinkWorker::spawn(GatedSink { open: open.clone() }).unwrap();
        let timeout = Duration::from_millis(20);

        let started = Instant::now();
        assert_eq!(worker.emit(event(1), timeout), Err(SinkError::TimedOut(timeout)));
        assert_eq!(worker.emit(event(2), timeout), Err(SinkError::Busy));
        assert!(started.elapsed() < Duration::from_secs(1));

        // Once the stuck call returns the worker accepts calls again
        open.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(2);
        while worker.is_busy() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!worker.is_busy());
        assert_eq!(worker.emit(event(3), Duration::from_secs(1)), Ok(()));
    }

    #[test]
    fn test_drop_does_not_wait_for_stuck_sink() {
        let open = Arc::new(AtomicBool::new(false));
        let mut worker = SinkWorker::spawn(GatedSink { open: open.clone() }).unwrap();
        let _ = worker.emit(event(1), Duration::from_millis(10));

        let started = Instant::now();
        drop(worker);
        assert!(started.elapsed() < Duration::from_millis(500));
        open.store(true, Ordering::SeqCst);
    }
}
