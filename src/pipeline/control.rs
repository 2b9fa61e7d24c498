//! In-process control surface for a running pipeline.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// A single control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    Pause,
    Resume,
    Recalibrate,
    ToggleDiagnostics,
    Shutdown,
}

/// Flags shared by every stage; each command is one atomic store.
#[derive(Debug, Default)]
pub struct PipelineControl {
    paused: AtomicBool,
    shutdown: AtomicBool,
    recalibrate: AtomicBool,
    diagnostics: AtomicBool,
}

impl PipelineControl {
    pub fn new(paused: bool, diagnostics: bool) -> Self {
        Self {
            paused: AtomicBool::new(paused),
            shutdown: AtomicBool::new(false),
            recalibrate: AtomicBool::new(false),
            diagnostics: AtomicBool::new(diagnostics),
        }
    }

    pub fn apply(&self, command: ControlCommand) {
        info!(?command, "Control command");
        match command {
            ControlCommand::Pause => self.paused.store(true, Ordering::SeqCst),
            ControlCommand::Resume => self.paused.store(false, Ordering::SeqCst),
            ControlCommand::Recalibrate => self.recalibrate.store(true, Ordering::SeqCst),
            ControlCommand::ToggleDiagnostics => {
                self.diagnostics.fetch_xor(true, Ordering::SeqCst);
            }
            ControlCommand::Shutdown => self.shutdown.store(true, Ordering::SeqCst),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics.load(Ordering::Relaxed)
    }

    /// Consume a pending recalibration request.
    pub fn take_recalibration(&self) -> bool {
        self.recalibrate.swap(false, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_and_resume() {
        let control = PipelineControl::new(false, false);
        control.apply(ControlCommand::Pause);
        assert!(control.is_paused());
        control.apply(ControlCommand::Resume);
        assert!(!control.is_paused());
    }

    #[test]
    fn test_recalibration_is_consumed_once() {
        let control = PipelineControl::default();
        control.apply(ControlCommand::Recalibrate);
        assert!(control.take_recalibration());
        assert!(!control.take_recalibration());
    }

    #[test]
    fn test_toggle_diagnostics() {
        let control = PipelineControl::new(false, true);
        control.apply(ControlCommand::ToggleDiagnostics);
        assert!(!control.diagnostics_enabled());
        control.apply(ControlCommand::ToggleDiagnostics);
        assert!(control.diagnostics_enabled());
    }
}
