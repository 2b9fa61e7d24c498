//! Demonstration of the Posture Control pipeline on synthetic poses.
//!
//! This example shows how to:
//! 1. Generate a scripted landmark routine (calibration, then every gesture)
//! 2. Start the staged pipeline with a channel sink
//! 3. Receive debounced control events as they are confirmed
//! 4. Read the diagnostics report after the stream ends
//!
//! Run with: cargo run --example replay_demo

use std::time::Duration;

use chrono::Utc;
use posture_control::{
    source::synthetic::demo_routine, ChannelSink, Config, Pipeline, ReplaySource,
    CALIBRATION_INSTRUCTIONS,
};

fn main() {
    println!("Posture Control - Replay Demo");
    println!("=============================");
    println!();
    println!("{CALIBRATION_INSTRUCTIONS}");

    let config = Config::default();
    let period = config.timing.frame_period();
    let frames = demo_routine(Utc::now(), period.as_millis().max(1) as i64);
    println!(
        "Replaying {} frames at {} fps...",
        frames.len(),
        config.timing.target_fps
    );
    println!();

    let source = ReplaySource::new(frames).with_interval(period);
    let (sink, events) = ChannelSink::new();

    let pipeline = match Pipeline::new(config, source, sink) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("Error configuring pipeline: {e}");
            return;
        }
    };
    let handle = match pipeline.start() {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error starting pipeline: {e}");
            return;
        }
    };
    println!("Session: {}", handle.session_id());

    while !handle.is_finished() {
        while let Ok(event) = events.recv_timeout(Duration::from_millis(100)) {
            println!(
                "[{}] #{} {:<14} → {} (confidence {:.2})",
                event.timestamp.format("%H:%M:%S%.3f"),
                event.sequence,
                event.kind,
                event.action,
                event.confidence
            );
        }
    }

    match handle.wait() {
        Ok(report) => {
            // Events delivered after the last poll
            for event in events.try_iter() {
                println!("#{} {} → {}", event.sequence, event.kind, event.action);
            }
            println!();
            println!(
                "Done: {} frames processed, {} dropped, {} events",
                report.frames_processed, report.frames_dropped, report.events_emitted
            );
        }
        Err(e) => eprintln!("Pipeline failed: {e}"),
    }
}
