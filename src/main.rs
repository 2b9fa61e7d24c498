//! Posture Control CLI
//!
//! Turns body-landmark streams into debounced control signals.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use posture_control::{
    config::Config,
    diagnostics::{create_shared_diagnostics_with_persistence, Diagnostics},
    source::synthetic::demo_routine,
    JsonLinesSink, JsonLinesSource, LandmarkSource, LogSink, Pipeline, ReplaySource, SignalSink,
    CALIBRATION_INSTRUCTIONS, VERSION,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "posture-control")]
#[command(version = VERSION)]
#[command(about = "Turns body-landmark streams into debounced control signals", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gesture pipeline
    Start {
        /// JSON Lines landmark frames to read ("-" for stdin)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Replay the built-in synthetic routine instead of reading input
        #[arg(long, conflicts_with = "input")]
        simulate: bool,

        /// Write events as JSON Lines to this file instead of logging them
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Enable debug logging
        #[arg(long, short)]
        verbose: bool,
    },

    /// Pause gesture processing
    Pause,

    /// Resume gesture processing
    Resume,

    /// Ask a running pipeline to recalibrate
    Recalibrate,

    /// Toggle per-cycle diagnostics logging
    Diagnostics,

    /// Show current status and cumulative statistics
    Status,

    /// Show configuration
    Config,

    /// Display calibration instructions
    Instructions,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start {
            input,
            simulate,
            output,
            verbose,
        } => cmd_start(input, simulate, output, verbose),
        Commands::Pause => cmd_pause(),
        Commands::Resume => cmd_resume(),
        Commands::Recalibrate => cmd_recalibrate(),
        Commands::Diagnostics => cmd_diagnostics(),
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
        Commands::Instructions => {
            cmd_instructions();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

fn cmd_start(
    input: Option<PathBuf>,
    simulate: bool,
    output: Option<PathBuf>,
    verbose: bool,
) -> anyhow::Result<()> {
    init_logging(verbose);

    println!("Posture Control v{VERSION}");
    println!();

    let config = Config::load().context("Failed to load configuration")?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    // Stale request from a previous run
    config.take_recalibration_request();

    let source = open_source(input.as_deref(), simulate, &config)?;
    let sink = open_sink(output.as_deref())?;

    println!("Starting pipeline...");
    println!("  Target rate: {} fps", config.timing.target_fps);
    println!(
        "  Confirmation / cooldown: {}ms / {}ms",
        config.timing.confirmation.as_millis(),
        config.timing.cooldown.as_millis()
    );
    println!("  Latency budget: {}ms", config.timing.latency_budget.as_millis());
    println!("  Sink timeout: {}ms", config.timing.sink_timeout.as_millis());
    println!();
    println!("{CALIBRATION_INSTRUCTIONS}");

    let diagnostics =
        create_shared_diagnostics_with_persistence(config.data_path.join("diagnostics.json"));
    let handle = Pipeline::new(config.clone(), source, sink)?
        .with_diagnostics(diagnostics.clone())
        .start()?;

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    if config.paused {
        println!("Processing is currently paused.");
        println!("Run `posture-control resume` to start recognizing gestures.");
        println!();
    }

    // Support control from another process by polling the config file.
    let mut paused = config.paused;
    let mut diagnostics_enabled = config.diagnostics;
    let mut last_config_check = Instant::now();
    let mut last_status = diagnostics.status();

    while running.load(Ordering::SeqCst) && !handle.is_finished() {
        thread::sleep(Duration::from_millis(100));

        if last_config_check.elapsed() >= Duration::from_secs(1) {
            if let Ok(cfg) = Config::load() {
                if cfg.paused != paused {
                    paused = cfg.paused;
                    if paused {
                        println!("Pausing gesture processing...");
                        handle.pause();
                    } else {
                        println!("Resuming gesture processing...");
                        handle.resume();
                    }
                }
                if cfg.diagnostics != diagnostics_enabled {
                    diagnostics_enabled = cfg.diagnostics;
                    handle.toggle_diagnostics();
                    println!(
                        "Diagnostics {}",
                        if diagnostics_enabled { "enabled" } else { "disabled" }
                    );
                }
            }
            if config.take_recalibration_request() {
                println!("Recalibrating - hold the reference stance.");
                handle.recalibrate();
            }
            last_config_check = Instant::now();
        }

        let status = diagnostics.status();
        if status != last_status {
            println!("[{}] Status: {status}", Utc::now().format("%H:%M:%S"));
            last_status = status;
        }
    }

    println!();
    println!("Shutting down...");
    let result = handle.shutdown();

    if let Err(e) = diagnostics.save() {
        eprintln!("Warning: Could not save diagnostics: {e}");
    }
    println!();
    println!("{}", diagnostics.summary());

    result?;
    Ok(())
}

fn open_source(
    input: Option<&Path>,
    simulate: bool,
    config: &Config,
) -> anyhow::Result<Box<dyn LandmarkSource>> {
    if simulate {
        let period = config.timing.frame_period();
        let frames = demo_routine(Utc::now(), period.as_millis().max(1) as i64);
        println!("  Source: synthetic routine ({} frames)", frames.len());
        return Ok(Box::new(ReplaySource::new(frames).with_interval(period)));
    }

    match input {
        Some(path) if path == Path::new("-") => {
            println!("  Source: stdin");
            Ok(Box::new(JsonLinesSource::stdin()))
        }
        Some(path) => {
            println!("  Source: {}", path.display());
            let source = JsonLinesSource::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(Box::new(source))
        }
        None => bail!("No landmark source: pass --input FILE, --input - or --simulate"),
    }
}

fn open_sink(output: Option<&Path>) -> anyhow::Result<Box<dyn SignalSink>> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            println!("  Events: {}", path.display());
            Ok(Box::new(JsonLinesSink::new(BufWriter::new(file))))
        }
        None => Ok(Box::new(LogSink::new())),
    }
}

fn update_config(update: impl FnOnce(&mut Config)) -> anyhow::Result<Config> {
    let mut config = Config::load().unwrap_or_default();
    update(&mut config);
    config.save().context("Error saving config")?;
    Ok(config)
}

fn cmd_pause() -> anyhow::Result<()> {
    update_config(|config| config.paused = true)?;
    println!("Processing paused. Use 'posture-control resume' to continue.");
    Ok(())
}

fn cmd_resume() -> anyhow::Result<()> {
    update_config(|config| config.paused = false)?;
    println!("Processing resumed.");
    Ok(())
}

fn cmd_recalibrate() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();
    config
        .request_recalibration()
        .context("Error requesting recalibration")?;
    println!("Recalibration requested. Hold the reference stance for 3 seconds.");
    Ok(())
}

fn cmd_diagnostics() -> anyhow::Result<()> {
    let config = update_config(|config| config.diagnostics = !config.diagnostics)?;
    println!(
        "Per-cycle diagnostics {}.",
        if config.diagnostics { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn cmd_status() {
    let config = Config::load().unwrap_or_default();

    println!("Posture Control Status");
    println!("======================");
    println!();

    println!("Configuration:");
    println!("  Paused: {}", config.paused);
    println!("  Diagnostics: {}", config.diagnostics);
    println!(
        "  Lean / squat / hands thresholds: {}° / {} / {}",
        config.thresholds.lean_angle_deg,
        config.thresholds.squat_drop_ratio,
        config.thresholds.hands_raised_ratio
    );
    println!(
        "  Priority: {}",
        config
            .priority
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" > ")
    );
    println!("  Actions:");
    for (kind, action) in &config.key_mapping {
        println!("    {kind:<14} → {action}");
    }
    println!();

    match Diagnostics::load_totals(&config.data_path.join("diagnostics.json")) {
        Some(totals) => {
            println!("Cumulative Statistics:");
            println!("  Sessions: {}", totals.sessions);
            println!("  Frames acquired: {}", totals.frames_acquired);
            println!("  Frames processed: {}", totals.frames_processed);
            println!("  Frames dropped: {}", totals.frames_dropped);
            println!("  Events emitted: {}", totals.events_emitted);
        }
        None => println!("No previous session data found."),
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_instructions() {
    println!("{CALIBRATION_INSTRUCTIONS}");
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("Error setting Ctrl+C handler")
}
