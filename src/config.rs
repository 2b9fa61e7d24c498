//! Configuration for the posture control pipeline.
//!
//! Every threshold, timing constant, queue size, the arbitration order and the
//! gesture-to-action table live here so they can be tuned without code changes.

use crate::core::gesture::GestureKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gesture detection thresholds
    pub thresholds: Thresholds,

    /// Confirmation, cooldown and calibration timing
    pub timing: Timing,

    /// Reference stance tolerances for calibration
    pub calibration: StanceConfig,

    /// Bounded queue sizes between stages
    pub queues: QueueConfig,

    /// Retry policy for the landmark source
    pub source: SourcePolicy,

    /// Arbitration order, highest priority first; must list every kind once
    pub priority: Vec<GestureKind>,

    /// Gesture to action id table handed to the signal sink
    pub key_mapping: BTreeMap<GestureKind, String>,

    /// Whether processing is currently paused
    pub paused: bool,

    /// Whether per-cycle diagnostics logging is enabled
    pub diagnostics: bool,

    /// Path for diagnostics persistence and control markers
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("posture-control");

        Self {
            thresholds: Thresholds::default(),
            timing: Timing::default(),
            calibration: StanceConfig::default(),
            queues: QueueConfig::default(),
            source: SourcePolicy::default(),
            priority: GestureKind::DEFAULT_PRIORITY.to_vec(),
            key_mapping: GestureKind::ALL
                .iter()
                .map(|kind| (*kind, kind.default_action().to_string()))
                .collect(),
            paused: false,
            diagnostics: false,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults if it
    /// does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("posture-control")
            .join("config.json")
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Marker file a running agent polls for recalibration requests.
    pub fn recalibration_marker(&self) -> PathBuf {
        self.data_path.join("recalibrate.request")
    }

    /// Ask a running agent to recalibrate.
    pub fn request_recalibration(&self) -> Result<(), ConfigError> {
        self.ensure_directories()?;
        std::fs::write(self.recalibration_marker(), chrono::Utc::now().to_rfc3339())
            .map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Consume a pending recalibration request, if any.
    pub fn take_recalibration_request(&self) -> bool {
        std::fs::remove_file(self.recalibration_marker()).is_ok()
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in GestureKind::ALL {
            let count = self.priority.iter().filter(|k| **k == kind).count();
            if count != 1 {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "priority order must list {kind} exactly once (found {count})"
                )));
            }
        }
        if self.priority.len() != GestureKind::COUNT {
            return Err(ConfigError::InvalidConfiguration(format!(
                "priority order has {} entries, expected {}",
                self.priority.len(),
                GestureKind::COUNT
            )));
        }

        if self.queues.frame_capacity == 0 || self.queues.event_capacity == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "queue capacities must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.thresholds.min_visibility) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "min_visibility must be within [0, 1], got {}",
                self.thresholds.min_visibility
            )));
        }

        let positive = [
            ("lean_angle_deg", self.thresholds.lean_angle_deg),
            ("hands_raised_ratio", self.thresholds.hands_raised_ratio),
            ("squat_drop_ratio", self.thresholds.squat_drop_ratio),
            ("punch_speed", self.thresholds.punch_speed),
            ("punch_depth", self.thresholds.punch_depth),
            ("target_fps", self.timing.target_fps),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| !(*v > 0.0)) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "{name} must be positive, got {value}"
            )));
        }
        if self.thresholds.crossed_arms_offset < 0.0 {
            return Err(ConfigError::InvalidConfiguration(
                "crossed_arms_offset must not be negative".to_string(),
            ));
        }

        if self.timing.calibration_hold.is_zero() {
            return Err(ConfigError::InvalidConfiguration(
                "calibration_hold must be positive".to_string(),
            ));
        }
        if self.timing.sink_timeout.is_zero() {
            return Err(ConfigError::InvalidConfiguration(
                "sink_timeout must be positive".to_string(),
            ));
        }

        if !(0.0..0.5).contains(&self.calibration.trim_fraction) {
            return Err(ConfigError::InvalidConfiguration(format!(
                "trim_fraction must be within [0, 0.5), got {}",
                self.calibration.trim_fraction
            )));
        }

        if self.key_mapping.values().any(|action| action.trim().is_empty()) {
            return Err(ConfigError::InvalidConfiguration(
                "action ids must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Gesture detection thresholds, expressed relative to the calibrated baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Torso tilt from neutral, in degrees
    pub lean_angle_deg: f64,
    /// Wrist height above the shoulder line, in torso lengths
    pub hands_raised_ratio: f64,
    /// Hip drop below the calibrated hip height, in torso lengths
    pub squat_drop_ratio: f64,
    /// Wrist speed, in normalized image units per second
    pub punch_speed: f64,
    /// Forward wrist depth change from neutral
    pub punch_depth: f64,
    /// How far past the body center a wrist must cross, in torso lengths
    pub crossed_arms_offset: f64,
    /// Minimum landmark visibility
    pub min_visibility: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            lean_angle_deg: 15.0,
            hands_raised_ratio: 0.2,
            squat_drop_ratio: 0.25,
            punch_speed: 1.5,
            punch_depth: 0.15,
            crossed_arms_offset: 0.1,
            min_visibility: 0.5,
        }
    }
}

/// State machine and pipeline timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// How long a candidate must persist before it is confirmed
    #[serde(with = "duration_ms")]
    pub confirmation: Duration,
    /// Quiet period after a confirmed gesture
    #[serde(with = "duration_ms")]
    pub cooldown: Duration,
    /// How long the reference stance must be held
    #[serde(with = "duration_ms")]
    pub calibration_hold: Duration,
    /// End-to-end latency target; overruns are logged
    #[serde(with = "duration_ms")]
    pub latency_budget: Duration,
    /// Longest the emission stage waits on one sink call
    #[serde(with = "duration_ms")]
    pub sink_timeout: Duration,
    /// Expected observation rate
    pub target_fps: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            confirmation: Duration::from_millis(100),
            cooldown: Duration::from_millis(200),
            calibration_hold: Duration::from_secs(3),
            latency_budget: Duration::from_millis(150),
            sink_timeout: Duration::from_millis(100),
            target_fps: 30.0,
        }
    }
}

impl Timing {
    /// Nominal time between frames.
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.max(1.0))
    }
}

/// Tolerances for the calibration reference stance (arms out, feet apart,
/// facing the camera).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StanceConfig {
    /// Maximum torso tilt from vertical, in degrees
    pub max_tilt_deg: f64,
    /// Maximum wrist distance from the shoulder line, in torso lengths
    pub wrist_height_tolerance: f64,
    /// Minimum wrist-to-wrist span, in shoulder widths
    pub min_arm_span: f64,
    /// Minimum ankle spread, in hip widths; `None` skips the feet check
    pub min_feet_spread: Option<f64>,
    /// Fraction of holding samples dropped at each end before averaging
    pub trim_fraction: f64,
}

impl Default for StanceConfig {
    fn default() -> Self {
        Self {
            max_tilt_deg: 10.0,
            wrist_height_tolerance: 0.25,
            min_arm_span: 2.0,
            min_feet_spread: Some(1.0),
            trim_fraction: 0.1,
        }
    }
}

/// Capacities of the bounded stage queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub frame_capacity: usize,
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            frame_capacity: 2,
            event_capacity: 4,
        }
    }
}

/// How the acquisition stage treats a failing source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePolicy {
    /// Longest single wait on the source
    #[serde(with = "duration_ms")]
    pub poll_timeout: Duration,
    /// Pause after a failed poll before retrying
    #[serde(with = "duration_ms")]
    pub retry_backoff: Duration,
    /// Consecutive failures tolerated before the source is declared lost
    pub max_consecutive_failures: u32,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(20),
            max_consecutive_failures: 30,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidConfiguration(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::InvalidConfiguration(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
