//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ObsError, ObsResult};

/// Maximum number of planar audio channels a frame may carry.
pub const MAX_AUDIO_CHANNELS: u16 = 8;

/// Global application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Output canvas and frame cadence.
    pub video: VideoConfig,

    /// Mixed audio format.
    pub audio: AudioConfig,

    /// Degradation thresholds for the streaming loop.
    pub pipeline: PipelineConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Output canvas settings. Every scene composites onto a canvas of this size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Canvas width in pixels.
    pub width: u32,

    /// Canvas height in pixels.
    pub height: u32,

    /// Pipeline ticks per second.
    pub fps: u32,
}

/// Scene audio format. Sources with a different rate or channel count are
/// excluded from the mix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of planar channels.
    pub channels: u16,
}

/// Thresholds for sustained-degradation signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Consecutive overrunning ticks before a health event fires.
    pub overrun_alert_ticks: u32,

    /// Consecutive ticks an output may stay inactive before a health event fires.
    pub output_inactive_ticks: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "simpleobs_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file that receives a copy of the console output.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            video: VideoConfig::default(),
            audio: AudioConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 60,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            overrun_alert_ticks: 30,
            output_inactive_ticks: 120,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> ObsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> ObsResult<PathBuf> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, json)?;
        Ok(config_path)
    }

    /// Reject settings the compositor and pipeline cannot run with.
    pub fn validate(&self) -> ObsResult<()> {
        if self.video.width == 0 || self.video.height == 0 {
            return Err(ObsError::config("canvas dimensions must be non-zero"));
        }
        if self.video.fps == 0 {
            return Err(ObsError::config("fps must be greater than zero"));
        }
        if self.audio.sample_rate == 0 {
            return Err(ObsError::config("audio sample rate must be non-zero"));
        }
        if self.audio.channels == 0 || self.audio.channels > MAX_AUDIO_CHANNELS {
            return Err(ObsError::config(format!(
                "audio channels must be in 1..={MAX_AUDIO_CHANNELS}, got {}",
                self.audio.channels
            )));
        }
        if self.pipeline.overrun_alert_ticks == 0 || self.pipeline.output_inactive_ticks == 0 {
            return Err(ObsError::config("health thresholds must be non-zero"));
        }
        Ok(())
    }

    /// Audio samples rendered per pipeline tick.
    pub fn samples_per_frame(&self) -> usize {
        (self.audio.sample_rate / self.video.fps.max(1)).max(1) as usize
    }

    /// Target duration of one pipeline tick.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.video.fps.max(1) as u64)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("simpleobs").join("config.json")
}
