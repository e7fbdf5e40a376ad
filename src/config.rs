//! Processing parameters and application settings.
//!
//! `ProcessingConfig` is the per-run parameter set. `AppConfig::load` builds
//! it from built-in defaults, an optional TOML file (`KEYFRAME_CONFIG`) and
//! `KEYFRAME_*` environment variables. Every value the operator set in the
//! file or the environment is also kept in `AppConfig::configured`, so it
//! outranks the plan the pipeline derives from video metadata.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::Device;
use crate::error::KeyframeError;

const DEFAULT_OUTPUT_DIR: &str = "output";
const DEFAULT_MODEL_PATH: &str = "yolov8m.onnx";
pub const DEFAULT_SAMPLE_RATE: u32 = 1;
pub const DEFAULT_MAX_FRAMES: usize = 100;
pub const DEFAULT_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_TIME_THRESHOLD: f64 = 1.0;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

pub const SAMPLE_RATE_RANGE: (u32, u32) = (1, 10);
pub const MAX_FRAMES_RANGE: (usize, usize) = (10, 500);

// ----------------------------------------------------------------------------
// Per-run parameters
// ----------------------------------------------------------------------------

/// Parameters for one extraction run.
///
/// Range checks live in [`ProcessingConfig::validate`], which callers run at
/// the boundary. Detector and selector accept any value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Process every Nth frame.
    pub sample_rate: u32,
    /// Upper bound on persisted keyframes.
    pub max_frames: usize,
    pub confidence_threshold: f32,
    /// Minimum spacing in seconds between surviving keyframes.
    pub time_threshold: f64,
    pub jpeg_quality: u8,
    /// Link detections across sampled frames and assign track ids.
    #[serde(default)]
    pub track_persons: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_frames: DEFAULT_MAX_FRAMES,
            confidence_threshold: DEFAULT_CONFIDENCE,
            time_threshold: DEFAULT_TIME_THRESHOLD,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            track_persons: false,
        }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<(), KeyframeError> {
        let (lo, hi) = SAMPLE_RATE_RANGE;
        if !(lo..=hi).contains(&self.sample_rate) {
            return Err(KeyframeError::InvalidConfig(format!(
                "sample_rate must be in [{lo}, {hi}], got {}",
                self.sample_rate
            )));
        }
        let (lo, hi) = MAX_FRAMES_RANGE;
        if !(lo..=hi).contains(&self.max_frames) {
            return Err(KeyframeError::InvalidConfig(format!(
                "max_frames must be in [{lo}, {hi}], got {}",
                self.max_frames
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(KeyframeError::InvalidConfig(format!(
                "confidence_threshold must be in [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if !self.time_threshold.is_finite() || self.time_threshold < 0.0 {
            return Err(KeyframeError::InvalidConfig(format!(
                "time_threshold must be a non-negative number of seconds, got {}",
                self.time_threshold
            )));
        }
        if self.jpeg_quality > 100 {
            return Err(KeyframeError::InvalidConfig(format!(
                "jpeg_quality must be in [0, 100], got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Caller-supplied values that take precedence over the derived plan.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ConfigOverrides {
    pub sample_rate: Option<u32>,
    pub max_frames: Option<usize>,
    pub confidence_threshold: Option<f32>,
    pub time_threshold: Option<f64>,
    pub jpeg_quality: Option<u8>,
    pub track_persons: Option<bool>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Field-wise union; values set in `higher` win.
    pub fn merged(&self, higher: &ConfigOverrides) -> ConfigOverrides {
        ConfigOverrides {
            sample_rate: higher.sample_rate.or(self.sample_rate),
            max_frames: higher.max_frames.or(self.max_frames),
            confidence_threshold: higher.confidence_threshold.or(self.confidence_threshold),
            time_threshold: higher.time_threshold.or(self.time_threshold),
            jpeg_quality: higher.jpeg_quality.or(self.jpeg_quality),
            track_persons: higher.track_persons.or(self.track_persons),
        }
    }

    /// Overlay every explicitly set field onto `base`.
    pub fn apply(&self, base: &ProcessingConfig) -> ProcessingConfig {
        ProcessingConfig {
            sample_rate: self.sample_rate.unwrap_or(base.sample_rate),
            max_frames: self.max_frames.unwrap_or(base.max_frames),
            confidence_threshold: self
                .confidence_threshold
                .unwrap_or(base.confidence_threshold),
            time_threshold: self.time_threshold.unwrap_or(base.time_threshold),
            jpeg_quality: self.jpeg_quality.unwrap_or(base.jpeg_quality),
            track_persons: self.track_persons.unwrap_or(base.track_persons),
        }
    }
}

// ----------------------------------------------------------------------------
// Application config (file + env)
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    output: Option<OutputConfigFile>,
    model: Option<ModelConfigFile>,
    processing: Option<ConfigOverrides>,
    job: Option<JobConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    device: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct JobConfigFile {
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub output_dir: PathBuf,
    pub model_path: PathBuf,
    /// `None` walks the full accelerator -> gpu -> cpu preference order.
    pub device: Option<Device>,
    /// Built-in defaults with `configured` applied.
    pub processing: ProcessingConfig,
    /// Processing values set explicitly in the config file or environment.
    pub configured: ConfigOverrides,
    pub job_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            device: None,
            processing: ProcessingConfig::default(),
            configured: ConfigOverrides::default(),
            job_timeout: None,
        }
    }
}

impl AppConfig {
    /// Load from `KEYFRAME_CONFIG` (TOML, optional), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("KEYFRAME_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let output_dir = file
            .output
            .and_then(|output| output.dir)
            .unwrap_or(defaults.output_dir);
        let model_path = file
            .model
            .as_ref()
            .and_then(|model| model.path.clone())
            .unwrap_or(defaults.model_path);
        let device = match file.model.and_then(|model| model.device) {
            Some(raw) => parse_device(&raw)?,
            None => None,
        };
        let configured = file.processing.unwrap_or_default();
        let processing = configured.apply(&defaults.processing);
        let job_timeout = file
            .job
            .and_then(|job| job.timeout_secs)
            .map(Duration::from_secs);
        Ok(Self {
            output_dir,
            model_path,
            device,
            processing,
            configured,
            job_timeout,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env_nonempty("KEYFRAME_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_nonempty("KEYFRAME_MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }
        if let Some(device) = env_nonempty("KEYFRAME_DEVICE") {
            self.device = parse_device(&device)?;
        }
        if let Some(rate) = env_nonempty("KEYFRAME_SAMPLE_RATE") {
            let rate = rate
                .parse()
                .map_err(|_| anyhow!("KEYFRAME_SAMPLE_RATE must be a positive integer"))?;
            self.configured.sample_rate = Some(rate);
        }
        if let Some(max) = env_nonempty("KEYFRAME_MAX_FRAMES") {
            let max = max
                .parse()
                .map_err(|_| anyhow!("KEYFRAME_MAX_FRAMES must be a positive integer"))?;
            self.configured.max_frames = Some(max);
        }
        if let Some(conf) = env_nonempty("KEYFRAME_CONFIDENCE") {
            let conf = conf
                .parse()
                .map_err(|_| anyhow!("KEYFRAME_CONFIDENCE must be a number in [0, 1]"))?;
            self.configured.confidence_threshold = Some(conf);
        }
        if let Some(secs) = env_nonempty("KEYFRAME_TIME_THRESHOLD") {
            let secs = secs
                .parse()
                .map_err(|_| anyhow!("KEYFRAME_TIME_THRESHOLD must be a number of seconds"))?;
            self.configured.time_threshold = Some(secs);
        }
        if let Some(quality) = env_nonempty("KEYFRAME_JPEG_QUALITY") {
            let quality = quality
                .parse()
                .map_err(|_| anyhow!("KEYFRAME_JPEG_QUALITY must be an integer in [0, 100]"))?;
            self.configured.jpeg_quality = Some(quality);
        }
        self.processing = self.configured.apply(&ProcessingConfig::default());
        if let Some(timeout) = env_nonempty("KEYFRAME_JOB_TIMEOUT_SECS") {
            let seconds: u64 = timeout.parse().map_err(|_| {
                anyhow!("KEYFRAME_JOB_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.job_timeout = Some(Duration::from_secs(seconds));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.processing.validate()?;
        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            return Err(anyhow!("job timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// `auto` (or empty) means no forced device.
pub fn parse_device(raw: &str) -> Result<Option<Device>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    raw.parse().map(Some)
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(ProcessingConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let base = ProcessingConfig::default();
        for bad in [
            ProcessingConfig {
                sample_rate: 0,
                ..base.clone()
            },
            ProcessingConfig {
                sample_rate: 11,
                ..base.clone()
            },
            ProcessingConfig {
                max_frames: 9,
                ..base.clone()
            },
            ProcessingConfig {
                max_frames: 501,
                ..base.clone()
            },
            ProcessingConfig {
                confidence_threshold: 1.5,
                ..base.clone()
            },
            ProcessingConfig {
                time_threshold: -1.0,
                ..base.clone()
            },
            ProcessingConfig {
                jpeg_quality: 101,
                ..base.clone()
            },
        ] {
            assert!(
                matches!(bad.validate(), Err(KeyframeError::InvalidConfig(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn overrides_take_precedence() {
        let base = ProcessingConfig::default();
        let overrides = ConfigOverrides {
            sample_rate: Some(4),
            jpeg_quality: Some(70),
            ..Default::default()
        };
        let merged = overrides.apply(&base);
        assert_eq!(merged.sample_rate, 4);
        assert_eq!(merged.jpeg_quality, 70);
        assert_eq!(merged.max_frames, base.max_frames);
        assert!(!overrides.is_empty());
        assert!(ConfigOverrides::default().is_empty());
    }

    #[test]
    fn merged_prefers_the_higher_layer() {
        let configured = ConfigOverrides {
            sample_rate: Some(5),
            max_frames: Some(40),
            ..Default::default()
        };
        let caller = ConfigOverrides {
            max_frames: Some(12),
            ..Default::default()
        };
        let merged = configured.merged(&caller);
        assert_eq!(merged.sample_rate, Some(5));
        assert_eq!(merged.max_frames, Some(12));
        assert_eq!(merged.jpeg_quality, None);
    }

    #[test]
    fn parse_device_accepts_auto() {
        assert_eq!(parse_device("auto").unwrap(), None);
        assert_eq!(parse_device(" GPU ").unwrap(), Some(Device::Gpu));
        assert!(parse_device("tpu").is_err());
    }
}
