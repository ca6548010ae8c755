//! Configuration management for Lookout
//!
//! Values resolve env > TOML file > default.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::audio::{CueLibrary, DEFAULT_SAMPLE_RATE};
use crate::capture::{DEFAULT_THROTTLE, DetectorOptions, DetectorProfile};
use crate::codec::DEFAULT_JPEG_QUALITY;
use crate::upload::UploadForm;
use crate::{Error, Result};

/// Default upload endpoint
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/face/identify";

/// Default per-request upload timeout
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 30;

/// Default sysfs LED class directory
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/leds";

/// Lookout configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    /// Upload endpoint
    pub upload: UploadConfig,

    /// Frame gating and encoding
    pub capture: CaptureConfig,

    /// Cue and reply playback
    pub audio: AudioConfig,

    /// Status LED
    pub indicator: IndicatorConfig,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize)]
pub struct UploadConfig {
    /// Endpoint URL receiving the JPEG
    pub endpoint: String,

    /// Per-request timeout in seconds (bounds one attempt; there are no retries)
    pub timeout_secs: u64,

    /// Multipart field name
    pub field_name: String,

    /// File name attached to the multipart part
    pub file_name: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let form = UploadForm::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_UPLOAD_TIMEOUT_SECS,
            field_name: form.field_name,
            file_name: form.file_name,
        }
    }
}

impl UploadConfig {
    /// Request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Multipart layout
    #[must_use]
    pub fn form(&self) -> UploadForm {
        UploadForm {
            field_name: self.field_name.clone(),
            file_name: self.file_name.clone(),
        }
    }
}

/// Capture configuration
#[derive(Debug, Clone, Serialize)]
pub struct CaptureConfig {
    /// Minimum milliseconds between frames sent to detection
    pub throttle_ms: u64,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,

    /// Classifier profile
    pub detector_profile: DetectorProfile,
}

impl Default for CaptureConfig {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            throttle_ms: DEFAULT_THROTTLE.as_millis() as u64,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            detector_profile: DetectorProfile::default(),
        }
    }
}

impl CaptureConfig {
    /// Throttle interval
    #[must_use]
    pub const fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    /// Options sent to the classifier
    #[must_use]
    pub const fn detector_options(&self) -> DetectorOptions {
        DetectorOptions::with_profile(self.detector_profile)
    }
}

/// Audio configuration
#[derive(Debug, Clone, Serialize)]
pub struct AudioConfig {
    /// Sound file replacing the built-in capture cue
    pub capture_cue: Option<PathBuf>,

    /// Sound file replacing the built-in error cue
    pub error_cue: Option<PathBuf>,

    /// Directory for temporary reply audio
    pub temp_dir: PathBuf,

    /// Output device sample rate
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_cue: None,
            error_cue: None,
            temp_dir: std::env::temp_dir(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl AudioConfig {
    /// Cue sources with configured overrides applied
    #[must_use]
    pub fn cue_library(&self) -> CueLibrary {
        CueLibrary::with_overrides(
            self.sample_rate,
            self.capture_cue.clone(),
            self.error_cue.clone(),
        )
    }
}

/// Status LED configuration
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorConfig {
    /// Drive the LEDs
    pub enabled: bool,

    /// sysfs LED class directory
    pub sysfs_root: PathBuf,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
        }
    }
}

impl Config {
    /// Load configuration from the environment and an optional config file
    ///
    /// Without `path`, the standard location is used.
    ///
    /// # Errors
    ///
    /// Returns error if an environment value is malformed or a setting is out of range
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path);
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with environment lookups over defaults
    ///
    /// # Errors
    ///
    /// Returns error if an environment value is malformed or a setting is out of range
    pub fn resolve(
        fc: file::LookoutConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();

        let upload = UploadConfig {
            endpoint: env("LOOKOUT_ENDPOINT")
                .or(fc.upload.endpoint)
                .unwrap_or(defaults.upload.endpoint),
            timeout_secs: parse_env(&env, "LOOKOUT_UPLOAD_TIMEOUT_SECS")?
                .or(fc.upload.timeout_secs)
                .unwrap_or(defaults.upload.timeout_secs),
            field_name: fc.upload.field_name.unwrap_or(defaults.upload.field_name),
            file_name: fc.upload.file_name.unwrap_or(defaults.upload.file_name),
        };

        let capture = CaptureConfig {
            throttle_ms: parse_env(&env, "LOOKOUT_THROTTLE_MS")?
                .or(fc.capture.throttle_ms)
                .unwrap_or(defaults.capture.throttle_ms),
            jpeg_quality: parse_env(&env, "LOOKOUT_JPEG_QUALITY")?
                .or(fc.capture.jpeg_quality)
                .unwrap_or(defaults.capture.jpeg_quality),
            detector_profile: fc
                .capture
                .detector_profile
                .unwrap_or(defaults.capture.detector_profile),
        };

        let audio = AudioConfig {
            capture_cue: fc.audio.capture_cue,
            error_cue: fc.audio.error_cue,
            temp_dir: env("LOOKOUT_TEMP_DIR")
                .map(PathBuf::from)
                .or(fc.audio.temp_dir)
                .unwrap_or(defaults.audio.temp_dir),
            sample_rate: fc.audio.sample_rate.unwrap_or(defaults.audio.sample_rate),
        };

        let indicator = IndicatorConfig {
            enabled: env("LOOKOUT_LED")
                .map(|v| v == "true" || v == "1")
                .or(fc.indicator.enabled)
                .unwrap_or(defaults.indicator.enabled),
            sysfs_root: fc
                .indicator
                .sysfs_root
                .unwrap_or(defaults.indicator.sysfs_root),
        };

        let config = Self {
            upload,
            capture,
            audio,
            indicator,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first invalid setting
    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.upload.endpoint).map_err(|e| {
            Error::Config(format!("invalid upload endpoint {}: {e}", self.upload.endpoint))
        })?;
        if self.upload.timeout_secs == 0 {
            return Err(Error::Config("upload timeout must be positive".to_string()));
        }
        if self.upload.field_name.is_empty() {
            return Err(Error::Config("upload field name is empty".to_string()));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return Err(Error::Config(format!(
                "jpeg quality {} outside 1..=100",
                self.capture.jpeg_quality
            )));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample rate must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::Config(format!("{key} has invalid value {raw:?}")))
        })
        .transpose()
}
