//! TOML configuration file loading
//!
//! Supports `~/.config/lookout/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::capture::DetectorProfile;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LookoutConfigFile {
    /// Upload endpoint configuration
    #[serde(default)]
    pub upload: UploadFileConfig,

    /// Frame gating and encoding
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Cue and reply playback
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Status LED
    #[serde(default)]
    pub indicator: IndicatorFileConfig,
}

/// Upload configuration
#[derive(Debug, Default, Deserialize)]
pub struct UploadFileConfig {
    /// Endpoint URL receiving the JPEG
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Multipart field name
    pub field_name: Option<String>,

    /// File name attached to the multipart part
    pub file_name: Option<String>,
}

/// Capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Minimum milliseconds between frames sent to detection
    pub throttle_ms: Option<u64>,

    /// JPEG quality (1-100)
    pub jpeg_quality: Option<u8>,

    /// Classifier profile ("fast" or "accurate")
    pub detector_profile: Option<DetectorProfile>,
}

/// Audio configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Sound file replacing the built-in capture cue
    pub capture_cue: Option<PathBuf>,

    /// Sound file replacing the built-in error cue
    pub error_cue: Option<PathBuf>,

    /// Directory for temporary reply audio
    pub temp_dir: Option<PathBuf>,

    /// Output device sample rate
    pub sample_rate: Option<u32>,
}

/// Indicator configuration
#[derive(Debug, Default, Deserialize)]
pub struct IndicatorFileConfig {
    /// Drive the status LEDs
    pub enabled: Option<bool>,

    /// Directory holding the `red`, `green`, and `blue` LED classes
    pub sysfs_root: Option<PathBuf>,
}

/// Load a TOML config file
///
/// Uses `path` when given, otherwise the standard location. Returns
/// `LookoutConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> LookoutConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return LookoutConfigFile::default();
    };

    if !path.exists() {
        return LookoutConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                LookoutConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            LookoutConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/lookout/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("lookout").join("config.toml"))
}
