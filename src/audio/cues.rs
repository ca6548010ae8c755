//! Local feedback sounds
//!
//! Built-in cues are synthesized tones so the crate ships without binary
//! assets. A configured sound file replaces either cue.

use std::f32::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::decode::DecodedAudio;
use super::output::{AudioSource, DEFAULT_SAMPLE_RATE};

/// Fade applied to both ends of each tone (milliseconds)
const FADE_MS: u32 = 5;

/// Which local cue to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueKind {
    /// A frame was captured
    Capture,
    /// Upload or reply failed
    Error,
}

impl std::str::FromStr for CueKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "capture" => Ok(Self::Capture),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown cue: {other}")),
        }
    }
}

/// Resolved sources for each cue
#[derive(Debug, Clone)]
pub struct CueLibrary {
    capture: AudioSource,
    error: AudioSource,
}

impl Default for CueLibrary {
    fn default() -> Self {
        Self::builtin(DEFAULT_SAMPLE_RATE)
    }
}

impl CueLibrary {
    /// Synthesized cues at `sample_rate`
    #[must_use]
    pub fn builtin(sample_rate: u32) -> Self {
        Self {
            capture: AudioSource::Samples(Arc::new(capture_chime(sample_rate))),
            error: AudioSource::Samples(Arc::new(error_buzz(sample_rate))),
        }
    }

    /// Built-in cues, each optionally replaced by a sound file
    #[must_use]
    pub fn with_overrides(
        sample_rate: u32,
        capture: Option<PathBuf>,
        error: Option<PathBuf>,
    ) -> Self {
        let builtin = Self::builtin(sample_rate);
        Self {
            capture: capture.map_or(builtin.capture, AudioSource::File),
            error: error.map_or(builtin.error, AudioSource::File),
        }
    }

    /// Source for a cue
    #[must_use]
    pub const fn source(&self, kind: CueKind) -> &AudioSource {
        match kind {
            CueKind::Capture => &self.capture,
            CueKind::Error => &self.error,
        }
    }
}

/// Short rising two-tone chime
fn capture_chime(sample_rate: u32) -> DecodedAudio {
    let mut samples = tone(880.0, 90, sample_rate);
    samples.extend(tone(1320.0, 120, sample_rate));
    DecodedAudio {
        samples,
        sample_rate,
    }
}

/// Low double buzz
fn error_buzz(sample_rate: u32) -> DecodedAudio {
    let mut samples = tone(220.0, 150, sample_rate);
    samples.extend(silence(80, sample_rate));
    samples.extend(tone(220.0, 150, sample_rate));
    DecodedAudio {
        samples,
        sample_rate,
    }
}

#[allow(clippy::cast_precision_loss)]
fn tone(frequency: f32, duration_ms: u32, sample_rate: u32) -> Vec<f32> {
    let len = samples_for(duration_ms, sample_rate);
    let fade = samples_for(FADE_MS, sample_rate).max(1);
    (0..len)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let edge = i.min(len - 1 - i);
            let envelope = (edge as f32 / fade as f32).min(1.0);
            0.4 * envelope * (2.0 * PI * frequency * t).sin()
        })
        .collect()
}

fn silence(duration_ms: u32, sample_rate: u32) -> Vec<f32> {
    vec![0.0; samples_for(duration_ms, sample_rate)]
}

fn samples_for(duration_ms: u32, sample_rate: u32) -> usize {
    (u64::from(sample_rate) * u64::from(duration_ms) / 1000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(source: &AudioSource) -> &DecodedAudio {
        match source {
            AudioSource::Samples(audio) => audio,
            AudioSource::File(path) => panic!("unexpected file {}", path.display()),
        }
    }

    #[test]
    fn test_builtin_lengths() {
        let cues = CueLibrary::builtin(24000);
        assert_eq!(samples(cues.source(CueKind::Capture)).duration_ms(), 210);
        assert_eq!(samples(cues.source(CueKind::Error)).duration_ms(), 380);
    }

    #[test]
    fn test_tone_is_bounded_and_faded() {
        let t = tone(440.0, 50, 24000);
        assert!(t.iter().all(|s| s.abs() <= 0.4));
        assert!(t[0].abs() < 1e-6);
    }

    #[test]
    fn test_override_uses_file() {
        let cues = CueLibrary::with_overrides(24000, None, Some(PathBuf::from("/tmp/err.wav")));
        assert!(matches!(cues.source(CueKind::Capture), AudioSource::Samples(_)));
        assert!(matches!(cues.source(CueKind::Error), AudioSource::File(_)));
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("Capture".parse::<CueKind>().unwrap(), CueKind::Capture);
        assert_eq!("error".parse::<CueKind>().unwrap(), CueKind::Error);
        assert!("beep".parse::<CueKind>().is_err());
    }
}
