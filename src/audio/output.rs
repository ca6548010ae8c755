//! Audio output devices

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::decode::{DecodedAudio, decode_file};
use crate::{Error, Result};

/// Default output sample rate (matches common TTS output)
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// Cooperative stop flag shared between the controller and a playback
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create an unset signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the playback to stop
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Something an output device can play
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Already-decoded samples
    Samples(Arc<DecodedAudio>),
    /// Seekable file to decode
    File(PathBuf),
}

/// External audio output capability
///
/// `play` blocks until the clip ends, `stop` is signalled, or the device
/// fails. Callers run it off the async runtime.
pub trait AudioOutput: Send + Sync {
    /// Play a clip to completion or until stopped
    ///
    /// # Errors
    ///
    /// Returns error if decoding or the device fails
    fn play(&self, source: &AudioSource, stop: &StopSignal) -> Result<()>;
}

/// Plays audio on the default output device via cpal
#[derive(Debug, Clone)]
pub struct CpalOutput {
    sample_rate: u32,
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl CpalOutput {
    /// Create an output that renders at `sample_rate`
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    fn stream_config(&self, device: &cpal::Device) -> Result<StreamConfig> {
        let rate = SampleRate(self.sample_rate);
        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        Ok(supported.with_sample_rate(rate).config())
    }

    fn play_samples(&self, samples: Vec<f32>, stop: &StopSignal) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let config = self.stream_config(&device)?;
        let channels = usize::from(config.channels);

        let sample_count = samples.len();
        let samples = Arc::new(samples);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or_else(|| {
                                finished.store(true, Ordering::Release);
                                0.0
                            });
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = sample_count as u64 * 1000 / u64::from(self.sample_rate);
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Acquire) && !stop.is_stopped() {
            if start.elapsed() > timeout {
                tracing::warn!(duration_ms, "playback timed out");
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        if !stop.is_stopped() {
            // Let the device drain its last buffer
            std::thread::sleep(Duration::from_millis(100));
        }

        drop(stream);
        tracing::debug!(
            samples = sample_count,
            stopped = stop.is_stopped(),
            "playback complete"
        );

        Ok(())
    }
}

impl AudioOutput for CpalOutput {
    fn play(&self, source: &AudioSource, stop: &StopSignal) -> Result<()> {
        let audio = match source {
            AudioSource::Samples(audio) => DecodedAudio::clone(audio),
            AudioSource::File(path) => decode_file(path)?,
        };
        let audio = audio.into_rate(self.sample_rate)?;
        self.play_samples(audio.samples, stop)
    }
}
