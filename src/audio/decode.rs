//! Audio decoding and resampling
//!
//! Reply audio arrives as an arbitrary container. RIFF/WAVE is read with
//! hound, anything else is tried as MP3. Output is mono f32.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::{Error, Result};

/// Decoded mono PCM
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Playback length in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }

    /// Resample to `rate` if needed
    ///
    /// # Errors
    ///
    /// Returns error if the resampler cannot be built
    pub fn into_rate(self, rate: u32) -> Result<Self> {
        if self.sample_rate == rate || self.samples.is_empty() {
            return Ok(Self {
                samples: self.samples,
                sample_rate: rate,
            });
        }
        let samples = resample(&self.samples, self.sample_rate, rate)?;
        Ok(Self {
            samples,
            sample_rate: rate,
        })
    }
}

/// Decode an audio file
///
/// # Errors
///
/// Returns error if the file cannot be read or is not WAV or MP3
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let mut magic = [0u8; 4];
    let read = File::open(path)?.read(&mut magic)?;

    if read == 4 && &magic == b"RIFF" {
        decode_wav(path)
    } else {
        decode_mp3(path)
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode_wav(path: &Path) -> Result<DecodedAudio> {
    let reader = hound::WavReader::open(path).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(format!("WAV decode error: {e}")))?
        }
    };

    Ok(DecodedAudio {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
    })
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn decode_mp3(path: &Path) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(BufReader::new(File::open(path)?));
    let mut samples = Vec::new();
    let mut sample_rate = 0_u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                samples.extend(downmix(&pcm, frame.channels.max(1)));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    if sample_rate == 0 {
        return Err(Error::Audio("no decodable audio frames".to_string()));
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

/// Average interleaved channels into mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample mono audio using rubato
///
/// The final partial chunk is zero-padded so no tail is lost.
#[allow(clippy::cast_possible_truncation)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let mut output = Vec::with_capacity(samples.len() * to_rate as usize / from_rate as usize + 1);

    for chunk in samples.chunks(chunk_size) {
        let mut block: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        block.resize(chunk_size, 0.0);

        let result = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    Ok(output)
}
