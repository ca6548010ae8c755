//! Audio feedback module
//!
//! Handles cue synthesis, reply decoding, and serialized playback.
//! The output device sits behind [`AudioOutput`] so tests can substitute it.

mod cues;
mod decode;
mod output;
mod playback;

pub use cues::{CueKind, CueLibrary};
pub use decode::{DecodedAudio, decode_file};
pub use output::{AudioOutput, AudioSource, CpalOutput, DEFAULT_SAMPLE_RATE, StopSignal};
pub use playback::{PlaybackController, PlaybackOutcome, PlaybackRequest};
