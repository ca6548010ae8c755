//! Lookout - camera-triggered face capture with spoken replies
//!
//! This library provides the capture core:
//! - Frame gating (arm/disarm, 1 Hz throttle) and face detection
//! - YUV 4:2:0 to NV21 to JPEG conversion
//! - Multipart upload of the captured still
//! - Serialized playback of feedback cues and the returned audio
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               External capabilities                  │
//! │  FrameSource │ FaceClassifier │ Transport │ Output   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 CaptureService                       │
//! │  CaptureGate → Detection → FrameCodec → Upload      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               PlaybackController                     │
//! │   capture cue  │  error cue  │  reply audio         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod camera;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod frame;
pub mod indicator;
pub mod upload;

pub use audio::{CueKind, PlaybackController, PlaybackOutcome, PlaybackRequest};
pub use camera::{Backpressure, CameraFacade, FrameHandler, FrameSource};
pub use capture::{
    ArmOutcome, Capabilities, CaptureEvent, CaptureService, CaptureState, FaceClassifier,
    FaceRegion,
};
pub use codec::{EncodedImage, FrameCodec};
pub use config::Config;
pub use error::{Error, Result};
pub use frame::{Plane, RawFrame, YuvImage};
pub use upload::{HttpTransport, Transport, UploadCoordinator};
