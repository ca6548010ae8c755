//! Face capture pipeline
//!
//! The gate decides which frames reach the classifier; the service drives a
//! hit through encoding, the capture cue, the upload, and reply playback.

mod detect;
mod gate;
mod pipeline;

pub use detect::{
    Detection, DetectionAdapter, DetectorOptions, DetectorProfile, FaceClassifier, FaceRegion,
};
pub use gate::{
    Admission, ArmOutcome, CaptureGate, CaptureState, DEFAULT_THROTTLE, GateSnapshot, Ticket,
};
pub use pipeline::{Capabilities, CaptureEvent, CaptureService};
