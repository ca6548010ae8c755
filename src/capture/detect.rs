//! Face detection adapter
//!
//! The classifier itself is an external capability behind [`FaceClassifier`].
//! The adapter gives every call the same shape: a hit with regions, a miss,
//! or a failure. It never retries.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::frame::RawFrame;
use crate::{Error, Result};

/// Face bounding box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceRegion {
    /// Left edge
    pub left: u32,
    /// Top edge
    pub top: u32,
    /// Box width
    pub width: u32,
    /// Box height
    pub height: u32,
}

impl FaceRegion {
    /// Create a region
    #[must_use]
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Box area in pixels
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Classifier performance profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorProfile {
    /// Latency over detail
    #[default]
    Fast,
    /// Detail over latency
    Accurate,
}

/// Options sent with every classification request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorOptions {
    /// Performance profile
    pub profile: DetectorProfile,
    /// Request per-face landmarks
    pub landmarks: bool,
    /// Request per-face contours
    pub contours: bool,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self::fast()
    }
}

impl DetectorOptions {
    /// Fast profile without landmarks or contours
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            profile: DetectorProfile::Fast,
            landmarks: false,
            contours: false,
        }
    }

    /// Options for a given profile, still without landmarks or contours
    #[must_use]
    pub const fn with_profile(profile: DetectorProfile) -> Self {
        Self {
            profile,
            landmarks: false,
            contours: false,
        }
    }
}

/// External face classifier capability
///
/// Given a single frame, returns zero or more face regions. Implementations
/// must not keep the frame beyond the call.
#[async_trait]
pub trait FaceClassifier: Send + Sync {
    /// Classify one frame
    async fn classify(&self, frame: &RawFrame, options: &DetectorOptions)
    -> Result<Vec<FaceRegion>>;
}

/// Outcome of one classification
#[derive(Debug)]
pub enum Detection {
    /// At least one face
    Hit(Vec<FaceRegion>),
    /// No faces
    Miss,
    /// The classifier failed; the frame is dropped
    Failed(Error),
}

/// Uniform async wrapper around the classifier
#[derive(Clone)]
pub struct DetectionAdapter {
    classifier: Arc<dyn FaceClassifier>,
    options: DetectorOptions,
}

impl DetectionAdapter {
    /// Wrap a classifier with the given request options
    #[must_use]
    pub fn new(classifier: Arc<dyn FaceClassifier>, options: DetectorOptions) -> Self {
        Self {
            classifier,
            options,
        }
    }

    /// Classify a frame; the caller keeps ownership of it
    pub async fn classify(&self, frame: &RawFrame) -> Detection {
        let start = std::time::Instant::now();
        let result = self.classifier.classify(frame, &self.options).await;
        let elapsed_ms = start.elapsed().as_millis();

        match result {
            Ok(regions) if regions.is_empty() => {
                tracing::trace!(elapsed_ms, "no face in frame");
                Detection::Miss
            }
            Ok(regions) => {
                tracing::debug!(faces = regions.len(), elapsed_ms, "face detected");
                Detection::Hit(regions)
            }
            Err(e) => {
                tracing::warn!(error = %e, elapsed_ms, "face classification failed");
                Detection::Failed(e)
            }
        }
    }
}

impl std::fmt::Debug for DetectionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionAdapter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
