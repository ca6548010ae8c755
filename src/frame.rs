//! Raw camera frames
//!
//! A [`RawFrame`] is lent to the pipeline by the frame source and must go
//! back exactly once. The release hook runs when the frame is dropped, so
//! ownership alone guarantees single release on every exit path.

use std::fmt;
use std::time::Duration;

use crate::{Error, Result};

/// Callback returning a frame buffer to its source
type ReleaseHook = Box<dyn FnOnce() + Send + Sync>;

/// One image plane: bytes plus layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    /// Plane bytes, starting at the first sample
    pub data: Vec<u8>,
    /// Bytes between the starts of consecutive rows
    pub row_stride: usize,
    /// Bytes between consecutive samples within a row
    pub pixel_stride: usize,
}

impl Plane {
    /// Create a plane
    #[must_use]
    pub const fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Create a tightly packed plane (no row padding, one byte per sample)
    #[must_use]
    pub const fn packed(data: Vec<u8>, width: usize) -> Self {
        Self::new(data, width, 1)
    }
}

/// Planar YUV 4:2:0 image with independently strided planes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvImage {
    /// Luma, full resolution
    pub y: Plane,
    /// Blue-difference chroma, half resolution in both axes
    pub u: Plane,
    /// Red-difference chroma, half resolution in both axes
    pub v: Plane,
}

impl YuvImage {
    /// Split a tightly packed I420 buffer (Y, then U, then V) into planes
    ///
    /// # Errors
    ///
    /// Returns `ConversionFailed` if the buffer length does not match the size
    pub fn from_i420(data: &[u8], width: usize, height: usize) -> Result<Self> {
        let (chroma_width, chroma_height) = (width.div_ceil(2), height.div_ceil(2));
        let y_size = width * height;
        let chroma_size = chroma_width * chroma_height;
        let expected = y_size + 2 * chroma_size;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(Error::ConversionFailed(format!(
                "I420 buffer of {} bytes does not match {width}x{height} (expected {expected})",
                data.len()
            )));
        }

        let (y, chroma) = data.split_at(y_size);
        let (u, v) = chroma.split_at(chroma_size);
        Ok(Self {
            y: Plane::packed(y.to_vec(), width),
            u: Plane::packed(u.to_vec(), chroma_width),
            v: Plane::packed(v.to_vec(), chroma_width),
        })
    }
}

/// A camera frame on loan from the frame source
pub struct RawFrame {
    width: u32,
    height: u32,
    rotation_degrees: u32,
    timestamp: Duration,
    image: Option<YuvImage>,
    release: Option<ReleaseHook>,
}

impl RawFrame {
    /// Create a frame carrying a YUV payload
    #[must_use]
    pub fn new(width: u32, height: u32, image: YuvImage) -> Self {
        Self {
            width,
            height,
            rotation_degrees: 0,
            timestamp: Duration::ZERO,
            image: Some(image),
            release: None,
        }
    }

    /// Create a frame whose payload could not be acquired
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rotation_degrees: 0,
            timestamp: Duration::ZERO,
            image: None,
            release: None,
        }
    }

    /// Set the sensor rotation reported with this frame
    #[must_use]
    pub fn with_rotation(mut self, degrees: u32) -> Self {
        self.rotation_degrees = degrees;
        self
    }

    /// Set the source timestamp (monotonic, since stream start)
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Register the hook that hands the buffer back to the frame source
    #[must_use]
    pub fn on_release(mut self, hook: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(hook));
        self
    }

    /// Frame width in pixels
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Rotation in degrees the frame must be turned to be upright
    #[must_use]
    pub const fn rotation_degrees(&self) -> u32 {
        self.rotation_degrees
    }

    /// Source timestamp
    #[must_use]
    pub const fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// YUV payload, if the source delivered one
    #[must_use]
    pub const fn image(&self) -> Option<&YuvImage> {
        self.image.as_ref()
    }

    /// Whether the frame carries a decodable payload
    #[must_use]
    pub const fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Return the buffer to the frame source now
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("timestamp", &self.timestamp)
            .field("has_image", &self.image.is_some())
            .finish_non_exhaustive()
    }
}
