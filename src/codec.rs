//! Frame to JPEG conversion
//!
//! Camera frames arrive as planar YUV 4:2:0 with independent row and pixel
//! strides per plane. Conversion first packs them into NV21 (full luma plane
//! followed by interleaved V/U pairs), then hands the packed frame to the
//! JPEG encoder over the full frame rectangle.

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;

use crate::frame::{Plane, RawFrame, YuvImage};
use crate::{Error, Result};

/// JPEG quality used for captured frames
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Compressed still image produced from one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    rotation_degrees: u32,
}

impl EncodedImage {
    /// Wrap already-encoded JPEG bytes
    #[must_use]
    pub const fn from_jpeg(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            rotation_degrees: 0,
        }
    }

    /// Encoded bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the encoded bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Encoded length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the encoder produced nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Image width in pixels
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Rotation carried over from the source frame
    #[must_use]
    pub const fn rotation_degrees(&self) -> u32 {
        self.rotation_degrees
    }
}

/// Stateless YUV 4:2:0 to JPEG converter
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    quality: u8,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameCodec {
    /// Create a codec with the given JPEG quality (clamped to 1..=100)
    #[must_use]
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    /// JPEG quality factor
    #[must_use]
    pub const fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a frame as JPEG
    ///
    /// # Errors
    ///
    /// Returns `ConversionFailed` if the frame has no payload, the plane
    /// layout does not cover the frame, or the encoder rejects the image
    pub fn encode(&self, frame: &RawFrame) -> Result<EncodedImage> {
        let image = frame
            .image()
            .ok_or_else(|| Error::ConversionFailed("frame has no image payload".to_string()))?;

        let (width, height) = (frame.width(), frame.height());
        if width == 0 || height == 0 {
            return Err(Error::ConversionFailed(format!(
                "invalid frame size {width}x{height}"
            )));
        }

        let nv21 = to_nv21(image, width as usize, height as usize)?;
        let rgb = nv21_to_rgb(&nv21, width as usize, height as usize);

        let mut data = Vec::new();
        JpegEncoder::new_with_quality(&mut data, self.quality)
            .encode(&rgb, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| Error::ConversionFailed(format!("JPEG encoding failed: {e}")))?;

        tracing::debug!(
            width,
            height,
            quality = self.quality,
            bytes = data.len(),
            "frame encoded"
        );

        Ok(EncodedImage {
            data,
            width,
            height,
            rotation_degrees: frame.rotation_degrees(),
        })
    }
}

/// Pack a planar YUV 4:2:0 image into NV21
///
/// Output is `width * height` luma bytes followed by `ceil(width/2)` V/U
/// pairs per chroma row. Row padding is never copied.
///
/// # Errors
///
/// Returns `ConversionFailed` if a plane is too short for its declared layout
pub fn to_nv21(image: &YuvImage, width: usize, height: usize) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(Error::ConversionFailed(format!(
            "invalid frame size {width}x{height}"
        )));
    }

    let chroma_width = width.div_ceil(2);
    let chroma_height = height.div_ceil(2);

    // Planes must back the declared size before anything is reserved
    check_layout(&image.y, width, height, "Y")?;
    check_layout(&image.v, chroma_width, chroma_height, "V")?;
    check_layout(&image.u, chroma_width, chroma_height, "U")?;

    let total = width
        .checked_mul(height)
        .zip(chroma_width.checked_mul(chroma_height))
        .and_then(|(y_size, chroma_size)| y_size.checked_add(chroma_size.checked_mul(2)?))
        .ok_or_else(|| {
            Error::ConversionFailed(format!("frame size {width}x{height} overflows"))
        })?;

    let mut out = Vec::with_capacity(total);
    copy_luma(&image.y, width, height, &mut out);
    interleave_chroma(&image.v, &image.u, chroma_width, chroma_height, &mut out);

    debug_assert_eq!(out.len(), total);
    Ok(out)
}

fn copy_luma(plane: &Plane, width: usize, height: usize, out: &mut Vec<u8>) {
    if plane.pixel_stride == 1 && plane.row_stride == width {
        out.extend_from_slice(&plane.data[..width * height]);
        return;
    }

    for row in 0..height {
        let start = row * plane.row_stride;
        if plane.pixel_stride == 1 {
            out.extend_from_slice(&plane.data[start..start + width]);
        } else {
            out.extend((0..width).map(|col| plane.data[start + col * plane.pixel_stride]));
        }
    }
}

fn interleave_chroma(v: &Plane, u: &Plane, width: usize, height: usize, out: &mut Vec<u8>) {
    let packed = |p: &Plane| p.pixel_stride == 1 && p.row_stride == width;
    if packed(v) && packed(u) {
        let n = width * height;
        for (&vs, &us) in v.data[..n].iter().zip(&u.data[..n]) {
            out.push(vs);
            out.push(us);
        }
        return;
    }

    for row in 0..height {
        let v_row = row * v.row_stride;
        let u_row = row * u.row_stride;
        for col in 0..width {
            out.push(v.data[v_row + col * v.pixel_stride]);
            out.push(u.data[u_row + col * u.pixel_stride]);
        }
    }
}

/// Verify a plane holds `rows` rows of `cols` samples under its strides
///
/// The last row only needs to reach its final sample; trailing padding may
/// be absent. Checked arithmetic keeps bogus dimensions from wrapping.
fn check_layout(plane: &Plane, cols: usize, rows: usize, name: &str) -> Result<()> {
    if plane.pixel_stride == 0 {
        return Err(Error::ConversionFailed(format!(
            "{name} plane has zero pixel stride"
        )));
    }

    let overflow =
        || Error::ConversionFailed(format!("{name} plane layout {cols}x{rows} overflows"));

    let row_span = (cols - 1)
        .checked_mul(plane.pixel_stride)
        .and_then(|n| n.checked_add(1))
        .ok_or_else(overflow)?;
    if plane.row_stride < row_span && rows > 1 {
        return Err(Error::ConversionFailed(format!(
            "{name} plane row stride {} shorter than row span {row_span}",
            plane.row_stride
        )));
    }

    let required = (rows - 1)
        .checked_mul(plane.row_stride)
        .and_then(|n| n.checked_add(row_span))
        .ok_or_else(overflow)?;
    if plane.data.len() < required {
        return Err(Error::ConversionFailed(format!(
            "{name} plane holds {} bytes, layout needs {required}",
            plane.data.len()
        )));
    }

    Ok(())
}

/// Convert NV21 to packed RGB (BT.601)
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn nv21_to_rgb(nv21: &[u8], width: usize, height: usize) -> Vec<u8> {
    let chroma_stride = width.div_ceil(2) * 2;
    let (luma, chroma) = nv21.split_at(width * height);
    let mut rgb = Vec::with_capacity(width * height * 3);

    for row in 0..height {
        let chroma_row = &chroma[(row / 2) * chroma_stride..];
        for col in 0..width {
            let y = f32::from(luma[row * width + col]);
            let pair = (col / 2) * 2;
            let v = f32::from(chroma_row[pair]) - 128.0;
            let u = f32::from(chroma_row[pair + 1]) - 128.0;

            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    rgb
}
