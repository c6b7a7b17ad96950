//! Raw frame to JPEG conversion

use bytes::Bytes;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::types::RawFrame;
use crate::{Result, StreamError};

/// Default JPEG quality (1-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Converts a raw frame into wire-ready image bytes
///
/// Implementations are stateless per call. A returned payload is never empty;
/// malformed input is an [`StreamError::Encode`].
pub trait FrameEncoder: Send {
    fn encode(&self, frame: &RawFrame) -> Result<Bytes>;
}

/// Baseline JPEG encoder backed by the `image` crate
#[derive(Debug, Clone, Copy)]
pub struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    /// Create an encoder; quality is clamped to 1..=100
    pub fn new(quality: u8) -> Self {
        Self { quality: quality.clamp(1, 100) }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegFrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &RawFrame) -> Result<Bytes> {
        if !frame.is_well_formed() {
            return Err(StreamError::encode_failed(format!(
                "{}x{} frame with {} bytes of pixels (expected {})",
                frame.width,
                frame.height,
                frame.pixels.len(),
                frame.expected_len()
            )));
        }

        // Copy so the source keeps ownership of its buffer.
        let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone())
            .ok_or_else(|| StreamError::encode_failed("pixel buffer does not fit dimensions"))?;

        let mut jpeg = Vec::with_capacity(frame.pixels.len() / 8);
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&image)
            .map_err(|e| StreamError::encode_failed_with_source("jpeg encoding failed", Box::new(e)))?;

        if jpeg.is_empty() {
            return Err(StreamError::encode_failed("encoder produced no output"));
        }

        Ok(Bytes::from(jpeg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_valid_jpeg() {
        let frame = RawFrame::new(16, 8, vec![128; 16 * 8 * 3]);
        let jpeg = JpegFrameEncoder::default().encode(&frame).unwrap();

        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn malformed_frames_are_rejected() {
        let encoder = JpegFrameEncoder::new(50);

        let short = RawFrame::new(4, 4, vec![0; 10]);
        assert!(matches!(encoder.encode(&short), Err(StreamError::Encode { .. })));

        let empty = RawFrame::new(0, 0, Vec::new());
        assert!(matches!(encoder.encode(&empty), Err(StreamError::Encode { .. })));
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(JpegFrameEncoder::new(0).quality(), 1);
        assert_eq!(JpegFrameEncoder::new(200).quality(), 100);
    }
}
