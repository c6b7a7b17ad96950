//! Frame types for the capture → encode → publish pipeline

use bytes::Bytes;
use std::time::SystemTime;

/// A published, encoded video frame
///
/// This is the fundamental data unit that flows from the producer to every
/// session. It is immutable once published and shared as `Arc<Frame>`, so
/// fan-out never copies the payload.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Strictly increasing id assigned by the producer (first frame is 1)
    pub sequence_id: u64,

    /// Encoded image bytes (JPEG)
    pub payload: Bytes,

    /// Wall-clock time the frame was published
    pub produced_at: SystemTime,
}

impl Frame {
    /// Create a new frame stamped with the current time
    pub fn new(sequence_id: u64, payload: impl Into<Bytes>) -> Self {
        Self { sequence_id, payload: payload.into(), produced_at: SystemTime::now() }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True when the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A captured, not yet encoded image
///
/// Pixels are packed RGB8, row-major, `width * height * 3` bytes. Sources are
/// expected to produce well-formed buffers; the encoder rejects the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RawFrame {
    /// Bytes per pixel for packed RGB8
    pub const CHANNELS: usize = 3;

    /// Create a raw frame from packed RGB8 pixels
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self { width, height, pixels }
    }

    /// Number of bytes a well-formed pixel buffer of these dimensions holds
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::CHANNELS
    }

    /// True if the dimensions are non-zero and match the pixel buffer
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.pixels.len() == self.expected_len()
    }
}
