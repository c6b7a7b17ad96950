//! Synthetic test-pattern source

use tracing::debug;

use crate::Result;
use crate::source::FrameSource;
use crate::types::RawFrame;

/// Default pattern width in pixels
pub const DEFAULT_WIDTH: u32 = 640;

/// Default pattern height in pixels
pub const DEFAULT_HEIGHT: u32 = 480;

/// Generates a moving gradient with a sweeping bar
///
/// Needs no capture hardware or files, which makes it the default source and
/// a convenient stand-in when checking a deployment end to end. An optional
/// loop length makes the source report exhaustion periodically, the same way
/// a video file would.
pub struct TestPatternSource {
    width: u32,
    height: u32,

    /// Frames generated by this instance
    frame_index: u64,

    /// Report exhaustion after this many frames
    loop_length: Option<u64>,
}

impl TestPatternSource {
    /// Create a pattern of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1), frame_index: 0, loop_length: None }
    }

    /// Make the source run dry after `frames` frames
    pub fn with_loop_length(mut self, frames: u64) -> Self {
        self.loop_length = Some(frames.max(1));
        self
    }

    fn render(&self) -> RawFrame {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut pixels = Vec::with_capacity(w * h * RawFrame::CHANNELS);

        let shift = (self.frame_index % 256) as u8;
        let bar_x = (self.frame_index as usize * 4) % w;
        let bar_width = (w / 32).max(1);

        for y in 0..h {
            let g = ((y * 255) / h.max(1)) as u8;
            for x in 0..w {
                if x >= bar_x && x < bar_x + bar_width {
                    pixels.extend_from_slice(&[255, 255, 255]);
                } else {
                    let r = (((x * 255) / w.max(1)) as u8).wrapping_add(shift);
                    pixels.extend_from_slice(&[r, g, shift]);
                }
            }
        }

        RawFrame::new(self.width, self.height, pixels)
    }
}

impl Default for TestPatternSource {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl FrameSource for TestPatternSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.loop_length.is_some_and(|len| self.frame_index >= len) {
            debug!("Test pattern loop finished after {} frames", self.frame_index);
            return Ok(None);
        }

        let frame = self.render();
        self.frame_index += 1;
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("test-pattern {}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_well_formed_and_change() {
        let mut source = TestPatternSource::new(64, 48);

        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();

        assert!(first.is_well_formed());
        assert!(second.is_well_formed());
        assert_ne!(first.pixels, second.pixels);
    }

    #[test]
    fn loop_length_exhausts_the_source() {
        let mut source = TestPatternSource::new(8, 8).with_loop_length(2);

        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }
}
