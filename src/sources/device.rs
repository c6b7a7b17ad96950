//! Video4Linux capture device source
//!
//! Built with the `device` feature on Linux. The device is asked for MJPG
//! and falls back to whatever it negotiates; MJPG and YUYV are decoded.

use crate::types::RawFrame;
use crate::{Result, StreamError};

#[cfg(all(feature = "device", target_os = "linux"))]
pub use v4l_source::DeviceSource;

/// Pixel formats the device source can turn into RGB8
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mjpg,
    Yuyv,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: [u8; 4]) -> Option<Self> {
        match &fourcc {
            b"MJPG" => Some(PixelFormat::Mjpg),
            b"YUYV" => Some(PixelFormat::Yuyv),
            _ => None,
        }
    }
}

/// Convert one captured buffer into a raw frame
pub fn decode(format: PixelFormat, width: u32, height: u32, data: &[u8]) -> Result<RawFrame> {
    match format {
        PixelFormat::Mjpg => {
            let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
                .map_err(|e| {
                    StreamError::source_unavailable_with_source("corrupt MJPG buffer", Box::new(e))
                })?
                .to_rgb8();
            Ok(RawFrame::new(image.width(), image.height(), image.into_raw()))
        }
        PixelFormat::Yuyv => {
            let expected = width as usize * height as usize * 2;
            if data.len() < expected {
                return Err(StreamError::source_unavailable(format!(
                    "short YUYV buffer: {} of {} bytes",
                    data.len(),
                    expected
                )));
            }
            Ok(RawFrame::new(width, height, yuyv_to_rgb(&data[..expected])))
        }
    }
}

/// BT.601 YUYV 4:2:2 to packed RGB8
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * RawFrame::CHANNELS);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        for y in [y0, y1] {
            rgb.extend_from_slice(&yuv_to_rgb(y, u, v));
        }
    }
    rgb
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clip = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [clip(298 * c + 409 * e), clip(298 * c - 100 * d - 208 * e), clip(298 * c + 516 * d)]
}

#[cfg(all(feature = "device", target_os = "linux"))]
mod v4l_source {
    use tracing::{debug, info};
    use v4l::buffer::Type;
    use v4l::io::mmap::Stream;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;
    use v4l::{Device, FourCC};

    use super::{PixelFormat, decode};
    use crate::source::FrameSource;
    use crate::types::RawFrame;
    use crate::{Result, StreamError};

    const BUFFER_COUNT: u32 = 4;

    /// Live capture from `/dev/video<index>`
    pub struct DeviceSource {
        // Declared first so the mapped buffers are released before the device.
        stream: Stream<'static>,
        _device: Device,
        index: u32,
        format: PixelFormat,
        width: u32,
        height: u32,
    }

    impl DeviceSource {
        pub fn open(index: u32) -> Result<Self> {
            let unavailable = |what: &str, e: std::io::Error| {
                StreamError::source_unavailable_with_source(
                    format!("video device {index}: {what}"),
                    Box::new(e),
                )
            };

            let device = Device::new(index as usize).map_err(|e| unavailable("cannot open", e))?;

            let mut format = device.format().map_err(|e| unavailable("cannot read format", e))?;
            format.fourcc = FourCC::new(b"MJPG");
            let format =
                device.set_format(&format).map_err(|e| unavailable("cannot set format", e))?;

            let pixel_format = PixelFormat::from_fourcc(format.fourcc.repr).ok_or_else(|| {
                StreamError::source_unavailable(format!(
                    "video device {index}: unsupported pixel format {}",
                    format.fourcc
                ))
            })?;

            let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
                .map_err(|e| unavailable("cannot start capture stream", e))?;

            info!(
                "Opened video device {} ({}x{} {:?})",
                index, format.width, format.height, pixel_format
            );
            Ok(Self {
                stream,
                _device: device,
                index,
                format: pixel_format,
                width: format.width,
                height: format.height,
            })
        }
    }

    impl FrameSource for DeviceSource {
        fn next_frame(&mut self) -> Result<Option<RawFrame>> {
            let (data, meta) = self.stream.next().map_err(|e| {
                StreamError::source_unavailable_with_source(
                    format!("video device {}: capture failed", self.index),
                    Box::new(e),
                )
            })?;

            let used = (meta.bytesused as usize).min(data.len());
            debug!("Captured {} bytes from video device {}", used, self.index);
            decode(self.format, self.width, self.height, &data[..used]).map(Some)
        }

        fn describe(&self) -> String {
            format!("video device {}", self.index)
        }
    }
}
