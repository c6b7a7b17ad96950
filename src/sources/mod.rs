//! Concrete capture sources and the identifier that selects one.

pub mod device;
pub mod images;
pub mod pattern;

pub use images::ImageSequenceSource;
pub use pattern::TestPatternSource;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::source::FrameSource;
use crate::{Result, StreamError};

/// Capture source identifier
///
/// Parsed from configuration and the command line:
///
/// - `test-pattern` or `test-pattern:WxH` selects the synthetic pattern
/// - a bare integer selects a capture device by index (`0` is `/dev/video0`)
/// - anything else is a path to an image file or a directory of images;
///   write `./0` for a file literally named `0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceSpec {
    TestPattern { width: u32, height: u32 },
    Device(u32),
    Images(PathBuf),
}

impl SourceSpec {
    const PATTERN: &'static str = "test-pattern";

    /// Open a new, independently owned source instance
    pub fn open(&self) -> Result<Box<dyn FrameSource>> {
        match self {
            SourceSpec::TestPattern { width, height } => {
                Ok(Box::new(TestPatternSource::new(*width, *height)))
            }
            SourceSpec::Device(index) => open_device(*index),
            SourceSpec::Images(path) => Ok(Box::new(ImageSequenceSource::open(path)?)),
        }
    }

    /// A factory closure suitable for the producer
    pub fn factory(&self) -> impl FnMut() -> Result<Box<dyn FrameSource>> + Send + 'static {
        let spec = self.clone();
        move || spec.open()
    }
}

#[cfg(all(feature = "device", target_os = "linux"))]
fn open_device(index: u32) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(device::DeviceSource::open(index)?))
}

#[cfg(not(all(feature = "device", target_os = "linux")))]
fn open_device(index: u32) -> Result<Box<dyn FrameSource>> {
    Err(StreamError::source_unavailable(format!(
        "video device {index} requested, but this build has no device support \
         (rebuild on Linux with --features device)"
    )))
}

impl Default for SourceSpec {
    fn default() -> Self {
        SourceSpec::TestPattern { width: pattern::DEFAULT_WIDTH, height: pattern::DEFAULT_HEIGHT }
    }
}

impl FromStr for SourceSpec {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(StreamError::config("source must not be empty"));
        }

        if s == Self::PATTERN {
            return Ok(SourceSpec::default());
        }

        if let Some(size) = s.strip_prefix("test-pattern:") {
            let (w, h) = size
                .split_once(['x', 'X'])
                .ok_or_else(|| StreamError::config(format!("expected WxH after test-pattern:, got '{size}'")))?;
            let width: u32 =
                w.parse().map_err(|_| StreamError::config(format!("invalid pattern width '{w}'")))?;
            let height: u32 =
                h.parse().map_err(|_| StreamError::config(format!("invalid pattern height '{h}'")))?;
            if width == 0 || height == 0 {
                return Err(StreamError::config("pattern dimensions must be non-zero"));
            }
            return Ok(SourceSpec::TestPattern { width, height });
        }

        if let Ok(index) = s.parse::<u32>() {
            return Ok(SourceSpec::Device(index));
        }

        Ok(SourceSpec::Images(PathBuf::from(s)))
    }
}

impl TryFrom<String> for SourceSpec {
    type Error = StreamError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SourceSpec> for String {
    fn from(spec: SourceSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::TestPattern { width, height } => {
                write!(f, "{}:{}x{}", Self::PATTERN, width, height)
            }
            SourceSpec::Device(index) => write!(f, "{index}"),
            SourceSpec::Images(path) => write!(f, "{}", path.display()),
        }
    }
}
