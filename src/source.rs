//! Source trait for capture backends

use crate::Result;
use crate::types::RawFrame;

/// Trait for frame capture backends
///
/// A source owns its capture resource exclusively and is driven from the
/// producer thread only, so calls may block. The contract is deliberately
/// small:
///
/// - `Ok(Some(frame))` - a frame was captured
/// - `Ok(None)` - the source is exhausted (end of file, end of sequence)
/// - `Err(e)` - capture failed
///
/// Neither outcome is fatal. The producer drops the instance and opens a new
/// one through its [`SourceFactory`].
pub trait FrameSource: Send {
    /// Capture the next raw frame
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Short human readable description for logs
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

impl FrameSource for Box<dyn FrameSource> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Opens fresh source instances
///
/// Used at startup and every time a source fails or runs dry. Any
/// `FnMut() -> Result<S>` closure is a factory.
pub trait SourceFactory: Send {
    type Source: FrameSource;

    /// Construct a new source instance
    fn open(&mut self) -> Result<Self::Source>;
}

impl<S, F> SourceFactory for F
where
    S: FrameSource,
    F: FnMut() -> Result<S> + Send,
{
    type Source = S;

    fn open(&mut self) -> Result<S> {
        self()
    }
}
