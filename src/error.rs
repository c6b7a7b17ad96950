//! Error types for frame capture, encoding and delivery.
//!
//! Every failure in the streaming core is contained where it happens: the
//! producer swallows (and logs) source and encode failures, a session swallows
//! its own client disconnect. The variants here exist so those components can
//! describe *what* went wrong and whether trying again makes sense.
//!
//! ## Error Categories
//!
//! - **Source Errors**: the capture primitive is exhausted or cannot produce a frame
//! - **Encode Errors**: a raw frame could not be turned into JPEG bytes
//! - **Client Errors**: a session's connection went away
//! - **Config Errors**: invalid settings detected at startup
//! - **Probe Errors**: the diagnostic command could not be run
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use framecast::StreamError;
//!
//! let error = StreamError::source_unavailable("camera busy");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for streaming operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for the streaming core.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Frame source exhausted")]
    SourceExhausted,

    #[error("Frame source unavailable: {reason}")]
    SourceUnavailable {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to encode frame: {reason}")]
    Encode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Client disconnected")]
    ClientDisconnected {
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Diagnostic probe '{command}' failed: {reason}")]
    Probe { command: String, reason: String },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::SourceExhausted => true,
            StreamError::SourceUnavailable { .. } => true,
            StreamError::Probe { .. } => true,
            StreamError::Encode { .. } => false,
            StreamError::ClientDisconnected { .. } => false,
            StreamError::Config { .. } => false,
            StreamError::Io { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::SourceExhausted => vec![
                "The source is reopened automatically on the next cycle",
                "Use a directory of images or the test pattern for endless playback",
            ],
            StreamError::SourceUnavailable { .. } => vec![
                "Check the source path exists and is readable",
                "Verify the image files are valid JPEG or PNG",
                "For a device index, check /dev/videoN exists and the build has the device feature",
                "Try the built-in test-pattern source",
            ],
            StreamError::Encode { .. } => vec![
                "Check the raw frame dimensions match its pixel buffer",
                "Verify the source produces RGB8 frames",
            ],
            StreamError::ClientDisconnected { .. } => {
                vec!["Nothing to do; the client closed the connection"]
            }
            StreamError::Config { .. } => vec![
                "Check the configuration file against the documented options",
                "Run with --help to list command line overrides",
            ],
            StreamError::Io { .. } => vec![
                "Check file permissions",
                "Check the listen address is not already in use",
            ],
            StreamError::Probe { .. } => vec![
                "Check the diagnostic command is installed and on PATH",
                "Configure a different uptime_command",
            ],
        }
    }

    /// Helper constructor for source errors.
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        StreamError::SourceUnavailable { reason: reason.into(), source: None }
    }

    /// Helper constructor for source errors with source.
    pub fn source_unavailable_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::SourceUnavailable { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for encode errors.
    pub fn encode_failed(reason: impl Into<String>) -> Self {
        StreamError::Encode { reason: reason.into(), source: None }
    }

    /// Helper constructor for encode errors with source.
    pub fn encode_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Encode { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for client disconnects.
    pub fn client_disconnected(source: std::io::Error) -> Self {
        StreamError::ClientDisconnected { source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        StreamError::Config { reason: reason.into() }
    }

    /// Helper constructor for I/O errors with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Io { context: context.into(), source }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        StreamError::Io { context: path.display().to_string(), source }
    }

    /// Helper constructor for probe errors.
    pub fn probe_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        StreamError::Probe { command: command.into(), reason: reason.into() }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Io { context: "<unknown>".to_string(), source: err }
    }
}
