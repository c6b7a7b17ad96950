//! Live Motion-JPEG fan-out streaming.
//!
//! Framecast captures frames from a source at a fixed cadence, encodes them
//! as JPEG, and serves them to any number of HTTP clients as a
//! `multipart/x-mixed-replace` stream that browsers render natively.
//!
//! # Architecture
//!
//! - A single [`FrameProducer`] runs on its own thread and publishes into a
//!   [`FrameBuffer`]; it never waits on clients
//! - The buffer keeps only the newest frame current (latest-wins) plus a
//!   short diagnostic history
//! - Every client gets its own [`StreamSession`] that delivers the newest
//!   frame whenever it changes, skipping anything it was too slow to see
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use framecast::{Framecast, StreamConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> framecast::Result<()> {
//!     let config = StreamConfig::default();
//!     let shutdown = CancellationToken::new();
//!     let listener = tokio::net::TcpListener::bind(config.listen_addr()?).await?;
//!
//!     Framecast::start(&config, shutdown)?.serve(listener).await
//! }
//! ```

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

// Core types and error handling
pub mod config;
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;
pub mod wire;

// Capture and encoding
pub mod encoder;
pub mod source;
pub mod sources;

// Fan-out
pub mod buffer;
pub mod diagnostic;
pub mod producer;
pub mod server;
pub mod session;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use buffer::FrameBuffer;
pub use config::StreamConfig;
pub use diagnostic::{CommandProbe, DiagnosticProbe, UptimeSession};
pub use encoder::{FrameEncoder, JpegFrameEncoder};
pub use producer::{FrameProducer, ProducerConfig, ProducerHandle};
pub use server::AppState;
pub use session::{BlockingStreamSession, ChunkSink, StreamSession};
pub use source::{FrameSource, SourceFactory};
pub use sources::SourceSpec;

/// A running producer plus the HTTP state wired to it
///
/// Dropping it stops the producer thread.
pub struct Framecast {
    buffer: Arc<FrameBuffer>,
    producer: ProducerHandle,
    state: AppState,
}

impl Framecast {
    /// Start producing frames as described by `config`
    ///
    /// The source is opened on the producer thread, so a missing or broken
    /// source shows up as recovery attempts in the log rather than an error
    /// here.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the producer
    /// thread cannot be spawned.
    pub fn start(config: &StreamConfig, shutdown: CancellationToken) -> Result<Self> {
        config.validate()?;

        let buffer = Arc::new(FrameBuffer::new(config.buffer_capacity));
        let producer = FrameProducer::new(
            config.source.factory(),
            JpegFrameEncoder::new(config.jpeg_quality),
            Arc::clone(&buffer),
            config.producer_config(),
        )
        .spawn(shutdown.child_token())
        .map_err(|e| StreamError::io("spawning the frame producer", e))?;

        let probe = Arc::new(CommandProbe::new(&config.uptime_command)?);
        let state = AppState::new(Arc::clone(&buffer), producer.stats(), probe, shutdown)
            .with_source_rate(config.frame_rate)
            .with_uptime_interval(config.uptime_interval());

        info!("Streaming from {} at {} fps", config.source, config.frame_rate);
        Ok(Self { buffer, producer, state })
    }

    pub fn buffer(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve HTTP until shutdown, then stop the producer
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let Self { producer, state, .. } = self;
        let served = server::serve(listener, state).await;

        // Joining blocks on the producer thread.
        tokio::task::spawn_blocking(move || producer.shutdown())
            .await
            .map_err(|e| StreamError::io("joining the frame producer", std::io::Error::other(e)))?;

        served
    }
}
