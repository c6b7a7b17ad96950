//! Per-client Motion-JPEG delivery
//!
//! A session owns one prepared connection and pushes the newest frame to it
//! as a multipart part whenever the frame changes. It never sends the same
//! sequence id twice and never sends an older frame after a newer one.
//! Sessions know nothing about each other; the only thing they share is the
//! [`FrameBuffer`](crate::FrameBuffer) they read from.
//!
//! Two flavours cover the two scheduling models:
//!
//! - [`StreamSession`] runs as an async task. It suspends on buffer change
//!   notifications, on the sink's write/drain (backpressure), and yields
//!   after every frame.
//! - [`BlockingStreamSession`] runs on its own thread and polls the buffer,
//!   sleeping a short interval when nothing is new.

mod blocking;
mod sink;

pub use blocking::BlockingStreamSession;
pub use sink::{ChannelSink, ChunkSink, WriterSink};

use futures::StreamExt;
use serde::Serialize;
use std::io;
use tracing::{debug, trace};

use crate::StreamError;
use crate::buffer::{FrameBuffer, FrameStream};
use crate::stream::ThrottleExt;
use crate::types::{Frame, UpdateRate};
use crate::wire;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for or writing a frame
    Active,
    /// Waiting for the connection to take written data
    Draining,
    /// Finished; the connection is never touched again
    Closed,
}

/// Why a session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEnd {
    /// Write or drain failed, or the peer went away
    ClientDisconnected,
    /// The frame buffer was dropped (process shutting down)
    BufferClosed,
}

/// Final accounting of a finished session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub last_delivered: Option<u64>,
    pub end: SessionEnd,
    /// State the loop was in when it stopped (`Draining` if the client
    /// vanished mid-drain)
    pub ended_in: SessionState,
}

/// Async delivery loop for one client
pub struct StreamSession<S: ChunkSink> {
    frames: FrameStream,
    sink: S,
    state: SessionState,
    last_delivered: Option<u64>,
    frames_sent: u64,
    bytes_sent: u64,
}

impl<S: ChunkSink> StreamSession<S> {
    /// Session delivering every frame it observes
    pub fn new(buffer: &FrameBuffer, sink: S) -> Self {
        Self::from_stream(buffer.subscribe(), sink)
    }

    /// Session capped to `rate`, normalized against the producer rate
    pub fn with_rate(buffer: &FrameBuffer, sink: S, rate: UpdateRate, source_hz: f64) -> Self {
        let frames = match rate.throttle_interval(source_hz) {
            None => buffer.subscribe(),
            Some(interval) => buffer.subscribe().throttle(interval).boxed(),
        };
        Self::from_stream(frames, sink)
    }

    /// Session over an arbitrary frame stream
    pub fn from_stream(frames: FrameStream, sink: S) -> Self {
        Self {
            frames,
            sink,
            state: SessionState::Active,
            last_delivered: None,
            frames_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Run until the client goes away
    pub async fn run(mut self) -> SessionSummary {
        debug!("Stream session started");

        let end = loop {
            let frame = tokio::select! {
                biased;
                _ = self.sink.closed() => {
                    debug!("Client went away while waiting for a frame");
                    break SessionEnd::ClientDisconnected;
                }
                next = self.frames.next() => match next {
                    Some(frame) => frame,
                    None => {
                        debug!("Frame buffer closed");
                        break SessionEnd::BufferClosed;
                    }
                },
            };

            if self.last_delivered.is_some_and(|last| frame.sequence_id <= last) {
                continue;
            }

            if let Err(e) = self.deliver(&frame).await {
                debug!("Stream session ending: {}", StreamError::client_disconnected(e));
                break SessionEnd::ClientDisconnected;
            }

            tokio::task::yield_now().await;
        };

        let ended_in = self.state;
        self.state = SessionState::Closed;
        debug!(
            frames_sent = self.frames_sent,
            bytes_sent = self.bytes_sent,
            "Stream session closed"
        );

        SessionSummary {
            frames_sent: self.frames_sent,
            bytes_sent: self.bytes_sent,
            last_delivered: self.last_delivered,
            end,
            ended_in,
        }
    }

    async fn deliver(&mut self, frame: &Frame) -> io::Result<()> {
        let part = wire::jpeg_part(&frame.payload);
        let len = part.len() as u64;

        self.sink.write_chunk(part).await?;
        self.last_delivered = Some(frame.sequence_id);
        self.frames_sent += 1;
        self.bytes_sent += len;

        self.state = SessionState::Draining;
        self.sink.drain().await?;
        self.state = SessionState::Active;

        trace!("Delivered frame {}", frame.sequence_id);
        Ok(())
    }
}
