//! Thread-per-connection delivery loop

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::{SessionEnd, SessionState, SessionSummary};
use crate::StreamError;
use crate::buffer::FrameBuffer;
use crate::types::Frame;
use crate::wire;

/// Default sleep between buffer polls when nothing new is available
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Blocking counterpart of [`StreamSession`](super::StreamSession)
///
/// Meant for servers that dedicate a thread to each connection. The loop
/// sleeps between polls, so an idle session costs a wake-up every poll
/// interval and nothing more.
pub struct BlockingStreamSession<W: Write> {
    buffer: Arc<FrameBuffer>,
    writer: W,
    poll_interval: Duration,
    state: SessionState,
    last_delivered: Option<u64>,
    frames_sent: u64,
    bytes_sent: u64,
}

impl<W: Write> BlockingStreamSession<W> {
    pub fn new(buffer: Arc<FrameBuffer>, writer: W) -> Self {
        Self {
            buffer,
            writer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: SessionState::Active,
            last_delivered: None,
            frames_sent: 0,
            bytes_sent: 0,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Run until a write fails
    pub fn run(mut self) -> SessionSummary {
        debug!("Blocking stream session started");

        loop {
            if !self.buffer.has_newer_than(self.last_delivered) {
                std::thread::sleep(self.poll_interval);
                continue;
            }

            let Some(frame) = self.buffer.peek() else {
                continue;
            };

            if let Err(e) = self.deliver(&frame) {
                debug!("Blocking stream session ending: {}", StreamError::client_disconnected(e));
                break;
            }
        }

        let ended_in = self.state;
        self.state = SessionState::Closed;
        SessionSummary {
            frames_sent: self.frames_sent,
            bytes_sent: self.bytes_sent,
            last_delivered: self.last_delivered,
            end: SessionEnd::ClientDisconnected,
            ended_in,
        }
    }

    fn deliver(&mut self, frame: &Frame) -> io::Result<()> {
        let part = wire::jpeg_part(&frame.payload);

        self.writer.write_all(&part)?;
        self.last_delivered = Some(frame.sequence_id);
        self.frames_sent += 1;
        self.bytes_sent += part.len() as u64;

        self.state = SessionState::Draining;
        self.writer.flush()?;
        self.state = SessionState::Active;

        trace!("Delivered frame {} (blocking)", frame.sequence_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{SharedWriter, delivered_ids, frame};

    #[test]
    fn polls_without_duplicates_and_stops_on_write_failure() {
        let buffer = Arc::new(FrameBuffer::default());
        let writer = SharedWriter::default();
        let handle = writer.clone();

        buffer.publish(frame(1));
        let session_buffer = Arc::clone(&buffer);
        let thread = std::thread::spawn(move || {
            BlockingStreamSession::new(session_buffer, writer)
                .with_poll_interval(Duration::from_millis(2))
                .run()
        });

        // Many polls happen while frame 1 stays current.
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(delivered_ids(&handle.chunks()), vec![1]);

        buffer.publish(frame(2));
        handle.wait_for_chunks(2, Duration::from_secs(5));

        handle.fail_writes();
        buffer.publish(frame(3));

        let summary = thread.join().unwrap();
        assert_eq!(summary.end, SessionEnd::ClientDisconnected);
        assert_eq!(summary.ended_in, SessionState::Active);
        assert_eq!(summary.frames_sent, 2);
        assert_eq!(summary.last_delivered, Some(2));
        assert_eq!(delivered_ids(&handle.chunks()), vec![1, 2]);
    }

    #[test]
    fn waits_for_the_first_frame() {
        let buffer = Arc::new(FrameBuffer::default());
        let writer = SharedWriter::default();
        let handle = writer.clone();

        let session_buffer = Arc::clone(&buffer);
        let thread = std::thread::spawn(move || {
            BlockingStreamSession::new(session_buffer, writer)
                .with_poll_interval(Duration::from_millis(2))
                .run()
        });

        std::thread::sleep(Duration::from_millis(30));
        assert!(handle.chunks().is_empty());

        for id in 1..=5 {
            buffer.publish(frame(id));
        }
        handle.wait_for_id(5, Duration::from_secs(5));
        let ids = delivered_ids(&handle.chunks());
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

        handle.fail_writes();
        buffer.publish(frame(6));
        thread.join().unwrap();
    }
}
