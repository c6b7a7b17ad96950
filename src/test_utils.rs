//! Test doubles shared by the unit tests and benchmarks
//!
//! Scripted sources let producer tests decide exactly which capture fails,
//! recording sinks and writers capture what a session put on the wire.

#![cfg(any(test, feature = "benchmark"))]

use bytes::Bytes;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::diagnostic::DiagnosticProbe;
use crate::encoder::FrameEncoder;
use crate::session::ChunkSink;
use crate::source::{FrameSource, SourceFactory};
use crate::types::{Frame, RawFrame};
use crate::{Result, StreamError};

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n\r\n";

/// A frame whose payload is `frame-<id>`
pub fn frame(sequence_id: u64) -> Frame {
    Frame::new(sequence_id, format!("frame-{sequence_id}"))
}

/// Sequence ids of multipart parts built from [`frame`] payloads
pub fn delivered_ids(chunks: &[Bytes]) -> Vec<u64> {
    chunks
        .iter()
        .map(|chunk| {
            let payload = chunk
                .strip_prefix(PART_HEADER)
                .and_then(|rest| rest.strip_suffix(PART_TRAILER))
                .expect("chunk is not a multipart part");
            let text = std::str::from_utf8(payload).expect("payload is not utf-8");
            text.strip_prefix("frame-")
                .and_then(|id| id.parse().ok())
                .expect("payload is not frame-<id>")
        })
        .collect()
}

/// One scripted capture outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A frame whose single pixel byte is the given marker
    Frame(u8),
    /// A frame with no pixels (fails to encode)
    Empty,
    /// A capture error
    Fail,
    /// End of stream
    End,
}

/// Source that replays a fixed list of outcomes
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    endless: bool,
    counter: u8,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps: steps.into(), endless: false, counter: 0 }
    }

    /// A source that never fails or runs dry
    pub fn endless() -> Self {
        Self { steps: VecDeque::new(), endless: true, counter: 0 }
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let step = match self.steps.pop_front() {
            Some(step) => step,
            None if self.endless => {
                self.counter = self.counter.wrapping_add(1);
                Step::Frame(self.counter)
            }
            None => Step::End,
        };

        match step {
            Step::Frame(marker) => Ok(Some(RawFrame::new(1, 1, vec![marker]))),
            Step::Empty => Ok(Some(RawFrame::new(0, 0, Vec::new()))),
            Step::Fail => Err(StreamError::source_unavailable("scripted capture failure")),
            Step::End => Ok(None),
        }
    }
}

/// Factory handing out scripted sources in order, then endless ones
pub struct ScriptedFactory {
    scripts: VecDeque<Vec<Step>>,
    open_failures: u32,
}

impl ScriptedFactory {
    pub fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self { scripts: scripts.into(), open_failures: 0 }
    }

    /// Every opened source is endless
    pub fn healthy() -> Self {
        Self::new(Vec::new())
    }

    /// Fail the next `count` opens before following the script
    pub fn with_open_failures(mut self, count: u32) -> Self {
        self.open_failures = count;
        self
    }
}

impl SourceFactory for ScriptedFactory {
    type Source = ScriptedSource;

    fn open(&mut self) -> Result<ScriptedSource> {
        if self.open_failures > 0 {
            self.open_failures -= 1;
            return Err(StreamError::source_unavailable("scripted open failure"));
        }

        Ok(match self.scripts.pop_front() {
            Some(steps) => ScriptedSource::new(steps),
            None => ScriptedSource::endless(),
        })
    }
}

/// Encoder that copies pixels straight into the payload
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughEncoder;

impl FrameEncoder for PassthroughEncoder {
    fn encode(&self, frame: &RawFrame) -> Result<Bytes> {
        if frame.pixels.is_empty() {
            return Err(StreamError::encode_failed("empty frame"));
        }
        Ok(Bytes::copy_from_slice(&frame.pixels))
    }
}

#[derive(Default)]
struct SinkShared {
    chunks: Mutex<Vec<Bytes>>,
    disconnected: CancellationToken,
    fail_after: Option<usize>,
    fail_drain: bool,
}

/// Async sink that records every chunk
pub struct RecordingSink {
    shared: Arc<SinkShared>,
}

/// Test-side handle to a [`RecordingSink`]
pub struct SinkProbe {
    shared: Arc<SinkShared>,
}

impl RecordingSink {
    pub fn new() -> (Self, SinkProbe) {
        Self::build(None, false)
    }

    /// Accept `writes` chunks, then fail every write
    pub fn failing_after(writes: usize) -> (Self, SinkProbe) {
        Self::build(Some(writes), false)
    }

    /// Accept writes but fail every drain
    pub fn failing_drain() -> (Self, SinkProbe) {
        Self::build(None, true)
    }

    fn build(fail_after: Option<usize>, fail_drain: bool) -> (Self, SinkProbe) {
        let shared = Arc::new(SinkShared { fail_after, fail_drain, ..Default::default() });
        (Self { shared: Arc::clone(&shared) }, SinkProbe { shared })
    }
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "test client disconnected")
}

#[async_trait::async_trait]
impl ChunkSink for RecordingSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        if self.shared.disconnected.is_cancelled() {
            return Err(broken_pipe());
        }

        let mut chunks = self.shared.chunks.lock().unwrap();
        if self.shared.fail_after.is_some_and(|limit| chunks.len() >= limit) {
            return Err(broken_pipe());
        }
        chunks.push(chunk);
        Ok(())
    }

    async fn drain(&mut self) -> io::Result<()> {
        if self.shared.fail_drain || self.shared.disconnected.is_cancelled() {
            Err(broken_pipe())
        } else {
            Ok(())
        }
    }

    async fn closed(&self) {
        self.shared.disconnected.cancelled().await
    }
}

impl SinkProbe {
    pub fn chunks(&self) -> Vec<Bytes> {
        self.shared.chunks.lock().unwrap().clone()
    }

    /// Simulate the client hanging up
    pub fn disconnect(&self) {
        self.shared.disconnected.cancel();
    }

    pub async fn wait_for_chunks(&self, count: usize, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            while self.chunks().len() < count {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("expected {count} chunks, got {}", self.chunks().len()));
    }

    /// Wait until the newest delivered part carries `sequence_id`
    pub async fn wait_for_id(&self, sequence_id: u64, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            while delivered_ids(&self.chunks()).last() != Some(&sequence_id) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("frame {sequence_id} was never delivered"));
    }
}

/// Sink whose writes never complete, like a client that stopped reading
pub struct StalledSink;

#[async_trait::async_trait]
impl ChunkSink for StalledSink {
    async fn write_chunk(&mut self, _chunk: Bytes) -> io::Result<()> {
        futures::future::pending().await
    }

    async fn drain(&mut self) -> io::Result<()> {
        futures::future::pending().await
    }
}

/// Blocking writer recording one chunk per `write` call
#[derive(Clone, Default)]
pub struct SharedWriter {
    chunks: Arc<Mutex<Vec<Bytes>>>,
    failing: Arc<AtomicBool>,
}

impl SharedWriter {
    pub fn chunks(&self) -> Vec<Bytes> {
        self.chunks.lock().unwrap().clone()
    }

    /// Make every later write fail with a broken pipe
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn wait_for_chunks(&self, count: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.chunks().len() < count {
            assert!(Instant::now() < deadline, "expected {count} chunks");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn wait_for_id(&self, sequence_id: u64, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while delivered_ids(&self.chunks()).last() != Some(&sequence_id) {
            assert!(Instant::now() < deadline, "frame {sequence_id} was never delivered");
            std::thread::sleep(Duration::from_millis(2));
        }
    }
}

impl io::Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(broken_pipe());
        }
        self.chunks.lock().unwrap().push(Bytes::copy_from_slice(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Probe returning `sample <n>` with an increasing counter
#[derive(Default)]
pub struct CountingProbe {
    count: AtomicU64,
}

impl DiagnosticProbe for CountingProbe {
    fn sample(&self) -> Result<Vec<u8>> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("sample {n}").into_bytes())
    }
}

/// Probe that always fails
pub struct FailingProbe;

impl DiagnosticProbe for FailingProbe {
    fn sample(&self) -> Result<Vec<u8>> {
        Err(StreamError::probe_failed("false", "exit status: 1"))
    }
}
