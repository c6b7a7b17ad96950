//! Producer drives capture and encoding at a fixed cadence
//!
//! The producer owns the frame source and runs on its own OS thread, since
//! capture and decoding block. It talks to the rest of the system only by
//! publishing into the [`FrameBuffer`].

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::buffer::FrameBuffer;
use crate::encoder::FrameEncoder;
use crate::source::{FrameSource, SourceFactory};
use crate::types::{Frame, RawFrame};

/// Default producer cadence (60 frames per second)
pub const DEFAULT_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// Longest sleep slice while waiting for the next tick, bounds shutdown latency
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(50);

/// Producer timing and failure policy
#[derive(Debug, Clone, Copy)]
pub struct ProducerConfig {
    /// Nominal time between cycles
    pub period: Duration,

    /// Consecutive failed cycles before escalating to backoff
    pub escalate_after: u32,

    /// Upper bound on the backoff delay
    pub max_backoff: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self { period: DEFAULT_PERIOD, escalate_after: 10, max_backoff: Duration::from_secs(2) }
    }
}

/// Producer lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerState {
    Running,
    Recovering,
}

/// What a single cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A frame with this sequence id was published
    Published(u64),
    /// No frame could be captured, even after reopening the source
    SourceFailed,
    /// A frame was captured but could not be encoded
    EncodeFailed,
}

/// Counters shared with the HTTP layer
#[derive(Debug, Default)]
pub struct ProducerStats {
    cycles: AtomicU64,
    frames_published: AtomicU64,
    source_failures: AtomicU64,
    source_restarts: AtomicU64,
    encode_failures: AtomicU64,
    skipped_cycles: AtomicU64,
    consecutive_failures: AtomicU64,
}

/// Point-in-time copy of [`ProducerStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProducerSnapshot {
    pub cycles: u64,
    pub frames_published: u64,
    pub source_failures: u64,
    pub source_restarts: u64,
    pub encode_failures: u64,
    pub skipped_cycles: u64,
    pub consecutive_failures: u64,
}

impl ProducerStats {
    pub fn snapshot(&self) -> ProducerSnapshot {
        ProducerSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            source_restarts: self.source_restarts.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            skipped_cycles: self.skipped_cycles.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
        }
    }
}

/// Fixed-rate capture → encode → publish loop
pub struct FrameProducer<F, E>
where
    F: SourceFactory,
    E: FrameEncoder,
{
    factory: F,
    source: Option<F::Source>,
    encoder: E,
    buffer: Arc<FrameBuffer>,
    config: ProducerConfig,
    stats: Arc<ProducerStats>,
    state: ProducerState,
    next_sequence_id: u64,
    consecutive_failures: u32,
}

impl<F, E> FrameProducer<F, E>
where
    F: SourceFactory + 'static,
    E: FrameEncoder + 'static,
{
    /// Create a producer; the source is opened lazily on the first cycle
    pub fn new(factory: F, encoder: E, buffer: Arc<FrameBuffer>, config: ProducerConfig) -> Self {
        Self {
            factory,
            source: None,
            encoder,
            buffer,
            config,
            stats: Arc::new(ProducerStats::default()),
            state: ProducerState::Running,
            next_sequence_id: 1,
            consecutive_failures: 0,
        }
    }

    /// Shared counters, readable while the producer runs
    pub fn stats(&self) -> Arc<ProducerStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> ProducerState {
        self.state
    }

    /// Run one capture → encode → publish cycle
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);

        let Some(raw) = self.capture() else {
            self.record_failure();
            return CycleOutcome::SourceFailed;
        };

        let payload = match self.encoder.encode(&raw) {
            Ok(payload) if !payload.is_empty() => payload,
            Ok(_) => {
                warn!("Encoder returned an empty payload, skipping cycle");
                self.stats.encode_failures.fetch_add(1, Ordering::Relaxed);
                self.record_failure();
                return CycleOutcome::EncodeFailed;
            }
            Err(e) => {
                warn!("Failed to encode frame, skipping cycle: {}", e);
                self.stats.encode_failures.fetch_add(1, Ordering::Relaxed);
                self.record_failure();
                return CycleOutcome::EncodeFailed;
            }
        };

        let sequence_id = self.next_sequence_id;
        self.next_sequence_id += 1;

        trace!("Publishing frame {} ({} bytes)", sequence_id, payload.len());
        self.buffer.publish(Frame::new(sequence_id, payload));
        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
        self.record_success();

        CycleOutcome::Published(sequence_id)
    }

    /// Capture a frame, reopening the source once if it fails or runs dry
    fn capture(&mut self) -> Option<RawFrame> {
        if let Some(source) = self.source.as_mut() {
            match source.next_frame() {
                Ok(Some(raw)) => return Some(raw),
                Ok(None) => debug!("Source {} exhausted, reopening", source.describe()),
                Err(e) => {
                    self.stats.source_failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Source {} failed, reopening: {}", source.describe(), e);
                }
            }
        }

        self.state = ProducerState::Recovering;
        // Release the old capture resource before opening a new one.
        self.source = None;

        let mut source = match self.factory.open() {
            Ok(source) => source,
            Err(e) => {
                self.stats.source_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Failed to open frame source: {}", e);
                return None;
            }
        };
        self.stats.source_restarts.fetch_add(1, Ordering::Relaxed);
        debug!("Opened frame source {}", source.describe());

        match source.next_frame() {
            Ok(Some(raw)) => {
                self.source = Some(source);
                Some(raw)
            }
            Ok(None) => {
                warn!("Freshly opened source {} has no frames", source.describe());
                None
            }
            Err(e) => {
                self.stats.source_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Freshly opened source {} failed: {}", source.describe(), e);
                None
            }
        }
    }

    fn record_success(&mut self) {
        if self.consecutive_failures >= self.config.escalate_after {
            info!("Frame production recovered after {} failed cycles", self.consecutive_failures);
        }
        self.state = ProducerState::Running;
        self.consecutive_failures = 0;
        self.stats.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.stats.skipped_cycles.fetch_add(1, Ordering::Relaxed);
        self.stats.consecutive_failures.store(self.consecutive_failures as u64, Ordering::Relaxed);

        if self.consecutive_failures == self.config.escalate_after {
            error!(
                "Frame production failing: {} consecutive cycles without a frame, backing off",
                self.consecutive_failures
            );
        }
    }

    /// Delay before the next cycle
    ///
    /// The fixed period while healthy; exponential backoff (capped) once
    /// failures have been escalated.
    pub fn next_delay(&self) -> Duration {
        let escalate_after = self.config.escalate_after;
        if self.consecutive_failures < escalate_after {
            return self.config.period;
        }

        let exponent = (self.consecutive_failures - escalate_after).min(16);
        self.config.period.saturating_mul(1 << exponent).min(self.config.max_backoff)
    }

    /// Run until cancelled
    pub fn run(mut self, cancel: CancellationToken) {
        info!("Frame producer started ({:?} period)", self.config.period);
        let mut next_tick = Instant::now();

        while !cancel.is_cancelled() {
            self.run_cycle();

            let delay = self.next_delay();
            next_tick += delay;

            let now = Instant::now();
            if now > next_tick + self.config.period {
                trace!("Producer fell behind by {:?}, re-anchoring", now - next_tick);
                next_tick = now;
            }

            sleep_until(next_tick, &cancel);
        }

        info!(
            "Frame producer stopped (published {} frames)",
            self.stats.frames_published.load(Ordering::Relaxed)
        );
    }

    /// Start the loop on a dedicated thread
    pub fn spawn(self, cancel: CancellationToken) -> std::io::Result<ProducerHandle> {
        let stats = self.stats();
        let thread_cancel = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("frame-producer".to_string())
            .spawn(move || self.run(thread_cancel))?;

        Ok(ProducerHandle { thread: Some(thread), cancel, stats })
    }
}

/// Sleep until `deadline`, waking early if cancelled
fn sleep_until(deadline: Instant, cancel: &CancellationToken) {
    loop {
        let now = Instant::now();
        if now >= deadline || cancel.is_cancelled() {
            return;
        }
        std::thread::sleep((deadline - now).min(CANCEL_CHECK_SLICE));
    }
}

/// Handle to a producer running on its own thread
pub struct ProducerHandle {
    thread: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    stats: Arc<ProducerStats>,
}

impl ProducerHandle {
    pub fn stats(&self) -> Arc<ProducerStats> {
        Arc::clone(&self.stats)
    }

    /// Stop the loop and wait for the thread to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Frame producer thread panicked");
            }
        }
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        debug!("Dropping producer handle");
        self.stop();
    }
}
