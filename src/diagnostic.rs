//! Periodic command-output stream (the `/uptime` page)
//!
//! Unlike the video path there is no shared state here: every connection runs
//! its own probe on its own schedule. The probe is a blocking call, so it is
//! pushed onto the blocking pool and never stalls the connection scheduler.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::session::ChunkSink;
use crate::{Result, StreamError, wire};

/// Default delay between samples
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest interval a client may request
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Longest interval a client may request
pub const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Clamp a client-requested interval in seconds
///
/// Non-finite or non-positive requests fall back to `default`.
pub fn clamp_interval(requested_secs: Option<f64>, default: Duration) -> Duration {
    match requested_secs {
        Some(secs) if secs.is_finite() && secs > 0.0 => Duration::from_secs_f64(
            secs.clamp(MIN_INTERVAL.as_secs_f64(), MAX_INTERVAL.as_secs_f64()),
        ),
        _ => default,
    }
}

/// A potentially slow, synchronous measurement
pub trait DiagnosticProbe: Send + Sync + 'static {
    fn sample(&self) -> Result<Vec<u8>>;
}

/// Runs an external command and returns its stdout
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    /// Parse a whitespace-separated command line, e.g. `uptime` or `uptime -p`
    pub fn new(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| StreamError::config("probe command is empty"))?;
        Ok(Self { program, args: parts.collect() })
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl DiagnosticProbe for CommandProbe {
    fn sample(&self) -> Result<Vec<u8>> {
        let output = std::process::Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| StreamError::probe_failed(self.command_line(), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StreamError::probe_failed(
                self.command_line(),
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(output.stdout)
    }
}

/// Final accounting of a finished uptime stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UptimeSummary {
    pub samples_sent: u64,
    pub bytes_sent: u64,
}

/// Per-connection sampling loop
pub struct UptimeSession<S: ChunkSink> {
    sink: S,
    probe: Arc<dyn DiagnosticProbe>,
    interval: Duration,
}

impl<S: ChunkSink> UptimeSession<S> {
    pub fn new(sink: S, probe: Arc<dyn DiagnosticProbe>, interval: Duration) -> Self {
        Self { sink, probe, interval }
    }

    /// Sample, write, drain, sleep; until a write fails
    pub async fn run(mut self) -> UptimeSummary {
        debug!("Uptime session started ({:?} interval)", self.interval);
        let mut samples_sent = 0;
        let mut bytes_sent = 0;

        loop {
            let probe = Arc::clone(&self.probe);
            let output = match tokio::task::spawn_blocking(move || probe.sample()).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    warn!("Diagnostic probe failed: {}", e);
                    format!("probe failed: {e}").into_bytes()
                }
                Err(e) => {
                    warn!("Diagnostic probe panicked: {}", e);
                    format!("probe failed: {e}").into_bytes()
                }
            };

            let chunk = wire::html_line(&output);
            let len = chunk.len() as u64;
            if let Err(e) = self.sink.write_chunk(chunk).await {
                debug!("Uptime session ending: {}", StreamError::client_disconnected(e));
                break;
            }
            samples_sent += 1;
            bytes_sent += len;

            if let Err(e) = self.sink.drain().await {
                debug!("Uptime session ending: {}", StreamError::client_disconnected(e));
                break;
            }

            tokio::select! {
                _ = self.sink.closed() => {
                    debug!("Client went away between samples");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        debug!(samples_sent, bytes_sent, "Uptime session closed");
        UptimeSummary { samples_sent, bytes_sent }
    }
}
