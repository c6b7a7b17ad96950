//! HTTP surface
//!
//! A thin axum layer: every streaming request gets a bounded channel whose
//! receiver becomes the response body, and a spawned session task that
//! writes into the sending half. When the client hangs up, hyper drops the
//! body, the channel closes and the session notices on its next wait.

use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::buffer::FrameBuffer;
use crate::diagnostic::{self, DiagnosticProbe, UptimeSession};
use crate::producer::{ProducerSnapshot, ProducerStats};
use crate::session::{ChannelSink, StreamSession};
use crate::types::UpdateRate;
use crate::{Result, StreamError, wire};

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head><title>framecast</title></head>
  <body>
    <h1>Live stream</h1>
    <img src="/mjpg-stream" alt="live stream">
    <p><a href="/uptime">uptime</a> | <a href="/stats">stats</a></p>
  </body>
</html>
"#;

/// Everything a request handler needs
#[derive(Clone)]
pub struct AppState {
    buffer: Arc<FrameBuffer>,
    producer: Arc<ProducerStats>,
    probe: Arc<dyn DiagnosticProbe>,
    source_hz: f64,
    uptime_interval: Duration,
    sessions: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        buffer: Arc<FrameBuffer>,
        producer: Arc<ProducerStats>,
        probe: Arc<dyn DiagnosticProbe>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            producer,
            probe,
            source_hz: 60.0,
            uptime_interval: diagnostic::DEFAULT_INTERVAL,
            sessions: Arc::new(AtomicUsize::new(0)),
            shutdown,
        }
    }

    /// Producer rate that `?fps` requests are normalized against
    pub fn with_source_rate(mut self, source_hz: f64) -> Self {
        self.source_hz = source_hz;
        self
    }

    /// Interval used when `/uptime` is requested without `?interval`
    pub fn with_uptime_interval(mut self, interval: Duration) -> Self {
        self.uptime_interval = interval;
        self
    }

    /// Streaming responses currently being served
    pub fn active_sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Collect the `/stats` document
    pub fn stats(&self) -> StatsReport {
        StatsReport {
            producer: self.producer.snapshot(),
            buffer: BufferReport {
                capacity: self.buffer.capacity(),
                history_len: self.buffer.recent().len(),
                latest_sequence_id: self.buffer.latest_sequence_id(),
                readers: self.buffer.reader_count(),
            },
            active_sessions: self.active_sessions(),
        }
    }
}

/// Body of `GET /stats`
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub producer: ProducerSnapshot,
    pub buffer: BufferReport,
    pub active_sessions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BufferReport {
    pub capacity: usize,
    pub history_len: usize,
    pub latest_sequence_id: Option<u64>,
    pub readers: usize,
}

#[derive(Debug, Default, Deserialize)]
struct StreamQuery {
    fps: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct UptimeQuery {
    interval: Option<f64>,
}

/// Build the router with all routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/mjpg-stream", get(mjpg_stream))
        .route("/uptime", get(uptime))
        .route("/stats", get(stats))
        .with_state(state)
}

/// Serve until the state's shutdown token is cancelled
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr().map_err(|e| StreamError::io("reading listen address", e))?;
    let shutdown = state.shutdown.clone();
    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| StreamError::io("serving HTTP", e))?;

    info!("HTTP server stopped");
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn mjpg_stream(State(state): State<AppState>, Query(query): Query<StreamQuery>) -> Response {
    let rate = UpdateRate::from_fps(query.fps);
    let (sink, rx) = ChannelSink::channel(1);
    let session = StreamSession::with_rate(&state.buffer, sink, rate, state.source_hz);
    debug!(?rate, "Opening video stream");

    spawn_session(&state, "video", session.run());
    streaming_response(wire::MULTIPART_CONTENT_TYPE, rx)
}

async fn uptime(State(state): State<AppState>, Query(query): Query<UptimeQuery>) -> Response {
    let interval = diagnostic::clamp_interval(query.interval, state.uptime_interval);
    let (sink, rx) = ChannelSink::channel(1);
    let session = UptimeSession::new(sink, Arc::clone(&state.probe), interval);

    spawn_session(&state, "uptime", session.run());
    streaming_response(wire::HTML_CONTENT_TYPE, rx)
}

async fn stats(State(state): State<AppState>) -> Json<StatsReport> {
    Json(state.stats())
}

fn streaming_response(content_type: &'static str, rx: mpsc::Receiver<Bytes>) -> Response {
    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, content_type), (header::CACHE_CONTROL, "no-cache")], body)
        .into_response()
}

/// Run a session task that also ends when the server shuts down
fn spawn_session<F>(state: &AppState, kind: &'static str, session: F)
where
    F: Future + Send + 'static,
    F::Output: std::fmt::Debug + Send,
{
    let guard = SessionGuard::enter(&state.sessions);
    let shutdown = state.shutdown.clone();

    tokio::spawn(async move {
        let _guard = guard;
        tokio::select! {
            summary = session => debug!(kind, ?summary, "Session finished"),
            _ = shutdown.cancelled() => debug!(kind, "Session ended by shutdown"),
        }
    });
}

/// Keeps the active-session counter in step with running tasks
struct SessionGuard {
    counter: Arc<AtomicUsize>,
}

impl SessionGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter: Arc::clone(counter) }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}
