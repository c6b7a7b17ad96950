//! framecast binary entry point
//!
//! ```bash
//! # Synthetic pattern on the default address (127.0.0.1:5000)
//! framecast
//!
//! # Loop a directory of JPEGs at 30 fps, reachable from the network
//! framecast --source ./clip --fps 30 --host 0.0.0.0
//!
//! # Settings from a file, with one override
//! framecast --config framecast.yaml --port 8080
//! ```

use anyhow::Context;
use clap::Parser;
use framecast::{Framecast, SourceSpec, StreamConfig};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Live Motion-JPEG fan-out server
///
/// Command-line flags override values from the configuration file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "FRAMECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Capture source: test-pattern, test-pattern:WxH, a device index, an image file or a directory
    #[arg(short, long, env = "FRAMECAST_SOURCE")]
    source: Option<SourceSpec>,

    /// Listen host
    #[arg(long, env = "FRAMECAST_HOST")]
    host: Option<String>,

    /// Listen port
    #[arg(short, long, env = "FRAMECAST_PORT")]
    port: Option<u16>,

    /// Producer frame rate
    #[arg(long, env = "FRAMECAST_FPS")]
    fps: Option<f64>,

    /// Frames of history kept for diagnostics
    #[arg(long, env = "FRAMECAST_BUFFER_CAPACITY")]
    buffer_capacity: Option<usize>,

    /// Default seconds between /uptime samples
    #[arg(long, env = "FRAMECAST_UPTIME_INTERVAL")]
    uptime_interval: Option<f64>,

    /// JPEG quality (1-100)
    #[arg(long, env = "FRAMECAST_JPEG_QUALITY")]
    jpeg_quality: Option<u8>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<StreamConfig> {
        let mut config = match &self.config {
            Some(path) => StreamConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => StreamConfig::default(),
        };

        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(fps) = self.fps {
            config.frame_rate = fps;
        }
        if let Some(capacity) = self.buffer_capacity {
            config.buffer_capacity = capacity;
        }
        if let Some(secs) = self.uptime_interval {
            config.uptime_interval_secs = secs;
        }
        if let Some(quality) = self.jpeg_quality {
            config.jpeg_quality = quality;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framecast=info")),
        )
        .init();

    let config = Args::parse().into_config()?;
    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    let shutdown = CancellationToken::new();
    let app = Framecast::start(&config, shutdown.clone())?;

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => warn!("Cannot listen for Ctrl-C ({}), shutting down", e),
        }
        signal_shutdown.cancel();
    });

    app.serve(listener).await?;
    info!("Bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "framecast",
            "--source",
            "test-pattern:32x16",
            "--port",
            "8081",
            "--fps",
            "30",
        ])
        .unwrap();

        let config = args.into_config().unwrap();
        assert_eq!(config.source, SourceSpec::TestPattern { width: 32, height: 16 });
        assert_eq!(config.port, 8081);
        assert_eq!(config.frame_rate, 30.0);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let args = Args::try_parse_from(["framecast", "--jpeg-quality", "0"]).unwrap();
        assert!(args.into_config().is_err());

        assert!(Args::try_parse_from(["framecast", "--source", "test-pattern:axb"]).is_err());
    }
}
