//! Runtime configuration
//!
//! Every option has a default, so an empty file (or no file at all) is a
//! valid configuration. Files are YAML:
//!
//! ```yaml
//! source: media/clip        # or test-pattern, test-pattern:320x240, 0 (device)
//! host: 0.0.0.0
//! port: 5000
//! buffer_capacity: 10
//! frame_rate: 60.0
//! jpeg_quality: 80
//! uptime_interval_secs: 1.0
//! uptime_command: uptime
//! ```

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::buffer::DEFAULT_CAPACITY;
use crate::diagnostic::{MAX_INTERVAL, MIN_INTERVAL};
use crate::encoder::DEFAULT_JPEG_QUALITY;
use crate::producer::ProducerConfig;
use crate::sources::SourceSpec;
use crate::{Result, StreamError};

/// Highest producer rate accepted, in frames per second
pub const MAX_FRAME_RATE: f64 = 1000.0;

/// All tunables of the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Capture source identifier
    pub source: SourceSpec,

    /// Listen host (name or IP)
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Frames of diagnostic history kept by the frame buffer
    pub buffer_capacity: usize,

    /// Producer cadence in frames per second
    pub frame_rate: f64,

    /// JPEG quality, 1-100
    pub jpeg_quality: u8,

    /// Default delay between diagnostic samples
    pub uptime_interval_secs: f64,

    /// Command line run by the diagnostic stream
    pub uptime_command: String,

    /// Consecutive failed producer cycles before backing off
    pub escalate_after: u32,

    /// Longest producer backoff
    pub max_backoff_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            source: SourceSpec::default(),
            host: "127.0.0.1".to_string(),
            port: 5000,
            buffer_capacity: DEFAULT_CAPACITY,
            frame_rate: 60.0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            uptime_interval_secs: 1.0,
            uptime_command: "uptime".to_string(),
            escalate_after: 10,
            max_backoff_ms: 2000,
        }
    }
}

impl StreamConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: StreamConfig = if yaml.trim().is_empty() {
            StreamConfig::default()
        } else {
            serde_yaml_ng::from_str(yaml)
                .map_err(|e| StreamError::config(format!("invalid YAML: {e}")))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| StreamError::file_error(path.to_path_buf(), e))?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_yaml_str(&yaml)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(StreamError::config("buffer_capacity must be at least 1"));
        }
        // One frame per MAX_INTERVAL is the slowest cadence.
        let min_frame_rate = 1.0 / MAX_INTERVAL.as_secs_f64();
        if !(min_frame_rate..=MAX_FRAME_RATE).contains(&self.frame_rate) {
            return Err(StreamError::config(format!(
                "frame_rate must be within {min_frame_rate}..={MAX_FRAME_RATE}, got {}",
                self.frame_rate
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(StreamError::config(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        let (min_secs, max_secs) = (MIN_INTERVAL.as_secs_f64(), MAX_INTERVAL.as_secs_f64());
        if !(min_secs..=max_secs).contains(&self.uptime_interval_secs) {
            return Err(StreamError::config(format!(
                "uptime_interval_secs must be within {min_secs}..={max_secs}, got {}",
                self.uptime_interval_secs
            )));
        }
        if self.uptime_command.trim().is_empty() {
            return Err(StreamError::config("uptime_command must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(StreamError::config("host must not be empty"));
        }
        Ok(())
    }

    /// Time between producer cycles
    pub fn frame_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate)
    }

    pub fn uptime_interval(&self) -> Duration {
        Duration::from_secs_f64(self.uptime_interval_secs)
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig {
            period: self.frame_period(),
            escalate_after: self.escalate_after.max(1),
            max_backoff: Duration::from_millis(self.max_backoff_ms).max(self.frame_period()),
        }
    }

    /// Resolve `host:port` to the first matching socket address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| StreamError::io(format!("resolving {}:{}", self.host, self.port), e))?
            .next()
            .ok_or_else(|| {
                StreamError::config(format!("{}:{} resolves to no address", self.host, self.port))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn empty_document_is_the_default() {
        assert_eq!(StreamConfig::from_yaml_str("").unwrap(), StreamConfig::default());
        assert_eq!(StreamConfig::default().frame_period(), Duration::from_secs_f64(1.0 / 60.0));
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let config = StreamConfig::from_yaml_str(
            "source: clips/demo\nport: 8080\nframe_rate: 25\nuptime_command: uptime -p\n",
        )
        .unwrap();

        assert_eq!(config.source, SourceSpec::Images(PathBuf::from("clips/demo")));
        assert_eq!(config.port, 8080);
        assert_eq!(config.frame_period(), Duration::from_millis(40));
        assert_eq!(config.buffer_capacity, DEFAULT_CAPACITY);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn invalid_values_are_rejected() {
        for yaml in [
            "buffer_capacity: 0",
            "frame_rate: 0",
            "frame_rate: -5",
            "jpeg_quality: 0",
            "jpeg_quality: 101",
            "frame_rate: 1.0e-30",
            "frame_rate: 1.0e30",
            "frame_rate: .nan",
            "uptime_interval_secs: 0",
            "uptime_interval_secs: 1.0e30",
            "uptime_interval_secs: .inf",
            "uptime_command: ''",
            "source: 'test-pattern:0x0'",
            "source: ''",
            "unknown_option: true",
        ] {
            let err = StreamConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, StreamError::Config { .. }), "{yaml}: {err}");
        }
    }

    #[test]
    fn accepted_rates_convert_to_durations() {
        for yaml in ["frame_rate: 1000", "frame_rate: 0.0003", "uptime_interval_secs: 3600"] {
            let config = StreamConfig::from_yaml_str(yaml).unwrap();
            assert!(config.producer_config().period > Duration::ZERO, "{yaml}");
            assert!(config.uptime_interval() <= MAX_INTERVAL, "{yaml}");
        }
    }

    #[test]
    fn integer_sources_are_devices() {
        let config = StreamConfig::from_yaml_str("source: '0'\n").unwrap();
        assert_eq!(config.source, SourceSpec::Device(0));
    }

    #[test]
    fn producer_config_follows_frame_rate() {
        let config = StreamConfig { frame_rate: 10.0, max_backoff_ms: 1, ..Default::default() };
        let producer = config.producer_config();

        assert_eq!(producer.period, Duration::from_millis(100));
        // Backoff never undercuts the normal period.
        assert_eq!(producer.max_backoff, Duration::from_millis(100));
    }

    #[test]
    fn listen_addr_resolves_ip_hosts() {
        let config = StreamConfig { host: "0.0.0.0".into(), port: 9000, ..Default::default() };
        assert_eq!(config.listen_addr().unwrap(), "0.0.0.0:9000".parse().unwrap());
    }

    #[test]
    fn load_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framecast.yaml");
        std::fs::write(&path, "port: 6000\n").unwrap();

        assert_eq!(StreamConfig::load(&path).unwrap().port, 6000);
        assert!(matches!(
            StreamConfig::load(dir.path().join("missing.yaml")),
            Err(StreamError::Io { .. })
        ));
    }
}
