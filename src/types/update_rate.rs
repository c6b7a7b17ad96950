//! Per-client delivery rate control

use serde::{Deserialize, Serialize};

/// Delivery rate requested by a streaming client
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UpdateRate {
    /// Every frame the producer publishes (subject to latest-wins skipping)
    Native,

    /// Capped to at most this many frames per second
    /// If the requested rate meets or exceeds the producer rate, Native is used
    Max(u32),
}

impl UpdateRate {
    /// Build a rate from an optional `fps` query value
    ///
    /// Missing or zero means no cap.
    pub fn from_fps(fps: Option<u32>) -> Self {
        match fps {
            None | Some(0) => UpdateRate::Native,
            Some(hz) => UpdateRate::Max(hz),
        }
    }

    /// Normalize rate against source frequency
    /// Returns effective rate to use
    pub fn normalize(self, source_hz: f64) -> Self {
        match self {
            UpdateRate::Native => UpdateRate::Native,
            UpdateRate::Max(hz) if hz as f64 >= source_hz => UpdateRate::Native,
            UpdateRate::Max(hz) => UpdateRate::Max(hz),
        }
    }

    /// Get throttle interval if needed
    pub fn throttle_interval(self, source_hz: f64) -> Option<std::time::Duration> {
        match self.normalize(source_hz) {
            UpdateRate::Native => None,
            UpdateRate::Max(hz) => Some(std::time::Duration::from_secs_f64(1.0 / hz as f64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn rates_above_source_are_native() {
        assert_eq!(UpdateRate::Max(120).normalize(60.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(60).normalize(60.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(10).normalize(60.0), UpdateRate::Max(10));
    }

    #[test]
    fn zero_fps_means_uncapped() {
        assert_eq!(UpdateRate::from_fps(Some(0)), UpdateRate::Native);
        assert_eq!(UpdateRate::from_fps(None), UpdateRate::Native);
        assert_eq!(UpdateRate::from_fps(Some(5)), UpdateRate::Max(5));
    }

    #[test]
    fn throttle_interval_only_when_capped() {
        assert_eq!(UpdateRate::Native.throttle_interval(60.0), None);
        assert_eq!(UpdateRate::Max(4).throttle_interval(60.0), Some(Duration::from_millis(250)));
    }
}
