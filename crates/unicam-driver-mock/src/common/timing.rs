//! Timing configuration for timed modes.

use std::time::Duration;

/// Hardware-like delays applied outside [`MockMode::Instant`](super::MockMode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Minimum time to read a frame off the sensor, in milliseconds
    pub frame_readout_ms: u64,
    /// Delay of control operations (arm, property pushes), in milliseconds
    pub communication_delay_ms: u64,
}

impl TimingConfig {
    /// A camera on a fast local link.
    pub fn camera() -> Self {
        Self {
            frame_readout_ms: 1,
            communication_delay_ms: 2,
        }
    }

    /// Readout time.
    pub fn readout(&self) -> Duration {
        Duration::from_millis(self.frame_readout_ms)
    }

    /// Control-path delay.
    pub fn communication(&self) -> Duration {
        Duration::from_millis(self.communication_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_is_zero() {
        let config = TimingConfig::default();
        assert_eq!(config.readout(), Duration::ZERO);
        assert_eq!(config.communication(), Duration::ZERO);
    }

    #[test]
    fn test_camera_timing() {
        let config = TimingConfig::camera();
        assert_eq!(config.readout(), Duration::from_millis(1));
        assert_eq!(config.communication(), Duration::from_millis(2));
    }
}
