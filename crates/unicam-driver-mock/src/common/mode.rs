//! Operational modes.
//!
//! - **Realistic**: frames arrive at the exposure / frame-rate limit (default)
//! - **Instant**: no delays, deterministic; opt-in for unit tests
//! - **Chaos**: realistic timing plus random transfer failures

use serde::Deserialize;

/// How the mock camera paces and perturbs frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockMode {
    /// Zero delays
    Instant,
    /// Hardware-like timing
    #[default]
    Realistic,
    /// Hardware-like timing with random failures
    Chaos,
}

impl MockMode {
    /// Whether captures wait out the frame period.
    pub fn is_timed(self) -> bool {
        !matches!(self, MockMode::Instant)
    }
}

impl std::str::FromStr for MockMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instant" => Ok(MockMode::Instant),
            "realistic" => Ok(MockMode::Realistic),
            "chaos" => Ok(MockMode::Chaos),
            other => Err(format!("unknown mock mode '{}'", other)),
        }
    }
}
