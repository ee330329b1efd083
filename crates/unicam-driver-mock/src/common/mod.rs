//! Simulation infrastructure for the mock camera.
//!
//! - **mode**: Instant, Realistic, Chaos
//! - **timing**: hardware-like delays
//! - **errors**: scripted and random fault injection
//! - **rng**: seeded random number generator

pub mod errors;
pub mod mode;
pub mod rng;
pub mod timing;

pub use errors::{ErrorConfig, ErrorScenario};
pub use mode::MockMode;
pub use rng::MockRng;
pub use timing::TimingConfig;
