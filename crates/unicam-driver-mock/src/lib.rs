//! Mock camera backend for unicam.
//!
//! Produces frames without hardware: each frame carries its sequence number
//! printed as digit glyphs, a gradient body and optional Gaussian noise.
//! All waiting is async (`tokio::time::sleep`), never `std::thread::sleep`.
//!
//! # Modes
//!
//! - [`MockMode::Realistic`]: paced by exposure and frame rate; the default
//! - [`MockMode::Instant`]: frames as fast as the consumer allows; what
//!   [`MockCamera::builder`] starts from, for tests
//! - [`MockMode::Chaos`]: realistic pacing plus random transfer failures
//!
//! # Registration
//!
//! ```rust,ignore
//! use unicam_driver_mock::register;
//! use unicam_core::AcquisitionConfig;
//! use unicam_registry::CameraRegistry;
//!
//! let registry = CameraRegistry::new(AcquisitionConfig::default());
//! register(&registry)?;
//! let camera = registry.create("mock", toml::Value::Table(Default::default())).await?;
//! ```

pub mod common;
mod mock_camera;
pub mod pattern;

pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};
pub use mock_camera::{
    mock_descriptors, MockCamera, MockCameraBuilder, MockCameraConfig, MockCameraFactory,
    MockTriggerLine, CREATE_RANDOM, DRIVER_TYPE,
};

use std::sync::Arc;
use unicam_core::FactoryRegistry;

/// Register the `mock` backend.
pub fn register(registry: &impl FactoryRegistry) -> unicam_core::Result<()> {
    registry.register_factory(DRIVER_TYPE, Arc::new(MockCameraFactory))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use unicam_core::{CameraError, CameraFactory};

    #[derive(Default)]
    struct Names(Mutex<Vec<String>>);

    impl FactoryRegistry for Names {
        fn register_factory(&self, name: &str, _factory: Arc<dyn CameraFactory>) -> unicam_core::Result<()> {
            let mut names = self.0.lock();
            if names.iter().any(|n| n == name) {
                return Err(CameraError::DuplicateName(name.to_string()));
            }
            names.push(name.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_register() {
        let registry = Names::default();
        register(&registry).unwrap();
        assert_eq!(*registry.0.lock(), ["mock"]);
        assert!(register(&registry).is_err());
    }
}
