//! TIFF replay backend for unicam.
//!
//! The `file` camera plays back every `.tif`/`.tiff` in a directory, sorted by
//! name, then reports `EndOfStream`:
//!
//! ```toml
//! [[cameras]]
//! id = "replay"
//! backend = "file"
//! args = { path = "/data/run-0042" }
//! ```

mod file_camera;
pub mod tiff;

pub use file_camera::{
    file_descriptors, FileCamera, FileCameraConfig, FileCameraFactory, DRIVER_TYPE, PATH,
};

use std::sync::Arc;
use unicam_core::FactoryRegistry;

/// Register the `file` backend.
pub fn register(registry: &impl FactoryRegistry) -> unicam_core::Result<()> {
    registry.register_factory(DRIVER_TYPE, Arc::new(FileCameraFactory))
}
