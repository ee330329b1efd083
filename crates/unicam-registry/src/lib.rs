//! Camera backend registry for unicam.
//!
//! [`CameraRegistry`] maps backend names to factories. Built-in backends
//! (`mock`, `file`) are registered up front; native plugins are added by
//! [`CameraRegistry::discover_plugins`], which walks the search path from
//! [`search_path::plugin_search_paths`].
//!
//! ```rust,ignore
//! let config = UnicamConfig::load(None)?;
//! let registry = CameraRegistry::from_config(&config)?;
//! let report = registry.discover_plugins(&config.plugins);
//! for failure in &report.failures {
//!     eprintln!("{}: {}", failure.path.display(), failure.reason);
//! }
//! let camera = registry.open("mock").await?;
//! ```

mod discovery;
mod registry;
pub mod search_path;

pub use discovery::{DiscoveredBackend, DiscoveryFailure, DiscoveryReport};
pub use registry::{CameraRegistry, Origin, RegistryEntry};
pub use search_path::{plugin_search_paths, CAMERA_PATH_ENV};
