//! Camera backend registry.
//!
//! Maps backend names to [`CameraFactory`]s and builds [`Camera`]s from them.
//! Built-in backends and plugin camera types live side by side; callers only
//! ever see names.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use unicam_core::config::{CameraPreset, UnicamConfig};
use unicam_core::error::{DriverError, DriverErrorKind};
use unicam_core::{
    AcquisitionConfig, Camera, CameraError, CameraFactory, FactoryRegistry, Result,
};

/// Where a registered backend came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Compiled into the host
    Builtin,
    /// Loaded from the plugin library at this path
    Plugin(PathBuf),
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Builtin => write!(f, "built-in"),
            Origin::Plugin(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One registered backend.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Registry name
    pub name: String,
    /// Factory building drivers for this backend
    pub factory: Arc<dyn CameraFactory>,
    /// Where the backend came from
    pub origin: Origin,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("description", &self.factory.description())
            .field("origin", &self.origin)
            .finish()
    }
}

#[derive(Default)]
struct Entries {
    list: Vec<RegistryEntry>,
    index: HashMap<String, usize>,
}

/// Registry of camera backends.
///
/// Registration takes the write lock briefly; lookups and `create` only read,
/// and the factory's `build` runs with no lock held.
///
/// # Example
///
/// ```rust,ignore
/// let registry = CameraRegistry::with_builtin_backends()?;
/// let camera = registry.create("mock", toml::Value::Table(Default::default())).await?;
/// ```
pub struct CameraRegistry {
    entries: RwLock<Entries>,
    presets: RwLock<Vec<CameraPreset>>,
    acquisition: AcquisitionConfig,
}

impl Default for CameraRegistry {
    fn default() -> Self {
        Self::new(AcquisitionConfig::default())
    }
}

impl std::fmt::Debug for CameraRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraRegistry")
            .field("backends", &self.list())
            .field("presets", &self.presets.read().len())
            .field("acquisition", &self.acquisition)
            .finish()
    }
}

impl CameraRegistry {
    /// Empty registry whose cameras use `acquisition`.
    pub fn new(acquisition: AcquisitionConfig) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            presets: RwLock::new(Vec::new()),
            acquisition,
        }
    }

    /// Registry with the `mock` and `file` backends.
    pub fn with_builtin_backends() -> Result<Self> {
        let registry = Self::default();
        registry.register_builtin_backends()?;
        Ok(registry)
    }

    /// Registry set up from configuration: built-in backends, acquisition
    /// settings and presets. Plugin discovery is a separate step.
    pub fn from_config(config: &UnicamConfig) -> Result<Self> {
        let registry = Self::new(config.acquisition.to_config());
        registry.register_builtin_backends()?;
        registry.set_presets(config.cameras.clone());
        Ok(registry)
    }

    fn register_builtin_backends(&self) -> Result<()> {
        unicam_driver_mock::register(self)?;
        unicam_driver_file::register(self)?;
        Ok(())
    }

    /// Engine settings handed to every camera created here.
    pub fn acquisition_config(&self) -> &AcquisitionConfig {
        &self.acquisition
    }

    /// Register a built-in backend; `DuplicateName` if `name` is taken.
    pub fn register(&self, name: &str, factory: Arc<dyn CameraFactory>) -> Result<()> {
        self.insert(name, factory, Origin::Builtin)
    }

    /// Register a backend with an explicit origin.
    pub fn insert(&self, name: &str, factory: Arc<dyn CameraFactory>, origin: Origin) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.index.contains_key(name) {
            return Err(CameraError::DuplicateName(name.to_string()));
        }
        info!(backend = %name, origin = %origin, description = %factory.description(), "registering camera backend");
        let position = entries.list.len();
        entries.list.push(RegistryEntry {
            name: name.to_string(),
            factory,
            origin,
        });
        entries.index.insert(name.to_string(), position);
        Ok(())
    }

    /// Backend names in registration order.
    pub fn list(&self) -> Vec<String> {
        self.entries.read().list.iter().map(|e| e.name.clone()).collect()
    }

    /// Registered backends in registration order.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.entries.read().list.clone()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().index.contains_key(name)
    }

    /// Registered entry by name.
    pub fn entry(&self, name: &str) -> Option<RegistryEntry> {
        let entries = self.entries.read();
        entries.index.get(name).map(|&i| entries.list[i].clone())
    }

    /// Instantiate backend `name` with constructor `args`.
    ///
    /// Factory validation and build failures are reported as `BackendInit`.
    pub async fn create(&self, name: &str, args: toml::Value) -> Result<Camera> {
        let factory = self
            .entry(name)
            .map(|e| e.factory)
            .ok_or_else(|| CameraError::backend_not_found(name))?;

        factory.validate(&args).map_err(|e| CameraError::BackendInit {
            backend: name.to_string(),
            cause: DriverError::new(name, DriverErrorKind::Configuration, format!("{:#}", e)),
        })?;

        debug!(backend = %name, "building camera");
        let driver = factory
            .build(args)
            .await
            .map_err(|cause| CameraError::BackendInit {
                backend: name.to_string(),
                cause,
            })?;

        Camera::new(name, driver, self.acquisition.clone())
    }

    // =========================================================================
    // Presets
    // =========================================================================

    /// Replace the camera presets.
    pub fn set_presets(&self, presets: Vec<CameraPreset>) {
        *self.presets.write() = presets;
    }

    /// Preset ids in configuration order.
    pub fn preset_ids(&self) -> Vec<String> {
        self.presets.read().iter().map(|p| p.id.clone()).collect()
    }

    /// Preset by id.
    pub fn preset(&self, id: &str) -> Option<CameraPreset> {
        self.presets.read().iter().find(|p| p.id == id).cloned()
    }

    /// Open a camera by preset id or backend name.
    ///
    /// A preset is created with its arguments and then has its properties
    /// applied in order; a backend name is created with default arguments.
    pub async fn open(&self, name: &str) -> Result<Camera> {
        let Some(preset) = self.preset(name) else {
            return self
                .create(name, toml::Value::Table(toml::Table::new()))
                .await;
        };

        let camera = self.create(&preset.backend, preset.args.clone()).await?;
        for (property, text) in preset.property_strings() {
            if let Err(e) = camera.set_from_str(&property, &text).await {
                warn!(preset = %preset.id, property = %property, value = %text, error = %e, "preset property rejected");
                return Err(e);
            }
        }
        info!(preset = %preset.id, backend = %preset.backend, "preset opened");
        Ok(camera)
    }
}

impl FactoryRegistry for CameraRegistry {
    fn register_factory(&self, name: &str, factory: Arc<dyn CameraFactory>) -> Result<()> {
        self.register(name, factory)
    }
}
