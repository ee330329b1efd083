//! Shared setup for the tools: configuration, registry and camera opening.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use unicam_core::config::UnicamConfig;
use unicam_core::Camera;
use unicam_registry::{CameraRegistry, DiscoveryReport};

/// A `name=value` property assignment from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Property name
    pub name: String,
    /// Value text, parsed against the property's descriptor
    pub value: String,
}

impl std::str::FromStr for Assignment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, value) = s
            .split_once('=')
            .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("missing property name in '{}'", s));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }
}

/// Configuration plus a registry with built-in and discovered backends.
pub struct Session {
    /// Loaded configuration
    pub config: UnicamConfig,
    /// Backend registry
    pub registry: CameraRegistry,
    /// Outcome of plugin discovery
    pub discovery: DiscoveryReport,
}

impl Session {
    /// Load configuration from `path` (or `unicam.toml`) and discover plugins.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = UnicamConfig::load(path)?;
        Self::from_config(config)
    }

    /// Registry for an already loaded configuration.
    pub fn from_config(config: UnicamConfig) -> Result<Self> {
        let registry =
            CameraRegistry::from_config(&config).context("Failed to register built-in backends")?;
        let discovery = registry.discover_plugins(&config.plugins);
        Ok(Self {
            config,
            registry,
            discovery,
        })
    }

    /// Open a backend or preset and apply `assignments` in order.
    pub async fn open(&self, name: &str, assignments: &[Assignment]) -> Result<Arc<Camera>> {
        if !self.registry.contains(name) && self.registry.preset(name).is_none() {
            bail!(
                "Unknown camera '{}'. Available: {}",
                name,
                self.available().join(", ")
            );
        }
        let camera = self
            .registry
            .open(name)
            .await
            .with_context(|| format!("Failed to open camera '{}'", name))?;
        apply(&camera, assignments).await?;
        Ok(Arc::new(camera))
    }

    /// Backend names followed by preset ids.
    pub fn available(&self) -> Vec<String> {
        let mut names = self.registry.list();
        names.extend(self.registry.preset_ids());
        names
    }
}

/// Apply command-line assignments to a camera.
pub async fn apply(camera: &Camera, assignments: &[Assignment]) -> Result<()> {
    for assignment in assignments {
        camera
            .set_from_str(&assignment.name, &assignment.value)
            .await
            .map_err(|e| {
                warn!(property = %assignment.name, value = %assignment.value, error = %e, "assignment rejected");
                e
            })
            .with_context(|| format!("Cannot set {}={}", assignment.name, assignment.value))?;
    }
    Ok(())
}
