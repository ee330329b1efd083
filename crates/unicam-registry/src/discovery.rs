//! Plugin discovery.
//!
//! Scans the search path for camera plugins and registers every camera type
//! they offer. One broken library never stops the scan: its failure is
//! logged, recorded in the [`DiscoveryReport`] and the next one is tried.

use crate::registry::{CameraRegistry, Origin};
use crate::search_path::plugin_search_paths;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use unicam_core::config::PluginSettings;
use unicam_plugin_api::{PluginCameraFactory, PluginManager};

/// A camera type registered from a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredBackend {
    /// Registry name
    pub name: String,
    /// Plugin that provides it
    pub plugin_id: String,
    /// Library path
    pub path: PathBuf,
}

/// A library or camera type that could not be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFailure {
    /// Library (or directory) concerned
    pub path: PathBuf,
    /// Human-readable reason
    pub reason: String,
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Directories scanned, in order
    pub searched: Vec<PathBuf>,
    /// Camera types registered
    pub registered: Vec<DiscoveredBackend>,
    /// Everything that was skipped
    pub failures: Vec<DiscoveryFailure>,
}

impl DiscoveryReport {
    /// Whether nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, path: &Path, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(path = %path.display(), reason = %reason, "camera plugin skipped");
        self.failures.push(DiscoveryFailure {
            path: path.to_path_buf(),
            reason,
        });
    }
}

impl CameraRegistry {
    /// Discover plugins along the configured search path.
    pub fn discover_plugins(&self, settings: &PluginSettings) -> DiscoveryReport {
        self.discover_in(&plugin_search_paths(settings))
    }

    /// Discover plugins in `dirs`, in order.
    ///
    /// Each camera type is registered under its own name. A name that is
    /// already taken is a failure for that type only.
    pub fn discover_in(&self, dirs: &[PathBuf]) -> DiscoveryReport {
        let mut manager = PluginManager::new();
        for dir in dirs {
            manager.add_search_path(dir);
        }

        let mut report = DiscoveryReport {
            searched: manager.search_paths().to_vec(),
            ..DiscoveryReport::default()
        };
        let discovery = manager.discover_plugins();

        for failure in &discovery.failures {
            report.fail(&failure.path, failure.error.to_string());
        }

        for plugin in &discovery.loaded {
            let plugin_id = plugin.metadata.plugin_id.to_string();
            for factory in PluginCameraFactory::for_plugin(plugin) {
                let name = factory.type_name().to_string();
                match self.insert(&name, Arc::new(factory), Origin::Plugin(plugin.path.clone())) {
                    Ok(()) => report.registered.push(DiscoveredBackend {
                        name,
                        plugin_id: plugin_id.clone(),
                        path: plugin.path.clone(),
                    }),
                    Err(e) => report.fail(&plugin.path, format!("camera type '{}': {}", name, e)),
                }
            }
        }

        info!(
            searched = report.searched.len(),
            registered = report.registered.len(),
            failed = report.failures.len(),
            "plugin discovery finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn corrupt_library(dir: &Path, stem: &str) -> PathBuf {
        let path = dir.join(format!("lib{}.{}", stem, std::env::consts::DLL_EXTENSION));
        std::fs::write(&path, b"this is not a shared object").unwrap();
        path
    }

    #[traced_test]
    #[test]
    fn test_corrupt_plugin_is_reported_and_builtins_survive() {
        let dir = tempfile::tempdir().unwrap();
        let broken = corrupt_library(dir.path(), "broken");
        let registry = CameraRegistry::with_builtin_backends().unwrap();

        let report = registry.discover_in(&[dir.path().to_path_buf()]);

        assert!(!report.is_clean());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, broken);
        assert!(report.registered.is_empty());
        assert_eq!(registry.list(), ["mock", "file"]);
        assert!(logs_contain("camera plugin skipped"));
    }

    #[traced_test]
    #[test]
    fn test_every_library_is_tried() {
        let dir = tempfile::tempdir().unwrap();
        corrupt_library(dir.path(), "a");
        corrupt_library(dir.path(), "b");
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
        let registry = CameraRegistry::default();

        let report = registry.discover_in(&[
            PathBuf::from("/nonexistent/unicam"),
            dir.path().to_path_buf(),
        ]);

        assert_eq!(report.searched.len(), 2);
        assert_eq!(report.failures.len(), 2);
        assert!(logs_contain("plugin discovery finished"));
    }
}
