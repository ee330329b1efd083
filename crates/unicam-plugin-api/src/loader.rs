//! Plugin loading infrastructure using abi_stable.
//!
//! This module provides the `PluginManager` for discovering and loading native
//! camera plugins.

use crate::adapter::plugin_descriptor_table;
use crate::camera_ffi::{CameraFfiBox, FfiError};
use crate::metadata::{AbiVersion, PluginMetadata};
use crate::plugin::{CameraPluginMod_Ref, PluginLoadError};
use abi_stable::library::{lib_header_from_path, LibraryError};
use abi_stable::std_types::RString;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use unicam_core::DescriptorTable;

/// A camera type offered by a loaded plugin.
#[derive(Debug, Clone)]
pub struct PluginCameraType {
    /// Type name, used as the registry name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Base properties merged with the plugin's own
    pub table: Arc<DescriptorTable>,
}

/// A loaded plugin instance
pub struct LoadedPlugin {
    /// Plugin metadata
    pub metadata: PluginMetadata,
    /// The plugin's root module reference
    plugin_ref: CameraPluginMod_Ref,
    /// Path to the loaded library
    pub path: PathBuf,
    camera_types: Vec<PluginCameraType>,
}

impl LoadedPlugin {
    /// Camera types advertised at load time, in plugin order
    pub fn camera_types(&self) -> &[PluginCameraType] {
        &self.camera_types
    }

    /// Camera type by name
    pub fn camera_type(&self, name: &str) -> Option<&PluginCameraType> {
        self.camera_types.iter().find(|t| t.name == name)
    }

    /// Create a camera instance; blocks for as long as the plugin does.
    pub fn create_camera(&self, type_name: &str, args_toml: &str) -> Result<CameraFfiBox, FfiError> {
        self.plugin_ref.create_camera()(RString::from(type_name), RString::from(args_toml))
            .into_result()
    }
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("metadata", &self.metadata)
            .field("path", &self.path)
            .field("camera_types", &self.camera_types.iter().map(|t| &t.name).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// A library that could not be loaded during discovery
#[derive(Debug, Clone)]
pub struct LoadFailure {
    /// Library or directory that failed
    pub path: PathBuf,
    /// What went wrong
    pub error: PluginLoadError,
}

/// Result of scanning the search paths
#[derive(Debug, Default)]
pub struct Discovery {
    /// Plugins loaded, in load order
    pub loaded: Vec<Arc<LoadedPlugin>>,
    /// Libraries that failed, in scan order
    pub failures: Vec<LoadFailure>,
}

/// Manager for discovering and loading native camera plugins.
///
/// Plugins are leaked once loaded: abi_stable never unloads a library, so
/// a plugin's camera types stay callable for the life of the process.
///
/// # Example
///
/// ```rust,ignore
/// let mut manager = PluginManager::new();
/// manager.add_search_path("/usr/lib/unicam");
/// let discovery = manager.discover_plugins();
/// for failure in &discovery.failures {
///     eprintln!("{}: {}", failure.path.display(), failure.error);
/// }
/// ```
#[derive(Debug, Default)]
pub struct PluginManager {
    /// Directories to search for plugins
    search_paths: Vec<PathBuf>,
    /// Loaded plugins by plugin ID
    plugins: HashMap<String, Arc<LoadedPlugin>>,
    /// Camera type -> plugin ID mapping for fast lookup
    camera_type_index: HashMap<String, String>,
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory to search for plugins; a directory already listed is ignored
    pub fn add_search_path<P: AsRef<Path>>(&mut self, path: P) {
        let path = path.as_ref().to_path_buf();
        if !self.search_paths.contains(&path) {
            self.search_paths.push(path);
        }
    }

    /// Get all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Load every plugin library found in the search paths.
    ///
    /// Missing directories are skipped. A library that fails to load is
    /// recorded and the scan continues; reporting is up to the caller.
    pub fn discover_plugins(&mut self) -> Discovery {
        let mut discovery = Discovery::default();

        for search_path in self.search_paths.clone() {
            if !search_path.is_dir() {
                continue;
            }

            let mut libraries: Vec<PathBuf> = match std::fs::read_dir(&search_path) {
                Ok(entries) => entries
                    .flatten()
                    .map(|entry| entry.path())
                    .filter(|path| Self::is_plugin_library(path))
                    .collect(),
                Err(e) => {
                    tracing::debug!(path = %search_path.display(), error = %e, "cannot read plugin directory");
                    discovery.failures.push(LoadFailure {
                        error: PluginLoadError::LoadFailed {
                            path: search_path.clone(),
                            message: e.to_string(),
                        },
                        path: search_path,
                    });
                    continue;
                }
            };
            libraries.sort();

            for path in libraries {
                match self.load_plugin(&path) {
                    Ok(plugin) => discovery.loaded.push(plugin),
                    Err(error) => {
                        tracing::debug!(path = %path.display(), error = %error, "failed to load camera plugin");
                        discovery.failures.push(LoadFailure { path, error });
                    }
                }
            }
        }

        discovery
    }

    /// Check if a path looks like a plugin library
    pub fn is_plugin_library(path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        #[cfg(target_os = "macos")]
        {
            extension == "dylib"
        }
        #[cfg(target_os = "linux")]
        {
            extension == "so"
        }
        #[cfg(target_os = "windows")]
        {
            extension == "dll"
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            false
        }
    }

    /// Load a plugin from a specific path
    pub fn load_plugin<P: AsRef<Path>>(&mut self, path: P) -> Result<Arc<LoadedPlugin>, PluginLoadError> {
        let path = path.as_ref();

        let header = lib_header_from_path(path).map_err(|e| match e {
            LibraryError::GetSymbolError { .. } => PluginLoadError::NoRootModule(path.to_path_buf()),
            other => PluginLoadError::LoadFailed {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;

        let plugin_ref = header
            .init_root_module::<CameraPluginMod_Ref>()
            .map_err(|e| PluginLoadError::LoadFailed {
                path: path.to_path_buf(),
                message: format!("failed to init root module: {}", e),
            })?;

        let plugin_abi = plugin_ref.abi_version()();
        if !plugin_abi.is_compatible_with(&AbiVersion::CURRENT) {
            return Err(PluginLoadError::IncompatibleAbi {
                plugin_version: plugin_abi,
                host_version: AbiVersion::CURRENT,
            });
        }

        let metadata = plugin_ref.get_metadata()();
        let plugin_id = metadata.plugin_id.to_string();
        if self.plugins.contains_key(&plugin_id) {
            return Err(PluginLoadError::InitFailed(format!(
                "plugin '{}' is already loaded",
                plugin_id
            )));
        }

        let mut camera_types = Vec::new();
        for info in plugin_ref.list_camera_types()() {
            let name = info.type_name.into_string();
            let table = plugin_descriptor_table(info.properties).map_err(|e| {
                PluginLoadError::InitFailed(format!("camera type '{}': {}", name, e))
            })?;
            camera_types.push(PluginCameraType {
                name,
                description: info.description.into_string(),
                table,
            });
        }

        for camera_type in &camera_types {
            self.camera_type_index
                .insert(camera_type.name.clone(), plugin_id.clone());
        }

        let loaded = Arc::new(LoadedPlugin {
            metadata,
            plugin_ref,
            path: path.to_path_buf(),
            camera_types,
        });
        self.plugins.insert(plugin_id.clone(), Arc::clone(&loaded));

        tracing::info!(plugin = %plugin_id, path = %path.display(), "loaded camera plugin");

        Ok(loaded)
    }

    /// Get a loaded plugin by ID
    pub fn get_plugin(&self, plugin_id: &str) -> Option<&Arc<LoadedPlugin>> {
        self.plugins.get(plugin_id)
    }

    /// List all loaded plugins
    pub fn list_plugins(&self) -> impl Iterator<Item = &Arc<LoadedPlugin>> {
        self.plugins.values()
    }

    /// Find which plugin provides a given camera type
    pub fn find_plugin_for_type(&self, type_name: &str) -> Option<&str> {
        self.camera_type_index.get(type_name).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_paths_are_deduplicated() {
        let mut manager = PluginManager::new();
        manager.add_search_path("/opt/a");
        manager.add_search_path("/opt/b");
        manager.add_search_path("/opt/a");
        assert_eq!(
            manager.search_paths(),
            [PathBuf::from("/opt/a"), PathBuf::from("/opt/b")]
        );
    }

    #[test]
    fn test_missing_directories_are_skipped() {
        let mut manager = PluginManager::new();
        manager.add_search_path("/nonexistent/unicam/plugins");
        let discovery = manager.discover_plugins();
        assert!(discovery.loaded.is_empty());
        assert!(discovery.failures.is_empty());
    }

    #[test]
    fn test_only_platform_libraries_are_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join(format!("libcam.{}", std::env::consts::DLL_EXTENSION));
        let other = dir.path().join("README.md");
        std::fs::write(&lib, b"").unwrap();
        std::fs::write(&other, b"").unwrap();

        assert!(PluginManager::is_plugin_library(&lib));
        assert!(!PluginManager::is_plugin_library(&other));
        assert!(!PluginManager::is_plugin_library(dir.path()));
    }

    #[test]
    fn test_corrupt_library_is_recorded_and_scan_continues() {
        let dir = tempfile::tempdir().unwrap();
        let ext = std::env::consts::DLL_EXTENSION;
        std::fs::write(dir.path().join(format!("liba.{}", ext)), b"not a library").unwrap();
        std::fs::write(dir.path().join(format!("libb.{}", ext)), b"\x7fELF garbage").unwrap();

        let mut manager = PluginManager::new();
        manager.add_search_path(dir.path());
        let discovery = manager.discover_plugins();

        assert!(discovery.loaded.is_empty());
        assert_eq!(discovery.failures.len(), 2);
        assert!(discovery.failures[0].path.ends_with(format!("liba.{}", ext)));
        assert!(matches!(
            discovery.failures[0].error,
            PluginLoadError::LoadFailed { .. }
        ));
    }
}
