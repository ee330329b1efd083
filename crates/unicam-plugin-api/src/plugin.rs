//! Plugin root module and entry point definitions.
//!
//! Plugins export a root module via `get_root_module()` that lists the camera
//! types they provide and builds instances of them.

#![allow(non_camel_case_types)] // abi_stable generates `*_Ref` types
#![allow(clippy::expl_impl_clone_on_copy)] // StableAbi macro generates Clone impl for Copy type

use crate::camera_ffi::{CameraFfiBox, FfiCameraTypeInfo, FfiError};
use crate::metadata::{AbiVersion, PluginMetadata};
use abi_stable::library::RootModule;
use abi_stable::package_version_strings;
use abi_stable::sabi_types::VersionStrings;
use abi_stable::std_types::{RResult, RString, RVec};
use abi_stable::{declare_root_module_statics, StableAbi};
use std::path::PathBuf;
use thiserror::Error;

/// The root module that camera plugins export.
///
/// # Example
///
/// ```rust,ignore
/// use unicam_plugin_api::prelude::*;
///
/// #[export_root_module]
/// fn get_root_module() -> CameraPluginMod_Ref {
///     CameraPluginMod {
///         abi_version,
///         get_metadata,
///         list_camera_types,
///         create_camera,
///     }
///     .leak_into_prefix()
/// }
///
/// #[sabi_extern_fn]
/// fn abi_version() -> AbiVersion {
///     AbiVersion::CURRENT
/// }
/// ```
#[repr(C)]
#[derive(StableAbi)]
#[sabi(kind(Prefix(prefix_ref = CameraPluginMod_Ref)))]
#[sabi(missing_field(panic))]
pub struct CameraPluginMod {
    /// Get the ABI version this plugin was compiled with
    pub abi_version: extern "C" fn() -> AbiVersion,

    /// Get plugin metadata
    pub get_metadata: extern "C" fn() -> PluginMetadata,

    /// List the camera types this plugin provides, with their properties
    #[sabi(last_prefix_field)]
    pub list_camera_types: extern "C" fn() -> RVec<FfiCameraTypeInfo>,

    /// Bring a camera online
    ///
    /// `args_toml` is the TOML serialization of the constructor argument table.
    pub create_camera:
        extern "C" fn(type_name: RString, args_toml: RString) -> RResult<CameraFfiBox, FfiError>,
}

impl RootModule for CameraPluginMod_Ref {
    declare_root_module_statics! {CameraPluginMod_Ref}

    const BASE_NAME: &'static str = "unicam_camera_plugin";
    const NAME: &'static str = "unicam_camera_plugin";
    const VERSION_STRINGS: VersionStrings = package_version_strings!();
}

impl CameraPluginMod_Ref {
    /// Check if this plugin's ABI is compatible with the host
    pub fn is_compatible(&self) -> bool {
        let plugin_version = self.abi_version()();
        plugin_version.is_compatible_with(&AbiVersion::CURRENT)
    }
}

/// Type alias for the plugin reference type
pub type PluginRef = CameraPluginMod_Ref;

/// Error type for plugin loading
#[derive(Error, Debug, Clone)]
pub enum PluginLoadError {
    /// The library file could not be loaded
    #[error("Failed to load plugin library {}: {message}", path.display())]
    LoadFailed {
        /// Library path
        path: PathBuf,
        /// Loader message
        message: String,
    },

    /// The plugin's ABI version is incompatible
    #[error("Plugin ABI version {plugin_version} is incompatible with host version {host_version}")]
    IncompatibleAbi {
        /// Version the plugin was built against
        plugin_version: AbiVersion,
        /// Version of this host
        host_version: AbiVersion,
    },

    /// The library does not export a camera root module
    #[error("{} does not export a camera plugin root module", .0.display())]
    NoRootModule(PathBuf),

    /// The plugin loaded but what it advertises is unusable
    #[error("Plugin initialization failed: {0}")]
    InitFailed(String),
}
