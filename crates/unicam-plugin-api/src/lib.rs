//! FFI-stable plugin API for unicam camera backends.
//!
//! Camera backends can live in separately compiled shared libraries. A plugin
//! implements [`CameraFfi`] for each camera type and exports a
//! [`CameraPluginMod`] root module; the host loads it with [`PluginManager`]
//! and wraps each type in a [`PluginCameraFactory`], after which a plugin
//! camera is indistinguishable from a built-in one.
//!
//! # Architecture
//!
//! ```text
//! CameraRegistry
//! ├── built-in factories (mock, file)
//! └── PluginCameraFactory ← This crate
//!     └── FfiCameraDriver → CameraFfi (abi_stable, spawn_blocking)
//! ```
//!
//! # Creating a Plugin
//!
//! ```rust,ignore
//! use unicam_plugin_api::prelude::*;
//!
//! #[export_root_module]
//! fn get_root_module() -> CameraPluginMod_Ref {
//!     CameraPluginMod { ... }.leak_into_prefix()
//! }
//! ```

pub mod adapter;
pub mod camera_ffi;
pub mod loader;
pub mod metadata;
pub mod plugin;

pub use adapter::*;
pub use camera_ffi::*;
pub use loader::*;
pub use metadata::*;
pub use plugin::*;

/// Prelude for plugin authors
pub mod prelude {
    pub use crate::camera_ffi::{
        CameraFfi, CameraFfiBox, CameraFfi_TO, FfiAccess, FfiArmRequest, FfiCameraTypeInfo,
        FfiCaptureRequest, FfiEnumValue, FfiError, FfiErrorKind, FfiPropertyDescriptor,
        FfiPropertyPair, FfiPropertyValue, FfiRange, FfiResult, FfiTriggerSource, FfiValueType,
    };
    pub use crate::metadata::{AbiVersion, PluginMetadata};
    pub use crate::plugin::{CameraPluginMod, CameraPluginMod_Ref};
    pub use abi_stable::export_root_module;
    pub use abi_stable::prefix_type::PrefixTypeTrait;
    pub use abi_stable::sabi_extern_fn;
    pub use abi_stable::sabi_trait::TD_Opaque;
    pub use abi_stable::std_types::{ROption, RResult, RString, RVec};
}

/// Re-export abi_stable for plugin convenience
pub use abi_stable;
