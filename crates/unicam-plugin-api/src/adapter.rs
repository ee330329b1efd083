//! Host side of the plugin boundary.
//!
//! [`FfiCameraDriver`] implements `CameraDriver` over a [`CameraFfiBox`], and
//! [`PluginCameraFactory`] builds them from a loaded plugin so plugin cameras
//! register like any built-in backend. Plugin calls block, so each one runs
//! on tokio's blocking pool.

use crate::camera_ffi::{
    CameraFfi, CameraFfiBox, FfiArmRequest, FfiCaptureRequest, FfiPropertyDescriptor, FfiPropertyPair,
    FfiPropertyValue,
};
use crate::loader::{LoadedPlugin, PluginCameraType};
use abi_stable::std_types::{RString, RVec};
use anyhow::Context;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info};
use unicam_core::error::{DriverError, DriverErrorKind};
use unicam_core::property::base_descriptors;
use unicam_core::{
    ArmRequest, CameraDriver, CameraFactory, CaptureRequest, DescriptorTable, PropertyDescriptor,
    PropertyValue, Result,
};

/// How long one blocking wait on the external trigger line may last.
///
/// Bounds how long a stopped session keeps a blocking thread busy.
const TRIGGER_POLL_MS: u64 = 100;

/// Base descriptors with the plugin's merged over them.
///
/// A plugin property with a base name replaces the base entry in place; new
/// names are appended in plugin order.
pub fn plugin_descriptor_table(
    properties: RVec<FfiPropertyDescriptor>,
) -> Result<Arc<DescriptorTable>> {
    let base = base_descriptors();
    let mut builder = DescriptorTable::builder().with_base();
    for descriptor in properties.into_iter().map(PropertyDescriptor::from) {
        builder = if base.iter().any(|b| b.name == descriptor.name) {
            builder.override_property(descriptor)
        } else {
            builder.property(descriptor)
        };
    }
    builder.build()
}

fn into_pairs(pairs: RVec<FfiPropertyPair>) -> Vec<(String, PropertyValue)> {
    pairs
        .into_iter()
        .map(|p| (p.name.into_string(), PropertyValue::from(p.value)))
        .collect()
}

// =============================================================================
// FfiCameraDriver
// =============================================================================

/// `CameraDriver` backed by a plugin camera.
pub struct FfiCameraDriver {
    type_name: String,
    camera: Arc<CameraFfiBox>,
    table: Arc<DescriptorTable>,
}

impl FfiCameraDriver {
    /// Wrap a camera built by a plugin.
    pub fn new(camera: CameraFfiBox) -> std::result::Result<Self, DriverError> {
        let type_name = camera.type_name().into_string();
        let table = plugin_descriptor_table(camera.descriptors()).map_err(|e| {
            DriverError::new(
                &type_name,
                DriverErrorKind::Initialization,
                format!("invalid property table: {}", e),
            )
        })?;
        Ok(Self {
            type_name,
            camera: Arc::new(camera),
            table,
        })
    }

    async fn call<R, F>(&self, f: F) -> std::result::Result<R, DriverError>
    where
        F: FnOnce(&CameraFfiBox) -> R + Send + 'static,
        R: Send + 'static,
    {
        let camera = Arc::clone(&self.camera);
        tokio::task::spawn_blocking(move || f(camera.as_ref()))
            .await
            .map_err(|e| {
                DriverError::new(
                    &self.type_name,
                    DriverErrorKind::Unknown,
                    format!("plugin call failed: {}", e),
                )
            })
    }
}

impl std::fmt::Debug for FfiCameraDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfiCameraDriver")
            .field("type_name", &self.type_name)
            .field("properties", &self.table.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CameraDriver for FfiCameraDriver {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn descriptors(&self) -> Arc<DescriptorTable> {
        Arc::clone(&self.table)
    }

    fn initial_values(&self) -> Vec<(String, PropertyValue)> {
        into_pairs(self.camera.initial_values())
    }

    async fn apply_property(
        &self,
        name: &str,
        value: &PropertyValue,
    ) -> Result<Vec<(String, PropertyValue)>> {
        let ffi_name = RString::from(name);
        let ffi_value = FfiPropertyValue::from(value.clone());
        match self
            .call(move |camera| camera.apply_property(ffi_name, ffi_value))
            .await
            .map_err(|e| e.rejected(name))?
            .into_result()
        {
            Ok(reported) => Ok(into_pairs(reported)),
            Err(e) => Err(e.into_driver_error(&self.type_name).rejected(name)),
        }
    }

    async fn arm(&self, request: &ArmRequest) -> Result<()> {
        let request = FfiArmRequest::from(request);
        self.call(move |camera| camera.arm(request))
            .await?
            .into_result()
            .map_err(|e| e.into_camera_error(&self.type_name))?;
        debug!(camera = %self.type_name, "plugin camera armed");
        Ok(())
    }

    async fn disarm(&self) -> Result<()> {
        self.call(|camera| camera.disarm())
            .await?
            .into_result()
            .map_err(|e| e.into_camera_error(&self.type_name))
    }

    async fn capture(&self, request: &CaptureRequest, buffer: &mut [u8]) -> Result<()> {
        let request = FfiCaptureRequest::from(request);
        let data = self
            .call(move |camera| camera.capture(request))
            .await?
            .into_result()
            .map_err(|e| e.into_camera_error(&self.type_name))?;
        if data.len() != buffer.len() {
            return Err(DriverError::new(
                &self.type_name,
                DriverErrorKind::Transfer,
                format!("plugin returned {} bytes for a {} byte frame", data.len(), buffer.len()),
            )
            .into());
        }
        buffer.copy_from_slice(&data);
        Ok(())
    }

    async fn wait_external_trigger(&self) -> Result<()> {
        loop {
            let fired = self
                .call(|camera| camera.wait_external_trigger(TRIGGER_POLL_MS))
                .await?;
            if fired {
                return Ok(());
            }
        }
    }
}

// =============================================================================
// PluginCameraFactory
// =============================================================================

/// Factory for one camera type of a loaded plugin.
pub struct PluginCameraFactory {
    plugin: Arc<LoadedPlugin>,
    camera_type: PluginCameraType,
}

impl PluginCameraFactory {
    /// Factory for `camera_type` of `plugin`.
    pub fn new(plugin: Arc<LoadedPlugin>, camera_type: PluginCameraType) -> Self {
        Self {
            plugin,
            camera_type,
        }
    }

    /// Factories for every camera type `plugin` offers.
    pub fn for_plugin(plugin: &Arc<LoadedPlugin>) -> Vec<Self> {
        plugin
            .camera_types()
            .iter()
            .map(|t| Self::new(Arc::clone(plugin), t.clone()))
            .collect()
    }

    /// Camera type name.
    pub fn type_name(&self) -> &str {
        &self.camera_type.name
    }
}

fn args_toml(args: &toml::Value) -> anyhow::Result<String> {
    let table = args
        .as_table()
        .with_context(|| format!("expected a table of arguments, got {}", args.type_str()))?;
    toml::to_string(table).context("arguments cannot be serialized")
}

impl CameraFactory for PluginCameraFactory {
    fn description(&self) -> &str {
        &self.camera_type.description
    }

    fn descriptors(&self) -> Result<Arc<DescriptorTable>> {
        Ok(Arc::clone(&self.camera_type.table))
    }

    fn validate(&self, args: &toml::Value) -> anyhow::Result<()> {
        args_toml(args).map(|_| ())
    }

    fn build(
        &self,
        args: toml::Value,
    ) -> BoxFuture<'static, std::result::Result<Box<dyn CameraDriver>, DriverError>> {
        let plugin = Arc::clone(&self.plugin);
        let type_name = self.camera_type.name.clone();
        Box::pin(async move {
            let config = args_toml(&args).map_err(|e| {
                DriverError::new(&type_name, DriverErrorKind::Configuration, format!("{:#}", e))
            })?;
            let name = type_name.clone();
            let camera = tokio::task::spawn_blocking(move || plugin.create_camera(&name, &config))
                .await
                .map_err(|e| {
                    DriverError::new(&type_name, DriverErrorKind::Initialization, e.to_string())
                })?
                .map_err(|e| e.into_driver_error(&type_name))?;
            let driver = FfiCameraDriver::new(camera)?;
            info!(camera = %type_name, "plugin camera created");
            Ok(Box::new(driver) as Box<dyn CameraDriver>)
        })
    }
}
