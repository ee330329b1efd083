//! Example camera plugin demonstrating the unicam-plugin-api.
//!
//! Provides a `ramp` camera: each frame is a horizontal gradient shifted by
//! `ramp_step` pixels per frame, so consecutive frames are easy to tell apart.
//! Build it and drop the shared library into a plugin search path:
//!
//! ```text
//! cargo build -p unicam-plugin-example --release
//! cp target/release/libunicam_plugin_example.so ~/.local/share/unicam/plugins/
//! unicam list
//! ```

use abi_stable::sabi_trait::TD_Opaque;
use parking_lot::Mutex;
use serde::Deserialize;
use std::time::Duration;
use unicam_core::property::names;
use unicam_core::{PropertyDescriptor, TriggerSource, ValueType};
use unicam_plugin_api::prelude::*;

/// Camera type name.
pub const RAMP: &str = "ramp";

/// Pixels the ramp moves per frame.
pub const RAMP_STEP: &str = "ramp_step";

// =============================================================================
// Plugin Entry Point
// =============================================================================

/// Export the plugin root module.
#[export_root_module]
fn get_root_module() -> CameraPluginMod_Ref {
    CameraPluginMod {
        abi_version,
        get_metadata,
        list_camera_types,
        create_camera,
    }
    .leak_into_prefix()
}

#[sabi_extern_fn]
fn abi_version() -> AbiVersion {
    AbiVersion::CURRENT
}

#[sabi_extern_fn]
fn get_metadata() -> PluginMetadata {
    PluginMetadata::new("org.unicam.ramp", "Ramp Camera", env!("CARGO_PKG_VERSION"))
        .with_author("unicam developers")
        .with_description("Synthetic gradient camera for testing plugin loading")
        .with_camera_type(RAMP)
}

#[sabi_extern_fn]
fn list_camera_types() -> RVec<FfiCameraTypeInfo> {
    let mut types = RVec::new();
    types.push(FfiCameraTypeInfo {
        type_name: RString::from(RAMP),
        description: RString::from("Synthetic horizontal gradient"),
        properties: RampCamera::descriptors_static(),
    });
    types
}

#[sabi_extern_fn]
fn create_camera(type_name: RString, args_toml: RString) -> RResult<CameraFfiBox, FfiError> {
    if type_name.as_str() != RAMP {
        return RResult::RErr(FfiError::new(
            FfiErrorKind::Configuration,
            format!("Unknown camera type: {}", type_name),
        ));
    }
    match RampConfig::parse(args_toml.as_str()) {
        Ok(config) => RResult::ROk(CameraFfi_TO::from_value(RampCamera::new(config), TD_Opaque)),
        Err(e) => RResult::RErr(e),
    }
}

// =============================================================================
// Ramp Camera
// =============================================================================

/// Constructor arguments for the ramp camera.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RampConfig {
    /// Sensor width in pixels
    pub width: u32,
    /// Sensor height in pixels
    pub height: u32,
    /// 8 or 16
    pub bitdepth: u32,
    /// Initial ramp step
    pub step: u32,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 64,
            bitdepth: 8,
            step: 1,
        }
    }
}

impl RampConfig {
    /// Parse and check TOML constructor arguments.
    pub fn parse(text: &str) -> Result<Self, FfiError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| FfiError::new(FfiErrorKind::Configuration, e.to_string()))?;
        if config.width == 0 || config.height == 0 {
            return Err(FfiError::new(
                FfiErrorKind::Configuration,
                "width and height must be non-zero",
            ));
        }
        if !matches!(config.bitdepth, 8 | 16) {
            return Err(FfiError::new(
                FfiErrorKind::Configuration,
                format!("bitdepth must be 8 or 16, got {}", config.bitdepth),
            ));
        }
        Ok(config)
    }
}

/// Synthetic gradient camera.
pub struct RampCamera {
    config: RampConfig,
    step: Mutex<u32>,
}

impl RampCamera {
    /// Camera with the given sensor.
    pub fn new(config: RampConfig) -> Self {
        let step = Mutex::new(config.step);
        Self { config, step }
    }

    fn descriptors_static() -> RVec<FfiPropertyDescriptor> {
        [PropertyDescriptor::new(RAMP_STEP, ValueType::UInt)
            .with_description("Pixels the gradient moves per frame")
            .with_units("px")
            .with_default(1u32)
            .with_range(0u32, 1024u32)
            .writable_while_recording()]
        .iter()
        .map(FfiPropertyDescriptor::from)
        .collect()
    }

    fn render(&self, request: &FfiCaptureRequest) -> RVec<u8> {
        let max = (1u64 << request.bit_depth) - 1;
        let shift = request.sequence_number * u64::from(*self.step.lock());
        let mut data = RVec::with_capacity(request.frame_size());
        for _ in 0..request.height {
            for x in 0..request.width {
                let column = u64::from(request.roi_x + x) + shift;
                let value = column % u64::from(self.config.width) * max / u64::from(self.config.width.max(2) - 1);
                match request.bit_depth {
                    8 => data.push(value as u8),
                    _ => data.extend_from_slice(&(value as u16).to_le_bytes()),
                }
            }
        }
        data
    }
}

impl CameraFfi for RampCamera {
    fn type_name(&self) -> RString {
        RString::from(RAMP)
    }

    fn descriptors(&self) -> RVec<FfiPropertyDescriptor> {
        Self::descriptors_static()
    }

    fn initial_values(&self) -> RVec<FfiPropertyPair> {
        let c = &self.config;
        vec![
            FfiPropertyPair::new(names::NAME, "ramp camera"),
            FfiPropertyPair::new(names::SENSOR_WIDTH, c.width),
            FfiPropertyPair::new(names::SENSOR_HEIGHT, c.height),
            FfiPropertyPair::new(names::SENSOR_BITDEPTH, c.bitdepth),
            FfiPropertyPair::new(names::ROI_WIDTH, c.width),
            FfiPropertyPair::new(names::ROI_HEIGHT, c.height),
            FfiPropertyPair::new(RAMP_STEP, c.step),
        ]
        .into()
    }

    fn apply_property(
        &self,
        name: RString,
        value: FfiPropertyValue,
    ) -> FfiResult<RVec<FfiPropertyPair>> {
        let c = &self.config;
        match (name.as_str(), value) {
            (RAMP_STEP, FfiPropertyValue::UInt(step)) => *self.step.lock() = step,
            (names::ROI_X, FfiPropertyValue::UInt(v)) | (names::ROI_WIDTH, FfiPropertyValue::UInt(v))
                if v > c.width =>
            {
                return RResult::RErr(FfiError::new(
                    FfiErrorKind::InvalidParameter,
                    format!("{} {} exceeds sensor width {}", name, v, c.width),
                ))
            }
            (names::ROI_Y, FfiPropertyValue::UInt(v)) | (names::ROI_HEIGHT, FfiPropertyValue::UInt(v))
                if v > c.height =>
            {
                return RResult::RErr(FfiError::new(
                    FfiErrorKind::InvalidParameter,
                    format!("{} {} exceeds sensor height {}", name, v, c.height),
                ))
            }
            _ => {}
        }
        RResult::ROk(RVec::new())
    }

    fn arm(&self, request: FfiArmRequest) -> FfiResult<()> {
        let c = &self.config;
        if request.bit_depth != c.bitdepth
            || request.roi_x + request.width > c.width
            || request.roi_y + request.height > c.height
        {
            return RResult::RErr(FfiError::new(
                FfiErrorKind::InvalidParameter,
                format!(
                    "ROI {}x{}+{}+{} at {} bits does not fit the {}x{} {}-bit sensor",
                    request.width,
                    request.height,
                    request.roi_x,
                    request.roi_y,
                    request.bit_depth,
                    c.width,
                    c.height,
                    c.bitdepth
                ),
            ));
        }
        RResult::ROk(())
    }

    fn disarm(&self) -> FfiResult<()> {
        RResult::ROk(())
    }

    fn capture(&self, request: FfiCaptureRequest) -> FfiResult<RVec<u8>> {
        let wait = match TriggerSource::from(request.trigger_source) {
            TriggerSource::Auto if request.frames_per_second > 0.0 => {
                Duration::try_from_secs_f64(1.0 / request.frames_per_second)
                    .unwrap_or(Duration::ZERO)
                    .max(request.exposure())
            }
            _ => request.exposure(),
        };
        std::thread::sleep(wait);
        RResult::ROk(self.render(&request))
    }

    fn wait_external_trigger(&self, timeout_ms: u64) -> bool {
        // No trigger input on a synthetic sensor.
        std::thread::sleep(Duration::from_millis(timeout_ms));
        false
    }
}
