//! FFI-safe camera interface using abi_stable's sabi_trait.
//!
//! Mirrors `unicam_core::CameraDriver` for cross-dylib calls. Every call is
//! synchronous on the plugin side; the host adapter moves them onto the
//! blocking pool.

#![allow(non_local_definitions)] // abi_stable's sabi_trait generates these

use abi_stable::sabi_trait;
use abi_stable::std_types::{RBox, ROption, RResult, RString, RVec};
use abi_stable::StableAbi;
use std::time::Duration;
use unicam_core::error::{CameraError, DriverError, DriverErrorKind};
use unicam_core::{
    Access, ArmRequest, CaptureRequest, EnumValue, FrameGeometry, PropertyDescriptor,
    PropertyValue, TriggerSource, ValueType,
};

// =============================================================================
// Property Types
// =============================================================================

/// FFI-safe value type (mirrors `unicam_core::ValueType`)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, StableAbi)]
pub enum FfiValueType {
    Bool = 0,
    Int = 1,
    UInt = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    String = 6,
    Enum = 7,
}

/// FFI-safe property value (mirrors `unicam_core::PropertyValue`)
#[repr(u8)]
#[derive(Debug, Clone, PartialEq, StableAbi)]
pub enum FfiPropertyValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(RString),
    Enum(i32),
}

/// FFI-safe access mode
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, StableAbi)]
pub enum FfiAccess {
    ReadOnly = 0,
    ReadWrite = 1,
    WriteOnly = 2,
}

/// One entry of an enum property's value table
#[repr(C)]
#[derive(Debug, Clone, PartialEq, StableAbi)]
pub struct FfiEnumValue {
    pub value: i32,
    pub label: RString,
}

/// Inclusive numeric range
#[repr(C)]
#[derive(Debug, Clone, PartialEq, StableAbi)]
pub struct FfiRange {
    pub min: FfiPropertyValue,
    pub max: FfiPropertyValue,
}

/// FFI-safe property descriptor.
///
/// A plugin lists only its own properties plus any base property it
/// redefines; the host merges them over the base set.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, StableAbi)]
pub struct FfiPropertyDescriptor {
    pub name: RString,
    pub value_type: FfiValueType,
    pub description: RString,
    pub units: ROption<RString>,
    pub default_value: ROption<FfiPropertyValue>,
    pub range: ROption<FfiRange>,
    pub enum_values: RVec<FfiEnumValue>,
    pub access: FfiAccess,
    pub writable_while_recording: bool,
}

/// A named property value
#[repr(C)]
#[derive(Debug, Clone, PartialEq, StableAbi)]
pub struct FfiPropertyPair {
    pub name: RString,
    pub value: FfiPropertyValue,
}

impl FfiPropertyPair {
    /// Pair a name with a value.
    pub fn new(name: &str, value: impl Into<FfiPropertyValue>) -> Self {
        Self {
            name: RString::from(name),
            value: value.into(),
        }
    }
}

/// Camera type advertised by a plugin
#[repr(C)]
#[derive(Debug, Clone, StableAbi)]
pub struct FfiCameraTypeInfo {
    pub type_name: RString,
    pub description: RString,
    pub properties: RVec<FfiPropertyDescriptor>,
}

// =============================================================================
// Acquisition Types
// =============================================================================

/// FFI-safe trigger source
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, StableAbi)]
pub enum FfiTriggerSource {
    Auto = 0,
    Software = 1,
    External = 2,
}

/// Session settings handed to `arm`
#[repr(C)]
#[derive(Debug, Clone, PartialEq, StableAbi)]
pub struct FfiArmRequest {
    pub trigger_source: FfiTriggerSource,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u32,
    pub roi_x: u32,
    pub roi_y: u32,
    pub exposure_s: f64,
    pub frames_per_second: f64,
}

/// Per-frame settings handed to `capture`
#[repr(C)]
#[derive(Debug, Clone, PartialEq, StableAbi)]
pub struct FfiCaptureRequest {
    pub sequence_number: u64,
    pub trigger_source: FfiTriggerSource,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u32,
    pub roi_x: u32,
    pub roi_y: u32,
    pub exposure_s: f64,
    pub frames_per_second: f64,
}

impl FfiCaptureRequest {
    /// Size in bytes of the frame the host expects back.
    pub fn frame_size(&self) -> usize {
        FrameGeometry::new(self.width, self.height, self.bit_depth).frame_size()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// FFI-safe error category (mirrors `DriverErrorKind`, plus end of stream)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, StableAbi)]
pub enum FfiErrorKind {
    Initialization = 0,
    Configuration = 1,
    Communication = 2,
    Hardware = 3,
    Transfer = 4,
    Timeout = 5,
    Permission = 6,
    InvalidParameter = 7,
    Unknown = 8,
    /// The source has no more frames
    EndOfStream = 9,
}

/// Error returned across the plugin boundary
#[repr(C)]
#[derive(Debug, Clone, PartialEq, StableAbi)]
pub struct FfiError {
    pub kind: FfiErrorKind,
    pub message: RString,
}

impl FfiError {
    /// Create an error of `kind`.
    pub fn new(kind: FfiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: RString::from(message.into()),
        }
    }

    /// The source ran out of frames.
    pub fn end_of_stream() -> Self {
        Self::new(FfiErrorKind::EndOfStream, "end of stream")
    }

    /// Host-side error for a plugin camera of type `driver_type`.
    pub fn into_camera_error(self, driver_type: &str) -> CameraError {
        match self.kind {
            FfiErrorKind::EndOfStream => CameraError::EndOfStream,
            _ => self.into_driver_error(driver_type).into(),
        }
    }

    /// Backend cause, for wrapping in a `CameraError` variant.
    pub fn into_driver_error(self, driver_type: &str) -> DriverError {
        let kind = match self.kind {
            FfiErrorKind::Initialization => DriverErrorKind::Initialization,
            FfiErrorKind::Configuration => DriverErrorKind::Configuration,
            FfiErrorKind::Communication => DriverErrorKind::Communication,
            FfiErrorKind::Hardware => DriverErrorKind::Hardware,
            FfiErrorKind::Transfer => DriverErrorKind::Transfer,
            FfiErrorKind::Timeout => DriverErrorKind::Timeout,
            FfiErrorKind::Permission => DriverErrorKind::Permission,
            FfiErrorKind::InvalidParameter => DriverErrorKind::InvalidParameter,
            FfiErrorKind::Unknown | FfiErrorKind::EndOfStream => DriverErrorKind::Unknown,
        };
        DriverError::new(driver_type, kind, self.message.into_string())
    }
}

impl std::fmt::Display for FfiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl From<DriverError> for FfiError {
    fn from(err: DriverError) -> Self {
        let kind = match err.kind {
            DriverErrorKind::Initialization => FfiErrorKind::Initialization,
            DriverErrorKind::Configuration => FfiErrorKind::Configuration,
            DriverErrorKind::Communication => FfiErrorKind::Communication,
            DriverErrorKind::Hardware => FfiErrorKind::Hardware,
            DriverErrorKind::Transfer => FfiErrorKind::Transfer,
            DriverErrorKind::Timeout => FfiErrorKind::Timeout,
            DriverErrorKind::Permission => FfiErrorKind::Permission,
            DriverErrorKind::InvalidParameter => FfiErrorKind::InvalidParameter,
            DriverErrorKind::Unknown => FfiErrorKind::Unknown,
        };
        Self::new(kind, err.message)
    }
}

/// FFI-safe result type for camera operations
pub type FfiResult<T> = RResult<T, FfiError>;

// =============================================================================
// Camera Trait
// =============================================================================

/// Camera implemented inside a plugin.
///
/// All methods take `&self`; implementations guard their state with their own
/// locks because the host may call `wait_external_trigger` while a property
/// write is in flight.
#[sabi_trait]
pub trait CameraFfi: Send + Sync + 'static {
    /// Camera type name, as listed by the plugin
    fn type_name(&self) -> RString;

    /// Properties beyond (or redefining) the base set
    fn descriptors(&self) -> RVec<FfiPropertyDescriptor>;

    /// Hardware-reported values stored after construction
    fn initial_values(&self) -> RVec<FfiPropertyPair>;

    /// Push a validated value to the hardware
    ///
    /// Returns follow-up values the hardware reports as a result.
    fn apply_property(
        &self,
        name: RString,
        value: FfiPropertyValue,
    ) -> FfiResult<RVec<FfiPropertyPair>>;

    /// Prepare for a recording session
    fn arm(&self, request: FfiArmRequest) -> FfiResult<()>;

    /// Release the hardware; must be idempotent
    fn disarm(&self) -> FfiResult<()>;

    /// Produce one frame of exactly `request.frame_size()` bytes
    fn capture(&self, request: FfiCaptureRequest) -> FfiResult<RVec<u8>>;

    /// Block up to `timeout_ms` for the external trigger line
    ///
    /// Returns true if the line fired.
    fn wait_external_trigger(&self, timeout_ms: u64) -> bool;
}

/// Boxed camera trait object as returned by `create_camera`
pub type CameraFfiBox = CameraFfi_TO<RBox<()>>;

// =============================================================================
// Conversions
// =============================================================================

impl From<ValueType> for FfiValueType {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::Bool => Self::Bool,
            ValueType::Int => Self::Int,
            ValueType::UInt => Self::UInt,
            ValueType::Long => Self::Long,
            ValueType::Float => Self::Float,
            ValueType::Double => Self::Double,
            ValueType::String => Self::String,
            ValueType::Enum => Self::Enum,
        }
    }
}

impl From<FfiValueType> for ValueType {
    fn from(value: FfiValueType) -> Self {
        match value {
            FfiValueType::Bool => Self::Bool,
            FfiValueType::Int => Self::Int,
            FfiValueType::UInt => Self::UInt,
            FfiValueType::Long => Self::Long,
            FfiValueType::Float => Self::Float,
            FfiValueType::Double => Self::Double,
            FfiValueType::String => Self::String,
            FfiValueType::Enum => Self::Enum,
        }
    }
}

impl From<PropertyValue> for FfiPropertyValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(v) => Self::Bool(v),
            PropertyValue::Int(v) => Self::Int(v),
            PropertyValue::UInt(v) => Self::UInt(v),
            PropertyValue::Long(v) => Self::Long(v),
            PropertyValue::Float(v) => Self::Float(v),
            PropertyValue::Double(v) => Self::Double(v),
            PropertyValue::String(v) => Self::String(RString::from(v)),
            PropertyValue::Enum(v) => Self::Enum(v),
        }
    }
}

impl From<FfiPropertyValue> for PropertyValue {
    fn from(value: FfiPropertyValue) -> Self {
        match value {
            FfiPropertyValue::Bool(v) => Self::Bool(v),
            FfiPropertyValue::Int(v) => Self::Int(v),
            FfiPropertyValue::UInt(v) => Self::UInt(v),
            FfiPropertyValue::Long(v) => Self::Long(v),
            FfiPropertyValue::Float(v) => Self::Float(v),
            FfiPropertyValue::Double(v) => Self::Double(v),
            FfiPropertyValue::String(v) => Self::String(v.into_string()),
            FfiPropertyValue::Enum(v) => Self::Enum(v),
        }
    }
}

impl From<bool> for FfiPropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u32> for FfiPropertyValue {
    fn from(value: u32) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for FfiPropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for FfiPropertyValue {
    fn from(value: &str) -> Self {
        Self::String(RString::from(value))
    }
}

impl From<Access> for FfiAccess {
    fn from(access: Access) -> Self {
        match access {
            Access::ReadOnly => Self::ReadOnly,
            Access::ReadWrite => Self::ReadWrite,
            Access::WriteOnly => Self::WriteOnly,
        }
    }
}

impl From<FfiAccess> for Access {
    fn from(access: FfiAccess) -> Self {
        match access {
            FfiAccess::ReadOnly => Self::ReadOnly,
            FfiAccess::ReadWrite => Self::ReadWrite,
            FfiAccess::WriteOnly => Self::WriteOnly,
        }
    }
}

impl From<&PropertyDescriptor> for FfiPropertyDescriptor {
    fn from(d: &PropertyDescriptor) -> Self {
        Self {
            name: RString::from(d.name.as_str()),
            value_type: d.value_type.into(),
            description: RString::from(d.description.as_str()),
            units: d.units.as_deref().map(RString::from).into(),
            default_value: d.default_value.clone().map(FfiPropertyValue::from).into(),
            range: d
                .range
                .clone()
                .map(|(min, max)| FfiRange {
                    min: min.into(),
                    max: max.into(),
                })
                .into(),
            enum_values: d
                .enum_values
                .iter()
                .map(|e| FfiEnumValue {
                    value: e.value,
                    label: RString::from(e.label.as_str()),
                })
                .collect(),
            access: d.access.into(),
            writable_while_recording: d.writable_while_recording,
        }
    }
}

impl From<FfiPropertyDescriptor> for PropertyDescriptor {
    fn from(d: FfiPropertyDescriptor) -> Self {
        let mut descriptor = PropertyDescriptor::new(d.name.into_string(), d.value_type.into())
            .with_description(d.description.into_string());
        descriptor.units = d.units.into_option().map(RString::into_string);
        descriptor.default_value = d.default_value.into_option().map(PropertyValue::from);
        descriptor.range = d
            .range
            .into_option()
            .map(|r| (PropertyValue::from(r.min), PropertyValue::from(r.max)));
        descriptor.enum_values = d
            .enum_values
            .into_iter()
            .map(|e| EnumValue::new(e.value, e.label.into_string()))
            .collect();
        descriptor.access = d.access.into();
        descriptor.writable_while_recording = d.writable_while_recording;
        descriptor
    }
}

impl From<TriggerSource> for FfiTriggerSource {
    fn from(source: TriggerSource) -> Self {
        match source {
            TriggerSource::Auto => Self::Auto,
            TriggerSource::Software => Self::Software,
            TriggerSource::External => Self::External,
        }
    }
}

impl From<FfiTriggerSource> for TriggerSource {
    fn from(source: FfiTriggerSource) -> Self {
        match source {
            FfiTriggerSource::Auto => Self::Auto,
            FfiTriggerSource::Software => Self::Software,
            FfiTriggerSource::External => Self::External,
        }
    }
}

impl From<&ArmRequest> for FfiArmRequest {
    fn from(r: &ArmRequest) -> Self {
        Self {
            trigger_source: r.trigger_source.into(),
            width: r.geometry.width,
            height: r.geometry.height,
            bit_depth: r.geometry.bit_depth,
            roi_x: r.roi_offset.0,
            roi_y: r.roi_offset.1,
            exposure_s: r.exposure.as_secs_f64(),
            frames_per_second: r.frames_per_second,
        }
    }
}

impl From<&CaptureRequest> for FfiCaptureRequest {
    fn from(r: &CaptureRequest) -> Self {
        Self {
            sequence_number: r.sequence_number,
            trigger_source: r.trigger_source.into(),
            width: r.geometry.width,
            height: r.geometry.height,
            bit_depth: r.geometry.bit_depth,
            roi_x: r.roi_offset.0,
            roi_y: r.roi_offset.1,
            exposure_s: r.exposure.as_secs_f64(),
            frames_per_second: r.frames_per_second,
        }
    }
}

impl FfiCaptureRequest {
    /// Exposure as a `Duration`; negative or non-finite values read as zero.
    pub fn exposure(&self) -> Duration {
        Duration::try_from_secs_f64(self.exposure_s).unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicam_core::property::base_descriptors;

    #[test]
    fn test_descriptor_survives_the_boundary() {
        for descriptor in base_descriptors() {
            let ffi = FfiPropertyDescriptor::from(&descriptor);
            assert_eq!(PropertyDescriptor::from(ffi), descriptor);
        }
    }

    #[test]
    fn test_end_of_stream_maps_to_camera_error() {
        assert!(matches!(
            FfiError::end_of_stream().into_camera_error("ramp"),
            CameraError::EndOfStream
        ));
        match FfiError::new(FfiErrorKind::Communication, "cable").into_camera_error("ramp") {
            CameraError::DeviceUnavailable(cause) => {
                assert_eq!(cause.driver_type, "ramp");
                assert_eq!(cause.message, "cable");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_driver_error_kind_is_preserved() {
        let err = DriverError::new("ramp", DriverErrorKind::Transfer, "crc");
        let back = FfiError::from(err.clone()).into_driver_error("ramp");
        assert_eq!(back, err);
    }
}
