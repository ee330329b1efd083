//! Typed, introspectable camera properties.
//!
//! Properties are split into two layers:
//!
//! - [`DescriptorTable`]: static metadata per camera *type* (name, value type,
//!   default, range, enum labels, access). Built once, validated, and shared
//!   read-only by every instance through an `Arc`.
//! - [`PropertyStore`]: the current values of one camera *instance*, guarded by a
//!   `parking_lot::RwLock`. Every write goes through the same validation path, so
//!   each backend gets type, range and access checks for free.
//!
//! # Example
//!
//! ```
//! use unicam_core::property::{DescriptorTable, PropertyDescriptor, PropertyStore, ValueType};
//!
//! let table = DescriptorTable::builder()
//!     .property(
//!         PropertyDescriptor::new("exposure_time", ValueType::Double)
//!             .with_description("Exposure time in seconds")
//!             .with_units("s")
//!             .with_default(0.01)
//!             .with_range(0.0001, 10.0),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let store = PropertyStore::new(table);
//! assert!(store.set("exposure_time", 20.0.into()).is_err());
//! assert_eq!(store.get_f64("exposure_time").unwrap(), 0.01);
//! ```
//!
//! # Base Properties
//!
//! [`base_descriptors`] returns the attributes every camera exposes (sensor
//! geometry, ROI, exposure, trigger source, delivery mode). Backends start
//! from that set with [`DescriptorTableBuilder::with_base`] and override
//! entries by name where their hardware differs.

use crate::error::{CameraError, Result};
use crate::trigger::TriggerSource;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Well-known property names shared by all backends.
pub mod names {
    /// Backend display name
    pub const NAME: &str = "name";
    /// Sensor width in pixels
    pub const SENSOR_WIDTH: &str = "sensor_width";
    /// Sensor height in pixels
    pub const SENSOR_HEIGHT: &str = "sensor_height";
    /// Bits per pixel
    pub const SENSOR_BITDEPTH: &str = "sensor_bitdepth";
    /// Exposure time in seconds
    pub const EXPOSURE_TIME: &str = "exposure_time";
    /// ROI horizontal offset
    pub const ROI_X: &str = "roi_x";
    /// ROI vertical offset
    pub const ROI_Y: &str = "roi_y";
    /// ROI width
    pub const ROI_WIDTH: &str = "roi_width";
    /// ROI height
    pub const ROI_HEIGHT: &str = "roi_height";
    /// Trigger source enum
    pub const TRIGGER_SOURCE: &str = "trigger_source";
    /// Free-run frame rate
    pub const FRAMES_PER_SECOND: &str = "frames_per_second";
    /// Whether the device can stream continuously
    pub const HAS_STREAMING: &str = "has_streaming";
    /// Push delivery through a frame callback
    pub const TRANSFER_ASYNCHRONOUSLY: &str = "transfer_asynchronously";
    /// Engine-reported recording flag
    pub const IS_RECORDING: &str = "is_recording";
}

// =============================================================================
// Values
// =============================================================================

/// Type of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Boolean flag
    Bool,
    /// 32-bit signed integer
    Int,
    /// 32-bit unsigned integer
    UInt,
    /// 64-bit signed integer
    Long,
    /// Single-precision float
    Float,
    /// Double-precision float
    Double,
    /// UTF-8 string
    String,
    /// Labeled integer from a fixed set
    Enum,
}

impl ValueType {
    /// Whether `with_range` applies to this type.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueType::Int | ValueType::UInt | ValueType::Long | ValueType::Float | ValueType::Double
        )
    }
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::UInt => "uint",
            ValueType::Long => "long",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Enum => "enum",
        };
        f.write_str(label)
    }
}

/// A typed property value.
///
/// `PartialOrd` is only meaningful between values of the same variant, which is
/// all range validation ever compares.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum PropertyValue {
    /// Boolean flag
    Bool(bool),
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit unsigned integer
    UInt(u32),
    /// 64-bit signed integer
    Long(i64),
    /// Single-precision float
    Float(f32),
    /// Double-precision float
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Enum value (see the descriptor's enum table for labels)
    Enum(i32),
}

impl PropertyValue {
    /// Runtime type of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            PropertyValue::Bool(_) => ValueType::Bool,
            PropertyValue::Int(_) => ValueType::Int,
            PropertyValue::UInt(_) => ValueType::UInt,
            PropertyValue::Long(_) => ValueType::Long,
            PropertyValue::Float(_) => ValueType::Float,
            PropertyValue::Double(_) => ValueType::Double,
            PropertyValue::String(_) => ValueType::String,
            PropertyValue::Enum(_) => ValueType::Enum,
        }
    }

    /// Zero value of a type.
    pub fn zero(value_type: ValueType) -> Self {
        match value_type {
            ValueType::Bool => PropertyValue::Bool(false),
            ValueType::Int => PropertyValue::Int(0),
            ValueType::UInt => PropertyValue::UInt(0),
            ValueType::Long => PropertyValue::Long(0),
            ValueType::Float => PropertyValue::Float(0.0),
            ValueType::Double => PropertyValue::Double(0.0),
            ValueType::String => PropertyValue::String(String::new()),
            ValueType::Enum => PropertyValue::Enum(0),
        }
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Unsigned payload.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            PropertyValue::UInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Any integer payload widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) | PropertyValue::Enum(v) => Some(i64::from(*v)),
            PropertyValue::UInt(v) => Some(i64::from(*v)),
            PropertyValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point payload widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(f64::from(*v)),
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Enum payload.
    pub fn as_enum(&self) -> Option<i32> {
        match self {
            PropertyValue::Enum(v) => Some(*v),
            _ => None,
        }
    }

    /// Parse text into a value of the descriptor's type.
    ///
    /// Enum properties accept either a label (case-insensitive) or the numeric
    /// value. Parsing does not check range; that happens on `set`.
    pub fn parse(descriptor: &PropertyDescriptor, text: &str) -> Result<Self> {
        let text = text.trim();
        let mismatch = || CameraError::TypeMismatch {
            property: descriptor.name.clone(),
            expected: descriptor.value_type,
            found: ValueType::String,
        };
        let value = match descriptor.value_type {
            ValueType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => PropertyValue::Bool(true),
                "false" | "0" | "no" | "off" => PropertyValue::Bool(false),
                _ => return Err(mismatch()),
            },
            ValueType::Int => PropertyValue::Int(text.parse().map_err(|_| mismatch())?),
            ValueType::UInt => PropertyValue::UInt(text.parse().map_err(|_| mismatch())?),
            ValueType::Long => PropertyValue::Long(text.parse().map_err(|_| mismatch())?),
            ValueType::Float => PropertyValue::Float(text.parse().map_err(|_| mismatch())?),
            ValueType::Double => PropertyValue::Double(text.parse().map_err(|_| mismatch())?),
            ValueType::String => PropertyValue::String(text.to_string()),
            ValueType::Enum => {
                if let Some(entry) = descriptor
                    .enum_values
                    .iter()
                    .find(|e| e.label.eq_ignore_ascii_case(text))
                {
                    PropertyValue::Enum(entry.value)
                } else if let Ok(value) = text.parse::<i32>() {
                    PropertyValue::Enum(value)
                } else {
                    return Err(CameraError::OutOfRange {
                        property: descriptor.name.clone(),
                        value: text.to_string(),
                        reason: format!("one of {}", descriptor.enum_labels().join(", ")),
                    });
                }
            }
        };
        Ok(value)
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::UInt(v) => write!(f, "{}", v),
            PropertyValue::Long(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::String(v) => write!(f, "{}", v),
            PropertyValue::Enum(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(v: $ty) -> Self {
                    PropertyValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<TriggerSource> for PropertyValue {
    fn from(v: TriggerSource) -> Self {
        PropertyValue::Enum(v.value())
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// One labeled member of an enum property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    /// Numeric value stored in the property
    pub value: i32,
    /// Human-readable label
    pub label: String,
}

impl EnumValue {
    /// Create an enum member.
    pub fn new(value: i32, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

/// Access mode of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Readable, not writable through `set`
    ReadOnly,
    /// Readable and writable
    ReadWrite,
    /// Writable, not readable
    WriteOnly,
}

impl Access {
    /// Whether `get` is allowed.
    pub fn is_readable(self) -> bool {
        !matches!(self, Access::WriteOnly)
    }

    /// Whether `set` is allowed.
    pub fn is_writable(self) -> bool {
        !matches!(self, Access::ReadOnly)
    }

    /// Two-letter tag used in tabular listings.
    pub fn short(self) -> &'static str {
        match self {
            Access::ReadOnly => "RO",
            Access::ReadWrite => "RW",
            Access::WriteOnly => "WO",
        }
    }
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::ReadOnly => f.write_str("Read-only"),
            Access::ReadWrite => f.write_str("Read / Write"),
            Access::WriteOnly => f.write_str("Write-only"),
        }
    }
}

/// Static metadata describing one camera attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Unique property name
    pub name: String,
    /// Value type
    pub value_type: ValueType,
    /// Human-readable description
    pub description: String,
    /// Physical units, if any
    pub units: Option<String>,
    /// Initial value; the zero value of the type when absent
    pub default_value: Option<PropertyValue>,
    /// Inclusive bounds for numeric types
    pub range: Option<(PropertyValue, PropertyValue)>,
    /// Ordered members for enum types
    pub enum_values: Vec<EnumValue>,
    /// Access mode
    pub access: Access,
    /// Whether `set` is allowed while the camera is recording
    pub writable_while_recording: bool,
}

impl PropertyDescriptor {
    /// Create a read-write descriptor with no default, range or description.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            description: String::new(),
            units: None,
            default_value: None,
            range: None,
            enum_values: Vec::new(),
            access: Access::ReadWrite,
            writable_while_recording: false,
        }
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder method to set the units.
    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Builder method to set the default value.
    pub fn with_default(mut self, value: impl Into<PropertyValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Builder method to set inclusive bounds.
    pub fn with_range(mut self, min: impl Into<PropertyValue>, max: impl Into<PropertyValue>) -> Self {
        self.range = Some((min.into(), max.into()));
        self
    }

    /// Builder method to set the enum table.
    pub fn with_enum_values(mut self, values: Vec<EnumValue>) -> Self {
        self.enum_values = values;
        self
    }

    /// Builder method to make the property read-only.
    pub fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    /// Builder method to make the property write-only.
    pub fn write_only(mut self) -> Self {
        self.access = Access::WriteOnly;
        self
    }

    /// Builder method to allow writes while recording.
    pub fn writable_while_recording(mut self) -> Self {
        self.writable_while_recording = true;
        self
    }

    /// Value a fresh store starts with.
    pub fn initial_value(&self) -> PropertyValue {
        match (&self.default_value, self.value_type) {
            (Some(value), _) => value.clone(),
            (None, ValueType::Enum) => self
                .enum_values
                .first()
                .map(|e| PropertyValue::Enum(e.value))
                .unwrap_or(PropertyValue::Enum(0)),
            (None, ty) => PropertyValue::zero(ty),
        }
    }

    /// Label of an enum value.
    pub fn enum_label(&self, value: i32) -> Option<&str> {
        self.enum_values
            .iter()
            .find(|e| e.value == value)
            .map(|e| e.label.as_str())
    }

    /// All enum labels in order.
    pub fn enum_labels(&self) -> Vec<&str> {
        self.enum_values.iter().map(|e| e.label.as_str()).collect()
    }

    /// Render a value for humans, using enum labels where available.
    pub fn render(&self, value: &PropertyValue) -> String {
        match value {
            PropertyValue::Enum(v) => self
                .enum_label(*v)
                .map(str::to_string)
                .unwrap_or_else(|| v.to_string()),
            other => other.to_string(),
        }
    }

    /// Check a candidate value against type, enum membership and range.
    pub fn validate_value(&self, value: &PropertyValue) -> Result<()> {
        if value.value_type() != self.value_type {
            return Err(CameraError::TypeMismatch {
                property: self.name.clone(),
                expected: self.value_type,
                found: value.value_type(),
            });
        }

        if let PropertyValue::Enum(v) = value {
            if !self.enum_values.is_empty() && self.enum_label(*v).is_none() {
                return Err(CameraError::OutOfRange {
                    property: self.name.clone(),
                    value: v.to_string(),
                    reason: format!("one of {}", self.enum_labels().join(", ")),
                });
            }
        }

        if let Some((min, max)) = &self.range {
            let inside = matches!(
                (value.partial_cmp(min), value.partial_cmp(max)),
                (
                    Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal),
                    Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                )
            );
            if !inside {
                return Err(CameraError::OutOfRange {
                    property: self.name.clone(),
                    value: value.to_string(),
                    reason: format!("{} ≤ {} ≤ {}", min, self.name, max),
                });
            }
        }

        Ok(())
    }

    /// Check the descriptor itself: bounds and default must be consistent.
    fn check(&self) -> Result<()> {
        if let Some((min, max)) = &self.range {
            if !self.value_type.is_numeric() {
                return Err(CameraError::Config(format!(
                    "property '{}': range given for non-numeric type {}",
                    self.name, self.value_type
                )));
            }
            for bound in [min, max] {
                if bound.value_type() != self.value_type {
                    return Err(CameraError::TypeMismatch {
                        property: self.name.clone(),
                        expected: self.value_type,
                        found: bound.value_type(),
                    });
                }
            }
            if !matches!(
                min.partial_cmp(max),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ) {
                return Err(CameraError::Config(format!(
                    "property '{}': min {} is greater than max {}",
                    self.name, min, max
                )));
            }
        }
        if self.value_type == ValueType::Enum && self.enum_values.is_empty() {
            return Err(CameraError::Config(format!(
                "enum property '{}' has no values",
                self.name
            )));
        }
        self.validate_value(&self.initial_value())
    }
}

/// The attributes every camera exposes.
pub fn base_descriptors() -> Vec<PropertyDescriptor> {
    vec![
        PropertyDescriptor::new(names::NAME, ValueType::String)
            .with_description("Name of the camera")
            .read_only(),
        PropertyDescriptor::new(names::SENSOR_WIDTH, ValueType::UInt)
            .with_description("Width of the sensor in pixels")
            .with_units("px")
            .read_only(),
        PropertyDescriptor::new(names::SENSOR_HEIGHT, ValueType::UInt)
            .with_description("Height of the sensor in pixels")
            .with_units("px")
            .read_only(),
        PropertyDescriptor::new(names::SENSOR_BITDEPTH, ValueType::UInt)
            .with_description("Number of bits per pixel")
            .with_default(8u32)
            .with_range(1u32, 32u32)
            .read_only(),
        PropertyDescriptor::new(names::EXPOSURE_TIME, ValueType::Double)
            .with_description("Exposure time in seconds")
            .with_units("s")
            .with_default(0.01)
            .with_range(0.0001, 10.0)
            .writable_while_recording(),
        PropertyDescriptor::new(names::ROI_X, ValueType::UInt)
            .with_description("Horizontal coordinate of the region of interest")
            .with_units("px"),
        PropertyDescriptor::new(names::ROI_Y, ValueType::UInt)
            .with_description("Vertical coordinate of the region of interest")
            .with_units("px"),
        PropertyDescriptor::new(names::ROI_WIDTH, ValueType::UInt)
            .with_description("Width of the region of interest")
            .with_units("px")
            .with_default(1u32)
            .with_range(1u32, u32::MAX),
        PropertyDescriptor::new(names::ROI_HEIGHT, ValueType::UInt)
            .with_description("Height of the region of interest")
            .with_units("px")
            .with_default(1u32)
            .with_range(1u32, u32::MAX),
        PropertyDescriptor::new(names::TRIGGER_SOURCE, ValueType::Enum)
            .with_description("What initiates each frame capture")
            .with_enum_values(TriggerSource::enum_values())
            .with_default(TriggerSource::Auto),
        PropertyDescriptor::new(names::FRAMES_PER_SECOND, ValueType::Double)
            .with_description("Frame rate when free-running")
            .with_units("Hz")
            .with_default(100.0)
            .with_range(0.01, 100_000.0)
            .writable_while_recording(),
        PropertyDescriptor::new(names::HAS_STREAMING, ValueType::Bool)
            .with_description("Whether the camera can stream frames continuously")
            .with_default(true)
            .read_only(),
        PropertyDescriptor::new(names::TRANSFER_ASYNCHRONOUSLY, ValueType::Bool)
            .with_description("Deliver frames through the registered frame callback")
            .with_default(false),
        PropertyDescriptor::new(names::IS_RECORDING, ValueType::Bool)
            .with_description("Whether the camera is currently recording")
            .with_default(false)
            .read_only(),
    ]
}

// =============================================================================
// DescriptorTable
// =============================================================================

/// Immutable, ordered set of descriptors for one camera type.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    descriptors: Vec<PropertyDescriptor>,
    index: HashMap<String, usize>,
}

impl DescriptorTable {
    /// Start building a table.
    pub fn builder() -> DescriptorTableBuilder {
        DescriptorTableBuilder::default()
    }

    /// Descriptor by name.
    pub fn get(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    /// Descriptor by name, or `NotFound`.
    pub fn descriptor(&self, name: &str) -> Result<&PropertyDescriptor> {
        self.get(name)
            .ok_or_else(|| CameraError::property_not_found(name))
    }

    /// Whether a property is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> &[PropertyDescriptor] {
        &self.descriptors
    }

    /// Property names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.name.as_str())
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Builder for [`DescriptorTable`].
#[derive(Debug, Default)]
pub struct DescriptorTableBuilder {
    descriptors: Vec<PropertyDescriptor>,
}

impl DescriptorTableBuilder {
    /// Add the [`base_descriptors`].
    pub fn with_base(mut self) -> Self {
        self.descriptors.extend(base_descriptors());
        self
    }

    /// Append a descriptor.
    pub fn property(mut self, descriptor: PropertyDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Replace the descriptor with the same name in place, or append it.
    pub fn override_property(mut self, descriptor: PropertyDescriptor) -> Self {
        match self.descriptors.iter_mut().find(|d| d.name == descriptor.name) {
            Some(slot) => *slot = descriptor,
            None => self.descriptors.push(descriptor),
        }
        self
    }

    /// Validate every descriptor and freeze the table.
    pub fn build(self) -> Result<Arc<DescriptorTable>> {
        let mut index = HashMap::with_capacity(self.descriptors.len());
        for (i, descriptor) in self.descriptors.iter().enumerate() {
            if index.insert(descriptor.name.clone(), i).is_some() {
                return Err(CameraError::DuplicateName(descriptor.name.clone()));
            }
            descriptor.check()?;
        }
        Ok(Arc::new(DescriptorTable {
            descriptors: self.descriptors,
            index,
        }))
    }
}

// =============================================================================
// PropertyStore
// =============================================================================

/// Current property values of one camera instance.
///
/// Reads and writes are guarded by a `parking_lot::RwLock`, so a value is
/// always either fully old or fully new. Callers that need to hold a property
/// across an `await` (pushing a value to hardware) take its per-property
/// async lock with [`PropertyStore::lock_property`] first.
#[derive(Debug)]
pub struct PropertyStore {
    table: Arc<DescriptorTable>,
    values: RwLock<HashMap<String, PropertyValue>>,
    write_locks: HashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl PropertyStore {
    /// Create a store seeded with every descriptor's initial value.
    pub fn new(table: Arc<DescriptorTable>) -> Self {
        let values = table
            .descriptors()
            .iter()
            .map(|d| (d.name.clone(), d.initial_value()))
            .collect();
        let write_locks = table
            .names()
            .map(|n| (n.to_string(), Arc::new(tokio::sync::Mutex::new(()))))
            .collect();
        Self {
            table,
            values: RwLock::new(values),
            write_locks,
        }
    }

    /// The shared descriptor table.
    pub fn table(&self) -> &Arc<DescriptorTable> {
        &self.table
    }

    /// Descriptors in registration order.
    pub fn enumerate(&self) -> &[PropertyDescriptor] {
        self.table.descriptors()
    }

    /// Descriptor by name.
    pub fn get_descriptor(&self, name: &str) -> Result<&PropertyDescriptor> {
        self.table.descriptor(name)
    }

    /// Current value.
    pub fn get(&self, name: &str) -> Result<PropertyValue> {
        let descriptor = self.table.descriptor(name)?;
        if !descriptor.access.is_readable() {
            return Err(CameraError::NotReadable(name.to_string()));
        }
        self.values
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| CameraError::property_not_found(name))
    }

    /// Check that `value` may be written to `name`, without writing it.
    pub fn validate(&self, name: &str, value: &PropertyValue) -> Result<()> {
        let descriptor = self.table.descriptor(name)?;
        if !descriptor.access.is_writable() {
            return Err(CameraError::NotWritable(name.to_string()));
        }
        descriptor.validate_value(value)
    }

    /// Validate and store a value.
    ///
    /// On error the stored value is unchanged.
    pub fn set(&self, name: &str, value: PropertyValue) -> Result<()> {
        self.validate(name, &value)?;
        self.commit(name, value);
        Ok(())
    }

    /// Store a value reported by hardware.
    ///
    /// Only the type is checked: access mode and range describe what clients may
    /// request, not what the device may report.
    pub fn set_reported(&self, name: &str, value: PropertyValue) -> Result<()> {
        let descriptor = self.table.descriptor(name)?;
        if value.value_type() != descriptor.value_type {
            return Err(CameraError::TypeMismatch {
                property: name.to_string(),
                expected: descriptor.value_type,
                found: value.value_type(),
            });
        }
        self.commit(name, value);
        Ok(())
    }

    pub(crate) fn commit(&self, name: &str, value: PropertyValue) {
        self.values.write().insert(name.to_string(), value);
    }

    /// Serialize writers of one property across an `await`.
    pub async fn lock_property(&self, name: &str) -> Result<tokio::sync::OwnedMutexGuard<()>> {
        let lock = self
            .write_locks
            .get(name)
            .cloned()
            .ok_or_else(|| CameraError::property_not_found(name))?;
        Ok(lock.lock_owned().await)
    }

    /// All readable values in registration order.
    pub fn snapshot(&self) -> Vec<(String, PropertyValue)> {
        let values = self.values.read();
        self.table
            .descriptors()
            .iter()
            .filter(|d| d.access.is_readable())
            .filter_map(|d| values.get(&d.name).map(|v| (d.name.clone(), v.clone())))
            .collect()
    }

    fn typed<T>(
        &self,
        name: &str,
        expected: ValueType,
        extract: impl Fn(&PropertyValue) -> Option<T>,
    ) -> Result<T> {
        let value = self.get(name)?;
        extract(&value).ok_or(CameraError::TypeMismatch {
            property: name.to_string(),
            expected,
            found: value.value_type(),
        })
    }

    /// Current value of a double property.
    pub fn get_f64(&self, name: &str) -> Result<f64> {
        self.typed(name, ValueType::Double, PropertyValue::as_f64)
    }

    /// Current value of a uint property.
    pub fn get_u32(&self, name: &str) -> Result<u32> {
        self.typed(name, ValueType::UInt, PropertyValue::as_u32)
    }

    /// Current value of a bool property.
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.typed(name, ValueType::Bool, PropertyValue::as_bool)
    }

    /// Current value of a string property.
    pub fn get_string(&self, name: &str) -> Result<String> {
        self.typed(name, ValueType::String, |v| v.as_str().map(str::to_string))
    }

    /// Current trigger source.
    pub fn trigger_source(&self) -> Result<TriggerSource> {
        let raw = self.typed(names::TRIGGER_SOURCE, ValueType::Enum, PropertyValue::as_enum)?;
        TriggerSource::from_value(raw).ok_or_else(|| CameraError::OutOfRange {
            property: names::TRIGGER_SOURCE.to_string(),
            value: raw.to_string(),
            reason: "auto, software or external".to_string(),
        })
    }
}
