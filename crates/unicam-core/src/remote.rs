//! Remote-control surface.
//!
//! A device proxy exposes a camera as named commands (`Start`, `Stop`,
//! `Trigger`) and attributes (every property, plus `image`). Errors travel as
//! [`DevFailed`] with the stable fault code of the underlying
//! [`CameraError`], so a client can react without parsing messages. An error
//! never invalidates the proxy.
//!
//! Only the in-process [`LocalDeviceProxy`] ships here; network transports
//! implement [`DeviceProxy`] on top of their own wire format.

use crate::camera::Camera;
use crate::error::{CameraError, FaultCode, Lookup};
use crate::frame::FrameGeometry;
use crate::property::{PropertyDescriptor, PropertyValue, ValueType};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Attribute that performs a synchronous grab when read.
pub const IMAGE_ATTRIBUTE: &str = "image";

/// Remote commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `Camera::start`
    Start,
    /// `Camera::stop`
    Stop,
    /// `Camera::trigger`
    Trigger,
}

impl std::str::FromStr for Command {
    type Err = DevFailed;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "stop" => Ok(Command::Stop),
            "trigger" => Ok(Command::Trigger),
            _ => Err(CameraError::NotFound {
                kind: Lookup::Command,
                name: s.to_string(),
            }
            .into()),
        }
    }
}

/// Value exchanged over the remote surface.
///
/// Integers travel as `Long`, floats as `Double`, enums as their label.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Boolean
    Bool(bool),
    /// Any integer
    Long(i64),
    /// Any float
    Double(f64),
    /// String or enum label
    String(String),
    /// A grabbed frame
    Image {
        /// Pixel geometry
        geometry: FrameGeometry,
        /// Sequence number in the session
        sequence_number: u64,
        /// Pixel bytes
        data: Vec<u8>,
    },
}

impl AttributeValue {
    /// Convert a property value for transport.
    pub fn from_property(descriptor: &PropertyDescriptor, value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(v) => AttributeValue::Bool(*v),
            PropertyValue::Int(_) | PropertyValue::UInt(_) | PropertyValue::Long(_) => {
                AttributeValue::Long(value.as_i64().unwrap_or_default())
            }
            PropertyValue::Float(_) | PropertyValue::Double(_) => {
                AttributeValue::Double(value.as_f64().unwrap_or_default())
            }
            PropertyValue::String(v) => AttributeValue::String(v.clone()),
            PropertyValue::Enum(_) => AttributeValue::String(descriptor.render(value)),
        }
    }

    /// Convert a transported value to the descriptor's type.
    pub fn into_property(self, descriptor: &PropertyDescriptor) -> Result<PropertyValue, CameraError> {
        let out_of_range = |value: String| CameraError::OutOfRange {
            property: descriptor.name.clone(),
            value,
            reason: format!("does not fit {}", descriptor.value_type),
        };
        let mismatch = |found: ValueType| CameraError::TypeMismatch {
            property: descriptor.name.clone(),
            expected: descriptor.value_type,
            found,
        };

        match (self, descriptor.value_type) {
            (AttributeValue::Bool(v), ValueType::Bool) => Ok(PropertyValue::Bool(v)),
            (AttributeValue::Long(v), ValueType::Int) => i32::try_from(v)
                .map(PropertyValue::Int)
                .map_err(|_| out_of_range(v.to_string())),
            (AttributeValue::Long(v), ValueType::UInt) => u32::try_from(v)
                .map(PropertyValue::UInt)
                .map_err(|_| out_of_range(v.to_string())),
            (AttributeValue::Long(v), ValueType::Long) => Ok(PropertyValue::Long(v)),
            (AttributeValue::Long(v), ValueType::Enum) => i32::try_from(v)
                .map(PropertyValue::Enum)
                .map_err(|_| out_of_range(v.to_string())),
            (AttributeValue::Long(v), ValueType::Double) => Ok(PropertyValue::Double(v as f64)),
            (AttributeValue::Long(v), ValueType::Float) => Ok(PropertyValue::Float(v as f32)),
            (AttributeValue::Double(v), ValueType::Double) => Ok(PropertyValue::Double(v)),
            (AttributeValue::Double(v), ValueType::Float) => Ok(PropertyValue::Float(v as f32)),
            (AttributeValue::String(s), _) => PropertyValue::parse(descriptor, &s),
            (AttributeValue::Bool(_), _) => Err(mismatch(ValueType::Bool)),
            (AttributeValue::Long(_), _) => Err(mismatch(ValueType::Long)),
            (AttributeValue::Double(_), _) => Err(mismatch(ValueType::Double)),
            (AttributeValue::Image { .. }, _) => Err(CameraError::NotWritable(IMAGE_ATTRIBUTE.into())),
        }
    }

    /// Pixel bytes, for `Image` values.
    pub fn as_image(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Image { data, .. } => Some(data),
            _ => None,
        }
    }
}

/// Error reported by a device proxy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} [{code}]: {description}")]
pub struct DevFailed {
    /// Stable fault code of the camera error
    pub code: FaultCode,
    /// Short reason, e.g. `"Timeout"`
    pub reason: String,
    /// Full message
    pub description: String,
}

impl From<CameraError> for DevFailed {
    fn from(err: CameraError) -> Self {
        Self {
            code: err.fault_code(),
            reason: err.reason().to_string(),
            description: err.to_string(),
        }
    }
}

/// A camera behind a command/attribute interface.
#[async_trait]
pub trait DeviceProxy: Send + Sync {
    /// Run a command: `Start`, `Stop` or `Trigger`.
    async fn command(&self, name: &str) -> Result<(), DevFailed>;

    /// Read a property, or grab a frame for `image`.
    async fn read_attribute(&self, name: &str) -> Result<AttributeValue, DevFailed>;

    /// Write a property.
    async fn write_attribute(&self, name: &str, value: AttributeValue) -> Result<(), DevFailed>;

    /// Names of all attributes.
    fn attribute_names(&self) -> Vec<String>;
}

/// Proxy that calls straight into a [`Camera`] in the same process.
#[derive(Debug, Clone)]
pub struct LocalDeviceProxy {
    camera: Arc<Camera>,
}

impl LocalDeviceProxy {
    /// Wrap a camera.
    pub fn new(camera: Arc<Camera>) -> Self {
        Self { camera }
    }

    /// The wrapped camera.
    pub fn camera(&self) -> &Arc<Camera> {
        &self.camera
    }
}

#[async_trait]
impl DeviceProxy for LocalDeviceProxy {
    async fn command(&self, name: &str) -> Result<(), DevFailed> {
        let result = match name.parse::<Command>()? {
            Command::Start => self.camera.start().await,
            Command::Stop => self.camera.stop().await,
            Command::Trigger => self.camera.trigger().await,
        };
        result.map_err(DevFailed::from)
    }

    async fn read_attribute(&self, name: &str) -> Result<AttributeValue, DevFailed> {
        if name == IMAGE_ATTRIBUTE {
            let frame = self.camera.grab().await?;
            return Ok(AttributeValue::Image {
                geometry: frame.geometry(),
                sequence_number: frame.sequence_number(),
                data: frame.to_vec(),
            });
        }
        let descriptor = self.camera.get_descriptor(name)?;
        let value = self.camera.get(name)?;
        Ok(AttributeValue::from_property(descriptor, &value))
    }

    async fn write_attribute(&self, name: &str, value: AttributeValue) -> Result<(), DevFailed> {
        if name == IMAGE_ATTRIBUTE {
            return Err(CameraError::NotWritable(name.to_string()).into());
        }
        let value = value.into_property(self.camera.get_descriptor(name)?)?;
        self.camera.set(name, value).await.map_err(DevFailed::from)
    }

    fn attribute_names(&self) -> Vec<String> {
        self.camera
            .enumerate()
            .iter()
            .map(|d| d.name.clone())
            .chain(std::iter::once(IMAGE_ATTRIBUTE.to_string()))
            .collect()
    }
}
