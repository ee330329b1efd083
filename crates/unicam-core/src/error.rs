//! Error types for the camera layer.
//!
//! `CameraError` is the single error type returned by the property system, the
//! camera contract and the acquisition engine. It is `Clone` because a fatal
//! acquisition fault is stored and handed to every later delivery attempt.
//!
//! ## Error Hierarchy
//!
//! - **Lookup**: `NotFound`, `DuplicateName`
//! - **Property validation**: `TypeMismatch`, `OutOfRange`, `NotWritable`, `NotReadable`
//! - **Hardware layer**: `BackendInit`, `HardwareRejected`, `DeviceUnavailable`,
//!   `HardwareFault`. Each wraps a backend-specific [`DriverError`].
//! - **Acquisition control**: `InvalidTriggerMode`, `AlreadyRecording`, `NotRecording`,
//!   `NoFrameCallback`, `Timeout`, `Cancelled`, `EndOfStream`
//! - **Configuration**: `Config`
//!
//! Every variant maps to a stable numeric [`FaultCode`] so remote surfaces can
//! transport errors without string matching.

use crate::property::ValueType;
use crate::trigger::TriggerSource;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a backend-specific failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device could not be brought online
    Initialization,
    /// Invalid constructor arguments
    Configuration,
    /// Link to the device lost or unreliable
    Communication,
    /// Device reported a fault
    Hardware,
    /// A single frame transfer failed; the device itself is fine
    Transfer,
    /// Device did not answer in time
    Timeout,
    /// Access denied or device claimed by another process
    Permission,
    /// Device refused a parameter value
    InvalidParameter,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Transfer => "transfer",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::Permission => "permission",
            DriverErrorKind::InvalidParameter => "invalid_parameter",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// Backend-specific cause carried by the hardware-layer variants of [`CameraError`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Backend type that raised the error
    pub driver_type: String,
    /// Failure category
    pub kind: DriverErrorKind,
    /// Backend message
    pub message: String,
}

impl DriverError {
    /// Create a new driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }

    /// Whether the failure only cost the current frame.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, DriverErrorKind::Transfer | DriverErrorKind::Timeout)
    }

    /// Wrap as a refused property push.
    pub fn rejected(self, property: impl Into<String>) -> CameraError {
        CameraError::HardwareRejected {
            property: property.into(),
            cause: self,
        }
    }

    /// Wrap as a lost link when the kind says so, otherwise as a device fault.
    pub fn into_camera_error(self) -> CameraError {
        match self.kind {
            DriverErrorKind::Communication | DriverErrorKind::Permission => {
                CameraError::DeviceUnavailable(self)
            }
            _ => CameraError::HardwareFault(self),
        }
    }
}

impl From<DriverError> for CameraError {
    fn from(err: DriverError) -> Self {
        err.into_camera_error()
    }
}

// =============================================================================
// Camera Errors
// =============================================================================

/// What a `NotFound` lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// A registered backend
    Backend,
    /// A property of a camera type
    Property,
    /// A remote command
    Command,
}

impl std::fmt::Display for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Backend => write!(f, "backend"),
            Lookup::Property => write!(f, "property"),
            Lookup::Command => write!(f, "command"),
        }
    }
}

/// Convenience alias for results using [`CameraError`].
pub type Result<T> = std::result::Result<T, CameraError>;

/// Errors raised by cameras, their properties and the acquisition engine.
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    /// Unknown backend, property or command.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// What was looked up
        kind: Lookup,
        /// Requested name
        name: String,
    },

    /// A backend or property name was registered twice.
    #[error("'{0}' is already registered")]
    DuplicateName(String),

    /// Value type does not match the descriptor.
    #[error("property '{property}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Property name
        property: String,
        /// Descriptor type
        expected: ValueType,
        /// Offered type
        found: ValueType,
    },

    /// Value outside the descriptor range or enum set.
    #[error("value {value} for property '{property}' is out of range ({reason})")]
    OutOfRange {
        /// Property name
        property: String,
        /// Offered value, rendered
        value: String,
        /// Allowed range or set, rendered
        reason: String,
    },

    /// Property is read-only, or not writable while recording.
    #[error("property '{0}' is not writable")]
    NotWritable(String),

    /// Property is write-only.
    #[error("property '{0}' is not readable")]
    NotReadable(String),

    /// The factory could not bring the device online.
    #[error("backend '{backend}' failed to initialize: {cause}")]
    BackendInit {
        /// Registry name of the backend
        backend: String,
        /// Backend-specific cause
        cause: DriverError,
    },

    /// The device refused a property value pushed to it.
    #[error("hardware rejected property '{property}': {cause}")]
    HardwareRejected {
        /// Property name
        property: String,
        /// Backend-specific cause
        cause: DriverError,
    },

    /// The hardware link is gone.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(DriverError),

    /// The device reported a fault during acquisition.
    #[error("hardware fault: {0}")]
    HardwareFault(DriverError),

    /// `trigger()` called while the trigger source is not software.
    #[error("software trigger not allowed with trigger source '{current}'")]
    InvalidTriggerMode {
        /// Configured trigger source
        current: TriggerSource,
    },

    /// `start()` called while recording.
    #[error("camera is already recording")]
    AlreadyRecording,

    /// Operation requires a recording camera.
    #[error("camera is not recording")]
    NotRecording,

    /// Asynchronous transfer requested without a frame callback.
    #[error("asynchronous transfer enabled but no frame callback registered")]
    NoFrameCallback,

    /// No frame within the allowed interval.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Wait interrupted by `stop()`.
    #[error("operation cancelled by stop")]
    Cancelled,

    /// A replaying backend has no more frames.
    #[error("end of stream")]
    EndOfStream,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Stable numeric code for each [`CameraError`] variant.
pub type FaultCode = u32;

impl CameraError {
    /// Shorthand for an unknown property.
    pub fn property_not_found(name: impl Into<String>) -> Self {
        CameraError::NotFound {
            kind: Lookup::Property,
            name: name.into(),
        }
    }

    /// Shorthand for an unknown backend.
    pub fn backend_not_found(name: impl Into<String>) -> Self {
        CameraError::NotFound {
            kind: Lookup::Backend,
            name: name.into(),
        }
    }

    /// Numeric code used by remote error transports.
    pub fn fault_code(&self) -> FaultCode {
        match self {
            CameraError::NotFound { .. } => 1,
            CameraError::DuplicateName(_) => 2,
            CameraError::TypeMismatch { .. } => 3,
            CameraError::OutOfRange { .. } => 4,
            CameraError::NotWritable(_) => 5,
            CameraError::NotReadable(_) => 6,
            CameraError::BackendInit { .. } => 10,
            CameraError::HardwareRejected { .. } => 11,
            CameraError::DeviceUnavailable(_) => 12,
            CameraError::HardwareFault(_) => 13,
            CameraError::InvalidTriggerMode { .. } => 20,
            CameraError::AlreadyRecording => 21,
            CameraError::NotRecording => 22,
            CameraError::NoFrameCallback => 23,
            CameraError::Timeout(_) => 24,
            CameraError::Cancelled => 25,
            CameraError::EndOfStream => 26,
            CameraError::Config(_) => 30,
        }
    }

    /// Short machine-readable reason, paired with [`CameraError::fault_code`].
    pub fn reason(&self) -> &'static str {
        match self {
            CameraError::NotFound { .. } => "NotFound",
            CameraError::DuplicateName(_) => "DuplicateName",
            CameraError::TypeMismatch { .. } => "TypeMismatch",
            CameraError::OutOfRange { .. } => "OutOfRange",
            CameraError::NotWritable(_) => "NotWritable",
            CameraError::NotReadable(_) => "NotReadable",
            CameraError::BackendInit { .. } => "BackendInitError",
            CameraError::HardwareRejected { .. } => "HardwareRejected",
            CameraError::DeviceUnavailable(_) => "DeviceUnavailable",
            CameraError::HardwareFault(_) => "HardwareFault",
            CameraError::InvalidTriggerMode { .. } => "InvalidTriggerMode",
            CameraError::AlreadyRecording => "AlreadyRecording",
            CameraError::NotRecording => "NotRecording",
            CameraError::NoFrameCallback => "NoFrameCallback",
            CameraError::Timeout(_) => "Timeout",
            CameraError::Cancelled => "Cancelled",
            CameraError::EndOfStream => "EndOfStream",
            CameraError::Config(_) => "ConfigError",
        }
    }

    /// Whether an acquisition loop may continue after this error.
    ///
    /// Transient errors cost one frame (counted as dropped). Anything else ends
    /// the recording session.
    pub fn is_transient(&self) -> bool {
        match self {
            CameraError::HardwareFault(cause) => cause.is_transient(),
            CameraError::Timeout(_) => true,
            _ => false,
        }
    }
}
