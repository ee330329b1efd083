//! `unicam-core`
//!
//! Core types for the unified camera layer: typed properties, the backend
//! contract, the camera handle and its acquisition engine.
//!
//! ## Layers
//!
//! - **Properties** ([`property`]): static [`DescriptorTable`]s per camera type and a
//!   validating [`PropertyStore`] per instance
//! - **Backend contract** ([`driver`]): [`CameraDriver`] talks to hardware,
//!   [`CameraFactory`] builds drivers from TOML arguments
//! - **Camera** ([`camera`]): applies the write policy and exposes
//!   start/stop/trigger/grab
//! - **Acquisition** ([`acquisition`]): Idle/Recording state machine, pooled
//!   buffers, bounded delivery with drop counting
//! - **Remote surface** ([`remote`]): command/attribute proxy with numeric fault codes
//!
//! ## Example
//!
//! ```rust,ignore
//! let camera = registry.create("mock", toml::Value::Table(Default::default())).await?;
//! camera.set("exposure_time", 0.005.into()).await?;
//! camera.start().await?;
//! let frame = camera.grab().await?;
//! println!("frame {} ({})", frame.sequence_number(), frame.geometry());
//! camera.stop().await?;
//! ```

pub mod acquisition;
pub mod camera;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod property;
pub mod remote;
pub mod trigger;

pub use acquisition::{AcquisitionConfig, AcquisitionState, AcquisitionStats, FrameCallback};
pub use camera::Camera;
pub use driver::{ArmRequest, CameraDriver, CameraFactory, CaptureRequest, FactoryRegistry};
pub use error::{CameraError, DriverError, DriverErrorKind, Result};
pub use frame::{Frame, FrameGeometry, FrameStatistics, OwnedFrame};
pub use property::{
    Access, DescriptorTable, EnumValue, PropertyDescriptor, PropertyStore, PropertyValue,
    ValueType,
};
pub use trigger::TriggerSource;
