//! Backend contract.
//!
//! A backend is a [`CameraFactory`] that builds [`CameraDriver`]s. The driver
//! only talks to hardware: property validation, acquisition state, buffering
//! and delivery all live in [`Camera`](crate::camera::Camera) and the
//! acquisition engine, so every backend behaves the same from the outside.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! struct MyCameraFactory;
//!
//! impl CameraFactory for MyCameraFactory {
//!     fn description(&self) -> &str { "My vendor camera" }
//!
//!     fn descriptors(&self) -> Result<Arc<DescriptorTable>> { my_descriptors() }
//!
//!     fn validate(&self, args: &toml::Value) -> anyhow::Result<()> {
//!         let _: MyConfig = args.clone().try_into()?;
//!         Ok(())
//!     }
//!
//!     fn build(&self, args: toml::Value) -> BoxFuture<'static, Result<Box<dyn CameraDriver>, DriverError>> {
//!         Box::pin(async move {
//!             let cfg: MyConfig = parse_args("my_camera", args)?;
//!             Ok(Box::new(MyCamera::open(cfg).await?) as Box<dyn CameraDriver>)
//!         })
//!     }
//! }
//! ```

use crate::error::{DriverError, DriverErrorKind, Result};
use crate::frame::FrameGeometry;
use crate::property::{DescriptorTable, PropertyValue};
use crate::trigger::TriggerSource;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Settings a backend needs when recording starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmRequest {
    /// What initiates each frame
    pub trigger_source: TriggerSource,
    /// Frame geometry for the whole session
    pub geometry: FrameGeometry,
    /// ROI offset on the sensor
    pub roi_offset: (u32, u32),
    /// Exposure at start
    pub exposure: Duration,
    /// Free-run frame rate at start
    pub frames_per_second: f64,
}

/// Settings for one frame, read from the property store at the frame boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Position within the session
    pub sequence_number: u64,
    /// Frame geometry; the destination buffer holds exactly `frame_size()` bytes
    pub geometry: FrameGeometry,
    /// ROI offset on the sensor
    pub roi_offset: (u32, u32),
    /// Current exposure
    pub exposure: Duration,
    /// Current free-run frame rate
    pub frames_per_second: f64,
    /// Trigger source of the session
    pub trigger_source: TriggerSource,
}

impl CaptureRequest {
    /// Interval between free-running frames: the longer of exposure and `1 / fps`.
    pub fn frame_period(&self) -> Duration {
        let by_rate = if self.frames_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / self.frames_per_second).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        };
        self.exposure.max(by_rate)
    }
}

/// Hardware side of a camera.
///
/// All methods take `&self`; drivers keep their mutable state behind their own
/// locks. The acquisition task calls `arm`, then `capture` once per frame, and
/// always `disarm` on its way out.
#[async_trait]
pub trait CameraDriver: Send + Sync + 'static {
    /// Backend type name, e.g. `"mock"`.
    fn type_name(&self) -> &str;

    /// Static property table, shared by every instance of this type.
    fn descriptors(&self) -> Arc<DescriptorTable>;

    /// Hardware-reported values stored after construction.
    fn initial_values(&self) -> Vec<(String, PropertyValue)> {
        Vec::new()
    }

    /// Push a validated value to the hardware.
    ///
    /// Called before the value is committed; an error leaves the store
    /// untouched. Returns follow-up values the hardware reports as a result
    /// (for example a changed sensor size).
    async fn apply_property(
        &self,
        _name: &str,
        _value: &PropertyValue,
    ) -> Result<Vec<(String, PropertyValue)>> {
        Ok(Vec::new())
    }

    /// Prepare the hardware for a recording session.
    async fn arm(&self, request: &ArmRequest) -> Result<()>;

    /// Release the hardware after a session. Must be idempotent.
    async fn disarm(&self) -> Result<()>;

    /// Fill `buffer` with one frame.
    async fn capture(&self, request: &CaptureRequest, buffer: &mut [u8]) -> Result<()>;

    /// Resolve when the external trigger line fires.
    ///
    /// Backends without an external line never resolve.
    async fn wait_external_trigger(&self) -> Result<()> {
        futures::future::pending::<()>().await;
        Ok(())
    }
}

/// Builds drivers of one backend type.
pub trait CameraFactory: Send + Sync + 'static {
    /// Human-readable description.
    fn description(&self) -> &str;

    /// Property table of the cameras this factory builds.
    fn descriptors(&self) -> Result<Arc<DescriptorTable>>;

    /// Check constructor arguments without touching hardware.
    fn validate(&self, args: &toml::Value) -> anyhow::Result<()>;

    /// Bring a device online.
    fn build(&self, args: toml::Value) -> BoxFuture<'static, std::result::Result<Box<dyn CameraDriver>, DriverError>>;
}

/// A registry that accepts backend factories.
///
/// Lets backend crates offer a `register` helper without depending on the
/// registry crate.
pub trait FactoryRegistry {
    /// Register `factory` under `name`; `DuplicateName` if taken.
    fn register_factory(&self, name: &str, factory: Arc<dyn CameraFactory>) -> Result<()>;
}

/// Deserialize factory arguments from a TOML table; absent keys take serde defaults.
pub fn parse_args<T: DeserializeOwned>(
    driver_type: &str,
    args: toml::Value,
) -> std::result::Result<T, DriverError> {
    let args = match args {
        toml::Value::Table(table) => toml::Value::Table(table),
        other => {
            return Err(DriverError::new(
                driver_type,
                DriverErrorKind::Configuration,
                format!("expected a table of arguments, got {}", other.type_str()),
            ))
        }
    };
    args.try_into().map_err(|e: toml::de::Error| {
        DriverError::new(driver_type, DriverErrorKind::Configuration, e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Args {
        #[serde(default = "default_width")]
        width: u32,
    }

    fn default_width() -> u32 {
        64
    }

    #[test]
    fn test_parse_args_defaults() {
        let args: Args = parse_args("t", toml::Value::Table(toml::Table::new())).unwrap();
        assert_eq!(args, Args { width: 64 });

        let table: toml::Table = toml::from_str("width = 8").unwrap();
        let args: Args = parse_args("t", toml::Value::Table(table)).unwrap();
        assert_eq!(args.width, 8);
    }

    #[test]
    fn test_parse_args_rejects_scalars() {
        let err = parse_args::<Args>("t", toml::Value::Integer(3)).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Configuration);
    }

    #[test]
    fn test_frame_period_takes_the_slower_limit() {
        let mut request = CaptureRequest {
            sequence_number: 0,
            geometry: FrameGeometry::new(1, 1, 8),
            roi_offset: (0, 0),
            exposure: Duration::from_millis(5),
            frames_per_second: 100.0,
            trigger_source: TriggerSource::Auto,
        };
        assert_eq!(request.frame_period(), Duration::from_millis(10));
        request.exposure = Duration::from_millis(50);
        assert_eq!(request.frame_period(), Duration::from_millis(50));
    }
}
