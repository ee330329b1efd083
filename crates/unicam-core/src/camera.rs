//! The camera handle clients use.
//!
//! A [`Camera`] ties together a backend driver, the property store built from
//! its descriptor table, and an acquisition engine. It is the only place
//! where property writes reach hardware, so the rules are applied uniformly:
//!
//! 1. the store validates name, access, type, range and enum membership;
//! 2. while recording, only `writable_while_recording` properties are accepted;
//! 3. the driver pushes the value (`HardwareRejected` on refusal);
//! 4. the value is committed, followed by any values the hardware reports back.
//!
//! Dropping a camera signals its capture task to stop; the task disarms the
//! hardware on its way out.

use crate::acquisition::{
    AcquisitionConfig, AcquisitionEngine, AcquisitionState, AcquisitionStats, FrameCallback,
};
use crate::driver::CameraDriver;
use crate::error::{CameraError, Result};
use crate::frame::{Frame, FrameGeometry};
use crate::property::{names, DescriptorTable, PropertyDescriptor, PropertyStore, PropertyValue};
use crate::trigger::TriggerSource;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A camera instance.
pub struct Camera {
    backend: String,
    driver: Arc<dyn CameraDriver>,
    store: Arc<PropertyStore>,
    engine: AcquisitionEngine,
    callback: Mutex<Option<FrameCallback>>,
}

impl Camera {
    /// Wrap a driver, seeding the store with its reported values.
    pub fn new(
        backend: impl Into<String>,
        driver: Box<dyn CameraDriver>,
        config: AcquisitionConfig,
    ) -> Result<Self> {
        let backend = backend.into();
        let driver: Arc<dyn CameraDriver> = Arc::from(driver);
        let store = Arc::new(PropertyStore::new(driver.descriptors()));
        for (name, value) in driver.initial_values() {
            store.set_reported(&name, value)?;
        }
        let engine = AcquisitionEngine::new(Arc::clone(&driver), Arc::clone(&store), config);
        info!(backend = %backend, driver = driver.type_name(), "camera created");
        Ok(Self {
            backend,
            driver,
            store,
            engine,
            callback: Mutex::new(None),
        })
    }

    /// Registry name this camera was created under.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Driver type name.
    pub fn type_name(&self) -> &str {
        self.driver.type_name()
    }

    // -------------------------------------------------------------------------
    // Properties
    // -------------------------------------------------------------------------

    /// Shared descriptor table.
    pub fn descriptors(&self) -> &Arc<DescriptorTable> {
        self.store.table()
    }

    /// Descriptors in registration order.
    pub fn enumerate(&self) -> &[PropertyDescriptor] {
        self.store.enumerate()
    }

    /// Descriptor by name.
    pub fn get_descriptor(&self, name: &str) -> Result<&PropertyDescriptor> {
        self.store.get_descriptor(name)
    }

    /// Current value of a property.
    pub fn get(&self, name: &str) -> Result<PropertyValue> {
        self.store.get(name)
    }

    /// Validate, push to hardware and commit a property value.
    pub async fn set(&self, name: &str, value: PropertyValue) -> Result<()> {
        let _guard = self.store.lock_property(name).await?;
        self.store.validate(name, &value)?;

        let descriptor = self.store.get_descriptor(name)?;
        if self.engine.state() == AcquisitionState::Recording && !descriptor.writable_while_recording {
            warn!(backend = %self.backend, property = name, "write rejected while recording");
            return Err(CameraError::NotWritable(name.to_string()));
        }

        let reported = self.driver.apply_property(name, &value).await?;
        debug!(backend = %self.backend, property = name, value = %value, "property set");
        self.store.commit(name, value);
        for (name, value) in reported {
            self.store.set_reported(&name, value)?;
        }
        Ok(())
    }

    /// Parse `text` against the descriptor, then [`Camera::set`].
    pub async fn set_from_str(&self, name: &str, text: &str) -> Result<()> {
        let value = PropertyValue::parse(self.store.get_descriptor(name)?, text)?;
        self.set(name, value).await
    }

    /// All readable values in registration order.
    pub fn snapshot(&self) -> Vec<(String, PropertyValue)> {
        self.store.snapshot()
    }

    /// Geometry of the frames the next session will produce.
    pub fn geometry(&self) -> Result<FrameGeometry> {
        Ok(FrameGeometry::new(
            self.store.get_u32(names::ROI_WIDTH)?,
            self.store.get_u32(names::ROI_HEIGHT)?,
            self.store.get_u32(names::SENSOR_BITDEPTH)?,
        ))
    }

    /// Current exposure time in seconds.
    pub fn exposure_time(&self) -> Result<f64> {
        self.store.get_f64(names::EXPOSURE_TIME)
    }

    /// Current trigger source.
    pub fn trigger_source(&self) -> Result<TriggerSource> {
        self.store.trigger_source()
    }

    // -------------------------------------------------------------------------
    // Acquisition
    // -------------------------------------------------------------------------

    /// Start recording.
    pub async fn start(&self) -> Result<()> {
        let callback = self.callback.lock().clone();
        self.engine.start(callback).await
    }

    /// Stop recording. Calling it while idle is a no-op.
    pub async fn stop(&self) -> Result<()> {
        self.engine.stop().await
    }

    /// Request one frame in software trigger mode.
    pub async fn trigger(&self) -> Result<()> {
        self.engine.trigger().await
    }

    /// Wait for the next frame, at most `max(grab_timeout, 2 × exposure_time)`.
    pub async fn grab(&self) -> Result<Frame> {
        self.engine.grab(None).await
    }

    /// Wait for the next frame at most `timeout`.
    pub async fn grab_timeout(&self, timeout: Duration) -> Result<Frame> {
        self.engine.grab(Some(timeout)).await
    }

    /// Register the push-delivery callback, used when `transfer_asynchronously`
    /// is set. Takes effect at the next `start()`.
    pub fn set_frame_callback<F>(&self, callback: F)
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        *self.callback.lock() = Some(Arc::new(callback));
    }

    /// Remove the push-delivery callback.
    pub fn clear_frame_callback(&self) {
        *self.callback.lock() = None;
    }

    /// Acquisition state.
    pub fn state(&self) -> AcquisitionState {
        self.engine.state()
    }

    /// Whether a session is running.
    pub fn is_recording(&self) -> bool {
        self.engine.state() == AcquisitionState::Recording
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<AcquisitionState> {
        self.engine.subscribe_state()
    }

    /// Counters of the current or last session.
    pub fn stats(&self) -> AcquisitionStats {
        self.engine.stats()
    }

    /// Fault that ended the last session.
    pub fn last_fault(&self) -> Option<CameraError> {
        self.engine.last_fault()
    }

    /// Engine configuration.
    pub fn acquisition_config(&self) -> &AcquisitionConfig {
        self.engine.config()
    }
}

impl std::fmt::Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("backend", &self.backend)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
