//! Mock camera backend.
//!
//! Renders a numbered test pattern into each frame. Property changes made
//! while recording take effect at the next frame boundary, since every capture
//! reads its exposure, rate and ROI offset from the request.

use crate::common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};
use crate::pattern::{render_frame, PatternParams};
use anyhow::bail;
use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};
use unicam_core::driver::parse_args;
use unicam_core::error::{DriverError, DriverErrorKind};
use unicam_core::property::names;
use unicam_core::{
    ArmRequest, CameraDriver, CameraError, CameraFactory, CaptureRequest, DescriptorTable,
    FrameStatistics, PropertyDescriptor, PropertyValue, Result, TriggerSource, ValueType,
};

/// Backend type name.
pub const DRIVER_TYPE: &str = "mock";

/// Mock-specific property: fill the frame centre with noise.
pub const CREATE_RANDOM: &str = "create_random";

static MOCK_DESCRIPTORS: OnceCell<Arc<DescriptorTable>> = OnceCell::new();

/// Descriptor table shared by every mock camera.
pub fn mock_descriptors() -> Result<Arc<DescriptorTable>> {
    MOCK_DESCRIPTORS
        .get_or_try_init(|| {
            DescriptorTable::builder()
                .with_base()
                .property(
                    PropertyDescriptor::new(CREATE_RANDOM, ValueType::Bool)
                        .with_description("Fill the centre of each frame with Gaussian noise")
                        .with_default(true)
                        .writable_while_recording(),
                )
                .build()
        })
        .map(Arc::clone)
}

// =============================================================================
// MockCameraFactory
// =============================================================================

/// Constructor arguments for [`MockCamera`].
///
/// ```toml
/// [[cameras]]
/// id = "bench"
/// backend = "mock"
/// args = { width = 1024, height = 1024, bitdepth = 16, mode = "realistic" }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MockCameraConfig {
    /// Sensor width in pixels
    pub width: u32,
    /// Sensor height in pixels
    pub height: u32,
    /// Bits per pixel
    pub bitdepth: u32,
    /// Initial exposure in seconds
    pub exposure_time: f64,
    /// Initial free-run frame rate
    pub frames_per_second: f64,
    /// Timing mode
    pub mode: MockMode,
    /// RNG seed for noise and injected failures; `None` seeds from the OS
    pub seed: Option<u64>,
    /// Initial value of `create_random`
    pub create_random: bool,
    /// Per-capture random transfer failure rate, used in chaos mode
    pub failure_rate: f64,
    /// Scripted failures
    pub errors: Vec<ErrorScenario>,
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            bitdepth: 16,
            exposure_time: 0.01,
            frames_per_second: 100.0,
            mode: MockMode::Realistic,
            seed: None,
            create_random: true,
            failure_rate: 0.05,
            errors: Vec::new(),
        }
    }
}

impl MockCameraConfig {
    /// Check the arguments without building anything.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("Camera resolution must be non-zero");
        }
        if !(1..=32).contains(&self.bitdepth) {
            bail!("bitdepth must be between 1 and 32, got {}", self.bitdepth);
        }
        if !(0.0001..=10.0).contains(&self.exposure_time) {
            bail!("exposure_time must be within [0.0001, 10] s, got {}", self.exposure_time);
        }
        if !(0.01..=100_000.0).contains(&self.frames_per_second) {
            bail!(
                "frames_per_second must be within [0.01, 100000], got {}",
                self.frames_per_second
            );
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            bail!("failure_rate must be within [0, 1], got {}", self.failure_rate);
        }
        Ok(())
    }

    fn error_config(&self) -> ErrorConfig {
        let mut rates = HashMap::new();
        if self.mode == MockMode::Chaos {
            rates.insert("capture".to_string(), self.failure_rate);
        }
        ErrorConfig::new(rates, self.errors.clone(), self.seed)
    }
}

/// Factory for [`MockCamera`] instances.
pub struct MockCameraFactory;

impl CameraFactory for MockCameraFactory {
    fn description(&self) -> &str {
        "Simulated camera producing a numbered test pattern"
    }

    fn descriptors(&self) -> Result<Arc<DescriptorTable>> {
        mock_descriptors()
    }

    fn validate(&self, args: &toml::Value) -> anyhow::Result<()> {
        let cfg: MockCameraConfig = args.clone().try_into()?;
        cfg.validate()
    }

    fn build(
        &self,
        args: toml::Value,
    ) -> BoxFuture<'static, std::result::Result<Box<dyn CameraDriver>, DriverError>> {
        Box::pin(async move {
            let cfg: MockCameraConfig = parse_args(DRIVER_TYPE, args)?;
            let camera = MockCamera::with_config(cfg)?;
            Ok(Box::new(camera) as Box<dyn CameraDriver>)
        })
    }
}

// =============================================================================
// MockCameraBuilder
// =============================================================================

/// Builder for test setups that need fault injection or custom timing.
///
/// ```rust,ignore
/// let camera = MockCamera::builder(64, 48)
///     .error_config(ErrorConfig::scenario(ErrorScenario::CorruptFrame { every: 3 }))
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct MockCameraBuilder {
    config: MockCameraConfig,
    error_config: Option<ErrorConfig>,
    timing: Option<TimingConfig>,
}

impl MockCameraBuilder {
    /// Start from the default configuration with the given sensor size, in
    /// [`MockMode::Instant`].
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            config: MockCameraConfig {
                width,
                height,
                mode: MockMode::Instant,
                ..MockCameraConfig::default()
            },
            error_config: None,
            timing: None,
        }
    }

    /// Bits per pixel.
    pub fn bitdepth(mut self, bits: u32) -> Self {
        self.config.bitdepth = bits;
        self
    }

    /// Initial exposure.
    pub fn exposure_time(mut self, seconds: f64) -> Self {
        self.config.exposure_time = seconds;
        self
    }

    /// Initial free-run frame rate.
    pub fn frames_per_second(mut self, fps: f64) -> Self {
        self.config.frames_per_second = fps;
        self
    }

    /// Timing mode.
    pub fn mode(mut self, mode: MockMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Fixed RNG seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Initial value of `create_random`.
    pub fn create_random(mut self, enabled: bool) -> Self {
        self.config.create_random = enabled;
        self
    }

    /// Replace the error injection derived from the configuration.
    pub fn error_config(mut self, config: ErrorConfig) -> Self {
        self.error_config = Some(config);
        self
    }

    /// Replace the mode's default timing.
    pub fn timing_config(mut self, timing: TimingConfig) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Build the camera.
    pub fn build(self) -> std::result::Result<MockCamera, DriverError> {
        let errors = self.error_config.unwrap_or_else(|| self.config.error_config());
        let timing = self.timing.unwrap_or_else(|| default_timing(self.config.mode));
        MockCamera::assemble(self.config, errors, timing)
    }
}

fn default_timing(mode: MockMode) -> TimingConfig {
    if mode.is_timed() {
        TimingConfig::camera()
    } else {
        TimingConfig::default()
    }
}

// =============================================================================
// MockCamera
// =============================================================================

/// Handle to the simulated external trigger input.
#[derive(Debug, Clone)]
pub struct MockTriggerLine {
    notify: Arc<Notify>,
}

impl MockTriggerLine {
    /// Fire the line once. A pulse with nobody waiting is latched until the
    /// next wait; further pulses before that are merged into it.
    pub fn pulse(&self) {
        self.notify.notify_one();
    }
}

#[derive(Debug, Clone, Copy)]
struct Roi {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// Simulated camera.
pub struct MockCamera {
    config: MockCameraConfig,
    table: Arc<DescriptorTable>,
    errors: ErrorConfig,
    timing: TimingConfig,
    rng: MockRng,
    create_random: AtomicBool,
    armed: AtomicBool,
    roi: Mutex<Roi>,
    trigger_line: Arc<Notify>,
    statistics: Mutex<FrameStatistics>,
}

impl MockCamera {
    /// Build from constructor arguments.
    pub fn with_config(config: MockCameraConfig) -> std::result::Result<Self, DriverError> {
        let errors = config.error_config();
        let timing = default_timing(config.mode);
        Self::assemble(config, errors, timing)
    }

    /// Builder with the given sensor size.
    pub fn builder(width: u32, height: u32) -> MockCameraBuilder {
        MockCameraBuilder::new(width, height)
    }

    fn assemble(
        config: MockCameraConfig,
        errors: ErrorConfig,
        timing: TimingConfig,
    ) -> std::result::Result<Self, DriverError> {
        config.validate().map_err(|e| {
            DriverError::new(DRIVER_TYPE, DriverErrorKind::Configuration, e.to_string())
        })?;
        let table = mock_descriptors().map_err(|e| {
            DriverError::new(DRIVER_TYPE, DriverErrorKind::Initialization, e.to_string())
        })?;
        info!(
            width = config.width,
            height = config.height,
            bitdepth = config.bitdepth,
            mode = ?config.mode,
            "mock camera online"
        );
        Ok(Self {
            rng: MockRng::new(config.seed),
            create_random: AtomicBool::new(config.create_random),
            armed: AtomicBool::new(false),
            roi: Mutex::new(Roi {
                x: 0,
                y: 0,
                width: config.width,
                height: config.height,
            }),
            trigger_line: Arc::new(Notify::new()),
            statistics: Mutex::new(FrameStatistics::new()),
            config,
            table,
            errors,
            timing,
        })
    }

    /// Constructor arguments in effect.
    pub fn config(&self) -> &MockCameraConfig {
        &self.config
    }

    /// Handle to fire the external trigger line.
    pub fn trigger_line(&self) -> MockTriggerLine {
        MockTriggerLine {
            notify: Arc::clone(&self.trigger_line),
        }
    }

    /// Fault injection shared with this camera.
    pub fn error_config(&self) -> &ErrorConfig {
        &self.errors
    }

    /// Sequence numbers seen by `capture` in the current session.
    pub fn statistics(&self) -> FrameStatistics {
        self.statistics.lock().clone()
    }

    /// Whether a session is armed.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    fn check(&self, operation: &str) -> std::result::Result<(), DriverError> {
        self.errors.check_operation(DRIVER_TYPE, operation)
    }

    async fn control_delay(&self) {
        if self.config.mode.is_timed() {
            tokio::time::sleep(self.timing.communication()).await;
        }
    }

    /// Apply an ROI change if it still fits on the sensor.
    fn update_roi(&self, name: &str, value: u32) -> Result<()> {
        let mut roi = self.roi.lock();
        let mut next = *roi;
        match name {
            names::ROI_X => next.x = value,
            names::ROI_Y => next.y = value,
            names::ROI_WIDTH => next.width = value,
            _ => next.height = value,
        }
        let fits_x = u64::from(next.x) + u64::from(next.width) <= u64::from(self.config.width);
        let fits_y = u64::from(next.y) + u64::from(next.height) <= u64::from(self.config.height);
        if !fits_x || !fits_y {
            return Err(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::InvalidParameter,
                format!(
                    "ROI {}x{}+{}+{} exceeds sensor {}x{}",
                    next.width, next.height, next.x, next.y, self.config.width, self.config.height
                ),
            )
            .rejected(name));
        }
        *roi = next;
        Ok(())
    }
}

#[async_trait]
impl CameraDriver for MockCamera {
    fn type_name(&self) -> &str {
        DRIVER_TYPE
    }

    fn descriptors(&self) -> Arc<DescriptorTable> {
        Arc::clone(&self.table)
    }

    fn initial_values(&self) -> Vec<(String, PropertyValue)> {
        let c = &self.config;
        vec![
            (names::NAME.into(), "mock camera".into()),
            (names::SENSOR_WIDTH.into(), c.width.into()),
            (names::SENSOR_HEIGHT.into(), c.height.into()),
            (names::SENSOR_BITDEPTH.into(), c.bitdepth.into()),
            (names::ROI_WIDTH.into(), c.width.into()),
            (names::ROI_HEIGHT.into(), c.height.into()),
            (names::EXPOSURE_TIME.into(), c.exposure_time.into()),
            (names::FRAMES_PER_SECOND.into(), c.frames_per_second.into()),
            (CREATE_RANDOM.into(), c.create_random.into()),
        ]
    }

    async fn apply_property(
        &self,
        name: &str,
        value: &PropertyValue,
    ) -> Result<Vec<(String, PropertyValue)>> {
        self.check("apply_property").map_err(|e| e.rejected(name))?;
        self.control_delay().await;
        match name {
            names::ROI_X | names::ROI_Y | names::ROI_WIDTH | names::ROI_HEIGHT => {
                let value = value.as_u32().ok_or_else(|| CameraError::TypeMismatch {
                    property: name.to_string(),
                    expected: ValueType::UInt,
                    found: value.value_type(),
                })?;
                self.update_roi(name, value)?;
            }
            CREATE_RANDOM => {
                if let Some(enabled) = value.as_bool() {
                    self.create_random.store(enabled, Ordering::Release);
                }
            }
            _ => {}
        }
        debug!(property = name, %value, "mock property applied");
        Ok(Vec::new())
    }

    async fn arm(&self, request: &ArmRequest) -> Result<()> {
        self.check("arm")?;
        self.control_delay().await;
        *self.statistics.lock() = FrameStatistics::new();
        self.armed.store(true, Ordering::Release);
        info!(
            geometry = %request.geometry,
            trigger = %request.trigger_source,
            "mock camera armed"
        );
        Ok(())
    }

    async fn disarm(&self) -> Result<()> {
        if self.armed.swap(false, Ordering::AcqRel) {
            let stats = self.statistics.lock().clone();
            info!(
                frames = stats.total_frames,
                gaps = stats.discontinuity_events,
                "mock camera disarmed"
            );
        }
        Ok(())
    }

    async fn capture(&self, request: &CaptureRequest, buffer: &mut [u8]) -> Result<()> {
        if self.config.mode.is_timed() {
            let period = match request.trigger_source {
                TriggerSource::Auto => request.frame_period(),
                TriggerSource::Software | TriggerSource::External => request.exposure,
            };
            tokio::time::sleep(period.max(self.timing.readout())).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.statistics
            .lock()
            .check_discontinuity(request.sequence_number);
        self.check("capture")?;

        let params = PatternParams {
            geometry: request.geometry,
            roi_x: request.roi_offset.0,
            sensor_width: self.config.width,
            frame_number: request.sequence_number,
        };
        let noise = self
            .create_random
            .load(Ordering::Acquire)
            .then_some(&self.rng);
        render_frame(buffer, &params, noise);
        Ok(())
    }

    async fn wait_external_trigger(&self) -> Result<()> {
        self.trigger_line.notified().await;
        self.check("trigger_line")?;
        Ok(())
    }
}

impl std::fmt::Debug for MockCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCamera")
            .field("config", &self.config)
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}
