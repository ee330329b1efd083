//! Acquisition engine: the Idle/Recording state machine.
//!
//! One engine belongs to one [`Camera`](crate::camera::Camera). While
//! recording, a single tokio task per session runs the capture loop:
//!
//! ```text
//!   start()                                   stop() / fatal fault
//!  ─────────►  arm ─► ┌──────── loop ────────┐ ─────────────────────► disarm
//!                     │ wait for frame start │
//!                     │ capture into buffer  │
//!                     │ try_send / callback  │
//!                     └──────────────────────┘
//! ```
//!
//! Frame starts depend on the trigger source: `auto` captures back to back,
//! `software` waits for a [`trigger`](AcquisitionEngine::trigger) request and
//! `external` waits for the driver's trigger line.
//!
//! # Buffering
//!
//! Buffers come from a fixed [`Pool`] allocated at `start()`. Frames go to
//! a bounded channel; when it is full the frame is dropped and counted, and
//! when every buffer is on loan the capture lands in a scratch buffer and is
//! counted as dropped too. Memory use is fixed for the whole session.
//!
//! # Faults
//!
//! Transient capture errors (transfer errors, per-frame timeouts) cost one
//! frame: its sequence number is consumed and the drop counter incremented.
//! Any other error ends the session. The engine goes Idle, keeps the error,
//! delivers what is already queued, and then hands out the stored error to
//! every `grab` and `trigger` until the next `start()`.

use crate::driver::{ArmRequest, CameraDriver, CaptureRequest};
use crate::error::{CameraError, Result};
use crate::frame::{Frame, FrameGeometry};
use crate::property::{names, PropertyStore};
use crate::trigger::TriggerSource;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use unicam_pool::Pool;

/// Sizing and timeouts of the acquisition engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionConfig {
    /// Capacity of the frame channel
    pub queue_depth: usize,
    /// Number of pooled frame buffers
    pub buffer_count: usize,
    /// Lower bound of the default `grab()` timeout
    pub grab_timeout: Duration,
    /// Lower bound of the `trigger()` timeout
    pub trigger_timeout: Duration,
    /// How long `stop()` waits for the capture task before aborting it
    pub stop_timeout: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            queue_depth: 4,
            buffer_count: 8,
            grab_timeout: Duration::from_millis(5000),
            trigger_timeout: Duration::from_millis(1000),
            stop_timeout: Duration::from_millis(2000),
        }
    }
}

/// Acquisition state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionState {
    /// Not recording
    #[default]
    Idle,
    /// A capture task is running
    Recording,
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquisitionState::Idle => write!(f, "idle"),
            AcquisitionState::Recording => write!(f, "recording"),
        }
    }
}

/// Counters of the current (or last) session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Frames the backend captured or failed to capture
    pub frames_produced: u64,
    /// Frames handed to a consumer
    pub frames_delivered: u64,
    /// Frames produced but never delivered
    pub frames_dropped: u64,
    /// Highest sequence number produced
    pub last_sequence: Option<u64>,
}

impl AcquisitionStats {
    /// Dropped frames as a fraction of produced frames.
    pub fn drop_ratio(&self) -> f64 {
        if self.frames_produced == 0 {
            0.0
        } else {
            self.frames_dropped as f64 / self.frames_produced as f64
        }
    }
}

const NO_SEQUENCE: u64 = u64::MAX;

struct Counters {
    produced: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    last_sequence: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self {
            produced: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_sequence: AtomicU64::new(NO_SEQUENCE),
        }
    }

    fn reset(&self) {
        self.produced.store(0, Ordering::Relaxed);
        self.delivered.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.last_sequence.store(NO_SEQUENCE, Ordering::Relaxed);
    }

    fn produced(&self, sequence: u64) {
        self.produced.fetch_add(1, Ordering::Relaxed);
        self.last_sequence.store(sequence, Ordering::Relaxed);
    }

    fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new drop count.
    fn dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn snapshot(&self) -> AcquisitionStats {
        let last = self.last_sequence.load(Ordering::Relaxed);
        AcquisitionStats {
            frames_produced: self.produced.load(Ordering::Relaxed),
            frames_delivered: self.delivered.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            last_sequence: (last != NO_SEQUENCE).then_some(last),
        }
    }
}

/// Push-delivery callback. Runs on the capture task, once per frame, in order.
pub type FrameCallback = Arc<dyn Fn(&Frame) + Send + Sync>;

struct TriggerRequest {
    ack: oneshot::Sender<Result<()>>,
}

/// State shared between the engine and its capture task.
struct Shared {
    camera: String,
    store: Arc<PropertyStore>,
    counters: Counters,
    fault: Mutex<Option<CameraError>>,
    state_tx: watch::Sender<AcquisitionState>,
}

impl Shared {
    fn publish(&self, state: AcquisitionState) {
        self.state_tx.send_replace(state);
        let recording = state == AcquisitionState::Recording;
        if let Err(e) = self.store.set_reported(names::IS_RECORDING, recording.into()) {
            debug!(camera = %self.camera, error = %e, "is_recording not mirrored");
        }
    }

    /// Error for operations that need a running session.
    fn idle_error(&self) -> CameraError {
        self.fault.lock().clone().unwrap_or(CameraError::NotRecording)
    }
}

struct Session {
    stop_tx: watch::Sender<bool>,
    trigger_tx: mpsc::Sender<TriggerRequest>,
    frames: Arc<tokio::sync::Mutex<mpsc::Receiver<Frame>>>,
    task: JoinHandle<()>,
}

/// Drives one camera driver through recording sessions.
pub struct AcquisitionEngine {
    config: AcquisitionConfig,
    driver: Arc<dyn CameraDriver>,
    shared: Arc<Shared>,
    /// Serializes start/stop
    control: tokio::sync::Mutex<()>,
    session: Mutex<Option<Session>>,
}

impl AcquisitionEngine {
    /// Create an idle engine.
    pub fn new(
        driver: Arc<dyn CameraDriver>,
        store: Arc<PropertyStore>,
        config: AcquisitionConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(AcquisitionState::Idle);
        let shared = Arc::new(Shared {
            camera: driver.type_name().to_string(),
            store,
            counters: Counters::new(),
            fault: Mutex::new(None),
            state_tx,
        });
        Self {
            config,
            driver,
            shared,
            control: tokio::sync::Mutex::new(()),
            session: Mutex::new(None),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> AcquisitionState {
        *self.shared.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<AcquisitionState> {
        self.shared.state_tx.subscribe()
    }

    /// Counters of the current or last session.
    pub fn stats(&self) -> AcquisitionStats {
        self.shared.counters.snapshot()
    }

    /// Fault that ended the last session, if any.
    pub fn last_fault(&self) -> Option<CameraError> {
        self.shared.fault.lock().clone()
    }

    /// Arm the driver and spawn the capture task.
    ///
    /// `callback` is used when `transfer_asynchronously` is set.
    pub async fn start(&self, callback: Option<FrameCallback>) -> Result<()> {
        let _control = self.control.lock().await;
        if self.state() == AcquisitionState::Recording {
            return Err(CameraError::AlreadyRecording);
        }

        let store = &self.shared.store;
        let asynchronous = store
            .get_bool(names::TRANSFER_ASYNCHRONOUSLY)
            .unwrap_or(false);
        let callback = if asynchronous {
            Some(callback.ok_or(CameraError::NoFrameCallback)?)
        } else {
            None
        };

        // A faulted session may still hold undelivered frames.
        let stale = self.session.lock().take();
        if let Some(stale) = stale {
            self.retire(stale).await;
        }

        let trigger_source = store.trigger_source()?;
        let geometry = session_geometry(store)?;
        let arm = ArmRequest {
            trigger_source,
            geometry,
            roi_offset: roi_offset(store),
            exposure: exposure(store),
            frames_per_second: store.get_f64(names::FRAMES_PER_SECOND).unwrap_or(0.0),
        };
        self.driver.arm(&arm).await?;

        *self.shared.fault.lock() = None;
        self.shared.counters.reset();

        let frame_size = geometry.frame_size();
        let pool = Pool::new_simple(self.config.buffer_count, move || vec![0u8; frame_size]);
        let (frames_tx, frames_rx) = mpsc::channel(self.config.queue_depth.max(1));
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);

        self.shared.publish(AcquisitionState::Recording);

        let task = tokio::spawn(run_session(SessionTask {
            driver: Arc::clone(&self.driver),
            shared: Arc::clone(&self.shared),
            pool,
            frames_tx,
            trigger_rx,
            stop_rx,
            trigger_source,
            geometry,
            callback,
        }));

        *self.session.lock() = Some(Session {
            stop_tx,
            trigger_tx,
            frames: Arc::new(tokio::sync::Mutex::new(frames_rx)),
            task,
        });

        info!(
            camera = %self.shared.camera,
            trigger = %trigger_source,
            geometry = %geometry,
            buffers = self.config.buffer_count,
            queue_depth = self.config.queue_depth,
            "acquisition started"
        );
        Ok(())
    }

    /// Stop recording. A no-op when idle.
    pub async fn stop(&self) -> Result<()> {
        let _control = self.control.lock().await;
        let session = self.session.lock().take();
        let Some(session) = session else {
            return Ok(());
        };

        let was_recording = self.state() == AcquisitionState::Recording;
        self.retire(session).await;
        self.shared.publish(AcquisitionState::Idle);

        if was_recording {
            let stats = self.stats();
            info!(
                camera = %self.shared.camera,
                produced = stats.frames_produced,
                delivered = stats.frames_delivered,
                dropped = stats.frames_dropped,
                "acquisition stopped"
            );
        }
        Ok(())
    }

    /// Signal the task, wait for it to disarm, then discard queued frames.
    async fn retire(&self, session: Session) {
        let Session {
            stop_tx,
            frames,
            mut task,
            ..
        } = session;
        stop_tx.send_replace(true);

        match tokio::time::timeout(self.config.stop_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(camera = %self.shared.camera, error = %e, "capture task failed");
                self.force_disarm().await;
            }
            Err(_) => {
                warn!(
                    camera = %self.shared.camera,
                    timeout_ms = self.config.stop_timeout.as_millis() as u64,
                    "capture task did not stop in time, aborting"
                );
                task.abort();
                self.force_disarm().await;
            }
        }

        let mut frames = frames.lock().await;
        frames.close();
        let mut discarded = 0u32;
        while frames.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(camera = %self.shared.camera, discarded, "queued frames discarded");
        }
    }

    async fn force_disarm(&self) {
        if let Err(e) = self.driver.disarm().await {
            warn!(camera = %self.shared.camera, error = %e, "disarm failed");
        }
    }

    /// Request one frame in software trigger mode.
    ///
    /// Returns once the frame has been captured and queued.
    pub async fn trigger(&self) -> Result<()> {
        let current = self.shared.store.trigger_source()?;
        if current != TriggerSource::Software {
            return Err(CameraError::InvalidTriggerMode { current });
        }

        let (trigger_tx, mut stop_rx) = {
            let session = self.session.lock();
            match session.as_ref() {
                Some(s) if self.state() == AcquisitionState::Recording => {
                    (s.trigger_tx.clone(), s.stop_tx.subscribe())
                }
                _ => return Err(self.shared.idle_error()),
            }
        };

        let timeout = self
            .config
            .trigger_timeout
            .max(exposure(&self.shared.store) * 2);
        let (ack_tx, ack_rx) = oneshot::channel();
        let request = async {
            trigger_tx
                .send(TriggerRequest { ack: ack_tx })
                .await
                .map_err(|_| ())?;
            ack_rx.await.map_err(|_| ())
        };

        tokio::select! {
            biased;
            _ = wait_stop(&mut stop_rx) => Err(CameraError::Cancelled),
            acked = request => match acked {
                Ok(result) => result,
                Err(()) => Err(self.shared.idle_error()),
            },
            _ = tokio::time::sleep(timeout) => Err(CameraError::Timeout(timeout)),
        }
    }

    /// Wait for the next frame.
    ///
    /// `None` waits `max(grab_timeout, 2 × exposure_time)`.
    pub async fn grab(&self, timeout: Option<Duration>) -> Result<Frame> {
        let timeout = timeout.unwrap_or_else(|| {
            self.config
                .grab_timeout
                .max(exposure(&self.shared.store) * 2)
        });
        let (frames, mut stop_rx) = {
            let session = self.session.lock();
            match session.as_ref() {
                Some(s) => (Arc::clone(&s.frames), s.stop_tx.subscribe()),
                None => return Err(self.shared.idle_error()),
            }
        };

        tokio::select! {
            biased;
            _ = wait_stop(&mut stop_rx) => Err(CameraError::Cancelled),
            frame = async { frames.lock().await.recv().await } => match frame {
                Some(frame) => {
                    self.shared.counters.delivered();
                    Ok(frame)
                }
                None => Err(self.shared.idle_error()),
            },
            _ = tokio::time::sleep(timeout) => Err(CameraError::Timeout(timeout)),
        }
    }
}

impl Drop for AcquisitionEngine {
    fn drop(&mut self) {
        // The task disarms on its own once it sees the flag.
        if let Some(session) = self.session.get_mut().take() {
            session.stop_tx.send_replace(true);
        }
    }
}

impl std::fmt::Debug for AcquisitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionEngine")
            .field("camera", &self.shared.camera)
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Capture task
// =============================================================================

struct SessionTask {
    driver: Arc<dyn CameraDriver>,
    shared: Arc<Shared>,
    pool: Arc<Pool<Vec<u8>>>,
    frames_tx: mpsc::Sender<Frame>,
    trigger_rx: mpsc::Receiver<TriggerRequest>,
    stop_rx: watch::Receiver<bool>,
    trigger_source: TriggerSource,
    geometry: FrameGeometry,
    callback: Option<FrameCallback>,
}

async fn wait_stop(stop_rx: &mut watch::Receiver<bool>) {
    // A dropped sender counts as a stop.
    let _ = stop_rx.wait_for(|stopped| *stopped).await;
}

async fn run_session(mut task: SessionTask) {
    let camera = task.shared.camera.clone();
    let frame_size = task.geometry.frame_size();
    let mut scratch: Vec<u8> = Vec::new();
    let mut sequence: u64 = 0;
    // Answered only once the fault is stored and Idle is published.
    let mut fault_ack: Option<oneshot::Sender<Result<()>>> = None;

    let fault = loop {
        let ack = match task.trigger_source {
            TriggerSource::Auto => {
                tokio::task::yield_now().await;
                if *task.stop_rx.borrow() {
                    break None;
                }
                None
            }
            TriggerSource::Software => tokio::select! {
                biased;
                _ = wait_stop(&mut task.stop_rx) => break None,
                request = task.trigger_rx.recv() => match request {
                    Some(request) => Some(request.ack),
                    None => break None,
                },
            },
            TriggerSource::External => tokio::select! {
                biased;
                _ = wait_stop(&mut task.stop_rx) => break None,
                line = task.driver.wait_external_trigger() => match line {
                    Ok(()) => None,
                    Err(e) if e.is_transient() => {
                        warn!(camera = %camera, error = %e, "trigger line error");
                        continue;
                    }
                    Err(e) => break Some(e),
                },
            },
        };

        let request = capture_request(&task.shared.store, sequence, task.geometry, task.trigger_source);
        let mut buffer = task.pool.try_acquire();
        let captured = {
            let target: &mut [u8] = match buffer.as_mut() {
                Some(buffer) => &mut buffer[..],
                None => {
                    scratch.resize(frame_size, 0);
                    &mut scratch[..]
                }
            };
            tokio::select! {
                biased;
                _ = wait_stop(&mut task.stop_rx) => None,
                result = task.driver.capture(&request, target) => Some(result),
            }
        };

        let Some(result) = captured else {
            if let Some(ack) = ack {
                let _ = ack.send(Err(CameraError::Cancelled));
            }
            break None;
        };

        // The sequence number is spent whatever the outcome.
        sequence += 1;
        task.shared.counters.produced(request.sequence_number);

        match result {
            Ok(()) => {
                let delivered = match buffer {
                    Some(buffer) => {
                        let frame = Frame::new(buffer, task.geometry, request.sequence_number, Utc::now());
                        task.deliver(frame)
                    }
                    None => {
                        let dropped = task.shared.counters.dropped();
                        if dropped == 1 || dropped % 100 == 0 {
                            warn!(camera = %camera, dropped, "buffer pool exhausted, frame dropped");
                        }
                        Ok(())
                    }
                };
                if let Some(ack) = ack {
                    let _ = ack.send(Ok(()));
                }
                if delivered.is_err() {
                    break None;
                }
            }
            Err(e) if e.is_transient() => {
                let dropped = task.shared.counters.dropped();
                warn!(
                    camera = %camera,
                    sequence = request.sequence_number,
                    dropped,
                    error = %e,
                    "frame lost"
                );
                if let Some(ack) = ack {
                    let _ = ack.send(Err(e));
                }
            }
            Err(e) => {
                task.shared.counters.dropped();
                fault_ack = ack;
                break Some(e);
            }
        }
    };

    if let Err(e) = task.driver.disarm().await {
        warn!(camera = %camera, error = %e, "disarm failed");
    }

    if let Some(fault) = fault {
        error!(
            camera = %camera,
            code = fault.fault_code(),
            error = %fault,
            "acquisition aborted"
        );
        *task.shared.fault.lock() = Some(fault.clone());
        task.shared.publish(AcquisitionState::Idle);
        if let Some(ack) = fault_ack {
            let _ = ack.send(Err(fault));
        }
    }
    debug!(camera = %camera, frames = sequence, "capture task finished");
}

impl SessionTask {
    /// Hand a frame to the callback or the channel. `Err` when nobody listens.
    fn deliver(&self, frame: Frame) -> std::result::Result<(), ()> {
        let sequence = frame.sequence_number();
        if let Some(callback) = &self.callback {
            callback(&frame);
            self.shared.counters.delivered();
            return Ok(());
        }
        match self.frames_tx.try_send(frame) {
            Ok(()) => {
                debug!(camera = %self.shared.camera, sequence, "frame queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.shared.counters.dropped();
                if dropped == 1 || dropped % 100 == 0 {
                    warn!(camera = %self.shared.camera, sequence, dropped, "frame channel full, frame dropped");
                }
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(()),
        }
    }
}

// =============================================================================
// Store helpers
// =============================================================================

fn session_geometry(store: &PropertyStore) -> Result<FrameGeometry> {
    Ok(FrameGeometry::new(
        store.get_u32(names::ROI_WIDTH)?,
        store.get_u32(names::ROI_HEIGHT)?,
        store.get_u32(names::SENSOR_BITDEPTH)?,
    ))
}

fn roi_offset(store: &PropertyStore) -> (u32, u32) {
    (
        store.get_u32(names::ROI_X).unwrap_or(0),
        store.get_u32(names::ROI_Y).unwrap_or(0),
    )
}

fn exposure(store: &PropertyStore) -> Duration {
    store
        .get_f64(names::EXPOSURE_TIME)
        .ok()
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .unwrap_or(Duration::ZERO)
}

fn capture_request(
    store: &PropertyStore,
    sequence_number: u64,
    geometry: FrameGeometry,
    trigger_source: TriggerSource,
) -> CaptureRequest {
    CaptureRequest {
        sequence_number,
        geometry,
        roi_offset: roi_offset(store),
        exposure: exposure(store),
        frames_per_second: store.get_f64(names::FRAMES_PER_SECOND).unwrap_or(0.0),
        trigger_source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::DescriptorTable;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Instant driver that writes the sequence number into the first byte.
    struct CountingDriver {
        table: Arc<DescriptorTable>,
        arms: AtomicU32,
        disarms: AtomicU32,
    }

    impl CountingDriver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                table: DescriptorTable::builder().with_base().build().unwrap(),
                arms: AtomicU32::new(0),
                disarms: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl CameraDriver for CountingDriver {
        fn type_name(&self) -> &str {
            "counting"
        }

        fn descriptors(&self) -> Arc<DescriptorTable> {
            Arc::clone(&self.table)
        }

        async fn arm(&self, _request: &ArmRequest) -> Result<()> {
            self.arms.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn disarm(&self) -> Result<()> {
            self.disarms.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn capture(&self, request: &CaptureRequest, buffer: &mut [u8]) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            buffer[0] = request.sequence_number as u8;
            Ok(())
        }
    }

    fn engine(driver: Arc<CountingDriver>) -> AcquisitionEngine {
        let store = Arc::new(PropertyStore::new(driver.descriptors()));
        store.set(names::ROI_WIDTH, 4u32.into()).unwrap();
        store.set(names::ROI_HEIGHT, 4u32.into()).unwrap();
        AcquisitionEngine::new(driver, store, AcquisitionConfig::default())
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let driver = CountingDriver::new();
        let engine = engine(Arc::clone(&driver));
        engine.stop().await.unwrap();
        engine.stop().await.unwrap();
        assert_eq!(engine.state(), AcquisitionState::Idle);
        assert_eq!(driver.disarms.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_stop_arms_and_disarms_once() {
        let driver = CountingDriver::new();
        let engine = engine(Arc::clone(&driver));

        engine.start(None).await.unwrap();
        assert_eq!(engine.state(), AcquisitionState::Recording);
        assert!(matches!(
            engine.start(None).await,
            Err(CameraError::AlreadyRecording)
        ));

        let frame = engine.grab(None).await.unwrap();
        assert_eq!(frame.data().len(), 16);
        drop(frame);

        engine.stop().await.unwrap();
        assert_eq!(engine.state(), AcquisitionState::Idle);
        assert_eq!(driver.arms.load(Ordering::SeqCst), 1);
        assert_eq!(driver.disarms.load(Ordering::SeqCst), 1);
        assert!(matches!(engine.grab(None).await, Err(CameraError::NotRecording)));
    }

    #[tokio::test]
    async fn test_stats_reset_per_session() {
        let driver = CountingDriver::new();
        let engine = engine(driver);

        engine.start(None).await.unwrap();
        let first = engine.grab(None).await.unwrap();
        assert_eq!(first.sequence_number(), 0);
        drop(first);
        engine.stop().await.unwrap();
        assert!(engine.stats().frames_produced >= 1);

        engine.start(None).await.unwrap();
        assert!(engine.stats().frames_delivered == 0);
        let again = engine.grab(None).await.unwrap();
        assert_eq!(again.sequence_number(), 0);
        drop(again);
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_async_transfer_requires_callback() {
        let driver = CountingDriver::new();
        let engine = engine(driver);
        engine
            .shared
            .store
            .set(names::TRANSFER_ASYNCHRONOUSLY, true.into())
            .unwrap();
        assert!(matches!(
            engine.start(None).await,
            Err(CameraError::NoFrameCallback)
        ));
        assert_eq!(engine.state(), AcquisitionState::Idle);
    }

    #[test]
    fn test_drop_ratio() {
        let stats = AcquisitionStats {
            frames_produced: 10,
            frames_delivered: 6,
            frames_dropped: 4,
            last_sequence: Some(9),
        };
        assert!((stats.drop_ratio() - 0.4).abs() < f64::EPSILON);
        assert_eq!(AcquisitionStats::default().drop_ratio(), 0.0);
    }
}
