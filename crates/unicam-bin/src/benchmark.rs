//! `unicam benchmark`: bandwidth through the remote-control surface.
//!
//! Every run writes the trigger source (and exposure), sends `Start`, reads
//! the `image` attribute N times and sends `Stop`. Control goes through
//! [`DeviceProxy`], so the numbers include the proxy overhead a remote client
//! would see.
//!
//! With [`Delivery::Callback`] the frames are pushed to a frame callback
//! instead of being read, which needs the in-process camera behind a
//! [`LocalDeviceProxy`].

use clap::ValueEnum;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use unicam_core::property::names;
use unicam_core::remote::{
    AttributeValue, DevFailed, DeviceProxy, LocalDeviceProxy, IMAGE_ATTRIBUTE,
};
use unicam_core::{Camera, CameraError, FrameStatistics, TriggerSource};

/// In-process address scheme.
pub const LOCAL_SCHEME: &str = "local://";

/// What a failed read does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ErrorMode {
    /// Count the failure and continue with the next read
    #[default]
    BestEffort,
    /// Stop at the first failure
    Strict,
}

/// Trigger sources the benchmark can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BenchTrigger {
    /// Free-running
    #[default]
    Auto,
    /// `Trigger` before every read
    Software,
    /// Frames follow the hardware trigger line
    External,
}

impl From<BenchTrigger> for TriggerSource {
    fn from(trigger: BenchTrigger) -> Self {
        match trigger {
            BenchTrigger::Auto => TriggerSource::Auto,
            BenchTrigger::Software => TriggerSource::Software,
            BenchTrigger::External => TriggerSource::External,
        }
    }
}

/// How frames reach the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Delivery {
    /// Read the `image` attribute once per frame
    #[default]
    Grab,
    /// Push every frame to a frame callback (`transfer_asynchronously`)
    Callback,
}

/// Benchmark errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BenchmarkError {
    /// The address uses a transport this build cannot reach
    #[error("Unsupported address '{0}': only local://<camera> or a bare camera name is supported")]
    UnsupportedAddress(String),

    /// Setup before the first read failed
    #[error("Setup failed: {0}")]
    Setup(DevFailed),

    /// Strict mode hit a failed read
    #[error("Failure after {acquired} frames: {error}")]
    Aborted {
        /// Frames read before the failure
        acquired: u64,
        /// The failure
        error: DevFailed,
    },
}

/// Camera name from a benchmark address.
///
/// `local://mock` and `mock` both name the `mock` camera; any other scheme is
/// rejected.
pub fn parse_address(address: &str) -> Result<&str, BenchmarkError> {
    let name = match address.strip_prefix(LOCAL_SCHEME) {
        Some(name) => name,
        None if address.contains("://") => {
            return Err(BenchmarkError::UnsupportedAddress(address.to_string()))
        }
        None => address,
    };
    if name.is_empty() || name.contains('/') {
        return Err(BenchmarkError::UnsupportedAddress(address.to_string()));
    }
    Ok(name)
}

/// Benchmark parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkOptions {
    /// Reads per run
    pub frames: u64,
    /// Number of runs
    pub runs: u32,
    /// Failure policy
    pub mode: ErrorMode,
    /// Trigger source to drive
    pub trigger: BenchTrigger,
    /// Pull or push delivery
    pub delivery: Delivery,
    /// Exposure written before each run
    pub exposure_time: Option<f64>,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            frames: 100,
            runs: 1,
            mode: ErrorMode::BestEffort,
            trigger: BenchTrigger::Auto,
            delivery: Delivery::Grab,
            exposure_time: None,
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Reads attempted
    pub requested: u64,
    /// Frames received
    pub acquired: u64,
    /// Failed reads
    pub failures: u64,
    /// Frames missing between received sequence numbers
    pub lost_in_gaps: u64,
    /// Pixel bytes received
    pub bytes: u64,
    /// Wall-clock time of the read loop
    pub elapsed: Duration,
}

impl RunReport {
    /// Frames per second over wall-clock time.
    pub fn frames_per_second(&self) -> f64 {
        per_second(self.acquired as f64, self.elapsed)
    }

    /// Bytes per second over wall-clock time.
    pub fn bytes_per_second(&self) -> f64 {
        per_second(self.bytes as f64, self.elapsed)
    }

    /// Bandwidth in MB/s (2^20 bytes).
    pub fn megabytes_per_second(&self) -> f64 {
        self.bytes_per_second() / 1024.0 / 1024.0
    }

    /// Share of requested frames not acquired, in percent.
    pub fn dropped_percent(&self) -> f64 {
        if self.requested == 0 {
            return 0.0;
        }
        100.0 * (self.requested - self.acquired) as f64 / self.requested as f64
    }
}

/// Sum of several runs; the elapsed times add up.
pub fn total(reports: &[RunReport]) -> RunReport {
    reports.iter().fold(RunReport::default(), |mut sum, r| {
        sum.requested += r.requested;
        sum.acquired += r.acquired;
        sum.failures += r.failures;
        sum.lost_in_gaps += r.lost_in_gaps;
        sum.bytes += r.bytes;
        sum.elapsed += r.elapsed;
        sum
    })
}

fn per_second(amount: f64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        amount / secs
    } else {
        0.0
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2} Hz, {:.2} MB/s, {}/{} ({:.1}% dropped)",
            self.frames_per_second(),
            self.megabytes_per_second(),
            self.acquired,
            self.requested,
            self.dropped_percent()
        )
    }
}

/// Run `options.runs` benchmark runs against `proxy`.
///
/// `on_run` sees each report as soon as its run finishes. In strict mode the
/// first failed read stops the camera and ends the benchmark.
pub async fn run<F>(
    proxy: &LocalDeviceProxy,
    options: &BenchmarkOptions,
    mut on_run: F,
) -> Result<Vec<RunReport>, BenchmarkError>
where
    F: FnMut(u32, &RunReport),
{
    let mut reports = Vec::with_capacity(options.runs as usize);
    for index in 0..options.runs {
        info!(
            run = index + 1,
            runs = options.runs,
            delivery = ?options.delivery,
            "benchmark run"
        );
        let report = match options.delivery {
            Delivery::Grab => run_once(proxy, options).await?,
            Delivery::Callback => run_callback(proxy, options).await?,
        };
        on_run(index, &report);
        reports.push(report);
    }
    Ok(reports)
}

async fn configure(
    proxy: &dyn DeviceProxy,
    options: &BenchmarkOptions,
    asynchronous: bool,
) -> Result<(), DevFailed> {
    let source = TriggerSource::from(options.trigger);
    proxy
        .write_attribute(
            names::TRIGGER_SOURCE,
            AttributeValue::String(source.label().to_string()),
        )
        .await?;
    if let Some(exposure) = options.exposure_time {
        proxy
            .write_attribute(names::EXPOSURE_TIME, AttributeValue::Double(exposure))
            .await?;
    }
    proxy
        .write_attribute(
            names::TRANSFER_ASYNCHRONOUSLY,
            AttributeValue::Bool(asynchronous),
        )
        .await
}

async fn run_once(
    proxy: &dyn DeviceProxy,
    options: &BenchmarkOptions,
) -> Result<RunReport, BenchmarkError> {
    let source = TriggerSource::from(options.trigger);
    configure(proxy, options, false)
        .await
        .map_err(BenchmarkError::Setup)?;
    proxy.command("Start").await.map_err(BenchmarkError::Setup)?;

    let mut report = RunReport {
        requested: options.frames,
        ..RunReport::default()
    };
    let mut stats = FrameStatistics::new();
    let started = Instant::now();

    for i in 0..options.frames {
        match read_frame(proxy, source).await {
            Ok((sequence_number, bytes)) => {
                report.acquired += 1;
                report.bytes += bytes;
                stats.check_discontinuity(sequence_number);
            }
            Err(error) => {
                report.failures += 1;
                warn!(frame = i, error = %error, "read failed");
                if options.mode == ErrorMode::Strict {
                    stop(proxy).await;
                    return Err(BenchmarkError::Aborted {
                        acquired: report.acquired,
                        error,
                    });
                }
            }
        }
    }

    report.elapsed = started.elapsed();
    report.lost_in_gaps = stats.lost_frames;
    stop(proxy).await;
    debug!(
        acquired = report.acquired,
        failures = report.failures,
        gaps = stats.discontinuity_events,
        "run finished"
    );
    Ok(report)
}

/// Frames seen by the callback during one run.
#[derive(Debug, Default)]
struct Tally {
    acquired: u64,
    bytes: u64,
    stats: FrameStatistics,
}

async fn run_callback(
    proxy: &LocalDeviceProxy,
    options: &BenchmarkOptions,
) -> Result<RunReport, BenchmarkError> {
    let camera = proxy.camera();
    let source = TriggerSource::from(options.trigger);
    let wanted = options.frames;

    let (tally_tx, mut tally_rx) = watch::channel(Tally::default());
    camera.set_frame_callback(move |frame| {
        tally_tx.send_if_modified(|tally| {
            if tally.acquired >= wanted {
                return false;
            }
            tally.acquired += 1;
            tally.bytes += frame.data().len() as u64;
            tally.stats.check_discontinuity(frame.sequence_number());
            true
        });
    });

    let result = callback_session(proxy, camera, options, source, &mut tally_rx).await;

    stop(proxy).await;
    camera.clear_frame_callback();
    if let Err(e) = proxy
        .write_attribute(names::TRANSFER_ASYNCHRONOUSLY, AttributeValue::Bool(false))
        .await
    {
        warn!(error = %e, "failed to restore synchronous transfer");
    }

    let (elapsed, mut failures) = result?;
    let tally = tally_rx.borrow();
    if source != TriggerSource::Software {
        // Frames the engine lost never reach the callback.
        failures += camera.stats().frames_dropped;
    }
    let report = RunReport {
        requested: options.frames,
        acquired: tally.acquired,
        failures,
        lost_in_gaps: tally.stats.lost_frames,
        bytes: tally.bytes,
        elapsed,
    };
    debug!(
        acquired = report.acquired,
        failures = report.failures,
        gaps = tally.stats.discontinuity_events,
        "callback run finished"
    );
    Ok(report)
}

/// Start, drive and wait for one callback run. Returns the elapsed time and
/// the failures seen by the benchmark itself.
async fn callback_session(
    proxy: &LocalDeviceProxy,
    camera: &Camera,
    options: &BenchmarkOptions,
    source: TriggerSource,
    tally_rx: &mut watch::Receiver<Tally>,
) -> Result<(Duration, u64), BenchmarkError> {
    configure(proxy, options, true)
        .await
        .map_err(BenchmarkError::Setup)?;
    proxy.command("Start").await.map_err(BenchmarkError::Setup)?;

    let started = Instant::now();
    let mut failures = 0;

    if source == TriggerSource::Software {
        // The callback has run by the time a trigger is acknowledged.
        for i in 0..options.frames {
            if let Err(error) = proxy.command("Trigger").await {
                failures += 1;
                warn!(frame = i, error = %error, "trigger failed");
                if options.mode == ErrorMode::Strict {
                    return Err(BenchmarkError::Aborted {
                        acquired: tally_rx.borrow().acquired,
                        error,
                    });
                }
            }
        }
        return Ok((started.elapsed(), failures));
    }

    let stall = stall_timeout(camera);
    loop {
        if tally_rx.borrow_and_update().acquired >= options.frames {
            break;
        }
        if matches!(tokio::time::timeout(stall, tally_rx.changed()).await, Ok(Ok(()))) {
            continue;
        }
        let error = DevFailed::from(camera.last_fault().unwrap_or(CameraError::Timeout(stall)));
        let acquired = tally_rx.borrow().acquired;
        warn!(acquired, error = %error, "no frame arrived");
        if options.mode == ErrorMode::Strict {
            return Err(BenchmarkError::Aborted { acquired, error });
        }
        failures += 1;
        break;
    }
    Ok((started.elapsed(), failures))
}

/// Longest wait for the next pushed frame, the same bound `grab()` uses.
fn stall_timeout(camera: &Camera) -> Duration {
    let exposure = camera.exposure_time().unwrap_or(0.0);
    let twice = Duration::try_from_secs_f64(exposure * 2.0).unwrap_or(Duration::ZERO);
    camera.acquisition_config().grab_timeout.max(twice)
}

async fn read_frame(proxy: &dyn DeviceProxy, source: TriggerSource) -> Result<(u64, u64), DevFailed> {
    if source == TriggerSource::Software {
        proxy.command("Trigger").await?;
    }
    match proxy.read_attribute(IMAGE_ATTRIBUTE).await? {
        AttributeValue::Image {
            sequence_number,
            data,
            ..
        } => Ok((sequence_number, data.len() as u64)),
        other => Err(DevFailed {
            code: 0,
            reason: "UnexpectedValue".to_string(),
            description: format!("'{}' returned {:?}", IMAGE_ATTRIBUTE, other),
        }),
    }
}

async fn stop(proxy: &dyn DeviceProxy) {
    if let Err(e) = proxy.command("Stop").await {
        warn!(error = %e, "stop failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses() {
        assert_eq!(parse_address("local://mock").unwrap(), "mock");
        assert_eq!(parse_address("bench").unwrap(), "bench");
        assert!(matches!(
            parse_address("tango://host:10000/cam/0"),
            Err(BenchmarkError::UnsupportedAddress(_))
        ));
        assert!(parse_address("local://").is_err());
    }

    #[test]
    fn test_report_line() {
        let report = RunReport {
            requested: 10,
            acquired: 8,
            failures: 2,
            lost_in_gaps: 0,
            bytes: 8 * 1024 * 1024,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(report.to_string(), "4.00 Hz, 4.00 MB/s, 8/10 (20.0% dropped)");
    }

    #[test]
    fn test_total_adds_runs() {
        let run = RunReport {
            requested: 4,
            acquired: 3,
            failures: 1,
            lost_in_gaps: 0,
            bytes: 300,
            elapsed: Duration::from_millis(500),
        };
        let sum = total(&[run.clone(), run]);
        assert_eq!((sum.requested, sum.acquired, sum.bytes), (8, 6, 600));
        assert_eq!(sum.elapsed, Duration::from_secs(1));
        assert_eq!(sum.dropped_percent(), 25.0);
    }

    #[test]
    fn test_strict_failure_message() {
        let err = BenchmarkError::Aborted {
            acquired: 7,
            error: DevFailed::from(unicam_core::CameraError::Cancelled),
        };
        assert!(err.to_string().starts_with("Failure after 7 frames: Cancelled [25]"));
    }
}
