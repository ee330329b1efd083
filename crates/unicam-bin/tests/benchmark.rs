//! Benchmark runs against the mock camera through the local device proxy.

use std::sync::Arc;
use std::time::Duration;
use unicam_bin::benchmark::{
    self, BenchTrigger, BenchmarkError, BenchmarkOptions, Delivery, ErrorMode,
};
use unicam_core::property::names;
use unicam_core::remote::LocalDeviceProxy;
use unicam_core::{AcquisitionConfig, Camera, PropertyValue};
use unicam_driver_mock::{MockCamera, MockTriggerLine};
use unicam_registry::CameraRegistry;

/// Mock camera whose every third capture fails its transfer.
async fn flaky_proxy() -> LocalDeviceProxy {
    let args: toml::Value = toml::from_str(
        r#"
        width = 32
        height = 16
        seed = 7
        errors = [{ scenario = "corrupt_frame", every = 3 }]
        "#,
    )
    .unwrap();
    let registry = CameraRegistry::with_builtin_backends().unwrap();
    let camera = registry.create("mock", args).await.unwrap();
    LocalDeviceProxy::new(Arc::new(camera))
}

fn options(mode: ErrorMode) -> BenchmarkOptions {
    BenchmarkOptions {
        frames: 9,
        runs: 1,
        mode,
        trigger: BenchTrigger::Software,
        delivery: Delivery::Grab,
        exposure_time: Some(0.001),
    }
}

/// Instant-mode mock wired to an external trigger line.
fn externally_triggered() -> (LocalDeviceProxy, MockTriggerLine) {
    let driver = MockCamera::builder(32, 16).seed(3).build().unwrap();
    let line = driver.trigger_line();
    let config = AcquisitionConfig {
        grab_timeout: Duration::from_millis(100),
        ..AcquisitionConfig::default()
    };
    let camera = Camera::new("mock", Box::new(driver), config).unwrap();
    (LocalDeviceProxy::new(Arc::new(camera)), line)
}

/// Pulse the line every millisecond until the handle is aborted.
fn pulse_generator(line: MockTriggerLine) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(1));
        loop {
            tick.tick().await;
            line.pulse();
        }
    })
}

#[tokio::test]
async fn test_best_effort_counts_failures() {
    let proxy = flaky_proxy().await;
    let mut seen = Vec::new();

    let reports = benchmark::run(&proxy, &options(ErrorMode::BestEffort), |index, report| {
        seen.push((index, report.acquired));
    })
    .await
    .unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.requested, 9);
    assert_eq!(report.acquired, 6);
    assert_eq!(report.failures, 3);
    assert_eq!(report.bytes, 6 * 32 * 16 * 2);
    assert_eq!(seen, vec![(0, 6)]);
    assert!(!proxy.camera().is_recording());
}

#[tokio::test]
async fn test_strict_stops_at_first_failure() {
    let proxy = flaky_proxy().await;

    let err = benchmark::run(&proxy, &options(ErrorMode::Strict), |_, _| {})
        .await
        .unwrap_err();

    assert!(matches!(err, BenchmarkError::Aborted { acquired: 2, .. }));
    assert!(err.to_string().starts_with("Failure after 2 frames"));
    assert!(!proxy.camera().is_recording());
}

#[tokio::test]
async fn test_several_runs_report_separately() {
    let registry = CameraRegistry::with_builtin_backends().unwrap();
    let args: toml::Value = toml::from_str("width = 16\nheight = 8\nseed = 1").unwrap();
    let camera = registry.create("mock", args).await.unwrap();
    let proxy = LocalDeviceProxy::new(Arc::new(camera));
    let options = BenchmarkOptions {
        frames: 4,
        runs: 3,
        ..BenchmarkOptions::default()
    };

    let reports = benchmark::run(&proxy, &options, |_, _| {}).await.unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.acquired == 4 && r.failures == 0));
    assert_eq!(benchmark::total(&reports).acquired, 12);
}

#[tokio::test]
async fn test_callback_delivery_counts_pushed_frames() {
    let registry = CameraRegistry::with_builtin_backends().unwrap();
    let args: toml::Value = toml::from_str("width = 32\nheight = 16\nseed = 2").unwrap();
    let camera = registry.create("mock", args).await.unwrap();
    let proxy = LocalDeviceProxy::new(Arc::new(camera));
    let options = BenchmarkOptions {
        frames: 20,
        delivery: Delivery::Callback,
        ..BenchmarkOptions::default()
    };

    let reports = benchmark::run(&proxy, &options, |_, _| {}).await.unwrap();
    let report = &reports[0];
    assert_eq!(report.acquired, 20);
    assert_eq!(report.failures, 0);
    assert_eq!(report.lost_in_gaps, 0);
    assert_eq!(report.bytes, 20 * 32 * 16 * 2);

    let camera = proxy.camera();
    assert!(!camera.is_recording());
    assert_eq!(
        camera.get(names::TRANSFER_ASYNCHRONOUSLY).unwrap(),
        PropertyValue::Bool(false)
    );

    // Pull delivery works again afterwards.
    let pulled = BenchmarkOptions {
        frames: 3,
        ..BenchmarkOptions::default()
    };
    let reports = benchmark::run(&proxy, &pulled, |_, _| {}).await.unwrap();
    assert_eq!(reports[0].acquired, 3);
}

#[tokio::test]
async fn test_callback_delivery_with_software_trigger() {
    let proxy = flaky_proxy().await;
    let best_effort = BenchmarkOptions {
        delivery: Delivery::Callback,
        ..options(ErrorMode::BestEffort)
    };

    let reports = benchmark::run(&proxy, &best_effort, |_, _| {}).await.unwrap();
    assert_eq!(reports[0].acquired, 6);
    assert_eq!(reports[0].failures, 3);
    assert_eq!(reports[0].bytes, 6 * 32 * 16 * 2);

    let strict = BenchmarkOptions {
        delivery: Delivery::Callback,
        ..options(ErrorMode::Strict)
    };
    let err = benchmark::run(&proxy, &strict, |_, _| {}).await.unwrap_err();
    assert!(matches!(err, BenchmarkError::Aborted { acquired: 2, .. }));
    assert!(!proxy.camera().is_recording());
}

#[tokio::test]
async fn test_external_trigger_reads_pulsed_frames() {
    let (proxy, line) = externally_triggered();
    let pulses = pulse_generator(line);
    let options = BenchmarkOptions {
        frames: 5,
        trigger: BenchTrigger::External,
        ..BenchmarkOptions::default()
    };

    let reports = benchmark::run(&proxy, &options, |_, _| {}).await;
    pulses.abort();

    let report = &reports.unwrap()[0];
    assert_eq!(report.acquired, 5);
    assert_eq!(report.failures, 0);
    assert!(!proxy.camera().is_recording());
}

#[tokio::test]
async fn test_external_trigger_with_callback_delivery() {
    let (proxy, line) = externally_triggered();
    let pulses = pulse_generator(line);
    let options = BenchmarkOptions {
        frames: 5,
        trigger: BenchTrigger::External,
        delivery: Delivery::Callback,
        ..BenchmarkOptions::default()
    };

    let reports = benchmark::run(&proxy, &options, |_, _| {}).await;
    pulses.abort();

    let report = &reports.unwrap()[0];
    assert_eq!(report.acquired, 5);
    assert_eq!(report.bytes, 5 * 32 * 16 * 2);
}

#[tokio::test]
async fn test_silent_trigger_line_ends_the_run() {
    let (proxy, _line) = externally_triggered();
    let mut options = BenchmarkOptions {
        frames: 5,
        trigger: BenchTrigger::External,
        delivery: Delivery::Callback,
        ..BenchmarkOptions::default()
    };

    let reports = benchmark::run(&proxy, &options, |_, _| {}).await.unwrap();
    assert_eq!(reports[0].acquired, 0);
    assert_eq!(reports[0].failures, 1);

    options.mode = ErrorMode::Strict;
    let err = benchmark::run(&proxy, &options, |_, _| {}).await.unwrap_err();
    assert!(matches!(err, BenchmarkError::Aborted { acquired: 0, .. }));
    assert!(!proxy.camera().is_recording());
}
