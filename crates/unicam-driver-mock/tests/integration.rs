//! Mock camera driven through the full `Camera` stack.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use unicam_core::property::names;
use unicam_core::{
    AcquisitionConfig, Camera, CameraError, CameraFactory, DriverErrorKind, PropertyValue,
    TriggerSource,
};
use unicam_driver_mock::pattern::decode_frame_number;
use unicam_driver_mock::{
    ErrorConfig, ErrorScenario, MockCamera, MockCameraBuilder, MockCameraFactory, MockMode,
    CREATE_RANDOM,
};

fn camera(builder: MockCameraBuilder) -> Arc<Camera> {
    let driver = builder.build().unwrap();
    Arc::new(Camera::new("mock", Box::new(driver), AcquisitionConfig::default()).unwrap())
}

async fn software_triggered(builder: MockCameraBuilder) -> Arc<Camera> {
    let camera = camera(builder);
    camera
        .set(names::TRIGGER_SOURCE, TriggerSource::Software.into())
        .await
        .unwrap();
    camera
}

#[tokio::test]
async fn frames_carry_their_sequence_number() {
    let camera = software_triggered(MockCamera::builder(64, 32).seed(1)).await;
    camera.start().await.unwrap();

    for expected in 0..3u64 {
        camera.trigger().await.unwrap();
        let frame = camera.grab().await.unwrap();
        assert_eq!(frame.sequence_number(), expected);
        assert_eq!(decode_frame_number(frame.data(), frame.geometry()), Some(expected));
    }
    camera.stop().await.unwrap();
}

#[tokio::test]
async fn auto_mode_slow_consumer_drops_frames() {
    let camera = camera(MockCamera::builder(64, 32).create_random(false));
    camera.start().await.unwrap();

    let mut last = None;
    for _ in 0..10 {
        let frame = camera.grab().await.unwrap();
        if let Some(last) = last {
            assert!(frame.sequence_number() > last);
        }
        last = Some(frame.sequence_number());
        drop(frame);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    camera.stop().await.unwrap();

    let stats = camera.stats();
    assert!(stats.frames_dropped > 0, "{:?}", stats);
}

#[tokio::test]
async fn trigger_in_auto_mode_is_invalid() {
    let camera = camera(MockCamera::builder(32, 24));
    camera.start().await.unwrap();
    assert!(matches!(
        camera.trigger().await,
        Err(CameraError::InvalidTriggerMode {
            current: TriggerSource::Auto
        })
    ));
    camera.stop().await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent() {
    let camera = camera(MockCamera::builder(32, 24));
    camera.stop().await.unwrap();
    camera.start().await.unwrap();
    camera.stop().await.unwrap();
    camera.stop().await.unwrap();
    assert!(!camera.is_recording());
    assert_eq!(camera.get(names::IS_RECORDING).unwrap(), PropertyValue::Bool(false));
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let camera = camera(MockCamera::builder(32, 24));
    camera.start().await.unwrap();
    assert!(matches!(camera.start().await, Err(CameraError::AlreadyRecording)));
    camera.stop().await.unwrap();
}

#[tokio::test]
async fn exposure_out_of_range_leaves_value() {
    let camera = camera(MockCamera::builder(32, 24).exposure_time(0.02));
    let err = camera
        .set(names::EXPOSURE_TIME, PropertyValue::Double(20.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CameraError::OutOfRange { .. }));
    assert_eq!(camera.exposure_time().unwrap(), 0.02);
}

#[tokio::test]
async fn recording_write_policy() {
    let camera = camera(MockCamera::builder(64, 48));
    camera.start().await.unwrap();

    camera
        .set(names::EXPOSURE_TIME, PropertyValue::Double(0.005))
        .await
        .unwrap();
    camera.set(CREATE_RANDOM, PropertyValue::Bool(false)).await.unwrap();
    assert!(matches!(
        camera.set(names::ROI_WIDTH, PropertyValue::UInt(32)).await,
        Err(CameraError::NotWritable(_))
    ));
    camera.stop().await.unwrap();

    camera.set(names::ROI_WIDTH, PropertyValue::UInt(32)).await.unwrap();
    assert_eq!(camera.geometry().unwrap().width, 32);
}

#[tokio::test]
async fn roi_outside_sensor_is_rejected_by_hardware() {
    let camera = camera(MockCamera::builder(64, 48));
    let err = camera
        .set(names::ROI_Y, PropertyValue::UInt(10))
        .await
        .unwrap_err();
    assert!(matches!(err, CameraError::HardwareRejected { .. }));
    assert_eq!(camera.get(names::ROI_Y).unwrap(), PropertyValue::UInt(0));
}

#[tokio::test]
async fn corrupted_transfers_cost_one_frame_each() {
    let camera = software_triggered(
        MockCamera::builder(32, 24)
            .error_config(ErrorConfig::scenario(ErrorScenario::CorruptFrame { every: 3 })),
    )
    .await;
    camera.start().await.unwrap();

    let mut delivered = Vec::new();
    let mut lost = 0;
    for _ in 0..6 {
        match camera.trigger().await {
            Ok(()) => delivered.push(camera.grab().await.unwrap().sequence_number()),
            Err(CameraError::HardwareFault(cause)) => {
                assert_eq!(cause.kind, DriverErrorKind::Transfer);
                lost += 1;
            }
            Err(other) => panic!("unexpected {:?}", other),
        }
    }
    assert!(camera.is_recording());
    camera.stop().await.unwrap();

    assert_eq!(delivered, [0, 1, 3, 4]);
    assert_eq!(lost, 2);
    assert_eq!(camera.stats().frames_dropped, 2);
}

#[tokio::test]
async fn hardware_fault_stops_recording() {
    let camera = camera(MockCamera::builder(32, 24).error_config(ErrorConfig::scenario(
        ErrorScenario::FailAfterN {
            operation: "capture".into(),
            count: 2,
        },
    )));
    let mut state = camera.subscribe_state();
    camera.start().await.unwrap();

    state
        .wait_for(|s| *s == unicam_core::AcquisitionState::Idle)
        .await
        .unwrap();
    let err = loop {
        match camera.grab().await {
            Ok(_) => continue,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, CameraError::HardwareFault(ref cause) if cause.kind == DriverErrorKind::Hardware));
    assert!(matches!(camera.last_fault(), Some(CameraError::HardwareFault(_))));
}

#[tokio::test]
async fn lost_link_fails_start() {
    let camera = camera(
        MockCamera::builder(32, 24).error_config(ErrorConfig::scenario(ErrorScenario::CommunicationLoss)),
    );
    assert!(matches!(camera.start().await, Err(CameraError::DeviceUnavailable(_))));
    assert!(!camera.is_recording());
}

#[tokio::test]
async fn external_trigger_one_frame_per_pulse() {
    let driver = MockCamera::builder(32, 24).build().unwrap();
    let line = driver.trigger_line();
    let camera = Camera::new("mock", Box::new(driver), AcquisitionConfig::default()).unwrap();
    camera
        .set(names::TRIGGER_SOURCE, TriggerSource::External.into())
        .await
        .unwrap();
    camera.start().await.unwrap();

    for expected in 0..3u64 {
        line.pulse();
        let frame = camera.grab_timeout(Duration::from_secs(1)).await.unwrap();
        assert_eq!(frame.sequence_number(), expected);
    }
    assert!(matches!(
        camera.grab_timeout(Duration::from_millis(30)).await,
        Err(CameraError::Timeout(_))
    ));
    camera.stop().await.unwrap();
}

#[tokio::test]
async fn async_transfer_needs_a_callback() {
    let camera = software_triggered(MockCamera::builder(32, 24)).await;
    camera
        .set(names::TRANSFER_ASYNCHRONOUSLY, PropertyValue::Bool(true))
        .await
        .unwrap();
    assert!(matches!(camera.start().await, Err(CameraError::NoFrameCallback)));

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        camera.set_frame_callback(move |frame| seen.lock().push(frame.sequence_number()));
    }
    camera.start().await.unwrap();
    for _ in 0..3 {
        camera.trigger().await.unwrap();
    }
    camera.stop().await.unwrap();

    assert_eq!(*seen.lock(), [0, 1, 2]);
}

#[tokio::test]
async fn realistic_mode_paces_frames() {
    let camera = camera(
        MockCamera::builder(32, 24)
            .mode(MockMode::Realistic)
            .exposure_time(0.001)
            .frames_per_second(50.0),
    );
    camera.start().await.unwrap();
    let started = Instant::now();
    for _ in 0..3 {
        camera.grab().await.unwrap();
    }
    camera.stop().await.unwrap();

    // Three frames at 20 ms each.
    assert!(started.elapsed() >= Duration::from_millis(50), "{:?}", started.elapsed());
}

#[tokio::test]
async fn factory_default_runs_at_its_frame_rate() {
    let args: toml::Value =
        toml::from_str("width = 32\nheight = 24\nframes_per_second = 10.0\nexposure_time = 0.1")
            .unwrap();
    let driver = MockCameraFactory.build(args).await.unwrap();
    let camera = Camera::new("mock", driver, AcquisitionConfig::default()).unwrap();

    camera.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    camera.stop().await.unwrap();

    let stats = camera.stats();
    assert!(stats.frames_produced <= 3, "{:?}", stats);
}
