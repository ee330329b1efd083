//! TIFF replay through the full `Camera` stack.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use unicam_core::property::names;
use unicam_core::{
    AcquisitionConfig, AcquisitionState, Camera, CameraError, CameraFactory, DriverErrorKind,
    PropertyValue, TriggerSource,
};
use unicam_driver_file::{FileCameraFactory, PATH};

fn write_tiff(path: &Path, width: u32, height: u32, bits: u32, fill: u16) {
    let writer = BufWriter::new(File::create(path).unwrap());
    let encoder = image::codecs::tiff::TiffEncoder::new(writer);
    let pixels = (width * height) as usize;
    if bits == 8 {
        let bytes = vec![fill as u8; pixels];
        encoder
            .encode(&bytes, width, height, image::ExtendedColorType::L8)
            .unwrap();
    } else {
        let bytes: Vec<u8> = std::iter::repeat(fill.to_le_bytes())
            .take(pixels)
            .flatten()
            .collect();
        encoder
            .encode(&bytes, width, height, image::ExtendedColorType::L16)
            .unwrap();
    }
}

fn args(dir: &Path) -> toml::Value {
    let mut table = toml::Table::new();
    table.insert(
        "path".into(),
        toml::Value::String(dir.display().to_string()),
    );
    toml::Value::Table(table)
}

async fn camera(dir: &Path) -> Arc<Camera> {
    let driver = FileCameraFactory.build(args(dir)).await.unwrap();
    Arc::new(Camera::new("file", driver, AcquisitionConfig::default()).unwrap())
}

/// Three 4x3 8-bit frames written out of order, plus a non-TIFF file.
fn sample_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_tiff(&dir.path().join("frame-002.tif"), 4, 3, 8, 20);
    write_tiff(&dir.path().join("frame-000.tif"), 4, 3, 8, 0);
    write_tiff(&dir.path().join("frame-001.tiff"), 4, 3, 8, 10);
    std::fs::write(dir.path().join("README.txt"), b"not an image").unwrap();
    dir
}

#[tokio::test]
async fn geometry_comes_from_files() {
    let dir = sample_dir();
    let camera = camera(dir.path()).await;

    assert_eq!(camera.get(names::SENSOR_WIDTH).unwrap(), PropertyValue::UInt(4));
    assert_eq!(camera.get(names::ROI_HEIGHT).unwrap(), PropertyValue::UInt(3));
    assert_eq!(camera.get(names::SENSOR_BITDEPTH).unwrap(), PropertyValue::UInt(8));
    assert_eq!(camera.get(names::NAME).unwrap(), PropertyValue::String("file camera".into()));
    assert!(matches!(
        camera.set(names::ROI_WIDTH, PropertyValue::UInt(2)).await,
        Err(CameraError::NotWritable(_))
    ));
}

#[tokio::test]
async fn replays_sorted_then_end_of_stream() {
    let dir = sample_dir();
    let camera = camera(dir.path()).await;
    camera
        .set(names::EXPOSURE_TIME, PropertyValue::Double(0.0001))
        .await
        .unwrap();
    camera
        .set(names::FRAMES_PER_SECOND, PropertyValue::Double(10_000.0))
        .await
        .unwrap();
    camera.start().await.unwrap();

    for (sequence, fill) in [(0u64, 0u8), (1, 10), (2, 20)] {
        let frame = camera.grab_timeout(Duration::from_secs(2)).await.unwrap();
        assert_eq!(frame.sequence_number(), sequence);
        assert!(frame.data().iter().all(|&b| b == fill));
    }
    assert!(matches!(
        camera.grab_timeout(Duration::from_secs(2)).await,
        Err(CameraError::EndOfStream)
    ));
    assert_eq!(camera.state(), AcquisitionState::Idle);

    // Each session replays from the first file.
    camera.start().await.unwrap();
    let frame = camera.grab_timeout(Duration::from_secs(2)).await.unwrap();
    assert!(frame.data().iter().all(|&b| b == 0));
    drop(frame);
    camera.stop().await.unwrap();
}

#[tokio::test]
async fn unreadable_file_costs_one_frame() {
    let dir = sample_dir();
    std::fs::write(dir.path().join("frame-001b.tif"), b"corrupt").unwrap();
    let camera = camera(dir.path()).await;
    camera
        .set(names::TRIGGER_SOURCE, TriggerSource::Software.into())
        .await
        .unwrap();
    camera.start().await.unwrap();

    camera.trigger().await.unwrap();
    camera.trigger().await.unwrap();
    match camera.trigger().await {
        Err(CameraError::HardwareFault(cause)) => assert_eq!(cause.kind, DriverErrorKind::Transfer),
        other => panic!("expected transfer fault, got {:?}", other),
    }
    camera.trigger().await.unwrap();

    let sequences: Vec<u64> = [
        camera.grab().await.unwrap().sequence_number(),
        camera.grab().await.unwrap().sequence_number(),
        camera.grab().await.unwrap().sequence_number(),
    ]
    .into();
    assert_eq!(sequences, [0, 1, 3]);
    assert!(matches!(camera.trigger().await, Err(CameraError::EndOfStream)));
}

#[tokio::test]
async fn changing_path_updates_geometry() {
    let first = sample_dir();
    let second = tempfile::tempdir().unwrap();
    write_tiff(&second.path().join("a.tif"), 6, 5, 16, 0x0102);

    let camera = camera(first.path()).await;
    let padded = format!("  {}  ", second.path().display());
    camera.set(PATH, PropertyValue::String(padded)).await.unwrap();

    assert_eq!(camera.geometry().unwrap(), unicam_core::FrameGeometry::new(6, 5, 16));
    assert_eq!(
        camera.get(PATH).unwrap(),
        PropertyValue::String(second.path().display().to_string())
    );

    camera.start().await.unwrap();
    let frame = camera.grab_timeout(Duration::from_secs(2)).await.unwrap();
    assert_eq!(frame.pixel(0, 0), Some(0x0102));
    drop(frame);

    assert!(matches!(
        camera
            .set(PATH, PropertyValue::String(first.path().display().to_string()))
            .await,
        Err(CameraError::NotWritable(_))
    ));
    camera.stop().await.unwrap();
}

#[tokio::test]
async fn missing_directory_is_rejected() {
    let dir = sample_dir();
    let camera = camera(dir.path()).await;
    let before = camera.get(PATH).unwrap();

    let err = camera
        .set(PATH, PropertyValue::String("/nonexistent/unicam".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, CameraError::HardwareRejected { ref property, .. } if property == PATH));
    assert_eq!(camera.get(PATH).unwrap(), before);
}

#[tokio::test]
async fn empty_directory_cannot_start() {
    let dir = tempfile::tempdir().unwrap();
    let camera = camera(dir.path()).await;
    assert!(matches!(camera.start().await, Err(CameraError::EndOfStream)));
    assert!(!camera.is_recording());
}

#[tokio::test]
async fn factory_rejects_unknown_arguments() {
    let mut table = toml::Table::new();
    table.insert("directory".into(), toml::Value::String(".".into()));
    assert!(FileCameraFactory.validate(&toml::Value::Table(table)).is_err());

    let err = FileCameraFactory
        .build(args(Path::new("/nonexistent/unicam")))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind, DriverErrorKind::InvalidParameter);
}
