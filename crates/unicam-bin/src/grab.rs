//! `unicam grab`: record frames and write them to disk.
//!
//! Frames are copied out of the pool into a ring of `frames` slots (256 when
//! only a duration is given), so a long duration run keeps the most recent
//! frames. Files are written after recording stops: one raw file per frame,
//! or a single multi-page TIFF.

use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tiff::encoder::{colortype, TiffEncoder};
use tracing::info;
use unicam_core::{Camera, OwnedFrame};

/// Ring size when recording by duration only.
pub const DEFAULT_RING_SIZE: usize = 256;

/// Ring slots reserved up front; a larger ring grows as frames arrive.
const PREALLOCATED_FRAMES: usize = 1024;

/// What to record and where to put it.
#[derive(Debug, Clone, PartialEq)]
pub struct GrabOptions {
    /// Stop after this many frames
    pub frames: Option<u64>,
    /// Stop after this much time
    pub duration: Option<Duration>,
    /// File name prefix
    pub prefix: PathBuf,
    /// Write one multi-page TIFF instead of raw files
    pub tiff: bool,
}

impl GrabOptions {
    fn ring_size(&self) -> usize {
        self.frames
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_RING_SIZE)
            .max(1)
    }
}

/// Outcome of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct GrabSummary {
    /// Frames grabbed
    pub recorded: u64,
    /// Wall-clock recording time
    pub elapsed: Duration,
    /// Files written, in frame order
    pub files: Vec<PathBuf>,
}

impl GrabSummary {
    /// Average frame rate.
    pub fn frames_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.recorded as f64 / secs
        } else {
            0.0
        }
    }
}

/// Record until the frame count or duration is reached, then write files.
pub async fn record(camera: &Camera, options: &GrabOptions) -> Result<GrabSummary> {
    if options.frames.is_none() && options.duration.is_none() {
        bail!("Specify at least one of --frames and --duration");
    }
    if options.frames == Some(0) {
        bail!("--frames must be at least 1");
    }

    let geometry = camera.geometry()?;
    println!(
        "Start recording: {}x{} at {} bits/pixel",
        geometry.width, geometry.height, geometry.bit_depth
    );

    let capacity = options.ring_size();
    let mut ring: VecDeque<OwnedFrame> =
        VecDeque::with_capacity(capacity.min(PREALLOCATED_FRAMES));
    camera.start().await.context("Failed to start recording")?;

    let started = Instant::now();
    let mut last_printed = Duration::ZERO;
    let mut recorded = 0u64;
    let outcome: Result<()> = loop {
        let frame = match camera.grab().await {
            Ok(frame) => frame,
            Err(e) => {
                break Err(anyhow::Error::new(e).context(format!("Grab failed after {} frames", recorded)))
            }
        };
        if ring.len() == capacity {
            ring.pop_front();
        }
        ring.push_back(frame.into_owned());
        recorded += 1;

        let elapsed = started.elapsed();
        if options.frames == Some(recorded) || options.duration.is_some_and(|d| elapsed >= d) {
            break Ok(());
        }
        if elapsed - last_printed >= Duration::from_secs(1) {
            println!(
                "Recorded {} frames at {:.2} frames/s",
                recorded,
                recorded as f64 / elapsed.as_secs_f64()
            );
            last_printed = elapsed;
        }
    };
    let elapsed = started.elapsed();
    camera.stop().await.context("Failed to stop recording")?;
    outcome?;

    let mut summary = GrabSummary {
        recorded,
        elapsed,
        files: Vec::new(),
    };
    println!("Stop recording: {:.2} frames/s", summary.frames_per_second());

    let prefix = options.prefix.clone();
    let tiff = options.tiff;
    summary.files = tokio::task::spawn_blocking(move || write_frames(&prefix, ring, tiff))
        .await
        .context("Writer task failed")??;
    info!(frames = recorded, files = summary.files.len(), "recording written");
    Ok(summary)
}

/// `PREFIX-00000042.raw`.
pub fn frame_path(prefix: &Path, index: usize) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("-{:08}.raw", index));
    PathBuf::from(name)
}

/// `PREFIX.tif`.
pub fn stack_path(prefix: &Path) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".tif");
    PathBuf::from(name)
}

/// Write frames in order: raw files numbered from 0, or one TIFF page per
/// frame.
pub fn write_frames(
    prefix: &Path,
    frames: impl IntoIterator<Item = OwnedFrame>,
    tiff: bool,
) -> Result<Vec<PathBuf>> {
    if tiff {
        let path = stack_path(prefix);
        write_stack(&path, frames)?;
        return Ok(vec![path]);
    }

    let mut written = Vec::new();
    for (index, frame) in frames.into_iter().enumerate() {
        let path = frame_path(prefix, index);
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&frame.data)
            .and_then(|()| writer.flush())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn write_stack(path: &Path, frames: impl IntoIterator<Item = OwnedFrame>) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut encoder = TiffEncoder::new(&mut writer)
        .with_context(|| format!("Failed to start {}", path.display()))?;
    for (page, frame) in frames.into_iter().enumerate() {
        write_page(&mut encoder, &frame)
            .with_context(|| format!("Failed to write page {} of {}", page, path.display()))?;
    }
    drop(encoder);
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn write_page<W: Write + Seek>(encoder: &mut TiffEncoder<W>, frame: &OwnedFrame) -> Result<()> {
    let g = frame.geometry;
    match g.bytes_per_pixel() {
        1 => encoder.write_image::<colortype::Gray8>(g.width, g.height, &frame.data)?,
        2 => {
            let pixels: Vec<u16> = frame
                .data
                .chunks_exact(2)
                .map(|p| u16::from_le_bytes([p[0], p[1]]))
                .collect();
            encoder.write_image::<colortype::Gray16>(g.width, g.height, &pixels)?
        }
        n => bail!("cannot write {}-byte pixels as TIFF", n),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicam_core::AcquisitionConfig;
    use unicam_driver_mock::{MockCamera, MockMode};

    fn mock(width: u32, height: u32, bitdepth: u32) -> Camera {
        let driver = MockCamera::builder(width, height)
            .bitdepth(bitdepth)
            .build()
            .unwrap();
        Camera::new("mock", Box::new(driver), AcquisitionConfig::default()).unwrap()
    }

    async fn frame(width: u32, height: u32, bitdepth: u32) -> OwnedFrame {
        let camera = mock(width, height, bitdepth);
        camera.start().await.unwrap();
        let frame = camera.grab().await.unwrap().into_owned();
        camera.stop().await.unwrap();
        frame
    }

    #[test]
    fn test_output_paths() {
        assert_eq!(
            frame_path(Path::new("/tmp/run"), 42),
            PathBuf::from("/tmp/run-00000042.raw")
        );
        assert_eq!(stack_path(Path::new("frame")), PathBuf::from("frame.tif"));
    }

    #[tokio::test]
    async fn test_raw_files() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("shot");

        let eight = frame(32, 16, 8).await;
        let raw = write_frames(&prefix, [eight.clone()], false).unwrap();
        assert_eq!(raw, vec![dir.path().join("shot-00000000.raw")]);
        assert_eq!(std::fs::read(&raw[0]).unwrap(), eight.data);
    }

    #[tokio::test]
    async fn test_tiff_stack_has_one_page_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("stack");
        let frames = vec![
            frame(32, 16, 16).await,
            frame(32, 16, 16).await,
            frame(32, 16, 16).await,
        ];
        let expected: Vec<u16> = frames[2]
            .data
            .chunks_exact(2)
            .map(|p| u16::from_le_bytes([p[0], p[1]]))
            .collect();

        let written = write_frames(&prefix, frames, true).unwrap();
        assert_eq!(written, vec![dir.path().join("stack.tif")]);

        let file = File::open(&written[0]).unwrap();
        let mut decoder = tiff::decoder::Decoder::new(std::io::BufReader::new(file)).unwrap();
        let mut pages = 1;
        while decoder.more_images() {
            decoder.next_image().unwrap();
            pages += 1;
        }
        assert_eq!(pages, 3);
        assert_eq!(decoder.dimensions().unwrap(), (32, 16));
        assert_eq!(decoder.colortype().unwrap(), tiff::ColorType::Gray(16));
        match decoder.read_image().unwrap() {
            tiff::decoder::DecodingResult::U16(pixels) => assert_eq!(pixels, expected),
            other => panic!("unexpected pixel type {:?}", std::mem::discriminant(&other)),
        }
    }

    #[tokio::test]
    async fn test_eight_bit_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let eight = frame(32, 16, 8).await;
        let written = write_frames(&dir.path().join("gray"), [eight], true).unwrap();

        let file = File::open(&written[0]).unwrap();
        let mut decoder = tiff::decoder::Decoder::new(std::io::BufReader::new(file)).unwrap();
        assert_eq!(decoder.colortype().unwrap(), tiff::ColorType::Gray(8));
        assert!(!decoder.more_images());
    }

    #[tokio::test]
    async fn test_huge_frame_count_does_not_preallocate() {
        let dir = tempfile::tempdir().unwrap();
        let driver = MockCamera::builder(16, 8)
            .mode(MockMode::Realistic)
            .frames_per_second(100.0)
            .build()
            .unwrap();
        let camera = Camera::new("mock", Box::new(driver), AcquisitionConfig::default()).unwrap();
        let options = GrabOptions {
            frames: Some(u64::MAX),
            duration: Some(Duration::from_millis(50)),
            prefix: dir.path().join("frame"),
            tiff: false,
        };

        let summary = record(&camera, &options).await.unwrap();
        assert!(summary.recorded >= 1);
        assert_eq!(summary.files.len() as u64, summary.recorded);
    }

    #[tokio::test]
    async fn test_record_counts_frames_and_writes_ring() {
        let dir = tempfile::tempdir().unwrap();
        let camera = mock(16, 8, 16);
        let options = GrabOptions {
            frames: Some(5),
            duration: None,
            prefix: dir.path().join("frame"),
            tiff: false,
        };

        let summary = record(&camera, &options).await.unwrap();
        assert_eq!(summary.recorded, 5);
        assert_eq!(summary.files.len(), 5);
        assert_eq!(std::fs::metadata(&summary.files[4]).unwrap().len(), 16 * 8 * 2);
        assert!(!camera.is_recording());
    }

    #[tokio::test]
    async fn test_needs_a_stop_condition() {
        let camera = mock(16, 8, 16);
        let options = GrabOptions {
            frames: None,
            duration: None,
            prefix: PathBuf::from("frame"),
            tiff: false,
        };
        assert!(record(&camera, &options).await.is_err());
    }
}
