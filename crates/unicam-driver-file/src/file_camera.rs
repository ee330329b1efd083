//! File camera: replays a directory of TIFF images as frames.
//!
//! Files are played once, in file-name order, from the start of each
//! recording session. After the last one every capture fails with
//! `EndOfStream`. The geometry is taken from the first readable file, so the
//! ROI properties are read-only and `path` cannot change while recording.

use crate::tiff::{list_tiffs, read_frame, read_geometry};
use anyhow::bail;
use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use unicam_core::driver::parse_args;
use unicam_core::error::{DriverError, DriverErrorKind};
use unicam_core::property::{base_descriptors, names};
use unicam_core::{
    ArmRequest, CameraDriver, CameraError, CameraFactory, CaptureRequest, DescriptorTable,
    FrameGeometry, PropertyDescriptor, PropertyValue, Result, TriggerSource, ValueType,
};

/// Backend type name.
pub const DRIVER_TYPE: &str = "file";

/// Directory to replay.
pub const PATH: &str = "path";

const FIXED_GEOMETRY: [&str; 4] = [names::ROI_X, names::ROI_Y, names::ROI_WIDTH, names::ROI_HEIGHT];

static FILE_DESCRIPTORS: OnceCell<Arc<DescriptorTable>> = OnceCell::new();

/// Descriptor table shared by every file camera.
pub fn file_descriptors() -> Result<Arc<DescriptorTable>> {
    FILE_DESCRIPTORS
        .get_or_try_init(|| {
            let mut builder = DescriptorTable::builder().with_base();
            for descriptor in base_descriptors()
                .into_iter()
                .filter(|d| FIXED_GEOMETRY.contains(&d.name.as_str()))
            {
                builder = builder.override_property(descriptor.read_only());
            }
            builder
                .property(
                    PropertyDescriptor::new(PATH, ValueType::String)
                        .with_description("Path to directory containing TIFF files")
                        .with_default("."),
                )
                .build()
        })
        .map(Arc::clone)
}

/// Constructor arguments for [`FileCamera`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileCameraConfig {
    /// Directory to replay
    pub path: PathBuf,
}

impl Default for FileCameraConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
        }
    }
}

impl FileCameraConfig {
    /// Check the arguments without building anything.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.path.as_os_str().is_empty() {
            bail!("path must not be empty");
        }
        Ok(())
    }
}

/// Factory for [`FileCamera`] instances.
pub struct FileCameraFactory;

impl CameraFactory for FileCameraFactory {
    fn description(&self) -> &str {
        "Replays a directory of TIFF images"
    }

    fn descriptors(&self) -> Result<Arc<DescriptorTable>> {
        file_descriptors()
    }

    fn validate(&self, args: &toml::Value) -> anyhow::Result<()> {
        let cfg: FileCameraConfig = args.clone().try_into()?;
        cfg.validate()
    }

    fn build(
        &self,
        args: toml::Value,
    ) -> BoxFuture<'static, std::result::Result<Box<dyn CameraDriver>, DriverError>> {
        Box::pin(async move {
            let cfg: FileCameraConfig = parse_args(DRIVER_TYPE, args)?;
            let camera = FileCamera::open(cfg).await?;
            Ok(Box::new(camera) as Box<dyn CameraDriver>)
        })
    }
}

// =============================================================================
// Playlist
// =============================================================================

#[derive(Debug, Clone)]
struct Playlist {
    dir: PathBuf,
    files: Vec<PathBuf>,
    geometry: Option<FrameGeometry>,
    cursor: usize,
}

impl Playlist {
    fn scan(dir: &Path) -> std::result::Result<Self, DriverError> {
        let files = list_tiffs(dir).map_err(|e| {
            DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::InvalidParameter,
                format!("cannot open directory {}: {}", dir.display(), e),
            )
        })?;

        let mut geometry = None;
        for file in &files {
            match read_geometry(file) {
                Ok(g) => {
                    geometry = Some(g);
                    break;
                }
                Err(e) => warn!(path = %file.display(), error = %e, "skipping unreadable TIFF"),
            }
        }
        if geometry.is_none() && !files.is_empty() {
            warn!(path = %dir.display(), "no readable TIFF files");
        }
        info!(
            path = %dir.display(),
            files = files.len(),
            geometry = ?geometry.map(|g| g.to_string()),
            "file camera playlist loaded"
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            geometry,
            cursor: 0,
        })
    }

    /// Values the store must mirror after a (re)scan.
    fn reported(&self) -> Vec<(String, PropertyValue)> {
        let mut values = vec![(PATH.to_string(), self.dir.display().to_string().into())];
        if let Some(g) = self.geometry {
            values.extend([
                (names::SENSOR_WIDTH.to_string(), g.width.into()),
                (names::SENSOR_HEIGHT.to_string(), g.height.into()),
                (names::SENSOR_BITDEPTH.to_string(), g.bit_depth.into()),
                (names::ROI_WIDTH.to_string(), g.width.into()),
                (names::ROI_HEIGHT.to_string(), g.height.into()),
            ]);
        }
        values
    }
}

async fn blocking<T, F>(f: F) -> std::result::Result<T, DriverError>
where
    F: FnOnce() -> std::result::Result<T, DriverError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        DriverError::new(DRIVER_TYPE, DriverErrorKind::Unknown, format!("blocking task failed: {}", e))
    })?
}

// =============================================================================
// FileCamera
// =============================================================================

/// Camera replaying TIFF files.
#[derive(Debug)]
pub struct FileCamera {
    table: Arc<DescriptorTable>,
    playlist: Mutex<Playlist>,
}

impl FileCamera {
    /// Scan `config.path` and build the camera.
    pub async fn open(config: FileCameraConfig) -> std::result::Result<Self, DriverError> {
        config.validate().map_err(|e| {
            DriverError::new(DRIVER_TYPE, DriverErrorKind::Configuration, e.to_string())
        })?;
        let table = file_descriptors().map_err(|e| {
            DriverError::new(DRIVER_TYPE, DriverErrorKind::Initialization, e.to_string())
        })?;
        let path = config.path;
        let playlist = blocking(move || Playlist::scan(&path)).await?;
        Ok(Self {
            table,
            playlist: Mutex::new(playlist),
        })
    }

    /// Number of files in the playlist.
    pub fn len(&self) -> usize {
        self.playlist.lock().files.len()
    }

    /// Whether the playlist is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Files not yet replayed in the current session.
    pub fn remaining(&self) -> usize {
        let playlist = self.playlist.lock();
        playlist.files.len().saturating_sub(playlist.cursor)
    }
}

#[async_trait]
impl CameraDriver for FileCamera {
    fn type_name(&self) -> &str {
        DRIVER_TYPE
    }

    fn descriptors(&self) -> Arc<DescriptorTable> {
        Arc::clone(&self.table)
    }

    fn initial_values(&self) -> Vec<(String, PropertyValue)> {
        let mut values = vec![(names::NAME.to_string(), "file camera".into())];
        values.extend(self.playlist.lock().reported());
        values
    }

    async fn apply_property(
        &self,
        name: &str,
        value: &PropertyValue,
    ) -> Result<Vec<(String, PropertyValue)>> {
        if name != PATH {
            return Ok(Vec::new());
        }
        let dir = PathBuf::from(value.as_str().unwrap_or_default().trim());
        let playlist = blocking(move || Playlist::scan(&dir))
            .await
            .map_err(|e| e.rejected(PATH))?;
        let reported = playlist.reported();
        *self.playlist.lock() = playlist;
        Ok(reported)
    }

    async fn arm(&self, request: &ArmRequest) -> Result<()> {
        let mut playlist = self.playlist.lock();
        let Some(geometry) = playlist.geometry else {
            warn!(path = %playlist.dir.display(), "no files to replay");
            return Err(CameraError::EndOfStream);
        };
        if geometry != request.geometry {
            return Err(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::InvalidParameter,
                format!("requested {} but files are {}", request.geometry, geometry),
            )
            .into());
        }
        playlist.cursor = 0;
        debug!(path = %playlist.dir.display(), files = playlist.files.len(), "file camera armed");
        Ok(())
    }

    async fn disarm(&self) -> Result<()> {
        Ok(())
    }

    async fn capture(&self, request: &CaptureRequest, buffer: &mut [u8]) -> Result<()> {
        if request.trigger_source == TriggerSource::Auto {
            tokio::time::sleep(request.frame_period()).await;
        }

        let next = {
            let mut playlist = self.playlist.lock();
            let file = playlist.files.get(playlist.cursor).cloned();
            if file.is_some() {
                playlist.cursor += 1;
            }
            file
        };
        let Some(file) = next else {
            return Err(CameraError::EndOfStream);
        };

        let geometry = request.geometry;
        let data = blocking(move || read_frame(&file, geometry)).await?;
        if data.len() != buffer.len() {
            return Err(DriverError::new(
                DRIVER_TYPE,
                DriverErrorKind::Transfer,
                format!("decoded {} bytes for a {} byte frame", data.len(), buffer.len()),
            )
            .into());
        }
        buffer.copy_from_slice(&data);
        Ok(())
    }
}
