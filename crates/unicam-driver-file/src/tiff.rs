//! TIFF directory scanning and decoding.
//!
//! Only single-channel 8- and 16-bit images are replayed. Pixel data is
//! returned little-endian, matching the frame layout of every backend.

use image::codecs::tiff::TiffDecoder;
use image::{ColorType, DynamicImage, ImageDecoder};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use unicam_core::error::{DriverError, DriverErrorKind};
use unicam_core::FrameGeometry;

use crate::file_camera::DRIVER_TYPE;

/// Whether `path` has a `.tif` or `.tiff` extension.
pub fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
        .unwrap_or(false)
}

/// TIFF files directly inside `dir`, sorted by file name.
pub fn list_tiffs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_tiff(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn unreadable(path: &Path, detail: impl std::fmt::Display) -> DriverError {
    DriverError::new(
        DRIVER_TYPE,
        DriverErrorKind::Transfer,
        format!("cannot read {}: {}", path.display(), detail),
    )
}

fn open(path: &Path) -> Result<TiffDecoder<BufReader<File>>, DriverError> {
    let file = File::open(path).map_err(|e| unreadable(path, e))?;
    TiffDecoder::new(BufReader::new(file)).map_err(|e| unreadable(path, e))
}

fn bit_depth(color: ColorType) -> Option<u32> {
    match color {
        ColorType::L8 => Some(8),
        ColorType::L16 => Some(16),
        _ => None,
    }
}

/// Geometry from the TIFF header, without decoding pixels.
pub fn read_geometry(path: &Path) -> Result<FrameGeometry, DriverError> {
    let decoder = open(path)?;
    let (width, height) = decoder.dimensions();
    let bits = bit_depth(decoder.color_type())
        .ok_or_else(|| unreadable(path, format!("unsupported pixel format {:?}", decoder.color_type())))?;
    Ok(FrameGeometry::new(width, height, bits))
}

/// Decode one image, which must match `expected`.
pub fn read_frame(path: &Path, expected: FrameGeometry) -> Result<Vec<u8>, DriverError> {
    let decoder = open(path)?;
    let (width, height) = decoder.dimensions();
    let found = bit_depth(decoder.color_type()).map(|bits| FrameGeometry::new(width, height, bits));
    if found != Some(expected) {
        return Err(unreadable(
            path,
            format!(
                "data format not compatible: {:?} {}x{} [expected {}]",
                decoder.color_type(),
                width,
                height,
                expected
            ),
        ));
    }

    match DynamicImage::from_decoder(decoder).map_err(|e| unreadable(path, e))? {
        DynamicImage::ImageLuma8(buffer) => Ok(buffer.into_raw()),
        DynamicImage::ImageLuma16(buffer) => Ok(buffer
            .into_raw()
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()),
        other => Err(unreadable(path, format!("unsupported pixel format {:?}", other.color()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufWriter;

    fn write_tiff(path: &Path, width: u32, height: u32, bits: u32, pixels: &[u16]) {
        let writer = BufWriter::new(File::create(path).unwrap());
        let encoder = image::codecs::tiff::TiffEncoder::new(writer);
        if bits == 8 {
            let bytes: Vec<u8> = pixels.iter().map(|&v| v as u8).collect();
            encoder
                .encode(&bytes, width, height, image::ExtendedColorType::L8)
                .unwrap();
        } else {
            let bytes: Vec<u8> = pixels.iter().flat_map(|v| v.to_le_bytes()).collect();
            encoder
                .encode(&bytes, width, height, image::ExtendedColorType::L16)
                .unwrap();
        }
    }

    #[test]
    fn test_list_tiffs_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.tif", "a.TIFF", "c.tiff", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.tif")).unwrap();

        let names: Vec<String> = list_tiffs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.TIFF", "b.tif", "c.tiff"]);
    }

    #[test]
    fn test_read_16bit_frame_little_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.tif");
        write_tiff(&path, 2, 2, 16, &[1, 0x0102, 0xffff, 0]);

        let geometry = read_geometry(&path).unwrap();
        assert_eq!(geometry, FrameGeometry::new(2, 2, 16));
        let data = read_frame(&path, geometry).unwrap();
        assert_eq!(data, [1, 0, 0x02, 0x01, 0xff, 0xff, 0, 0]);
    }

    #[test]
    fn test_incompatible_frame_is_transfer_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.tif");
        write_tiff(&path, 3, 2, 8, &[0; 6]);

        let err = read_frame(&path, FrameGeometry::new(4, 2, 8)).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Transfer);
        assert!(err.message.contains("not compatible"));
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.tif");
        std::fs::write(&path, b"definitely not a tiff").unwrap();
        assert!(read_geometry(&path).is_err());
    }
}
