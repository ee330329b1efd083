//! Frames and frame-loss bookkeeping.

use chrono::{DateTime, Utc};
use unicam_pool::Loaned;

/// Pixel geometry of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameGeometry {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Significant bits per pixel
    pub bit_depth: u32,
}

impl FrameGeometry {
    /// Create a geometry.
    pub fn new(width: u32, height: u32, bit_depth: u32) -> Self {
        Self {
            width,
            height,
            bit_depth,
        }
    }

    /// Bytes per pixel: `ceil(bit_depth / 8)`, at least 1.
    pub fn bytes_per_pixel(&self) -> usize {
        (self.bit_depth as usize).div_ceil(8).max(1)
    }

    /// Size of one frame in bytes.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel()
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for FrameGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{}bit", self.width, self.height, self.bit_depth)
    }
}

/// One captured frame.
///
/// The pixel buffer is on loan from the session's pool and goes back when the
/// frame is dropped. Use [`Frame::to_vec`] or [`Frame::into_owned`] to keep
/// the pixels longer.
pub struct Frame {
    data: Loaned<Vec<u8>>,
    geometry: FrameGeometry,
    sequence_number: u64,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub(crate) fn new(
        data: Loaned<Vec<u8>>,
        geometry: FrameGeometry,
        sequence_number: u64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            data,
            geometry,
            sequence_number,
            captured_at,
        }
    }

    /// Pixel bytes, little-endian per pixel.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.geometry.frame_size().min(self.data.len())]
    }

    /// Pixel geometry.
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Position within the session, starting at 0.
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Capture timestamp.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Copy the pixels out, keeping the frame.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data().to_vec()
    }

    /// Copy the pixels out and return the buffer to the pool.
    pub fn into_owned(self) -> OwnedFrame {
        OwnedFrame {
            data: self.to_vec(),
            geometry: self.geometry,
            sequence_number: self.sequence_number,
            captured_at: self.captured_at,
        }
    }

    /// Pixel value at `(x, y)`, widened to `u32`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        let bpp = self.geometry.bytes_per_pixel();
        let offset = (y as usize * self.geometry.width as usize + x as usize) * bpp;
        let bytes = self.data().get(offset..offset + bpp)?;
        Some(
            bytes
                .iter()
                .take(4)
                .enumerate()
                .fold(0u32, |acc, (i, b)| acc | (u32::from(*b) << (8 * i))),
        )
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence_number", &self.sequence_number)
            .field("geometry", &self.geometry)
            .field("captured_at", &self.captured_at)
            .finish_non_exhaustive()
    }
}

/// A frame copied out of the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedFrame {
    /// Pixel bytes
    pub data: Vec<u8>,
    /// Pixel geometry
    pub geometry: FrameGeometry,
    /// Position within the session
    pub sequence_number: u64,
    /// Capture timestamp
    pub captured_at: DateTime<Utc>,
}

// =============================================================================
// FrameStatistics
// =============================================================================

/// Consumer-side frame loss tracking from sequence numbers.
#[derive(Debug, Clone, Default)]
pub struct FrameStatistics {
    /// Frames seen
    pub total_frames: u64,
    /// Frames missing between consecutive sequence numbers
    pub lost_frames: u64,
    /// Number of gaps detected
    pub discontinuity_events: u32,
    last_sequence: Option<u64>,
}

impl FrameStatistics {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sequence number and count any gap before it.
    ///
    /// Returns the gap size (0 when contiguous).
    pub fn check_discontinuity(&mut self, sequence_number: u64) -> u64 {
        let mut gap = 0;
        if let Some(last) = self.last_sequence {
            let expected = last + 1;
            if sequence_number != expected {
                gap = sequence_number.saturating_sub(expected);
                self.lost_frames += gap;
                self.discontinuity_events += 1;
                tracing::debug!(
                    expected,
                    got = sequence_number,
                    lost = gap,
                    "frame discontinuity"
                );
            }
        }
        self.last_sequence = Some(sequence_number);
        self.total_frames += 1;
        gap
    }

    /// Last sequence number seen.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicam_pool::Pool;

    #[test]
    fn test_bytes_per_pixel_rounds_up() {
        assert_eq!(FrameGeometry::new(4, 4, 8).bytes_per_pixel(), 1);
        assert_eq!(FrameGeometry::new(4, 4, 12).bytes_per_pixel(), 2);
        assert_eq!(FrameGeometry::new(4, 4, 16).bytes_per_pixel(), 2);
        assert_eq!(FrameGeometry::new(4, 4, 17).bytes_per_pixel(), 3);
        assert_eq!(FrameGeometry::new(640, 480, 16).frame_size(), 640 * 480 * 2);
    }

    #[tokio::test]
    async fn test_frame_returns_buffer_on_drop() {
        let geometry = FrameGeometry::new(2, 2, 16);
        let pool = Pool::new_simple(1, || vec![0u8; 8]);
        let mut buffer = pool.acquire().await.unwrap();
        buffer.copy_from_slice(&[1, 0, 2, 0, 3, 0, 0, 1]);
        let frame = Frame::new(buffer, geometry, 7, Utc::now());
        assert_eq!(pool.available(), 0);

        assert_eq!(frame.pixel(1, 0), Some(2));
        assert_eq!(frame.pixel(1, 1), Some(256));
        assert_eq!(frame.pixel(2, 0), None);

        let owned = frame.into_owned();
        assert_eq!(owned.sequence_number, 7);
        assert_eq!(owned.data.len(), 8);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_discontinuity_counts_gaps() {
        let mut stats = FrameStatistics::new();
        for seq in [0, 1, 2, 5, 6, 9] {
            stats.check_discontinuity(seq);
        }
        assert_eq!(stats.total_frames, 6);
        assert_eq!(stats.lost_frames, 4);
        assert_eq!(stats.discontinuity_events, 2);
        assert_eq!(stats.last_sequence(), Some(9));
    }

    #[test]
    fn test_first_frame_need_not_be_zero() {
        let mut stats = FrameStatistics::new();
        assert_eq!(stats.check_discontinuity(3), 0);
        assert_eq!(stats.check_discontinuity(4), 0);
        assert_eq!(stats.lost_frames, 0);
    }
}
