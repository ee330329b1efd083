//! Test pattern generation for mock camera frames.
//!
//! Layout of a frame:
//!
//! - rows 0..16: black, with the frame number printed as eight 4x5 digit
//!   glyphs starting at (2, 1), one blank column between digits
//! - rows 16..: a horizontal gradient across the full sensor width, shifted by
//!   the ROI offset so a moved ROI shows a different slice
//! - optionally, the centre third of the frame filled with Gaussian noise
//!   (mean `ceil(max / 2)`, standard deviation `ceil(max / 8)`)
//!
//! Pixels are little-endian, `bytes_per_pixel` wide, masked to `bit_depth` bits.

use crate::common::MockRng;
use unicam_core::FrameGeometry;

const DIGIT_WIDTH: u32 = 4;
const DIGIT_HEIGHT: u32 = 5;
const DIGIT_COUNT: u32 = 8;
const DIGITS_X: u32 = 2;
const DIGITS_Y: u32 = 1;
const HEADER_ROWS: u32 = 16;

/// Hexadecimal glyphs, row-major, 1 = lit.
const GLYPHS: [[u8; 20]; 16] = [
    // 0
    [0, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 1, 0, 1, 1, 0],
    // 1
    [0, 0, 1, 0, 0, 1, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0],
    // 2
    [0, 1, 1, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 1, 1, 1],
    // 3
    [0, 1, 1, 0, 1, 0, 0, 1, 0, 0, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0],
    // 4
    [1, 0, 0, 0, 1, 0, 0, 1, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 0, 1],
    // 5
    [1, 1, 1, 1, 1, 0, 0, 0, 0, 1, 1, 0, 0, 0, 0, 1, 1, 1, 1, 0],
    // 6
    [0, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0],
    // 7
    [1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 1, 0, 0, 0],
    // 8
    [0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 0],
    // 9
    [0, 1, 1, 0, 1, 0, 0, 1, 0, 1, 1, 1, 0, 0, 0, 1, 1, 1, 1, 0],
    // A
    [0, 1, 1, 0, 1, 0, 0, 1, 1, 1, 1, 1, 1, 0, 0, 1, 1, 0, 0, 1],
    // B
    [1, 1, 1, 0, 1, 0, 0, 1, 1, 1, 1, 0, 1, 0, 0, 1, 1, 1, 1, 0],
    // C
    [0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 1, 1, 1],
    // D
    [1, 1, 1, 0, 1, 0, 0, 1, 1, 0, 0, 1, 1, 0, 0, 1, 1, 1, 1, 0],
    // E
    [1, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 1],
    // F
    [1, 1, 1, 1, 1, 0, 0, 0, 1, 1, 1, 0, 1, 0, 0, 0, 1, 0, 0, 0],
];

/// Largest pixel value for a bit depth; doubles as the pixel mask.
pub fn max_value(bit_depth: u32) -> u32 {
    if bit_depth >= 32 {
        u32::MAX
    } else {
        (1u32 << bit_depth) - 1
    }
}

/// Inputs for one rendered frame.
#[derive(Debug, Clone, Copy)]
pub struct PatternParams {
    /// Frame geometry (ROI size and bit depth)
    pub geometry: FrameGeometry,
    /// ROI column offset on the sensor
    pub roi_x: u32,
    /// Full sensor width the gradient spans
    pub sensor_width: u32,
    /// Number printed in the header
    pub frame_number: u64,
}

/// Pixel writer over a frame buffer.
struct Canvas<'a> {
    buffer: &'a mut [u8],
    width: u32,
    height: u32,
    bytes: usize,
    mask: u32,
}

impl Canvas<'_> {
    fn set(&mut self, x: u32, y: u32, value: u32) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = (y as usize * self.width as usize + x as usize) * self.bytes;
        let value = value & self.mask;
        for (i, byte) in self.buffer[offset..offset + self.bytes].iter_mut().enumerate() {
            *byte = (value >> (i * 8)) as u8;
        }
    }

    fn digit(&mut self, digit: usize, x: u32, y: u32) {
        let glyph = &GLYPHS[digit & 0xf];
        for j in 0..DIGIT_HEIGHT {
            for i in 0..DIGIT_WIDTH {
                let lit = glyph[(j * DIGIT_WIDTH + i) as usize] != 0;
                self.set(x + i, y + j, if lit { self.mask } else { 0 });
            }
        }
    }

    fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes
    }
}

/// Render one frame into `buffer`, which holds exactly `geometry.frame_size()` bytes.
///
/// With `noise`, the centre third is overwritten with Gaussian samples drawn
/// from it.
pub fn render_frame(buffer: &mut [u8], params: &PatternParams, noise: Option<&MockRng>) {
    let geometry = params.geometry;
    let mut canvas = Canvas {
        buffer,
        width: geometry.width,
        height: geometry.height,
        bytes: geometry.bytes_per_pixel(),
        mask: max_value(geometry.bit_depth),
    };
    let row_bytes = canvas.row_bytes();

    // Header
    let header_end = (HEADER_ROWS.min(geometry.height) as usize) * row_bytes;
    canvas.buffer[..header_end].fill(0);

    let mut number = params.frame_number % 100_000_000;
    let mut divisor = 10_000_000u64;
    let mut x = DIGITS_X;
    while divisor > 0 {
        canvas.digit((number / divisor) as usize, x, DIGITS_Y);
        number %= divisor;
        divisor /= 10;
        x += DIGIT_WIDTH + 1;
    }

    // Gradient body
    if geometry.height > HEADER_ROWS {
        let mut line = vec![0u8; row_bytes];
        {
            let mut line_canvas = Canvas {
                buffer: &mut line,
                width: geometry.width,
                height: 1,
                bytes: canvas.bytes,
                mask: canvas.mask,
            };
            let sensor_width = f64::from(params.sensor_width.max(1));
            let max = f64::from(canvas.mask);
            for p in 0..geometry.width {
                let column = f64::from(params.roi_x.saturating_add(p));
                let value = (column * max / sensor_width).round().min(max);
                line_canvas.set(p, 0, value as u32);
            }
        }
        for row in canvas.buffer[header_end..].chunks_exact_mut(row_bytes) {
            row.copy_from_slice(&line);
        }
    }

    if let Some(rng) = noise {
        let max = f64::from(canvas.mask);
        let mean = (max / 2.0).ceil();
        let std_dev = (max / 8.0).ceil();
        let (x0, x1) = (geometry.width / 3, geometry.width * 2 / 3);
        let (y0, y1) = (geometry.height / 3, geometry.height * 2 / 3);
        let mut samples = vec![0.0; (x1 - x0) as usize];
        for y in y0..y1 {
            rng.fill_gaussian(&mut samples, mean, std_dev);
            for (x, sample) in (x0..x1).zip(samples.iter()) {
                canvas.set(x, y, sample.round().clamp(0.0, max) as u32);
            }
        }
    }
}

/// Read back the frame number printed by [`render_frame`].
///
/// Returns `None` if the frame is too small to hold the header or a glyph is
/// not a decimal digit.
pub fn decode_frame_number(buffer: &[u8], geometry: FrameGeometry) -> Option<u64> {
    let needed_width = DIGITS_X + DIGIT_COUNT * (DIGIT_WIDTH + 1);
    if geometry.width < needed_width || geometry.height < DIGITS_Y + DIGIT_HEIGHT {
        return None;
    }
    let bytes = geometry.bytes_per_pixel();
    let lit = |x: u32, y: u32| {
        let offset = (y as usize * geometry.width as usize + x as usize) * bytes;
        buffer
            .get(offset..offset + bytes)
            .map(|px| px.iter().any(|b| *b != 0))
            .unwrap_or(false)
    };

    let mut number = 0u64;
    for d in 0..DIGIT_COUNT {
        let x0 = DIGITS_X + d * (DIGIT_WIDTH + 1);
        let digit = GLYPHS[..10].iter().position(|glyph| {
            (0..DIGIT_HEIGHT).all(|j| {
                (0..DIGIT_WIDTH).all(|i| {
                    (glyph[(j * DIGIT_WIDTH + i) as usize] != 0) == lit(x0 + i, DIGITS_Y + j)
                })
            })
        })?;
        number = number * 10 + digit as u64;
    }
    Some(number)
}
