//! Rotated RGB rendering of 16-bit sample windows
//!
//! The line-scan sensor is mounted so that its rows run vertically on the
//! display. Windows are therefore copied into the raster rotated 90°
//! counter-clockwise: source row `r` becomes raster column `r`, and source
//! column `c` becomes raster row `width - 1 - c`.

use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

use super::display_ramp::RampTable;

/// How rendered pixels combine with what is already in the raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    /// Overwrite the raster
    Replace,
    /// Keep the per-channel maximum, accumulating trails across frames
    Max,
}

/// Smallest and largest sample seen while rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRange {
    pub min: u16,
    pub max: u16,
}

/// Raster (width, height) produced for a window of shape (rows, cols)
pub fn rotated_raster_size(rows: usize, cols: usize) -> (u32, u32) {
    (rows as u32, cols as u32)
}

/// Map `window` through `table` into `raster`, rotating 90° CCW
///
/// A raster with the wrong dimensions is replaced by a fresh black one of the
/// right size before rendering.
///
/// # Returns
/// The sample range of the window, or `None` if the window is empty
pub fn render_rotated_ccw(
    window: ArrayView2<u16>,
    table: &RampTable,
    raster: &mut RgbImage,
    mode: Composite,
) -> Option<SampleRange> {
    let (rows, cols) = window.dim();
    if rows == 0 || cols == 0 {
        return None;
    }

    let (width, height) = rotated_raster_size(rows, cols);
    if raster.dimensions() != (width, height) {
        *raster = RgbImage::new(width, height);
    }

    let mut range = SampleRange {
        min: u16::MAX,
        max: u16::MIN,
    };

    for out_y in 0..cols {
        let src_col = cols - 1 - out_y;
        for out_x in 0..rows {
            let sample = window[[out_x, src_col]];
            range.min = range.min.min(sample);
            range.max = range.max.max(sample);

            let mapped = table.map(sample);
            let pixel = raster.get_pixel_mut(out_x as u32, out_y as u32);
            *pixel = match mode {
                Composite::Replace => mapped,
                Composite::Max => Rgb([
                    pixel[0].max(mapped[0]),
                    pixel[1].max(mapped[1]),
                    pixel[2].max(mapped[2]),
                ]),
            };
        }
    }

    Some(range)
}
