//! TDI row accumulation
//!
//! A scan is a tall buffer of sensor-width rows, filled one row per tick in
//! capture order. The display shows the most recent frame-height rows,
//! rotated to match the sensor mounting.

use image::RgbImage;
use ndarray::{s, Array2, ArrayView1, ArrayView2};
use shared::camera_interface::FrameDimensions;
use shared::image_proc::{Composite, DisplayRamp, SampleRange};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("Scan is complete ({0} rows)")]
    Complete(usize),

    #[error("Row width {got} does not match scan width {expected}")]
    WidthMismatch { expected: usize, got: usize },

    #[error("Row exposure {0} ms must be positive")]
    InvalidExposure(f64),

    #[error("Scan geometry {0} is empty")]
    EmptyGeometry(FrameDimensions),

    #[error("Scan of {rows} rows x {width} px exceeds {} samples", MAX_SCAN_SAMPLES)]
    TooLarge { rows: usize, width: usize },
}

/// Upper bound on samples held by one scan buffer (4 GiB of 16-bit data)
pub const MAX_SCAN_SAMPLES: usize = 1 << 31;

/// Rows needed for a scan of `duration_minutes` at one row per `row_exposure_ms`
///
/// Never less than one frame height.
pub fn target_row_count(
    duration_minutes: u32,
    row_exposure_ms: f64,
    frame_height: usize,
) -> Result<usize, AssemblyError> {
    if !row_exposure_ms.is_finite() || row_exposure_ms <= 0.0 {
        return Err(AssemblyError::InvalidExposure(row_exposure_ms));
    }
    let rows = (duration_minutes as f64 * 60_000.0 / row_exposure_ms).floor() as usize;
    Ok(rows.max(frame_height))
}

/// Zero-filled scan buffer with an append cursor
///
/// `len` is the logical scan length: the capacity until the scan is stopped
/// early, then the number of rows captured.
#[derive(Debug, Clone)]
pub struct TdiBuffer {
    data: Array2<u16>,
    frame_height: usize,
    captured: usize,
    length: usize,
}

impl TdiBuffer {
    pub fn new(width: usize, frame_height: usize, capacity: usize) -> Self {
        Self {
            data: Array2::zeros((capacity, width)),
            frame_height,
            captured: 0,
            length: capacity,
        }
    }

    /// Write the next row
    ///
    /// # Returns
    /// `Ok(true)` when this row completes the scan
    pub fn append_row(&mut self, row: ArrayView1<u16>) -> Result<bool, AssemblyError> {
        if self.is_complete() {
            return Err(AssemblyError::Complete(self.length));
        }
        if row.len() != self.width() {
            return Err(AssemblyError::WidthMismatch {
                expected: self.width(),
                got: row.len(),
            });
        }
        self.data.row_mut(self.captured).assign(&row);
        self.captured += 1;
        Ok(self.is_complete())
    }

    /// End the scan at the rows captured so far
    pub fn truncate(&mut self) {
        self.length = self.captured;
    }

    /// The newest frame-height rows, or the first frame height before that
    /// many rows exist
    pub fn visible_window(&self) -> ArrayView2<'_, u16> {
        let capacity = self.capacity();
        let start = self.captured.saturating_sub(self.frame_height);
        let end = (start + self.frame_height).min(capacity);
        self.data.slice(s![start..end, ..])
    }

    pub fn captured_rows(&self) -> ArrayView2<'_, u16> {
        self.data.slice(s![..self.captured, ..])
    }

    pub fn row(&self, index: usize) -> Option<ArrayView1<'_, u16>> {
        (index < self.captured).then(|| self.data.row(index))
    }

    pub fn captured(&self) -> usize {
        self.captured
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_complete(&self) -> bool {
        self.captured >= self.length
    }
}

/// A scan in progress or finished
#[derive(Debug, Clone)]
pub struct TdiAssembler {
    buffer: TdiBuffer,
    row_exposure_ms: f64,
}

impl TdiAssembler {
    /// Allocate a scan buffer for the requested duration
    pub fn start(
        duration_minutes: u32,
        row_exposure_ms: f64,
        dims: FrameDimensions,
    ) -> Result<Self, AssemblyError> {
        if dims.width == 0 || dims.height == 0 {
            return Err(AssemblyError::EmptyGeometry(dims));
        }
        let rows = target_row_count(duration_minutes, row_exposure_ms, dims.height)?;
        match rows.checked_mul(dims.width) {
            Some(samples) if samples <= MAX_SCAN_SAMPLES => {}
            _ => {
                return Err(AssemblyError::TooLarge {
                    rows,
                    width: dims.width,
                })
            }
        }
        log::info!(
            "Starting {duration_minutes} min scan: {rows} rows of {} at {row_exposure_ms:.2} ms",
            dims.width
        );
        Ok(Self {
            buffer: TdiBuffer::new(dims.width, dims.height, rows),
            row_exposure_ms,
        })
    }

    /// Append one captured row; `Ok(true)` once the target length is reached
    pub fn append_row(&mut self, row: ArrayView1<u16>) -> Result<bool, AssemblyError> {
        let done = self.buffer.append_row(row)?;
        if done {
            log::info!("Scan complete after {} rows", self.buffer.captured());
        }
        Ok(done)
    }

    /// Freeze the scan at the rows captured so far
    pub fn stop(&mut self) {
        log::info!(
            "Scan stopped at {} of {} rows",
            self.buffer.captured(),
            self.buffer.capacity()
        );
        self.buffer.truncate();
    }

    /// Render the visible window into `raster` and re-level `ramp`
    pub fn render(&self, ramp: &mut DisplayRamp, raster: &mut RgbImage) -> Option<SampleRange> {
        ramp.render(self.buffer.visible_window(), raster, Composite::Replace)
    }

    pub fn buffer(&self) -> &TdiBuffer {
        &self.buffer
    }

    pub fn row_exposure_ms(&self) -> f64 {
        self.row_exposure_ms
    }

    pub fn is_complete(&self) -> bool {
        self.buffer.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn row_of(width: usize, value: u16) -> Array1<u16> {
        Array1::from_elem(width, value)
    }

    #[test]
    fn test_target_row_count() {
        assert_eq!(target_row_count(6, 40.0, 512).unwrap(), 9000);
        // Short scans are padded to one frame height
        assert_eq!(target_row_count(1, 60_000.0, 512).unwrap(), 512);
        assert_eq!(target_row_count(1, 7.0, 16).unwrap(), 8571);
        assert!(target_row_count(6, 0.0, 512).is_err());
        assert!(target_row_count(6, f64::INFINITY, 512).is_err());
    }

    #[test]
    fn test_fills_to_target_then_rejects() {
        let dims = FrameDimensions::new(16, 512, 16);
        let mut scan = TdiAssembler::start(6, 40.0, dims).unwrap();
        assert_eq!(scan.buffer().capacity(), 9000);

        for i in 0..8999 {
            assert!(!scan.append_row(row_of(16, (i % 1000) as u16).view()).unwrap());
        }
        assert!(scan.append_row(row_of(16, 7).view()).unwrap());
        assert!(scan.is_complete());
        assert_eq!(
            scan.append_row(row_of(16, 7).view()),
            Err(AssemblyError::Complete(9000))
        );
        assert_eq!(scan.buffer().captured(), 9000);
    }

    #[test]
    fn test_stop_truncates_and_preserves_rows() {
        let dims = FrameDimensions::new(16, 512, 16);
        let mut scan = TdiAssembler::start(6, 40.0, dims).unwrap();
        for i in 0..4000u16 {
            scan.append_row(row_of(16, i).view()).unwrap();
        }
        scan.stop();

        let buffer = scan.buffer();
        assert_eq!(buffer.len(), 4000);
        assert!(buffer.is_complete());
        assert_eq!(buffer.captured_rows().nrows(), 4000);
        for i in [0usize, 1, 2048, 3999] {
            assert!(buffer.row(i).unwrap().iter().all(|&v| v == i as u16));
        }
        assert!(buffer.row(4000).is_none());
        assert!(matches!(
            scan.append_row(row_of(16, 0).view()),
            Err(AssemblyError::Complete(4000))
        ));
    }

    #[test]
    fn test_row_width_checked() {
        let mut buffer = TdiBuffer::new(8, 4, 10);
        assert_eq!(
            buffer.append_row(row_of(9, 0).view()),
            Err(AssemblyError::WidthMismatch {
                expected: 8,
                got: 9
            })
        );
        assert_eq!(buffer.captured(), 0);
    }

    #[test]
    fn test_visible_window_tracks_newest_rows() {
        let mut buffer = TdiBuffer::new(3, 4, 10);
        assert_eq!(buffer.visible_window().nrows(), 4);

        for i in 0..3u16 {
            buffer.append_row(row_of(3, i + 1).view()).unwrap();
        }
        // Before a full frame height: rows 0..4, last still blank
        let window = buffer.visible_window();
        assert_eq!(window.column(0).to_vec(), vec![1, 2, 3, 0]);

        for i in 3..7u16 {
            buffer.append_row(row_of(3, i + 1).view()).unwrap();
        }
        let window = buffer.visible_window();
        assert_eq!(window.column(0).to_vec(), vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_render_rotates_window() {
        let dims = FrameDimensions::new(5, 4, 16);
        let mut scan = TdiAssembler::start(1, 60_000.0, dims).unwrap();
        let row = Array1::from(vec![0u16, 0, 0, 0, 60000]);
        scan.append_row(row.view()).unwrap();

        let mut ramp = DisplayRamp::default();
        let mut raster = RgbImage::new(1, 1);
        let range = scan.render(&mut ramp, &mut raster).unwrap();

        assert_eq!(raster.dimensions(), (4, 5));
        assert_eq!(range, SampleRange { min: 0, max: 60000 });
        // Last column of the first row lands top-left
        assert!(raster.get_pixel(0, 0)[0] > 200);
        assert_eq!(ramp.params().white, 60000);
    }

    #[test]
    fn test_oversized_scan_rejected() {
        // 12 h at 4 ms per row on a 4096 px wide sensor
        let dims = FrameDimensions::new(4096, 512, 16);
        assert_eq!(
            TdiAssembler::start(720, 4.0, dims).unwrap_err(),
            AssemblyError::TooLarge {
                rows: 10_800_000,
                width: 4096
            }
        );
        // Same rate over 1 h fits
        let dims = FrameDimensions::new(8, 512, 16);
        assert_eq!(
            TdiAssembler::start(60, 4.0, dims).unwrap().buffer().capacity(),
            900_000
        );
    }

    #[test]
    fn test_empty_geometry_rejected() {
        assert!(matches!(
            TdiAssembler::start(1, 40.0, FrameDimensions::new(0, 10, 16)),
            Err(AssemblyError::EmptyGeometry(_))
        ));
    }
}
