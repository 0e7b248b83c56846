//! Display raster shared by alignment preview and scan rendering
//!
//! During alignment every exposure is composited with a per-channel maximum,
//! so a drifting star draws a trail across the guide lines laid down when
//! alignment started.

use image::RgbImage;
use ndarray::ArrayView2;
use shared::camera_interface::FrameDimensions;
use shared::image_proc::{rotated_raster_size, Composite, DisplayRamp, SampleRange};

/// Guide lines drawn across the sensor width
pub const GUIDE_DIVISIONS: usize = 32;
/// Green level of the guide lines
pub const GUIDE_GREEN: u8 = 128;

#[derive(Debug, Clone)]
pub struct AlignmentPreview {
    dims: FrameDimensions,
    raster: RgbImage,
}

impl AlignmentPreview {
    /// Black raster sized for a rotated full frame of `dims`
    pub fn new(dims: FrameDimensions) -> Self {
        let (width, height) = rotated_raster_size(dims.height, dims.width);
        Self {
            dims,
            raster: RgbImage::new(width, height),
        }
    }

    /// Clear to black and draw horizontal green guides every
    /// `width / GUIDE_DIVISIONS` raster rows
    pub fn reset_with_guides(&mut self) {
        let (width, height) = rotated_raster_size(self.dims.height, self.dims.width);
        self.raster = RgbImage::new(width, height);

        let step = (self.dims.width / GUIDE_DIVISIONS).max(1);
        for y in (0..height).step_by(step) {
            for x in 0..width {
                self.raster.get_pixel_mut(x, y)[1] = GUIDE_GREEN;
            }
        }
    }

    /// Max-composite an alignment frame and re-level `ramp` to it
    pub fn composite(
        &mut self,
        frame: ArrayView2<u16>,
        ramp: &mut DisplayRamp,
    ) -> Option<SampleRange> {
        ramp.render(frame, &mut self.raster, Composite::Max)
    }

    pub fn raster(&self) -> &RgbImage {
        &self.raster
    }

    pub fn raster_mut(&mut self) -> &mut RgbImage {
        &mut self.raster
    }
}
