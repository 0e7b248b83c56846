use super::{
    CameraError, CameraResult, FieldMode, FrameDimensions, PixelDimensions, ReadoutRequest,
    ScanCamera,
};
use ndarray::{s, Array2};

/// In-memory camera for tests and headless runs
///
/// Full-frame reads replay `frames` (a single frame repeats forever, a longer
/// list is consumed in order). TDI row reads walk down `sky`, wrapping at the
/// bottom, so a tall synthetic strip stands in for the drifting sky.
pub struct MockScanCamera {
    name: String,
    dims: FrameDimensions,
    pixel: PixelDimensions,
    frames: Vec<Array2<u16>>,
    frame_index: usize,
    sky: Option<Array2<u16>>,
    sky_row: usize,
    clears: usize,
    reads: u64,
}

impl MockScanCamera {
    pub fn new(dims: FrameDimensions, frames: Vec<Array2<u16>>) -> Self {
        Self {
            name: "Mock".to_string(),
            dims,
            pixel: PixelDimensions {
                width_um: 1.0,
                height_um: 1.0,
            },
            frames,
            frame_index: 0,
            sky: None,
            sky_row: 0,
            clears: 0,
            reads: 0,
        }
    }

    pub fn new_repeating(dims: FrameDimensions, frame: Array2<u16>) -> Self {
        Self::new(dims, vec![frame])
    }

    pub fn new_zeros(dims: FrameDimensions) -> Self {
        let frame = Array2::zeros(dims.shape());
        Self::new_repeating(dims, frame)
    }

    /// Attach a sky strip used to answer TDI row reads
    pub fn with_sky(mut self, sky: Array2<u16>) -> Self {
        self.sky = Some(sky);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_pixel_dimensions(mut self, pixel: PixelDimensions) -> Self {
        self.pixel = pixel;
        self
    }

    /// Number of `clear_sensor` calls seen so far
    pub fn clear_count(&self) -> usize {
        self.clears
    }

    /// Number of successful readouts so far
    pub fn read_count(&self) -> u64 {
        self.reads
    }

    fn next_frame(&mut self) -> CameraResult<&Array2<u16>> {
        let idx = if self.frames.len() == 1 {
            0
        } else {
            if self.frame_index >= self.frames.len() {
                return Err(CameraError::CaptureError("No more frames".to_string()));
            }
            let current = self.frame_index;
            self.frame_index += 1;
            current
        };
        self.frames
            .get(idx)
            .ok_or_else(|| CameraError::CaptureError("No frames loaded".to_string()))
    }

    fn next_sky_row(&mut self, request: &ReadoutRequest) -> CameraResult<Array2<u16>> {
        let sky = self
            .sky
            .as_ref()
            .ok_or_else(|| CameraError::Unsupported("TDI scan without a sky strip".to_string()))?;
        if sky.ncols() < request.x_offset + request.width || sky.nrows() == 0 {
            return Err(CameraError::CaptureError(format!(
                "sky strip {}x{} too narrow for readout",
                sky.ncols(),
                sky.nrows()
            )));
        }
        let row = self.sky_row % sky.nrows();
        self.sky_row = (row + 1) % sky.nrows();
        let x_end = request.x_offset + request.width;
        Ok(sky.slice(s![row..row + 1, request.x_offset..x_end]).to_owned())
    }
}

impl ScanCamera for MockScanCamera {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn frame_dimensions(&self) -> FrameDimensions {
        self.dims
    }

    fn pixel_dimensions(&self) -> PixelDimensions {
        self.pixel
    }

    fn clear_sensor(&mut self, _field: FieldMode) -> CameraResult<()> {
        self.clears += 1;
        Ok(())
    }

    fn read_pixels(&mut self, request: ReadoutRequest) -> CameraResult<Array2<u16>> {
        let dims = self.dims;
        request.validate_for_sensor(dims)?;
        if request.x_bin != 1 || request.y_bin != 1 {
            return Err(CameraError::Unsupported(format!(
                "binning {}x{}",
                request.x_bin, request.y_bin
            )));
        }

        let out = if request.tdi_scan {
            if request.height != 1 {
                return Err(CameraError::InvalidReadout(
                    "TDI readout must be a single row".to_string(),
                ));
            }
            self.next_sky_row(&request)?
        } else {
            let frame = self.next_frame()?;
            if frame.dim() != dims.shape() {
                return Err(CameraError::CaptureError(format!(
                    "stored frame {:?} does not match sensor {}",
                    frame.dim(),
                    dims
                )));
            }
            frame
                .slice(s![
                    request.y_offset..request.y_offset + request.height,
                    request.x_offset..request.x_offset + request.width
                ])
                .to_owned()
        };

        self.reads += 1;
        Ok(out)
    }
}
