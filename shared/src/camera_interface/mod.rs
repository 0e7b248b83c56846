//! Camera abstraction layer for drift-scan capture
//!
//! Provides the narrow interface the scan engine needs from a line-scan
//! capable camera: sensor geometry, sensor clearing and rectangular
//! readouts of 16-bit samples. Readouts are used both for full-frame
//! alignment exposures and single-row TDI exposures.

pub mod mock;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error type for camera operations
#[derive(Debug, Error)]
pub enum CameraError {
    /// Hardware communication error
    #[error("Hardware error: {0}")]
    HardwareError(String),
    /// Readout window does not fit on the sensor
    #[error("Invalid readout: {0}")]
    InvalidReadout(String),
    /// Frame capture error
    #[error("Capture error: {0}")]
    CaptureError(String),
    /// Requested mode is not supported by this camera
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Result type for camera operations
pub type CameraResult<T> = Result<T, CameraError>;

/// Sensor frame geometry in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDimensions {
    /// Sensor width in pixels (samples per row)
    pub width: usize,
    /// Sensor height in pixels (rows)
    pub height: usize,
    /// ADC bit depth
    pub depth: u8,
}

impl FrameDimensions {
    pub fn new(width: usize, height: usize, depth: u8) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Array shape in ndarray (rows, cols) order
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

impl fmt::Display for FrameDimensions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}@{}bit", self.width, self.height, self.depth)
    }
}

/// Physical pixel pitch in microns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelDimensions {
    pub width_um: f64,
    pub height_um: f64,
}

/// Which interlaced field(s) a clear or readout applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldMode {
    /// Both fields (progressive readout)
    #[default]
    Both,
    Odd,
    Even,
}

/// Rectangular readout request
///
/// Offsets and sizes are in unbinned sensor pixels. When `tdi_scan` is set the
/// sensor shifts charge continuously and the readout delivers the next
/// integrated row rather than a snapshot of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadoutRequest {
    pub field: FieldMode,
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
    pub x_bin: usize,
    pub y_bin: usize,
    pub tdi_scan: bool,
}

impl ReadoutRequest {
    /// Unbinned full-frame snapshot used for alignment exposures
    pub fn full_frame(dims: FrameDimensions) -> Self {
        Self {
            field: FieldMode::Both,
            x_offset: 0,
            y_offset: 0,
            width: dims.width,
            height: dims.height,
            x_bin: 1,
            y_bin: 1,
            tdi_scan: false,
        }
    }

    /// Single full-width row read in TDI scan mode
    pub fn tdi_row(dims: FrameDimensions) -> Self {
        Self {
            height: 1,
            tdi_scan: true,
            ..Self::full_frame(dims)
        }
    }

    /// Check the request against sensor geometry
    ///
    /// # Returns
    /// * `Ok(())` if the window and binning fit the sensor
    /// * `Err(CameraError::InvalidReadout)` otherwise
    pub fn validate_for_sensor(&self, dims: FrameDimensions) -> CameraResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::InvalidReadout(format!(
                "empty readout {}x{}",
                self.width, self.height
            )));
        }
        if self.x_bin == 0 || self.y_bin == 0 {
            return Err(CameraError::InvalidReadout("zero binning".to_string()));
        }
        if self.x_offset + self.width > dims.width || self.y_offset + self.height > dims.height {
            return Err(CameraError::InvalidReadout(format!(
                "window {}x{}+{}+{} exceeds sensor {}",
                self.width, self.height, self.x_offset, self.y_offset, dims
            )));
        }
        Ok(())
    }

    /// Output array shape (rows, cols) after binning
    pub fn output_shape(&self) -> (usize, usize) {
        (self.height / self.y_bin, self.width / self.x_bin)
    }
}

/// Trait for a camera that can drive alignment and TDI capture
///
/// Readouts block for the duration of the exposure. Implementations are used
/// from a single thread of control and need not be `Sync`.
pub trait ScanCamera {
    /// Get camera name/identifier
    fn name(&self) -> String;

    /// Sensor frame geometry
    fn frame_dimensions(&self) -> FrameDimensions;

    /// Physical pixel pitch
    fn pixel_dimensions(&self) -> PixelDimensions;

    /// Discard accumulated charge on the sensor
    fn clear_sensor(&mut self, field: FieldMode) -> CameraResult<()>;

    /// Read a block of samples
    ///
    /// # Returns
    /// * `Ok(Array2<u16>)` with shape `request.output_shape()`
    /// * `Err(CameraError)` if the request is invalid or capture fails
    fn read_pixels(&mut self, request: ReadoutRequest) -> CameraResult<Array2<u16>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tdi_row_request() {
        let dims = FrameDimensions::new(640, 480, 16);
        let req = ReadoutRequest::tdi_row(dims);
        assert_eq!(req.output_shape(), (1, 640));
        assert!(req.tdi_scan);
        assert!(req.validate_for_sensor(dims).is_ok());
    }

    #[test]
    fn test_readout_outside_sensor_rejected() {
        let dims = FrameDimensions::new(64, 64, 16);
        let req = ReadoutRequest {
            x_offset: 10,
            ..ReadoutRequest::full_frame(dims)
        };
        assert!(matches!(
            req.validate_for_sensor(dims),
            Err(CameraError::InvalidReadout(_))
        ));
    }
}
