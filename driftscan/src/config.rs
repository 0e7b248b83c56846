//! Scan session configuration

use serde::{Deserialize, Serialize};
use shared::camera_interface::{FrameDimensions, PixelDimensions};
use shared::config_storage::ConfigStorage;
use shared::image_proc::BlobRadius;

use crate::error::ScanError;

/// Shortest accepted scan duration in hours
pub const MIN_DURATION_HOURS: u32 = 1;
/// Longest accepted scan duration in hours
pub const MAX_DURATION_HOURS: u32 = 12;
/// Duration offered to the operator when none has been chosen
pub const DEFAULT_DURATION_HOURS: u32 = 6;

/// Configuration for a drift-scan session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Alignment exposure period in milliseconds
    pub align_exposure_ms: u64,
    /// Largest star extent (pixels from peak) accepted by the star finder
    pub max_star_radius: usize,
    /// Detection threshold in standard deviations above the window mean
    pub detection_sigma: f64,
    /// Half-width of the column band searched while tracking
    pub track_x_band: usize,
    /// Fraction of the frame height searched when acquiring the first star
    pub initial_search_fraction: f64,
    /// Display gamma
    pub gamma: f64,
    /// Start with the red-only display filter enabled
    pub red_filter: bool,
    /// Scan duration used when the operator has not chosen one
    pub duration_hours: Option<u32>,
    /// Flip alignment frames vertically after readout
    pub invert_alignment_rows: bool,
    /// Sensor geometry assumed when no camera is attached
    pub fallback_frame: FrameDimensions,
    /// Pixel pitch assumed when no camera is attached
    pub fallback_pixel: PixelDimensions,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            align_exposure_ms: 2000,
            max_star_radius: 15,
            detection_sigma: 1.0,
            track_x_band: 5,
            initial_search_fraction: 0.75,
            gamma: 1.0,
            red_filter: false,
            duration_hours: None,
            invert_alignment_rows: true,
            fallback_frame: FrameDimensions::new(512, 512, 16),
            fallback_pixel: PixelDimensions {
                width_um: 1.0,
                height_um: 1.0,
            },
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.align_exposure_ms == 0 {
            return Err(ScanError::InvalidConfig(
                "alignment exposure must be positive".to_string(),
            ));
        }
        if self.max_star_radius == 0 {
            return Err(ScanError::InvalidConfig(
                "max star radius must be at least 1".to_string(),
            ));
        }
        if !self.detection_sigma.is_finite() || self.detection_sigma < 0.0 {
            return Err(ScanError::InvalidConfig(format!(
                "detection sigma {} must be finite and non-negative",
                self.detection_sigma
            )));
        }
        if !(self.initial_search_fraction > 0.0 && self.initial_search_fraction <= 1.0) {
            return Err(ScanError::InvalidConfig(format!(
                "initial search fraction {} must be in (0, 1]",
                self.initial_search_fraction
            )));
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(ScanError::InvalidConfig(format!(
                "gamma {} must be positive",
                self.gamma
            )));
        }
        if let Some(hours) = self.duration_hours {
            validate_duration_hours(hours)?;
        }
        if self.fallback_frame.width == 0 || self.fallback_frame.height == 0 {
            return Err(ScanError::InvalidConfig(format!(
                "fallback frame {} is empty",
                self.fallback_frame
            )));
        }
        Ok(())
    }

    pub fn max_radius(&self) -> BlobRadius {
        BlobRadius::square(self.max_star_radius)
    }

    /// Alignment exposure in seconds
    pub fn align_exposure_secs(&self) -> f64 {
        self.align_exposure_ms as f64 / 1000.0
    }

    /// Load the stored configuration, falling back to defaults when none exists
    pub fn load_or_default(storage: &ConfigStorage) -> Result<Self, ScanError> {
        let config = match storage.load_scan_config::<Self>()? {
            Some(config) => {
                log::info!("Loaded scan config from {}", storage.root_path().display());
                config
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Check an operator-entered duration
pub fn validate_duration_hours(hours: u32) -> Result<u32, ScanError> {
    if (MIN_DURATION_HOURS..=MAX_DURATION_HOURS).contains(&hours) {
        Ok(hours)
    } else {
        Err(ScanError::InvalidDuration(hours))
    }
}
