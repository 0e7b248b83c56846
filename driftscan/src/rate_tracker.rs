//! Drift-rate measurement from successive alignment exposures
//!
//! The first exposure picks the brightest compact star near the leading edge
//! of the frame as a reference. Each later exposure re-finds the star in a
//! narrow column band around its last position and derives the drift rate
//! from the total displacement since the reference. Drift is assumed to be
//! along the sensor columns only.

use ndarray::ArrayView2;
use shared::image_proc::{find_best_centroid, BlobRadius, Centroid, StarSearch};

use crate::config::ScanConfig;

/// Measured drift and the TDI row period it implies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEstimate {
    /// Sky drift in sensor rows per second
    pub scan_rate: f64,
    /// Exposure per TDI row (ms) so the sky advances one row per read
    pub row_exposure_ms: f64,
}

/// Result of feeding one alignment exposure to the tracker
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentOutcome {
    /// Reference star chosen on the first usable frame
    Acquired(Centroid),
    /// Star re-found; `estimate` is set when it has moved past the reference
    Tracked {
        centroid: Centroid,
        estimate: Option<RateEstimate>,
    },
    /// No acceptable star in the search window
    NotFound,
    /// Star expected to leave the frame before the next exposure
    OutOfFrame,
}

/// Search parameters taken from [`ScanConfig`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingParams {
    pub align_exposure_ms: f64,
    pub max_radius: BlobRadius,
    pub sigma: f64,
    pub x_band: usize,
    pub initial_search_fraction: f64,
}

impl From<&ScanConfig> for TrackingParams {
    fn from(config: &ScanConfig) -> Self {
        Self {
            align_exposure_ms: config.align_exposure_ms as f64,
            max_radius: config.max_radius(),
            sigma: config.detection_sigma,
            x_band: config.track_x_band,
            initial_search_fraction: config.initial_search_fraction,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateTracker {
    params: TrackingParams,
    reference: Option<Centroid>,
    current: Option<Centroid>,
    frame_count: usize,
    estimate: Option<RateEstimate>,
}

impl RateTracker {
    pub fn new(params: TrackingParams) -> Self {
        Self {
            params,
            reference: None,
            current: None,
            frame_count: 0,
            estimate: None,
        }
    }

    /// Forget the reference star and any rate measured from it
    pub fn reset(&mut self) {
        self.reference = None;
        self.current = None;
        self.frame_count = 0;
        self.estimate = None;
    }

    /// Process one alignment exposure
    ///
    /// `frame` must already be in analysis orientation, with the sky drifting
    /// towards increasing row index.
    pub fn observe(&mut self, frame: ArrayView2<u16>) -> AlignmentOutcome {
        match (self.reference, self.current) {
            (Some(reference), Some(current)) => self.track(frame, reference, current),
            _ => self.acquire(frame),
        }
    }

    fn acquire(&mut self, frame: ArrayView2<u16>) -> AlignmentOutcome {
        let (rows, cols) = frame.dim();
        let search = StarSearch {
            center: (cols as f64 / 2.0, 0.0),
            x_range: cols,
            y_range: (rows as f64 * self.params.initial_search_fraction) as usize,
            max_radius: self.params.max_radius,
            sigma: self.params.sigma,
        };

        match find_best_centroid(frame, &search) {
            Some(star) => {
                log::info!("Start tracking star at {:.2}, {:.2}", star.x, star.y);
                self.reference = Some(star);
                self.current = Some(star);
                self.frame_count = 1;
                AlignmentOutcome::Acquired(star)
            }
            None => {
                log::debug!("No reference star yet");
                AlignmentOutcome::NotFound
            }
        }
    }

    fn track(
        &mut self,
        frame: ArrayView2<u16>,
        reference: Centroid,
        current: Centroid,
    ) -> AlignmentOutcome {
        let (rows, _) = frame.dim();
        let margin = self.scan_rate() * self.params.align_exposure_ms / 1000.0;
        if current.y >= rows as f64 - 1.0 - margin {
            log::debug!("Tracked star at row {:.1} is leaving the frame", current.y);
            return AlignmentOutcome::OutOfFrame;
        }

        let search = StarSearch {
            center: (current.x, current.y),
            x_range: self.params.x_band,
            y_range: rows,
            max_radius: self.params.max_radius,
            sigma: self.params.sigma,
        };
        let Some(star) = find_best_centroid(frame, &search) else {
            log::debug!("Lost star near {:.2}, {:.2}", current.x, current.y);
            return AlignmentOutcome::NotFound;
        };

        log::info!("Tracking star at {:.2}, {:.2}", star.x, star.y);
        self.current = Some(star);

        let dy = star.y - reference.y;
        let estimate = if dy > 0.0 {
            let frames = self.frame_count as f64;
            let estimate = RateEstimate {
                scan_rate: dy / (self.params.align_exposure_ms / 1000.0 * frames),
                row_exposure_ms: self.params.align_exposure_ms * frames / dy,
            };
            self.frame_count += 1;
            self.estimate = Some(estimate);
            log::info!(
                "Rate: {:.3} row/s ({:.2} ms/row)",
                estimate.scan_rate,
                estimate.row_exposure_ms
            );
            Some(estimate)
        } else {
            None
        };

        AlignmentOutcome::Tracked {
            centroid: star,
            estimate,
        }
    }

    pub fn estimate(&self) -> Option<RateEstimate> {
        self.estimate
    }

    /// Drift rate in rows per second, 0 before any measurement
    pub fn scan_rate(&self) -> f64 {
        self.estimate.map_or(0.0, |e| e.scan_rate)
    }

    /// TDI row exposure in milliseconds, if a rate has been measured
    pub fn row_exposure(&self) -> Option<f64> {
        self.estimate.map(|e| e.row_exposure_ms)
    }

    pub fn reference(&self) -> Option<Centroid> {
        self.reference
    }

    pub fn current(&self) -> Option<Centroid> {
        self.current
    }

    /// Exposures since the reference that contributed to the estimate, plus one
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use shared::image_proc::test_patterns::{render_star_field, SyntheticStar};

    fn params() -> TrackingParams {
        TrackingParams::from(&ScanConfig::default())
    }

    fn frame_with_star(rows: usize, cols: usize, x: f64, y: f64) -> ndarray::Array2<u16> {
        render_star_field(rows, cols, 100.0, &[SyntheticStar::new(x, y, 5000.0, 1.5)])
    }

    #[test]
    fn test_rate_from_two_frames() {
        let mut tracker = RateTracker::new(params());

        let first = frame_with_star(256, 128, 64.0, 100.0);
        match tracker.observe(first.view()) {
            AlignmentOutcome::Acquired(c) => assert_relative_eq!(c.y, 100.0, epsilon = 1e-9),
            other => panic!("expected acquisition, got {other:?}"),
        }
        assert_eq!(tracker.frame_count(), 1);
        assert!(tracker.estimate().is_none());

        let second = frame_with_star(256, 128, 64.0, 150.0);
        let AlignmentOutcome::Tracked {
            estimate: Some(estimate),
            ..
        } = tracker.observe(second.view())
        else {
            panic!("expected a rate estimate");
        };

        assert_relative_eq!(estimate.scan_rate, 25.0, epsilon = 1e-9);
        assert_relative_eq!(estimate.row_exposure_ms, 40.0, epsilon = 1e-9);
        assert_eq!(tracker.frame_count(), 2);
        assert_relative_eq!(tracker.row_exposure().unwrap(), 40.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rate_accumulates_over_frames() {
        let mut tracker = RateTracker::new(params());
        for y in [40.0, 90.0, 140.0] {
            tracker.observe(frame_with_star(256, 128, 64.0, y).view());
        }
        // 100 rows over two 2 s exposures
        assert_relative_eq!(tracker.scan_rate(), 25.0, epsilon = 1e-9);
        assert_eq!(tracker.frame_count(), 3);
    }

    #[test]
    fn test_missing_star_keeps_estimate() {
        let mut tracker = RateTracker::new(params());
        tracker.observe(frame_with_star(256, 128, 64.0, 60.0).view());
        tracker.observe(frame_with_star(256, 128, 64.0, 110.0).view());
        let before = tracker.estimate();

        let blank = ndarray::Array2::from_elem((256, 128), 100u16);
        assert_eq!(tracker.observe(blank.view()), AlignmentOutcome::NotFound);
        assert_eq!(tracker.estimate(), before);
        assert_eq!(tracker.frame_count(), 2);
    }

    #[test]
    fn test_star_near_bottom_edge_is_not_searched() {
        let mut tracker = RateTracker::new(params());
        tracker.observe(frame_with_star(128, 96, 48.0, 60.0).view());
        tracker.observe(frame_with_star(128, 96, 48.0, 110.0).view());
        assert_relative_eq!(tracker.scan_rate(), 25.0, epsilon = 1e-9);

        // 25 row/s over 2 s leaves a 50 row margin above row 127
        let next = frame_with_star(128, 96, 48.0, 115.0);
        assert_eq!(tracker.observe(next.view()), AlignmentOutcome::OutOfFrame);
    }

    #[test]
    fn test_first_search_skips_trailing_rows() {
        let mut tracker = RateTracker::new(params());
        // Only star sits in the last quarter of the frame
        let frame = frame_with_star(256, 128, 64.0, 220.0);
        assert_eq!(tracker.observe(frame.view()), AlignmentOutcome::NotFound);
        assert!(tracker.reference().is_none());
    }

    #[test]
    fn test_tracking_band_ignores_other_columns() {
        let mut tracker = RateTracker::new(params());
        tracker.observe(frame_with_star(256, 128, 40.0, 50.0).view());

        // Brighter star far outside the +/-5 column band
        let frame = render_star_field(
            256,
            128,
            100.0,
            &[
                SyntheticStar::new(40.0, 80.0, 5000.0, 1.5),
                SyntheticStar::new(90.0, 120.0, 20000.0, 1.5),
            ],
        );
        let AlignmentOutcome::Tracked { centroid, .. } = tracker.observe(frame.view()) else {
            panic!("expected tracking");
        };
        assert_relative_eq!(centroid.x, 40.0, epsilon = 1e-9);
        assert_relative_eq!(centroid.y, 80.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reset_clears_measurement() {
        let mut tracker = RateTracker::new(params());
        tracker.observe(frame_with_star(256, 128, 64.0, 60.0).view());
        tracker.observe(frame_with_star(256, 128, 64.0, 110.0).view());
        tracker.reset();
        assert!(tracker.estimate().is_none());
        assert!(tracker.reference().is_none());
        assert_eq!(tracker.frame_count(), 0);
        assert_eq!(tracker.scan_rate(), 0.0);
    }
}
