//! Single brightest-star search for drift-rate measurement
//!
//! The search works on a rectangular window of a 16-bit frame:
//!
//! 1. Mean and standard deviation of the window give a detection threshold
//!    `mean + sigma * stddev`.
//! 2. Pixels above both the threshold and the brightest accepted candidate so
//!    far, that are also 4-neighbour local maxima, are candidates.
//! 3. Each candidate's extent is grown independently along x and y until the
//!    pixels at that offset on both sides fall to the threshold. Candidates
//!    reaching the maximum radius on either axis are rejected as extended
//!    objects (the Moon, a planet, a cloud edge lit by the city).
//! 4. Survivors are centroided by intensity over their extent box, counting
//!    only pixels above the threshold.
//!
//! The brightest survivor wins; equal-brightness maxima found later in
//! row-major order do not replace an earlier one. Single hot pixels are not
//! rejected.

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Extent of a blob along each axis, in pixels from its peak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRadius {
    pub x: usize,
    pub y: usize,
}

impl BlobRadius {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    pub fn square(r: usize) -> Self {
        Self { x: r, y: r }
    }

    /// Radius with each axis raised to at least one pixel, so that the
    /// 4-neighbour test around a peak stays inside the frame
    fn at_least_one(self) -> Self {
        Self {
            x: self.x.max(1),
            y: self.y.max(1),
        }
    }
}

/// Intensity-weighted star position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    /// Column coordinate (sub-pixel)
    pub x: f64,
    /// Row coordinate (sub-pixel)
    pub y: f64,
    /// Extent the centroid was computed over
    pub radius: BlobRadius,
}

/// Half-open pixel window `[x_min, x_max) x [y_min, y_max)`
///
/// Windows built through [`SearchWindow::clamped`] keep a margin of the
/// maximum blob radius from every frame edge, so radius probing around any
/// pixel inside the window never reads outside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub x_min: usize,
    pub x_max: usize,
    pub y_min: usize,
    pub y_max: usize,
}

impl SearchWindow {
    /// Window of `±x_range`, `±y_range` around `center`, shrunk to keep
    /// `max_radius` clear of the frame edges
    ///
    /// # Arguments
    /// * `center` - (x, y) the window is centred on; truncated to whole pixels
    /// * `x_range`, `y_range` - half-widths of the requested window
    /// * `shape` - frame shape as (rows, cols)
    /// * `max_radius` - largest blob extent that will be probed
    ///
    /// # Returns
    /// `None` if nothing of the window survives clamping
    pub fn clamped(
        center: (f64, f64),
        x_range: usize,
        y_range: usize,
        shape: (usize, usize),
        max_radius: BlobRadius,
    ) -> Option<Self> {
        let (rows, cols) = shape;
        let radius = max_radius.at_least_one();
        let cx = center.0 as i64;
        let cy = center.1 as i64;

        let x_min = (cx - x_range as i64).max(radius.x as i64);
        let x_max = (cx + x_range as i64).min(cols as i64 - radius.x as i64);
        let y_min = (cy - y_range as i64).max(radius.y as i64);
        let y_max = (cy + y_range as i64).min(rows as i64 - radius.y as i64);

        if x_min >= x_max || y_min >= y_max {
            return None;
        }

        Some(Self {
            x_min: x_min as usize,
            x_max: x_max as usize,
            y_min: y_min as usize,
            y_max: y_max as usize,
        })
    }

    /// Intersection of this window with the safe region of a frame
    pub fn restricted_to(&self, shape: (usize, usize), max_radius: BlobRadius) -> Option<Self> {
        let (rows, cols) = shape;
        let radius = max_radius.at_least_one();
        let x_min = self.x_min.max(radius.x);
        let x_max = self.x_max.min(cols.saturating_sub(radius.x));
        let y_min = self.y_min.max(radius.y);
        let y_max = self.y_max.min(rows.saturating_sub(radius.y));
        (x_min < x_max && y_min < y_max).then_some(Self {
            x_min,
            x_max,
            y_min,
            y_max,
        })
    }

    pub fn width(&self) -> usize {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> usize {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min as f64
            && x < self.x_max as f64
            && y >= self.y_min as f64
            && y < self.y_max as f64
    }
}

/// Mean and sample standard deviation of a window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub stddev: f64,
}

impl WindowStats {
    /// Two-pass statistics over `window` of `frame`
    pub fn measure(frame: &ArrayView2<u16>, window: &SearchWindow) -> Self {
        let n = window.area() as f64;
        let mut sum = 0.0;
        for j in window.y_min..window.y_max {
            for i in window.x_min..window.x_max {
                sum += frame[[j, i]] as f64;
            }
        }
        let mean = sum / n;

        let mut sq = 0.0;
        for j in window.y_min..window.y_max {
            for i in window.x_min..window.x_max {
                let d = frame[[j, i]] as f64 - mean;
                sq += d * d;
            }
        }
        let stddev = (sq / (n - 1.0).max(1.0)).sqrt();

        Self { mean, stddev }
    }

    pub fn threshold(&self, sigma: f64) -> f64 {
        self.mean + sigma * self.stddev
    }
}

/// Parameters for one star search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarSearch {
    /// Position the window is centred on (usually the previous centroid)
    pub center: (f64, f64),
    pub x_range: usize,
    pub y_range: usize,
    /// Blobs reaching this extent on either axis are rejected
    pub max_radius: BlobRadius,
    /// Detection threshold in standard deviations above the window mean
    pub sigma: f64,
}

impl StarSearch {
    /// Clamped search window for a frame of the given (rows, cols) shape
    pub fn window(&self, shape: (usize, usize)) -> Option<SearchWindow> {
        SearchWindow::clamped(
            self.center,
            self.x_range,
            self.y_range,
            shape,
            self.max_radius,
        )
    }
}

/// Find the brightest compact star described by `search`
///
/// # Returns
/// The winning centroid with the extent it was measured over, or `None` if
/// the window is empty or no candidate survived
pub fn find_best_centroid(frame: ArrayView2<u16>, search: &StarSearch) -> Option<Centroid> {
    let window = search.window(frame.dim())?;
    find_in_window(frame, &window, search.max_radius, search.sigma)
}

/// Find the brightest compact star inside an explicit window
///
/// The window is re-restricted to the frame's safe region first, so callers
/// cannot cause out-of-bounds probing.
pub fn find_in_window(
    frame: ArrayView2<u16>,
    window: &SearchWindow,
    max_radius: BlobRadius,
    sigma: f64,
) -> Option<Centroid> {
    let window = window.restricted_to(frame.dim(), max_radius)?;
    let max_radius = max_radius.at_least_one();
    let stats = WindowStats::measure(&frame, &window);
    let threshold = stats.threshold(sigma);
    let above = |j: usize, i: usize| frame[[j, i]] as f64 > threshold;

    let mut best_level = threshold;
    let mut best: Option<Centroid> = None;

    for j in window.y_min..window.y_max {
        for i in window.x_min..window.x_max {
            let pixel = frame[[j, i]];
            if f64::from(pixel) <= best_level {
                continue;
            }
            let is_local_max = pixel >= frame[[j, i + 1]]
                && pixel >= frame[[j, i - 1]]
                && pixel >= frame[[j + 1, i]]
                && pixel >= frame[[j - 1, i]];
            if !is_local_max {
                continue;
            }

            let y_radius = grow_radius(max_radius.y, |r| above(j + r, i) || above(j - r, i));
            let x_radius = grow_radius(max_radius.x, |r| above(j, i + r) || above(j, i - r));
            if x_radius >= max_radius.x || y_radius >= max_radius.y {
                continue;
            }

            let radius = BlobRadius::new(x_radius, y_radius);
            if let Some((x, y)) = weighted_centroid(&frame, i, j, radius, threshold) {
                best_level = pixel as f64;
                best = Some(Centroid { x, y, radius });
            }
        }
    }

    match &best {
        Some(c) => log::debug!(
            "Best star @ {:.2}, {:.2} (radius {}x{}, threshold {:.1})",
            c.x,
            c.y,
            c.radius.x,
            c.radius.y,
            threshold
        ),
        None => log::debug!("No star above {threshold:.1} in {window:?}"),
    }

    best
}

/// Step outward from 1 while `still_above(r)` holds, up to one past `max`
fn grow_radius(max: usize, still_above: impl Fn(usize) -> bool) -> usize {
    let mut r = 1;
    while r <= max && still_above(r) {
        r += 1;
    }
    r
}

/// Intensity-weighted centre over the box `radius` around (i, j)
fn weighted_centroid(
    frame: &ArrayView2<u16>,
    i: usize,
    j: usize,
    radius: BlobRadius,
    threshold: f64,
) -> Option<(f64, f64)> {
    let mut sum = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    for y in j - radius.y..=j + radius.y {
        for x in i - radius.x..=i + radius.x {
            let v = frame[[y, x]] as f64;
            if v > threshold {
                sum += v;
                sum_x += x as f64 * v;
                sum_y += y as f64 * v;
            }
        }
    }
    (sum > 0.0).then(|| (sum_x / sum, sum_y / sum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_proc::test_patterns::{add_gaussian_noise, render_star_field, SyntheticStar};
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    fn full_search(shape: (usize, usize), max_radius: usize, sigma: f64) -> StarSearch {
        let (rows, cols) = shape;
        StarSearch {
            center: (cols as f64 / 2.0, rows as f64 / 2.0),
            x_range: cols,
            y_range: rows,
            max_radius: BlobRadius::square(max_radius),
            sigma,
        }
    }

    #[test]
    fn test_window_clamped_by_radius() {
        let w = SearchWindow::clamped((50.0, 0.0), 100, 75, (100, 100), BlobRadius::square(15))
            .unwrap();
        assert_eq!(
            w,
            SearchWindow {
                x_min: 15,
                x_max: 85,
                y_min: 15,
                y_max: 75
            }
        );
        assert_eq!(w.area(), 70 * 60);
        assert!(w.contains(15.0, 74.5));
        assert!(!w.contains(85.0, 40.0));
    }

    #[test]
    fn test_window_fully_clamped_away() {
        let corner = SearchWindow::clamped((2.0, 2.0), 1, 1, (100, 100), BlobRadius::square(15));
        assert!(corner.is_none());
        let small = SearchWindow::clamped((5.0, 5.0), 50, 50, (20, 20), BlobRadius::square(10));
        assert!(small.is_none());
    }

    #[test]
    fn test_restricted_window_stays_safe() {
        let w = SearchWindow {
            x_min: 0,
            x_max: 64,
            y_min: 0,
            y_max: 64,
        };
        let safe = w.restricted_to((64, 64), BlobRadius::square(4)).unwrap();
        assert_eq!((safe.x_min, safe.x_max, safe.y_min, safe.y_max), (4, 60, 4, 60));
    }

    #[test]
    fn test_stats_of_known_window() {
        let frame = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as u16);
        let w = SearchWindow {
            x_min: 0,
            x_max: 4,
            y_min: 0,
            y_max: 4,
        };
        let stats = WindowStats::measure(&frame.view(), &w);
        assert_abs_diff_eq!(stats.mean, 7.5, epsilon = 1e-12);
        // Sample variance of 0..16 is 22.666...
        assert_abs_diff_eq!(stats.stddev, (68.0_f64 / 3.0).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_finds_isolated_star() {
        let truth = SyntheticStar::new(40.0, 30.0, 8000.0, 1.5);
        let frame = render_star_field(80, 96, 200.0, &[truth]);
        let c = find_best_centroid(frame.view(), &full_search((80, 96), 15, 1.0)).unwrap();
        assert_abs_diff_eq!(c.x, 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.y, 30.0, epsilon = 1e-9);
        assert!(c.radius.x < 15 && c.radius.y < 15);
    }

    #[test]
    fn test_subpixel_star_within_half_pixel() {
        let truth = SyntheticStar::new(52.3, 27.6, 6000.0, 1.8);
        let mut frame = render_star_field(64, 100, 500.0, &[truth]);
        add_gaussian_noise(&mut frame, 4.0, 42);
        let c = find_best_centroid(frame.view(), &full_search((64, 100), 15, 3.0)).unwrap();
        assert!((c.x - truth.x).abs() < 0.5, "x = {}", c.x);
        assert!((c.y - truth.y).abs() < 0.5, "y = {}", c.y);
    }

    #[test]
    fn test_uniform_frame_has_no_star() {
        let frame = Array2::from_elem((50, 50), 1234u16);
        for sigma in [0.0, 1.0, 5.0] {
            assert!(find_best_centroid(frame.view(), &full_search((50, 50), 10, sigma)).is_none());
        }
    }

    #[test]
    fn test_bounded_noise_below_threshold() {
        let frame = Array2::from_shape_fn((60, 60), |(r, c)| 1000 + ((r * 7 + c * 13) % 21) as u16);
        // Bounded spread of 20 DN cannot clear mean + 10 sigma
        assert!(find_best_centroid(frame.view(), &full_search((60, 60), 10, 10.0)).is_none());
    }

    #[test]
    fn test_oversized_blob_rejected() {
        let moon = SyntheticStar::new(50.0, 50.0, 40000.0, 12.0);
        let frame = render_star_field(100, 100, 100.0, &[moon]);
        assert!(find_best_centroid(frame.view(), &full_search((100, 100), 15, 1.0)).is_none());
    }

    #[test]
    fn test_oversized_blob_skipped_for_fainter_star() {
        let moon = SyntheticStar::new(40.0, 60.0, 40000.0, 12.0);
        let star = SyntheticStar::new(100.0, 25.0, 30000.0, 1.2);
        let frame = render_star_field(120, 140, 100.0, &[moon, star]);
        let c = find_best_centroid(frame.view(), &full_search((120, 140), 15, 1.0)).unwrap();
        assert_abs_diff_eq!(c.x, 100.0, epsilon = 0.5);
        assert_abs_diff_eq!(c.y, 25.0, epsilon = 0.5);
    }

    #[test]
    fn test_brightest_star_wins() {
        let faint = SyntheticStar::new(20.0, 20.0, 2000.0, 1.5);
        let bright = SyntheticStar::new(60.0, 50.0, 9000.0, 1.5);
        let frame = render_star_field(80, 80, 100.0, &[faint, bright]);
        let c = find_best_centroid(frame.view(), &full_search((80, 80), 15, 1.0)).unwrap();
        assert_abs_diff_eq!(c.x, 60.0, epsilon = 1e-9);
        assert_abs_diff_eq!(c.y, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_equal_brightness_keeps_first_in_scan_order() {
        let upper = SyntheticStar::new(60.0, 20.0, 5000.0, 1.5);
        let lower = SyntheticStar::new(20.0, 60.0, 5000.0, 1.5);
        let frame = render_star_field(80, 80, 100.0, &[lower, upper]);
        let c = find_best_centroid(frame.view(), &full_search((80, 80), 15, 1.0)).unwrap();
        assert_abs_diff_eq!(c.y, 20.0, epsilon = 1e-9);
    }

    #[test]
    fn test_star_outside_window_ignored() {
        let star = SyntheticStar::new(70.0, 40.0, 5000.0, 1.5);
        let frame = render_star_field(80, 100, 100.0, &[star]);
        let search = StarSearch {
            center: (30.0, 40.0),
            x_range: 5,
            y_range: 80,
            max_radius: BlobRadius::square(15),
            sigma: 1.0,
        };
        assert!(find_best_centroid(frame.view(), &search).is_none());
    }

    #[test]
    fn test_radius_reported_for_winner() {
        let star = SyntheticStar::new(40.0, 40.0, 5000.0, 1.0);
        let frame = render_star_field(80, 80, 100.0, &[star]);
        let c = find_best_centroid(frame.view(), &full_search((80, 80), 15, 1.0)).unwrap();
        assert_eq!(c.radius.x, c.radius.y);
        assert!(c.radius.x >= 1);
    }
}
