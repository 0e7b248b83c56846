//! Synthetic star fields for tests and headless runs
//!
//! Stars are rendered as circular Gaussian PSFs on a flat background.
//! Optional read noise is drawn from a seeded ChaCha generator so frames are
//! reproducible.

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Gaussian point source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticStar {
    /// Column of the PSF centre
    pub x: f64,
    /// Row of the PSF centre
    pub y: f64,
    /// Peak height above background (DN)
    pub amplitude: f64,
    /// PSF standard deviation in pixels
    pub sigma: f64,
}

impl SyntheticStar {
    pub fn new(x: f64, y: f64, amplitude: f64, sigma: f64) -> Self {
        Self {
            x,
            y,
            amplitude,
            sigma,
        }
    }

    /// Same star moved by (dx, dy)
    pub fn shifted(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// Render stars onto a flat background
///
/// Each PSF is evaluated out to 5 sigma; values are rounded and clamped
/// into the u16 range.
pub fn render_star_field(
    rows: usize,
    cols: usize,
    background: f64,
    stars: &[SyntheticStar],
) -> Array2<u16> {
    let mut frame = Array2::<f64>::from_elem((rows, cols), background);

    for star in stars {
        let reach = (5.0 * star.sigma).ceil().max(1.0);
        let y_lo = (star.y - reach).floor().max(0.0) as usize;
        let y_hi = ((star.y + reach).ceil().max(0.0) as usize).min(rows);
        let x_lo = (star.x - reach).floor().max(0.0) as usize;
        let x_hi = ((star.x + reach).ceil().max(0.0) as usize).min(cols);
        let two_sigma2 = 2.0 * star.sigma * star.sigma;

        for y in y_lo..y_hi {
            for x in x_lo..x_hi {
                let dx = x as f64 - star.x;
                let dy = y as f64 - star.y;
                frame[[y, x]] += star.amplitude * (-(dx * dx + dy * dy) / two_sigma2).exp();
            }
        }
    }

    frame.mapv(|v| v.round().clamp(0.0, u16::MAX as f64) as u16)
}

/// Add zero-mean Gaussian noise in place
pub fn add_gaussian_noise(frame: &mut Array2<u16>, std_dev: f64, seed: u64) {
    let Ok(normal) = Normal::new(0.0, std_dev) else {
        log::warn!("Ignoring invalid noise level {std_dev}");
        return;
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    frame.mapv_inplace(|v| {
        let noisy = v as f64 + normal.sample(&mut rng);
        noisy.round().clamp(0.0, u16::MAX as f64) as u16
    });
}

/// Frames of a star field drifting down the sensor at a constant rate
///
/// Frame `n` shows every star shifted by `n * rows_per_frame` rows.
pub fn drifting_frames(
    rows: usize,
    cols: usize,
    background: f64,
    stars: &[SyntheticStar],
    rows_per_frame: f64,
    count: usize,
) -> Vec<Array2<u16>> {
    (0..count)
        .map(|n| {
            let dy = n as f64 * rows_per_frame;
            let shifted: Vec<_> = stars.iter().map(|s| s.shifted(0.0, dy)).collect();
            render_star_field(rows, cols, background, &shifted)
        })
        .collect()
}

/// Tall strip of sky for feeding TDI row reads
///
/// Stars are scattered uniformly with a fixed seed; their amplitudes span
/// `amplitude_range`.
pub fn sky_strip(
    rows: usize,
    cols: usize,
    background: f64,
    star_count: usize,
    amplitude_range: (f64, f64),
    seed: u64,
) -> Array2<u16> {
    use rand::Rng;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (lo, hi) = amplitude_range;
    let stars: Vec<_> = (0..star_count)
        .map(|_| {
            let amplitude = if hi > lo {
                rng.random_range(lo..hi)
            } else {
                lo
            };
            SyntheticStar::new(
                rng.random_range(0.0..cols as f64),
                rng.random_range(0.0..rows as f64),
                amplitude,
                1.5,
            )
        })
        .collect();
    render_star_field(rows, cols, background, &stars)
}
