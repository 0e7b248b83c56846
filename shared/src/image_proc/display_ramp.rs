//! 16-bit to 8-bit display remapping
//!
//! Samples are bucketed by their top [`LUT_BITWIDTH`] bits and looked up in a
//! pair of tables: one for the red channel and one shared by blue and green.
//! The tables implement a black/white window followed by an inverse gamma
//! curve. Enabling the red-only filter zeroes the blue/green table, which
//! preserves dark adaptation when the display is viewed at the telescope.

use image::{Rgb, RgbImage};
use ndarray::ArrayView2;

use super::render::{render_rotated_ccw, Composite, SampleRange};

/// Bit width of raw camera samples
pub const PIX_BITWIDTH: u32 = 16;

/// Bit width of the lookup table index
pub const LUT_BITWIDTH: u32 = 10;

/// Number of entries in each lookup table
pub const LUT_SIZE: usize = 1 << LUT_BITWIDTH;

/// Largest raw sample value
pub const MAX_PIX: u16 = u16::MAX;

/// Lookup table bucket for a raw sample
#[inline]
pub fn lut_index(sample: u16) -> usize {
    (sample >> (PIX_BITWIDTH - LUT_BITWIDTH)) as usize
}

/// Parameters that fully determine a [`RampTable`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampParams {
    /// Sample value mapped to zero intensity
    pub black: u16,
    /// Sample value mapped to full intensity
    pub white: u16,
    /// Display gamma; the curve applied is `x^(1/gamma)`
    pub gamma: f64,
    /// Zero the blue/green channels
    pub red_only: bool,
}

impl Default for RampParams {
    fn default() -> Self {
        Self {
            black: 0,
            white: MAX_PIX,
            gamma: 1.0,
            red_only: false,
        }
    }
}

/// Pair of 8-bit lookup tables indexed by [`lut_index`]
///
/// Within the black..white window the tables are non-decreasing; buckets
/// below the one holding `black` are 0 and buckets from the one holding
/// `white` upward are 255.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampTable {
    red: [u8; LUT_SIZE],
    blue_green: [u8; LUT_SIZE],
}

impl RampTable {
    /// Recompute both tables from scratch
    ///
    /// A degenerate window (`white <= black`) is treated as a span of one
    /// sample. A non-positive or non-finite gamma is treated as 1.0.
    pub fn compute(params: &RampParams) -> Self {
        let span = (params.white as f64 - params.black as f64).max(1.0);
        let scale = MAX_PIX as f64 / span;
        let gamma = if params.gamma.is_finite() && params.gamma > 0.0 {
            params.gamma
        } else {
            1.0
        };
        let recip_gamma = 1.0 / gamma;
        // One bucket below black so the white bucket always reaches full scale
        let offset = lut_index(params.black) as f64 - 1.0;

        let mut red = [0u8; LUT_SIZE];
        let mut blue_green = [0u8; LUT_SIZE];
        for (pix, (r, bg)) in red.iter_mut().zip(blue_green.iter_mut()).enumerate() {
            let normalized =
                ((pix as f64 - offset) / (LUT_SIZE - 1) as f64 * scale).clamp(0.0, 1.0);
            *r = (255.0 * normalized.powf(recip_gamma)) as u8;
            *bg = if params.red_only { 0 } else { *r };
        }

        Self { red, blue_green }
    }

    pub fn red(&self) -> &[u8; LUT_SIZE] {
        &self.red
    }

    pub fn blue_green(&self) -> &[u8; LUT_SIZE] {
        &self.blue_green
    }

    /// Map one raw sample to an RGB pixel
    #[inline]
    pub fn map(&self, sample: u16) -> Rgb<u8> {
        let idx = lut_index(sample);
        let bg = self.blue_green[idx];
        Rgb([self.red[idx], bg, bg])
    }
}

impl Default for RampTable {
    fn default() -> Self {
        Self::compute(&RampParams::default())
    }
}

/// Stateful display ramp with auto-levelling
///
/// Holds the current [`RampParams`] and the table derived from them. Every
/// setter recomputes the table wholesale. [`DisplayRamp::render`] maps a
/// window through the current table and then re-levels the ramp to the
/// sample range it just saw, so each frame is displayed with the previous
/// frame's dynamic range.
#[derive(Debug, Clone)]
pub struct DisplayRamp {
    params: RampParams,
    table: RampTable,
}

impl DisplayRamp {
    /// Create a full-range ramp (black 0, white 65535)
    pub fn new(gamma: f64, red_only: bool) -> Self {
        Self::with_params(RampParams {
            gamma,
            red_only,
            ..RampParams::default()
        })
    }

    pub fn with_params(params: RampParams) -> Self {
        Self {
            table: RampTable::compute(&params),
            params,
        }
    }

    pub fn params(&self) -> &RampParams {
        &self.params
    }

    pub fn table(&self) -> &RampTable {
        &self.table
    }

    pub fn set_levels(&mut self, black: u16, white: u16) {
        self.params.black = black;
        self.params.white = white;
        self.recompute();
    }

    pub fn set_gamma(&mut self, gamma: f64) {
        self.params.gamma = gamma;
        self.recompute();
    }

    pub fn set_red_only(&mut self, red_only: bool) {
        self.params.red_only = red_only;
        self.recompute();
    }

    /// Render `window` rotated 90° CCW into `raster`, then auto-level
    ///
    /// # Returns
    /// The sample range seen in the window, or `None` for an empty window
    /// (in which case the levels are left unchanged).
    pub fn render(
        &mut self,
        window: ArrayView2<u16>,
        raster: &mut RgbImage,
        mode: Composite,
    ) -> Option<SampleRange> {
        let range = render_rotated_ccw(window, &self.table, raster, mode)?;
        self.set_levels(range.min, range.max);
        Some(range)
    }

    fn recompute(&mut self) {
        self.table = RampTable::compute(&self.params);
    }
}

impl Default for DisplayRamp {
    fn default() -> Self {
        Self::new(1.0, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn params(black: u16, white: u16, gamma: f64) -> RampParams {
        RampParams {
            black,
            white,
            gamma,
            red_only: false,
        }
    }

    fn assert_ramp_shape(p: &RampParams) {
        let table = RampTable::compute(p);
        let red = table.red();
        for pair in red.windows(2) {
            assert!(pair[0] <= pair[1], "ramp not monotonic for {p:?}");
        }
        for &v in &red[..lut_index(p.black)] {
            assert_eq!(v, 0, "below black not dark for {p:?}");
        }
        for &v in &red[lut_index(p.white)..] {
            assert_eq!(v, 255, "white bucket not saturated for {p:?}");
        }
    }

    #[test]
    fn test_ramp_monotonic_and_saturated() {
        let cases = [
            params(0, 65535, 1.0),
            params(0, 127, 1.0),
            params(1000, 5000, 2.2),
            params(32768, 65535, 0.5),
            params(63, 191, 1.8),
            params(12345, 12346, 1.0),
        ];
        for p in &cases {
            assert_ramp_shape(p);
        }
    }

    #[test]
    fn test_full_range_linear_endpoints() {
        let table = RampTable::compute(&RampParams::default());
        assert_eq!(table.red()[0], 0);
        assert_eq!(table.red()[LUT_SIZE - 1], 255);
        // Midpoint of a linear ramp lands near half intensity
        let mid = table.red()[LUT_SIZE / 2];
        assert!((126..=129).contains(&mid), "mid = {mid}");
    }

    #[test]
    fn test_gamma_brightens_midtones() {
        let linear = RampTable::compute(&params(0, 65535, 1.0));
        let bright = RampTable::compute(&params(0, 65535, 2.2));
        assert!(bright.red()[LUT_SIZE / 4] > linear.red()[LUT_SIZE / 4]);
    }

    #[test]
    fn test_red_only_zeroes_blue_green() {
        let table = RampTable::compute(&RampParams {
            red_only: true,
            ..params(0, 4000, 1.0)
        });
        assert!(table.blue_green().iter().all(|&v| v == 0));
        assert!(table.red().iter().any(|&v| v > 0));
    }

    #[test]
    fn test_blue_green_mirrors_red_without_filter() {
        let table = RampTable::compute(&params(500, 9000, 1.4));
        assert_eq!(table.red(), table.blue_green());
    }

    #[test]
    fn test_degenerate_window_is_guarded() {
        let table = RampTable::compute(&params(4000, 4000, 1.0));
        assert_eq!(table.red()[0], 0);
        assert_eq!(table.red()[LUT_SIZE - 1], 255);

        let inverted = RampTable::compute(&params(9000, 100, 1.0));
        assert_eq!(inverted.red()[LUT_SIZE - 1], 255);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let p = params(1234, 40000, 1.7);
        assert_eq!(RampTable::compute(&p), RampTable::compute(&p));
    }

    #[test]
    fn test_display_ramp_setters_recompute() {
        let mut ramp = DisplayRamp::default();
        ramp.set_red_only(true);
        assert!(ramp.table().blue_green().iter().all(|&v| v == 0));
        ramp.set_red_only(false);
        assert_eq!(ramp.table().red(), ramp.table().blue_green());
        ramp.set_levels(1000, 2000);
        assert_eq!(ramp.table(), &RampTable::compute(ramp.params()));
    }

    #[test]
    fn test_render_auto_levels() {
        let mut ramp = DisplayRamp::default();
        let window = Array2::from_shape_fn((4, 6), |(r, c)| 1000 + (r * 6 + c) as u16 * 100);
        let mut raster = RgbImage::new(4, 6);
        let range = ramp.render(window.view(), &mut raster, Composite::Replace).unwrap();
        assert_eq!(range.min, 1000);
        assert_eq!(range.max, 1000 + 23 * 100);
        assert_eq!(ramp.params().black, 1000);
        assert_eq!(ramp.params().white, 3300);
    }
}
