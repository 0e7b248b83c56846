pub mod display_ramp;
pub mod render;
pub mod star_finder;
pub mod test_patterns;

pub use display_ramp::{lut_index, DisplayRamp, RampParams, RampTable, LUT_SIZE};
pub use render::{render_rotated_ccw, rotated_raster_size, Composite, SampleRange};
pub use star_finder::{
    find_best_centroid, find_in_window, BlobRadius, Centroid, SearchWindow, StarSearch,
    WindowStats,
};
