//! Shared components for drift-scan imaging
//!
//! Camera abstraction, display ramps, rotated rendering and star centroiding
//! used by the scan session.

pub mod camera_interface;
#[cfg(feature = "config-storage")]
pub mod config_storage;
pub mod image_proc;
