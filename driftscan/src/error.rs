use shared::camera_interface::CameraError;
use shared::config_storage::StorageError;
use thiserror::Error;

use crate::assembler::AssemblyError;
use crate::state::{ScanCommand, ScanState};

/// Errors surfaced by a scan session
///
/// Sequencing errors abort only the command that raised them; the session
/// state is left as it was.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Align & measure rate first")]
    RateNotMeasured,

    #[error("A scan buffer already exists; start a new scan first")]
    ScanBufferExists,

    #[error("No camera attached")]
    NoCamera,

    #[error("Scan duration not set")]
    DurationNotSet,

    #[error("Scan duration must be 1..=12 hours, got {0}")]
    InvalidDuration(u32),

    #[error("Cannot apply {command:?} while {state}")]
    InvalidTransition {
        state: ScanState,
        command: ScanCommand,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
