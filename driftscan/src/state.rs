//! Scan session states, operator commands and tick scheduling

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Capture phase a stop request interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanPhase {
    Aligning,
    Scanning,
}

/// Drift-scan session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    /// No capture running
    Idle,
    /// Taking full-frame exposures to measure the drift rate
    Aligning,
    /// Reading one TDI row per tick into the scan buffer
    Scanning,
    /// Stop requested; the next tick finalises and returns to Idle
    Stopping { interrupted: ScanPhase },
}

impl ScanState {
    /// Whether ticks currently drive a camera read
    pub fn is_capturing(&self) -> bool {
        matches!(self, ScanState::Aligning | ScanState::Scanning)
    }

    /// Legal state transitions
    ///
    /// ```text
    /// Idle -> Aligning | Scanning
    /// Aligning -> Scanning | Stopping
    /// Scanning -> Stopping | Idle (scan complete)
    /// Stopping -> Idle
    /// ```
    pub fn can_transition_to(&self, next: &ScanState) -> bool {
        use ScanState::*;
        matches!(
            (self, next),
            (Idle, Aligning)
                | (Idle, Scanning)
                | (Aligning, Scanning)
                | (
                    Aligning,
                    Stopping {
                        interrupted: ScanPhase::Aligning
                    }
                )
                | (
                    Scanning,
                    Stopping {
                        interrupted: ScanPhase::Scanning
                    }
                )
                | (Scanning, Idle)
                | (Stopping { .. }, Idle)
        )
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScanState::Idle => write!(f, "idle"),
            ScanState::Aligning => write!(f, "aligning"),
            ScanState::Scanning => write!(f, "scanning"),
            ScanState::Stopping { interrupted } => write!(f, "stopping ({interrupted:?})"),
        }
    }
}

/// Operator commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanCommand {
    /// Discard the scan buffer
    New,
    /// Begin drift-rate measurement
    Align,
    /// Begin TDI capture at the measured rate
    Scan,
    /// Halt the running capture at the next tick
    Stop,
    /// Toggle the red-only display filter
    SetRedFilter(bool),
    /// Set the scan duration in whole hours
    SetDurationHours(u32),
}

/// What the host should do after a command or tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Call `on_tick` again after this period
    Tick(Duration),
    /// Stop ticking
    Halt,
    /// Keep the current schedule
    Unchanged,
}
