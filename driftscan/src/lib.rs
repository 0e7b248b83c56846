//! DRIFTSCAN - drift-rate alignment and TDI scan assembly
//!
//! A scan session measures how fast the sky drifts down the sensor by
//! tracking a star through full-frame alignment exposures, then reads one
//! TDI row per row-exposure period into a tall scan buffer.
//!
//! The session is host-driven: commands arrive through
//! [`ScanSession::handle_command`] and capture work happens in
//! [`ScanSession::on_tick`]. Both return a [`NextAction`] telling the host
//! when to tick next, so a GUI timer, a headless loop or a test can drive it
//! the same way.

pub mod assembler;
pub mod config;
pub mod error;
pub mod preview;
pub mod rate_tracker;
pub mod state;

use image::RgbImage;
use ndarray::{s, Array2};
use shared::camera_interface::{
    CameraError, FieldMode, FrameDimensions, PixelDimensions, ReadoutRequest, ScanCamera,
};
use shared::image_proc::DisplayRamp;
use std::fmt;
use std::time::Duration;

pub use assembler::{
    target_row_count, AssemblyError, TdiAssembler, TdiBuffer, MAX_SCAN_SAMPLES,
};
pub use config::ScanConfig;
pub use error::ScanError;
pub use preview::AlignmentPreview;
pub use rate_tracker::{AlignmentOutcome, RateEstimate, RateTracker, TrackingParams};
pub use state::{NextAction, ScanCommand, ScanPhase, ScanState};

/// Snapshot for a status line
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub camera: Option<String>,
    pub state: ScanState,
    pub scan_rate: Option<f64>,
    /// (captured, target) rows of the current or last scan
    pub scan_progress: Option<(usize, usize)>,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.camera {
            Some(name) => write!(f, "Attached: {name}")?,
            None => write!(f, "Attached: None")?,
        }
        match self.scan_rate {
            Some(rate) => write!(f, " | Rate: {rate:.3} row/s")?,
            None => write!(f, " | Rate: -.--- row/s")?,
        }
        if let Some((captured, target)) = self.scan_progress {
            write!(f, " | Rows: {captured}/{target}")?;
        }
        Ok(())
    }
}

/// Drift-scan session state machine
pub struct ScanSession<C: ScanCamera> {
    config: ScanConfig,
    camera: Option<C>,
    dims: FrameDimensions,
    pixel: PixelDimensions,
    state: ScanState,
    tracker: RateTracker,
    scan: Option<TdiAssembler>,
    ramp: DisplayRamp,
    preview: AlignmentPreview,
    duration_minutes: Option<u32>,
}

impl<C: ScanCamera> ScanSession<C> {
    /// Create an idle session
    ///
    /// Without a camera the session runs in display-only mode with the
    /// configured fallback geometry and pixel pitch; capture commands fail with
    /// [`ScanError::NoCamera`].
    pub fn new(config: ScanConfig, camera: Option<C>) -> Result<Self, ScanError> {
        config.validate()?;

        let (dims, pixel) = match &camera {
            Some(cam) => {
                let dims = cam.frame_dimensions();
                let pixel = cam.pixel_dimensions();
                log::info!(
                    "Attached: {} ({dims}, {:.2}x{:.2} um pixels)",
                    cam.name(),
                    pixel.width_um,
                    pixel.height_um
                );
                (dims, pixel)
            }
            None => {
                log::warn!("Attached: None, using {}", config.fallback_frame);
                (config.fallback_frame, config.fallback_pixel)
            }
        };

        let duration_minutes = config.duration_hours.map(|h| h * 60);
        Ok(Self {
            tracker: RateTracker::new(TrackingParams::from(&config)),
            ramp: DisplayRamp::new(config.gamma, config.red_filter),
            preview: AlignmentPreview::new(dims),
            camera,
            dims,
            pixel,
            state: ScanState::Idle,
            scan: None,
            duration_minutes,
            config,
        })
    }

    /// Apply an operator command
    ///
    /// Refused commands return an error and leave the session unchanged.
    pub fn handle_command(&mut self, command: ScanCommand) -> Result<NextAction, ScanError> {
        use ScanState::*;

        match (self.state, command) {
            (_, ScanCommand::SetRedFilter(on)) => {
                self.ramp.set_red_only(on);
                self.config.red_filter = on;
                Ok(NextAction::Unchanged)
            }
            (_, ScanCommand::SetDurationHours(hours)) => {
                let hours = config::validate_duration_hours(hours)?;
                log::info!("Scan duration set to {hours} h");
                self.duration_minutes = Some(hours * 60);
                Ok(NextAction::Unchanged)
            }

            (Idle, ScanCommand::New) => {
                if self.scan.take().is_some() {
                    log::info!("Discarded scan buffer");
                }
                Ok(NextAction::Unchanged)
            }

            (Idle, ScanCommand::Align) => self.start_alignment(),

            (Idle | Aligning, ScanCommand::Scan) => self.start_scan(),

            (Aligning, ScanCommand::Stop) => self.request_stop(ScanPhase::Aligning),
            (Scanning, ScanCommand::Stop) => self.request_stop(ScanPhase::Scanning),
            (Idle | Stopping { .. }, ScanCommand::Stop) => {
                log::debug!("Stop ignored while {}", self.state);
                Ok(NextAction::Unchanged)
            }

            (state, command) => {
                log::warn!("Refusing {command:?} while {state}");
                Err(ScanError::InvalidTransition { state, command })
            }
        }
    }

    /// Perform one unit of capture work for the current state
    ///
    /// Camera failures are returned without changing state; the host may
    /// retry on its next tick.
    pub fn on_tick(&mut self) -> Result<NextAction, ScanError> {
        match self.state {
            ScanState::Idle => Ok(NextAction::Halt),
            ScanState::Aligning => self.alignment_tick(),
            ScanState::Scanning => self.scan_tick(),
            ScanState::Stopping { interrupted } => {
                if interrupted == ScanPhase::Scanning {
                    if let Some(scan) = self.scan.as_mut() {
                        scan.stop();
                    }
                }
                self.transition(ScanState::Idle);
                Ok(NextAction::Halt)
            }
        }
    }

    fn start_alignment(&mut self) -> Result<NextAction, ScanError> {
        let camera = self.camera.as_mut().ok_or(ScanError::NoCamera)?;
        camera.clear_sensor(FieldMode::Both)?;

        self.preview.reset_with_guides();
        self.tracker.reset();
        self.transition(ScanState::Aligning);
        Ok(NextAction::Tick(Duration::from_millis(
            self.config.align_exposure_ms,
        )))
    }

    fn start_scan(&mut self) -> Result<NextAction, ScanError> {
        if self.camera.is_none() {
            return Err(ScanError::NoCamera);
        }
        if self.scan.is_some() {
            return Err(ScanError::ScanBufferExists);
        }
        let estimate = self.tracker.estimate().ok_or(ScanError::RateNotMeasured)?;
        let minutes = self.duration_minutes.ok_or(ScanError::DurationNotSet)?;

        let scan = TdiAssembler::start(minutes, estimate.row_exposure_ms, self.dims)?;
        if let Some(camera) = self.camera.as_mut() {
            camera.clear_sensor(FieldMode::Both)?;
        }

        self.scan = Some(scan);
        self.transition(ScanState::Scanning);
        Ok(NextAction::Tick(Duration::from_secs_f64(
            estimate.row_exposure_ms / 1000.0,
        )))
    }

    fn request_stop(&mut self, interrupted: ScanPhase) -> Result<NextAction, ScanError> {
        self.transition(ScanState::Stopping { interrupted });
        Ok(NextAction::Unchanged)
    }

    fn alignment_tick(&mut self) -> Result<NextAction, ScanError> {
        let camera = self.camera.as_mut().ok_or(ScanError::NoCamera)?;
        let raw = camera.read_pixels(ReadoutRequest::full_frame(self.dims))?;
        let frame = if self.config.invert_alignment_rows {
            invert_rows(raw)
        } else {
            raw
        };

        match self.tracker.observe(frame.view()) {
            AlignmentOutcome::OutOfFrame => {
                log::info!("Tracked star has left the frame; rate is final")
            }
            AlignmentOutcome::NotFound => log::debug!("No star this frame"),
            _ => {}
        }
        self.preview.composite(frame.view(), &mut self.ramp);
        log::info!("{}", self.status());

        Ok(NextAction::Tick(Duration::from_millis(
            self.config.align_exposure_ms,
        )))
    }

    fn scan_tick(&mut self) -> Result<NextAction, ScanError> {
        let camera = self.camera.as_mut().ok_or(ScanError::NoCamera)?;
        let scan = self.scan.as_mut().ok_or(ScanError::InvalidTransition {
            state: self.state,
            command: ScanCommand::Scan,
        })?;

        let row = camera.read_pixels(ReadoutRequest::tdi_row(self.dims))?;
        if row.nrows() != 1 {
            return Err(CameraError::CaptureError(format!(
                "TDI readout returned {} rows, expected 1",
                row.nrows()
            ))
            .into());
        }
        let done = scan.append_row(row.row(0))?;
        scan.render(&mut self.ramp, self.preview.raster_mut());

        if done {
            self.transition(ScanState::Idle);
            Ok(NextAction::Halt)
        } else {
            Ok(NextAction::Tick(Duration::from_secs_f64(
                scan.row_exposure_ms() / 1000.0,
            )))
        }
    }

    fn transition(&mut self, next: ScanState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        log::info!("Scan state: {} -> {}", self.state, next);
        self.state = next;
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            camera: self.camera.as_ref().map(|c| c.name()),
            state: self.state,
            scan_rate: self.tracker.estimate().map(|e| e.scan_rate),
            scan_progress: self
                .scan
                .as_ref()
                .map(|s| (s.buffer().captured(), s.buffer().len())),
        }
    }

    /// Current display raster (alignment preview or scan window)
    pub fn raster(&self) -> &RgbImage {
        self.preview.raster()
    }

    pub fn tdi_buffer(&self) -> Option<&TdiBuffer> {
        self.scan.as_ref().map(|s| s.buffer())
    }

    pub fn rate_estimate(&self) -> Option<RateEstimate> {
        self.tracker.estimate()
    }

    pub fn tracker(&self) -> &RateTracker {
        &self.tracker
    }

    pub fn camera_attached(&self) -> bool {
        self.camera.is_some()
    }

    pub fn camera(&self) -> Option<&C> {
        self.camera.as_ref()
    }

    pub fn frame_dimensions(&self) -> FrameDimensions {
        self.dims
    }

    /// Pixel pitch of the attached camera, or the configured fallback
    pub fn pixel_dimensions(&self) -> PixelDimensions {
        self.pixel
    }

    pub fn ramp(&self) -> &DisplayRamp {
        &self.ramp
    }

    pub fn duration_minutes(&self) -> Option<u32> {
        self.duration_minutes
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }
}

/// Flip a bottom-up readout so row 0 is the first row of the sky
fn invert_rows(frame: Array2<u16>) -> Array2<u16> {
    frame.slice(s![..;-1, ..]).to_owned()
}
