use anyhow::{bail, Context};
use clap::Parser;
use driftscan::config::DEFAULT_DURATION_HOURS;
use driftscan::{NextAction, ScanCommand, ScanConfig, ScanSession};
use ndarray::s;
use shared::camera_interface::mock::MockScanCamera;
use shared::camera_interface::{FrameDimensions, PixelDimensions};
use shared::config_storage::ConfigStorage;
use shared::image_proc::test_patterns::{
    add_gaussian_noise, drifting_frames, sky_strip, SyntheticStar,
};
use std::path::PathBuf;

/// Command line arguments for the headless drift scanner
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Headless drift-scan session against a simulated sky",
    long_about = "Runs a full drift-scan session without a display.\n\n\
        A simulated camera replays full frames of a star drifting down the sensor \
        for rate alignment, then serves TDI rows from a synthetic sky strip. The \
        session measures the drift rate, scans for the requested duration (or \
        until --scan-rows rows have been captured) and reports the result."
)]
struct Args {
    #[arg(long, default_value_t = 256, help = "Sensor width in pixels")]
    width: usize,

    #[arg(long, default_value_t = 256, help = "Sensor height in pixels")]
    height: usize,

    #[arg(
        long,
        default_value_t = 25.0,
        help = "Simulated sky drift in rows per second"
    )]
    drift_rate: f64,

    #[arg(
        long,
        default_value_t = 4,
        help = "Alignment exposures to take before scanning",
        long_help = "Number of full-frame alignment exposures. The first picks the \
            reference star; each later exposure refines the drift rate. At least two \
            are needed for a measurement."
    )]
    align_frames: usize,

    #[arg(long, help = "Alignment exposure in milliseconds (overrides config)")]
    align_exposure_ms: Option<u64>,

    #[arg(long, help = "Scan duration in hours, 1-12")]
    hours: Option<u32>,

    #[arg(
        long,
        default_value_t = 2000,
        help = "Stop the scan after this many rows (0 scans the full duration)"
    )]
    scan_rows: usize,

    #[arg(long, help = "Display gamma (overrides config)")]
    gamma: Option<f64>,

    #[arg(long, help = "Enable the red-only display filter")]
    red_filter: bool,

    #[arg(
        long,
        help = "Configuration directory",
        long_help = "Directory holding scan_config.json. Defaults to ~/.driftscan."
    )]
    config_dir: Option<PathBuf>,

    #[arg(long, help = "Write the effective configuration back to the config directory")]
    save_config: bool,

    #[arg(long, default_value_t = 7.4, help = "Simulated pixel pitch in microns")]
    pixel_um: f64,

    #[arg(long, help = "Sleep for each tick period instead of running flat out")]
    realtime: bool,
}

fn build_camera(args: &Args, config: &ScanConfig) -> MockScanCamera {
    let dims = FrameDimensions::new(args.width, args.height, 16);
    let rows_per_frame = args.drift_rate * config.align_exposure_secs();

    let w = args.width as f64;
    let h = args.height as f64;
    let stars = [
        SyntheticStar::new(w / 2.0, h / 8.0, 20000.0, 1.5),
        SyntheticStar::new(w / 5.0, h / 3.0, 6000.0, 1.5),
        SyntheticStar::new(w * 0.8, h / 6.0, 4000.0, 1.5),
    ];

    let frames = drifting_frames(
        args.height,
        args.width,
        200.0,
        &stars,
        rows_per_frame,
        args.align_frames,
    )
    .into_iter()
    .enumerate()
    .map(|(i, mut frame)| {
        add_gaussian_noise(&mut frame, 5.0, i as u64);
        if config.invert_alignment_rows {
            // Sensor reads out bottom-up
            frame.slice(s![..;-1, ..]).to_owned()
        } else {
            frame
        }
    })
    .collect();

    let sky = sky_strip(4096, args.width, 200.0, 400, (1000.0, 30000.0), 42);
    MockScanCamera::new(dims, frames)
        .with_sky(sky)
        .with_name("Simulated")
        .with_pixel_dimensions(PixelDimensions {
            width_um: args.pixel_um,
            height_um: args.pixel_um,
        })
}

fn tick(
    session: &mut ScanSession<MockScanCamera>,
    next: NextAction,
    realtime: bool,
) -> anyhow::Result<NextAction> {
    if let NextAction::Tick(period) = next {
        if realtime {
            std::thread::sleep(period);
        }
    }
    Ok(session.on_tick()?)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let storage = match &args.config_dir {
        Some(dir) => ConfigStorage::with_path(dir.clone()),
        None => ConfigStorage::new().context("Locating config directory")?,
    };
    let mut config = ScanConfig::load_or_default(&storage)?;
    if let Some(ms) = args.align_exposure_ms {
        config.align_exposure_ms = ms;
    }
    if let Some(gamma) = args.gamma {
        config.gamma = gamma;
    }
    config.red_filter |= args.red_filter;
    config.validate()?;

    if args.save_config {
        let path = storage.save_scan_config(&config)?;
        println!("Saved config to {}", path.display());
    }

    let camera = build_camera(&args, &config);
    let mut session = ScanSession::new(config, Some(camera))?;
    println!("{}", session.status());

    let mut align_next = session.handle_command(ScanCommand::Align)?;
    for _ in 0..args.align_frames {
        align_next = tick(&mut session, align_next, args.realtime)?;
    }
    let Some(estimate) = session.rate_estimate() else {
        bail!("No drift rate measured after {} frames", args.align_frames);
    };
    println!(
        "Measured {:.3} row/s ({:.2} ms per row)",
        estimate.scan_rate, estimate.row_exposure_ms
    );

    match (args.hours, session.duration_minutes()) {
        (Some(hours), _) => {
            session.handle_command(ScanCommand::SetDurationHours(hours))?;
        }
        (None, None) => {
            session.handle_command(ScanCommand::SetDurationHours(DEFAULT_DURATION_HOURS))?;
        }
        (None, Some(_)) => {}
    }

    let mut next = session.handle_command(ScanCommand::Scan)?;
    loop {
        let captured = session.tdi_buffer().map_or(0, |b| b.captured());
        if args.scan_rows > 0 && captured >= args.scan_rows && session.state().is_capturing() {
            session.handle_command(ScanCommand::Stop)?;
        }

        next = tick(&mut session, next, args.realtime)?;
        if next == NextAction::Halt {
            break;
        }
        if captured > 0 && captured % 500 == 0 {
            log::info!("{}", session.status());
        }
    }

    println!("{}", session.status());
    match session.tdi_buffer() {
        Some(buffer) if buffer.is_empty() => println!("Scan stopped before any rows"),
        Some(buffer) => {
            let peak = buffer.captured_rows().iter().copied().max().unwrap_or(0);
            let pixel = session.pixel_dimensions();
            println!(
                "Scan length {} rows x {} px ({:.1} x {:.1} mm on sensor), peak {}",
                buffer.len(),
                buffer.width(),
                buffer.len() as f64 * pixel.height_um / 1000.0,
                buffer.width() as f64 * pixel.width_um / 1000.0,
                peak
            );
        }
        None => println!("No scan captured"),
    }
    let (w, h) = session.raster().dimensions();
    println!("Display raster {w}x{h}");

    Ok(())
}
