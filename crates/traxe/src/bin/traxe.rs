//! traxe CLI: config helpers and offline replay of recorded depth frames.

use std::{
    collections::BTreeSet,
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use traxe::{Command, EventSink, JsonLinesSink, PngSequenceSource, Tracker, TrackerConfig};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "traxe")]
#[command(
    about = "Depth-camera impact tracker: calibrate, detect settled objects, emit hit/miss events"
)]
#[command(version)]
struct Cli {
    /// Log level for stderr output (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a JSON tracker config and print the effective settings.
    CheckConfig {
        /// Path to the JSON config.
        path: PathBuf,
    },

    /// Write the default config as JSON.
    DefaultConfig {
        /// Destination path.
        path: PathBuf,
    },

    /// Run the tracker over a directory of 16-bit depth PNGs.
    Replay(ReplayArgs),
}

#[derive(Debug, Clone, Args)]
struct ReplayArgs {
    /// JSON tracker config (defaults apply when omitted).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of depth frames, replayed in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Simulated time between frames in milliseconds.
    #[arg(long, default_value = "33")]
    frame_period_ms: u64,

    /// Cycles (0-based, counted after startup) after which the current
    /// centroid is confirmed as the next calibration point.
    #[arg(long, value_delimiter = ',')]
    calibrate_at: Vec<u64>,

    /// Cycles after which calibration is reset.
    #[arg(long, value_delimiter = ',')]
    reset_at: Vec<u64>,

    /// Write wire-format events here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let level = traxe::core::parse_level(&cli.log_level)
        .ok_or_else(|| format!("unknown log level '{}'", cli.log_level))?;
    init_logging(level)?;

    match cli.command {
        Commands::CheckConfig { path } => run_check_config(&path),
        Commands::DefaultConfig { path } => run_default_config(&path),
        Commands::Replay(args) => run_replay(&args),
    }
}

#[cfg(feature = "tracing")]
fn init_logging(level: LevelFilter) -> CliResult<()> {
    traxe::core::init_tracing(level, false);
    // the subscriber may already have bridged `log` records
    let _ = tracing_log::LogTracer::init();
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(level: LevelFilter) -> CliResult<()> {
    traxe::core::init_with_level(level).map_err(|e| e.to_string())?;
    Ok(())
}

fn run_check_config(path: &Path) -> CliResult<()> {
    let cfg = TrackerConfig::load_json(path)?;
    let region = cfg.target_region();
    let tl = region.polygon()[0];
    println!("config ok: {}", path.display());
    println!("  lane:            {}", cfg.lane_id);
    println!(
        "  depth range:     {:.2}..{:.2} m (delta {:.3} m)",
        cfg.segment.min_depth_m, cfg.segment.max_depth_m, cfg.segment.depth_delta_m
    );
    println!(
        "  settle:          {:.1} px for {:.2} s",
        cfg.motion_tolerance_px, cfg.dwell_seconds
    );
    println!("  display:         {}x{}", cfg.display.width, cfg.display.height);
    println!(
        "  target square:   side {:.0} px at ({:.0}, {:.0})",
        region.side(),
        tl.x,
        tl.y
    );
    Ok(())
}

fn run_default_config(path: &Path) -> CliResult<()> {
    TrackerConfig::default().write_json(path)?;
    println!("wrote {}", path.display());
    Ok(())
}

fn run_replay(args: &ReplayArgs) -> CliResult<()> {
    let cfg = match &args.config {
        Some(path) => TrackerConfig::load_json(path)?,
        None => TrackerConfig::default(),
    };
    let source = PngSequenceSource::open(
        &args.frames,
        cfg.depth_scale,
        Duration::from_millis(args.frame_period_ms),
    )?;

    let sink: Box<dyn EventSink> = match &args.out {
        Some(path) => Box::new(JsonLinesSink::new(
            path.display().to_string(),
            BufWriter::new(File::create(path)?),
        )),
        None => Box::new(JsonLinesSink::new("stdout", std::io::stdout())),
    };

    let calibrate_at: BTreeSet<u64> = args.calibrate_at.iter().copied().collect();
    let reset_at: BTreeSet<u64> = args.reset_at.iter().copied().collect();

    let mut tracker = Tracker::start(source, cfg, vec![sink])?;
    let mut cycle = 0u64;
    while tracker.step().is_some() {
        if calibrate_at.contains(&cycle) {
            tracker.handle(Command::ConfirmCalibration);
        }
        if reset_at.contains(&cycle) {
            tracker.handle(Command::ResetCalibration);
        }
        cycle += 1;
    }

    let summary = tracker.finish();
    info!(
        "replayed {} cycles: {} settles, {} hits, {} misses, {} events delivered",
        cycle,
        summary.session.settles,
        summary.session.hits,
        summary.session.misses,
        summary.delivery.delivered
    );
    Ok(())
}
