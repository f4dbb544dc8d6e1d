//! Laser Speckle Flow CLI
//!
//! Converts single frames to correlation time maps, or runs a live
//! session against a synthetic or recorded frame source.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use clap::{Args, Parser, Subcommand, ValueEnum};
use speckle_flow::{
    capture::{FileConfig, RawFileSource, SyntheticSpeckleSource},
    compute::{OutputFormat, OutputImage, PipelineOptions, VisualizerMode},
    convert,
    live::{LiveSession, SessionOutcome},
};
use tracing::{info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "speckle-flow")]
#[command(version, about = "Laser speckle contrast imaging", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert one greyscale image or raw frame to a colour map
    Convert {
        /// Input image (PNG/TIFF) or raw packed frame (.raw/.bin)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output image; the format follows the extension
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Render frames continuously from a frame source
    Live(LiveArgs),
}

#[derive(Args)]
struct LiveArgs {
    /// Configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of frames to render
    #[arg(short = 'n', long, value_name = "N")]
    frames: Option<u64>,

    /// Run until interrupted
    #[arg(long, conflicts_with = "frames")]
    continuous: bool,

    /// Save the last rendered image here
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// Write the session report (TOML) here
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Replay raw frames from a file instead of the synthetic source
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Restart the replay at the end of the file
    #[arg(long = "loop", requires = "replay")]
    looping: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

/// Pipeline overrides shared by both commands.
#[derive(Args)]
struct PipelineArgs {
    /// Frame width (raw input or live source)
    #[arg(long)]
    width: Option<usize>,

    /// Frame height (raw input or live source)
    #[arg(long)]
    height: Option<usize>,

    /// Bits per packed sample (raw input or live source)
    #[arg(long)]
    bits: Option<u32>,

    /// Spatial window size, an odd number of pixels
    #[arg(long)]
    window: Option<usize>,

    /// Table size used for solving the correlation time equation
    #[arg(long)]
    correlation_table_size: Option<usize>,

    /// Baseline correlation time
    #[arg(long)]
    baseline: Option<f64>,

    /// Correlation time mapped to the top of the palette
    #[arg(long)]
    color_scale: Option<f64>,

    /// Opacity of the colour map over the source image (overlay mode)
    #[arg(long)]
    alpha: Option<f64>,

    /// Visualization mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Output pixel format (rgb or rgba)
    #[arg(long, value_name = "FORMAT")]
    format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Direct,
    Overlay,
}

impl From<ModeArg> for VisualizerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Direct => VisualizerMode::Direct,
            ModeArg::Overlay => VisualizerMode::Overlay,
        }
    }
}

impl PipelineArgs {
    fn apply(&self, options: &mut PipelineOptions) {
        macro_rules! set {
            ($field:ident, $arg:expr) => {
                if let Some(value) = $arg {
                    options.$field = value.into();
                }
            };
        }
        set!(width, self.width);
        set!(height, self.height);
        set!(bits_per_sample, self.bits);
        set!(spatial_window, self.window);
        set!(correlation_table_size, self.correlation_table_size);
        set!(baseline_correlation_time, self.baseline);
        set!(color_scale, self.color_scale);
        set!(alpha, self.alpha);
        set!(mode, self.mode);
        set!(output_format, self.format);
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Convert {
            input,
            output,
            pipeline,
        } => run_convert(&input, &output, &pipeline),
        Commands::Live(args) => run_live(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_convert(input: &Path, output: &Path, args: &PipelineArgs) -> CliResult {
    let mut options = PipelineOptions::default();
    args.apply(&mut options);
    convert::convert_file(input, output, &options)?;
    Ok(())
}

fn run_live(args: LiveArgs) -> CliResult {
    info!("Speckle Flow v{}", speckle_flow::VERSION);

    let mut file_config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    // Geometry overrides apply to the source as well as the pipeline.
    if let Some(width) = args.pipeline.width {
        file_config.capture.width = width;
    }
    if let Some(height) = args.pipeline.height {
        file_config.capture.height = height;
    }
    if let Some(bits) = args.pipeline.bits {
        file_config.capture.bits_per_sample = bits;
    }

    let mut options = file_config.pipeline_options();
    args.pipeline.apply(&mut options);

    let mut session = LiveSession::new(file_config.capture.clone(), options);
    let continuous = args.continuous || (args.frames.is_none() && file_config.live.continuous);
    if !continuous {
        session = session.with_frame_limit(args.frames.unwrap_or(file_config.live.frame_count));
    }

    let stop = session.stop_handle();
    ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))?;

    #[cfg(feature = "metrics")]
    {
        session = attach_metrics(session, &file_config.live)?;
    }

    let on_frame = |sequence: u64, _: &OutputImage| {
        if sequence % 100 == 0 {
            info!(sequence, "Rendering");
        }
    };
    let SessionOutcome { report, last_image } = match args.replay {
        Some(path) => session.run(RawFileSource::new(path, args.looping), on_frame)?,
        None => session.run(SyntheticSpeckleSource::new(), on_frame)?,
    };

    if let Some(path) = &args.snapshot {
        match &last_image {
            Some(image) => {
                convert::save_image(image, path)?;
                info!(path = %path.display(), "Snapshot saved");
            }
            None => warn!("No frame rendered, snapshot not written"),
        }
    }

    if let Some(path) = &args.report {
        std::fs::write(path, report.to_toml()?)?;
        info!(path = %path.display(), "Session report written");
    }

    println!(
        "Rendered {} of {} frames ({} dropped, {} failed)",
        report.frames_rendered, report.frames_captured, report.frames_dropped, report.frames_failed
    );
    Ok(())
}

#[cfg(feature = "metrics")]
fn attach_metrics(
    session: LiveSession,
    live: &speckle_flow::capture::LiveConfig,
) -> Result<LiveSession, Box<dyn std::error::Error>> {
    use speckle_flow::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};
    use std::sync::Arc;
    use std::time::Duration;

    let Some(config) = MetricsServerConfig::from_live(live) else {
        return Ok(session);
    };

    let registry = Arc::new(MetricsRegistry::new()?);
    let server = MetricsServer::new(config, Arc::clone(&registry));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    // Stops on Ctrl-C; otherwise it ends with the process.
    let stop = session.stop_handle();
    let shutdown = async move {
        while !stop.load(Ordering::Relaxed) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };

    std::thread::Builder::new()
        .name("metrics-server".into())
        .spawn(move || {
            if let Err(e) = runtime.block_on(server.run_until(shutdown)) {
                warn!(error = %e, "Metrics server failed");
            }
        })?;

    Ok(session.with_metrics(registry))
}
