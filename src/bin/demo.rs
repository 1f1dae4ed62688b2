//! demo - finite synthetic run of the detection overlay pipeline

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Serialize;
use std::time::{Duration, Instant};

use detection_overlay::{
    FrameSource, OverlayLayer, OverlayStyle, PipelineConfig, PipelineController, PipelineState,
    PipelineStats, ResultFilter, StubBackend, Submission, SyntheticConfig, SyntheticSource,
    ViewportGeometry, DEFAULT_MIN_CONFIDENCE,
};

#[cfg(feature = "raster")]
use detection_overlay::ImageSurface;
#[cfg(not(feature = "raster"))]
use detection_overlay::NullSurface;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_POLL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration in seconds of synthetic capture.
    #[arg(long, default_value_t = 3)]
    seconds: u64,
    /// Frames per second for the synthetic source.
    #[arg(long, default_value_t = 30)]
    fps: u32,
    /// Source frame width.
    #[arg(long, default_value_t = 320)]
    width: u32,
    /// Source frame height.
    #[arg(long, default_value_t = 240)]
    height: u32,
    /// Viewport width in points.
    #[arg(long, default_value_t = 390.0)]
    viewport_width: f32,
    /// Viewport height in points.
    #[arg(long, default_value_t = 844.0)]
    viewport_height: f32,
    /// Minimum confidence for a detection to be drawn (exclusive).
    #[arg(long, env = "OVERLAY_MIN_CONFIDENCE", default_value_t = DEFAULT_MIN_CONFIDENCE)]
    min_confidence: f32,
    /// Background noise amplitude added to synthetic frames.
    #[arg(long, default_value_t = 0)]
    noise: u8,
    /// Rotate the viewport every N frames (0 disables).
    #[arg(long, default_value_t = 0)]
    rotate_every: u64,
    /// Write the final overlay as a PNG (requires the raster feature).
    #[arg(long)]
    snapshot: Option<std::path::PathBuf>,
}

#[derive(Serialize)]
struct Summary<'a> {
    frames: u64,
    shown_sequence: Option<u64>,
    stats: PipelineStats,
    layers: &'a [OverlayLayer],
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    stage("start pipeline");
    let viewport = ViewportGeometry::new(args.viewport_width, args.viewport_height)?;
    let config = PipelineConfig {
        filter: ResultFilter::new(args.min_confidence)?,
        style: OverlayStyle::default(),
    };
    #[cfg(feature = "raster")]
    let surface = ImageSurface::new();
    #[cfg(not(feature = "raster"))]
    let surface = NullSurface;
    let (mut controller, mut render) =
        PipelineController::start(Box::new(StubBackend::new()), config, surface, viewport)?;

    stage("capture synthetic frames");
    let mut source_cfg = SyntheticConfig::new("stub://demo", args.width, args.height, viewport);
    source_cfg.noise = args.noise;
    source_cfg.rotate_every = args.rotate_every;
    let mut source = SyntheticSource::new(source_cfg)?;
    source.connect()?;

    let total_frames = args.seconds.saturating_mul(args.fps as u64);
    let frame_interval = Duration::from_secs_f64(1.0 / args.fps as f64);
    let mut current_viewport = viewport;
    for _ in 0..total_frames {
        let next = source.next_frame()?;
        if next.viewport != current_viewport {
            current_viewport = next.viewport;
            render.resize(current_viewport);
        }
        if controller.submit(next.frame, next.viewport) == Submission::Stopped {
            return Err(anyhow!("pipeline stopped unexpectedly"));
        }
        render.pump();
        std::thread::sleep(frame_interval);
    }

    stage("drain");
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while controller.state() == PipelineState::AwaitingInference {
        if Instant::now() >= deadline {
            return Err(anyhow!("inference did not finish within {:?}", DRAIN_TIMEOUT));
        }
        render.wait_and_pump(DRAIN_POLL)?;
    }
    controller.stop()?;

    let summary = Summary {
        frames: total_frames,
        shown_sequence: render.shown_sequence(),
        stats: render.stats(),
        layers: render.layers(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if let Some(path) = args.snapshot.as_deref() {
        write_snapshot(&mut render, path)?;
    }
    Ok(())
}

#[cfg(feature = "raster")]
fn write_snapshot(
    render: &mut detection_overlay::RenderContext<ImageSurface>,
    path: &std::path::Path,
) -> Result<()> {
    stage("write snapshot");
    render.surface_mut().save(path)
}

#[cfg(not(feature = "raster"))]
fn write_snapshot(
    _render: &mut detection_overlay::RenderContext<NullSurface>,
    _path: &std::path::Path,
) -> Result<()> {
    Err(anyhow!("--snapshot requires the raster feature"))
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
