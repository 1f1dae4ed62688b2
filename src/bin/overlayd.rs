//! overlayd - live detection overlay loop
//!
//! This daemon:
//! 1. Loads configuration (`OVERLAY_CONFIG` file, then environment overrides)
//! 2. Starts the pipeline; a detector that cannot load aborts startup
//! 3. Captures frames on the main thread at the source frame rate
//! 4. Applies overlays on a dedicated render thread
//! 5. Stops on ctrl-c, letting any in-flight inference finish

use anyhow::{anyhow, Result};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use detection_overlay::{
    start_pipeline, FrameSource, NullSurface, OverlayConfig, RenderContext, SourceFrame,
    Submission, SyntheticConfig, SyntheticSource, ViewportGeometry,
};

const RENDER_WAIT: Duration = Duration::from_millis(100);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = OverlayConfig::load()?;
    log::info!(
        "overlayd {} backend={} min_confidence={:.2} source={}",
        env!("CARGO_PKG_VERSION"),
        cfg.detector.backend,
        cfg.min_confidence,
        cfg.source.url
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))?;
    }

    let (mut controller, render) = start_pipeline(&cfg, NullSurface)?;

    let mut source = SyntheticSource::new(SyntheticConfig::new(
        &cfg.source.url,
        cfg.source.width,
        cfg.source.height,
        cfg.viewport,
    ))?;
    source.connect()?;

    let (resize_tx, resize_rx) = crossbeam_channel::unbounded::<ViewportGeometry>();
    let render_thread = std::thread::Builder::new()
        .name("overlay-render".to_string())
        .spawn(move || render_loop(render, resize_rx))?;

    let frame_interval = Duration::from_secs_f64(1.0 / cfg.source.target_fps as f64);
    let mut last_viewport = cfg.viewport;
    let mut last_health_log = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        let started = Instant::now();
        let SourceFrame { frame, viewport } = source.next_frame()?;

        if viewport != last_viewport {
            last_viewport = viewport;
            if resize_tx.send(viewport).is_err() {
                log::warn!("render thread gone; stopping capture");
                break;
            }
        }

        if controller.submit(frame, viewport) == Submission::Stopped {
            log::error!("pipeline stopped; leaving capture loop");
            break;
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = controller.stats();
            log::info!(
                "source health={} frames={} submitted={} dropped={} failed={} rendered={}",
                source.is_healthy(),
                source.stats().frames_captured,
                stats.frames_submitted,
                stats.frames_dropped,
                stats.inferences_failed,
                stats.overlays_rendered
            );
            last_health_log = Instant::now();
        }

        std::thread::sleep(frame_interval.saturating_sub(started.elapsed()));
    }

    log::info!("shutting down");
    controller.stop()?;
    drop(resize_tx);
    render_thread
        .join()
        .map_err(|_| anyhow!("render thread panicked"))?;
    Ok(())
}

fn render_loop(mut render: RenderContext<NullSurface>, resizes: Receiver<ViewportGeometry>) {
    loop {
        while let Ok(viewport) = resizes.try_recv() {
            render.resize(viewport);
        }
        match render.wait_and_pump(RENDER_WAIT) {
            Ok(Some(sequence)) => {
                let labels: Vec<&str> = render.layers().iter().filter_map(|l| l.text()).collect();
                log::info!("frame {} overlay: {:?}", sequence, labels);
            }
            Ok(None) => {}
            Err(_) => break,
        }
    }
    log::info!("render loop finished: {:?}", render.stats());
}
