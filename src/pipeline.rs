//! Per-frame orchestration across the capture, inference and render contexts.
//!
//! - `PipelineController`: lives on the capture side. `submit` never blocks:
//!   it either hands the frame to the inference worker or drops it.
//! - Inference worker: owns the `Detector` and the `ResultFilter`, runs one
//!   frame at a time and posts accepted detections to the render context.
//! - `RenderContext`: owns the `OverlayRenderer`. Only `pump`/`wait_and_pump`
//!   apply results, so all overlay mutation happens wherever the context lives.
//!
//! The Idle/AwaitingInference flag is the only state shared between contexts.
//! It is an atomic and every transition is a compare-and-swap. A successful
//! inference returns to Idle only once the render context has drawn it, so at
//! most one result is ever waiting to be rendered. A failed inference returns
//! to Idle from the worker.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::Serialize;

use crate::detect::{Detector, DetectorBackend};
use crate::error::PipelineError;
use crate::filter::{AcceptedDetection, ResultFilter};
use crate::frame::Frame;
use crate::geometry::ViewportGeometry;
use crate::overlay::{OverlayLayer, OverlayRenderer, OverlayStyle, OverlaySurface};

const WORKER_THREAD_NAME: &str = "overlay-inference";
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(1);

const STATE_IDLE: u8 = 0;
const STATE_AWAITING: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Controller state as observed from any context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    AwaitingInference,
    Stopped,
}

impl PipelineState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            STATE_IDLE => PipelineState::Idle,
            STATE_AWAITING => PipelineState::AwaitingInference,
            _ => PipelineState::Stopped,
        }
    }
}

/// Outcome of offering a frame to the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    /// The frame is now the single in-flight inference.
    Dispatched,
    /// An inference was already in flight; the frame was discarded.
    Dropped,
    /// The pipeline no longer accepts frames.
    Stopped,
}

/// Pipeline settings fixed at start.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub filter: ResultFilter,
    pub style: OverlayStyle,
}

/// Counter snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_submitted: u64,
    pub frames_dropped: u64,
    pub inferences_completed: u64,
    pub inferences_failed: u64,
    pub overlays_rendered: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rendered: AtomicU64,
}

struct Shared {
    state: AtomicU8,
    counters: Counters,
}

impl Shared {
    fn state(&self) -> PipelineState {
        PipelineState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// AwaitingInference -> Idle. Leaves Stopped untouched.
    fn finish_inference(&self) {
        let _ = self.state.compare_exchange(
            STATE_AWAITING,
            STATE_IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn stop(&self) {
        self.state.store(STATE_STOPPED, Ordering::Release);
    }

    fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            frames_submitted: c.submitted.load(Ordering::Relaxed),
            frames_dropped: c.dropped.load(Ordering::Relaxed),
            inferences_completed: c.completed.load(Ordering::Relaxed),
            inferences_failed: c.failed.load(Ordering::Relaxed),
            overlays_rendered: c.rendered.load(Ordering::Relaxed),
        }
    }
}

struct InferenceJob {
    frame: Frame,
    viewport: ViewportGeometry,
}

/// Completed inference, marshalled from the worker to the render context.
#[derive(Debug)]
pub struct RenderUpdate {
    pub sequence: u64,
    pub viewport: ViewportGeometry,
    pub detections: Vec<AcceptedDetection>,
    /// Capture-to-completion latency.
    pub latency: Duration,
    pub captured_at: Instant,
}

/// Capture-side handle of a running pipeline.
pub struct PipelineController {
    shared: Arc<Shared>,
    jobs: Option<Sender<InferenceJob>>,
    worker: Option<JoinHandle<()>>,
    backend_name: &'static str,
}

impl PipelineController {
    /// Load the detector and spawn the inference worker.
    ///
    /// A backend that fails to load is fatal: no controller is returned and
    /// no frame is ever accepted.
    pub fn start<S: OverlaySurface>(
        backend: Box<dyn DetectorBackend>,
        config: PipelineConfig,
        surface: S,
        viewport: ViewportGeometry,
    ) -> Result<(Self, RenderContext<S>), PipelineError> {
        let detector = Detector::load(backend).map_err(PipelineError::FatalInit)?;
        let backend_name = detector.backend_name();

        let shared = Arc::new(Shared {
            state: AtomicU8::new(STATE_IDLE),
            counters: Counters::default(),
        });
        let (job_tx, job_rx) = crossbeam_channel::bounded::<InferenceJob>(1);
        let (update_tx, update_rx) = crossbeam_channel::bounded::<RenderUpdate>(1);

        let worker_shared = shared.clone();
        let filter = config.filter.clone();
        let worker = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || inference_worker(detector, filter, job_rx, update_tx, worker_shared))
            .map_err(PipelineError::Spawn)?;

        log::info!(
            "pipeline started: backend={} min_confidence={:.2}",
            backend_name,
            config.filter.min_confidence()
        );

        let render = RenderContext {
            renderer: OverlayRenderer::new(surface, viewport, config.style),
            updates: update_rx,
            shared: shared.clone(),
            shown_sequence: None,
            resized_at: None,
        };
        let controller = Self {
            shared,
            jobs: Some(job_tx),
            worker: Some(worker),
            backend_name,
        };
        Ok((controller, render))
    }

    /// Offer a frame. Never blocks the caller.
    pub fn submit(&self, frame: Frame, viewport: ViewportGeometry) -> Submission {
        let Some(jobs) = self.jobs.as_ref() else {
            return Submission::Stopped;
        };
        let counters = &self.shared.counters;

        match self.shared.state.compare_exchange(
            STATE_IDLE,
            STATE_AWAITING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STATE_AWAITING) => {
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("frame {} dropped: inference in flight", frame.sequence);
                return Submission::Dropped;
            }
            Err(_) => return Submission::Stopped,
        }

        let sequence = frame.sequence;
        match jobs.try_send(InferenceJob { frame, viewport }) {
            Ok(()) => {
                counters.submitted.fetch_add(1, Ordering::Relaxed);
                Submission::Dispatched
            }
            Err(TrySendError::Full(_)) => {
                // Only reachable if the worker has not yet consumed the previous job.
                self.shared.finish_inference();
                counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::debug!("frame {} dropped: worker queue full", sequence);
                Submission::Dropped
            }
            Err(TrySendError::Disconnected(_)) => {
                self.shared.stop();
                log::error!("inference worker exited; pipeline stopped");
                Submission::Stopped
            }
        }
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    /// Poll until no inference is in flight or awaiting render. Returns false
    /// on timeout. Someone must be pumping the render context for a successful
    /// inference to count as finished.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state() {
                PipelineState::Idle | PipelineState::Stopped => return true,
                PipelineState::AwaitingInference => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    /// Stop accepting frames and join the worker.
    ///
    /// An inference already in flight runs to completion first.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        self.shared.stop();
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            worker.join().map_err(|_| PipelineError::WorkerPanicked)?;
            log::info!("pipeline stopped: {:?}", self.shared.stats());
        }
        Ok(())
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("pipeline shutdown: {}", err);
        }
    }
}

/// Marks the pipeline stopped if the worker unwinds, so the capture side sees
/// `Stopped` instead of an inference that never finishes.
struct StopOnPanic(Arc<Shared>);

impl Drop for StopOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.stop();
        }
    }
}

fn inference_worker(
    mut detector: Detector,
    filter: ResultFilter,
    jobs: Receiver<InferenceJob>,
    updates: Sender<RenderUpdate>,
    shared: Arc<Shared>,
) {
    let _guard = StopOnPanic(shared.clone());
    log::info!("inference worker started ({})", detector.backend_name());

    while let Ok(InferenceJob { frame, viewport }) = jobs.recv() {
        let sequence = frame.sequence;
        match detector.detect(&frame) {
            Ok(raw) => {
                let found = raw.len();
                let detections = filter.apply(raw);
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "frame {}: {} detections, {} accepted",
                    sequence,
                    found,
                    detections.len()
                );
                let update = RenderUpdate {
                    sequence,
                    viewport,
                    detections,
                    latency: frame.age(),
                    captured_at: frame.captured_at(),
                };
                // The render context moves the state back to Idle once drawn.
                if updates.send(update).is_err() {
                    log::debug!("render context gone; frame {} not shown", sequence);
                    shared.finish_inference();
                }
            }
            Err(err) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("frame {} skipped: {}", sequence, err);
                shared.finish_inference();
            }
        }
    }

    log::info!("inference worker stopped");
}

/// Render-side half of the pipeline. Owns the overlay.
pub struct RenderContext<S: OverlaySurface> {
    renderer: OverlayRenderer<S>,
    updates: Receiver<RenderUpdate>,
    shared: Arc<Shared>,
    shown_sequence: Option<u64>,
    resized_at: Option<Instant>,
}

impl<S: OverlaySurface> RenderContext<S> {
    /// Apply completed inferences without blocking.
    ///
    /// Returns the sequence of the frame now on screen, if this call changed it.
    pub fn pump(&mut self) -> Option<u64> {
        match self.updates.try_recv() {
            Ok(update) => Some(self.apply(update)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block up to `timeout` for the next result, then apply it.
    pub fn wait_and_pump(&mut self, timeout: Duration) -> Result<Option<u64>, PipelineError> {
        match self.updates.recv_timeout(timeout) {
            Ok(update) => Ok(Some(self.apply(update))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(PipelineError::Stopped),
        }
    }

    fn apply(&mut self, update: RenderUpdate) -> u64 {
        // A resize after capture describes the surface better than the
        // viewport recorded with the frame.
        let viewport = match self.resized_at {
            Some(resized_at) if resized_at > update.captured_at => self.renderer.viewport(),
            _ => update.viewport,
        };
        self.renderer.render(&update.detections, viewport);
        self.shown_sequence = Some(update.sequence);
        self.shared.counters.rendered.fetch_add(1, Ordering::Relaxed);
        self.shared.finish_inference();
        log::debug!(
            "overlay for frame {}: {} boxes, latency {:?}",
            update.sequence,
            update.detections.len(),
            update.latency
        );
        update.sequence
    }

    /// Reposition the overlay after a geometry change.
    pub fn resize(&mut self, viewport: ViewportGeometry) {
        self.renderer.resize(viewport);
        self.resized_at = Some(Instant::now());
    }

    /// Completed inferences not yet applied. Never more than one.
    pub fn pending(&self) -> usize {
        self.updates.len()
    }

    pub fn layers(&self) -> &[OverlayLayer] {
        self.renderer.layers()
    }

    pub fn renderer(&self) -> &OverlayRenderer<S> {
        &self.renderer
    }

    pub fn surface_mut(&mut self) -> &mut S {
        self.renderer.surface_mut()
    }

    /// Frame whose detections are currently drawn.
    pub fn shown_sequence(&self) -> Option<u64> {
        self.shown_sequence
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.stats()
    }
}

impl<S: OverlaySurface> Drop for RenderContext<S> {
    fn drop(&mut self) {
        // Nothing will draw a pending result, so release the capture side.
        self.shared.finish_inference();
    }
}
