//! Detection Overlay
//!
//! This crate implements a real-time object-detection overlay pipeline: frames
//! come in from a camera-like source, run through an opaque detector off the
//! render thread, and come back out as bounding-box and label layers drawn
//! over the feed.
//!
//! # Architecture
//!
//! The pipeline holds these properties by construction:
//!
//! 1. **No backlog**: at most one inference is in flight; frames arriving
//!    meanwhile are dropped, never queued.
//! 2. **Single render owner**: only the `RenderContext` mutates overlay layers.
//! 3. **Whole-frame overlays**: every render replaces the full layer set, so the
//!    surface never mixes two frames' detections.
//! 4. **Fail-soft inference**: a failed frame leaves the previous overlay in
//!    place; only model load failures stop the pipeline.
//!
//! # Module Structure
//!
//! - `frame`: immutable frame buffers
//! - `ingest`: frame sources (synthetic `stub://` source)
//! - `detect`: detector backends, registry and the `Detector` wrapper
//! - `filter`: acceptance policy (`ResultFilter`, `AcceptedDetection`)
//! - `geometry`: normalized and screen coordinate spaces, the mapper
//! - `overlay`: layer reconciliation (`OverlayRenderer`, `OverlaySurface`)
//! - `pipeline`: controller state machine and render context
//! - `config`: file + environment configuration

pub mod config;
pub mod detect;
pub mod error;
pub mod filter;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod overlay;
pub mod pipeline;
#[cfg(feature = "raster")]
pub mod raster;

pub use config::{DetectorSettings, OverlayConfig, SourceSettings};
pub use detect::{
    BackendRegistry, ClassLabel, Detector, DetectorBackend, Observation, RawDetection,
    RecognizedObject, StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::{TractBackend, TractConfig};
pub use error::{ConfigError, DetectorError, PipelineError};
pub use filter::{filter, AcceptedDetection, ResultFilter, DEFAULT_MIN_CONFIDENCE};
pub use frame::Frame;
pub use geometry::{map, NormalizedRect, ScreenRect, ViewportGeometry};
pub use ingest::{FrameSource, SourceFrame, SourceStats, SyntheticConfig, SyntheticSource};
pub use overlay::{NullSurface, OverlayLayer, OverlayRenderer, OverlayStyle, OverlaySurface};
pub use pipeline::{
    PipelineConfig, PipelineController, PipelineState, PipelineStats, RenderContext,
    RenderUpdate, Submission,
};
#[cfg(feature = "raster")]
pub use raster::ImageSurface;

/// Build a registry holding every backend compiled into this binary.
///
/// The stub backend is always present. The tract backend is registered only
/// when the feature is enabled and a model path is configured.
pub fn default_registry(settings: &DetectorSettings) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(StubBackend::new());
    register_tract(&mut registry, settings);
    registry
}

#[cfg(feature = "backend-tract")]
fn register_tract(registry: &mut BackendRegistry, settings: &DetectorSettings) {
    if let Some(model_path) = settings.model_path.clone() {
        let mut tract = TractConfig::new(model_path);
        tract.labels_path = settings.labels_path.clone();
        registry.register(TractBackend::new(tract));
    }
}

#[cfg(not(feature = "backend-tract"))]
fn register_tract(_registry: &mut BackendRegistry, _settings: &DetectorSettings) {}

/// Resolve the configured backend and start the pipeline.
pub fn start_pipeline<S: OverlaySurface>(
    cfg: &OverlayConfig,
    surface: S,
) -> Result<(PipelineController, RenderContext<S>), PipelineError> {
    let mut registry = default_registry(&cfg.detector);
    let backend = registry.take(&cfg.detector.backend)?;
    PipelineController::start(backend, cfg.pipeline_config()?, surface, cfg.viewport)
}
