//! Error taxonomy for the overlay pipeline.
//!
//! Only initialization and configuration errors ever reach the caller of
//! [`PipelineController::start`](crate::PipelineController::start). Per-frame
//! inference failures are absorbed inside the controller and logged.

use thiserror::Error;

/// Failures raised by a detector backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectorError {
    /// Model asset missing or corrupt. Fatal at startup.
    #[error("detector backend '{backend}' failed to load: {reason}")]
    LoadFailure { backend: String, reason: String },
    /// A single frame could not be processed. The frame is skipped.
    #[error("inference failed: {0}")]
    InferenceFailure(String),
}

impl DetectorError {
    pub fn load(backend: &str, reason: impl Into<String>) -> Self {
        Self::LoadFailure {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }

    pub fn inference(reason: impl Into<String>) -> Self {
        Self::InferenceFailure(reason.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LoadFailure { .. })
    }
}

/// Invalid configuration, rejected before the pipeline starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("min_confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f32),
    #[error("viewport dimensions must be finite and non-negative, got {width}x{height}")]
    InvalidViewport { width: f32, height: f32 },
    #[error("detector backend '{0}' not registered")]
    UnknownBackend(String),
    #[error("{0}")]
    Invalid(String),
}

/// Errors surfaced by the pipeline controller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline failed to start: {0}")]
    FatalInit(#[source] DetectorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to spawn inference worker: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("pipeline is stopped")]
    Stopped,
    #[error("inference worker panicked")]
    WorkerPanicked,
}
