use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Observation, RawDetection, RecognizedObject};
use crate::error::DetectorError;
use crate::frame::Frame;

/// Loaded detector, ready to run on the inference worker.
///
/// Construction goes through [`Detector::load`], so a `Detector` value always
/// wraps a backend whose model assets resolved.
pub struct Detector {
    backend: Box<dyn DetectorBackend>,
}

impl Detector {
    /// Warm up the backend. A failure here is fatal for the pipeline.
    pub fn load(mut backend: Box<dyn DetectorBackend>) -> Result<Self, DetectorError> {
        let name = backend.name();
        backend.warm_up().map_err(|err| match err {
            DetectorError::LoadFailure { .. } => err,
            DetectorError::InferenceFailure(reason) => DetectorError::load(name, reason),
        })?;
        log::info!("detector backend '{}' loaded", name);
        Ok(Self { backend })
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run inference and keep only recognized objects.
    ///
    /// Every error from here on is per-frame, whatever the backend reports.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
        let observations = self.backend.observe(frame).map_err(|err| match err {
            DetectorError::LoadFailure { reason, .. } => DetectorError::InferenceFailure(reason),
            other => other,
        })?;
        extract_recognized(observations)
    }
}

/// Narrow tagged observations to recognized objects, validating each one.
pub fn extract_recognized(
    observations: Vec<Observation>,
) -> Result<Vec<RawDetection>, DetectorError> {
    let mut detections = Vec::with_capacity(observations.len());
    for observation in observations {
        let Observation::RecognizedObject(object) = observation else {
            continue;
        };
        detections.push(into_raw_detection(object)?);
    }
    Ok(detections)
}

fn into_raw_detection(object: RecognizedObject) -> Result<RawDetection, DetectorError> {
    if !object.confidence.is_finite() || !(0.0..=1.0).contains(&object.confidence) {
        return Err(DetectorError::inference(format!(
            "observation confidence {} outside [0, 1]",
            object.confidence
        )));
    }
    let label = object
        .labels
        .into_iter()
        .next()
        .ok_or_else(|| DetectorError::inference("recognized object carried no labels"))?;
    Ok(RawDetection {
        label: label.identifier,
        confidence: object.confidence,
        bounds: object.bounds.clamped(),
    })
}
