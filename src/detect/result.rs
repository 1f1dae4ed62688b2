use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedRect;

/// One candidate class for a recognized object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassLabel {
    pub identifier: String,
    pub confidence: f32,
}

impl ClassLabel {
    pub fn new(identifier: impl Into<String>, confidence: f32) -> Self {
        Self {
            identifier: identifier.into(),
            confidence,
        }
    }
}

/// A region the backend classified as a known object.
#[derive(Clone, Debug, PartialEq)]
pub struct RecognizedObject {
    /// Normalized, bottom-left origin.
    pub bounds: NormalizedRect,
    /// Overall confidence of the observation.
    pub confidence: f32,
    /// Candidate labels, best first.
    pub labels: Vec<ClassLabel>,
}

/// Everything a backend may report for a frame.
///
/// Only `RecognizedObject` enters the overlay pipeline.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq)]
pub enum Observation {
    RecognizedObject(RecognizedObject),
    /// Attention region without a class.
    Saliency {
        bounds: NormalizedRect,
        confidence: f32,
    },
    /// Whole-frame classification without a region.
    Classification(ClassLabel),
}

/// One detector output unit after observation kinds have been narrowed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    /// Normalized, bottom-left origin.
    pub bounds: NormalizedRect,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, confidence: f32, bounds: NormalizedRect) -> Self {
        Self {
            label: label.into(),
            confidence,
            bounds,
        }
    }
}
