//! Acceptance policy applied to raw detector output.

use std::collections::HashSet;
use std::ops::Deref;

use crate::detect::RawDetection;
use crate::error::ConfigError;

/// Threshold used when configuration does not override it.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// A `RawDetection` that passed the acceptance policy.
///
/// Only this module can construct one, so anything holding an
/// `AcceptedDetection` knows it cleared the threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptedDetection(RawDetection);

impl AcceptedDetection {
    pub fn into_inner(self) -> RawDetection {
        self.0
    }
}

impl Deref for AcceptedDetection {
    type Target = RawDetection;

    fn deref(&self) -> &RawDetection {
        &self.0
    }
}

/// Stable confidence filter: keeps detections with `confidence > min_confidence`.
pub fn filter(detections: Vec<RawDetection>, min_confidence: f32) -> Vec<AcceptedDetection> {
    detections
        .into_iter()
        .filter(|d| d.confidence > min_confidence)
        .map(AcceptedDetection)
        .collect()
}

/// Configured acceptance policy: confidence threshold plus optional label allowlist.
#[derive(Clone, Debug)]
pub struct ResultFilter {
    min_confidence: f32,
    labels: Option<HashSet<String>>,
}

impl ResultFilter {
    pub fn new(min_confidence: f32) -> Result<Self, ConfigError> {
        validate_min_confidence(min_confidence)?;
        Ok(Self {
            min_confidence,
            labels: None,
        })
    }

    /// Restrict accepted detections to these labels. An empty list accepts all.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: HashSet<String> = labels.into_iter().map(Into::into).collect();
        self.labels = if labels.is_empty() {
            None
        } else {
            Some(labels)
        };
        self
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn apply(&self, detections: Vec<RawDetection>) -> Vec<AcceptedDetection> {
        let accepted = filter(detections, self.min_confidence);
        match &self.labels {
            None => accepted,
            Some(labels) => accepted
                .into_iter()
                .filter(|d| labels.contains(&d.label))
                .collect(),
        }
    }
}

impl Default for ResultFilter {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            labels: None,
        }
    }
}

pub fn validate_min_confidence(value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ConfidenceOutOfRange(value));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::NormalizedRect;

    fn detection(label: &str, confidence: f32) -> RawDetection {
        RawDetection::new(
            label,
            confidence,
            NormalizedRect::new(0.1, 0.1, 0.3, 0.4).unwrap(),
        )
    }

    #[test]
    fn threshold_is_strict() {
        let accepted = filter(
            vec![
                detection("below", 0.49),
                detection("equal", 0.5),
                detection("above", 0.51),
            ],
            0.5,
        );
        let labels: Vec<&str> = accepted.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["above"]);
    }

    #[test]
    fn preserves_input_order() {
        let accepted = filter(
            vec![
                detection("c", 0.9),
                detection("a", 0.2),
                detection("b", 0.7),
                detection("d", 0.6),
            ],
            0.5,
        );
        let labels: Vec<&str> = accepted.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["c", "b", "d"]);
    }

    #[test]
    fn every_confidence_step_respects_threshold() {
        for step in 0..=100 {
            let c = step as f32 / 100.0;
            let kept = !filter(vec![detection("x", c)], 0.5).is_empty();
            assert_eq!(kept, c > 0.5, "confidence {}", c);
        }
    }

    #[test]
    fn low_confidence_detection_is_dropped() {
        let policy = ResultFilter::default();
        assert!(policy.apply(vec![detection("cat", 0.4)]).is_empty());
        assert_eq!(policy.apply(vec![detection("cat", 0.9)]).len(), 1);
    }

    #[test]
    fn label_allowlist_narrows_accepted_set() {
        let policy = ResultFilter::new(0.3).unwrap().with_labels(["person", "dog"]);
        let accepted = policy.apply(vec![
            detection("person", 0.8),
            detection("chair", 0.8),
            detection("dog", 0.4),
        ]);
        let labels: Vec<&str> = accepted.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "dog"]);
    }

    #[test]
    fn empty_allowlist_accepts_everything() {
        let policy = ResultFilter::new(0.0)
            .unwrap()
            .with_labels(Vec::<String>::new());
        assert_eq!(policy.apply(vec![detection("chair", 0.1)]).len(), 1);
    }

    #[test]
    fn rejects_threshold_outside_unit_interval() {
        assert_eq!(
            ResultFilter::new(1.5).unwrap_err(),
            ConfigError::ConfidenceOutOfRange(1.5)
        );
        assert!(ResultFilter::new(-0.1).is_err());
        assert!(ResultFilter::new(f32::NAN).is_err());
        assert!(ResultFilter::new(0.0).is_ok());
        assert!(ResultFilter::new(1.0).is_ok());
    }
}
