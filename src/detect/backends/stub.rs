use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{ClassLabel, Observation, RecognizedObject};
use crate::error::DetectorError;
use crate::frame::{Frame, RGB_CHANNELS};
use crate::geometry::NormalizedRect;

const DEFAULT_LUMA_THRESHOLD: u8 = 200;
const DEFAULT_LABEL: &str = "object";

/// Stub backend for demos and tests.
///
/// Finds the bounding box of every pixel brighter than a luma threshold and
/// reports it as one recognized object. Confidence is the fraction of that
/// box which is actually lit, so a solid bright square scores 1.0. A
/// whole-frame saliency observation is always emitted alongside it.
///
/// Identical frames are not re-scanned: the last result is cached by frame
/// dimensions plus pixel digest.
#[derive(Clone, Copy, PartialEq, Eq)]
struct CacheKey {
    width: u32,
    height: u32,
    digest: [u8; 32],
}

pub struct StubBackend {
    luma_threshold: u8,
    label: String,
    last: Option<(CacheKey, Vec<Observation>)>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            luma_threshold: DEFAULT_LUMA_THRESHOLD,
            label: DEFAULT_LABEL.to_string(),
            last: None,
        }
    }

    pub fn with_threshold(mut self, luma_threshold: u8) -> Self {
        self.luma_threshold = luma_threshold;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn scan(&self, frame: &Frame) -> Result<Vec<Observation>, DetectorError> {
        let (width, height) = (frame.width as usize, frame.height as usize);
        if width == 0 || height == 0 {
            return Err(DetectorError::inference("empty frame"));
        }

        let mut lit = 0usize;
        let mut luma_sum = 0u64;
        let mut min = (usize::MAX, usize::MAX);
        let mut max = (0usize, 0usize);

        for (i, px) in frame.pixels().chunks_exact(RGB_CHANNELS).enumerate() {
            let luma = luma(px[0], px[1], px[2]);
            luma_sum += luma as u64;
            if luma < self.luma_threshold {
                continue;
            }
            let (x, y) = (i % width, i / width);
            lit += 1;
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }

        let mut observations = vec![Observation::Saliency {
            bounds: NormalizedRect::new(0.0, 0.0, 1.0, 1.0)
                .ok_or_else(|| DetectorError::inference("unit rect"))?,
            confidence: luma_sum as f32 / (255.0 * (width * height) as f32),
        }];

        if lit == 0 {
            return Ok(observations);
        }

        let box_w = max.0 - min.0 + 1;
        let box_h = max.1 - min.1 + 1;
        let confidence = lit as f32 / (box_w * box_h) as f32;
        let bounds = NormalizedRect::from_top_left(
            min.0 as f32 / width as f32,
            min.1 as f32 / height as f32,
            (max.0 + 1) as f32 / width as f32,
            (max.1 + 1) as f32 / height as f32,
        )
        .ok_or_else(|| DetectorError::inference("degenerate lit region"))?;

        observations.push(Observation::RecognizedObject(RecognizedObject {
            bounds,
            confidence,
            labels: vec![ClassLabel::new(self.label.clone(), confidence)],
        }));
        Ok(observations)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn observe(&mut self, frame: &Frame) -> Result<Vec<Observation>, DetectorError> {
        let key = CacheKey {
            width: frame.width,
            height: frame.height,
            digest: Sha256::digest(frame.pixels()).into(),
        };
        if let Some((prev, observations)) = &self.last {
            if *prev == key {
                return Ok(observations.clone());
            }
        }

        let observations = self.scan(frame)?;
        self.last = Some((key, observations.clone()));
        Ok(observations)
    }
}

/// Integer BT.601 luma.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}
