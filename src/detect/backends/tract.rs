#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{ClassLabel, Observation, RecognizedObject};
use crate::error::DetectorError;
use crate::frame::{Frame, RGB_CHANNELS};
use crate::geometry::NormalizedRect;

const BACKEND_NAME: &str = "tract";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_SCORE_FLOOR: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const MAX_CANDIDATES: usize = 300;
const LABELS_PER_OBJECT: usize = 3;

type Plan = TypedRunnableModel<TypedModel>;

/// Settings for a YOLOv8-style ONNX detector.
#[derive(Clone, Debug)]
pub struct TractConfig {
    pub model_path: PathBuf,
    /// One class name per line, in model output order.
    pub labels_path: Option<PathBuf>,
    /// Square model input edge in pixels.
    pub input_size: u32,
    /// Candidates below this score never leave the backend.
    pub score_floor: f32,
    pub iou_threshold: f32,
}

impl TractConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            labels_path: None,
            input_size: DEFAULT_INPUT_SIZE,
            score_floor: DEFAULT_SCORE_FLOOR,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

/// Tract-based backend for ONNX object detection.
///
/// The model is resolved in `warm_up`, once, before the pipeline starts.
/// Output layout is `[1, 4 + classes, anchors]` with boxes as centre/size in
/// model input pixels, top-left origin.
pub struct TractBackend {
    config: TractConfig,
    model: Option<Plan>,
    labels: Vec<String>,
}

struct Candidate {
    bounds: NormalizedRect,
    class: usize,
    score: f32,
    ranked: Vec<(usize, f32)>,
}

impl TractBackend {
    pub fn new(config: TractConfig) -> Self {
        Self {
            config,
            model: None,
            labels: Vec::new(),
        }
    }

    fn load_model(path: &Path, size: u32) -> TractResult<Plan> {
        tract_onnx::onnx()
            .model_for_path(path)?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, size as usize, size as usize),
                ),
            )?
            .into_optimized()?
            .into_runnable()
    }

    fn load_labels(path: &Path) -> Result<Vec<String>, DetectorError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DetectorError::load(
                BACKEND_NAME,
                format!("failed to read labels {}: {}", path.display(), e),
            )
        })?;
        Ok(raw
            .lines()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty())
            .map(|line| line.to_string())
            .collect())
    }

    /// Nearest-neighbour resize into an NCHW tensor scaled to `[0, 1]`.
    fn build_input(&self, frame: &Frame) -> Result<Tensor, DetectorError> {
        let size = self.config.input_size as usize;
        let (fw, fh) = (frame.width as usize, frame.height as usize);
        if fw == 0 || fh == 0 {
            return Err(DetectorError::inference("empty frame"));
        }
        let pixels = frame.pixels();
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            let sx = x * fw / size;
            let sy = y * fh / size;
            pixels[(sy * fw + sx) * RGB_CHANNELS + c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Candidate>, DetectorError> {
        let output = outputs
            .first()
            .ok_or_else(|| DetectorError::inference("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| DetectorError::inference(format!("output tensor was not f32: {}", e)))?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(DetectorError::inference(format!(
                "unexpected output shape {:?}",
                shape
            )));
        }
        let view = view
            .into_dimensionality::<tract_ndarray::Ix3>()
            .map_err(|e| DetectorError::inference(e.to_string()))?;
        let (rows, anchors) = (shape[1], shape[2]);
        let size = self.config.input_size as f32;

        let mut candidates = Vec::new();
        for a in 0..anchors {
            let mut scores: Vec<(usize, f32)> =
                (4..rows).map(|r| (r - 4, view[[0, r, a]])).collect();
            scores.sort_unstable_by(|l, r| r.1.total_cmp(&l.1));
            let (class, score) = scores[0];
            if !score.is_finite() || score < self.config.score_floor {
                continue;
            }

            let (cx, cy, w, h) = (
                view[[0, 0, a]],
                view[[0, 1, a]],
                view[[0, 2, a]],
                view[[0, 3, a]],
            );
            if w <= 0.0 || h <= 0.0 {
                continue;
            }
            let Some(bounds) = NormalizedRect::from_top_left(
                ((cx - w / 2.0) / size).clamp(0.0, 1.0),
                ((cy - h / 2.0) / size).clamp(0.0, 1.0),
                ((cx + w / 2.0) / size).clamp(0.0, 1.0),
                ((cy + h / 2.0) / size).clamp(0.0, 1.0),
            ) else {
                continue;
            };

            scores.truncate(LABELS_PER_OBJECT);
            candidates.push(Candidate {
                bounds,
                class,
                score: score.min(1.0),
                ranked: scores,
            });
        }
        Ok(candidates)
    }

    fn label_for(&self, class: usize) -> String {
        self.labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class))
    }
}

/// Greedy class-aware non-maximum suppression, highest score first.
fn suppress(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_unstable_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(MAX_CANDIDATES);
    let mut kept: Vec<Candidate> = Vec::new();
    'outer: for candidate in candidates {
        for k in &kept {
            if k.class == candidate.class && k.bounds.iou(&candidate.bounds) >= iou_threshold {
                continue 'outer;
            }
        }
        kept.push(candidate);
    }
    kept
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn warm_up(&mut self) -> Result<(), DetectorError> {
        let path = self.config.model_path.clone();
        if !path.is_file() {
            return Err(DetectorError::load(
                BACKEND_NAME,
                format!("model asset {} not found", path.display()),
            ));
        }
        let model = Self::load_model(&path, self.config.input_size).map_err(|e| {
            DetectorError::load(
                BACKEND_NAME,
                format!("failed to load ONNX model from {}: {}", path.display(), e),
            )
        })?;
        if let Some(labels_path) = self.config.labels_path.clone() {
            self.labels = Self::load_labels(&labels_path)?;
        }
        log::info!(
            "tract model {} ready ({} labels, input {}px)",
            path.display(),
            self.labels.len(),
            self.config.input_size
        );
        self.model = Some(model);
        Ok(())
    }

    fn observe(&mut self, frame: &Frame) -> Result<Vec<Observation>, DetectorError> {
        let input = self.build_input(frame)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| DetectorError::inference("model not loaded"))?;
        let outputs = model
            .run(tvec!(input.into()))
            .map_err(|e| DetectorError::inference(format!("ONNX inference failed: {}", e)))?;
        let candidates = suppress(self.decode(outputs)?, self.config.iou_threshold);

        Ok(candidates
            .into_iter()
            .map(|c| {
                Observation::RecognizedObject(RecognizedObject {
                    bounds: c.bounds,
                    confidence: c.score,
                    labels: c
                        .ranked
                        .iter()
                        .map(|(class, score)| ClassLabel::new(self.label_for(*class), *score))
                        .collect(),
                })
            })
            .collect())
    }
}
