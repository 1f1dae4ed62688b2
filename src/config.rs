use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::filter::{validate_min_confidence, ResultFilter, DEFAULT_MIN_CONFIDENCE};
use crate::geometry::ViewportGeometry;
use crate::overlay::OverlayStyle;
use crate::pipeline::PipelineConfig;

const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 30;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_VIEWPORT_WIDTH: f32 = 390.0;
const DEFAULT_VIEWPORT_HEIGHT: f32 = 844.0;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OverlayConfigFile {
    min_confidence: Option<f32>,
    labels: Option<Vec<String>>,
    detector: Option<DetectorConfigFile>,
    source: Option<SourceConfigFile>,
    viewport: Option<ViewportConfigFile>,
    label: Option<LabelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ViewportConfigFile {
    width: Option<f32>,
    height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LabelConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    offset: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub min_confidence: f32,
    /// Label allowlist. Empty accepts every label.
    pub labels: Vec<String>,
    pub detector: DetectorSettings,
    pub source: SourceSettings,
    pub viewport: ViewportGeometry,
    pub style: OverlayStyle,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl OverlayConfig {
    /// File named by `OVERLAY_CONFIG` (if any), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("OVERLAY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: OverlayConfigFile) -> Result<Self> {
        let detector = file.detector.unwrap_or_default();
        let source = file.source.unwrap_or_default();
        let viewport = file.viewport.unwrap_or_default();
        let label = file.label.unwrap_or_default();
        let style_defaults = OverlayStyle::default();

        Ok(Self {
            min_confidence: file.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
            labels: file.labels.unwrap_or_default(),
            detector: DetectorSettings {
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model_path: detector.model_path,
                labels_path: detector.labels_path,
            },
            source: SourceSettings {
                url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
                width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
                height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
            },
            viewport: ViewportGeometry::new(
                viewport.width.unwrap_or(DEFAULT_VIEWPORT_WIDTH),
                viewport.height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT),
            )?,
            style: OverlayStyle {
                label_width: label.width.unwrap_or(style_defaults.label_width),
                label_height: label.height.unwrap_or(style_defaults.label_height),
                label_offset: label.offset.unwrap_or(style_defaults.label_offset),
                ..style_defaults
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("OVERLAY_MIN_CONFIDENCE") {
            self.min_confidence = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("OVERLAY_MIN_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Ok(labels) = std::env::var("OVERLAY_LABELS") {
            self.labels = split_csv(&labels);
        }
        if let Ok(backend) = std::env::var("OVERLAY_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("OVERLAY_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("OVERLAY_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.detector.labels_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(url) = std::env::var("OVERLAY_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_min_confidence(self.min_confidence)?;
        if self.source.target_fps == 0 {
            return Err(ConfigError::Invalid(
                "source.target_fps must be >= 1".to_string(),
            ));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(ConfigError::Invalid(
                "source dimensions must be non-zero".to_string(),
            ));
        }
        if self.detector.backend != DEFAULT_BACKEND && self.detector.model_path.is_none() {
            return Err(ConfigError::Invalid(format!(
                "detector backend '{}' requires detector.model_path",
                self.detector.backend
            )));
        }
        Ok(())
    }

    /// Acceptance policy built from the threshold and label allowlist.
    pub fn result_filter(&self) -> Result<ResultFilter, ConfigError> {
        Ok(ResultFilter::new(self.min_confidence)?.with_labels(self.labels.clone()))
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        Ok(PipelineConfig {
            filter: self.result_filter()?,
            style: self.style,
        })
    }
}

fn read_config_file(path: &Path) -> Result<OverlayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
