use std::io::Write;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use detection_overlay::config::OverlayConfig;
use detection_overlay::ConfigError;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "OVERLAY_CONFIG",
        "OVERLAY_MIN_CONFIDENCE",
        "OVERLAY_LABELS",
        "OVERLAY_BACKEND",
        "OVERLAY_MODEL_PATH",
        "OVERLAY_LABELS_PATH",
        "OVERLAY_SOURCE_URL",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = OverlayConfig::load().expect("load defaults");
    assert_eq!(cfg.min_confidence, 0.5);
    assert!(cfg.labels.is_empty());
    assert_eq!(cfg.detector.backend, "stub");
    assert_eq!(cfg.source.url, "stub://camera");
    assert_eq!(cfg.source.target_fps, 30);
    assert_eq!((cfg.source.width, cfg.source.height), (640, 480));
    assert_eq!((cfg.viewport.width(), cfg.viewport.height()), (390.0, 844.0));
    assert_eq!(cfg.style.border_width, 3.0);
    assert_eq!(cfg.style.label_width, 200.0);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "min_confidence": 0.6,
        "labels": ["person", "dog"],
        "source": {
            "url": "stub://porch",
            "target_fps": 12,
            "width": 800,
            "height": 600
        },
        "viewport": { "width": 1170, "height": 2532 },
        "label": { "offset": 4 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("OVERLAY_CONFIG", file.path());
    std::env::set_var("OVERLAY_MIN_CONFIDENCE", "0.75");
    std::env::set_var("OVERLAY_LABELS", "cat, ,bird");

    let cfg = OverlayConfig::load().expect("load config");
    assert_eq!(cfg.min_confidence, 0.75);
    assert_eq!(cfg.labels, vec!["cat", "bird"]);
    assert_eq!(cfg.source.url, "stub://porch");
    assert_eq!(cfg.source.target_fps, 12);
    assert_eq!((cfg.source.width, cfg.source.height), (800, 600));
    assert_eq!(cfg.viewport.height(), 2532.0);
    assert_eq!(cfg.style.label_offset, 4.0);
    assert_eq!(cfg.style.label_height, 18.0);

    let filter = cfg.result_filter().expect("filter");
    assert_eq!(filter.min_confidence(), 0.75);

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
min_confidence = 0.4

[detector]
backend = "tract"
model_path = "/models/yolov8s.onnx"

[viewport]
width = 320.0
height = 240.0
"#;
    file.write_all(toml.as_bytes()).expect("write config");
    std::env::set_var("OVERLAY_CONFIG", file.path());

    let cfg = OverlayConfig::load().expect("load toml config");
    assert_eq!(cfg.min_confidence, 0.4);
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/yolov8s.onnx"))
    );
    assert_eq!(cfg.viewport.width(), 320.0);

    clear_env();
}

#[test]
fn rejects_out_of_range_confidence() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "min_confidence": 1.5 }"#)
        .expect("write config");
    std::env::set_var("OVERLAY_CONFIG", file.path());

    let err = OverlayConfig::load().expect_err("confidence above 1 rejected");
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::ConfidenceOutOfRange(1.5))
    );

    clear_env();
}

#[test]
fn rejects_unknown_fields_and_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "threshold": 0.5 }"#).expect("write config");
    std::env::set_var("OVERLAY_CONFIG", file.path());
    assert!(OverlayConfig::load().is_err());

    clear_env();
    std::env::set_var("OVERLAY_MIN_CONFIDENCE", "high");
    assert!(OverlayConfig::load().is_err());

    clear_env();
    std::env::set_var("OVERLAY_BACKEND", "tract");
    let err = OverlayConfig::load().expect_err("tract without model path");
    assert!(err.to_string().contains("model_path"));

    clear_env();
}
