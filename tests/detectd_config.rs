use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use frame_detect::config::DetectorConfig;
use frame_detect::{DuplicateIdPolicy, UnknownClassPolicy};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DETECT_CONFIG",
        "DETECT_SOURCE_URL",
        "DETECT_MODEL_PATH",
        "DETECT_LABELS_PATH",
        "DETECT_SCORE_THRESHOLD",
        "DETECT_INPUT_SIZE",
        "DETECT_MAX_CYCLES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "model": { "path": "models/ssd_mobilenet.onnx", "input_size": 300 },
        "labels": { "path": "labels/coco.pbtxt", "duplicate_ids": "replace" },
        "preprocess": { "mean": 127.5, "scale": 2.0 },
        "decode": { "score_threshold": 0.5, "unknown_class": "strict" },
        "source": { "url": "/dev/video0", "target_fps": 15, "width": 800, "height": 600 },
        "display": { "width": 1920, "height": 1080 },
        "run": { "max_cycles": 25 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("DETECT_CONFIG", file.path());
    std::env::set_var("DETECT_SOURCE_URL", "stub://bench");
    std::env::set_var("DETECT_SCORE_THRESHOLD", "0.65");

    let cfg = DetectorConfig::load().expect("load config");

    assert_eq!(cfg.model_path, "models/ssd_mobilenet.onnx");
    assert_eq!(cfg.input_size, 300);
    assert_eq!(cfg.labels_path, PathBuf::from("labels/coco.pbtxt"));
    assert_eq!(cfg.duplicate_ids, DuplicateIdPolicy::Replace);
    assert_eq!(cfg.mean, 127.5);
    assert_eq!(cfg.scale, 2.0);
    assert_eq!(cfg.score_threshold, 0.65);
    assert_eq!(cfg.unknown_class, UnknownClassPolicy::Strict);
    assert_eq!(cfg.source.url, "stub://bench");
    assert_eq!(cfg.source.target_fps, 15);
    assert_eq!(cfg.source.width, 800);
    assert_eq!(cfg.source.height, 600);
    assert_eq!(cfg.viewport.width, 1920);
    assert_eq!(cfg.viewport.height, 1080);
    assert_eq!(cfg.max_cycles, Some(25));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[model]
path = "stub://model"
input_size = 160

[decode]
score_threshold = 0.4
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = DetectorConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.input_size, 160);
    assert_eq!(cfg.score_threshold, 0.4);
    assert_eq!(cfg.source.url, "stub://camera");

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DETECT_INPUT_SIZE", "320");
    std::env::set_var("DETECT_MAX_CYCLES", "3");

    let cfg = DetectorConfig::load().expect("load config");
    assert_eq!(cfg.input_size, 320);
    assert_eq!(cfg.max_cycles, Some(3));
    assert_eq!(cfg.score_threshold, 0.3);
    assert_eq!(cfg.model_path, "stub://model");

    clear_env();
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DETECT_SCORE_THRESHOLD", "high");
    assert!(DetectorConfig::load().is_err());
    clear_env();

    std::env::set_var("DETECT_SCORE_THRESHOLD", "1.2");
    assert!(DetectorConfig::load().is_err());
    clear_env();

    std::env::set_var("DETECT_INPUT_SIZE", "0");
    assert!(DetectorConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_malformed_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    assert!(DetectorConfig::load_from(Some(file.path())).is_err());
    let missing = std::path::Path::new("/nonexistent/detect.json");
    assert!(DetectorConfig::load_from(Some(missing)).is_err());

    clear_env();
}
