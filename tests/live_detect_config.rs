use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use live_detect::config::LiveDetectConfig;
use live_detect::ingest::Facing;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LIVE_DETECT_CONFIG",
        "LIVE_DETECT_CAMERA",
        "LIVE_DETECT_BACKEND",
        "LIVE_DETECT_MODEL",
        "LIVE_DETECT_THRESHOLD",
        "LIVE_DETECT_CLASSES",
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
        "camera": {
            "device": "/dev/video2",
            "ideal_width": 1280,
            "ideal_height": 720,
            "ideal_fps": 30,
            "facing": "environment"
        },
        "detector": {
            "backend": "stub",
            "max_candidates": 10,
            "seed": 7
        },
        "filter": {
            "threshold": 0.6,
            "classes": ["person", "car"]
        },
        "render": {
            "line_width": 2
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_CAMERA", "stub://bench");
    std::env::set_var("LIVE_DETECT_THRESHOLD", "0.72");
    std::env::set_var("LIVE_DETECT_CLASSES", "dog, cat,");

    let cfg = LiveDetectConfig::load().expect("load config");

    assert_eq!(cfg.camera.device, "stub://bench");
    assert_eq!(cfg.camera.profile.ideal.width, 1280);
    assert_eq!(cfg.camera.profile.ideal.fps, 30);
    assert_eq!(cfg.camera.profile.min.width, 1280);
    assert_eq!(cfg.camera.profile.facing, Facing::Environment);
    assert_eq!(cfg.detector.backend.as_deref(), Some("stub"));
    assert_eq!(cfg.detector.max_candidates, 10);
    assert_eq!(cfg.detector.seed, 7);
    assert_eq!(cfg.filter.threshold, 0.7);
    assert_eq!(cfg.filter.classes, vec!["cat", "dog"]);
    assert_eq!(cfg.render.line_width, 2.0);

    clear_env();
}

#[test]
fn loads_toml_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[detector]
backend = "stub"
model_path = "/models/ssd.onnx"

[filter]
threshold = 0.3
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("LIVE_DETECT_CONFIG", file.path());

    let cfg = LiveDetectConfig::load().expect("load config");
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/ssd.onnx"))
    );
    assert_eq!(cfg.filter.threshold, 0.3);
    assert_eq!(cfg.camera.device, "stub://webcam");

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = LiveDetectConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.profile.ideal.width, 1920);
    assert_eq!(cfg.camera.profile.min.fps, 30);
    assert_eq!(cfg.detector.max_candidates, 20);
    assert_eq!(cfg.filter.threshold, 0.5);
    assert!(cfg.filter.classes.is_empty());
    assert_eq!(cfg.render.line_width, 3.0);
}

#[test]
fn rejects_invalid_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_THRESHOLD", "lots");
    assert!(LiveDetectConfig::load().is_err());

    std::env::set_var("LIVE_DETECT_THRESHOLD", "0.05");
    assert!(LiveDetectConfig::load().is_err());

    clear_env();
    std::env::set_var("LIVE_DETECT_CLASSES", "person,dragon");
    let err = LiveDetectConfig::load().unwrap_err();
    assert!(err.to_string().contains("dragon"));

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_CONFIG", "/nonexistent/live-detect.json");
    assert!(LiveDetectConfig::load().is_err());

    clear_env();
}
