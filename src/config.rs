use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::vocabulary;
use crate::filter::{ClassFilter, ConfidenceThreshold, FilterState, MAX_THRESHOLD, MIN_THRESHOLD};
use crate::ingest::{CaptureProfile, Facing, Resolution};

const DEFAULT_CAMERA: &str = "stub://webcam";
const DEFAULT_MAX_CANDIDATES: usize = 20;
const DEFAULT_INPUT_WIDTH: u32 = 300;
const DEFAULT_INPUT_HEIGHT: u32 = 300;
const DEFAULT_LINE_WIDTH: f32 = 3.0;
const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LiveDetectConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    filter: Option<FilterConfigFile>,
    render: Option<RenderConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    ideal_width: Option<u32>,
    ideal_height: Option<u32>,
    ideal_fps: Option<u32>,
    min_width: Option<u32>,
    min_height: Option<u32>,
    min_fps: Option<u32>,
    facing: Option<String>,
    aspect_ratio: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    max_candidates: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FilterConfigFile {
    threshold: Option<f32>,
    classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    font_path: Option<PathBuf>,
    line_width: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct LiveDetectConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub filter: FilterSettings,
    pub render: RenderSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub device: String,
    pub profile: CaptureProfile,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Registered backend name; `None` picks the registry default.
    pub backend: Option<String>,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub max_candidates: usize,
    /// Seed for the synthetic scene backend.
    pub seed: u64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: None,
            model_path: None,
            input_width: DEFAULT_INPUT_WIDTH,
            input_height: DEFAULT_INPUT_HEIGHT,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterSettings {
    /// Raw configured value; validated into a `ConfidenceThreshold`.
    pub threshold: f32,
    pub classes: Vec<String>,
}

impl FilterSettings {
    pub fn initial_state(&self) -> FilterState {
        FilterState {
            classes: ClassFilter::from_labels(self.classes.iter().cloned()),
            threshold: ConfidenceThreshold::new(self.threshold),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub font_path: Option<PathBuf>,
    pub line_width: f32,
}

impl LiveDetectConfig {
    /// Load from `LIVE_DETECT_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVE_DETECT_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LiveDetectConfigFile) -> Result<Self> {
        let defaults = CaptureProfile::default();
        let camera = file.camera.unwrap_or_default();
        let facing = match camera.facing.as_deref() {
            None => defaults.facing,
            Some(value) => parse_facing(value)?,
        };
        let camera = CameraSettings {
            device: camera.device.unwrap_or_else(|| DEFAULT_CAMERA.to_string()),
            profile: CaptureProfile {
                ideal: Resolution {
                    width: camera.ideal_width.unwrap_or(defaults.ideal.width),
                    height: camera.ideal_height.unwrap_or(defaults.ideal.height),
                    fps: camera.ideal_fps.unwrap_or(defaults.ideal.fps),
                },
                min: Resolution {
                    width: camera.min_width.unwrap_or(defaults.min.width),
                    height: camera.min_height.unwrap_or(defaults.min.height),
                    fps: camera.min_fps.unwrap_or(defaults.min.fps),
                },
                facing,
                ideal_aspect: camera.aspect_ratio.unwrap_or(defaults.ideal_aspect),
            },
        };

        let detector_defaults = DetectorSettings::default();
        let detector = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector.backend,
            model_path: detector.model_path,
            input_width: detector
                .input_width
                .unwrap_or(detector_defaults.input_width),
            input_height: detector
                .input_height
                .unwrap_or(detector_defaults.input_height),
            max_candidates: detector
                .max_candidates
                .unwrap_or(detector_defaults.max_candidates),
            seed: detector.seed.unwrap_or(detector_defaults.seed),
        };

        let filter = file.filter.unwrap_or_default();
        let filter = FilterSettings {
            threshold: filter
                .threshold
                .unwrap_or(ConfidenceThreshold::default().value()),
            classes: filter.classes.unwrap_or_default(),
        };

        let render = file.render.unwrap_or_default();
        let render = RenderSettings {
            font_path: render.font_path,
            line_width: render.line_width.unwrap_or(DEFAULT_LINE_WIDTH),
        };

        Ok(Self {
            camera,
            detector,
            filter,
            render,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(device) = std::env::var("LIVE_DETECT_CAMERA") {
            if !device.trim().is_empty() {
                self.camera.device = device;
            }
        }
        if let Ok(backend) = std::env::var("LIVE_DETECT_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = Some(backend);
            }
        }
        if let Ok(path) = std::env::var("LIVE_DETECT_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(threshold) = std::env::var("LIVE_DETECT_THRESHOLD") {
            self.filter.threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("LIVE_DETECT_THRESHOLD must be a number"))?;
        }
        if let Ok(classes) = std::env::var("LIVE_DETECT_CLASSES") {
            self.filter.classes = split_csv(&classes);
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        let profile = &self.camera.profile;
        for res in [profile.ideal, profile.min] {
            if res.width == 0 || res.height == 0 || res.fps == 0 {
                return Err(anyhow!("camera resolution and fps must be greater than zero"));
            }
        }
        if profile.min.width > profile.ideal.width
            || profile.min.height > profile.ideal.height
            || profile.min.fps > profile.ideal.fps
        {
            return Err(anyhow!("camera minimum profile exceeds the ideal profile"));
        }
        if !(profile.ideal_aspect.is_finite() && profile.ideal_aspect > 0.0) {
            return Err(anyhow!("camera aspect_ratio must be positive"));
        }

        if self.detector.max_candidates == 0 {
            return Err(anyhow!("detector.max_candidates must be at least 1"));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input size must be greater than zero"));
        }

        let threshold = self.filter.threshold;
        if !(MIN_THRESHOLD..=MAX_THRESHOLD).contains(&threshold) {
            return Err(anyhow!(
                "filter threshold {} outside [{}, {}]",
                threshold,
                MIN_THRESHOLD,
                MAX_THRESHOLD
            ));
        }
        self.filter.threshold = ConfidenceThreshold::new(threshold).value();

        for label in &mut self.filter.classes {
            *label = label.trim().to_lowercase();
            if !vocabulary::is_known(label) {
                return Err(anyhow!("unknown class label '{}'", label));
            }
        }
        self.filter.classes.sort();
        self.filter.classes.dedup();

        if !(self.render.line_width.is_finite() && self.render.line_width >= 1.0) {
            return Err(anyhow!("render.line_width must be at least 1"));
        }
        Ok(())
    }
}

fn parse_facing(value: &str) -> Result<Facing> {
    match value.trim().to_lowercase().as_str() {
        "user" | "front" => Ok(Facing::User),
        "environment" | "back" => Ok(Facing::Environment),
        other => Err(anyhow!("camera.facing must be 'user' or 'environment', got '{}'", other)),
    }
}

fn read_config_file(path: &Path) -> Result<LiveDetectConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
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
