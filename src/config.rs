use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::NeuralSettings;
use crate::engine::{ContrastParams, EngineSettings, MotionParams};
use crate::ingest::SourceConfig;
use crate::segment::SegmentorSettings;
use crate::track::TrackerSettings;
use crate::vision::HUE_MAX;

const DEFAULT_SOURCE_ID: &str = "stub://moving-square";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_EVENT_CAPACITY: usize = 2;
const DEFAULT_BLUR_RADIUS: u32 = 3;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct TrackcamConfigFile {
    source: Option<SourceConfigFile>,
    events: Option<EventsConfigFile>,
    motion: Option<MotionConfigFile>,
    contrast: Option<ContrastConfigFile>,
    tracker: Option<TrackerConfigFile>,
    neural: Option<NeuralConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    id: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct EventsConfigFile {
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    history: Option<u32>,
    var_threshold: Option<f32>,
    detect_shadows: Option<bool>,
    blur_radius: Option<u32>,
    h_min: Option<u8>,
    h_max: Option<u8>,
    s_min: Option<u8>,
    s_max: Option<u8>,
    v_min: Option<u8>,
    v_max: Option<u8>,
    min_size: Option<u32>,
    max_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ContrastConfigFile {
    brightness_min: Option<u8>,
    brightness_max: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    search_margin: Option<f32>,
    max_match_error: Option<f32>,
    learning_rate: Option<f32>,
    max_template_side: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct NeuralConfigFile {
    model_path: Option<PathBuf>,
    classes_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TrackcamConfig {
    pub source: SourceConfig,
    /// Per-subscriber event queue bound.
    pub event_capacity: usize,
    pub motion: MotionParams,
    pub segmentor: SegmentorSettings,
    pub blur_radius: u32,
    pub contrast: ContrastParams,
    pub tracker: TrackerSettings,
    pub neural: NeuralConfig,
}

#[derive(Debug, Clone)]
pub struct NeuralConfig {
    /// Supplied to the engine at startup when both paths are set.
    pub model_path: Option<PathBuf>,
    pub classes_path: Option<PathBuf>,
    pub settings: NeuralSettings,
    pub font_path: Option<PathBuf>,
}

impl Default for TrackcamConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig {
                id: DEFAULT_SOURCE_ID.to_string(),
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                target_fps: DEFAULT_TARGET_FPS,
            },
            event_capacity: DEFAULT_EVENT_CAPACITY,
            motion: MotionParams::default(),
            segmentor: SegmentorSettings::default(),
            blur_radius: DEFAULT_BLUR_RADIUS,
            contrast: ContrastParams::default(),
            tracker: TrackerSettings::default(),
            neural: NeuralConfig {
                model_path: None,
                classes_path: None,
                settings: NeuralSettings::default(),
                font_path: None,
            },
        }
    }
}

impl TrackcamConfig {
    /// Load `TRACKCAM_CONFIG` (if set), apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRACKCAM_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with the file path given explicitly.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: TrackcamConfigFile =
            toml::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrackcamConfigFile) -> Self {
        let mut cfg = Self::default();

        let source = file.source.unwrap_or_default();
        if let Some(id) = source.id {
            cfg.source.id = id;
        }
        cfg.source.width = source.width.unwrap_or(cfg.source.width);
        cfg.source.height = source.height.unwrap_or(cfg.source.height);
        cfg.source.target_fps = source.target_fps.unwrap_or(cfg.source.target_fps);

        if let Some(capacity) = file.events.and_then(|events| events.capacity) {
            cfg.event_capacity = capacity;
        }

        let motion = file.motion.unwrap_or_default();
        cfg.segmentor.history = motion.history.unwrap_or(cfg.segmentor.history);
        cfg.segmentor.var_threshold = motion.var_threshold.unwrap_or(cfg.segmentor.var_threshold);
        cfg.segmentor.detect_shadows = motion
            .detect_shadows
            .unwrap_or(cfg.segmentor.detect_shadows);
        cfg.blur_radius = motion.blur_radius.unwrap_or(cfg.blur_radius);
        let params = &mut cfg.motion;
        params.h_min = motion.h_min.unwrap_or(params.h_min);
        params.h_max = motion.h_max.unwrap_or(params.h_max);
        params.s_min = motion.s_min.unwrap_or(params.s_min);
        params.s_max = motion.s_max.unwrap_or(params.s_max);
        params.v_min = motion.v_min.unwrap_or(params.v_min);
        params.v_max = motion.v_max.unwrap_or(params.v_max);
        params.min_size = motion.min_size.unwrap_or(params.min_size);
        params.max_size = motion.max_size.unwrap_or(params.max_size);

        let contrast = file.contrast.unwrap_or_default();
        cfg.contrast.brightness_min = contrast
            .brightness_min
            .unwrap_or(cfg.contrast.brightness_min);
        cfg.contrast.brightness_max = contrast
            .brightness_max
            .unwrap_or(cfg.contrast.brightness_max);

        let tracker = file.tracker.unwrap_or_default();
        cfg.tracker.search_margin = tracker.search_margin.unwrap_or(cfg.tracker.search_margin);
        cfg.tracker.max_match_error = tracker
            .max_match_error
            .unwrap_or(cfg.tracker.max_match_error);
        cfg.tracker.learning_rate = tracker.learning_rate.unwrap_or(cfg.tracker.learning_rate);
        cfg.tracker.max_template_side = tracker
            .max_template_side
            .unwrap_or(cfg.tracker.max_template_side);

        let neural = file.neural.unwrap_or_default();
        let settings = &mut cfg.neural.settings;
        settings.input_size = neural.input_size.unwrap_or(settings.input_size);
        settings.confidence_threshold = neural
            .confidence_threshold
            .unwrap_or(settings.confidence_threshold);
        settings.iou_threshold = neural.iou_threshold.unwrap_or(settings.iou_threshold);
        settings.max_detections = neural.max_detections.unwrap_or(settings.max_detections);
        cfg.neural.model_path = neural.model_path;
        cfg.neural.classes_path = neural.classes_path;
        cfg.neural.font_path = neural.font_path;

        cfg
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(id) = std::env::var("TRACKCAM_SOURCE") {
            if !id.trim().is_empty() {
                self.source.id = id;
            }
        }
        if let Ok(fps) = std::env::var("TRACKCAM_TARGET_FPS") {
            if !fps.trim().is_empty() {
                self.source.target_fps = fps
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("TRACKCAM_TARGET_FPS must be a non-negative integer"))?;
            }
        }
        if let Ok(capacity) = std::env::var("TRACKCAM_EVENT_CAPACITY") {
            if !capacity.trim().is_empty() {
                self.event_capacity = capacity
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("TRACKCAM_EVENT_CAPACITY must be a positive integer"))?;
            }
        }
        if let Ok(path) = std::env::var("TRACKCAM_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.neural.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("TRACKCAM_CLASSES_PATH") {
            if !path.trim().is_empty() {
                self.neural.classes_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.id.trim().is_empty() {
            return Err(anyhow!("source id must not be empty"));
        }
        if self.event_capacity == 0 {
            return Err(anyhow!("event capacity must be at least 1"));
        }
        if self.segmentor.history == 0 {
            return Err(anyhow!("motion history must be at least 1"));
        }
        if self.segmentor.var_threshold.is_nan() || self.segmentor.var_threshold <= 0.0 {
            return Err(anyhow!("motion var_threshold must be positive"));
        }

        let m = &self.motion;
        if m.h_max > HUE_MAX || m.h_min > m.h_max || m.s_min > m.s_max || m.v_min > m.v_max {
            return Err(anyhow!(
                "motion HSV bounds must satisfy min <= max (hue <= {})",
                HUE_MAX
            ));
        }
        if m.min_size > m.max_size {
            return Err(anyhow!("motion min_size must not exceed max_size"));
        }
        if self.contrast.brightness_min > self.contrast.brightness_max {
            return Err(anyhow!("brightness_min must not exceed brightness_max"));
        }

        for (name, value) in [
            ("tracker.search_margin", self.tracker.search_margin),
            ("tracker.max_match_error", self.tracker.max_match_error),
            ("tracker.learning_rate", self.tracker.learning_rate),
            ("neural.confidence_threshold", self.neural.settings.confidence_threshold),
            ("neural.iou_threshold", self.neural.settings.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.tracker.max_template_side == 0 {
            return Err(anyhow!("tracker.max_template_side must be at least 1"));
        }
        if self.neural.settings.input_size < 32 || self.neural.settings.input_size % 32 != 0 {
            return Err(anyhow!("neural.input_size must be a positive multiple of 32"));
        }
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            motion: self.motion,
            contrast: self.contrast,
            segmentor: self.segmentor,
            blur_radius: self.blur_radius,
            neural: self.neural.settings,
        }
    }
}

fn read_config_file(path: &Path) -> Result<TrackcamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
