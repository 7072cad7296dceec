use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::catalog::DuplicateIdPolicy;
use crate::detect::{UnknownClassPolicy, Viewport, DEFAULT_SCORE_THRESHOLD};
use crate::frame::DEFAULT_INPUT_SIZE;
use crate::ingest::SourceConfig;

const DEFAULT_MODEL_PATH: &str = "stub://model";
const DEFAULT_LABELS_PATH: &str = "labels.pbtxt";
const DEFAULT_DISPLAY_WIDTH: u32 = 1280;
const DEFAULT_DISPLAY_HEIGHT: u32 = 720;

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model: Option<ModelConfigFile>,
    labels: Option<LabelsConfigFile>,
    preprocess: Option<PreprocessConfigFile>,
    decode: Option<DecodeConfigFile>,
    source: Option<SourceConfigFile>,
    display: Option<DisplayConfigFile>,
    run: Option<RunConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<String>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct LabelsConfigFile {
    path: Option<PathBuf>,
    duplicate_ids: Option<DuplicateIdPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct PreprocessConfigFile {
    mean: Option<f32>,
    scale: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DecodeConfigFile {
    score_threshold: Option<f32>,
    unknown_class: Option<UnknownClassPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RunConfigFile {
    max_cycles: Option<u64>,
}

/// Fully resolved detector settings.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Model location; `stub://...` selects the scripted engine.
    pub model_path: String,
    pub input_size: u32,
    pub labels_path: PathBuf,
    pub duplicate_ids: DuplicateIdPolicy,
    pub mean: f32,
    pub scale: f32,
    pub score_threshold: f32,
    pub unknown_class: UnknownClassPolicy,
    pub source: SourceConfig,
    pub viewport: Viewport,
    /// Stop after this many published batches. `None` runs until cancelled.
    pub max_cycles: Option<u64>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from_file(DetectorConfigFile::default())
    }
}

impl DetectorConfig {
    /// Load from `DETECT_CONFIG` (if set), then apply `DETECT_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECT_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any), then apply `DETECT_*` overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => DetectorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectorConfigFile) -> Self {
        let model = file.model.unwrap_or_default();
        let labels = file.labels.unwrap_or_default();
        let preprocess = file.preprocess.unwrap_or_default();
        let decode = file.decode.unwrap_or_default();
        let source = file.source.unwrap_or_default();
        let display = file.display.unwrap_or_default();
        let run = file.run.unwrap_or_default();
        let source_defaults = SourceConfig::default();

        Self {
            model_path: model
                .path
                .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
            input_size: model.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            labels_path: labels
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_PATH)),
            duplicate_ids: labels.duplicate_ids.unwrap_or_default(),
            mean: preprocess.mean.unwrap_or(0.0),
            scale: preprocess.scale.unwrap_or(1.0),
            score_threshold: decode.score_threshold.unwrap_or(DEFAULT_SCORE_THRESHOLD),
            unknown_class: decode.unknown_class.unwrap_or_default(),
            source: SourceConfig {
                url: source.url.unwrap_or(source_defaults.url),
                target_fps: source.target_fps.unwrap_or(source_defaults.target_fps),
                width: source.width.unwrap_or(source_defaults.width),
                height: source.height.unwrap_or(source_defaults.height),
            },
            viewport: Viewport {
                width: display.width.unwrap_or(DEFAULT_DISPLAY_WIDTH),
                height: display.height.unwrap_or(DEFAULT_DISPLAY_HEIGHT),
            },
            max_cycles: run.max_cycles,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("DETECT_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(path) = std::env::var("DETECT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = path;
            }
        }
        if let Ok(path) = std::env::var("DETECT_LABELS_PATH") {
            if !path.trim().is_empty() {
                self.labels_path = PathBuf::from(path);
            }
        }
        if let Ok(threshold) = std::env::var("DETECT_SCORE_THRESHOLD") {
            self.score_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("DETECT_SCORE_THRESHOLD must be a number in 0..=1"))?;
        }
        if let Ok(size) = std::env::var("DETECT_INPUT_SIZE") {
            self.input_size = size
                .trim()
                .parse()
                .map_err(|_| anyhow!("DETECT_INPUT_SIZE must be a positive integer"))?;
        }
        if let Ok(cycles) = std::env::var("DETECT_MAX_CYCLES") {
            let cycles: u64 = cycles
                .trim()
                .parse()
                .map_err(|_| anyhow!("DETECT_MAX_CYCLES must be an integer"))?;
            self.max_cycles = Some(cycles);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(anyhow!("model input_size must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(anyhow!(
                "score_threshold must be within 0..=1, got {}",
                self.score_threshold
            ));
        }
        if !self.mean.is_finite() {
            return Err(anyhow!("preprocess mean must be finite"));
        }
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(anyhow!("preprocess scale must be finite and non-zero"));
        }
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(anyhow!("display width and height must be greater than zero"));
        }
        if self.max_cycles == Some(0) {
            return Err(anyhow!("max_cycles must be greater than zero when set"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DetectorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_detector() {
        let cfg = DetectorConfig::default();
        assert_eq!(cfg.input_size, 224);
        assert_eq!(cfg.score_threshold, 0.3);
        assert_eq!(cfg.mean, 0.0);
        assert_eq!(cfg.scale, 1.0);
        assert_eq!(cfg.unknown_class, UnknownClassPolicy::Skip);
        assert_eq!(cfg.duplicate_ids, DuplicateIdPolicy::Reject);
        assert_eq!(cfg.source.url, "stub://camera");
        assert!(cfg.max_cycles.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn source_defaults_come_from_source_config() {
        let cfg = DetectorConfig::default();
        assert_eq!(cfg.source, SourceConfig::default());
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut cfg = DetectorConfig::default();
        cfg.score_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = DetectorConfig::default();
        cfg.scale = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = DetectorConfig::default();
        cfg.max_cycles = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_policies_from_json() {
        let file: DetectorConfigFile = serde_json::from_str(
            r#"{"labels": {"duplicate_ids": "replace"}, "decode": {"unknown_class": "strict"}}"#,
        )
        .unwrap();
        let cfg = DetectorConfig::from_file(file);
        assert_eq!(cfg.duplicate_ids, DuplicateIdPolicy::Replace);
        assert_eq!(cfg.unknown_class, UnknownClassPolicy::Strict);
    }
}
