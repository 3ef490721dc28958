// Job configuration
//
// A single `JobConfig` is built in main (defaults, then an optional JSON file,
// then CLI flags) and handed to the orchestrator by reference.

use crate::error::PipelineError;
use crate::pipeline::types::Thresholds;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BOX_THRESHOLD: f32 = 0.35;
pub const DEFAULT_TEXT_THRESHOLD: f32 = 0.25;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Only write raw frames
    #[default]
    Extract,
    /// Write raw frames and crop each one around the prompted object
    Crop,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    #[serde(alias = "cuda", alias = "gpu")]
    #[value(alias = "cuda")]
    Accelerated,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    #[serde(alias = "jpeg")]
    #[value(alias = "jpeg")]
    Jpg,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
        }
    }

    pub fn as_image_format(&self) -> image::ImageFormat {
        match self {
            ImageFormat::Jpg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
        }
    }
}

/// Which detections of a frame become crops.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// One crop per frame: the box with the highest combined confidence
    #[default]
    HighestConfidence,
    /// One crop per frame: the box covering the largest area
    LargestArea,
    /// One crop per qualifying box
    AllBoxes,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Extract => write!(f, "extract"),
            Mode::Crop => write!(f, "crop"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct JobConfig {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub mode: Mode,
    pub prompt: Option<String>,
    pub box_threshold: f32,
    pub text_threshold: f32,
    pub device: Device,
    pub delete_raw_after_crop: bool,
    pub image_format: ImageFormat,
    /// Keep every Nth decoded frame (1 keeps all of them)
    pub every_nth: usize,
    pub recursive: bool,
    /// Lexicographic scan order instead of directory-listing order
    pub sort: bool,
    /// Extensions accepted in addition to the built-in video list
    pub extra_extensions: Vec<String>,
    pub selection: SelectionStrategy,
    /// Local detector weights; the detector's own default is used when unset
    pub model_file: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::new(),
            output_folder: PathBuf::new(),
            mode: Mode::Extract,
            prompt: None,
            box_threshold: DEFAULT_BOX_THRESHOLD,
            text_threshold: DEFAULT_TEXT_THRESHOLD,
            device: Device::Cpu,
            delete_raw_after_crop: false,
            image_format: ImageFormat::Jpg,
            every_nth: 1,
            recursive: false,
            sort: true,
            extra_extensions: Vec::new(),
            selection: SelectionStrategy::HighestConfidence,
            model_file: None,
        }
    }
}

impl JobConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: JobConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            box_threshold: self.box_threshold,
            text_threshold: self.text_threshold,
        }
    }

    /// Trimmed prompt, if one was given and is not blank.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn frames_root(&self) -> PathBuf {
        self.output_folder.join("frames")
    }

    pub fn cropped_root(&self) -> PathBuf {
        self.output_folder.join("cropped")
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.input_folder.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "inputFolder is required".to_string(),
            ));
        }
        if self.output_folder.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "outputFolder is required".to_string(),
            ));
        }
        for (name, value) in [
            ("boxThreshold", self.box_threshold),
            ("textThreshold", self.text_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.every_nth == 0 {
            return Err(PipelineError::InvalidConfig(
                "everyNth must be at least 1".to_string(),
            ));
        }
        if self.mode == Mode::Crop && self.prompt().is_none() {
            return Err(PipelineError::InvalidConfig(
                "a prompt is required in crop mode".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> JobConfig {
        JobConfig {
            input_folder: PathBuf::from("/videos"),
            output_folder: PathBuf::from("/out"),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = JobConfig::default();
        assert_eq!(config.box_threshold, 0.35);
        assert_eq!(config.text_threshold, 0.25);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.mode, Mode::Extract);
        assert!(!config.delete_raw_after_crop);
        assert!(config.sort);
        assert_eq!(config.selection, SelectionStrategy::HighestConfidence);
    }

    #[test]
    fn test_parse_camel_case_json() {
        let json = r#"{
            "inputFolder": "/videos",
            "outputFolder": "/out",
            "mode": "crop",
            "prompt": "orange",
            "device": "cuda",
            "deleteRawAfterCrop": true,
            "selection": "all-boxes"
        }"#;
        let config: JobConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.mode, Mode::Crop);
        assert_eq!(config.device, Device::Accelerated);
        assert!(config.delete_raw_after_crop);
        assert_eq!(config.selection, SelectionStrategy::AllBoxes);
        // Unspecified fields fall back to defaults
        assert_eq!(config.box_threshold, DEFAULT_BOX_THRESHOLD);
        assert_eq!(config.image_format, ImageFormat::Jpg);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_crop_mode_requires_prompt() {
        let config = JobConfig {
            mode: Mode::Crop,
            prompt: Some("   ".to_string()),
            ..base()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_threshold_range() {
        let config = JobConfig {
            box_threshold: 1.5,
            ..base()
        };
        assert!(config.validate().is_err());

        let config = JobConfig {
            every_nth: 0,
            ..base()
        };
        assert!(config.validate().is_err());
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_output_roots() {
        let config = base();
        assert_eq!(config.frames_root(), PathBuf::from("/out/frames"));
        assert_eq!(config.cropped_root(), PathBuf::from("/out/cropped"));
    }
}
