use crate::config::{Device, ImageFormat, JobConfig, Mode, SelectionStrategy};
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Extract frames from every video in a folder, optionally cropping each
/// frame around an object described by a text prompt.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON job config; flags given on the command line take precedence
    #[arg(long, env = "FRAME_CROPS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Folder containing the source videos
    #[arg(long, short, env = "FRAME_CROPS_INPUT")]
    pub input: Option<PathBuf>,

    /// Root directory for frames/, cropped/ and summary.json
    #[arg(long, short, env = "FRAME_CROPS_OUTPUT")]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Text prompt naming the object to crop (e.g. "orange")
    #[arg(long, short)]
    pub prompt: Option<String>,

    /// Minimum objectness confidence [default: 0.35]
    #[arg(long)]
    pub box_threshold: Option<f32>,

    /// Minimum prompt-match confidence [default: 0.25]
    #[arg(long)]
    pub text_threshold: Option<f32>,

    /// Where the detector runs
    #[arg(long, value_enum, env = "FRAME_CROPS_DEVICE")]
    pub device: Option<Device>,

    /// Remove raw frames of videos that were cropped successfully
    #[arg(long, action)]
    pub delete_raw_after_crop: bool,

    #[arg(long, value_enum)]
    pub image_format: Option<ImageFormat>,

    /// Keep only every Nth decoded frame
    #[arg(long)]
    pub every_nth: Option<usize>,

    /// Also scan subfolders of the input folder
    #[arg(long, action)]
    pub recursive: bool,

    /// Process videos in directory-listing order instead of sorted by name
    #[arg(long, action)]
    pub no_sort: bool,

    /// Additional video extensions to accept (repeatable)
    #[arg(long = "extension")]
    pub extensions: Vec<String>,

    #[arg(long, value_enum)]
    pub selection: Option<SelectionStrategy>,

    /// Local detector model file
    #[arg(long, env = "FRAME_CROPS_MODEL_FILE")]
    pub model_file: Option<PathBuf>,

    /// Hide per-video progress bars
    #[arg(long, action)]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Builds the job config: defaults, then the config file, then these flags.
    pub fn into_job_config(self) -> Result<JobConfig> {
        let mut config = match &self.config {
            Some(path) => JobConfig::load(path)?,
            None => JobConfig::default(),
        };
        self.apply_to(&mut config);
        Ok(config)
    }

    fn apply_to(self, config: &mut JobConfig) {
        if let Some(input) = self.input {
            config.input_folder = input;
        }
        if let Some(output) = self.output {
            config.output_folder = output;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(prompt) = self.prompt {
            config.prompt = Some(prompt);
        }
        if let Some(t) = self.box_threshold {
            config.box_threshold = t;
        }
        if let Some(t) = self.text_threshold {
            config.text_threshold = t;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(format) = self.image_format {
            config.image_format = format;
        }
        if let Some(n) = self.every_nth {
            config.every_nth = n;
        }
        if let Some(selection) = self.selection {
            config.selection = selection;
        }
        if let Some(model_file) = self.model_file {
            config.model_file = Some(model_file);
        }
        config.delete_raw_after_crop |= self.delete_raw_after_crop;
        config.recursive |= self.recursive;
        if self.no_sort {
            config.sort = false;
        }
        config.extra_extensions.extend(self.extensions);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parses `argv` with the `FRAME_CROPS_*` variables cleared so the shell
    /// running the tests cannot leak into them.
    fn parse(argv: &[&str]) -> Args {
        for (key, _) in std::env::vars() {
            if key.starts_with("FRAME_CROPS_") {
                std::env::remove_var(key);
            }
        }
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = parse(&[
            "frame-crops",
            "--input",
            "/videos",
            "--output",
            "/out",
            "--mode",
            "crop",
            "--prompt",
            "orange",
            "--box-threshold",
            "0.5",
            "--device",
            "cuda",
            "--delete-raw-after-crop",
            "--selection",
            "largest-area",
        ]);

        let config = args.into_job_config().unwrap();
        assert_eq!(config.input_folder, PathBuf::from("/videos"));
        assert_eq!(config.mode, Mode::Crop);
        assert_eq!(config.prompt(), Some("orange"));
        assert_eq!(config.box_threshold, 0.5);
        assert_eq!(config.text_threshold, 0.25);
        assert_eq!(config.device, Device::Accelerated);
        assert!(config.delete_raw_after_crop);
        assert_eq!(config.selection, SelectionStrategy::LargestArea);
    }

    #[test]
    fn test_flags_layer_over_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(
            &path,
            r#"{"inputFolder": "/from-file", "outputFolder": "/out", "everyNth": 5, "imageFormat": "png"}"#,
        )
        .unwrap();

        let args = parse(&[
            "frame-crops",
            "--config",
            path.to_str().unwrap(),
            "--input",
            "/from-flag",
            "--extension",
            "webm",
        ]);

        let config = args.into_job_config().unwrap();
        assert_eq!(config.input_folder, PathBuf::from("/from-flag"));
        assert_eq!(config.output_folder, PathBuf::from("/out"));
        assert_eq!(config.every_nth, 5);
        assert_eq!(config.image_format, ImageFormat::Png);
        assert_eq!(config.extra_extensions, vec!["webm".to_string()]);
    }

    #[test]
    fn test_defaults_without_flags() {
        let config = parse(&["frame-crops"]).into_job_config().unwrap();
        assert_eq!(config.mode, Mode::Extract);
        assert_eq!(config.device, Device::Cpu);
        assert!(config.model_file.is_none());
        assert!(config.sort);
    }
}
