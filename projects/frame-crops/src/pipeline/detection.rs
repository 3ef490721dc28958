use crate::config::JobConfig;
use crate::error::PipelineError;
use crate::pipeline::types::{DetectionBox, Thresholds};
use anyhow::Result;
use image::RgbImage;

/// Open-vocabulary detection: find regions of `image` matching `prompt`.
///
/// Implementations return only boxes meeting both thresholds, in normalized
/// center/size coordinates. An empty result means nothing matched.
pub trait Detector {
    fn detect(
        &mut self,
        image: &RgbImage,
        prompt: &str,
        thresholds: Thresholds,
    ) -> Result<Vec<DetectionBox>>;
}

/// Detector returning the same boxes for every frame, gated by the thresholds.
#[derive(Debug, Clone, Default)]
pub struct FixedDetector {
    boxes: Vec<DetectionBox>,
    calls: usize,
    fail_on_call: Option<usize>,
}

impl FixedDetector {
    pub fn new(boxes: Vec<DetectionBox>) -> Self {
        Self {
            boxes,
            calls: 0,
            fail_on_call: None,
        }
    }

    /// Make the `n`th call (zero-based) and every later one fail.
    pub fn failing_from(mut self, n: usize) -> Self {
        self.fail_on_call = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Detector for FixedDetector {
    fn detect(
        &mut self,
        _image: &RgbImage,
        prompt: &str,
        thresholds: Thresholds,
    ) -> Result<Vec<DetectionBox>> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_on_call.is_some_and(|n| call >= n) {
            anyhow::bail!("inference failed on call {}", call);
        }

        Ok(self
            .boxes
            .iter()
            .filter(|b| thresholds.accepts(b))
            .map(|b| DetectionBox {
                prompt: prompt.to_string(),
                ..b.clone()
            })
            .collect())
    }
}

/// Builds the detector used for crop mode.
///
/// Fails with `DetectorUnavailable` when the binary was built without a
/// detector backend or the model cannot be loaded.
pub fn build_detector(config: &JobConfig) -> Result<Box<dyn Detector>, PipelineError> {
    #[cfg(feature = "grounding-dino")]
    {
        let detector = grounding_dino::GroundingDino::new(config)
            .map_err(|e| PipelineError::DetectorUnavailable(format!("{:#}", e)))?;
        Ok(Box::new(detector))
    }

    #[cfg(not(feature = "grounding-dino"))]
    {
        let _ = config;
        Err(PipelineError::DetectorUnavailable(
            "built without the `grounding-dino` feature".to_string(),
        ))
    }
}

#[cfg(feature = "grounding-dino")]
pub mod grounding_dino {
    use super::Detector;
    use crate::config::{Device, JobConfig};
    use crate::pipeline::types::{DetectionBox, Thresholds};
    use anyhow::{Context, Result};
    use image::{DynamicImage, RgbImage};
    use usls::models::GroundingDINO;
    use usls::{Config, Image};

    /// A wrapper around the USLS GroundingDINO model.
    ///
    /// The model is built for the prompt and thresholds of the job; `detect`
    /// re-applies the per-call thresholds on top, so calls may only tighten them.
    pub struct GroundingDino {
        model: GroundingDINO,
        prompt: String,
    }

    impl GroundingDino {
        pub fn new(job: &JobConfig) -> Result<Self> {
            let prompt = job
                .prompt()
                .context("GroundingDINO needs a prompt")?
                .to_string();
            let device = match job.device {
                Device::Cpu => "cpu",
                Device::Accelerated => "cuda:0",
            };

            let mut config = Config::grounding_dino_tiny()
                .with_model_device(device.try_into()?)
                .with_text_names(&[prompt.as_str()])
                .with_class_confs(&[job.box_threshold])
                .with_text_confs(&[job.text_threshold]);
            if let Some(model_file) = &job.model_file {
                config = config.with_model_file(&model_file.to_string_lossy());
            }

            let model = GroundingDINO::new(config.commit()?)
                .context("Failed to load GroundingDINO model")?;
            tracing::info!("Loaded GroundingDINO on {} for prompt {:?}", device, prompt);
            Ok(Self { model, prompt })
        }
    }

    impl Detector for GroundingDino {
        fn detect(
            &mut self,
            image: &RgbImage,
            prompt: &str,
            thresholds: Thresholds,
        ) -> Result<Vec<DetectionBox>> {
            if prompt != self.prompt {
                anyhow::bail!(
                    "model was built for prompt {:?}, got {:?}",
                    self.prompt,
                    prompt
                );
            }

            let (img_w, img_h) = (image.width() as f32, image.height() as f32);
            let input = Image::from(DynamicImage::ImageRgb8(image.clone()));
            let results = self.model.forward(&[input])?;

            let boxes = results
                .into_iter()
                .next()
                .map(|y| y.hbbs)
                .unwrap_or_default()
                .into_iter()
                .map(|hbb| {
                    // usls folds the text score into the reported confidence
                    let confidence = hbb.confidence().unwrap_or(0.0);
                    DetectionBox {
                        frame_index: 0,
                        prompt: prompt.to_string(),
                        box_confidence: confidence,
                        text_confidence: confidence,
                        cx: (hbb.xmin() + hbb.width() / 2.0) / img_w,
                        cy: (hbb.ymin() + hbb.height() / 2.0) / img_h,
                        w: hbb.width() / img_w,
                        h: hbb.height() / img_h,
                    }
                })
                .filter(|b| thresholds.accepts(b))
                .collect();

            Ok(boxes)
        }
    }
}
