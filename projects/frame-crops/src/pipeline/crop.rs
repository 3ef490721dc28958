use crate::config::SelectionStrategy;
use crate::error::PipelineError;
use crate::pipeline::types::{CropResult, DetectionBox, FrameRecord, PixelRect, Thresholds};
use crate::pipeline::writer::FrameWriter;
use image::{imageops, RgbImage};

/// Maps a normalized center/size box onto an image, clamped to its bounds.
///
/// Returns `None` when nothing of the box is left after clamping.
pub fn to_pixel_rect(detection: &DetectionBox, width: u32, height: u32) -> Option<PixelRect> {
    let (cx, cy) = (detection.cx as f64, detection.cy as f64);
    let (half_w, half_h) = (detection.w as f64 / 2.0, detection.h as f64 / 2.0);
    let (img_w, img_h) = (width as f64, height as f64);

    let to_px = |v: f64, dim: f64| (v * dim).clamp(0.0, dim).round() as u32;

    let rect = PixelRect {
        left: to_px(cx - half_w, img_w),
        top: to_px(cy - half_h, img_h),
        right: to_px(cx + half_w, img_w),
        bottom: to_px(cy + half_h, img_h),
    };

    if rect.width() == 0 || rect.height() == 0 {
        return None;
    }
    Some(rect)
}

/// Picks the detections that become crops.
pub fn select_boxes(boxes: &[DetectionBox], strategy: SelectionStrategy) -> Vec<&DetectionBox> {
    let best_by = |key: fn(&DetectionBox) -> f32| {
        // First box wins ties
        boxes.iter().fold(None::<&DetectionBox>, |best, b| match best {
            Some(current) if key(current) >= key(b) => Some(current),
            _ => Some(b),
        })
    };

    match strategy {
        SelectionStrategy::HighestConfidence => {
            best_by(DetectionBox::combined_confidence).into_iter().collect()
        }
        SelectionStrategy::LargestArea => best_by(DetectionBox::area).into_iter().collect(),
        SelectionStrategy::AllBoxes => boxes.iter().collect(),
    }
}

/// Copies a pixel rectangle out of an image.
pub fn crop_rect(img: &RgbImage, rect: &PixelRect) -> RgbImage {
    imageops::crop_imm(img, rect.left, rect.top, rect.width(), rect.height()).to_image()
}

/// What happened to one frame's detections.
#[derive(Debug, Default)]
pub struct CropOutcome {
    pub crops: Vec<CropResult>,
    /// Selected boxes that collapsed to an empty rectangle
    pub degenerate: usize,
    pub write_errors: Vec<PipelineError>,
}

impl CropOutcome {
    /// Nothing qualified, or every selected box collapsed. Failed writes do
    /// not count: the frame had a crop, it just could not be saved.
    pub fn is_no_crop(&self) -> bool {
        self.crops.is_empty() && self.write_errors.is_empty()
    }
}

/// Turns detections into saved crop images under the `cropped/` root.
pub struct CropPipeline {
    writer: FrameWriter,
    thresholds: Thresholds,
    strategy: SelectionStrategy,
}

impl CropPipeline {
    pub fn new(writer: FrameWriter, thresholds: Thresholds, strategy: SelectionStrategy) -> Self {
        Self {
            writer,
            thresholds,
            strategy,
        }
    }

    pub fn crop(&self, frame: &FrameRecord, boxes: &[DetectionBox]) -> CropOutcome {
        let qualifying: Vec<DetectionBox> = boxes
            .iter()
            .filter(|b| self.thresholds.accepts(b))
            .cloned()
            .collect();
        let selected = select_boxes(&qualifying, self.strategy);

        let (width, height) = frame.image.dimensions();
        let mut outcome = CropOutcome::default();

        for (k, detection) in selected.into_iter().enumerate() {
            let rect = match to_pixel_rect(detection, width, height) {
                Some(rect) => rect,
                None => {
                    tracing::debug!(
                        "{}",
                        PipelineError::DegenerateCrop { index: frame.index }
                    );
                    outcome.degenerate += 1;
                    continue;
                }
            };

            let suffix = match self.strategy {
                SelectionStrategy::AllBoxes => format!("_box{:02}", k),
                _ => String::new(),
            };

            let cropped = crop_rect(&frame.image, &rect);
            match self
                .writer
                .write(&frame.video_id, frame.index, &suffix, &cropped)
            {
                Ok(path) => outcome.crops.push(CropResult {
                    frame_index: frame.index,
                    rect,
                    path,
                }),
                Err(e) => outcome.write_errors.push(e),
            }
        }

        outcome
    }
}
