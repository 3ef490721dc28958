use crate::config::Mode;
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Serialize;
use std::path::PathBuf;

/// Independent confidence cutoffs a detection must both meet.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub box_threshold: f32,
    pub text_threshold: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            box_threshold: crate::config::DEFAULT_BOX_THRESHOLD,
            text_threshold: crate::config::DEFAULT_TEXT_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn accepts(&self, detection: &DetectionBox) -> bool {
        detection.box_confidence >= self.box_threshold
            && detection.text_confidence >= self.text_threshold
    }
}

/// A decoded frame. Owned by whichever stage is handling it and dropped once
/// it has been written or cropped.
pub struct FrameRecord {
    pub video_id: String,
    /// Zero-based position among the frames kept for this video
    pub index: usize,
    pub image: RgbImage,
}

/// A scored detection in normalized center/size form.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DetectionBox {
    pub frame_index: usize,
    pub prompt: String,
    pub box_confidence: f32,
    pub text_confidence: f32,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl DetectionBox {
    pub fn combined_confidence(&self) -> f32 {
        self.box_confidence * self.text_confidence
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }
}

/// Pixel rectangle, right/bottom exclusive.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CropResult {
    pub frame_index: usize,
    pub rect: PixelRect,
    pub path: PathBuf,
}

/// Lifecycle of one video inside a job.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VideoState {
    Pending,
    Opening,
    Extracting,
    Cropping,
    Completed,
    Failed,
}

impl VideoState {
    /// Moves to `next`, or returns `None` if the transition is not allowed.
    pub fn advance(self, next: VideoState) -> Option<VideoState> {
        use VideoState::*;
        let allowed = match (self, next) {
            (Pending, Opening) => true,
            (Opening, Extracting) | (Opening, Failed) => true,
            (Extracting, Cropping) | (Extracting, Completed) | (Extracting, Failed) => true,
            (Cropping, Completed) | (Cropping, Failed) => true,
            _ => false,
        };
        allowed.then_some(next)
    }
}

/// Per-video counters accumulated during a job.
#[derive(Serialize, Debug, Clone)]
pub struct VideoReport {
    pub identifier: String,
    pub source: PathBuf,
    pub status: VideoState,
    pub frames_extracted: usize,
    pub crops_produced: usize,
    /// Frames lost to a mid-stream decode failure
    pub frames_skipped_decode: usize,
    /// Frames that decoded but could not be encoded or written
    pub frames_skipped_write: usize,
    /// Crops that were selected but could not be encoded or written
    pub crops_skipped_write: usize,
    /// Selected boxes that collapsed to an empty rectangle
    pub degenerate_crops: usize,
    /// Frames where no box qualified or every selected box was degenerate
    pub no_crop_frames: usize,
    /// Extraction stopped before the end of the stream
    pub truncated: bool,
    pub raw_frames_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VideoReport {
    pub fn new(identifier: &str, source: PathBuf) -> Self {
        Self {
            identifier: identifier.to_string(),
            source,
            status: VideoState::Pending,
            frames_extracted: 0,
            crops_produced: 0,
            frames_skipped_decode: 0,
            frames_skipped_write: 0,
            crops_skipped_write: 0,
            degenerate_crops: 0,
            no_crop_frames: 0,
            truncated: false,
            raw_frames_deleted: false,
            error: None,
        }
    }

    /// Applies a lifecycle transition. Illegal transitions are logged and ignored.
    pub fn transition(&mut self, next: VideoState) {
        match self.status.advance(next) {
            Some(state) => {
                tracing::debug!("{}: {:?} -> {:?}", self.identifier, self.status, state);
                self.status = state;
            }
            None => tracing::warn!(
                "{}: ignoring invalid transition {:?} -> {:?}",
                self.identifier,
                self.status,
                next
            ),
        }
    }

    pub fn fail(&mut self, reason: String) {
        self.error = Some(reason);
        self.transition(VideoState::Failed);
    }
}

/// Summary of a whole run. Read-only once returned.
#[derive(Serialize, Debug, Clone)]
pub struct JobReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub mode: Mode,
    pub videos: Vec<VideoReport>,
}

impl JobReport {
    pub fn new(mode: Mode) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            mode,
            videos: Vec::new(),
        }
    }

    pub fn video(&self, identifier: &str) -> Option<&VideoReport> {
        self.videos.iter().find(|v| v.identifier == identifier)
    }

    pub fn completed(&self) -> usize {
        self.videos
            .iter()
            .filter(|v| v.status == VideoState::Completed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.videos
            .iter()
            .filter(|v| v.status == VideoState::Failed)
            .count()
    }

    pub fn total_frames(&self) -> usize {
        self.videos.iter().map(|v| v.frames_extracted).sum()
    }

    pub fn total_crops(&self) -> usize {
        self.videos.iter().map(|v| v.crops_produced).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(box_confidence: f32, text_confidence: f32) -> DetectionBox {
        DetectionBox {
            frame_index: 0,
            prompt: "orange".to_string(),
            box_confidence,
            text_confidence,
            cx: 0.5,
            cy: 0.5,
            w: 0.2,
            h: 0.2,
        }
    }

    #[test]
    fn test_thresholds_require_both_scores() {
        let thresholds = Thresholds::default();
        assert!(thresholds.accepts(&detection(0.35, 0.25)));
        assert!(!thresholds.accepts(&detection(0.20, 0.90)));
        assert!(!thresholds.accepts(&detection(0.90, 0.10)));
    }

    #[test]
    fn test_state_machine() {
        use VideoState::*;
        assert_eq!(Pending.advance(Opening), Some(Opening));
        assert_eq!(Opening.advance(Failed), Some(Failed));
        assert_eq!(Extracting.advance(Completed), Some(Completed));
        assert_eq!(Extracting.advance(Cropping), Some(Cropping));
        assert_eq!(Pending.advance(Completed), None);
        assert_eq!(Completed.advance(Failed), None);
    }

    #[test]
    fn test_report_ignores_invalid_transition() {
        let mut report = VideoReport::new("v", PathBuf::from("/v.mp4"));
        report.transition(VideoState::Completed);
        assert_eq!(report.status, VideoState::Pending);

        report.transition(VideoState::Opening);
        report.fail("bad container".to_string());
        assert_eq!(report.status, VideoState::Failed);
        assert_eq!(report.error.as_deref(), Some("bad container"));
    }
}
