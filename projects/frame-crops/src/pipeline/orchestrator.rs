// Pipeline orchestrator: manages the job lifecycle
//
// Scans the input folder, runs every video through the reader, writer and
// (in crop mode) detector + crop stages one at a time, and keeps the report.

use crate::catalog::{self, CatalogOptions, VideoSource};
use crate::config::{JobConfig, Mode};
use crate::error::PipelineError;
use crate::pipeline::crop::CropPipeline;
use crate::pipeline::detection::Detector;
use crate::pipeline::types::{DetectionBox, FrameRecord, JobReport, VideoReport, VideoState};
use crate::pipeline::writer::FrameWriter;
use crate::video::processor::{process_video, VideoSession};
use crate::video::{FrameDecoder, Frames};
use chrono::Utc;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;

pub const SUMMARY_FILE: &str = "summary.json";

pub struct JobOrchestrator<'a> {
    config: &'a JobConfig,
    decoder: Box<dyn FrameDecoder>,
    detector: Option<Box<dyn Detector>>,
    show_progress: bool,
}

impl<'a> JobOrchestrator<'a> {
    pub fn new(
        config: &'a JobConfig,
        decoder: Box<dyn FrameDecoder>,
        detector: Option<Box<dyn Detector>>,
    ) -> Self {
        Self {
            config,
            decoder,
            detector,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Runs the whole job.
    ///
    /// Errors only for problems found before any video is opened; per-video
    /// and per-frame failures end up in the returned report.
    pub fn run(&mut self) -> Result<JobReport, PipelineError> {
        let config = self.config;
        config.validate()?;

        let options = CatalogOptions {
            recursive: config.recursive,
            sort: config.sort,
            extra_extensions: config.extra_extensions.clone(),
        };
        let sources = catalog::scan(&config.input_folder, &options)?;

        if config.mode == Mode::Crop && self.detector.is_none() {
            return Err(PipelineError::DetectorUnavailable(
                "crop mode needs a detector".to_string(),
            ));
        }

        let mut report = JobReport::new(config.mode);
        if sources.is_empty() {
            tracing::warn!("No videos found in {:?}", config.input_folder);
        }

        for (i, source) in sources.iter().enumerate() {
            tracing::info!(
                "[{}/{}] Processing {:?} as '{}'",
                i + 1,
                sources.len(),
                source.path,
                source.identifier
            );
            let video = self.process_source(source);
            report.videos.push(video);
        }

        if config.mode == Mode::Crop && config.delete_raw_after_crop {
            self.remove_raw_frames(&mut report);
        }

        report.finished_at = Some(Utc::now());
        match self.write_summary(&report) {
            Ok(path) => tracing::info!("Run summary written to {:?}", path),
            Err(e) => tracing::warn!("Failed to write run summary: {}", e),
        }
        log_summary(&report);

        Ok(report)
    }

    fn process_source(&mut self, source: &VideoSource) -> VideoReport {
        let config = self.config;
        let mut video = VideoReport::new(&source.identifier, source.path.clone());

        video.transition(VideoState::Opening);
        let reader = match self.decoder.open(source) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", source.path, e);
                video.fail(e.to_string());
                return video;
            }
        };
        video.transition(VideoState::Extracting);

        let raw_writer = FrameWriter::new(config.frames_root(), config.image_format);
        let thresholds = config.thresholds();
        let prompt = config.prompt().unwrap_or_default();
        let crop_pipeline = match config.mode {
            Mode::Crop => {
                video.transition(VideoState::Cropping);
                Some(CropPipeline::new(
                    FrameWriter::new(config.cropped_root(), config.image_format),
                    thresholds,
                    config.selection,
                ))
            }
            Mode::Extract => None,
        };

        let mut detector = self.detector.as_deref_mut();
        let mut crop_error: Option<PipelineError> = None;

        let frames = Frames::new(reader, &source.identifier, config.every_nth);
        let session = VideoSession::new(frames, &source.identifier, self.show_progress);

        let stats = process_video(session, |frame: FrameRecord| {
            match raw_writer.write(&frame.video_id, frame.index, "", &frame.image) {
                Ok(_) => video.frames_extracted += 1,
                Err(e) => {
                    tracing::warn!("{}", e);
                    video.frames_skipped_write += 1;
                }
            }

            let (Some(pipeline), Some(detector)) = (&crop_pipeline, detector.as_mut()) else {
                return;
            };
            if crop_error.is_some() {
                return;
            }

            let boxes: Vec<DetectionBox> =
                match detector.detect(&frame.image, prompt, thresholds) {
                    Ok(boxes) => boxes
                        .into_iter()
                        .map(|b| DetectionBox {
                            frame_index: frame.index,
                            ..b
                        })
                        .collect(),
                    Err(e) => {
                        let err = PipelineError::Detection {
                            index: frame.index,
                            reason: format!("{:#}", e),
                        };
                        tracing::warn!("{}: {}; cropping stopped", frame.video_id, err);
                        crop_error = Some(err);
                        return;
                    }
                };

            let outcome = pipeline.crop(&frame, &boxes);
            for e in &outcome.write_errors {
                tracing::warn!("{}", e);
            }
            if video.error.is_none() {
                video.error = outcome.write_errors.first().map(|e| e.to_string());
            }
            if outcome.is_no_crop() {
                video.no_crop_frames += 1;
            }
            video.crops_produced += outcome.crops.len();
            video.crops_skipped_write += outcome.write_errors.len();
            video.degenerate_crops += outcome.degenerate;
        });

        if let Some(e) = stats.decode_error {
            tracing::warn!(
                "{}: extraction stopped early after {} frame(s): {}",
                source.identifier,
                stats.processed_frames,
                e
            );
            video.truncated = true;
            video.frames_skipped_decode += 1;
            video.error = Some(e.to_string());
        }

        tracing::info!(
            "{}: {} frame(s), {} crop(s) in {:.2}s",
            source.identifier,
            video.frames_extracted,
            video.crops_produced,
            stats.duration.as_secs_f64()
        );

        match crop_error {
            Some(e) => video.fail(e.to_string()),
            None => video.transition(VideoState::Completed),
        }
        video
    }

    /// Deletes `frames/<id>` for videos that completed with at least one crop
    /// and no lost crop writes. Everything else keeps its raw frames.
    fn remove_raw_frames(&self, report: &mut JobReport) {
        let frames_root = self.config.frames_root();

        for video in report.videos.iter_mut() {
            if video.status != VideoState::Completed
                || video.crops_produced == 0
                || video.crops_skipped_write > 0
            {
                tracing::info!("{}: keeping raw frames", video.identifier);
                continue;
            }

            let dir = frames_root.join(&video.identifier);
            match fs::remove_dir_all(&dir) {
                Ok(()) => video.raw_frames_deleted = true,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to delete {:?}: {}", dir, e),
            }
        }

        let is_empty = fs::read_dir(&frames_root)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            let _ = fs::remove_dir(&frames_root);
        }
        tracing::info!("Raw frames cleaned up");
    }

    fn write_summary(&self, report: &JobReport) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(&self.config.output_folder)?;
        let path = self.config.output_folder.join(SUMMARY_FILE);
        let content = serde_json::to_string_pretty(report).map_err(io::Error::from)?;
        fs::write(&path, content)?;
        Ok(path)
    }
}

fn log_summary(report: &JobReport) {
    for video in &report.videos {
        tracing::info!(
            "{:<24} {:<10} frames={} crops={} no_crop={} degenerate={} skipped_write={}/{} truncated={}",
            video.identifier,
            format!("{:?}", video.status),
            video.frames_extracted,
            video.crops_produced,
            video.no_crop_frames,
            video.degenerate_crops,
            video.frames_skipped_write,
            video.crops_skipped_write,
            video.truncated
        );
    }
    tracing::info!(
        "Done: {} video(s) completed, {} failed, {} frame(s), {} crop(s)",
        report.completed(),
        report.failed(),
        report.total_frames(),
        report.total_crops()
    );
}
