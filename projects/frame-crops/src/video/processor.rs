use crate::error::PipelineError;
use crate::pipeline::types::FrameRecord;
use crate::video::Frames;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

pub struct ProcessingStats {
    pub processed_frames: usize,
    /// Set when decoding stopped early
    pub decode_error: Option<PipelineError>,
    pub duration: Duration,
}

/// A trait for handling video frames. This separates the "how to process"
/// from the "how to read and orchestrate" logic.
pub trait FrameProcessor {
    fn process(&mut self, frame: FrameRecord);
}

/// Blanket implementation so any closure with the right signature
/// automatically implements FrameProcessor.
impl<F> FrameProcessor for F
where
    F: FnMut(FrameRecord),
{
    fn process(&mut self, frame: FrameRecord) {
        self(frame)
    }
}

pub struct VideoSession {
    pub frames: Frames,
    pub pb: ProgressBar,
    pub start_time: Instant,
    pub processed_frames: usize,
}

impl VideoSession {
    pub fn new(frames: Frames, label: &str, show_progress: bool) -> Self {
        let pb = match frames.len_hint() {
            Some(total) => {
                let pb = ProgressBar::new(total as u64);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec:.1.yellow}, {eta})",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => ProgressBar::new_spinner(),
        };
        if !show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_message(label.to_string());

        Self {
            frames,
            pb,
            start_time: Instant::now(),
            processed_frames: 0,
        }
    }
}

/// Drives a session to the end of its frames, one frame at a time.
pub fn process_video<P>(mut session: VideoSession, mut processor: P) -> ProcessingStats
where
    P: FrameProcessor,
{
    let mut decode_error = None;

    for item in session.frames.by_ref() {
        match item {
            Ok(frame) => {
                processor.process(frame);
                session.processed_frames += 1;
                session.pb.inc(1);
            }
            Err(e) => {
                decode_error = Some(e);
                break;
            }
        }
    }

    session.pb.finish_and_clear();

    ProcessingStats {
        processed_frames: session.processed_frames,
        decode_error,
        duration: session.start_time.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::testing::reader;

    #[test]
    fn test_process_video_visits_every_frame() {
        let session = VideoSession::new(Frames::new(reader(5, false), "clip", 1), "clip", false);
        let mut seen = Vec::new();
        let stats = process_video(session, |frame: FrameRecord| seen.push(frame.index));

        assert_eq!(stats.processed_frames, 5);
        assert!(stats.decode_error.is_none());
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_process_video_reports_truncation() {
        let session = VideoSession::new(Frames::new(reader(2, true), "clip", 1), "clip", false);
        let stats = process_video(session, |_frame: FrameRecord| {});

        assert_eq!(stats.processed_frames, 2);
        assert!(matches!(
            stats.decode_error,
            Some(PipelineError::FrameDecodeError { .. })
        ));
    }
}
