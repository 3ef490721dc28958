pub mod ffmpeg_reader;
pub mod processor;

use crate::catalog::VideoSource;
use crate::error::PipelineError;
use crate::pipeline::types::FrameRecord;
use anyhow::Result;
use image::RgbImage;

/// Sequential access to the decoded frames of one opened video.
pub trait VideoReader {
    /// Best-effort frame count from container metadata.
    fn frame_count_hint(&self) -> Option<usize>;

    /// Next frame in presentation order, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Opens videos. Every call starts a fresh read from the first frame.
pub trait FrameDecoder {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn VideoReader>, PipelineError>;
}

/// Pull-based iterator over the kept frames of a video.
///
/// Only the frame most recently yielded is alive, and the iterator stops for
/// good after the first decode error.
pub struct Frames {
    reader: Box<dyn VideoReader>,
    video_id: String,
    every_nth: usize,
    decoded: usize,
    kept: usize,
    done: bool,
}

impl Frames {
    pub fn new(reader: Box<dyn VideoReader>, video_id: &str, every_nth: usize) -> Self {
        Self {
            reader,
            video_id: video_id.to_string(),
            every_nth: every_nth.max(1),
            decoded: 0,
            kept: 0,
            done: false,
        }
    }

    /// Expected number of kept frames, if the container reports a frame count.
    pub fn len_hint(&self) -> Option<usize> {
        self.reader
            .frame_count_hint()
            .map(|n| n.div_ceil(self.every_nth))
    }
}

impl Iterator for Frames {
    type Item = Result<FrameRecord, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.reader.next_frame() {
                Ok(Some(image)) => {
                    let position = self.decoded;
                    self.decoded += 1;
                    if position % self.every_nth != 0 {
                        continue;
                    }

                    let index = self.kept;
                    self.kept += 1;
                    return Some(Ok(FrameRecord {
                        video_id: self.video_id.clone(),
                        index,
                        image,
                    }));
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(PipelineError::FrameDecodeError {
                        identifier: self.video_id.clone(),
                        index: self.kept,
                        reason: format!("{:#}", e),
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use anyhow::anyhow;
    use image::Rgb;
    use std::fs;

    /// Reader yielding `count` solid frames, optionally failing afterwards.
    pub struct SyntheticReader {
        pub count: usize,
        pub fail_after: bool,
        pub width: u32,
        pub height: u32,
        pub position: usize,
    }

    impl VideoReader for SyntheticReader {
        fn frame_count_hint(&self) -> Option<usize> {
            Some(self.count)
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            if self.position >= self.count {
                if self.fail_after {
                    return Err(anyhow!("corrupt packet"));
                }
                return Ok(None);
            }
            let shade = (self.position * 40 % 256) as u8;
            self.position += 1;
            Ok(Some(RgbImage::from_pixel(
                self.width,
                self.height,
                Rgb([shade, 255 - shade, 128]),
            )))
        }
    }

    /// Decoder for test fixtures. The fixture file holds the frame count, with a
    /// trailing `!` when decoding should fail after those frames, or `corrupt`
    /// when the file should not open at all.
    pub struct SyntheticDecoder {
        pub width: u32,
        pub height: u32,
    }

    impl Default for SyntheticDecoder {
        fn default() -> Self {
            Self {
                width: 64,
                height: 48,
            }
        }
    }

    impl FrameDecoder for SyntheticDecoder {
        fn open(&self, source: &VideoSource) -> Result<Box<dyn VideoReader>, PipelineError> {
            let open_error = |reason: String| PipelineError::DecodeOpenError {
                path: source.path.clone(),
                reason,
            };
            let content = fs::read_to_string(&source.path).map_err(|e| open_error(e.to_string()))?;
            let content = content.trim();
            let (digits, fail_after) = match content.strip_suffix('!') {
                Some(digits) => (digits, true),
                None => (content, false),
            };
            let count = digits
                .parse::<usize>()
                .map_err(|_| open_error("not a video container".to_string()))?;

            Ok(Box::new(SyntheticReader {
                count,
                fail_after,
                width: self.width,
                height: self.height,
                position: 0,
            }))
        }
    }

    pub fn reader(count: usize, fail_after: bool) -> Box<dyn VideoReader> {
        Box::new(SyntheticReader {
            count,
            fail_after,
            width: 8,
            height: 8,
            position: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::testing::reader;
    use super::*;

    #[test]
    fn test_frames_are_indexed_in_order() {
        let frames = Frames::new(reader(4, false), "clip", 1);
        let indices: Vec<usize> = frames.map(|f| f.unwrap().index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_every_nth_keeps_contiguous_indices() {
        let mut frames = Frames::new(reader(7, false), "clip", 3);
        assert_eq!(frames.len_hint(), Some(3));
        let kept: Vec<FrameRecord> = frames.by_ref().map(|f| f.unwrap()).collect();
        assert_eq!(kept.len(), 3);
        assert_eq!(
            kept.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(kept.iter().all(|f| f.video_id == "clip"));
    }

    #[test]
    fn test_decode_error_truncates() {
        let mut frames = Frames::new(reader(2, true), "clip", 1);
        assert!(frames.next().unwrap().is_ok());
        assert!(frames.next().unwrap().is_ok());
        match frames.next() {
            Some(Err(PipelineError::FrameDecodeError { index, .. })) => assert_eq!(index, 2),
            _ => panic!("expected a decode error"),
        }
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_empty_video() {
        let mut frames = Frames::new(reader(0, false), "empty", 1);
        assert!(frames.next().is_none());
        assert!(frames.next().is_none());
    }
}
