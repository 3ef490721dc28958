use super::{FrameDecoder, VideoReader};
use crate::catalog::VideoSource;
use crate::error::PipelineError;
use anyhow::{anyhow, Context, Result};
use ffmpeg_next::ffi;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ffmpeg_next::util::frame::Video as VideoFrame;
use image::RgbImage;
use std::path::Path;

/// Opens sources with [`FfmpegReader`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegDecoder;

impl FrameDecoder for FfmpegDecoder {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn VideoReader>, PipelineError> {
        let reader =
            FfmpegReader::new(&source.path).map_err(|e| PipelineError::DecodeOpenError {
                path: source.path.clone(),
                reason: format!("{:#}", e),
            })?;
        Ok(Box::new(reader))
    }
}

/// Video reader backed by FFmpeg via ffmpeg-next, software decoding to RGB24.
pub struct FfmpegReader {
    input_ctx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    video_stream_index: usize,
    /// Created on the first frame, rebuilt if the source format or size changes.
    scaler: Option<(scaling::Context, Pixel, u32, u32)>,
    total_frames: Option<usize>,
    packet: ffmpeg_next::codec::packet::Packet,
    /// Whether we've sent EOF to the decoder.
    eof_sent: bool,
}

impl FfmpegReader {
    pub fn new(path: &Path) -> Result<Self> {
        ffmpeg_next::init().context("Failed to initialize FFmpeg")?;

        if !path.exists() {
            return Err(anyhow!("Video file not found: {:?}", path));
        }

        let input_ctx = ffmpeg_next::format::input(&path).context("Failed to open video file")?;

        let video_stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| anyhow!("No video stream found in {:?}", path))?;

        let video_stream_index = video_stream.index();

        let rational_fps = video_stream.avg_frame_rate();
        let source_fps = if rational_fps.denominator() > 0 {
            rational_fps.numerator() as f64 / rational_fps.denominator() as f64
        } else {
            0.0
        };

        let stream_frames = video_stream.frames().max(0) as usize;
        let duration_secs = input_ctx.duration().max(0) as f64 / ffi::AV_TIME_BASE as f64;
        let total_frames = if stream_frames > 0 {
            Some(stream_frames)
        } else if source_fps > 0.0 && duration_secs > 0.0 {
            Some((duration_secs * source_fps).round() as usize)
        } else {
            None
        };

        let decoder_ctx =
            ffmpeg_next::codec::context::Context::from_parameters(video_stream.parameters())
                .context("Failed to create decoder context")?;
        let decoder = decoder_ctx
            .decoder()
            .video()
            .context("Failed to open video decoder")?;

        tracing::info!(
            "FfmpegReader: opened {:?}, {}x{}, duration={:.2}s, fps={:.2}, frames={:?}",
            path,
            decoder.width(),
            decoder.height(),
            duration_secs,
            source_fps,
            total_frames
        );

        Ok(Self {
            input_ctx,
            decoder,
            video_stream_index,
            scaler: None,
            total_frames,
            packet: ffmpeg_next::codec::packet::Packet::empty(),
            eof_sent: false,
        })
    }

    /// Pulls the next decoded frame into `target`. Returns `false` at end of stream.
    fn decode_loop(&mut self, target: &mut VideoFrame) -> Result<bool> {
        loop {
            // 1. Try to receive a decoded frame
            match self.decoder.receive_frame(target) {
                Ok(()) => return Ok(true),
                Err(ffmpeg_next::Error::Other { errno: ffi::EAGAIN }) => {
                    if self.eof_sent {
                        return Ok(false);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(false),
                Err(e) => return Err(anyhow!("Decoder error: {}", e)),
            }

            // 2. Feed packets until we find a video packet OR reach EOF
            let mut found_packet = false;
            loop {
                match self.packet.read(&mut self.input_ctx) {
                    Ok(()) => {
                        if self.packet.stream() == self.video_stream_index {
                            self.decoder
                                .send_packet(&self.packet)
                                .context("Failed to send packet to decoder")?;
                            found_packet = true;
                            break;
                        }
                    }
                    Err(ffmpeg_next::Error::Eof) => break,
                    Err(e) => return Err(anyhow!("Failed to read packet: {}", e)),
                }
            }

            if !found_packet {
                // End of input: flush whatever the decoder still holds
                self.decoder
                    .send_eof()
                    .context("Failed to send EOF to decoder")?;
                self.eof_sent = true;
            }
        }
    }

    fn to_rgb(&mut self, frame: &VideoFrame) -> Result<RgbImage> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        let stale = match &self.scaler {
            Some((_, f, w, h)) => *f != format || *w != width || *h != height,
            None => true,
        };
        if stale {
            let ctx = scaling::Context::get(
                format,
                width,
                height,
                Pixel::RGB24,
                width,
                height,
                scaling::Flags::BILINEAR,
            )
            .context("Failed to create scaler")?;
            self.scaler = Some((ctx, format, width, height));
        }

        let mut rgb_frame = VideoFrame::empty();
        if let Some((scaler, ..)) = self.scaler.as_mut() {
            scaler
                .run(frame, &mut rgb_frame)
                .context("Scaler failed")?;
        }

        rgb_frame_to_image(&rgb_frame)
    }
}

/// Copies an RGB24 frame into an owned image, dropping the row padding.
fn rgb_frame_to_image(frame: &VideoFrame) -> Result<RgbImage> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride(0);
    let data = frame.data(0);
    let row_bytes = width * 3;

    let mut buffer = Vec::with_capacity(row_bytes * height);
    for y in 0..height {
        let offset = y * stride;
        let row = data
            .get(offset..offset + row_bytes)
            .ok_or_else(|| anyhow!("Frame buffer shorter than {}x{}", width, height))?;
        buffer.extend_from_slice(row);
    }

    RgbImage::from_raw(width as u32, height as u32, buffer)
        .ok_or_else(|| anyhow!("Failed to create RgbImage from frame data"))
}

impl VideoReader for FfmpegReader {
    fn frame_count_hint(&self) -> Option<usize> {
        self.total_frames
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut decoded = VideoFrame::empty();
        if !self.decode_loop(&mut decoded)? {
            return Ok(None);
        }
        self.to_rgb(&decoded).map(Some)
    }
}
