use crate::config::ImageFormat;
use crate::error::PipelineError;
use image::RgbImage;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

/// Writes images as `<root>/<id>/<id>_frame_<index:06>[<suffix>].<ext>`.
///
/// Used for raw frames under `frames/` and for crops under `cropped/`.
#[derive(Debug, Clone)]
pub struct FrameWriter {
    root: PathBuf,
    format: ImageFormat,
}

impl FrameWriter {
    pub fn new(root: impl Into<PathBuf>, format: ImageFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    pub fn video_dir(&self, video_id: &str) -> PathBuf {
        self.root.join(video_id)
    }

    pub fn frame_path(&self, video_id: &str, index: usize, suffix: &str) -> PathBuf {
        let filename = format!(
            "{}_frame_{:06}{}.{}",
            video_id,
            index,
            suffix,
            self.format.extension()
        );
        self.video_dir(video_id).join(filename)
    }

    /// Encodes `image` and places it at its final path.
    ///
    /// The encoded bytes go to a hidden temp file that is renamed into place,
    /// so an interrupted run never leaves a truncated image behind. An
    /// existing file at the same path is replaced.
    pub fn write(
        &self,
        video_id: &str,
        index: usize,
        suffix: &str,
        image: &RgbImage,
    ) -> Result<PathBuf, PipelineError> {
        let path = self.frame_path(video_id, index, suffix);
        let write_error = |reason: String| PipelineError::EncodeWriteError {
            path: path.clone(),
            reason,
        };

        let mut encoded = Cursor::new(Vec::new());
        image
            .write_to(&mut encoded, self.format.as_image_format())
            .map_err(|e| write_error(e.to_string()))?;

        let dir = self.video_dir(video_id);
        fs::create_dir_all(&dir).map_err(|e| write_error(e.to_string()))?;

        let tmp_path = match path.file_name().and_then(|s| s.to_str()) {
            Some(name) => dir.join(format!(".{}.part", name)),
            None => return Err(write_error("invalid output filename".to_string())),
        };
        fs::write(&tmp_path, encoded.get_ref()).map_err(|e| write_error(e.to_string()))?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(write_error(e.to_string()));
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_frame_path_naming() {
        let writer = FrameWriter::new("/out/frames", ImageFormat::Jpg);
        assert_eq!(
            writer.frame_path("a", 2, ""),
            PathBuf::from("/out/frames/a/a_frame_000002.jpg")
        );
        assert_eq!(
            writer.frame_path("a", 7, "_box01"),
            PathBuf::from("/out/frames/a/a_frame_000007_box01.jpg")
        );
        // Indices past six digits widen the field instead of wrapping
        assert_eq!(
            writer.frame_path("a", 1_234_567, ""),
            PathBuf::from("/out/frames/a/a_frame_1234567.jpg")
        );
    }

    #[test]
    fn test_write_creates_dir_and_decodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FrameWriter::new(dir.path().join("frames"), ImageFormat::Png);
        let image = RgbImage::from_pixel(4, 3, Rgb([10, 20, 30]));

        let path = writer.write("clip", 0, "", &image).unwrap();
        assert_eq!(path, dir.path().join("frames/clip/clip_frame_000000.png"));

        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(1, 1), &Rgb([10, 20, 30]));

        // No temp files left behind
        let names: Vec<_> = fs::read_dir(dir.path().join("frames/clip"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_write_overwrites_identically() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FrameWriter::new(dir.path(), ImageFormat::Jpg);
        let image = RgbImage::from_pixel(8, 8, Rgb([200, 100, 0]));

        let path = writer.write("clip", 3, "", &image).unwrap();
        let first = fs::read(&path).unwrap();
        writer.write("clip", 3, "", &image).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the video folder should be
        fs::write(dir.path().join("clip"), b"").unwrap();
        let writer = FrameWriter::new(dir.path(), ImageFormat::Jpg);
        let image = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));

        let err = writer.write("clip", 0, "", &image).unwrap_err();
        assert!(matches!(err, PipelineError::EncodeWriteError { .. }));
    }
}
