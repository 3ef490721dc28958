use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the extraction and cropping pipeline.
///
/// Only `InvalidInputPath`, `InvalidConfig`, `IdentifierCollision` and
/// `DetectorUnavailable` abort a job. Everything else is recorded against the
/// video or frame it happened on and the run carries on.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input path is not a readable directory: {0}")]
    InvalidInputPath(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Two sources map to the output identifier '{identifier}': {first} and {second}")]
    IdentifierCollision {
        identifier: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("Failed to open video {path}: {reason}")]
    DecodeOpenError { path: PathBuf, reason: String },

    #[error("Failed to decode frame {index} of '{identifier}': {reason}")]
    FrameDecodeError {
        identifier: String,
        index: usize,
        reason: String,
    },

    #[error("Failed to write {path}: {reason}")]
    EncodeWriteError { path: PathBuf, reason: String },

    #[error("Crop rectangle for frame {index} is empty after clamping")]
    DegenerateCrop { index: usize },

    #[error("Detection failed on frame {index}: {reason}")]
    Detection { index: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn read_missing(path: &std::path::Path) -> Result<Vec<u8>, PipelineError> {
        Ok(std::fs::read(path)?)
    }

    #[test]
    fn test_io_errors_convert() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_missing(&dir.path().join("nope")).unwrap_err();
        match err {
            PipelineError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_messages_name_the_location() {
        let err = PipelineError::EncodeWriteError {
            path: PathBuf::from("/out/frames/a/a_frame_000003.jpg"),
            reason: "disk full".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to write /out/frames/a/a_frame_000003.jpg: disk full"
        );
    }
}
