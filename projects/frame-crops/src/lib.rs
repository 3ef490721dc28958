//! Extracts frames from a folder of videos and optionally crops each frame
//! around an object described by a text prompt.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod video;

pub use config::JobConfig;
pub use error::PipelineError;
pub use pipeline::orchestrator::JobOrchestrator;
pub use pipeline::types::JobReport;
