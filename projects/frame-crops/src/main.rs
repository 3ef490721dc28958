use anyhow::Result;
use frame_crops::cli::Args;
use frame_crops::config::Mode;
use frame_crops::pipeline::detection::build_detector;
use frame_crops::video::ffmpeg_reader::FfmpegDecoder;
use frame_crops::{JobOrchestrator, PipelineError};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse_args();
    let show_progress = !args.quiet;
    let config = args.into_job_config()?;
    config.validate()?;
    if !config.input_folder.is_dir() {
        return Err(PipelineError::InvalidInputPath(config.input_folder.clone()).into());
    }

    // Load the model up front so a missing detector fails before any extraction
    let detector = match config.mode {
        Mode::Crop => Some(build_detector(&config)?),
        Mode::Extract => None,
    };

    tracing::info!(
        "Starting {} job: {:?} -> {:?}",
        config.mode,
        config.input_folder,
        config.output_folder
    );

    let report = JobOrchestrator::new(&config, Box::new(FfmpegDecoder), detector)
        .with_progress(show_progress)
        .run()?;

    if report.completed() == 0 && !report.videos.is_empty() {
        tracing::warn!("No video was processed successfully");
    }

    Ok(())
}
