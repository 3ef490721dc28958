// Frame extraction and cropping stages

pub mod crop;
pub mod detection;
pub mod orchestrator;
pub mod types;
pub mod writer;
