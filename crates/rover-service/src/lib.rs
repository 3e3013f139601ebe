pub mod actuation;
pub mod artifacts;
pub mod camera;
pub mod config;
pub mod error;
pub mod inference;
pub mod mission;
pub mod normalizer;
pub mod ocr;
pub mod pipeline;
pub mod registry;
pub mod store;

pub use config::RoverConfig;
pub use error::PipelineError;
pub use mission::{Mission, MissionConfig, MissionError, MissionSummary};
pub use normalizer::normalize;
pub use registry::{assign_slot, RegistryService};
