//! Rover plate survey
//!
//! Usage:
//!   rover-service run --frames-dir <dir>   - Drive the course and register plates
//!   rover-service list-plates              - Print the registered plates as JSON
//!   rover-service normalize <text>         - Normalize one OCR string

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rover_service::{
    actuation::SimulatedActuator,
    artifacts::ArtifactWriter,
    camera::ImageDirSource,
    inference::OrtBackend,
    mission::{Mission, MissionConfig},
    normalize,
    ocr::CtcOcrEngine,
    pipeline::{CascadePipeline, Detector},
    store::{list_plates as list_registered, open_store},
    RegistryService, RoverConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "rover-service")]
#[command(about = "Parking survey rover: detects, reads and registers plates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the course and register every new plate
    Run {
        /// Directory of captured frames replayed as the camera feed
        #[arg(long, env = "ROVER_FRAMES_DIR")]
        frames_dir: PathBuf,

        /// Course length in metres
        #[arg(long, env = "ROVER_TOTAL_DISTANCE", default_value_t = 10.0)]
        total_distance: f64,

        /// Number of parking slots along the course
        #[arg(long, env = "ROVER_NUM_SLOTS", default_value_t = 5)]
        num_slots: u32,

        /// Drive speed in m/s
        #[arg(long, env = "ROVER_VELOCITY", default_value_t = 1.0)]
        velocity: f64,

        /// Distance between capture points in metres
        #[arg(long, env = "ROVER_SEGMENT_DISTANCE", default_value_t = 1.0)]
        segment_distance: f64,

        /// Abort the drive after this many seconds
        #[arg(long, env = "ROVER_MISSION_TIMEOUT_SECS", default_value_t = 120)]
        mission_timeout_secs: u64,
    },

    /// Print all registered plates as JSON
    ListPlates,

    /// Normalize a raw OCR string and print the canonical plate
    Normalize {
        /// Raw OCR text
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_with_service("rover-service");

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            frames_dir,
            total_distance,
            num_slots,
            velocity,
            segment_distance,
            mission_timeout_secs,
        } => {
            let mission_config = MissionConfig {
                total_distance,
                num_slots,
                velocity,
                segment_distance,
                mission_timeout: Duration::from_secs(mission_timeout_secs),
            };
            run(frames_dir, mission_config).await?;
        }
        Commands::ListPlates => list_plates().await?,
        Commands::Normalize { text } => {
            let plate = normalize(&text)?;
            println!("{}", plate);
        }
    }

    Ok(())
}

async fn run(frames_dir: PathBuf, mission_config: MissionConfig) -> Result<()> {
    mission_config.validate()?;
    let config = RoverConfig::from_env().context("Failed to load rover configuration")?;

    info!(
        vehicle_model = %config.vehicle.model_path,
        plate_model = %config.plate.model_path,
        ocr_model = %config.ocr.model_path,
        provider = %config.session.execution_provider,
        store = ?config.store_type,
        "rover configuration loaded"
    );

    let vehicle = Detector::new(
        "vehicle",
        Box::new(OrtBackend::load(&config.vehicle.model_path, &config.session)?),
        config.vehicle.clone(),
    );
    let plate = Detector::new(
        "plate",
        Box::new(OrtBackend::load(&config.plate.model_path, &config.session)?),
        config.plate.clone(),
    );
    let pipeline = CascadePipeline::new(vehicle, plate, config.cascade.clone());

    let ocr = CtcOcrEngine::new(
        Box::new(OrtBackend::load(&config.ocr.model_path, &config.session)?),
        config.ocr.clone(),
    );

    let frames = ImageDirSource::open(&frames_dir)?;
    // fallible setup runs before the store opens
    let artifacts = config
        .artifact_dir
        .as_ref()
        .map(ArtifactWriter::new)
        .transpose()?;
    let store = open_store(&config).await?;
    let registry = RegistryService::new(store);

    let mut mission = Mission::new(
        pipeline,
        Box::new(ocr),
        registry,
        Box::new(SimulatedActuator::new(config.actuator_time_scale)),
        Box::new(frames),
        mission_config,
    );
    if let Some(writer) = artifacts {
        mission = mission.with_artifacts(writer);
    }
    if let Some(path) = &config.metrics_file {
        mission = mission.with_metrics_file(path);
    }

    let summary = mission.run().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

async fn list_plates() -> Result<()> {
    let config = RoverConfig::from_env().context("Failed to load rover configuration")?;
    let store = open_store(&config).await?;

    let plates = list_registered(store.as_ref())
        .await
        .context("Failed to list plates")?;
    info!("{} plates registered", plates.len());
    println!("{}", serde_json::to_string_pretty(&plates)?);

    Ok(())
}
