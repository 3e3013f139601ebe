use crate::inference::{ExecutionProvider, OrtSessionConfig};
use crate::ocr::OcrConfig;
use crate::pipeline::{CascadeConfig, DetectorConfig};
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreType {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StoreType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(StoreType::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StoreType::Postgres),
            _ => Err(format!("Invalid plate store type: {}", s)),
        }
    }
}

/// Models, store and output settings for one rover process
#[derive(Debug, Clone)]
pub struct RoverConfig {
    pub vehicle: DetectorConfig,
    pub plate: DetectorConfig,
    pub ocr: OcrConfig,
    pub cascade: CascadeConfig,
    pub session: OrtSessionConfig,

    pub store_type: StoreType,
    pub database_url: Option<String>,
    pub store_connect_timeout: Duration,

    /// Directory for annotated frames and plate crops (disabled when unset)
    pub artifact_dir: Option<PathBuf>,

    /// File receiving the Prometheus text dump at mission end
    pub metrics_file: Option<PathBuf>,

    /// Multiplier on simulated drive time; 0 drives instantly
    pub actuator_time_scale: f64,
}

impl RoverConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key/value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mut vehicle = DetectorConfig::new(get("VEHICLE_MODEL_PATH", "models/vehicle.onnx"));
        vehicle.confidence_threshold = parse_var(&lookup, "VEHICLE_CONFIDENCE", 0.5)?;
        vehicle.iou_threshold = parse_var(&lookup, "VEHICLE_IOU_THRESHOLD", 0.45)?;
        vehicle.max_detections = parse_var(&lookup, "VEHICLE_MAX_DETECTIONS", 20)?;

        let mut plate = DetectorConfig::new(get("PLATE_MODEL_PATH", "models/plate.onnx"));
        plate.confidence_threshold = parse_var(&lookup, "PLATE_CONFIDENCE", 0.5)?;
        plate.iou_threshold = parse_var(&lookup, "PLATE_IOU_THRESHOLD", 0.45)?;
        plate.max_detections = parse_var(&lookup, "PLATE_MAX_DETECTIONS", 5)?;

        let mut ocr = OcrConfig::new(get("OCR_MODEL_PATH", "models/ocr.onnx"));
        ocr.binarize = parse_var(&lookup, "OCR_BINARIZE", true)?;

        let cascade = match lookup("VEHICLE_CLASS_IDS") {
            Some(ids) => CascadeConfig {
                vehicle_class_ids: parse_class_ids(&ids)?,
            },
            None => CascadeConfig::default(),
        };

        let session = OrtSessionConfig {
            execution_provider: parse_var(
                &lookup,
                "ROVER_EXECUTION_PROVIDER",
                ExecutionProvider::Cpu,
            )?,
            device_id: parse_var(&lookup, "ROVER_DEVICE_ID", 0)?,
            intra_threads: parse_var(&lookup, "ROVER_INTRA_THREADS", 4)?,
            inter_threads: parse_var(&lookup, "ROVER_INTER_THREADS", 1)?,
        };

        let store_type = parse_var(&lookup, "PLATE_STORE_TYPE", StoreType::Memory)?;
        let database_url = lookup("DATABASE_URL");
        if store_type == StoreType::Postgres && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL must be set when PLATE_STORE_TYPE=postgres"));
        }

        let timeout_secs: u64 = parse_var(&lookup, "STORE_CONNECT_TIMEOUT_SECS", 5)?;

        Ok(Self {
            vehicle,
            plate,
            ocr,
            cascade,
            session,
            store_type,
            database_url,
            store_connect_timeout: Duration::from_secs(timeout_secs),
            artifact_dir: lookup("ARTIFACT_DIR").map(PathBuf::from),
            metrics_file: lookup("METRICS_FILE").map(PathBuf::from),
            actuator_time_scale: parse_var(&lookup, "ACTUATOR_TIME_SCALE", 1.0)?,
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("Invalid {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn parse_class_ids(raw: &str) -> Result<Vec<usize>> {
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .with_context(|| format!("Invalid VEHICLE_CLASS_IDS entry: {:?}", s))
        })
        .collect::<Result<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(anyhow!("VEHICLE_CLASS_IDS must name at least one class"));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<RoverConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RoverConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.vehicle.model_path, "models/vehicle.onnx");
        assert_eq!(config.vehicle.max_detections, 20);
        assert_eq!(config.plate.max_detections, 5);
        assert_eq!(config.cascade.vehicle_class_ids, vec![0]);
        assert_eq!(config.session.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.store_type, StoreType::Memory);
        assert_eq!(config.store_connect_timeout, Duration::from_secs(5));
        assert!(config.artifact_dir.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("ROVER_EXECUTION_PROVIDER", "tensorrt"),
            ("VEHICLE_CLASS_IDS", "2, 5,7"),
            ("PLATE_STORE_TYPE", "postgres"),
            ("DATABASE_URL", "postgres://rover@localhost/plates"),
            ("STORE_CONNECT_TIMEOUT_SECS", "2"),
            ("ARTIFACT_DIR", "/tmp/rover-debug"),
        ])
        .unwrap();

        assert_eq!(config.session.execution_provider, ExecutionProvider::TensorRt);
        assert_eq!(config.cascade.vehicle_class_ids, vec![2, 5, 7]);
        assert_eq!(config.store_type, StoreType::Postgres);
        assert_eq!(config.store_connect_timeout, Duration::from_secs(2));
        assert_eq!(config.artifact_dir, Some(PathBuf::from("/tmp/rover-debug")));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("ROVER_EXECUTION_PROVIDER", "vulkan")]).is_err());
        assert!(config_from(&[("VEHICLE_CLASS_IDS", "car")]).is_err());
        assert!(config_from(&[("VEHICLE_CLASS_IDS", " , ")]).is_err());
        assert!(config_from(&[("PLATE_STORE_TYPE", "postgres")]).is_err());
        assert!(config_from(&[("STORE_CONNECT_TIMEOUT_SECS", "-1")]).is_err());
    }
}
