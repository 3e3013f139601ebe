use super::detector::Detector;
use super::nms::suppress_per_class;
use crate::error::PipelineError;
use common::Detection;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Vehicle-model class ids treated as vehicles
    #[serde(default = "default_vehicle_class_ids")]
    pub vehicle_class_ids: Vec<usize>,
}

fn default_vehicle_class_ids() -> Vec<usize> {
    vec![0]
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            vehicle_class_ids: default_vehicle_class_ids(),
        }
    }
}

/// A retained vehicle and the plates found inside it
#[derive(Debug, Clone, PartialEq)]
pub struct VehiclePlates {
    pub vehicle: Detection,
    /// Plate boxes in frame coordinates
    pub plates: Vec<Detection>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeOutput {
    pub vehicles: Vec<VehiclePlates>,
}

impl CascadeOutput {
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn plate_count(&self) -> usize {
        self.vehicles.iter().map(|v| v.plates.len()).sum()
    }

    pub fn plates(&self) -> impl Iterator<Item = &Detection> {
        self.vehicles.iter().flat_map(|v| v.plates.iter())
    }
}

/// Vehicle detection on the full frame, then plate detection on each vehicle crop
pub struct CascadePipeline {
    vehicle: Detector,
    plate: Detector,
    config: CascadeConfig,
}

impl CascadePipeline {
    pub fn new(vehicle: Detector, plate: Detector, config: CascadeConfig) -> Self {
        Self {
            vehicle,
            plate,
            config,
        }
    }

    pub fn infer(&mut self, frame: &DynamicImage) -> Result<CascadeOutput, PipelineError> {
        let vehicles: Vec<Detection> = run_pass(&mut self.vehicle, frame)?
            .into_iter()
            .filter(|d| self.config.vehicle_class_ids.contains(&d.class_id))
            .collect();

        telemetry::metrics::ROVER_DETECTIONS
            .with_label_values(&["vehicle"])
            .inc_by(vehicles.len() as u64);

        if vehicles.is_empty() {
            return Ok(CascadeOutput::default());
        }

        let mut output = CascadeOutput::default();

        for vehicle in vehicles {
            let Some(region) = vehicle.bbox.clamp_to(frame.width(), frame.height()) else {
                tracing::debug!(bbox = ?vehicle.bbox, "vehicle crop is empty, skipping");
                output.vehicles.push(VehiclePlates {
                    vehicle,
                    plates: Vec::new(),
                });
                continue;
            };

            let crop = frame.crop_imm(region.x, region.y, region.width, region.height);
            let plates: Vec<Detection> = run_pass(&mut self.plate, &crop)?
                .into_iter()
                .map(|mut plate| {
                    plate.bbox = plate.bbox.translate(region.x as f32, region.y as f32);
                    plate
                })
                .collect();

            telemetry::metrics::ROVER_DETECTIONS
                .with_label_values(&["plate"])
                .inc_by(plates.len() as u64);

            output.vehicles.push(VehiclePlates { vehicle, plates });
        }

        Ok(output)
    }
}

/// Detect, suppress per class, then cap the survivors
fn run_pass(detector: &mut Detector, img: &DynamicImage) -> Result<Vec<Detection>, PipelineError> {
    let iou_threshold = detector.config().iou_threshold;
    let max_detections = detector.config().max_detections;

    let mut kept = suppress_per_class(detector.detect(img)?, iou_threshold);
    kept.truncate(max_detections);
    Ok(kept)
}
