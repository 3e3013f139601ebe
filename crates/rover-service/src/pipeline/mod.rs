//! Two-stage detection: vehicles first, then plates inside each vehicle.

pub mod cascade;
pub mod detector;
pub mod nms;

pub use cascade::{CascadeConfig, CascadeOutput, CascadePipeline, VehiclePlates};
pub use detector::{Detector, DetectorConfig};
pub use nms::{iou, suppress, suppress_per_class};
