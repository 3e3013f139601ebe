pub mod detections;
pub mod plate_store;
pub mod plates;

pub use detections::{Detection, DetectionBox, FrameContext, PixelRegion};
pub use plate_store::PlateStore;
pub use plates::{PlateRecord, PlateText, RecordOutcome};
