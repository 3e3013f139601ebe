//! Test doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use rover_service::{
    actuation::Actuator,
    camera::FrameSource,
    inference::{ExecutionProvider, InferenceBackend},
    ocr::OcrEngine,
    pipeline::{CascadeConfig, CascadePipeline, Detector, DetectorConfig},
    PipelineError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Backend returning the same `[1, N, 6]` rows on every call
pub struct ScriptedBackend {
    rows: Vec<[f32; 6]>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(rows: Vec<[f32; 6]>) -> Self {
        Self {
            rows,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl InferenceBackend for ScriptedBackend {
    fn model(&self) -> &str {
        "scripted"
    }

    fn execution_provider(&self) -> ExecutionProvider {
        ExecutionProvider::Cpu
    }

    fn run(&mut self, _input: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let flat: Vec<f32> = self.rows.iter().flatten().copied().collect();
        Array::from_shape_vec(IxDyn(&[1, self.rows.len(), 6]), flat)
            .map_err(|e| PipelineError::inference("scripted", e))
    }
}

/// Row `[cx, cy, w, h, objectness, class score]` for a single-class model
pub fn row(cx: f32, cy: f32, w: f32, h: f32, objectness: f32) -> [f32; 6] {
    [cx, cy, w, h, objectness, 1.0]
}

/// Cascade over scripted backends, with the call counters of both stages
pub fn cascade(
    vehicle_rows: Vec<[f32; 6]>,
    plate_rows: Vec<[f32; 6]>,
) -> (CascadePipeline, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    cascade_with(CascadeConfig::default(), vehicle_rows, plate_rows)
}

pub fn cascade_with(
    config: CascadeConfig,
    vehicle_rows: Vec<[f32; 6]>,
    plate_rows: Vec<[f32; 6]>,
) -> (CascadePipeline, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let vehicle_backend = ScriptedBackend::new(vehicle_rows);
    let plate_backend = ScriptedBackend::new(plate_rows);
    let vehicle_calls = vehicle_backend.calls.clone();
    let plate_calls = plate_backend.calls.clone();

    let pipeline = CascadePipeline::new(
        Detector::new(
            "vehicle",
            Box::new(vehicle_backend),
            DetectorConfig::new("vehicle.onnx"),
        ),
        Detector::new(
            "plate",
            Box::new(plate_backend),
            DetectorConfig::new("plate.onnx").with_max_detections(5),
        ),
        config,
    );

    (pipeline, vehicle_calls, plate_calls)
}

/// OCR returning scripted strings in order, then failing
pub struct ScriptedOcr {
    texts: VecDeque<String>,
}

impl ScriptedOcr {
    pub fn new(texts: &[&str]) -> Self {
        Self {
            texts: texts.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl OcrEngine for ScriptedOcr {
    fn read_text(&mut self, _plate: &DynamicImage) -> Result<String, PipelineError> {
        self.texts
            .pop_front()
            .ok_or_else(|| PipelineError::Ocr("no more scripted text".into()))
    }
}

/// Frame source yielding scripted captures, then end of stream
pub struct ScriptedFrames {
    frames: VecDeque<Result<DynamicImage, PipelineError>>,
}

impl ScriptedFrames {
    pub fn blank(count: usize, width: u32, height: u32) -> Self {
        Self {
            frames: (0..count)
                .map(|_| Ok(DynamicImage::new_rgb8(width, height)))
                .collect(),
        }
    }

    pub fn from_results(frames: Vec<Result<DynamicImage, PipelineError>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for ScriptedFrames {
    fn capture(&mut self) -> Result<Option<DynamicImage>, PipelineError> {
        self.frames.pop_front().transpose()
    }
}

/// Actuator that records every move and whether it was stopped
#[derive(Clone, Default)]
pub struct RecordingActuator {
    pub moves: Arc<Mutex<Vec<f64>>>,
    pub stopped: Arc<AtomicBool>,
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn drive(&mut self, distance: f64, _velocity: f64) -> Result<(), PipelineError> {
        self.moves.lock().unwrap().push(distance);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PipelineError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}
