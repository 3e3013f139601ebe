use crate::error::PipelineError;
use crate::inference::InferenceBackend;
use common::{Detection, DetectionBox};
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Single-model detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Path to ONNX model file
    pub model_path: String,

    /// Side of the square model input
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Minimum objectness, and minimum objectness x class score
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU above which overlapping boxes are suppressed
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum detections kept per pass after suppression
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
}

fn default_input_size() -> u32 {
    640
}

fn default_confidence() -> f32 {
    0.5
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    20
}

impl DetectorConfig {
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: default_input_size(),
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
        }
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }
}

/// Runs one detection model and turns its raw rows into [`Detection`]s.
///
/// Expected output layout is `[1, N, 5 + C]` with rows
/// `[cx, cy, w, h, objectness, class scores...]` in model-input pixels.
pub struct Detector {
    label: String,
    backend: Box<dyn InferenceBackend>,
    config: DetectorConfig,
}

impl Detector {
    pub fn new(
        label: impl Into<String>,
        backend: Box<dyn InferenceBackend>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            label: label.into(),
            backend,
            config,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Resize to the square model input and lay out as NCHW in [0, 1]
    pub fn preprocess(&self, img: &DynamicImage) -> Array<f32, IxDyn> {
        let size = self.config.input_size;
        let resized = img.resize_exact(size, size, image::imageops::FilterType::Triangle);
        let rgb_img = resized.to_rgb8();

        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));

        for (x, y, pixel) in rgb_img.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
            }
        }

        input
    }

    /// Threshold raw model rows and rescale them to the original image
    pub fn decode(
        &self,
        output: &Array<f32, IxDyn>,
        original_width: u32,
        original_height: u32,
    ) -> Result<Vec<Detection>, PipelineError> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[2] < 5 {
            return Err(PipelineError::inference(
                &self.label,
                format!("unexpected output shape {:?}, want [1, N, 5 + C]", shape),
            ));
        }

        let num_candidates = shape[1];
        let num_classes = shape[2] - 5;
        let threshold = self.config.confidence_threshold;
        let scale_x = original_width as f32 / self.config.input_size as f32;
        let scale_y = original_height as f32 / self.config.input_size as f32;

        let mut detections = Vec::new();

        for i in 0..num_candidates {
            let objectness = output[[0, i, 4]];
            if objectness.is_nan() || objectness <= threshold {
                continue;
            }

            // First maximum wins; a model without class columns is single-class
            let (class_id, class_score) = if num_classes == 0 {
                (0, 1.0)
            } else {
                let mut best = (0, output[[0, i, 5]]);
                for class_idx in 1..num_classes {
                    let score = output[[0, i, 5 + class_idx]];
                    if score > best.1 {
                        best = (class_idx, score);
                    }
                }
                best
            };

            let score = class_score * objectness;
            if score.is_nan() || score <= threshold {
                continue;
            }

            let bbox = DetectionBox::from_center(
                output[[0, i, 0]],
                output[[0, i, 1]],
                output[[0, i, 2]],
                output[[0, i, 3]],
            )
            .and_then(|b| b.scale(scale_x, scale_y));

            if let Some(bbox) = bbox {
                detections.push(Detection {
                    bbox,
                    score,
                    class_id,
                });
            }
        }

        Ok(detections)
    }

    /// Detect objects in a decoded image (before suppression)
    pub fn detect(&mut self, img: &DynamicImage) -> Result<Vec<Detection>, PipelineError> {
        let input = self.preprocess(img);
        let output = self.backend.run(input)?;
        let detections = self.decode(&output, img.width(), img.height())?;

        tracing::debug!(
            detector = %self.label,
            model = self.backend.model(),
            candidates = detections.len(),
            "detector pass complete"
        );

        Ok(detections)
    }

    /// Load an image from disk and detect objects in it
    pub fn detect_path(&mut self, path: &Path) -> Result<Vec<Detection>, PipelineError> {
        let img = image::open(path).map_err(|e| PipelineError::load(path.display().to_string(), e))?;
        self.detect(&img)
    }
}
