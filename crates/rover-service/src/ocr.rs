//! Plate text recognition.

use crate::error::PipelineError;
use crate::inference::InferenceBackend;
use image::{DynamicImage, GrayImage, Luma};
use ndarray::{Array, IxDyn};
use serde::{Deserialize, Serialize};

/// Reads raw text from a cropped plate image
pub trait OcrEngine: Send {
    fn read_text(&mut self, plate: &DynamicImage) -> Result<String, PipelineError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Path to the recognizer ONNX model file
    pub model_path: String,

    /// OCR model input width
    #[serde(default = "default_input_width")]
    pub input_width: u32,

    /// OCR model input height
    #[serde(default = "default_input_height")]
    pub input_height: u32,

    /// Characters for output indices 1..; index 0 is the CTC blank
    #[serde(default = "default_char_vocab")]
    pub char_vocab: String,

    /// Gaussian blur sigma applied before binarization
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,

    /// Binarize the plate with an Otsu threshold before recognition
    #[serde(default = "default_binarize")]
    pub binarize: bool,
}

fn default_input_width() -> u32 {
    200
}

fn default_input_height() -> u32 {
    64
}

fn default_char_vocab() -> String {
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-".to_string()
}

fn default_blur_sigma() -> f32 {
    1.0
}

fn default_binarize() -> bool {
    true
}

impl OcrConfig {
    pub fn new(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            input_width: default_input_width(),
            input_height: default_input_height(),
            char_vocab: default_char_vocab(),
            blur_sigma: default_blur_sigma(),
            binarize: default_binarize(),
        }
    }
}

/// Grayscale, blur, then Otsu-threshold a plate crop
pub fn preprocess_plate(plate: &DynamicImage, blur_sigma: f32) -> GrayImage {
    let gray = plate.to_luma8();
    let blurred = if blur_sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(&gray, blur_sigma)
    } else {
        gray
    };

    let level = imageproc::contrast::otsu_level(&blurred);
    let mut binary = blurred;
    for pixel in binary.pixels_mut() {
        *pixel = if pixel[0] > level { Luma([255]) } else { Luma([0]) };
    }
    binary
}

/// CTC recognizer running on an [`InferenceBackend`]
pub struct CtcOcrEngine {
    backend: Box<dyn InferenceBackend>,
    config: OcrConfig,
    vocab: Vec<char>,
}

impl CtcOcrEngine {
    pub fn new(backend: Box<dyn InferenceBackend>, config: OcrConfig) -> Self {
        let vocab = config.char_vocab.chars().collect();
        Self {
            backend,
            config,
            vocab,
        }
    }

    /// Lay out a plate crop as `[1, 1, height, width]` in [0, 1]
    pub fn preprocess(&self, plate: &DynamicImage) -> Array<f32, IxDyn> {
        let width = self.config.input_width;
        let height = self.config.input_height;

        let gray = if self.config.binarize {
            preprocess_plate(plate, self.config.blur_sigma)
        } else {
            plate.to_luma8()
        };
        let resized = image::imageops::resize(
            &gray,
            width,
            height,
            image::imageops::FilterType::Triangle,
        );

        let mut input = Array::zeros(IxDyn(&[1, 1, height as usize, width as usize]));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        }

        input
    }

    /// Greedy CTC decoding of `[1, T, V]` scores
    pub fn ctc_decode(&self, output: &Array<f32, IxDyn>) -> Result<String, PipelineError> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[2] == 0 {
            return Err(PipelineError::Ocr(format!(
                "unexpected recognizer output shape {:?}",
                shape
            )));
        }

        let sequence_length = shape[1];
        let vocab_size = shape[2];

        let mut result = String::new();
        let mut prev_idx = 0;

        for t in 0..sequence_length {
            let mut max_prob = output[[0, t, 0]];
            let mut max_idx = 0;

            for c in 1..vocab_size {
                let prob = output[[0, t, c]];
                if prob > max_prob {
                    max_prob = prob;
                    max_idx = c;
                }
            }

            // skip blanks and repeats
            if max_idx > 0 && max_idx != prev_idx {
                if let Some(&ch) = self.vocab.get(max_idx - 1) {
                    result.push(ch);
                }
            }

            prev_idx = max_idx;
        }

        Ok(result)
    }
}

impl OcrEngine for CtcOcrEngine {
    fn read_text(&mut self, plate: &DynamicImage) -> Result<String, PipelineError> {
        let input = self.preprocess(plate);
        let output = self.backend.run(input).map_err(|e| match e {
            PipelineError::Inference { reason, .. } => PipelineError::Ocr(reason),
            other => other,
        })?;
        self.ctc_decode(&output)
    }
}
