//! Model execution behind a single tensor-in/tensor-out interface.
//!
//! The detector and the OCR engine only see [`InferenceBackend`]; which
//! runtime or accelerator executes the graph is decided when the backend is
//! built.

pub mod ort_backend;

use crate::error::PipelineError;
use ndarray::{Array, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use ort_backend::{OrtBackend, OrtSessionConfig};

/// Runs a loaded model on a fixed-shape float tensor
pub trait InferenceBackend: Send {
    /// Label of the loaded model, used in logs and metrics
    fn model(&self) -> &str;

    /// Accelerator actually serving the model
    fn execution_provider(&self) -> ExecutionProvider;

    fn run(&mut self, input: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>, PipelineError>;
}

/// Acceleration backends, in order of preference when falling back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionProvider {
    #[serde(rename = "TensorRT")]
    TensorRt,
    #[serde(rename = "CUDA")]
    Cuda,
    #[default]
    #[serde(rename = "CPU")]
    Cpu,
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionProvider::TensorRt => write!(f, "TensorRT"),
            ExecutionProvider::Cuda => write!(f, "CUDA"),
            ExecutionProvider::Cpu => write!(f, "CPU"),
        }
    }
}

impl FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TENSORRT" | "TRT" => Ok(ExecutionProvider::TensorRt),
            "CUDA" | "GPU" => Ok(ExecutionProvider::Cuda),
            "CPU" => Ok(ExecutionProvider::Cpu),
            _ => Err(format!("Invalid execution provider: {}", s)),
        }
    }
}
