//! ONNX Runtime backend with TensorRT -> CUDA -> CPU fallback

use super::{ExecutionProvider, InferenceBackend};
use crate::error::PipelineError;
use anyhow::{Context, Result};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{
        CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
        TensorRTExecutionProvider,
    },
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Output tensor names tried in order; YOLO exports use `output0`
const OUTPUT_NAMES: [&str; 4] = ["output0", "output", "logits", "boxes"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrtSessionConfig {
    /// Preferred execution provider (falls back towards CPU)
    #[serde(default)]
    pub execution_provider: ExecutionProvider,

    /// GPU device ID (0, 1, 2, etc.)
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    /// Number of inter-operation threads
    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl Default for OrtSessionConfig {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::default(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }
}

pub struct OrtBackend {
    model: String,
    session: Session,
    provider: ExecutionProvider,
}

impl OrtBackend {
    /// Load a model file, trying the preferred provider first
    pub fn load(model_path: &str, config: &OrtSessionConfig) -> Result<Self, PipelineError> {
        let (session, provider) = create_session(model_path, config, config.execution_provider)
            .map_err(|e| PipelineError::load(model_path, format!("{:#}", e)))?;

        tracing::info!(
            model = model_path,
            provider = %provider,
            device = config.device_id,
            "model session ready"
        );

        Ok(Self {
            model: model_path.to_string(),
            session,
            provider,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn model(&self) -> &str {
        &self.model
    }

    fn execution_provider(&self) -> ExecutionProvider {
        self.provider
    }

    fn run(&mut self, input: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>, PipelineError> {
        let input_tensor =
            Value::from_array(input).map_err(|e| PipelineError::inference(&self.model, e))?;

        let inference_start = Instant::now();
        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| PipelineError::inference(&self.model, e))?;
        let inference_time = inference_start.elapsed();

        let provider = self.provider.to_string();
        telemetry::metrics::ROVER_INFERENCE_TIME
            .with_label_values(&[self.model.as_str(), provider.as_str()])
            .observe(inference_time.as_secs_f64());

        let output_value = OUTPUT_NAMES
            .iter()
            .find_map(|name| outputs.get(*name))
            .ok_or_else(|| {
                PipelineError::inference(
                    &self.model,
                    format!("no output tensor found (tried: {})", OUTPUT_NAMES.join(", ")),
                )
            })?;
        let (shape, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::inference(&self.model, e))?;

        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())
            .map_err(|e| PipelineError::inference(&self.model, e))
    }
}

fn create_session(
    model_path: &str,
    config: &OrtSessionConfig,
    provider: ExecutionProvider,
) -> Result<(Session, ExecutionProvider)> {
    tracing::info!("Attempting {} for {}", provider, model_path);
    match build_session(model_path, config, provider_chain(provider, config.device_id)) {
        Ok(session) => Ok((session, provider)),
        Err(e) => match fallback(provider) {
            Some(next) => {
                tracing::warn!("{} failed, trying {}: {:#}", provider, next, e);
                create_session(model_path, config, next)
            }
            None => Err(e),
        },
    }
}

fn fallback(provider: ExecutionProvider) -> Option<ExecutionProvider> {
    match provider {
        ExecutionProvider::TensorRt => Some(ExecutionProvider::Cuda),
        ExecutionProvider::Cuda => Some(ExecutionProvider::Cpu),
        ExecutionProvider::Cpu => None,
    }
}

/// Providers registered on the session, most preferred first
fn provider_chain(provider: ExecutionProvider, device_id: i32) -> Vec<ExecutionProviderDispatch> {
    let mut chain = Vec::with_capacity(3);
    if provider == ExecutionProvider::TensorRt {
        chain.push(
            TensorRTExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
        );
    }
    if provider != ExecutionProvider::Cpu {
        chain.push(
            CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
        );
    }
    chain.push(CPUExecutionProvider::default().build());
    chain
}

fn build_session(
    model_path: &str,
    config: &OrtSessionConfig,
    providers: Vec<ExecutionProviderDispatch>,
) -> Result<Session> {
    Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(config.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(config.inter_threads)
        .context("Failed to set inter threads")?
        .with_execution_providers(providers)
        .context("Failed to set execution providers")?
        .commit_from_file(model_path)
        .context("Failed to load model from file")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_defaults() {
        let config = OrtSessionConfig::default();
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.device_id, 0);
        assert_eq!(config.intra_threads, 4);
        assert_eq!(config.inter_threads, 1);
    }

    #[test]
    fn test_provider_fallback_order() {
        assert_eq!(fallback(ExecutionProvider::TensorRt), Some(ExecutionProvider::Cuda));
        assert_eq!(fallback(ExecutionProvider::Cuda), Some(ExecutionProvider::Cpu));
        assert_eq!(fallback(ExecutionProvider::Cpu), None);

        assert_eq!(provider_chain(ExecutionProvider::TensorRt, 0).len(), 3);
        assert_eq!(provider_chain(ExecutionProvider::Cuda, 0).len(), 2);
        assert_eq!(provider_chain(ExecutionProvider::Cpu, 0).len(), 1);
    }

    #[test]
    fn test_missing_model_is_a_load_error() {
        let result = OrtBackend::load("models/does_not_exist.onnx", &OrtSessionConfig::default());
        match result {
            Err(PipelineError::Load { resource, .. }) => {
                assert_eq!(resource, "models/does_not_exist.onnx")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("loading a missing model must fail"),
        }
    }
}
