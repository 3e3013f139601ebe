use thiserror::Error;

/// Failures raised while driving the course and reading plates.
///
/// Only [`PipelineError::Connection`] and [`PipelineError::Actuation`] end a
/// mission; every other variant is confined to the frame or plate that
/// produced it.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Image, model or other resource could not be loaded or decoded
    #[error("failed to load {resource}: {reason}")]
    Load { resource: String, reason: String },

    /// Model session rejected the input or produced an unusable tensor
    #[error("inference failed in {model}: {reason}")]
    Inference { model: String, reason: String },

    #[error("ocr failed: {0}")]
    Ocr(String),

    /// OCR text does not fit the plate grammar
    #[error("could not parse correctly: {raw:?}")]
    Parse { raw: String },

    #[error("slot {slot} exceeds the {capacity} configured slots")]
    SlotOverflow { slot: i64, capacity: u32 },

    /// Persistent store unreachable or failing
    #[error("plate store connection failed: {0}")]
    Connection(String),

    #[error("actuation failed: {0}")]
    Actuation(String),

    /// Debug artifact could not be written
    #[error("failed to write {path}: {reason}")]
    Artifact { path: String, reason: String },
}

impl PipelineError {
    pub fn load(resource: impl Into<String>, reason: impl ToString) -> Self {
        Self::Load {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }

    pub fn inference(model: impl Into<String>, reason: impl ToString) -> Self {
        Self::Inference {
            model: model.into(),
            reason: reason.to_string(),
        }
    }

    pub fn artifact(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Artifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error must abort the mission rather than skip a frame
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Actuation(_))
    }

    /// Short label used for metrics and the mission summary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::Inference { .. } => "inference",
            Self::Ocr(_) => "ocr_failed",
            Self::Parse { .. } => "parse_failed",
            Self::SlotOverflow { .. } => "slot_overflow",
            Self::Connection(_) => "connection",
            Self::Actuation(_) => "actuation",
            Self::Artifact { .. } => "artifact",
        }
    }
}
