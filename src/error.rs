//! Error taxonomy for the analysis pipeline and the album rule engine.
//!
//! Most of these never reach a caller: the analyzer and the engine catch them,
//! log them and degrade to an empty result. Only invalid arguments (unknown
//! rule keys, bad configuration) are surfaced.

use thiserror::Error;

/// Failure reported by a [`Classifier`](crate::vision::Classifier).
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// No learned model is loaded. Detectors switch to their heuristic path.
    #[error("classifier unavailable: {0}")]
    Unavailable(String),

    #[error("inference failed: {0}")]
    Inference(String),
}

impl ClassifierError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ClassifierError::Unavailable(_))
    }
}

/// Pipeline stage names, used to annotate partial failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Objects,
    Landmarks,
    Emotions,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Objects => "objects",
            Stage::Landmarks => "landmarks",
            Stage::Emotions => "emotions",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{stage} detection failed: {source}")]
    DetectionFailure {
        stage: Stage,
        #[source]
        source: ClassifierError,
    },

    #[error("failed to load image: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("color clustering failed: {0}")]
    Clustering(String),
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("malformed rule '{key}': {reason}")]
    Malformed { key: String, reason: String },

    #[error("evaluation of rule '{key}' failed: {source}")]
    Evaluation {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown rule '{0}'")]
    UnknownRule(String),

    #[error("failed to parse rule catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f32 },
}
