//! Error types for inbox-sorter.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Training error: {0}")]
    Train(#[from] TrainError),

    #[error("Artifact load error: {0}")]
    Load(#[from] LoadError),

    #[error("Prediction error: {0}")]
    Predict(#[from] PredictError),

    #[error("Mail source error: {0}")]
    Source(#[from] SourceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a training run. No bundle is made visible when one of
/// these is returned.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("No training data: {0}")]
    NoTrainingData(String),

    #[error("Invalid training configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to write artifact bundle to {path}: {reason}")]
    Artifact { path: PathBuf, reason: String },

    #[error("Failed to read corpus: {0}")]
    Corpus(String),

    #[error("Tensor computation failed: {0}")]
    Computation(String),

    #[error("Mail source error: {0}")]
    Source(#[from] SourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading an artifact bundle.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Artifact missing or unreadable: {path}: {reason}")]
    ArtifactMissing { path: PathBuf, reason: String },

    #[error("Bundle parts disagree: {0}")]
    BundleMismatch(String),

    #[error("Corrupt artifact {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Errors returned by prediction calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredictError {
    #[error("Predictor is not ready: load() has not succeeded")]
    NotReady,

    #[error("Document has no content after normalization")]
    EmptyContent,
}

/// Errors from the external mail capabilities.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Request to {provider} failed: {reason}")]
    Request { provider: String, reason: String },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Item {id} not found")]
    NotFound { id: String },

    #[error("Item {id} has no content")]
    EmptyContent { id: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Call timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type alias for inbox-sorter.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single dispatch ended in `Failed`. Reported per event; the server
/// keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchFailure {
    #[error("Could not list new items: {0}")]
    SourceUnavailable(String),

    #[error("Content of {item_id} unavailable: {reason}")]
    ContentUnavailable { item_id: String, reason: String },

    #[error("No prediction for {item_id}: {reason}")]
    PredictionUnavailable { item_id: String, reason: String },

    #[error("Failed to apply {label} to {item_id}: {reason}")]
    ApplyFailed {
        item_id: String,
        label: String,
        reason: String,
    },
}

impl DispatchFailure {
    /// Stable snake_case name, used in webhook responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::ContentUnavailable { .. } => "content_unavailable",
            Self::PredictionUnavailable { .. } => "prediction_unavailable",
            Self::ApplyFailed { .. } => "apply_failed",
        }
    }
}
