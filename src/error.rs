use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy shared by every pipeline stage.
///
/// A stage either produces a complete output or returns one of these and
/// leaves previously persisted artifacts untouched.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provider `{provider}` failed: {message}")]
    Provider { provider: String, message: String },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("cannot join series: {0}")]
    Join(String),

    #[error("insufficient history: {0}")]
    InsufficientHistory(String),

    #[error("missing artifact {}: {hint}", path.display())]
    MissingArtifact { path: PathBuf, hint: String },

    #[error("model error: {0}")]
    Model(String),

    #[error("storage error at {}: {message}", path.display())]
    Storage { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn provider(provider: impl Into<String>, message: impl std::fmt::Display) -> Self {
        PipelineError::Provider {
            provider: provider.into(),
            message: message.to_string(),
        }
    }

    pub fn missing(path: impl Into<PathBuf>, hint: impl Into<String>) -> Self {
        PipelineError::MissingArtifact {
            path: path.into(),
            hint: hint.into(),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        PipelineError::Storage {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Short machine-friendly name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Provider { .. } => "ProviderError",
            PipelineError::Schema(_) => "SchemaError",
            PipelineError::Join(_) => "JoinError",
            PipelineError::InsufficientHistory(_) => "InsufficientHistoryError",
            PipelineError::MissingArtifact { .. } => "MissingArtifactError",
            PipelineError::Model(_) => "ModelError",
            PipelineError::Storage { .. } => "StorageError",
            PipelineError::Io(_) => "IoError",
        }
    }
}
