use std::path::PathBuf;
use thiserror::Error;

use crate::domain::ports::StorageError;

/// Errors raised while loading or running a model runner
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Runner configuration not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Invalid runner configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported stream '{0}'")]
    UnsupportedStream(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RunnerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
