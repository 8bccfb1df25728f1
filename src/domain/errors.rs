//! Domain errors for the Shepherd orchestrator.

use thiserror::Error;

use super::ports::StorageError;

/// Errors surfaced by the Shepherd, its sheep and the registry.
///
/// Configuration and unknown-reference errors are returned synchronously to
/// the caller. Everything discovered asynchronously ends up as an `error`
/// marker in storage instead.
#[derive(Debug, Error)]
pub enum ShepherdError {
    #[error("Sheep configuration error: {0}")]
    Configuration(String),

    #[error("Unknown sheep: {0}")]
    UnknownSheep(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Job {0} is already in flight")]
    DuplicateJob(String),

    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("Launch failed: {message} (exit code: {exit_code:?}): {stderr}")]
    Launch {
        message: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShepherdError {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Whether this is a configuration problem (never retried).
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type ShepherdResult<T> = Result<T, ShepherdError>;

impl From<serde_json::Error> for ShepherdError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}
