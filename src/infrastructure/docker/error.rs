use thiserror::Error;

use crate::domain::errors::ShepherdError;

/// Errors raised by container engine invocations
#[derive(Error, Debug)]
pub enum DockerError {
    #[error("The container was not started yet")]
    NotStarted,

    #[error("{message} (exit code: {exit_code:?}): {stderr}")]
    CommandFailed {
        message: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to invoke container engine '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<DockerError> for ShepherdError {
    fn from(err: DockerError) -> Self {
        match err {
            DockerError::NotStarted => Self::Configuration(err.to_string()),
            DockerError::CommandFailed {
                message,
                exit_code,
                stderr,
            } => Self::Launch {
                message,
                exit_code,
                stderr,
            },
            DockerError::Spawn { command, source } => Self::Launch {
                message: format!("Failed to invoke container engine '{command}'"),
                exit_code: None,
                stderr: source.to_string(),
            },
        }
    }
}
