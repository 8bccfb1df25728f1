use thiserror::Error;

use super::message::MessageKind;
use crate::domain::errors::ShepherdError;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {reason}")]
    Malformed {
        reason: String,
        job_id: Option<String>,
    },

    #[error("Unexpected {kind} message for job {job_id}, expected one of {expected:?}")]
    Unexpected {
        kind: MessageKind,
        expected: Vec<MessageKind>,
        job_id: String,
    },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// The job the offending message referred to, if it can be told.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Malformed { job_id, .. } => job_id.as_deref(),
            Self::Unexpected { job_id, .. } => Some(job_id),
            Self::ConnectionClosed | Self::Io(_) => None,
        }
    }
}

impl From<ProtocolError> for ShepherdError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
