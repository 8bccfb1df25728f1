use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Messages exchanged between the shepherd and a runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Message {
    /// Shepherd → runner: process `job_id`, payload lives under `io_data_root/job_id`
    Input { job_id: String, io_data_root: PathBuf },

    /// Runner → shepherd: the job finished successfully
    Done { job_id: String },

    /// Runner → shepherd: the job failed
    Error { job_id: String, message: String },
}

/// Discriminant of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Input,
    Done,
    Error,
}

/// Replies a runner may send back for a dispatched job.
pub const TERMINAL_KINDS: &[MessageKind] = &[MessageKind::Done, MessageKind::Error];

impl Message {
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Input { .. } => MessageKind::Input,
            Self::Done { .. } => MessageKind::Done,
            Self::Error { .. } => MessageKind::Error,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Self::Input { job_id, .. } | Self::Done { job_id } | Self::Error { job_id, .. } => job_id,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let message = Message::Error {
            job_id: "job-1".to_string(),
            message: "boom".to_string(),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["message_type"], "error");
        assert_eq!(value["job_id"], "job-1");
        assert_eq!(value["message"], "boom");
    }

    #[test]
    fn test_kind_and_job_id() {
        let message = Message::Input {
            job_id: "job-2".to_string(),
            io_data_root: PathBuf::from("/data"),
        };
        assert_eq!(message.kind(), MessageKind::Input);
        assert_eq!(message.job_id(), "job-2");
    }
}
