//! Job metadata and the storage layout of a job's namespace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sheep::ModelSpec;

/// Marker object signalling a successfully finished job.
pub const DONE_MARKER: &str = "done";

/// Marker object signalling a failed job. Its payload is the error text.
pub const ERROR_MARKER: &str = "error";

/// Prefix of job input objects.
pub const INPUTS_DIR: &str = "inputs";

/// Prefix of job output objects.
pub const OUTPUTS_DIR: &str = "outputs";

/// File name the reference runner writes its result to.
pub const DEFAULT_OUTPUT_FILE: &str = "output.json";

/// Caller-supplied metadata for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMeta {
    /// Name of the sheep that should process the job
    pub sheep: String,

    /// Model the sheep must be serving
    pub model: ModelSpec,
}

impl JobMeta {
    pub fn new(sheep: impl Into<String>, model: ModelSpec) -> Self {
        Self {
            sheep: sheep.into(),
            model,
        }
    }
}

/// In-memory record of a dispatched, unresolved job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub sheep: String,
    pub dispatched_at: DateTime<Utc>,
}

impl Dispatch {
    pub fn new(sheep: impl Into<String>) -> Self {
        Self {
            sheep: sheep.into(),
            dispatched_at: Utc::now(),
        }
    }

    /// Whether the job has been in flight for longer than `timeout`.
    pub fn is_overdue(&self, timeout: std::time::Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(timeout)
            .map(|limit| now - self.dispatched_at > limit)
            .unwrap_or(false)
    }
}
