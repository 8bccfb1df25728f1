use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a sheep.
///
/// `Running` means the last `start` returned without error. Whether the
/// runner process is actually alive is a separate, probed question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheepStatus {
    Stopped,
    Starting,
    Running,
    Failed,
}

impl fmt::Display for SheepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Variant tag selecting the sheep implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheepKind {
    Bare,
    Docker,
}

impl SheepKind {
    /// Parse a configuration tag. Unknown tags yield `None`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "bare" => Some(Self::Bare),
            "docker" => Some(Self::Docker),
            _ => None,
        }
    }
}

impl fmt::Display for SheepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bare => write!(f, "bare"),
            Self::Docker => write!(f, "docker"),
        }
    }
}

/// Identity of the model a sheep serves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub version: String,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}
