pub mod config;
pub mod job;
pub mod sheep;

pub use config::{Config, DockerRegistryConfig, HealthConfig, LoggingConfig, SheepConfig, StorageConfig};
pub use job::{
    Dispatch, JobMeta, DEFAULT_OUTPUT_FILE, DONE_MARKER, ERROR_MARKER, INPUTS_DIR, OUTPUTS_DIR,
};
pub use sheep::{ModelSpec, SheepKind, SheepStatus};
