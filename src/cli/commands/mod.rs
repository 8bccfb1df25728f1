//! CLI command implementations.

pub mod check;
pub mod job;
pub mod run;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::storage::FsObjectStore;
use crate::domain::models::Config;
use crate::domain::ports::ObjectStore;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};

/// Load and validate the configuration file
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    if !path.is_file() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }
    ConfigLoader::load_from_file(path)
}

/// Install the global subscriber described by the configuration
pub(crate) fn init_logging(config: &Config) -> Result<LoggerImpl> {
    LoggerImpl::init(&LogConfig::from(&config.logging)).context("Failed to initialize logging")
}

/// Object store holding job inputs, outputs and markers
pub(crate) fn open_storage(config: &Config) -> Arc<dyn ObjectStore> {
    Arc::new(FsObjectStore::new(&config.storage.root))
}
