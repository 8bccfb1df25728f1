//! `shepherd check`: validate configuration and list the fleet.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use super::{load_config, open_storage};
use crate::application::{Shepherd, SheepReport};
use crate::cli::output::{output, sheep_table, CommandOutput};
use crate::infrastructure::devices::n_available_gpus;

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub config: String,
    pub data_root: String,
    pub storage_root: String,
    pub available_gpus: usize,
    pub sheep: Vec<SheepReport>,
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Configuration OK: {}", self.config),
            format!("Data root: {}", self.data_root),
            format!("Storage root: {}", self.storage_root),
            format!("Available GPUs: {}", self.available_gpus),
        ];
        if self.sheep.is_empty() {
            lines.push("No sheep configured.".to_string());
        } else {
            lines.push(sheep_table(&self.sheep));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(config_path: &Path, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let (shepherd, _notifications) =
        Shepherd::new(&config, open_storage(&config)).context("Invalid sheep configuration")?;

    let out = CheckOutput {
        config: config_path.display().to_string(),
        data_root: config.data_root.display().to_string(),
        storage_root: config.storage.root.display().to_string(),
        available_gpus: n_available_gpus(),
        sheep: shepherd.status_report().await,
    };
    output(&out, json_mode);
    Ok(())
}
