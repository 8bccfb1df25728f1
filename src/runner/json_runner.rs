//! Reference runner: scales the numbers of a JSON input.
//!
//! Reads `inputs/input.json` (`{"key": [numbers]}`) from the job directory
//! and writes `outputs/output.json` as `{"key": [...], "output": [...]}`.

use async_trait::async_trait;
use figment::providers::{Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::RunnerError;
use super::JobProcessor;
use crate::domain::models::{DEFAULT_OUTPUT_FILE, INPUTS_DIR, OUTPUTS_DIR};

/// File the runner reads a job's payload from.
pub const INPUT_FILE: &str = "input.json";

/// Name of the config file looked up when the config path is a directory.
pub const CONFIG_FILE: &str = "config.yaml";

/// Stream served by the reference runner.
pub const PREDICT_STREAM: &str = "predict";

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Factor applied to every input number
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

const fn default_multiplier() -> f64 {
    2.0
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
        }
    }
}

impl RunnerConfig {
    /// Load from a YAML file, or from `config.yaml` inside a directory.
    ///
    /// A missing file is an error; runners never start unconfigured.
    pub fn load(path: &Path) -> Result<Self, RunnerError> {
        let file: PathBuf = if path.is_dir() {
            path.join(CONFIG_FILE)
        } else {
            path.to_path_buf()
        };
        if !file.is_file() {
            return Err(RunnerError::ConfigNotFound(file));
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Yaml::file(&file))
            .extract()
            .map_err(|e| RunnerError::InvalidConfig(e.to_string()))?;

        if !config.multiplier.is_finite() {
            return Err(RunnerError::InvalidConfig(format!(
                "multiplier must be finite, got {}",
                config.multiplier
            )));
        }

        debug!(path = %file.display(), ?config, "Runner configuration loaded");
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct JsonRunner {
    config: RunnerConfig,
}

impl JsonRunner {
    /// Create a runner serving `stream`
    pub fn new(config: RunnerConfig, stream: &str) -> Result<Self, RunnerError> {
        if stream != PREDICT_STREAM {
            return Err(RunnerError::UnsupportedStream(stream.to_string()));
        }
        Ok(Self { config })
    }

    /// Apply the model to a parsed input document
    pub fn predict(&self, input: &Value) -> Result<Value, RunnerError> {
        let key = input
            .get("key")
            .and_then(Value::as_array)
            .ok_or_else(|| RunnerError::InvalidInput("'key' must be an array".to_string()))?;

        let output = key
            .iter()
            .map(|value| {
                value
                    .as_f64()
                    .map(|x| x * self.config.multiplier)
                    .ok_or_else(|| RunnerError::InvalidInput(format!("'{value}' is not a number")))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(json!({ "key": key, "output": output }))
    }
}

#[async_trait]
impl JobProcessor for JsonRunner {
    async fn process(&self, job_id: &str, io_data_root: &Path) -> Result<(), RunnerError> {
        let job_dir = io_data_root.join(job_id);
        let input_path = job_dir.join(INPUTS_DIR).join(INPUT_FILE);

        let raw = tokio::fs::read(&input_path).await.map_err(|e| {
            RunnerError::InvalidInput(format!("cannot read {}: {e}", input_path.display()))
        })?;
        let input: Value = serde_json::from_slice(&raw)?;
        let result = self.predict(&input)?;

        let outputs_dir = job_dir.join(OUTPUTS_DIR);
        tokio::fs::create_dir_all(&outputs_dir).await?;
        tokio::fs::write(outputs_dir.join(DEFAULT_OUTPUT_FILE), serde_json::to_vec(&result)?).await?;

        info!(job_id, "Prediction written");
        Ok(())
    }
}
