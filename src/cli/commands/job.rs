//! `shepherd job`: enqueue one job, wait for its marker, tear down.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{init_logging, load_config, open_storage};
use crate::application::{OutputListener, Shepherd};
use crate::cli::output::{output, CommandOutput};
use crate::cli::JobArgs;
use crate::domain::models::{JobMeta, ModelSpec, INPUTS_DIR, OUTPUTS_DIR};
use crate::runner::json_runner::INPUT_FILE;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Serialize)]
pub struct JobOutput {
    pub job_id: String,
    pub sheep: String,
    pub model: ModelSpec,
    pub succeeded: bool,
    pub error: Option<String>,
    pub outputs: Vec<String>,
}

impl CommandOutput for JobOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Job: {}", self.job_id),
            format!("Sheep: {}", self.sheep),
            format!("Model: {}", self.model),
        ];
        match &self.error {
            None => lines.push("Status: done".to_string()),
            Some(reason) => lines.push(format!("Status: failed ({reason})")),
        }
        for key in &self.outputs {
            lines.push(format!("  {key}"));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: JobArgs, config_path: &Path, json_mode: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let _logger = init_logging(&config)?;
    let storage = open_storage(&config);

    let job_id = args.job_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Some(input) = &args.input {
        let data = tokio::fs::read(input)
            .await
            .with_context(|| format!("Failed to read input file {}", input.display()))?;
        storage
            .put_object(&job_id, &format!("{INPUTS_DIR}/{INPUT_FILE}"), data)
            .await
            .context("Failed to upload job input")?;
    }

    let (shepherd, notifications) =
        Shepherd::new(&config, storage.clone()).context("Invalid sheep configuration")?;
    let shepherd = Arc::new(shepherd);

    let (shutdown_tx, _) = broadcast::channel(1);
    let listener = OutputListener::new(shepherd.clone(), notifications, config.health.check_interval())
        .spawn(shutdown_tx.subscribe());

    let meta = JobMeta::new(args.sheep, ModelSpec::new(args.model, args.model_version));
    let outcome = run_job(&shepherd, &job_id, &meta, Duration::from_secs(args.timeout_secs)).await;

    let _ = shutdown_tx.send(());
    listener.await.context("Output listener panicked")?;
    shepherd.kill_all().await;
    outcome?;

    let error = shepherd.job_error(&job_id).await?;
    let out = JobOutput {
        succeeded: error.is_none(),
        outputs: storage.list_objects(&job_id, &format!("{OUTPUTS_DIR}/")).await?,
        job_id,
        sheep: meta.sheep,
        model: meta.model,
        error,
    };
    output(&out, json_mode);

    if !out.succeeded {
        anyhow::bail!("Job {} failed", out.job_id);
    }
    Ok(())
}

async fn run_job(shepherd: &Shepherd, job_id: &str, meta: &JobMeta, timeout: Duration) -> Result<()> {
    shepherd.enqueue_job(job_id, meta).await?;

    tokio::time::timeout(timeout, async {
        while !shepherd.is_job_done(job_id).await? {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
    .with_context(|| format!("Job {job_id} did not finish within {}s", timeout.as_secs()))?
}
