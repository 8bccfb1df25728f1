//! Sheep running the runner as a local child process.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::SheepBackend;
use crate::domain::errors::{ShepherdError, ShepherdResult};
use crate::domain::models::{ModelSpec, SheepKind};
use crate::infrastructure::devices::{visible_devices_value, CUDA_VISIBLE_DEVICES};

/// Runner executable used when none is configured.
pub const DEFAULT_RUNNER_COMMAND: &str = "shepherd-runner";

const KILL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct BareSheep {
    runner_command: String,
    working_directory: PathBuf,
    stdout_file: Option<PathBuf>,
    stderr_file: Option<PathBuf>,
    child: Option<Child>,
}

impl BareSheep {
    pub fn new(
        working_directory: PathBuf,
        runner_command: Option<String>,
        stdout_file: Option<PathBuf>,
        stderr_file: Option<PathBuf>,
    ) -> Self {
        Self {
            runner_command: runner_command.unwrap_or_else(|| DEFAULT_RUNNER_COMMAND.to_string()),
            working_directory,
            stdout_file,
            stderr_file,
            child: None,
        }
    }

    /// Arguments passed to the runner for `model` listening on `port`
    pub fn runner_args(model: &ModelSpec, port: u16) -> Vec<String> {
        vec![
            "-p".to_string(),
            port.to_string(),
            format!("{}/{}", model.name, model.version),
        ]
    }
}

/// Open a capture file for appending, creating parent directories.
async fn capture_file(path: &Path) -> ShepherdResult<Stdio> {
    let open = async {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
    };
    let file = open.await.map_err(|e| {
        ShepherdError::configuration(format!("Cannot open capture file {}: {e}", path.display()))
    })?;
    Ok(Stdio::from(file.into_std().await))
}

#[async_trait]
impl SheepBackend for BareSheep {
    fn kind(&self) -> SheepKind {
        SheepKind::Bare
    }

    async fn start(&mut self, model: &ModelSpec, port: u16, devices: &[u32]) -> ShepherdResult<()> {
        let stdout = match &self.stdout_file {
            Some(path) => capture_file(path).await?,
            None => Stdio::null(),
        };
        let stderr = match &self.stderr_file {
            Some(path) => capture_file(path).await?,
            None => Stdio::null(),
        };

        let args = Self::runner_args(model, port);
        debug!(command = %self.runner_command, ?args, cwd = %self.working_directory.display(), "Spawning runner");

        let child = Command::new(&self.runner_command)
            .args(&args)
            .current_dir(&self.working_directory)
            .env(CUDA_VISIBLE_DEVICES, visible_devices_value(devices))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShepherdError::Launch {
                message: format!("Failed to spawn runner '{}'", self.runner_command),
                exit_code: None,
                stderr: e.to_string(),
            })?;

        info!(pid = ?child.id(), port, model = %model, "Runner process started");
        self.child = Some(child);
        Ok(())
    }

    async fn slaughter(&mut self) -> ShepherdResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child.start_kill()?;
        match tokio::time::timeout(KILL_TIMEOUT, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(?status, "Runner process reaped");
            }
            Err(_) => warn!(pid = ?child.id(), "Runner did not exit after kill"),
        }
        Ok(())
    }

    async fn running(&mut self) -> ShepherdResult<bool> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?.is_none()),
            None => Ok(false),
        }
    }
}
