use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::error::DockerError;

/// A single engine-managed container.
#[derive(Debug, Clone)]
pub struct DockerContainer {
    image: String,
    command: String,
    ports: BTreeMap<u16, u16>,
    volumes: BTreeMap<PathBuf, PathBuf>,
    env: BTreeMap<String, String>,
    container_id: Option<String>,
}

impl DockerContainer {
    /// Create a handle for `image`, managed through `command` (e.g. `docker`)
    pub fn new(image: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: command.into(),
            ports: BTreeMap::new(),
            volumes: BTreeMap::new(),
            env: BTreeMap::new(),
            container_id: None,
        }
    }

    /// Map a port on the host (bound to 127.0.0.1) to a container port
    pub fn add_port_mapping(&mut self, host_port: u16, container_port: u16) {
        self.ports.insert(host_port, container_port);
    }

    /// Bind-mount a host directory into the container
    pub fn add_volume(&mut self, host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) {
        self.volumes.insert(host_path.into(), container_path.into());
    }

    /// Set an environment variable inside the container
    pub fn add_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Arguments of the `run` invocation: detached, auto-removed on exit
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string()];
        for (host, container) in &self.ports {
            args.push("-p".to_string());
            args.push(format!("127.0.0.1:{host}:{container}"));
        }
        for (host, container) in &self.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host.display(), container.display()));
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("--rm".to_string());
        args.push(self.image.clone());
        args
    }

    /// Run the container and remember its id
    pub async fn start(&mut self) -> Result<(), DockerError> {
        let args = self.run_args();
        let stdout = run_engine(&self.command, &args, "Running the container failed").await?;
        let container_id = stdout.trim().to_string();
        info!(image = %self.image, container_id = %container_id, "Container started");
        self.container_id = Some(container_id);
        Ok(())
    }

    /// Kill the container
    pub async fn kill(&mut self) -> Result<(), DockerError> {
        let container_id = self.container_id.as_deref().ok_or(DockerError::NotStarted)?;
        run_engine(
            &self.command,
            &["kill".to_string(), container_id.to_string()],
            "Killing the container failed",
        )
        .await?;
        info!(container_id = %container_id, "Container killed");
        self.container_id = None;
        Ok(())
    }

    /// Whether the engine lists a live container with our id
    pub async fn running(&self) -> Result<bool, DockerError> {
        let container_id = self.container_id.as_deref().ok_or(DockerError::NotStarted)?;
        let stdout = run_engine(
            &self.command,
            &[
                "ps".to_string(),
                "--filter".to_string(),
                format!("id={container_id}"),
            ],
            "Checking the status of the container failed",
        )
        .await?;
        Ok(lists_container(&stdout))
    }

    /// Pull `image` through `command`
    pub async fn pull(command: &str, image: &str) -> Result<(), DockerError> {
        info!(image, "Pulling image");
        run_engine(
            command,
            &["pull".to_string(), image.to_string()],
            "Pulling the image failed",
        )
        .await
        .map(|_| ())
    }

    /// Log in to an image registry
    pub async fn login(
        command: &str,
        registry: &str,
        username: &str,
        password: &str,
    ) -> Result<(), DockerError> {
        run_engine(
            command,
            &[
                "login".to_string(),
                "-u".to_string(),
                username.to_string(),
                "-p".to_string(),
                password.to_string(),
                registry.to_string(),
            ],
            "Logging in to the registry failed",
        )
        .await
        .map(|_| ())
    }
}

/// `ps` prints a header line; any further line is the container itself.
fn lists_container(ps_output: &str) -> bool {
    ps_output.lines().filter(|l| !l.trim().is_empty()).count() > 1
}

/// Run an engine subcommand to completion and return its stdout.
async fn run_engine(command: &str, args: &[String], failure: &str) -> Result<String, DockerError> {
    debug!(command, subcommand = args.first().map(String::as_str), "Invoking container engine");
    let output = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| DockerError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(DockerError::CommandFailed {
            message: failure.to_string(),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
