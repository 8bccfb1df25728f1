//! Sheep running the runner inside a container.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

use super::SheepBackend;
use crate::domain::errors::ShepherdResult;
use crate::domain::models::{DockerRegistryConfig, ModelSpec, SheepKind};
use crate::infrastructure::devices::{visible_devices_value, NVIDIA_VISIBLE_DEVICES};
use crate::infrastructure::docker::{DockerContainer, DockerError};

/// Engine command used when none is configured.
pub const DEFAULT_ENGINE_COMMAND: &str = "docker";

/// Port the runner listens on inside the container.
pub const CONTAINER_PORT: u16 = 9999;

#[derive(Debug)]
pub struct DockerSheep {
    registry: DockerRegistryConfig,
    command: String,
    image: Option<String>,
    data_root: PathBuf,
    container: Option<DockerContainer>,
}

impl DockerSheep {
    pub fn new(
        registry: DockerRegistryConfig,
        command: Option<String>,
        image: Option<String>,
        data_root: PathBuf,
    ) -> Self {
        Self {
            registry,
            command: command.unwrap_or_else(|| DEFAULT_ENGINE_COMMAND.to_string()),
            image,
            data_root,
            container: None,
        }
    }

    /// Full image reference for `model` in the configured registry
    pub fn image_reference(&self, model: &ModelSpec) -> String {
        let name = self.image.as_deref().unwrap_or(&model.name);
        format!("{}/{}:{}", self.registry.url.trim_end_matches('/'), name, model.version)
    }
}

#[async_trait]
impl SheepBackend for DockerSheep {
    fn kind(&self) -> SheepKind {
        SheepKind::Docker
    }

    async fn start(&mut self, model: &ModelSpec, port: u16, devices: &[u32]) -> ShepherdResult<()> {
        let image = self.image_reference(model);

        if self.registry.has_credentials() {
            DockerContainer::login(
                &self.command,
                &self.registry.url,
                self.registry.username.as_deref().unwrap_or_default(),
                self.registry.password.as_deref().unwrap_or_default(),
            )
            .await?;
        }
        DockerContainer::pull(&self.command, &image).await?;

        let mut container = DockerContainer::new(image, self.command.clone());
        container.add_port_mapping(port, CONTAINER_PORT);
        container.add_volume(&self.data_root, &self.data_root);
        container.add_env(NVIDIA_VISIBLE_DEVICES, visible_devices_value(devices));
        container.start().await?;

        self.container = Some(container);
        Ok(())
    }

    async fn slaughter(&mut self) -> ShepherdResult<()> {
        let Some(mut container) = self.container.take() else {
            return Ok(());
        };
        match container.kill().await {
            Ok(()) => Ok(()),
            // --rm containers vanish on exit; a failed kill of a dead one is fine
            Err(DockerError::CommandFailed { stderr, .. }) => {
                warn!(image = %container.image(), stderr = %stderr, "Kill failed, assuming container is gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn running(&mut self) -> ShepherdResult<bool> {
        match &self.container {
            Some(container) => {
                let alive = container.running().await?;
                if !alive {
                    info!(image = %container.image(), "Container is no longer listed");
                }
                Ok(alive)
            }
            None => Ok(false),
        }
    }
}
