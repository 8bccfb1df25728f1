//! Builds the sheep fleet from configuration.

use std::collections::{BTreeMap, HashMap};
use tokio::sync::mpsc;
use tracing::debug;

use super::sheep::{BareSheep, DockerSheep, Sheep, SheepBackend, SheepNotification};
use crate::domain::errors::{ShepherdError, ShepherdResult};
use crate::domain::models::{Config, SheepConfig, SheepKind};

/// Factory turning raw sheep configurations into `Sheep`.
pub struct SheepRegistry;

impl SheepRegistry {
    /// Validate every sheep configuration and construct the fleet.
    ///
    /// Nothing is started here. Any invalid entry fails the whole build.
    pub fn build(
        config: &Config,
        notifier: &mpsc::Sender<SheepNotification>,
    ) -> ShepherdResult<BTreeMap<String, Sheep>> {
        let mut ports: HashMap<u16, &str> = HashMap::new();
        let mut fleet = BTreeMap::new();

        for (name, sheep_config) in &config.sheep {
            let port = sheep_config.port.ok_or_else(|| {
                ShepherdError::configuration(format!("Sheep '{name}' has no port configured"))
            })?;
            if let Some(other) = ports.insert(port, name) {
                return Err(ShepherdError::configuration(format!(
                    "Sheep '{name}' and '{other}' both use port {port}"
                )));
            }

            let backend = Self::backend(name, sheep_config, config)?;
            debug!(sheep = %name, kind = %backend.kind(), port, "Sheep configured");

            let sheep = Sheep::new(
                name.clone(),
                port,
                sheep_config.devices.clone(),
                backend,
                config.health.connect_retry(),
                notifier.clone(),
            );
            fleet.insert(name.clone(), sheep);
        }

        Ok(fleet)
    }

    fn backend(name: &str, sheep: &SheepConfig, config: &Config) -> ShepherdResult<Box<dyn SheepBackend>> {
        let kind = SheepKind::from_tag(&sheep.sheep_type).ok_or_else(|| {
            ShepherdError::configuration(format!(
                "Sheep '{name}' has unknown type '{}'",
                sheep.sheep_type
            ))
        })?;

        match kind {
            SheepKind::Bare => {
                let working_directory = sheep.working_directory.clone().ok_or_else(|| {
                    ShepherdError::configuration(format!(
                        "Bare sheep '{name}' requires a working_directory"
                    ))
                })?;
                Ok(Box::new(BareSheep::new(
                    working_directory,
                    sheep.runner_command.clone(),
                    sheep.stdout_file.clone(),
                    sheep.stderr_file.clone(),
                )))
            }
            SheepKind::Docker => {
                let registry = config.registry.clone().ok_or_else(|| {
                    ShepherdError::configuration(format!(
                        "Docker sheep '{name}' requires a registry configuration"
                    ))
                })?;
                Ok(Box::new(DockerSheep::new(
                    registry,
                    sheep.command.clone(),
                    sheep.image.clone(),
                    config.data_root.clone(),
                )))
            }
        }
    }
}
