//! Shepherd - worker-fleet orchestrator
//!
//! Shepherd dispatches inference jobs to named workers ("sheep"). Each sheep
//! runs a model runner either as a bare subprocess or inside a container and
//! talks to it over a small message socket. Job outcomes are recorded as
//! `done`/`error` markers in an object store, and a health loop turns dead
//! or stuck runners into failed jobs.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, configuration schema, errors, ports
//! - **Adapters** (`adapters`): object store implementations
//! - **Infrastructure Layer** (`infrastructure`): config loading, logging,
//!   container engine, GPU devices, wire protocol
//! - **Application Layer** (`application`): sheep, registry, orchestrator,
//!   output listener
//! - **Runner** (`runner`): the runner side of the protocol
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use shepherd::adapters::storage::FsObjectStore;
//! use shepherd::application::{OutputListener, Shepherd};
//! use shepherd::infrastructure::config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::load_from_file("shepherd.yaml")?;
//!     let storage = Arc::new(FsObjectStore::new(&config.storage.root));
//!     let (shepherd, notifications) = Shepherd::new(&config, storage)?;
//!     let shepherd = Arc::new(shepherd);
//!     let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
//!     OutputListener::new(shepherd.clone(), notifications, config.health.check_interval())
//!         .spawn(shutdown_tx.subscribe());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod runner;

// Re-export commonly used types for convenience
pub use application::{OutputListener, Sheep, SheepReport, Shepherd};
pub use domain::models::{Config, JobMeta, ModelSpec, SheepConfig, SheepKind, SheepStatus};
pub use domain::ports::{ObjectStore, StorageError};
pub use domain::{ShepherdError, ShepherdResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
