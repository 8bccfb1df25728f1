//! Common test utilities for integration tests
//!
//! Builds an isolated shepherd environment: a temporary data root, a
//! filesystem object store and bare sheep driving the real
//! `shepherd-runner` binary.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use shepherd::adapters::storage::FsObjectStore;
use shepherd::application::{OutputListener, Shepherd};
use shepherd::domain::models::{Config, HealthConfig, SheepConfig};

/// Path of the reference runner built alongside the tests
pub const RUNNER_BIN: &str = env!("CARGO_BIN_EXE_shepherd-runner");

/// Path of the shepherd CLI
pub const SHEPHERD_BIN: &str = env!("CARGO_BIN_EXE_shepherd");

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Reserve a free local port
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .expect("Failed to reserve a port")
}

/// Poll an async predicate every 50ms until it holds or the timeout passes
pub async fn wait_for<F, Fut>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if predicate().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Isolated directories for one test
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let env = Self {
            dir: tempfile::tempdir().expect("Failed to create temp dir"),
        };
        std::fs::create_dir_all(env.models_dir()).expect("Failed to create models dir");
        env
    }

    pub fn data_root(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn storage_root(&self) -> PathBuf {
        self.dir.path().join("storage")
    }

    /// Working directory of bare sheep; holds `<model>/<version>/config.yaml`
    pub fn models_dir(&self) -> PathBuf {
        self.dir.path().join("models")
    }

    /// Write a runner config for `name/version`
    pub fn add_model(&self, name: &str, version: &str, multiplier: u32) {
        let dir = self.models_dir().join(name).join(version);
        std::fs::create_dir_all(&dir).expect("Failed to create model dir");
        std::fs::write(dir.join("config.yaml"), format!("multiplier: {multiplier}\n"))
            .expect("Failed to write runner config");
    }

    /// Bare sheep config running the reference runner
    pub fn bare_sheep(&self) -> SheepConfig {
        SheepConfig {
            sheep_type: "bare".to_string(),
            port: Some(free_port()),
            working_directory: Some(self.models_dir()),
            runner_command: Some(RUNNER_BIN.to_string()),
            stderr_file: Some(self.dir.path().join("logs").join("runner.err")),
            ..SheepConfig::default()
        }
    }

    pub fn config(&self, sheep: BTreeMap<String, SheepConfig>) -> Config {
        Config {
            data_root: self.data_root(),
            storage: shepherd::domain::models::StorageConfig {
                root: self.storage_root(),
            },
            health: HealthConfig {
                check_interval_ms: 100,
                connect_retry_ms: 20,
                job_timeout_secs: None,
            },
            sheep,
            ..Config::default()
        }
    }

    pub fn storage(&self) -> Arc<FsObjectStore> {
        Arc::new(FsObjectStore::new(self.storage_root()))
    }

    /// Upload `inputs/input.json` for a job
    pub fn put_input(&self, job_id: &str, body: &str) {
        let dir = self.storage_root().join(job_id).join("inputs");
        std::fs::create_dir_all(&dir).expect("Failed to create inputs dir");
        std::fs::write(dir.join("input.json"), body).expect("Failed to write input");
    }

    pub fn storage_object(&self, job_id: &str, key: &str) -> Option<Vec<u8>> {
        std::fs::read(self.storage_root().join(job_id).join(key)).ok()
    }
}

/// A shepherd with a running output listener
pub struct Harness {
    pub shepherd: Arc<Shepherd>,
    shutdown_tx: broadcast::Sender<()>,
    listener: Option<JoinHandle<()>>,
}

impl Harness {
    pub fn start(env: &TestEnv, config: &Config) -> Self {
        let (shepherd, notifications) =
            Shepherd::new(config, env.storage()).expect("Shepherd should build");
        let shepherd = Arc::new(shepherd);
        let (shutdown_tx, _) = broadcast::channel(1);
        let listener = OutputListener::new(shepherd.clone(), notifications, config.health.check_interval())
            .spawn(shutdown_tx.subscribe());
        Self {
            shepherd,
            shutdown_tx,
            listener: Some(listener),
        }
    }

    /// Wait until the job has a terminal marker
    pub async fn wait_done(&self, job_id: &str) -> bool {
        let shepherd = self.shepherd.clone();
        wait_for(
            || {
                let shepherd = shepherd.clone();
                let job_id = job_id.to_string();
                async move { shepherd.is_job_done(&job_id).await.unwrap_or(false) }
            },
            Duration::from_secs(20),
        )
        .await
    }

    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(listener) = self.listener.take() {
            let _ = listener.await;
        }
        self.shepherd.kill_all().await;
    }
}

pub fn write_config_file(path: &Path, config: &Config) {
    let yaml = serde_yaml::to_string(config).expect("Config should serialize");
    std::fs::write(path, yaml).expect("Failed to write config file");
}
