//! Sheep: named workers hosting one runner each.
//!
//! `Sheep` holds what every variant shares (status, loaded model, message
//! socket, device list) and delegates process control to a `SheepBackend`
//! picked from the configuration tag.

pub mod bare;
pub mod docker;
pub mod socket;

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use bare::BareSheep;
pub use docker::DockerSheep;
pub use socket::{SheepEvent, SheepNotification, SheepSocket};

use crate::domain::errors::{ShepherdError, ShepherdResult};
use crate::domain::models::{ModelSpec, SheepKind, SheepStatus};
use crate::infrastructure::devices;
use crate::infrastructure::messaging::Message;

/// Process control capabilities of a sheep variant.
#[async_trait]
pub trait SheepBackend: Send + Sync {
    /// Variant tag
    fn kind(&self) -> SheepKind;

    /// Launch a runner serving `model` on `port` with the given GPUs visible
    async fn start(&mut self, model: &ModelSpec, port: u16, devices: &[u32]) -> ShepherdResult<()>;

    /// Tear the runner down. Must succeed on an already stopped backend.
    async fn slaughter(&mut self) -> ShepherdResult<()>;

    /// Probe the OS or container engine for a live runner
    async fn running(&mut self) -> ShepherdResult<bool>;
}

/// A named worker and its runtime state.
pub struct Sheep {
    name: String,
    port: u16,
    devices: Vec<String>,
    backend: Box<dyn SheepBackend>,
    status: SheepStatus,
    model: Option<ModelSpec>,
    ever_started: bool,
    socket: Option<SheepSocket>,
    connect_retry: Duration,
    notifier: mpsc::Sender<SheepNotification>,
}

impl Sheep {
    pub fn new(
        name: impl Into<String>,
        port: u16,
        devices: Vec<String>,
        backend: Box<dyn SheepBackend>,
        connect_retry: Duration,
        notifier: mpsc::Sender<SheepNotification>,
    ) -> Self {
        Self {
            name: name.into(),
            port,
            devices,
            backend,
            status: SheepStatus::Stopped,
            model: None,
            ever_started: false,
            socket: None,
            connect_retry,
            notifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    pub fn kind(&self) -> SheepKind {
        self.backend.kind()
    }

    pub const fn status(&self) -> SheepStatus {
        self.status
    }

    pub const fn model(&self) -> Option<&ModelSpec> {
        self.model.as_ref()
    }

    /// Start a runner serving `model`, replacing whatever ran before.
    ///
    /// Device resolution happens before anything is spawned, so a bad
    /// device list never leaves a process behind.
    pub async fn start(&mut self, model: &ModelSpec) -> ShepherdResult<()> {
        if self.ever_started {
            self.slaughter().await;
        }

        info!(sheep = %self.name, model = %model, kind = %self.kind(), "Starting sheep");
        self.status = SheepStatus::Starting;

        let restricted = devices::restricted_devices_from_env();
        let visible = match devices::resolve_devices(&self.devices, restricted.as_deref()) {
            Ok(visible) => visible,
            Err(e) => {
                self.status = SheepStatus::Failed;
                return Err(e);
            }
        };

        if let Err(e) = self.backend.start(model, self.port, &visible).await {
            warn!(sheep = %self.name, error = %e, "Sheep failed to start");
            self.status = SheepStatus::Failed;
            return Err(e);
        }

        self.socket = Some(SheepSocket::spawn(
            self.name.clone(),
            self.port,
            self.connect_retry,
            self.notifier.clone(),
        ));
        self.model = Some(model.clone());
        self.ever_started = true;
        self.status = SheepStatus::Running;
        Ok(())
    }

    /// Forcibly stop the runner. Never fails; always ends `Stopped`.
    pub async fn slaughter(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.shutdown();
        }
        if let Err(e) = self.backend.slaughter().await {
            warn!(sheep = %self.name, error = %e, "Slaughter failed, continuing");
        }
        if self.status != SheepStatus::Stopped {
            info!(sheep = %self.name, "Sheep slaughtered");
        }
        self.model = None;
        self.status = SheepStatus::Stopped;
    }

    /// Re-probe whether the runner is alive.
    ///
    /// Errors with a configuration error if the sheep was never started.
    pub async fn running(&mut self) -> ShepherdResult<bool> {
        if !self.ever_started {
            return Err(ShepherdError::configuration(format!(
                "Sheep '{}' has not been started yet",
                self.name
            )));
        }
        self.backend.running().await
    }

    /// `running()` collapsed to a boolean, for callers that only care
    /// whether work can be routed here.
    pub async fn is_alive(&mut self) -> bool {
        match self.running().await {
            Ok(alive) => alive,
            Err(e) => {
                if self.ever_started {
                    warn!(sheep = %self.name, error = %e, "Liveness probe failed");
                }
                false
            }
        }
    }

    /// Whether the sheep is up and serving exactly `model`.
    pub async fn serves(&mut self, model: &ModelSpec) -> bool {
        self.status == SheepStatus::Running && self.model.as_ref() == Some(model) && self.is_alive().await
    }

    /// Queue a message for the runner.
    pub fn send(&self, message: Message) -> ShepherdResult<()> {
        self.socket
            .as_ref()
            .ok_or_else(|| {
                ShepherdError::Protocol(format!("Sheep '{}' has no open socket", self.name))
            })?
            .send(message)
    }

    /// Record that the runner was found dead.
    ///
    /// Stops the socket task; the backend handle is kept so later probes
    /// still answer from the OS.
    pub fn mark_failed(&mut self) {
        if let Some(socket) = self.socket.take() {
            socket.shutdown();
        }
        self.status = SheepStatus::Failed;
    }
}

impl std::fmt::Debug for Sheep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sheep")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("port", &self.port)
            .field("status", &self.status)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct MockBackend {
        alive: Arc<AtomicBool>,
        starts: Arc<AtomicU32>,
        fail_start: bool,
    }

    #[async_trait]
    impl SheepBackend for MockBackend {
        fn kind(&self) -> SheepKind {
            SheepKind::Bare
        }

        async fn start(&mut self, _model: &ModelSpec, _port: u16, _devices: &[u32]) -> ShepherdResult<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(ShepherdError::Launch {
                    message: "spawn failed".to_string(),
                    exit_code: None,
                    stderr: String::new(),
                });
            }
            self.alive.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn slaughter(&mut self) -> ShepherdResult<()> {
            self.alive.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn running(&mut self) -> ShepherdResult<bool> {
            Ok(self.alive.load(Ordering::SeqCst))
        }
    }

    fn sheep_with(backend: MockBackend, devices: Vec<String>) -> Sheep {
        let (tx, _rx) = mpsc::channel(8);
        Sheep::new("mock", 0, devices, Box::new(backend), Duration::from_millis(10), tx)
    }

    #[tokio::test]
    async fn test_running_before_start_is_configuration_error() {
        let mut sheep = sheep_with(MockBackend::default(), vec![]);
        assert!(sheep.running().await.unwrap_err().is_configuration());
        assert!(!sheep.is_alive().await);
        assert_eq!(sheep.status(), SheepStatus::Stopped);
    }

    #[tokio::test]
    async fn test_start_and_slaughter() {
        let mut sheep = sheep_with(MockBackend::default(), vec![]);
        let model = ModelSpec::new("doubler", "1");

        sheep.start(&model).await.unwrap();
        assert_eq!(sheep.status(), SheepStatus::Running);
        assert_eq!(sheep.model(), Some(&model));
        assert!(sheep.running().await.unwrap());
        assert!(sheep.serves(&model).await);
        assert!(!sheep.serves(&ModelSpec::new("doubler", "2")).await);

        sheep.slaughter().await;
        assert_eq!(sheep.status(), SheepStatus::Stopped);
        assert!(!sheep.running().await.unwrap());

        // idempotent
        sheep.slaughter().await;
        assert_eq!(sheep.status(), SheepStatus::Stopped);
    }

    #[tokio::test]
    async fn test_bad_device_fails_before_backend_start() {
        let backend = MockBackend::default();
        let starts = backend.starts.clone();
        let mut sheep = sheep_with(backend, vec!["/dev/bogus".to_string()]);

        let err = sheep.start(&ModelSpec::new("doubler", "1")).await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(starts.load(Ordering::SeqCst), 0);
        assert_eq!(sheep.status(), SheepStatus::Failed);
    }

    #[tokio::test]
    async fn test_launch_failure_marks_failed() {
        let backend = MockBackend {
            fail_start: true,
            ..MockBackend::default()
        };
        let mut sheep = sheep_with(backend, vec![]);

        let err = sheep.start(&ModelSpec::new("doubler", "1")).await.unwrap_err();
        assert!(matches!(err, ShepherdError::Launch { .. }));
        assert_eq!(sheep.status(), SheepStatus::Failed);
        assert!(sheep.send(Message::Done { job_id: "x".to_string() }).is_err());
    }

    #[tokio::test]
    async fn test_mark_failed_keeps_probe_working() {
        let backend = MockBackend::default();
        let alive = backend.alive.clone();
        let mut sheep = sheep_with(backend, vec![]);

        sheep.start(&ModelSpec::new("doubler", "1")).await.unwrap();
        alive.store(false, Ordering::SeqCst);
        sheep.mark_failed();

        assert_eq!(sheep.status(), SheepStatus::Failed);
        assert!(!sheep.running().await.unwrap());
    }
}
