//! Output listener and health checker.
//!
//! Consumes socket events as the fast completion path and, on every tick,
//! reconciles in-flight jobs against storage markers, runner-side markers,
//! job timeouts and sheep liveness.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::shepherd::Shepherd;
use super::sheep::{SheepEvent, SheepNotification};
use crate::domain::errors::ShepherdResult;
use crate::domain::models::SheepStatus;
use crate::infrastructure::messaging::Message;

pub struct OutputListener {
    shepherd: Arc<Shepherd>,
    notifications: mpsc::Receiver<SheepNotification>,
    check_interval: Duration,
}

impl OutputListener {
    pub fn new(
        shepherd: Arc<Shepherd>,
        notifications: mpsc::Receiver<SheepNotification>,
        check_interval: Duration,
    ) -> Self {
        Self {
            shepherd,
            notifications,
            check_interval,
        }
    }

    /// Run the listener until a shutdown signal arrives.
    pub fn spawn(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip first tick (fires immediately)
            interval.tick().await;

            info!(
                check_interval_ms = self.check_interval.as_millis(),
                "Output listener started"
            );

            loop {
                tokio::select! {
                    Some(notification) = self.notifications.recv() => {
                        self.handle_notification(notification).await;
                    }

                    _ = interval.tick() => {
                        self.check_health().await;
                    }

                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal, stopping output listener");
                        break;
                    }
                }
            }
        })
    }

    /// Apply one socket event to the job bookkeeping.
    pub async fn handle_notification(&self, notification: SheepNotification) {
        let SheepNotification { sheep, event } = notification;
        let result = match event {
            SheepEvent::Reply(Message::Done { job_id }) => {
                debug!(sheep = %sheep, job_id = %job_id, "Runner reported done");
                self.shepherd.complete_job(&job_id).await
            }
            SheepEvent::Reply(Message::Error { job_id, message }) => {
                debug!(sheep = %sheep, job_id = %job_id, "Runner reported error");
                self.shepherd.fail_job(&job_id, &message).await
            }
            SheepEvent::Reply(Message::Input { job_id, .. }) => {
                warn!(sheep = %sheep, job_id = %job_id, "Runner echoed an input message");
                Ok(())
            }
            SheepEvent::ProtocolFailure(e) => match e.job_id() {
                Some(job_id) => self.shepherd.fail_job(job_id, &e.to_string()).await,
                None => {
                    warn!(sheep = %sheep, error = %e, "Unattributable protocol error");
                    Ok(())
                }
            },
            SheepEvent::SendFailed { job_id, reason } => {
                self.shepherd
                    .fail_job(&job_id, &format!("Failed to send input to sheep '{sheep}': {reason}"))
                    .await
            }
            SheepEvent::Disconnected { unanswered } => {
                let reason = format!("Connection to sheep '{sheep}' was lost");
                let mut result = Ok(());
                for job_id in unanswered {
                    if let Err(e) = self.shepherd.resolve_or_fail(&job_id, &reason).await {
                        result = Err(e);
                    }
                }
                result
            }
        };

        if let Err(e) = result {
            error!(sheep = %sheep, error = %e, "Failed to record job outcome");
        }
    }

    /// One reconciliation pass over every in-flight job.
    pub async fn check_health(&self) {
        if let Err(e) = self.reconcile().await {
            error!(error = %e, "Health check failed");
        }
    }

    async fn reconcile(&self) -> ShepherdResult<()> {
        let in_flight = self.shepherd.in_flight().await;
        if in_flight.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let mut busy: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut overdue_sheep = BTreeSet::new();

        for (job_id, dispatch) in in_flight {
            if self.shepherd.has_marker(&job_id).await? {
                self.shepherd.forget(&job_id).await;
                continue;
            }
            if self.shepherd.reconcile_local(&job_id).await? {
                continue;
            }
            if let Some(timeout) = self.shepherd.job_timeout() {
                if dispatch.is_overdue(timeout, now) {
                    let reason = format!(
                        "Job timed out after {}s on sheep '{}'",
                        timeout.as_secs(),
                        dispatch.sheep
                    );
                    self.shepherd.fail_job(&job_id, &reason).await?;
                    overdue_sheep.insert(dispatch.sheep);
                    continue;
                }
            }
            busy.entry(dispatch.sheep).or_default().push(job_id);
        }

        for name in overdue_sheep {
            warn!(sheep = %name, "Slaughtering sheep with a timed out job");
            self.shepherd.get(&name)?.lock().await.slaughter().await;
        }

        for (name, jobs) in busy {
            let sheep_lock = self.shepherd.get(&name)?;
            let mut sheep = sheep_lock.lock().await;
            if sheep.is_alive().await {
                continue;
            }
            if matches!(sheep.status(), SheepStatus::Running | SheepStatus::Starting) {
                warn!(sheep = %name, jobs = jobs.len(), "Sheep is not running, failing its jobs");
                sheep.mark_failed();
            }
            drop(sheep);

            let reason = format!("Sheep '{name}' is not running");
            for job_id in jobs {
                self.shepherd.resolve_or_fail(&job_id, &reason).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryObjectStore;
    use crate::domain::models::{Config, DONE_MARKER, ERROR_MARKER};
    use crate::domain::ports::ObjectStore;
    use crate::infrastructure::messaging::ProtocolError;
    use tempfile::TempDir;

    fn listener(dir: &TempDir) -> (OutputListener, Arc<MemoryObjectStore>) {
        let storage = Arc::new(MemoryObjectStore::new());
        let config = Config {
            data_root: dir.path().to_path_buf(),
            ..Config::default()
        };
        let (shepherd, rx) = Shepherd::new(&config, storage.clone()).unwrap();
        (
            OutputListener::new(Arc::new(shepherd), rx, Duration::from_millis(50)),
            storage,
        )
    }

    fn notification(event: SheepEvent) -> SheepNotification {
        SheepNotification {
            sheep: "bare_sheep".to_string(),
            event,
        }
    }

    #[tokio::test]
    async fn test_error_reply_writes_marker() {
        let dir = TempDir::new().unwrap();
        let (listener, storage) = listener(&dir);

        listener
            .handle_notification(notification(SheepEvent::Reply(Message::Error {
                job_id: "job-1".to_string(),
                message: "bad input".to_string(),
            })))
            .await;

        assert_eq!(
            storage.get_object("job-1", ERROR_MARKER).await.unwrap(),
            b"bad input".to_vec()
        );
    }

    #[tokio::test]
    async fn test_attributed_protocol_error_fails_job() {
        let dir = TempDir::new().unwrap();
        let (listener, storage) = listener(&dir);

        let error = ProtocolError::Malformed {
            reason: "missing field".to_string(),
            job_id: Some("job-2".to_string()),
        };
        listener
            .handle_notification(notification(SheepEvent::ProtocolFailure(error)))
            .await;

        assert!(storage.object_exists("job-2", ERROR_MARKER).await.unwrap());
    }

    #[tokio::test]
    async fn test_disconnect_prefers_local_marker() {
        let dir = TempDir::new().unwrap();
        let (listener, storage) = listener(&dir);

        std::fs::create_dir_all(dir.path().join("job-3")).unwrap();
        std::fs::write(dir.path().join("job-3").join("done"), b"").unwrap();

        listener
            .handle_notification(notification(SheepEvent::Disconnected {
                unanswered: vec!["job-3".to_string(), "job-4".to_string()],
            }))
            .await;

        assert!(storage.object_exists("job-3", DONE_MARKER).await.unwrap());
        assert!(storage.object_exists("job-4", ERROR_MARKER).await.unwrap());
    }

    #[tokio::test]
    async fn test_check_health_with_nothing_in_flight() {
        let dir = TempDir::new().unwrap();
        let (listener, _) = listener(&dir);
        listener.check_health().await;
        assert!(listener.shepherd.in_flight().await.is_empty());
    }

    #[tokio::test]
    async fn test_health_tick_publishes_runner_done_marker() {
        let dir = TempDir::new().unwrap();
        let (listener, storage) = listener(&dir);
        listener.shepherd.reserve("job-5", "bare_sheep").await.unwrap();

        let job_dir = dir.path().join("job-5");
        std::fs::create_dir_all(job_dir.join("outputs")).unwrap();
        std::fs::write(job_dir.join("outputs").join("output.json"), br#"{"output": [2]}"#).unwrap();
        std::fs::write(job_dir.join("done"), b"").unwrap();

        listener.check_health().await;

        assert!(storage.object_exists("job-5", DONE_MARKER).await.unwrap());
        assert_eq!(
            storage.get_object("job-5", "outputs/output.json").await.unwrap(),
            br#"{"output": [2]}"#.to_vec()
        );
        assert!(!storage.object_exists("job-5", ERROR_MARKER).await.unwrap());
        assert!(listener.shepherd.in_flight().await.is_empty());
        assert!(listener.shepherd.is_job_done("job-5").await.unwrap());
    }

    #[tokio::test]
    async fn test_health_tick_publishes_runner_error_marker() {
        let dir = TempDir::new().unwrap();
        let (listener, storage) = listener(&dir);
        listener.shepherd.reserve("job-6", "bare_sheep").await.unwrap();

        std::fs::create_dir_all(dir.path().join("job-6")).unwrap();
        std::fs::write(dir.path().join("job-6").join("error"), b"out of memory").unwrap();

        listener.check_health().await;

        assert_eq!(
            storage.get_object("job-6", ERROR_MARKER).await.unwrap(),
            b"out of memory".to_vec()
        );
        assert!(listener.shepherd.in_flight().await.is_empty());
    }

    #[tokio::test]
    async fn test_health_tick_clears_job_with_storage_marker() {
        let dir = TempDir::new().unwrap();
        let (listener, storage) = listener(&dir);
        listener.shepherd.reserve("job-7", "bare_sheep").await.unwrap();
        storage.put_object("job-7", DONE_MARKER, Vec::new()).await.unwrap();

        listener.check_health().await;

        assert!(listener.shepherd.in_flight().await.is_empty());
        assert!(!storage.object_exists("job-7", ERROR_MARKER).await.unwrap());
    }

    #[tokio::test]
    async fn test_spawned_listener_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let (listener, _) = listener(&dir);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = listener.spawn(shutdown_rx);
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
