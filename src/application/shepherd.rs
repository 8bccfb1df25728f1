//! The orchestrator: owns the fleet and the in-flight dispatch table.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::registry::SheepRegistry;
use super::sheep::{Sheep, SheepNotification};
use crate::adapters::storage::FsObjectStore;
use crate::domain::errors::{ShepherdError, ShepherdResult};
use crate::domain::models::{
    Config, Dispatch, JobMeta, ModelSpec, SheepKind, SheepStatus, DONE_MARKER, ERROR_MARKER, INPUTS_DIR,
    OUTPUTS_DIR,
};
use crate::domain::ports::ObjectStore;
use crate::infrastructure::messaging::Message;

/// Capacity of the channel carrying socket events to the output listener.
const NOTIFICATION_CAPACITY: usize = 256;

/// Point-in-time view of one sheep, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct SheepReport {
    pub name: String,
    pub kind: SheepKind,
    pub port: u16,
    pub devices: Vec<String>,
    pub status: SheepStatus,
    pub model: Option<ModelSpec>,
    pub alive: bool,
}

/// Dispatches jobs to sheep and tracks them until a terminal marker exists.
///
/// Lock order is sheep, then outcomes, then jobs; the jobs table is never
/// held across another lock acquisition. `outcomes` serializes marker
/// writes so a job never ends up with both `done` and `error`.
pub struct Shepherd {
    sheep: BTreeMap<String, Mutex<Sheep>>,
    jobs: Mutex<HashMap<String, Dispatch>>,
    outcomes: Mutex<()>,
    storage: Arc<dyn ObjectStore>,
    local: FsObjectStore,
    data_root: PathBuf,
    job_timeout: Option<Duration>,
}

impl Shepherd {
    /// Build the fleet from `config`.
    ///
    /// Returns the receiving end of the socket event channel, which belongs
    /// to the `OutputListener`.
    pub fn new(
        config: &Config,
        storage: Arc<dyn ObjectStore>,
    ) -> ShepherdResult<(Self, mpsc::Receiver<SheepNotification>)> {
        let (notifier, notifications) = mpsc::channel(NOTIFICATION_CAPACITY);
        let fleet = SheepRegistry::build(config, &notifier)?;

        info!(
            sheep = fleet.len(),
            data_root = %config.data_root.display(),
            "Shepherd initialized"
        );

        let shepherd = Self {
            sheep: fleet.into_iter().map(|(name, sheep)| (name, Mutex::new(sheep))).collect(),
            jobs: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(()),
            storage,
            local: FsObjectStore::new(&config.data_root),
            data_root: config.data_root.clone(),
            job_timeout: config.health.job_timeout(),
        };
        Ok((shepherd, notifications))
    }

    pub const fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout
    }

    /// Look up a sheep by name.
    pub fn get(&self, name: &str) -> ShepherdResult<&Mutex<Sheep>> {
        self.sheep
            .get(name)
            .ok_or_else(|| ShepherdError::UnknownSheep(name.to_string()))
    }

    /// Iterate over `(name, sheep)` pairs. Each call walks the live fleet.
    pub fn get_status(&self) -> impl Iterator<Item = (&str, &Mutex<Sheep>)> {
        self.sheep.iter().map(|(name, sheep)| (name.as_str(), sheep))
    }

    /// Probe every sheep and collect a report.
    pub async fn status_report(&self) -> Vec<SheepReport> {
        let mut reports = Vec::with_capacity(self.sheep.len());
        for (name, sheep) in self.get_status() {
            let mut sheep = sheep.lock().await;
            let alive = sheep.is_alive().await;
            reports.push(SheepReport {
                name: name.to_string(),
                kind: sheep.kind(),
                port: sheep.port(),
                devices: sheep.devices().to_vec(),
                status: sheep.status(),
                model: sheep.model().cloned(),
                alive,
            });
        }
        reports
    }

    /// Dispatch a job to the sheep named in `meta`.
    ///
    /// Returns once the Input is queued or the job has been failed right
    /// away because its sheep could not be started. A job id that is in
    /// flight or already has a terminal marker is rejected.
    pub async fn enqueue_job(&self, job_id: &str, meta: &JobMeta) -> ShepherdResult<()> {
        validate_job_id(job_id)?;
        let sheep_lock = self.get(&meta.sheep)?;
        let mut sheep = sheep_lock.lock().await;

        if self.has_marker(job_id).await? {
            return Err(ShepherdError::DuplicateJob(job_id.to_string()));
        }
        self.reserve(job_id, &meta.sheep).await?;

        if let Err(e) = self.stage_inputs(job_id).await {
            self.forget(job_id).await;
            return Err(e);
        }

        if !sheep.serves(&meta.model).await {
            for stale in self.take_jobs_of(&meta.sheep, job_id).await {
                let reason = format!(
                    "Sheep '{}' was restarted to serve {} before the job finished",
                    meta.sheep, meta.model
                );
                self.resolve_or_fail(&stale, &reason).await?;
            }

            if let Err(e) = sheep.start(&meta.model).await {
                warn!(job_id, sheep = %meta.sheep, error = %e, "Sheep failed to start, failing job");
                self.fail_job(job_id, &e.to_string()).await?;
                return Ok(());
            }
            // the timeout clock starts at dispatch, not at reservation
            self.jobs
                .lock()
                .await
                .insert(job_id.to_string(), Dispatch::new(meta.sheep.clone()));
        }

        let input = Message::Input {
            job_id: job_id.to_string(),
            io_data_root: self.data_root.clone(),
        };
        if let Err(e) = sheep.send(input) {
            warn!(job_id, sheep = %meta.sheep, error = %e, "Dispatch failed");
            self.fail_job(job_id, &e.to_string()).await?;
            return Ok(());
        }

        info!(job_id, sheep = %meta.sheep, model = %meta.model, "Job dispatched");
        Ok(())
    }

    /// Whether a terminal marker exists for the job.
    pub async fn is_job_done(&self, job_id: &str) -> ShepherdResult<bool> {
        validate_job_id(job_id)?;
        if self.has_marker(job_id).await? {
            self.forget(job_id).await;
            return Ok(true);
        }
        if self.jobs.lock().await.contains_key(job_id) {
            return Ok(false);
        }
        Err(ShepherdError::UnknownJob(job_id.to_string()))
    }

    /// The failure reason of a finished job, if it failed.
    pub async fn job_error(&self, job_id: &str) -> ShepherdResult<Option<String>> {
        validate_job_id(job_id)?;
        if !self.storage.object_exists(job_id, ERROR_MARKER).await? {
            return Ok(None);
        }
        let payload = self.storage.get_object(job_id, ERROR_MARKER).await?;
        Ok(Some(String::from_utf8_lossy(&payload).into_owned()))
    }

    /// Slaughter every sheep. Never fails.
    pub async fn kill_all(&self) {
        info!(sheep = self.sheep.len(), "Slaughtering all sheep");
        join_all(self.sheep.values().map(|sheep| async move {
            sheep.lock().await.slaughter().await;
        }))
        .await;
    }

    /// Snapshot of the in-flight dispatch table.
    pub async fn in_flight(&self) -> Vec<(String, Dispatch)> {
        self.jobs
            .lock()
            .await
            .iter()
            .map(|(id, dispatch)| (id.clone(), dispatch.clone()))
            .collect()
    }

    pub(crate) async fn forget(&self, job_id: &str) {
        self.jobs.lock().await.remove(job_id);
    }

    /// Record `job_id` as in flight on `sheep`, unless it already is.
    pub(crate) async fn reserve(&self, job_id: &str, sheep: &str) -> ShepherdResult<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(job_id) {
            return Err(ShepherdError::DuplicateJob(job_id.to_string()));
        }
        jobs.insert(job_id.to_string(), Dispatch::new(sheep.to_string()));
        Ok(())
    }

    async fn take_jobs_of(&self, sheep: &str, keep: &str) -> Vec<String> {
        let mut jobs = self.jobs.lock().await;
        let ids: Vec<String> = jobs
            .iter()
            .filter(|(id, dispatch)| dispatch.sheep == sheep && id.as_str() != keep)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            jobs.remove(id);
        }
        ids
    }

    /// Whether storage holds a `done` or `error` marker for the job.
    pub(crate) async fn has_marker(&self, job_id: &str) -> ShepherdResult<bool> {
        Ok(self.storage.object_exists(job_id, DONE_MARKER).await?
            || self.storage.object_exists(job_id, ERROR_MARKER).await?)
    }

    /// Upload the runner's outputs and mark the job done.
    pub(crate) async fn complete_job(&self, job_id: &str) -> ShepherdResult<()> {
        let _outcome = self.outcomes.lock().await;
        if self.has_marker(job_id).await? {
            self.forget(job_id).await;
            return Ok(());
        }

        let outputs = self.local.list_objects(job_id, &format!("{OUTPUTS_DIR}/")).await?;
        for key in &outputs {
            let data = self.local.get_object(job_id, key).await?;
            self.storage.put_object(job_id, key, data).await?;
        }
        self.storage.put_object(job_id, DONE_MARKER, Vec::new()).await?;
        self.forget(job_id).await;

        info!(job_id, outputs = outputs.len(), "Job done");
        Ok(())
    }

    /// Write an error marker carrying `reason`.
    pub(crate) async fn fail_job(&self, job_id: &str, reason: &str) -> ShepherdResult<()> {
        let _outcome = self.outcomes.lock().await;
        if self.has_marker(job_id).await? {
            self.forget(job_id).await;
            return Ok(());
        }

        self.storage
            .put_object(job_id, ERROR_MARKER, reason.as_bytes().to_vec())
            .await?;
        self.forget(job_id).await;

        warn!(job_id, reason, "Job failed");
        Ok(())
    }

    /// Publish a marker the runner left in the data root.
    ///
    /// Returns whether the job was resolved this way.
    pub(crate) async fn reconcile_local(&self, job_id: &str) -> ShepherdResult<bool> {
        if self.local.object_exists(job_id, DONE_MARKER).await? {
            debug!(job_id, "Found local done marker");
            self.complete_job(job_id).await?;
            return Ok(true);
        }
        if self.local.object_exists(job_id, ERROR_MARKER).await? {
            debug!(job_id, "Found local error marker");
            let payload = self.local.get_object(job_id, ERROR_MARKER).await?;
            self.fail_job(job_id, &String::from_utf8_lossy(&payload)).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Resolve from a local marker when the runner left one, fail otherwise.
    pub(crate) async fn resolve_or_fail(&self, job_id: &str, reason: &str) -> ShepherdResult<()> {
        if !self.reconcile_local(job_id).await? {
            self.fail_job(job_id, reason).await?;
        }
        Ok(())
    }

    /// Copy the job's inputs from storage into the data root and clear any
    /// markers left by an earlier run.
    async fn stage_inputs(&self, job_id: &str) -> ShepherdResult<()> {
        let inputs = self.storage.list_objects(job_id, &format!("{INPUTS_DIR}/")).await?;
        for key in &inputs {
            let data = self.storage.get_object(job_id, key).await?;
            self.local.put_object(job_id, key, data).await?;
        }

        let job_dir = self.data_root.join(job_id);
        for marker in [DONE_MARKER, ERROR_MARKER] {
            match tokio::fs::remove_file(job_dir.join(marker)).await {
                Ok(()) => debug!(job_id, marker, "Removed stale local marker"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tokio::fs::create_dir_all(&job_dir).await?;

        debug!(job_id, inputs = inputs.len(), "Inputs staged");
        Ok(())
    }
}

/// Job ids name a storage bucket and a data root directory, so they must
/// be a single path segment.
fn validate_job_id(job_id: &str) -> ShepherdResult<()> {
    if job_id.is_empty() || job_id == "." || job_id == ".." || job_id.contains(['/', '\\']) {
        return Err(ShepherdError::InvalidJobId(job_id.to_string()));
    }
    Ok(())
}

impl std::fmt::Debug for Shepherd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shepherd")
            .field("sheep", &self.sheep.keys().collect::<Vec<_>>())
            .field("data_root", &self.data_root)
            .field("job_timeout", &self.job_timeout)
            .finish_non_exhaustive()
    }
}
