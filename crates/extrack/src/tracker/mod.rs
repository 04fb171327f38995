//! Extraction job state machine.
//!
//! [`JobTracker`] owns every write to job records, active-job pointers and
//! cancellation flags. Workers report [`ProgressEvent`]s; observers read
//! records back with [`JobTracker::get_job`] or stream them through
//! [`JobTracker::subscribe`].
//!
//! Status only moves forward. Once a record is completed, failed or
//! cancelled, later events for it are ignored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::broadcast::JobUpdateBroadcaster;
use crate::config::TtlConfig;
use crate::error::TrackerError;
use crate::store::{get_json, keys, set_json, JobStore};

pub mod cancellation;
pub mod classify;
pub mod event;
pub mod progress;
pub mod record;
pub mod registry;

pub use cancellation::CancellationProbe;
pub use classify::{
    classify_error, classify_error_chain, classify_message, Classification, ErrorCategory,
};
pub use event::{EventType, ProgressEvent};
pub use progress::{calculate_progress, Phase};
pub use record::{make_job_id, ErrorInfo, JobRecord, JobStatus};
pub use registry::ActiveJobRegistry;

const CANCELLED_MESSAGE: &str = "Job cancelled by user";

pub struct JobTracker {
    store: Arc<dyn JobStore>,
    registry: ActiveJobRegistry,
    ttl: TtlConfig,
    updates: JobUpdateBroadcaster,
}

impl JobTracker {
    pub fn new(store: Arc<dyn JobStore>, ttl: TtlConfig) -> Self {
        let registry = ActiveJobRegistry::new(Arc::clone(&store), ttl.active_pointer());
        Self {
            store,
            registry,
            ttl,
            updates: JobUpdateBroadcaster::default(),
        }
    }

    /// Publishes record updates on an existing broadcaster instead of a
    /// private one.
    pub fn with_broadcaster(mut self, updates: JobUpdateBroadcaster) -> Self {
        self.updates = updates;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn ttl(&self) -> &TtlConfig {
        &self.ttl
    }

    /// Creates a pending job and makes it the owner's active job.
    ///
    /// Fails with [`TrackerError::AlreadyActive`] if the owner already has
    /// one; nothing is written in that case.
    pub async fn create_job(
        &self,
        owner_id: u64,
        document_id: u64,
    ) -> Result<JobRecord, TrackerError> {
        let record = JobRecord::new(owner_id, document_id, Utc::now());

        if let Some(existing) = self.registry.claim(owner_id, &record.job_id).await? {
            log::warn!(
                "Owner {} already has active extraction job {}",
                owner_id,
                existing
            );
            return Err(TrackerError::AlreadyActive(existing));
        }

        if let Err(e) = self.save(&record).await {
            if let Err(release_err) = self.registry.release(owner_id, &record.job_id).await {
                log::warn!(
                    "Failed to release active job pointer for owner {}: {}",
                    owner_id,
                    release_err
                );
            }
            return Err(e);
        }

        log::info!(
            "Created extraction job {} for document {} (owner {})",
            record.job_id,
            document_id,
            owner_id
        );
        self.updates.send(record.clone());

        Ok(record)
    }

    /// Folds a progress event into the job's record and persists it.
    ///
    /// Returns the record as stored. Events for a terminal record leave it
    /// unchanged.
    pub async fn apply_event(
        &self,
        job_id: &str,
        event: &ProgressEvent,
    ) -> Result<JobRecord, TrackerError> {
        let current = self.get_job(job_id).await?;

        if current.is_terminal() {
            log::debug!(
                "Ignoring {:?} event for job {} in terminal status {}",
                event.event_type,
                job_id,
                current.status
            );
            return Ok(current);
        }

        let mut record = current;
        fold_event(&mut record, event, Utc::now());
        self.save(&record).await?;

        match record.status {
            JobStatus::Completed | JobStatus::Failed => {
                log::info!("Job {} finished with status {}", job_id, record.status);
                self.release_pointer(&record).await;
            }
            _ => {
                log::trace!(
                    "Job {} at {}% ({}): {}",
                    job_id,
                    record.progress,
                    record.current_phase,
                    record.message
                );
            }
        }

        self.updates.send(record.clone());
        Ok(record)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<JobRecord, TrackerError> {
        get_json::<JobRecord>(self.store.as_ref(), &keys::job_state(job_id))
            .await?
            .ok_or_else(|| TrackerError::NotFound(job_id.to_string()))
    }

    /// Returns the owner's in-flight job id, if any.
    pub async fn get_active_job(&self, owner_id: u64) -> Result<Option<String>, TrackerError> {
        Ok(self.registry.get(owner_id).await?)
    }

    /// Drops the owner's active-job pointer regardless of which job it names.
    pub async fn clear_active_job(&self, owner_id: u64) -> Result<(), TrackerError> {
        self.registry.clear(owner_id).await?;
        log::info!("Cleared active job pointer for owner {}", owner_id);
        Ok(())
    }

    /// Requests cancellation of a job.
    ///
    /// A pending or processing job becomes cancelled. The flag workers poll
    /// is raised before the record is rewritten; a cancelled record never
    /// exists without a flag having been raised. A terminal job is left as
    /// is, but a pointer still naming it is released, and an already
    /// cancelled job gets its flag raised again.
    pub async fn cancel_job(&self, job_id: &str) -> Result<JobRecord, TrackerError> {
        let mut record = self.get_job(job_id).await?;

        if record.is_terminal() {
            log::debug!(
                "Job {} already {}; only releasing a stale pointer",
                job_id,
                record.status
            );
            if record.status == JobStatus::Cancelled {
                self.raise_cancel_flag(job_id).await?;
            }
            self.registry.release(record.owner_id, job_id).await?;
            return Ok(record);
        }

        self.raise_cancel_flag(job_id).await?;

        let now = Utc::now();
        record.status = JobStatus::Cancelled;
        record.message = CANCELLED_MESSAGE.to_string();
        record.updated_at = now;
        record.completed_at = Some(now);

        self.save(&record).await?;
        self.registry.release(record.owner_id, job_id).await?;

        log::info!("Cancelled extraction job {}", job_id);
        self.updates.send(record.clone());

        Ok(record)
    }

    /// Attaches result ids to an existing job without changing its status.
    ///
    /// The record is rewritten with the TTL for its current status, so its
    /// retention window restarts.
    pub async fn set_job_result(
        &self,
        job_id: &str,
        result_ids: Vec<u64>,
    ) -> Result<JobRecord, TrackerError> {
        let mut record = self.get_job(job_id).await?;
        record.result_ids = Some(result_ids);
        record.updated_at = Utc::now();

        self.save(&record).await?;

        log::debug!(
            "Attached {} result ids to job {} ({})",
            record.result_ids.as_ref().map_or(0, Vec::len),
            job_id,
            record.status
        );
        self.updates.send(record.clone());
        Ok(record)
    }

    /// True while the job's cancellation flag is live. Store errors read as
    /// not cancelled.
    pub async fn is_cancelled(&self, job_id: &str) -> bool {
        match self.store.get(&keys::cancel_flag(job_id)).await {
            Ok(flag) => flag.is_some(),
            Err(e) => {
                log::warn!("Failed to read cancellation flag for job {}: {}", job_id, e);
                false
            }
        }
    }

    /// Cancellation probe for the worker running `job_id`.
    pub fn probe(&self, job_id: &str) -> CancellationProbe {
        CancellationProbe::new(Arc::clone(&self.store), job_id)
    }

    /// Stream of every record this tracker writes.
    pub fn subscribe(&self) -> broadcast::Receiver<JobRecord> {
        self.updates.subscribe()
    }

    async fn raise_cancel_flag(&self, job_id: &str) -> Result<(), TrackerError> {
        self.store
            .set(&keys::cancel_flag(job_id), "1", self.ttl.cancel_flag())
            .await?;
        Ok(())
    }

    async fn save(&self, record: &JobRecord) -> Result<(), TrackerError> {
        set_json(
            self.store.as_ref(),
            &keys::job_state(&record.job_id),
            record,
            self.ttl.for_status(record.status),
        )
        .await?;
        Ok(())
    }

    /// Best-effort pointer release after a terminal transition. The pointer
    /// TTL bounds how long a failed release can block the owner.
    async fn release_pointer(&self, record: &JobRecord) {
        if let Err(e) = self.registry.release(record.owner_id, &record.job_id).await {
            log::warn!(
                "Failed to release active job pointer for owner {}: {}",
                record.owner_id,
                e
            );
        }
    }
}

/// Applies one event to a non-terminal record.
fn fold_event(record: &mut JobRecord, event: &ProgressEvent, now: DateTime<Utc>) {
    record.progress = event.progress.min(100);
    record.current_phase = event.phase.clone();
    record.message = event.message.clone();
    record.updated_at = now;

    if event.total_chunks > 0 {
        record.total_chunks = event.total_chunks;
    }
    if event.completed_chunks > 0 {
        record.completed_chunks = event.completed_chunks;
    }
    if event.failed_chunks > 0 {
        record.failed_chunks = event.failed_chunks;
    }

    match event.event_type {
        EventType::Started => record.status = JobStatus::Processing,
        EventType::Complete => {
            record.status = JobStatus::Completed;
            record.completed_at = Some(now);
            if !event.result_ids.is_empty() {
                record.result_ids = Some(event.result_ids.clone());
            }
        }
        EventType::Error => {
            record.status = JobStatus::Failed;
            record.completed_at = Some(now);
            record.error_info = Some(ErrorInfo {
                message: event
                    .error_message
                    .clone()
                    .unwrap_or_else(|| event.message.clone()),
                category: event.error_category.unwrap_or(ErrorCategory::Unknown),
            });
        }
        EventType::Warning => {
            if event.retry_count > 0 {
                record.retry_count = Some(event.retry_count);
            }
        }
        EventType::Progress | EventType::Info | EventType::Debug => {}
    }
}
