//! In-memory store and sink
//!
//! Mutex-guarded implementations of [`JobStore`] and [`TelemetrySink`] with
//! the same transition semantics as the Postgres versions. Used by the test
//! suite and for single-process embedded deployments; the mutex provides the
//! claim atomicity that `FOR UPDATE SKIP LOCKED` provides in Postgres.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use super::error::{ImportError, Result};
use super::sink::TelemetrySink;
use super::store::{normalize_params, JobStore};
use super::types::{
    CreateJobParams, ImportJob, JobStatus, SourceType, TelemetryRow, DEFAULT_BATCH_SIZE,
};

// A poisoned mutex here only means some caller panicked mid-update; the
// guarded data is still structurally valid, so keep serving it instead of
// propagating the panic to every later caller.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryJobStore {
    // Insertion order doubles as creation order for oldest-first claiming.
    jobs: Mutex<Vec<ImportJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, params: CreateJobParams) -> Result<Uuid> {
        let params = normalize_params(params)?;
        let now = Utc::now();
        let job = ImportJob {
            id: Uuid::new_v4(),
            factory_id: params.factory_id,
            asset_id: params.asset_id,
            requested_by: params.requested_by,
            status: JobStatus::Pending,
            source_type: params.source_type.unwrap_or(SourceType::Preloaded),
            source_config: params.source_config.unwrap_or_else(|| serde_json::json!({})),
            batch_size: params.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            rows_total: 0,
            rows_done: 0,
            period_start: params.period_start,
            period_end: params.period_end,
            error_message: None,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        };
        let id = job.id;
        lock(&self.jobs).push(job);
        Ok(id)
    }

    async fn get(&self, id: Uuid, factory_id: Uuid) -> Result<Option<ImportJob>> {
        let jobs = lock(&self.jobs);
        Ok(jobs
            .iter()
            .find(|j| j.id == id && j.factory_id == factory_id)
            .cloned())
    }

    async fn list(&self, factory_id: Uuid, limit: i64) -> Result<Vec<ImportJob>> {
        let limit = if limit > 0 { limit.min(200) } else { 20 } as usize;
        let jobs = lock(&self.jobs);
        Ok(jobs
            .iter()
            .rev()
            .filter(|j| j.factory_id == factory_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn claim_one_pending(&self) -> Result<Option<ImportJob>> {
        let mut jobs = lock(&self.jobs);
        let claimed = jobs.iter_mut().find(|j| j.status == JobStatus::Pending);
        Ok(claimed.map(|job| {
            let now = Utc::now();
            job.status = JobStatus::Running;
            job.started_at = Some(now);
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn claim_pending_by_id(&self, id: Uuid, rows_total: i64) -> Result<Option<ImportJob>> {
        let mut jobs = lock(&self.jobs);
        let claimed = jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Pending);
        Ok(claimed.map(|job| {
            let now = Utc::now();
            job.status = JobStatus::Running;
            job.started_at = Some(now);
            job.rows_total = rows_total;
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn update_progress(&self, id: Uuid, rows_done: i64) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            job.rows_done = rows_done;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_done(&self, id: Uuid, rows_done: i64) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            let now = Utc::now();
            job.status = JobStatus::Done;
            job.rows_done = rows_done;
            job.finished_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            let now = Utc::now();
            job.status = JobStatus::Failed;
            job.error_message = Some(message.to_string());
            job.finished_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    async fn mark_cancelled(&self, id: Uuid, rows_done: i64) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        if let Some(job) = jobs.iter_mut().find(|j| j.id == id) {
            let now = Utc::now();
            job.status = JobStatus::Cancelled;
            job.rows_done = rows_done;
            job.finished_at = Some(now);
            job.updated_at = now;
        }
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid, factory_id: Uuid) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id && j.factory_id == factory_id)
            .ok_or(ImportError::NotFound)?;
        match job.status {
            JobStatus::Pending | JobStatus::Running => {
                let now = Utc::now();
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(now);
                job.updated_at = now;
                Ok(())
            }
            status => Err(ImportError::NotCancellable(status)),
        }
    }

    async fn retry(&self, id: Uuid, factory_id: Uuid) -> Result<()> {
        let mut jobs = lock(&self.jobs);
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id && j.factory_id == factory_id)
            .ok_or(ImportError::NotFound)?;
        match job.status {
            JobStatus::Failed | JobStatus::Cancelled => {
                job.status = JobStatus::Pending;
                job.error_message = None;
                job.rows_done = 0;
                job.started_at = None;
                job.finished_at = None;
                job.updated_at = Utc::now();
                Ok(())
            }
            status => Err(ImportError::NotRetryable(status)),
        }
    }

    async fn status_of(&self, id: Uuid) -> Result<Option<JobStatus>> {
        let jobs = lock(&self.jobs);
        Ok(jobs.iter().find(|j| j.id == id).map(|j| j.status))
    }

    async fn recover_stale(&self, cutoff: Duration) -> Result<u64> {
        let stale_before = Utc::now()
            - chrono::Duration::from_std(cutoff)
                .map_err(|e| ImportError::Validation(format!("invalid stale cutoff: {e}")))?;
        let mut jobs = lock(&self.jobs);
        let mut recovered = 0;
        for job in jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Running && j.updated_at < stale_before)
        {
            job.status = JobStatus::Pending;
            job.error_message = Some("worker restarted (auto-recovery)".to_string());
            job.rows_done = 0;
            job.started_at = None;
            job.updated_at = Utc::now();
            recovered += 1;
        }
        Ok(recovered)
    }
}

/// In-memory telemetry sink.
#[derive(Default)]
pub struct MemoryTelemetrySink {
    rows: Mutex<Vec<TelemetryRow>>,
}

impl MemoryTelemetrySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        lock(&self.rows).len()
    }

    pub fn rows(&self) -> Vec<TelemetryRow> {
        lock(&self.rows).clone()
    }
}

#[async_trait]
impl TelemetrySink for MemoryTelemetrySink {
    async fn write_batch(&self, rows: &[TelemetryRow]) -> Result<u64> {
        let mut stored = lock(&self.rows);
        stored.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn count_range(
        &self,
        asset_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let rows = lock(&self.rows);
        Ok(rows
            .iter()
            .filter(|r| r.asset_id == Some(asset_id) && r.ts >= start && r.ts <= end)
            .count() as i64)
    }
}
