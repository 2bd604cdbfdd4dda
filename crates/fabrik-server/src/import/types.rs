//! Core types for the import-job engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rows per batch when a job does not configure its own size.
pub const DEFAULT_BATCH_SIZE: i32 = 1000;

/// Default number of jobs returned by a list query.
pub const DEFAULT_LIST_LIMIT: i64 = 20;

/// Import job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states never re-enter the queue except via an explicit retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "done" => JobStatus::Done,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            // A corrupted status column must not surface as claimable work
            // or be displayed as healthy.
            other => {
                tracing::warn!(status = other, "Unknown job status in store");
                JobStatus::Failed
            }
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the rows of a job come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Rows are materialized by the caller and handed to a running worker.
    Preloaded,
    /// Rows are paged from an external HTTP endpoint (extension point).
    RemoteHttp,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Preloaded => "preloaded",
            SourceType::RemoteHttp => "remote_http",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preloaded" => Some(SourceType::Preloaded),
            "remote_http" => Some(SourceType::RemoteHttp),
            _ => None,
        }
    }
}

impl From<String> for SourceType {
    fn from(s: String) -> Self {
        SourceType::parse(&s).unwrap_or(SourceType::Preloaded)
    }
}

/// One import job (maps to the import_jobs table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub factory_id: Uuid,
    pub asset_id: Option<Uuid>,
    pub requested_by: Option<Uuid>,
    pub status: JobStatus,
    pub source_type: SourceType,
    pub source_config: serde_json::Value,
    pub batch_size: i32,
    pub rows_total: i64,
    pub rows_done: i64,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJob {
    /// Effective rows per batch: the job's configured value or the engine default.
    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size > 0 {
            self.batch_size as usize
        } else {
            DEFAULT_BATCH_SIZE as usize
        }
    }
}

/// Parameters for creating a new import job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateJobParams {
    pub factory_id: Uuid,
    pub asset_id: Option<Uuid>,
    pub requested_by: Option<Uuid>,
    pub source_type: Option<SourceType>,
    pub source_config: Option<serde_json::Value>,
    pub batch_size: Option<i32>,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
}

/// Caller-facing status projection of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProjection {
    pub id: Uuid,
    pub factory_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<Uuid>,
    pub status: JobStatus,
    pub source_type: SourceType,
    pub batch_size: i32,
    pub rows_total: i64,
    pub rows_done: i64,
    pub progress_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ImportJob> for JobProjection {
    fn from(job: ImportJob) -> Self {
        let progress_pct = if job.rows_total > 0 {
            job.rows_done as f64 / job.rows_total as f64 * 100.0
        } else {
            0.0
        };
        Self {
            id: job.id,
            factory_id: job.factory_id,
            asset_id: job.asset_id,
            status: job.status,
            source_type: job.source_type,
            batch_size: job.batch_size,
            rows_total: job.rows_total,
            rows_done: job.rows_done,
            progress_pct,
            error_message: job.error_message,
            started_at: job.started_at,
            finished_at: job.finished_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// One telemetry reading (maps to the telemetry_log table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRow {
    pub ts: DateTime<Utc>,
    pub factory_id: Uuid,
    pub asset_id: Option<Uuid>,
    pub metric_key: String,
    pub metric_value: f64,
    pub status: String,
    pub correlation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_progress(rows_total: i64, rows_done: i64) -> ImportJob {
        ImportJob {
            id: Uuid::new_v4(),
            factory_id: Uuid::new_v4(),
            asset_id: None,
            requested_by: None,
            status: JobStatus::Running,
            source_type: SourceType::Preloaded,
            source_config: serde_json::json!({}),
            batch_size: 1000,
            rows_total,
            rows_done,
            period_start: None,
            period_end: None,
            error_message: None,
            started_at: Some(Utc::now()),
            finished_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Failed,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::from(status.as_str().to_string()), status);
        }
    }

    #[test]
    fn test_unknown_status_maps_to_failed() {
        // Never pending: a corrupted row must not look claimable or healthy.
        assert_eq!(JobStatus::from("bogus".to_string()), JobStatus::Failed);
        assert_eq!(JobStatus::from(String::new()), JobStatus::Failed);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Done.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_source_type_parse() {
        assert_eq!(SourceType::parse("preloaded"), Some(SourceType::Preloaded));
        assert_eq!(SourceType::parse("remote_http"), Some(SourceType::RemoteHttp));
        assert_eq!(SourceType::parse("csv"), None);
    }

    #[test]
    fn test_effective_batch_size_defaults_when_non_positive() {
        let mut job = job_with_progress(0, 0);
        job.batch_size = 0;
        assert_eq!(job.effective_batch_size(), DEFAULT_BATCH_SIZE as usize);
        job.batch_size = -5;
        assert_eq!(job.effective_batch_size(), DEFAULT_BATCH_SIZE as usize);
        job.batch_size = 250;
        assert_eq!(job.effective_batch_size(), 250);
    }

    #[test]
    fn test_progress_pct() {
        let projection = JobProjection::from(job_with_progress(2500, 1000));
        assert!((projection.progress_pct - 40.0).abs() < f64::EPSILON);

        let projection = JobProjection::from(job_with_progress(2500, 2000));
        assert!((projection.progress_pct - 80.0).abs() < f64::EPSILON);

        let projection = JobProjection::from(job_with_progress(2500, 2500));
        assert!((projection.progress_pct - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_progress_pct_zero_when_total_unknown() {
        let projection = JobProjection::from(job_with_progress(0, 0));
        assert_eq!(projection.progress_pct, 0.0);
    }
}
