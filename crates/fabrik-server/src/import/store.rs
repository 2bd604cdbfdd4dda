//! Job record store
//!
//! The import_jobs table is the single source of truth for the engine and
//! the only synchronization point between server instances. The engine holds
//! no authoritative in-memory state about jobs beyond what it just read, so
//! any instance can crash and restart without corrupting the queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::error::{ImportError, Result};
use super::types::{CreateJobParams, ImportJob, JobStatus, SourceType, DEFAULT_BATCH_SIZE};

/// Persistence contract for import jobs.
///
/// `claim_one_pending` is the concurrency-critical operation: two concurrent
/// callers must never claim the same job. The Postgres implementation uses a
/// locking read with skip-locked semantics; the in-memory implementation
/// relies on its mutex for the equivalent compare-and-swap.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job in `pending`, normalizing batch size and source type.
    async fn create(&self, params: CreateJobParams) -> Result<Uuid>;

    /// Tenant-scoped read. A job owned by another factory is reported as absent.
    async fn get(&self, id: Uuid, factory_id: Uuid) -> Result<Option<ImportJob>>;

    /// Most-recent-first job listing for one factory.
    async fn list(&self, factory_id: Uuid, limit: i64) -> Result<Vec<ImportJob>>;

    /// Atomically claim the oldest pending job, transitioning it to `running`.
    /// Returns `None` when nothing is pending; never blocks.
    async fn claim_one_pending(&self) -> Result<Option<ImportJob>>;

    /// Claim one specific pending job for direct submission, stamping its
    /// row total. Returns `None` if the job is missing or not pending.
    async fn claim_pending_by_id(&self, id: Uuid, rows_total: i64) -> Result<Option<ImportJob>>;

    /// Monotonic progress write; leaves the status untouched.
    async fn update_progress(&self, id: Uuid, rows_done: i64) -> Result<()>;

    async fn mark_done(&self, id: Uuid, rows_done: i64) -> Result<()>;
    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<()>;
    async fn mark_cancelled(&self, id: Uuid, rows_done: i64) -> Result<()>;

    /// Request cancellation; valid only from `pending`/`running`.
    async fn request_cancel(&self, id: Uuid, factory_id: Uuid) -> Result<()>;

    /// Reset a `failed`/`cancelled` job to `pending`, clearing counters and
    /// the error message.
    async fn retry(&self, id: Uuid, factory_id: Uuid) -> Result<()>;

    /// Current status of a job; polled by the processor at batch boundaries
    /// for cooperative cancellation.
    async fn status_of(&self, id: Uuid) -> Result<Option<JobStatus>>;

    /// Reset jobs stuck in `running` longer than `cutoff` back to `pending`.
    /// Returns the number of recovered jobs.
    async fn recover_stale(&self, cutoff: Duration) -> Result<u64>;
}

/// Normalize creation parameters, rejecting invalid input up front so a bad
/// job never enters the queue.
pub(crate) fn normalize_params(params: CreateJobParams) -> Result<CreateJobParams> {
    if params.factory_id.is_nil() {
        return Err(ImportError::Validation("factory_id is required".into()));
    }
    let batch_size = match params.batch_size {
        Some(n) if n > 0 => n,
        _ => DEFAULT_BATCH_SIZE,
    };
    Ok(CreateJobParams {
        batch_size: Some(batch_size),
        source_type: Some(params.source_type.unwrap_or(SourceType::Preloaded)),
        source_config: Some(params.source_config.unwrap_or_else(|| serde_json::json!({}))),
        ..params
    })
}

// ─── Postgres implementation ────────────────────────────────────────────────

const JOB_COLUMNS: &str = "id, factory_id, asset_id, requested_by, status, source_type, \
     source_config, batch_size, rows_total, rows_done, period_start, period_end, \
     error_message, started_at, finished_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ImportJobRow {
    id: Uuid,
    factory_id: Uuid,
    asset_id: Option<Uuid>,
    requested_by: Option<Uuid>,
    status: String,
    source_type: String,
    source_config: serde_json::Value,
    batch_size: i32,
    rows_total: i64,
    rows_done: i64,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ImportJobRow> for ImportJob {
    fn from(row: ImportJobRow) -> Self {
        ImportJob {
            id: row.id,
            factory_id: row.factory_id,
            asset_id: row.asset_id,
            requested_by: row.requested_by,
            status: JobStatus::from(row.status),
            source_type: SourceType::from(row.source_type),
            source_config: row.source_config,
            batch_size: row.batch_size,
            rows_total: row.rows_total,
            rows_done: row.rows_done,
            period_start: row.period_start,
            period_end: row.period_end,
            error_message: row.error_message,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Postgres-backed job store shared by all server instances.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, params: CreateJobParams) -> Result<Uuid> {
        let params = normalize_params(params)?;
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO import_jobs
                (id, factory_id, asset_id, requested_by, source_type, source_config,
                 batch_size, period_start, period_end)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(params.factory_id)
        .bind(params.asset_id)
        .bind(params.requested_by)
        .bind(params.source_type.unwrap_or(SourceType::Preloaded).as_str())
        .bind(params.source_config.unwrap_or_else(|| serde_json::json!({})))
        .bind(params.batch_size.unwrap_or(DEFAULT_BATCH_SIZE))
        .bind(params.period_start)
        .bind(params.period_end)
        .execute(&self.pool)
        .await?;

        tracing::info!(job_id = %id, factory_id = %params.factory_id, "Import job created");
        Ok(id)
    }

    async fn get(&self, id: Uuid, factory_id: Uuid) -> Result<Option<ImportJob>> {
        let row = sqlx::query_as::<_, ImportJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs WHERE id = $1 AND factory_id = $2"
        ))
        .bind(id)
        .bind(factory_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ImportJob::from))
    }

    async fn list(&self, factory_id: Uuid, limit: i64) -> Result<Vec<ImportJob>> {
        let limit = if limit > 0 { limit.min(200) } else { 20 };
        let rows = sqlx::query_as::<_, ImportJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs \
             WHERE factory_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(factory_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ImportJob::from).collect())
    }

    async fn claim_one_pending(&self) -> Result<Option<ImportJob>> {
        // Single UPDATE with a locking sub-select: racing instances skip the
        // locked row, so exactly one claimer wins and the rest see nothing.
        let row = sqlx::query_as::<_, ImportJobRow>(&format!(
            r#"
            UPDATE import_jobs
            SET status = 'running', started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM import_jobs
                WHERE status = 'pending'
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ImportJob::from))
    }

    async fn claim_pending_by_id(&self, id: Uuid, rows_total: i64) -> Result<Option<ImportJob>> {
        let row = sqlx::query_as::<_, ImportJobRow>(&format!(
            r#"
            UPDATE import_jobs
            SET status = 'running', started_at = NOW(), rows_total = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(rows_total)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ImportJob::from))
    }

    async fn update_progress(&self, id: Uuid, rows_done: i64) -> Result<()> {
        sqlx::query("UPDATE import_jobs SET rows_done = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(rows_done)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_done(&self, id: Uuid, rows_done: i64) -> Result<()> {
        sqlx::query(
            "UPDATE import_jobs \
             SET status = 'done', rows_done = $2, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(rows_done)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE import_jobs \
             SET status = 'failed', error_message = $2, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_cancelled(&self, id: Uuid, rows_done: i64) -> Result<()> {
        sqlx::query(
            "UPDATE import_jobs \
             SET status = 'cancelled', rows_done = $2, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(rows_done)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn request_cancel(&self, id: Uuid, factory_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status = 'cancelled', finished_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND factory_id = $2 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(factory_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id, factory_id).await? {
                Some(job) => Err(ImportError::NotCancellable(job.status)),
                None => Err(ImportError::NotFound),
            };
        }
        tracing::info!(job_id = %id, "Import job cancellation requested");
        Ok(())
    }

    async fn retry(&self, id: Uuid, factory_id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status = 'pending', error_message = NULL, rows_done = 0, \
                 started_at = NULL, finished_at = NULL, updated_at = NOW() \
             WHERE id = $1 AND factory_id = $2 AND status IN ('failed', 'cancelled')",
        )
        .bind(id)
        .bind(factory_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id, factory_id).await? {
                Some(job) => Err(ImportError::NotRetryable(job.status)),
                None => Err(ImportError::NotFound),
            };
        }
        tracing::info!(job_id = %id, "Import job reset to pending for retry");
        Ok(())
    }

    async fn status_of(&self, id: Uuid) -> Result<Option<JobStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM import_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status.map(JobStatus::from))
    }

    async fn recover_stale(&self, cutoff: Duration) -> Result<u64> {
        let stale_before = Utc::now()
            - chrono::Duration::from_std(cutoff)
                .map_err(|e| ImportError::Validation(format!("invalid stale cutoff: {e}")))?;
        let result = sqlx::query(
            "UPDATE import_jobs \
             SET status = 'pending', error_message = 'worker restarted (auto-recovery)', \
                 rows_done = 0, started_at = NULL, updated_at = NOW() \
             WHERE status = 'running' AND updated_at < $1",
        )
        .bind(stale_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
