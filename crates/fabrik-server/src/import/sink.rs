//! Telemetry write path used by the import engine
//!
//! Each batch is persisted in a single transaction so a failing batch leaves
//! no partial rows behind. `count_range` backs the per-batch idempotency
//! check: any pre-existing rows for the batch's asset and time range mean
//! the batch was already applied by an earlier (possibly crashed) run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::error::Result;
use super::types::TelemetryRow;

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Persist one batch atomically. Returns the number of rows written.
    async fn write_batch(&self, rows: &[TelemetryRow]) -> Result<u64>;

    /// Count existing rows for an asset within `[start, end]`.
    async fn count_range(
        &self,
        asset_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64>;
}

/// Postgres sink writing into telemetry_log.
///
/// The pool is shared with the live ingestion path; the processor's
/// inter-batch throttle is what keeps bulk imports from starving it.
#[derive(Clone)]
pub struct PgTelemetrySink {
    pool: PgPool,
}

impl PgTelemetrySink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetrySink for PgTelemetrySink {
    async fn write_batch(&self, rows: &[TelemetryRow]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO telemetry_log \
                 (ts, factory_id, asset_id, metric_key, metric_value, status, correlation_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(row.ts)
            .bind(row.factory_id)
            .bind(row.asset_id)
            .bind(&row.metric_key)
            .bind(row.metric_value)
            .bind(&row.status)
            .bind(&row.correlation_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(rows.len() as u64)
    }

    async fn count_range(
        &self,
        asset_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM telemetry_log \
             WHERE asset_id = $1 AND ts >= $2 AND ts <= $3",
        )
        .bind(asset_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
