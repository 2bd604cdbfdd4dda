//! Row sources feeding the batch processor
//!
//! A source yields batches in order until exhausted. Sources are not
//! restartable; reprocessing a job means submitting it again.

use async_trait::async_trait;

use super::error::{ImportError, Result};
use super::types::{ImportJob, SourceType, TelemetryRow};

#[async_trait]
pub trait RowSource: Send {
    /// Total number of rows, when known upfront.
    fn rows_total(&self) -> Option<i64>;

    /// Yield the next batch of at most `batch_size` rows, or `None` when the
    /// source is exhausted. Errors here fail the whole job; a source must
    /// never silently drop rows.
    async fn next_batch(&mut self, batch_size: usize) -> Result<Option<Vec<TelemetryRow>>>;
}

/// Source over rows already materialized by the caller.
pub struct PreloadedSource {
    rows: Vec<TelemetryRow>,
    offset: usize,
}

impl PreloadedSource {
    pub fn new(rows: Vec<TelemetryRow>) -> Self {
        Self { rows, offset: 0 }
    }
}

#[async_trait]
impl RowSource for PreloadedSource {
    fn rows_total(&self) -> Option<i64> {
        Some(self.rows.len() as i64)
    }

    async fn next_batch(&mut self, batch_size: usize) -> Result<Option<Vec<TelemetryRow>>> {
        if self.offset >= self.rows.len() {
            return Ok(None);
        }
        let batch_size = batch_size.max(1);
        let end = (self.offset + batch_size).min(self.rows.len());
        let batch = self.rows[self.offset..end].to_vec();
        self.offset = end;
        Ok(Some(batch))
    }
}

/// Extension point: page historical data from an external HTTP endpoint
/// described by the job's source_config. Until implemented, any job routed
/// here fails explicitly instead of silently losing data.
pub struct RemoteHttpSource {
    #[allow(dead_code)]
    config: serde_json::Value,
}

impl RemoteHttpSource {
    pub fn new(config: serde_json::Value) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RowSource for RemoteHttpSource {
    fn rows_total(&self) -> Option<i64> {
        None
    }

    async fn next_batch(&mut self, _batch_size: usize) -> Result<Option<Vec<TelemetryRow>>> {
        Err(ImportError::Source(
            "remote_http import is not implemented in this version".into(),
        ))
    }
}

/// Build the source for a polled job. Preloaded jobs have no source here:
/// their rows only exist on the direct-submission path.
pub fn source_for_polled_job(job: &ImportJob) -> Result<Box<dyn RowSource>> {
    match job.source_type {
        SourceType::Preloaded => Err(ImportError::Source(
            "preloaded job claimed via poll (no row set attached); \
             use the data submission endpoint"
                .into(),
        )),
        SourceType::RemoteHttp => Ok(Box::new(RemoteHttpSource::new(job.source_config.clone()))),
    }
}
