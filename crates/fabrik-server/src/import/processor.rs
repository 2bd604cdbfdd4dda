//! Batch processor
//!
//! Drives one claimed job to a terminal state: cancellation check and
//! idempotency check per batch, one transaction per batch write, progress
//! persisted after every batch, and a short throttle between batches so the
//! shared connection pool keeps serving the live ingestion path.

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::error::Result;
use super::sink::TelemetrySink;
use super::source::RowSource;
use super::store::JobStore;
use super::types::{ImportJob, JobStatus};

/// Outcome of a processor run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Done { rows_done: i64 },
    Cancelled { rows_done: i64 },
}

pub struct BatchProcessor<'a> {
    store: &'a dyn JobStore,
    sink: &'a dyn TelemetrySink,
    throttle: Duration,
}

impl<'a> BatchProcessor<'a> {
    pub fn new(store: &'a dyn JobStore, sink: &'a dyn TelemetrySink, throttle: Duration) -> Self {
        Self {
            store,
            sink,
            throttle,
        }
    }

    /// Process all batches of `source` for a job already in `running`.
    ///
    /// Any unrecoverable error fails the entire remaining job: the error is
    /// recorded on the job record and returned. There is no partial-batch
    /// retry; the operator retries the whole job and the idempotency check
    /// skips ranges that were already applied.
    pub async fn run(&self, job: &ImportJob, source: &mut dyn RowSource) -> Result<RunOutcome> {
        let batch_size = job.effective_batch_size();
        let mut rows_done: i64 = 0;
        let mut batch_no: u64 = 0;

        loop {
            // Cancellation is cooperative: observed at batch boundaries only,
            // so an in-flight batch transaction is never interrupted.
            if let Some(JobStatus::Cancelled) = self.store.status_of(job.id).await? {
                info!(job_id = %job.id, rows_done, "Job cancelled, stopping at batch boundary");
                self.store.mark_cancelled(job.id, rows_done).await?;
                return Ok(RunOutcome::Cancelled { rows_done });
            }

            let batch = match source.next_batch(batch_size).await {
                Ok(Some(batch)) if !batch.is_empty() => batch,
                Ok(_) => break,
                Err(e) => {
                    self.store.mark_failed(job.id, &e.job_message()).await?;
                    return Err(e);
                }
            };
            batch_no += 1;

            // Range-based idempotency check: if any rows already exist for
            // this asset over the batch's time span, the whole batch counts
            // as applied. Partial overlaps are skipped wholesale; a check
            // failure is non-fatal and processing continues as if clean.
            let range = match (batch.first(), batch.last()) {
                (Some(first), Some(last)) => first.asset_id.map(|a| (a, first.ts, last.ts)),
                _ => None,
            };
            if let Some((asset_id, start, end)) = range {
                match self.sink.count_range(asset_id, start, end).await {
                    Ok(existing) if existing > 0 => {
                        warn!(
                            job_id = %job.id,
                            batch = batch_no,
                            existing,
                            start = %start,
                            end = %end,
                            "Batch skipped (idempotent): rows already exist in range"
                        );
                        rows_done += batch.len() as i64;
                        self.store.update_progress(job.id, rows_done).await?;
                        sleep(self.throttle).await;
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            job_id = %job.id,
                            batch = batch_no,
                            error = %e,
                            "Range check failed, proceeding without idempotency guard"
                        );
                    }
                }
            }

            match self.sink.write_batch(&batch).await {
                Ok(written) => {
                    rows_done += written as i64;
                    debug!(
                        job_id = %job.id,
                        batch = batch_no,
                        written,
                        rows_done,
                        "Batch written"
                    );
                }
                Err(e) => {
                    self.store.mark_failed(job.id, &e.job_message()).await?;
                    return Err(e);
                }
            }

            self.store.update_progress(job.id, rows_done).await?;

            // Yield pool priority to the live ingestion path between batches.
            sleep(self.throttle).await;
        }

        self.store.mark_done(job.id, rows_done).await?;
        info!(job_id = %job.id, rows_done, "Job done");
        Ok(RunOutcome::Done { rows_done })
    }
}
