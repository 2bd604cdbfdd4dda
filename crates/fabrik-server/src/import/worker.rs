//! Background import worker
//!
//! One worker per process instance. Two event sources feed a single
//! sequential execution loop: a fixed-interval poll that claims at most one
//! pending job from the shared store, and an in-process submission channel
//! carrying preloaded row sets for jobs that should run immediately. Jobs
//! are processed one at a time; multiple instances may run the same loop
//! against the same store and coordinate solely through the atomic claim.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::error::{ImportError, Result};
use super::processor::{BatchProcessor, RunOutcome};
use super::recovery;
use super::sink::TelemetrySink;
use super::source::{source_for_polled_job, PreloadedSource, RowSource};
use super::store::JobStore;
use super::types::{ImportJob, TelemetryRow};

/// Worker tuning knobs. Defaults match the production deployment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// How often to look for pending jobs.
    pub poll_interval: Duration,
    /// Sleep between batches so bulk imports do not starve live ingest.
    pub batch_throttle: Duration,
    /// Jobs `running` with no update for longer than this are considered
    /// orphaned by the startup sweep.
    pub stale_cutoff: Duration,
    /// Hard per-job runtime bound; exceeding it fails the job.
    pub max_runtime: Duration,
    /// Buffered capacity of the direct-submission channel.
    pub submit_queue_depth: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_throttle: Duration::from_millis(50),
            stale_cutoff: Duration::from_secs(600),
            max_runtime: Duration::from_secs(6 * 3600),
            submit_queue_depth: 8,
        }
    }
}

struct SubmitRequest {
    job_id: Uuid,
    rows: Vec<TelemetryRow>,
    reply: oneshot::Sender<Result<RunOutcome>>,
}

/// Cloneable handle for talking to a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<SubmitRequest>,
    shutdown: CancellationToken,
}

impl WorkerHandle {
    /// Hand a preloaded row set to the worker for a job already recorded as
    /// `pending`, and block until the job reaches a terminal state.
    pub async fn submit_preloaded(
        &self,
        job_id: Uuid,
        rows: Vec<TelemetryRow>,
    ) -> Result<RunOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SubmitRequest {
                job_id,
                rows,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ImportError::WorkerUnavailable)?;
        reply_rx.await.map_err(|_| ImportError::WorkerUnavailable)?
    }

    /// Ask the worker loop to stop after the current job.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

pub struct ImportWorker<S, K> {
    store: Arc<S>,
    sink: Arc<K>,
    config: WorkerConfig,
    rx: mpsc::Receiver<SubmitRequest>,
    shutdown: CancellationToken,
}

impl<S, K> ImportWorker<S, K>
where
    S: JobStore + 'static,
    K: TelemetrySink + 'static,
{
    pub fn new(store: Arc<S>, sink: Arc<K>, config: WorkerConfig) -> (Self, WorkerHandle) {
        let (tx, rx) = mpsc::channel(config.submit_queue_depth.max(1));
        let shutdown = CancellationToken::new();
        let handle = WorkerHandle {
            tx,
            shutdown: shutdown.clone(),
        };
        (
            Self {
                store,
                sink,
                config,
                rx,
                shutdown,
            },
            handle,
        )
    }

    /// Spawn the worker loop onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        // Heal jobs orphaned by a previous instance before polling starts.
        recovery::run_startup_sweep(&*self.store, self.config.stale_cutoff).await;

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Import worker started"
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received, import worker stopping");
                    return;
                }

                Some(request) = self.rx.recv() => {
                    let outcome = self
                        .process_submitted(request.job_id, request.rows)
                        .await;
                    // The submitter may have given up waiting; that is fine.
                    let _ = request.reply.send(outcome);
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "Import worker poll error");
                    }
                }
            }
        }
    }

    /// Claim at most one pending job and run it to a terminal state.
    async fn poll_once(&self) -> Result<()> {
        let Some(job) = self.store.claim_one_pending().await? else {
            return Ok(());
        };
        info!(
            job_id = %job.id,
            factory_id = %job.factory_id,
            source_type = job.source_type.as_str(),
            "Claimed job"
        );

        let mut source = match source_for_polled_job(&job) {
            Ok(source) => source,
            Err(e) => {
                // No row source can exist for this claim; record and move on.
                self.store.mark_failed(job.id, &e.job_message()).await?;
                warn!(job_id = %job.id, error = %e, "Job failed");
                return Ok(());
            }
        };

        if let Err(e) = self.run_with_timeout(&job, source.as_mut()).await {
            // Already recorded on the job by the processor.
            warn!(job_id = %job.id, error = %e, "Job failed");
        }
        Ok(())
    }

    /// Run a directly-submitted preloaded job immediately.
    async fn process_submitted(
        &self,
        job_id: Uuid,
        rows: Vec<TelemetryRow>,
    ) -> Result<RunOutcome> {
        let rows_total = rows.len() as i64;
        let Some(job) = self.store.claim_pending_by_id(job_id, rows_total).await? else {
            return Err(ImportError::Validation(
                "job not found or not in pending state".into(),
            ));
        };
        info!(job_id = %job.id, rows_total, "Preloaded job submitted");

        let mut source = PreloadedSource::new(rows);
        self.run_with_timeout(&job, &mut source).await
    }

    async fn run_with_timeout(
        &self,
        job: &ImportJob,
        source: &mut dyn RowSource,
    ) -> Result<RunOutcome> {
        let processor =
            BatchProcessor::new(&*self.store, &*self.sink, self.config.batch_throttle);
        match timeout(self.config.max_runtime, processor.run(job, source)).await {
            Ok(result) => result,
            Err(_) => {
                let e = ImportError::Timeout;
                self.store.mark_failed(job.id, &e.job_message()).await?;
                warn!(job_id = %job.id, "Job exceeded maximum runtime");
                Err(e)
            }
        }
    }
}
