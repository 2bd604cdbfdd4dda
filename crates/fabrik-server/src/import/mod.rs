//! Background import-job engine ("long download")
//!
//! Executes bulk historical telemetry imports asynchronously: the API layer
//! records a job as `pending`, a worker claims it (or receives its rows
//! directly), and a batch processor writes the data in bounded transactions
//! with cooperative cancellation, per-batch idempotency, progress tracking,
//! and crash recovery of orphaned jobs.

pub mod error;
pub mod memory;
pub mod processor;
pub mod recovery;
pub mod sink;
pub mod source;
pub mod store;
pub mod types;
pub mod worker;

pub use error::{ImportError, Result};
pub use processor::{BatchProcessor, RunOutcome};
pub use sink::{PgTelemetrySink, TelemetrySink};
pub use source::{PreloadedSource, RemoteHttpSource, RowSource};
pub use store::{JobStore, PgJobStore};
pub use types::{
    CreateJobParams, ImportJob, JobProjection, JobStatus, SourceType, TelemetryRow,
    DEFAULT_BATCH_SIZE,
};
pub use worker::{ImportWorker, WorkerConfig, WorkerHandle};
