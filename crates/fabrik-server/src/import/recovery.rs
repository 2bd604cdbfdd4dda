//! Startup recovery sweep
//!
//! A killed or redeployed instance leaves its in-flight job stuck in
//! `running` with nobody working on it. Before a worker starts polling it
//! returns any such orphan to the queue so the next claim re-runs it; the
//! per-batch idempotency check keeps the re-run from duplicating rows
//! already written.

use std::time::Duration;
use tracing::{info, warn};

use super::store::JobStore;

/// Reset jobs stuck in `running` longer than `cutoff` back to `pending`.
///
/// The cutoff guards against false positives: a healthy job touches
/// `updated_at` on every batch, so only jobs silent for longer than one
/// would expect between batches are considered orphaned. Sweep failures are
/// logged and swallowed; a worker that cannot sweep can still process.
pub async fn run_startup_sweep(store: &dyn JobStore, cutoff: Duration) {
    match store.recover_stale(cutoff).await {
        Ok(0) => {}
        Ok(recovered) => {
            info!(recovered, "Recovered stale running job(s) back to pending");
        }
        Err(e) => {
            warn!(error = %e, "Stale job recovery failed");
        }
    }
}
