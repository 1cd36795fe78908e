//! The claim-loop worker pool.

use std::time::Duration;

use parlance_telemetry::MetricEvent;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::pipeline::{WorkerDeps, process_next};

/// Sleep between empty claims. Shutdown wakes sleepers promptly.
const IDLE_SLEEP: Duration = Duration::from_millis(50);

/// A running pool of claim-loop workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.max_workers` workers that drain the queue until the
    /// shutdown signal flips to `true`.
    #[must_use]
    pub fn spawn(deps: WorkerDeps, shutdown: watch::Receiver<bool>) -> Self {
        let handles = (0..deps.config.max_workers)
            .map(|worker_id| {
                let deps = deps.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(worker_loop(worker_id, deps, shutdown))
            })
            .collect();
        Self { handles }
    }

    /// Wait for every worker to finish its current job, aborting any that
    /// outlive the grace period.
    pub async fn join(self, grace: Duration) {
        for handle in self.handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("worker exceeded shutdown grace period; aborting");
                abort.abort();
            }
        }
    }
}

async fn worker_loop(worker_id: usize, deps: WorkerDeps, mut shutdown: watch::Receiver<bool>) {
    info!(worker_id, "worker started");
    deps.metrics.emit(MetricEvent::WorkerStarted);

    loop {
        if *shutdown.borrow() {
            break;
        }
        if process_next(&deps).await.is_none() {
            // Queue is empty; nap until work may exist or shutdown fires.
            tokio::select! {
                _ = shutdown.changed() => {}
                () = tokio::time::sleep(IDLE_SLEEP) => {}
            }
        }
    }

    deps.metrics.emit(MetricEvent::WorkerStopped);
    info!(worker_id, "worker stopped");
}
