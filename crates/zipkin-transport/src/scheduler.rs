//! Flush timer.
//!
//! One tokio task per logger. On every tick it claims the pending batch
//! synchronously and hands it to a spawned export; while that export is
//! still running, further ticks are skipped so at most one flush is ever in
//! flight.

use crate::invariants::debug_assert_single_in_flight;
use crate::logger::{FlushCore, FlushOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Owns the timer task. Dropping it aborts the task and any in-flight export.
pub(crate) struct FlushScheduler {
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl FlushScheduler {
    pub(crate) fn start<T: Send + 'static>(
        core: Arc<FlushCore<T>>,
        period: Duration,
        runtime: &Handle,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(run(core, period, shutdown_rx));
        Self {
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Stops ticking and waits for the in-flight export, if any.
    pub(crate) async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "flush timer task ended abnormally");
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run<T: Send + 'static>(
    core: Arc<FlushCore<T>>,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    // first tick one period after start, not immediately
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: JoinSet<FlushOutcome> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown_rx => {
                while let Some(result) = in_flight.join_next().await {
                    log_join(result);
                }
                break;
            }

            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join(result);
            }

            _ = interval.tick() => {
                if !in_flight.is_empty() {
                    core.metrics().record_skipped_tick();
                    tracing::debug!("previous flush still in flight, skipping tick");
                    continue;
                }
                // claim before spawning: the batch is owned by the export task
                if let Some(batch) = core.claim() {
                    debug_assert_single_in_flight!(in_flight.len());
                    let core = Arc::clone(&core);
                    in_flight.spawn(async move { core.export(batch).await });
                }
            }
        }
    }
}

fn log_join(result: Result<FlushOutcome, tokio::task::JoinError>) {
    match result {
        Ok(outcome) => tracing::trace!(?outcome, "scheduled flush finished"),
        Err(e) => tracing::error!(error = %e, "flush task panicked"),
    }
}
