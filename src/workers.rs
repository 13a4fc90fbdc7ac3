use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::bot::Moderator;

/// Delivery counters shared by the acceptor, the workers and the stats job
#[derive(Debug, Default)]
pub struct WorkerStats {
    accepted: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    action_failures: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub processed: u64,
    pub failed: u64,
    pub action_failures: u64,
    pub dropped: u64,
}

impl WorkerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            action_failures: self.action_failures.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// What happened to a submitted delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Queued(Uuid),
    /// Every worker was busy and the queue was full
    Dropped(Uuid),
}

struct Delivery {
    id: Uuid,
    payload: Value,
}

/// Fixed set of workers draining a bounded queue of webhook deliveries.
#[derive(Clone)]
pub struct WorkerPool {
    tx: mpsc::Sender<Delivery>,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    pub fn spawn(moderator: Arc<Moderator>, workers: usize, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Delivery>(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(WorkerStats::default());

        for worker in 0..workers {
            tokio::spawn(run_worker(
                worker,
                Arc::clone(&rx),
                Arc::clone(&moderator),
                Arc::clone(&stats),
            ));
        }

        info!("Started {} workers (queue capacity {})", workers, queue_capacity);
        Self { tx, stats }
    }

    /// Queue a delivery without waiting. A full queue drops the delivery and
    /// counts it; only a closed queue is an error.
    pub fn submit(&self, payload: Value) -> Result<Dispatch> {
        let id = Uuid::new_v4();
        match self.tx.try_send(Delivery { id, payload }) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(Dispatch::Queued(id))
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Worker queue full, dropping delivery {}", id);
                Ok(Dispatch::Dropped(id))
            }
            Err(TrySendError::Closed(_)) => {
                anyhow::bail!("Worker queue is closed, cannot queue delivery {}", id)
            }
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    moderator: Arc<Moderator>,
    stats: Arc<WorkerStats>,
) {
    loop {
        // Hold the lock only while waiting for the next delivery
        let delivery = { rx.lock().await.recv().await };
        let Some(delivery) = delivery else {
            info!("Worker {} stopping: queue closed", worker);
            return;
        };

        let Delivery { id, payload } = delivery;
        let span = tracing::info_span!("delivery", %id, worker);
        let moderator = Arc::clone(&moderator);
        // Run in its own task so a panic surfaces as a JoinError instead of killing the worker
        let handle = tokio::spawn(
            async move { moderator.handle_payload(payload).await }.instrument(span),
        );

        match handle.await {
            Ok(Ok(report)) => {
                stats.processed.fetch_add(1, Ordering::Relaxed);
                if report.failed > 0 {
                    stats
                        .action_failures
                        .fetch_add(report.failed as u64, Ordering::Relaxed);
                    warn!(
                        "Delivery {}: {} of {} platform actions failed",
                        id, report.failed, report.attempted
                    );
                }
            }
            Ok(Err(e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Delivery {} could not be handled: {:#}", id, e);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                error!("Delivery {} task aborted: {}", id, e);
            }
        }
    }
}
