use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::workers::WorkerStats;

/// Start the background scheduler with the periodic delivery report.
/// The returned scheduler must be kept alive for the job to keep firing.
pub async fn start_stats_report(cron_expr: &str, stats: Arc<WorkerStats>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("Failed to create job scheduler")?;

    let job = Job::new_async(cron_expr, move |_uuid, _lock| {
        let stats = Arc::clone(&stats);
        Box::pin(async move {
            let s = stats.snapshot();
            info!(
                "Deliveries: accepted={} processed={} failed={} action_failures={} dropped={}",
                s.accepted, s.processed, s.failed, s.action_failures, s.dropped
            );
        })
    })
    .with_context(|| format!("Invalid stats cron expression: {}", cron_expr))?;

    scheduler
        .add(job)
        .await
        .context("Failed to add stats job")?;
    scheduler
        .start()
        .await
        .context("Failed to start scheduler")?;

    info!("Delivery stats scheduled with cron: {}", cron_expr);
    Ok(scheduler)
}
