//! Background workers
//!
//! Periodic maintenance that runs alongside job execution. The only
//! worker the core needs is the stale-job sweep: running rows whose
//! process died without a terminal write get failed after a grace
//! period, so pollers never watch a zombie forever.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use barriercheck_core::Config;
use barriercheck_orchestrator::pipeline::sweep_stale_jobs;
use barriercheck_orchestrator::{AnalysisStore, JobRegistry};

/// Spawn the periodic stale-job sweeper.
pub fn spawn_stale_job_sweeper(
    store: Arc<dyn AnalysisStore>,
    registry: Arc<JobRegistry>,
    config: &Config,
    shutdown_token: CancellationToken,
) {
    let interval_seconds = config.jobs.stale_sweep_interval_seconds.max(1);
    let stale_after = chrono::Duration::seconds(config.jobs.deadline_seconds.max(1) as i64);

    tokio::spawn(async move {
        info!(interval_seconds, "Stale-job sweeper started");

        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
        // The immediate first tick would sweep before anything can be stale.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let swept = sweep_stale_jobs(&store, &registry, stale_after).await;
                    if swept > 0 {
                        warn!(swept, "Recovered stale running jobs");
                    }
                }
                _ = shutdown_token.cancelled() => {
                    info!("Stale-job sweeper shutting down");
                    break;
                }
            }
        }
    });
}
