//! End-to-end execution of one audit job
//!
//! Crawl, extract, check, dispatch, reduce, persist, with cooperative
//! cancellation at every network call, a wall-clock deadline around the
//! whole run, and progress mapped onto the published phase bands:
//! 0-5 accepted, 5-10 crawling, 10-20 automated checks, 20-85 modules,
//! 85-95 reducer, 95-100 final persistence.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use barriercheck_core::config::Config;
use barriercheck_core::domain::JobStatus;
use barriercheck_core::AuditError;
use barriercheck_crawl::crawler::{CrawlError, Crawler};
use barriercheck_crawl::extractor::{extract_site_snapshot, parse_pages};
use barriercheck_crawl::run_checks;
use barriercheck_llm::{LlmProvider, PromptRegistry};

use crate::dispatcher::ModuleDispatcher;
use crate::reducer;
use crate::registry::JobRegistry;
use crate::store::{with_retries, AnalysisStore};

/// Progress band boundaries (percent).
mod phase {
    pub const ACCEPTED: u8 = 2;
    pub const CRAWL: u8 = 5;
    pub const CHECKS: u8 = 10;
    pub const MODULES_START: u8 = 20;
    pub const MODULES_END: u8 = 85;
    pub const REDUCER: u8 = 85;
    pub const PERSIST: u8 = 95;
}

/// Everything one job run needs; shared across jobs.
pub struct Services {
    pub config: Config,
    pub store: Arc<dyn AnalysisStore>,
    pub registry: Arc<JobRegistry>,
    pub provider: Arc<dyn LlmProvider>,
    pub prompts: Arc<PromptRegistry>,
}

/// Run a job to its terminal state. All outcomes, including failures,
/// are written before this returns.
#[instrument(skip_all, fields(job_id = %job_id))]
pub async fn execute_job(services: Arc<Services>, job_id: Uuid, max_pages: usize) {
    let cancel = match services.registry.cancellation_token(job_id) {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "Job vanished before execution");
            return;
        }
    };

    let deadline = services.config.jobs.deadline();
    let outcome = tokio::select! {
        r = tokio::time::timeout(deadline, run_pipeline(&services, job_id, max_pages, &cancel)) => r,
        _ = cancel.cancelled() => {
            info!("Job cancelled, aborting pipeline");
            // The cancel() caller performs the terminal transition.
            return;
        }
    };

    match outcome {
        Ok(Ok(())) => {
            if let Err(e) = services.registry.complete(job_id).await {
                warn!(error = %e, "Completing job failed");
            }
        }
        Ok(Err(AuditError::Cancelled)) => {
            // Terminal write already issued by the cancellation path.
        }
        Ok(Err(e)) => {
            if let Err(transition) = services.registry.fail(job_id, &e).await {
                warn!(error = %transition, "Failing job failed");
            }
        }
        Err(_elapsed) => {
            let e = AuditError::Deadline {
                seconds: deadline.as_secs(),
            };
            if let Err(transition) = services.registry.fail(job_id, &e).await {
                warn!(error = %transition, "Failing timed-out job failed");
            }
        }
    }
}

async fn run_pipeline(
    services: &Arc<Services>,
    job_id: Uuid,
    max_pages: usize,
    cancel: &CancellationToken,
) -> Result<(), AuditError> {
    let registry = &services.registry;

    let job = registry.begin(job_id).await?;
    registry.mark_progress(job_id, phase::ACCEPTED, Some("Job accepted"))?;

    // Crawl (sequential per job, to keep origin load predictable).
    registry.mark_progress(job_id, phase::CRAWL, Some("Crawling website"))?;
    let crawler = Crawler::new(&services.config.crawler, max_pages);
    let crawl = crawler.crawl(&job.url, cancel).await.map_err(|e| match e {
        CrawlError::Cancelled => AuditError::Cancelled,
        other => AuditError::CrawlFatal(other.to_string()),
    })?;

    // Snapshot extraction and automated checks are CPU-bound; keep them
    // off the async workers.
    registry.mark_progress(job_id, phase::CHECKS, Some("Running automated checks"))?;
    let (snapshot, checks, crawl) = {
        let crawl_owned = crawl;
        tokio::task::spawn_blocking(move || {
            let facts = parse_pages(&crawl_owned);
            let snapshot = extract_site_snapshot(&crawl_owned, &facts);
            let checks = run_checks(&facts);
            (snapshot, checks, crawl_owned)
        })
        .await
        .map_err(|e| AuditError::CrawlFatal(format!("snapshot extraction panicked: {}", e)))?
    };

    // Twelve modules, fanned out.
    registry.mark_progress(
        job_id,
        phase::MODULES_START,
        Some("Dispatching analysis modules"),
    )?;
    let dispatcher = ModuleDispatcher::new(
        services.provider.clone(),
        services.prompts.clone(),
        services.store.clone(),
        services.config.llm.clone(),
    );
    let module_band = (phase::MODULES_END - phase::MODULES_START) as f64;
    let registry_for_progress = registry.clone();
    let modules = dispatcher
        .dispatch_all(
            job_id,
            &snapshot,
            &checks,
            services.config.jobs.effective_module_concurrency(),
            cancel,
            move |done, total| {
                let percent = phase::MODULES_START as f64
                    + module_band * (done as f64 / total.max(1) as f64);
                let message = format!("Analysis modules: {}/{} finished", done, total);
                if let Err(e) =
                    registry_for_progress.mark_progress(job_id, percent as u8, Some(&message))
                {
                    warn!(error = %e, "Module progress update rejected");
                }
            },
        )
        .await?;

    // Reduce.
    registry.mark_progress(job_id, phase::REDUCER, Some("Aggregating results"))?;
    let report = reducer::reduce(&job, &crawl, &checks, &modules)?;

    // Persist the report; the terminal job write follows in the caller.
    registry.mark_progress(job_id, phase::PERSIST, Some("Persisting final report"))?;
    with_retries(|| {
        let store = services.store.clone();
        let report = report.clone();
        async move { store.upsert_final_report(&report).await }
    })
    .await
    .map_err(|e| AuditError::PersistenceTransient(e.to_string()))?;

    Ok(())
}

/// Mark long-inactive running jobs as failed.
///
/// Recovers rows whose worker died without a terminal write (process
/// crash, kill -9). Jobs live in this process are untouched: their
/// registry entries still exist.
pub async fn sweep_stale_jobs(
    store: &Arc<dyn AnalysisStore>,
    registry: &Arc<JobRegistry>,
    stale_after: chrono::Duration,
) -> usize {
    let cutoff = chrono::Utc::now() - stale_after;
    let mut swept = 0;

    let running = match store.list_running_jobs().await {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(error = %e, "Stale sweep could not list running jobs");
            return 0;
        }
    };

    for mut job in running {
        if registry.cancellation_token(job.id).is_ok() {
            continue;
        }
        if job.status != JobStatus::Running || job.updated_at >= cutoff {
            continue;
        }

        job.status = JobStatus::Failed;
        job.error = Some(
            AuditError::Deadline {
                seconds: stale_after.num_seconds().max(0) as u64,
            }
            .user_message(),
        );
        job.completed_at = Some(chrono::Utc::now());
        job.updated_at = chrono::Utc::now();
        if let Err(e) = store.upsert_job(&job).await {
            warn!(job_id = %job.id, error = %e, "Sweeping stale job failed");
        } else {
            info!(job_id = %job.id, "Stale running job marked failed");
            swept += 1;
        }
    }

    swept
}
