//! Submission and polling façade
//!
//! The library surface an HTTP layer would mount: submit returns a job id
//! synchronously and the audit runs on its own task, bounded by the
//! concurrent-jobs semaphore. Polling reads live state lock-free and
//! falls back to the store for finished jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info};
use uuid::Uuid;

use barriercheck_core::domain::{FinalReport, JobStatus, PlanTier};
use barriercheck_core::AuditError;

use crate::pipeline::{execute_job, Services};

/// An audit submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRequest {
    pub url: String,
    pub plan: PlanTier,
    /// Requested page cap; clamped to the plan's bound
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub payment_session_id: Option<String>,
}

/// Poll response: status, progress, phase and terminal information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True once a final report row exists for the job
    pub report_available: bool,
}

/// The audit core's public surface.
pub struct AuditService {
    services: Arc<Services>,
    job_permits: Arc<Semaphore>,
}

impl AuditService {
    pub fn new(services: Arc<Services>) -> Self {
        let max_jobs = services.config.jobs.max_concurrent_jobs.max(1);
        Self {
            services,
            job_permits: Arc::new(Semaphore::new(max_jobs)),
        }
    }

    /// Shared service bundle (registry, store, config).
    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Submit an audit. Returns the job id synchronously; the audit runs
    /// in the background. Every submission is an independent run, even
    /// for a URL submitted moments ago.
    pub fn submit(&self, request: AuditRequest) -> Uuid {
        let max_pages = request.plan.clamp_max_pages(request.max_pages);
        let job = self.services.registry.create(
            &request.url,
            request.plan,
            request.user_id,
            request.payment_session_id,
        );
        let job_id = job.id;

        let services = self.services.clone();
        let permits = self.job_permits.clone();
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!(job_id = %job_id, "Job permit pool closed, job stays pending");
                    return;
                }
            };
            execute_job(services, job_id, max_pages).await;
        });

        info!(job_id = %job_id, max_pages, "Audit submitted");
        job_id
    }

    /// Current status of a job.
    pub async fn poll(&self, job_id: Uuid) -> Result<JobStatusView, AuditError> {
        let job = self.services.registry.load(job_id).await?;
        let report_available = if job.status == JobStatus::Completed {
            self.services
                .store
                .get_final_report(job_id)
                .await
                .map(|r| r.is_some())
                .unwrap_or(false)
        } else {
            false
        };

        Ok(JobStatusView {
            job_id,
            status: job.status,
            progress: job.progress,
            message: self.services.registry.phase_message(job_id),
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            error: job.error,
            report_available,
        })
    }

    /// Fetch the final report of a completed job.
    pub async fn report(&self, job_id: Uuid) -> Result<FinalReport, AuditError> {
        // Resolve NotFound for unknown ids before touching the report table.
        let _job = self.services.registry.load(job_id).await?;
        match self.services.store.get_final_report(job_id).await {
            Ok(Some(report)) => Ok(report),
            Ok(None) => Err(AuditError::NotFound(job_id)),
            Err(e) => Err(AuditError::PersistenceTransient(e.to_string())),
        }
    }

    /// Cooperatively cancel a job.
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), AuditError> {
        self.services.registry.cancel(job_id).await
    }
}
