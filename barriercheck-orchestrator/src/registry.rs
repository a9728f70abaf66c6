//! Job registry: state machine enforcement and the live-job table
//!
//! Holds one entry per in-flight job (cancellation token, phase message,
//! the shared state cell written by the progress publisher). Status reads
//! are lock-free map lookups; all store writes for a live job funnel
//! through its publisher. Terminal entries are removed from the table
//! once their final write has landed, after which the store is the only
//! source of truth.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use barriercheck_core::domain::{AuditJob, JobStatus, PlanTier};
use barriercheck_core::AuditError;

use crate::progress::ProgressPublisher;
use crate::store::AnalysisStore;

struct LiveJob {
    cancel: CancellationToken,
    publisher: Arc<ProgressPublisher>,
    phase_message: Mutex<Option<String>>,
}

/// Registry of audit jobs.
pub struct JobRegistry {
    store: Arc<dyn AnalysisStore>,
    jobs: DashMap<Uuid, Arc<LiveJob>>,
}

impl JobRegistry {
    pub fn new(store: Arc<dyn AnalysisStore>) -> Self {
        Self {
            store,
            jobs: DashMap::new(),
        }
    }

    /// Create a new job in `pending`. Creation is total: a fresh id is
    /// assigned and the initial row is persisted by the job's publisher.
    pub fn create(
        &self,
        url: impl Into<String>,
        plan: PlanTier,
        user_id: Option<String>,
        payment_session_id: Option<String>,
    ) -> AuditJob {
        let mut job = AuditJob::new(url, plan, user_id);
        job.payment_session_id = payment_session_id;

        let publisher = ProgressPublisher::spawn(self.store.clone(), job.clone());
        self.jobs.insert(
            job.id,
            Arc::new(LiveJob {
                cancel: CancellationToken::new(),
                publisher,
                phase_message: Mutex::new(None),
            }),
        );

        info!(job_id = %job.id, url = %job.url, plan = %job.plan, "Audit job created");
        job
    }

    /// Cancellation token for a live job.
    pub fn cancellation_token(&self, job_id: Uuid) -> Result<CancellationToken, AuditError> {
        self.jobs
            .get(&job_id)
            .map(|j| j.cancel.clone())
            .ok_or(AuditError::NotFound(job_id))
    }

    /// Current phase message for a live job, if any.
    pub fn phase_message(&self, job_id: Uuid) -> Option<String> {
        self.jobs
            .get(&job_id)
            .and_then(|j| j.phase_message.lock().expect("phase mutex").clone())
    }

    /// Transition `pending -> running`. Idempotent on a running job.
    pub async fn begin(&self, job_id: Uuid) -> Result<AuditJob, AuditError> {
        let live = self.live(job_id)?;

        let snapshot = {
            let mut state = live.publisher.state().lock().expect("job state mutex");
            match state.status {
                JobStatus::Pending => {
                    state.status = JobStatus::Running;
                    state.updated_at = chrono::Utc::now();
                }
                JobStatus::Running => {}
                terminal => {
                    return Err(illegal(job_id, terminal, JobStatus::Running));
                }
            }
            state.clone()
        };

        live.publisher.request_flush();
        Ok(snapshot)
    }

    /// Record progress. Percent clamps into 0..=99 (100 is reserved for
    /// completion), never decreases, and equal values are idempotent.
    pub fn mark_progress(
        &self,
        job_id: Uuid,
        percent: u8,
        message: Option<&str>,
    ) -> Result<(), AuditError> {
        let live = self.live(job_id)?;
        let clamped = percent.min(99);

        {
            let mut state = live.publisher.state().lock().expect("job state mutex");
            if state.status.is_terminal() {
                return Err(illegal(job_id, state.status, JobStatus::Running));
            }
            if clamped > state.progress {
                state.progress = clamped;
                state.updated_at = chrono::Utc::now();
            }
        }
        if let Some(message) = message {
            *live.phase_message.lock().expect("phase mutex") = Some(message.to_string());
        }

        live.publisher.request_progress();
        Ok(())
    }

    /// Transition to `completed`, setting progress to 100.
    pub async fn complete(&self, job_id: Uuid) -> Result<(), AuditError> {
        self.terminal_transition(job_id, JobStatus::Completed, None)
            .await
    }

    /// Transition to `failed` with the given error text.
    pub async fn fail(&self, job_id: Uuid, error: &AuditError) -> Result<(), AuditError> {
        self.terminal_transition(job_id, JobStatus::Failed, Some(error.user_message()))
            .await
    }

    /// Cooperatively cancel: fires the token, then records `cancelled`.
    pub async fn cancel(&self, job_id: Uuid) -> Result<(), AuditError> {
        if let Some(live) = self.jobs.get(&job_id).map(|e| e.value().clone()) {
            live.cancel.cancel();
        }
        self.terminal_transition(
            job_id,
            JobStatus::Cancelled,
            Some(AuditError::Cancelled.user_message()),
        )
        .await
    }

    /// Load a job: live snapshot for in-flight jobs, store row otherwise.
    pub async fn load(&self, job_id: Uuid) -> Result<AuditJob, AuditError> {
        if let Some(live) = self.jobs.get(&job_id) {
            return Ok(live.publisher.state().lock().expect("job state mutex").clone());
        }
        match self.store.get_job(job_id).await {
            Ok(Some(job)) => Ok(job),
            Ok(None) => Err(AuditError::NotFound(job_id)),
            Err(e) => Err(AuditError::PersistenceTransient(e.to_string())),
        }
    }

    fn live(&self, job_id: Uuid) -> Result<Arc<LiveJob>, AuditError> {
        self.jobs
            .get(&job_id)
            .map(|e| e.value().clone())
            .ok_or(AuditError::NotFound(job_id))
    }

    async fn terminal_transition(
        &self,
        job_id: Uuid,
        target: JobStatus,
        error: Option<String>,
    ) -> Result<(), AuditError> {
        let Some(live) = self.jobs.get(&job_id).map(|e| e.value().clone()) else {
            // Not live: either finished earlier or unknown.
            return match self.store.get_job(job_id).await {
                Ok(Some(job)) if job.status == target => Ok(()),
                Ok(Some(job)) => Err(illegal(job_id, job.status, target)),
                Ok(None) => Err(AuditError::NotFound(job_id)),
                Err(e) => Err(AuditError::PersistenceTransient(e.to_string())),
            };
        };

        {
            let mut state = live.publisher.state().lock().expect("job state mutex");
            if state.status == target {
                return Ok(());
            }
            if !state.status.can_transition_to(target) {
                return Err(illegal(job_id, state.status, target));
            }

            let now = chrono::Utc::now();
            state.status = target;
            state.updated_at = now;
            state.completed_at = Some(now);
            if target == JobStatus::Completed {
                state.progress = 100;
            }
            if error.is_some() {
                state.error = error;
            }
        }

        live.publisher.finish().await;
        self.jobs.remove(&job_id);

        match target {
            JobStatus::Completed => info!(job_id = %job_id, "Audit job completed"),
            JobStatus::Cancelled => info!(job_id = %job_id, "Audit job cancelled"),
            _ => warn!(job_id = %job_id, "Audit job failed"),
        }
        Ok(())
    }
}

fn illegal(job_id: Uuid, from: JobStatus, to: JobStatus) -> AuditError {
    AuditError::IllegalState {
        job_id,
        from: from.as_str(),
        to: to.as_str(),
    }
}
