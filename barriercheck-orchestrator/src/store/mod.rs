//! Persistence adapter
//!
//! The only component aware of the external row-oriented schema. Every
//! write is an idempotent upsert keyed so that retries cannot produce
//! duplicates: jobs by id, module results by (job_id, module_name),
//! reports by job_id.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use barriercheck_core::domain::{AuditJob, FinalReport, ModuleResult};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Transient errors are retried; serialization failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Storage interface for jobs, module results and reports.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn upsert_job(&self, job: &AuditJob) -> Result<(), StoreError>;
    async fn get_job(&self, job_id: Uuid) -> Result<Option<AuditJob>, StoreError>;
    /// Jobs currently marked `running`; feeds the stale-job sweep.
    async fn list_running_jobs(&self) -> Result<Vec<AuditJob>, StoreError>;

    async fn upsert_module_result(&self, result: &ModuleResult) -> Result<(), StoreError>;
    async fn list_module_results(&self, job_id: Uuid) -> Result<Vec<ModuleResult>, StoreError>;

    async fn upsert_final_report(&self, report: &FinalReport) -> Result<(), StoreError>;
    async fn get_final_report(&self, job_id: Uuid) -> Result<Option<FinalReport>, StoreError>;
}

/// Run a store write, retrying transient failures up to 3 attempts with
/// exponential backoff.
pub async fn with_retries<F, Fut>(operation: F) -> Result<(), StoreError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), StoreError>>,
{
    let mut delay = Duration::from_millis(200);
    let mut last = None;

    for attempt in 1..=3u32 {
        match operation().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < 3 => {
                warn!(attempt, error = %e, "Transient store failure, retrying");
                last = Some(e);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    Err(last.unwrap_or_else(|| StoreError::Unavailable("retry loop exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retries(|| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StoreError::Unavailable("connection reset".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn serialization_errors_fail_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_retries(|| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Serialization("bad json".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(StoreError::Serialization(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
