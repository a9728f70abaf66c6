//! In-memory store, behaviour-identical to the SQL adapter
//!
//! Used by tests and as an offline fallback. Upsert keys match the
//! external schema: jobs by id, module results by (job_id, axis),
//! reports by job_id.

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use barriercheck_core::domain::{AuditJob, Axis, FinalReport, ModuleResult};

use super::{AnalysisStore, StoreError};

/// Map-backed store for tests and offline runs.
#[derive(Default)]
pub struct InMemoryStore {
    jobs: DashMap<Uuid, AuditJob>,
    modules: DashMap<(Uuid, Axis), ModuleResult>,
    reports: DashMap<Uuid, FinalReport>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn upsert_job(&self, job: &AuditJob) -> Result<(), StoreError> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<AuditJob>, StoreError> {
        Ok(self.jobs.get(&job_id).map(|j| j.clone()))
    }

    async fn list_running_jobs(&self) -> Result<Vec<AuditJob>, StoreError> {
        Ok(self
            .jobs
            .iter()
            .filter(|j| j.status == barriercheck_core::domain::JobStatus::Running)
            .map(|j| j.clone())
            .collect())
    }

    async fn upsert_module_result(&self, result: &ModuleResult) -> Result<(), StoreError> {
        self.modules
            .insert((result.job_id, result.axis), result.clone());
        Ok(())
    }

    async fn list_module_results(&self, job_id: Uuid) -> Result<Vec<ModuleResult>, StoreError> {
        let mut results: Vec<ModuleResult> = self
            .modules
            .iter()
            .filter(|entry| entry.key().0 == job_id)
            .map(|entry| entry.value().clone())
            .collect();
        results.sort_by_key(|r| r.created_at);
        Ok(results)
    }

    async fn upsert_final_report(&self, report: &FinalReport) -> Result<(), StoreError> {
        self.reports.insert(report.job_id, report.clone());
        Ok(())
    }

    async fn get_final_report(&self, job_id: Uuid) -> Result<Option<FinalReport>, StoreError> {
        Ok(self.reports.get(&job_id).map(|r| r.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barriercheck_core::domain::{ModuleStatus, PlanTier};

    #[tokio::test]
    async fn module_upsert_is_keyed_by_job_and_axis() {
        let store = InMemoryStore::new();
        let job_id = Uuid::new_v4();

        let mut result = ModuleResult::pending(job_id, Axis::Keyboard);
        store.upsert_module_result(&result).await.unwrap();

        result.status = ModuleStatus::Completed;
        store.upsert_module_result(&result).await.unwrap();

        let rows = store.list_module_results(job_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, ModuleStatus::Completed);
    }

    #[tokio::test]
    async fn identical_upsert_yields_same_row() {
        let store = InMemoryStore::new();
        let job = AuditJob::new("https://example.com", PlanTier::Pro, None);

        store.upsert_job(&job).await.unwrap();
        store.upsert_job(&job).await.unwrap();

        let loaded = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.url, job.url);
    }

    #[tokio::test]
    async fn unknown_job_reads_as_none() {
        let store = InMemoryStore::new();
        assert!(store.get_job(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store
            .get_final_report(Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }
}
