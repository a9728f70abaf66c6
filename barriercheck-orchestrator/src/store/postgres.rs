//! Postgres persistence adapter
//!
//! Implements the external row-oriented schema with `INSERT ... ON
//! CONFLICT` upserts so retried writes never produce duplicates.
//! Expected tables:
//!
//! - `analysis_jobs(id, url, plan, status, progress, created_at,
//!   updated_at, completed_at, user_id, error, payment_session_id)`
//! - `analysis_results(id, job_id, module_name, status, result,
//!   token_usage, created_at, completed_at, error, user_id)`
//!   with a unique index on `(job_id, module_name)`
//! - `analysis_reports(id, job_id, technical_analysis, expert_analyses,
//!   executive_summary, recommendations, conformance_level, certification,
//!   created_at)` with a unique index on `job_id`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use barriercheck_core::domain::{
    AnalysisResult, AuditJob, Axis, ConformanceLevel, FinalReport, JobStatus, ModuleResult,
    ModuleStatus, PlanTier, PriorityActions, TechnicalAnalysis,
};

use super::{AnalysisStore, StoreError};

/// Postgres-backed analysis store.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the given database URL.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn ser_err(e: serde_json::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}

fn parse_job_status(raw: &str) -> Result<JobStatus, StoreError> {
    match raw {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(StoreError::Serialization(format!(
            "unknown job status `{}`",
            other
        ))),
    }
}

fn parse_plan(raw: &str) -> Result<PlanTier, StoreError> {
    match raw {
        "basic" => Ok(PlanTier::Basic),
        "pro" => Ok(PlanTier::Pro),
        "enterprise" => Ok(PlanTier::Enterprise),
        other => Err(StoreError::Serialization(format!(
            "unknown plan `{}`",
            other
        ))),
    }
}

fn parse_module_status(raw: &str) -> Result<ModuleStatus, StoreError> {
    match raw {
        "pending" => Ok(ModuleStatus::Pending),
        "running" => Ok(ModuleStatus::Running),
        "completed" => Ok(ModuleStatus::Completed),
        "failed" => Ok(ModuleStatus::Failed),
        other => Err(StoreError::Serialization(format!(
            "unknown module status `{}`",
            other
        ))),
    }
}

#[async_trait]
impl AnalysisStore for PostgresStore {
    async fn upsert_job(&self, job: &AuditJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_jobs
                (id, url, plan, status, progress, created_at, updated_at,
                 completed_at, user_id, error, payment_session_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                updated_at = EXCLUDED.updated_at,
                completed_at = EXCLUDED.completed_at,
                error = EXCLUDED.error
            "#,
        )
        .bind(job.id)
        .bind(&job.url)
        .bind(job.plan.as_str())
        .bind(job.status.as_str())
        .bind(job.progress as i32)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.completed_at)
        .bind(&job.user_id)
        .bind(&job.error)
        .bind(&job.payment_session_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<AuditJob>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, url, plan, status, progress, created_at, updated_at,
                   completed_at, user_id, error, payment_session_id
            FROM analysis_jobs WHERE id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };

        Ok(Some(AuditJob {
            id: row.try_get("id").map_err(db_err)?,
            url: row.try_get("url").map_err(db_err)?,
            plan: parse_plan(row.try_get::<String, _>("plan").map_err(db_err)?.as_str())?,
            status: parse_job_status(
                row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
            )?,
            progress: row.try_get::<i32, _>("progress").map_err(db_err)?.clamp(0, 100) as u8,
            created_at: row.try_get("created_at").map_err(db_err)?,
            updated_at: row.try_get("updated_at").map_err(db_err)?,
            completed_at: row.try_get("completed_at").map_err(db_err)?,
            user_id: row.try_get("user_id").map_err(db_err)?,
            error: row.try_get("error").map_err(db_err)?,
            payment_session_id: row.try_get("payment_session_id").map_err(db_err)?,
        }))
    }

    async fn list_running_jobs(&self) -> Result<Vec<AuditJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM analysis_jobs WHERE status = 'running'
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(db_err)?;
            if let Some(job) = self.get_job(id).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    async fn upsert_module_result(&self, result: &ModuleResult) -> Result<(), StoreError> {
        // Canonical analysis and raw text travel together in the result
        // column; the raw output is kept even for failed modules.
        let payload = serde_json::json!({
            "analysis": result.result,
            "raw_output": result.raw_output,
        });

        sqlx::query(
            r#"
            INSERT INTO analysis_results
                (id, job_id, module_name, status, result, token_usage,
                 created_at, completed_at, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (job_id, module_name) DO UPDATE SET
                status = EXCLUDED.status,
                result = EXCLUDED.result,
                token_usage = EXCLUDED.token_usage,
                completed_at = EXCLUDED.completed_at,
                error = EXCLUDED.error
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(result.job_id)
        .bind(result.axis.key())
        .bind(result.status.as_str())
        .bind(payload)
        .bind(result.token_usage as i64)
        .bind(result.created_at)
        .bind(result.completed_at)
        .bind(&result.error)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn list_module_results(&self, job_id: Uuid) -> Result<Vec<ModuleResult>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT job_id, module_name, status, result, token_usage,
                   created_at, completed_at, error
            FROM analysis_results WHERE job_id = $1 ORDER BY created_at
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let module_name: String = row.try_get("module_name").map_err(db_err)?;
            let Some(axis) = Axis::from_key(&module_name) else {
                // Rows from collaborator workflows may carry foreign module
                // names; they are not ours to interpret.
                continue;
            };

            let payload: serde_json::Value = row.try_get("result").map_err(db_err)?;
            let analysis: Option<AnalysisResult> = match payload.get("analysis") {
                Some(serde_json::Value::Null) | None => None,
                Some(value) => Some(
                    serde_json::from_value(value.clone()).map_err(ser_err)?,
                ),
            };
            let raw_output = payload
                .get("raw_output")
                .and_then(|v| v.as_str())
                .map(String::from);

            results.push(ModuleResult {
                job_id,
                axis,
                status: parse_module_status(
                    row.try_get::<String, _>("status").map_err(db_err)?.as_str(),
                )?,
                result: analysis,
                raw_output,
                token_usage: row.try_get::<i64, _>("token_usage").map_err(db_err)?.max(0) as u64,
                created_at: row.try_get("created_at").map_err(db_err)?,
                completed_at: row.try_get("completed_at").map_err(db_err)?,
                error: row.try_get("error").map_err(db_err)?,
            });
        }

        Ok(results)
    }

    async fn upsert_final_report(&self, report: &FinalReport) -> Result<(), StoreError> {
        let technical = serde_json::to_value(&report.technical_analysis).map_err(ser_err)?;
        let expert = serde_json::to_value(&report.expert_analyses).map_err(ser_err)?;
        let recommendations = serde_json::to_value(&report.recommendations).map_err(ser_err)?;

        sqlx::query(
            r#"
            INSERT INTO analysis_reports
                (id, job_id, technical_analysis, expert_analyses,
                 executive_summary, recommendations, conformance_level,
                 certification, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, $8)
            ON CONFLICT (job_id) DO UPDATE SET
                technical_analysis = EXCLUDED.technical_analysis,
                expert_analyses = EXCLUDED.expert_analyses,
                executive_summary = EXCLUDED.executive_summary,
                recommendations = EXCLUDED.recommendations,
                conformance_level = EXCLUDED.conformance_level
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(report.job_id)
        .bind(technical)
        .bind(expert)
        .bind(&report.executive_summary)
        .bind(recommendations)
        .bind(report.conformance_level.as_str())
        .bind(report.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get_final_report(&self, job_id: Uuid) -> Result<Option<FinalReport>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT job_id, technical_analysis, expert_analyses,
                   executive_summary, recommendations, conformance_level,
                   created_at
            FROM analysis_reports WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };

        let technical: TechnicalAnalysis = serde_json::from_value(
            row.try_get::<serde_json::Value, _>("technical_analysis")
                .map_err(db_err)?,
        )
        .map_err(ser_err)?;
        let expert = serde_json::from_value(
            row.try_get::<serde_json::Value, _>("expert_analyses")
                .map_err(db_err)?,
        )
        .map_err(ser_err)?;
        let recommendations: PriorityActions = serde_json::from_value(
            row.try_get::<serde_json::Value, _>("recommendations")
                .map_err(db_err)?,
        )
        .map_err(ser_err)?;
        let level: String = row.try_get("conformance_level").map_err(db_err)?;
        let conformance_level = serde_json::from_value(serde_json::Value::String(level))
            .map_err(ser_err)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;

        Ok(Some(FinalReport {
            job_id,
            technical_analysis: technical,
            expert_analyses: expert,
            executive_summary: row.try_get("executive_summary").map_err(db_err)?,
            recommendations,
            conformance_level,
            created_at,
        }))
    }
}
