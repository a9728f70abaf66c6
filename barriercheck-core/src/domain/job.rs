//! Audit job entity and lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plan tier the submitter purchased. The core does not enforce
/// entitlements; it only uses the tier to bound the crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Basic,
    Pro,
    Enterprise,
}

impl PlanTier {
    /// Default page cap for a crawl under this plan.
    pub fn default_max_pages(&self) -> usize {
        match self {
            PlanTier::Basic => 5,
            PlanTier::Pro => 10,
            PlanTier::Enterprise => 25,
        }
    }

    /// Clamp a requested page count into the plan's bound.
    pub fn clamp_max_pages(&self, requested: Option<usize>) -> usize {
        let cap = self.default_max_pages();
        match requested {
            Some(n) if n >= 1 => n.min(cap),
            _ => cap,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states are absorbing: no further transition is legal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether `self -> next` is a legal state-machine edge.
    ///
    /// `pending -> running -> completed|failed|cancelled`, plus
    /// `pending -> cancelled` and the idempotent `running -> running`
    /// progress edge.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An audit job: one submitted URL, one crawl, twelve module analyses,
/// at most one final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditJob {
    pub id: Uuid,
    pub url: String,
    pub plan: PlanTier,
    pub status: JobStatus,
    /// 0..=100; monotonic non-decreasing. 100 is reserved for completion.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Opaque reference set by the external billing collaborator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_session_id: Option<String>,
}

impl AuditJob {
    pub fn new(url: impl Into<String>, plan: PlanTier, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            plan,
            status: JobStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
            user_id,
            error: None,
            payment_session_id: None,
        }
    }
}
