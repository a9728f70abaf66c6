//! Per-axis module results and the parsed analysis schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::axis::Axis;

/// Lifecycle of one module (one axis analysis) within a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Pending => "pending",
            ModuleStatus::Running => "running",
            ModuleStatus::Completed => "completed",
            ModuleStatus::Failed => "failed",
        }
    }
}

/// Compliance level a module reports for its axis.
///
/// The extended `AA+`/`A+` labels come from the per-axis scoring rubrics;
/// the reducer only consumes the numeric score, so they pass through
/// untouched. `CRITICAL` is accepted alongside `NONE` because models
/// sometimes reuse the severity label here; both mean the axis failed
/// outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceLevel {
    #[serde(rename = "AAA")]
    Aaa,
    #[serde(rename = "AA+")]
    AaPlus,
    #[serde(rename = "AA")]
    Aa,
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "PARTIAL")]
    Partial,
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl ComplianceLevel {
    /// Whether this level reports no meaningful conformance on its axis.
    pub fn is_floor(&self) -> bool {
        matches!(self, ComplianceLevel::None | ComplianceLevel::Critical)
    }
}

/// Outcome of one success criterion within an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionStatus {
    #[serde(rename = "PASSED")]
    Passed,
    #[serde(rename = "PARTIAL")]
    Partial,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "FAILED")]
    Failed,
}

/// Severity of a failed criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "CRITICAL")]
    Critical,
    #[serde(rename = "MAJOR")]
    Major,
    #[serde(rename = "MODERATE")]
    Moderate,
    #[serde(rename = "MINOR")]
    Minor,
}

/// Headline block of a parsed module result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    /// 0..=100, coerced into range by the validator
    pub score: u8,
    pub compliance_level: ComplianceLevel,
    pub overall_assessment: String,
}

/// Evaluation of one WCAG success criterion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionEvaluation {
    pub criterion_id: String,
    pub name: String,
    pub status: CriterionStatus,
    #[serde(default)]
    pub finding: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// One remediation action within a priority bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityAction {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub effort: Option<String>,
    #[serde(default)]
    pub affected_criteria: Vec<String>,
}

/// Remediation actions bucketed by urgency
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorityActions {
    #[serde(default)]
    pub immediate: Vec<PriorityAction>,
    #[serde(default)]
    pub short_term: Vec<PriorityAction>,
    #[serde(default)]
    pub long_term: Vec<PriorityAction>,
}

impl PriorityActions {
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.short_term.is_empty() && self.long_term.is_empty()
    }
}

/// Parsed, validated result object produced by one module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: ResultSummary,
    pub criteria_evaluation: Vec<CriterionEvaluation>,
    #[serde(default)]
    pub priority_actions: Option<PriorityActions>,
}

impl AnalysisResult {
    pub fn passed_count(&self) -> usize {
        self.criteria_evaluation
            .iter()
            .filter(|c| c.status == CriterionStatus::Passed)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.criteria_evaluation
            .iter()
            .filter(|c| matches!(c.status, CriterionStatus::Warning | CriterionStatus::Partial))
            .count()
    }

    pub fn violation_count(&self) -> usize {
        self.criteria_evaluation
            .iter()
            .filter(|c| c.status == CriterionStatus::Failed)
            .count()
    }
}

/// Persisted record of one module execution.
///
/// The raw model output is retained for audit even when parsing failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleResult {
    pub job_id: Uuid,
    pub axis: Axis,
    pub status: ModuleStatus,
    pub result: Option<AnalysisResult>,
    pub raw_output: Option<String>,
    pub token_usage: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModuleResult {
    /// A freshly observed module, created lazily on first dispatch.
    pub fn pending(job_id: Uuid, axis: Axis) -> Self {
        Self {
            job_id,
            axis,
            status: ModuleStatus::Pending,
            result: None,
            raw_output: None,
            token_usage: 0,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ModuleStatus::Completed
    }
}
