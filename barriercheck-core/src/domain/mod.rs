//! Domain model shared across the audit pipeline

pub mod axis;
pub mod check;
pub mod job;
pub mod module;
pub mod report;
pub mod snapshot;

pub use axis::{Axis, Principle};
pub use check::{CheckFinding, CheckReport};
pub use job::{AuditJob, JobStatus, PlanTier};
pub use module::{
    AnalysisResult, ComplianceLevel, CriterionEvaluation, CriterionStatus, ModuleResult,
    ModuleStatus, PriorityAction, PriorityActions, ResultSummary, Severity,
};
pub use report::{ConformanceLevel, FinalReport, TechnicalAnalysis};
pub use snapshot::{CrawlOutcome, PageSnapshot, SiteSnapshot, SnapshotSlice};
