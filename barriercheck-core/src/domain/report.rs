//! Aggregated final report

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::module::{AnalysisResult, PriorityActions};

/// Overall conformance level derived from the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConformanceLevel {
    #[serde(rename = "AAA")]
    Aaa,
    #[serde(rename = "AA")]
    Aa,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "PARTIAL")]
    Partial,
    #[serde(rename = "POOR")]
    Poor,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl ConformanceLevel {
    /// Map an aggregate score onto a conformance level.
    ///
    /// Thresholds: AAA >= 98, AA >= 80, A >= 65, PARTIAL >= 40, POOR >= 20.
    pub fn from_score(score: f64) -> Self {
        if score >= 98.0 {
            ConformanceLevel::Aaa
        } else if score >= 80.0 {
            ConformanceLevel::Aa
        } else if score >= 65.0 {
            ConformanceLevel::A
        } else if score >= 40.0 {
            ConformanceLevel::Partial
        } else if score >= 20.0 {
            ConformanceLevel::Poor
        } else {
            ConformanceLevel::Critical
        }
    }

    /// Cap `self` at `ceiling`, keeping whichever is lower.
    pub fn capped_at(self, ceiling: ConformanceLevel) -> ConformanceLevel {
        if self.rank() > ceiling.rank() {
            ceiling
        } else {
            self
        }
    }

    fn rank(&self) -> u8 {
        match self {
            ConformanceLevel::Critical => 0,
            ConformanceLevel::Poor => 1,
            ConformanceLevel::Partial => 2,
            ConformanceLevel::A => 3,
            ConformanceLevel::Aa => 4,
            ConformanceLevel::Aaa => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConformanceLevel::Aaa => "AAA",
            ConformanceLevel::Aa => "AA",
            ConformanceLevel::A => "A",
            ConformanceLevel::Partial => "PARTIAL",
            ConformanceLevel::Poor => "POOR",
            ConformanceLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for ConformanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Crawl and automated-check summary carried into the report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicalAnalysis {
    pub pages_crawled: usize,
    pub pages_failed: usize,
    pub automated_violations: usize,
    pub automated_warnings: usize,
    pub automated_passes: usize,
    /// Aggregate score: unweighted mean over completed modules
    pub overall_score: f64,
    /// Principle-weighted score kept for continuity with older reports
    pub weighted_score: f64,
    pub modules_completed: usize,
    pub modules_failed: usize,
    pub criteria_passed: usize,
    pub criteria_warnings: usize,
    pub criteria_violations: usize,
    pub total_token_usage: u64,
}

/// The aggregated audit report, one per completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub job_id: Uuid,
    pub technical_analysis: TechnicalAnalysis,
    /// Axis key -> parsed module result (completed modules only)
    pub expert_analyses: HashMap<String, AnalysisResult>,
    pub executive_summary: String,
    pub recommendations: PriorityActions,
    pub conformance_level: ConformanceLevel,
    pub created_at: DateTime<Utc>,
}
