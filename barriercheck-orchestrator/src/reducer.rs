//! Result reducer: twelve module results in, one report out
//!
//! Failed modules are excluded from the mean rather than counted as
//! zero; the report records how many modules contributed. Fewer than six
//! completed modules is not enough coverage to stand behind a verdict,
//! so the job fails instead of producing a misleading report.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info};

use barriercheck_core::domain::{
    AuditJob, Axis, CheckReport, ConformanceLevel, CrawlOutcome, FinalReport, ModuleResult,
    PriorityAction, PriorityActions, TechnicalAnalysis,
};
use barriercheck_core::AuditError;

/// Minimum completed modules for a report to be meaningful.
const MIN_COMPLETED_MODULES: usize = 6;

/// How many immediate actions the executive summary calls out.
const SUMMARY_TOP_ACTIONS: usize = 5;

/// Aggregate the module results into the final report.
pub fn reduce(
    job: &AuditJob,
    crawl: &CrawlOutcome,
    checks: &CheckReport,
    modules: &[ModuleResult],
) -> Result<FinalReport, AuditError> {
    let completed: Vec<&ModuleResult> = modules.iter().filter(|m| m.is_completed()).collect();
    let failed = modules.len() - completed.len();

    if completed.len() < MIN_COMPLETED_MODULES {
        return Err(AuditError::InsufficientCoverage {
            completed: completed.len(),
            total: modules.len(),
            required: MIN_COMPLETED_MODULES,
        });
    }

    // Unweighted mean over the modules that actually produced a result.
    let score_sum: f64 = completed
        .iter()
        .filter_map(|m| m.result.as_ref())
        .map(|r| r.summary.score as f64)
        .sum();
    let overall_score = score_sum / completed.len() as f64;

    let weighted_score = principle_weighted_score(&completed);

    let mut conformance_level = ConformanceLevel::from_score(overall_score);
    // Safety floor: a module reporting NONE or CRITICAL on its axis caps
    // the whole site, whatever the other eleven say.
    let has_floor_module = completed
        .iter()
        .filter_map(|m| m.result.as_ref())
        .any(|r| r.summary.compliance_level.is_floor());
    if has_floor_module {
        conformance_level = conformance_level.capped_at(ConformanceLevel::Partial);
    }

    let mut criteria_passed = 0;
    let mut criteria_warnings = 0;
    let mut criteria_violations = 0;
    for result in completed.iter().filter_map(|m| m.result.as_ref()) {
        criteria_passed += result.passed_count();
        criteria_warnings += result.warning_count();
        criteria_violations += result.violation_count();
    }

    let recommendations = merge_recommendations(&completed);
    let total_token_usage: u64 = modules.iter().map(|m| m.token_usage).sum();

    let technical_analysis = TechnicalAnalysis {
        pages_crawled: crawl.pages_crawled(),
        pages_failed: crawl.pages_failed(),
        automated_violations: checks.violations.iter().map(|f| f.count).sum(),
        automated_warnings: checks.warnings.iter().map(|f| f.count).sum(),
        automated_passes: checks.passes.len(),
        overall_score,
        weighted_score,
        modules_completed: completed.len(),
        modules_failed: failed,
        criteria_passed,
        criteria_warnings,
        criteria_violations,
        total_token_usage,
    };

    let executive_summary = executive_summary(job, &technical_analysis, conformance_level, &recommendations);

    let expert_analyses: HashMap<String, _> = completed
        .iter()
        .filter_map(|m| m.result.as_ref().map(|r| (m.axis.key().to_string(), r.clone())))
        .collect();

    info!(
        job_id = %job.id,
        score = format!("{:.1}", overall_score),
        level = %conformance_level,
        modules_completed = completed.len(),
        modules_failed = failed,
        "Report reduced"
    );

    Ok(FinalReport {
        job_id: job.id,
        technical_analysis,
        expert_analyses,
        executive_summary,
        recommendations,
        conformance_level,
        created_at: Utc::now(),
    })
}

/// Principle-weighted mean (perceivable/operable/understandable/robust at
/// 30/30/25/15), kept alongside the plain mean for report continuity.
fn principle_weighted_score(completed: &[&ModuleResult]) -> f64 {
    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for module in completed {
        if let Some(result) = &module.result {
            let weight = module.axis.principle().weight();
            weighted += result.summary.score as f64 * weight;
            weight_sum += weight;
        }
    }
    if weight_sum > 0.0 {
        weighted / weight_sum
    } else {
        0.0
    }
}

/// Merge per-module priority actions, deduplicating by title. An action
/// named in several buckets keeps only the most urgent one.
fn merge_recommendations(completed: &[&ModuleResult]) -> PriorityActions {
    #[derive(Clone, Copy, PartialEq, PartialOrd)]
    enum Bucket {
        Immediate,
        ShortTerm,
        LongTerm,
    }

    let mut best: HashMap<String, (Bucket, PriorityAction)> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for module in completed {
        let Some(actions) = module.result.as_ref().and_then(|r| r.priority_actions.as_ref())
        else {
            continue;
        };
        let buckets = [
            (Bucket::Immediate, &actions.immediate),
            (Bucket::ShortTerm, &actions.short_term),
            (Bucket::LongTerm, &actions.long_term),
        ];
        for (bucket, list) in buckets {
            for action in list {
                let key = action.title.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                match best.get(&key) {
                    Some((existing, _)) if *existing <= bucket => {}
                    Some(_) => {
                        best.insert(key, (bucket, action.clone()));
                    }
                    None => {
                        order.push(key.clone());
                        best.insert(key, (bucket, action.clone()));
                    }
                }
            }
        }
    }

    let mut merged = PriorityActions::default();
    for key in order {
        if let Some((bucket, action)) = best.remove(&key) {
            match bucket {
                Bucket::Immediate => merged.immediate.push(action),
                Bucket::ShortTerm => merged.short_term.push(action),
                Bucket::LongTerm => merged.long_term.push(action),
            }
        }
    }

    debug!(
        immediate = merged.immediate.len(),
        short_term = merged.short_term.len(),
        long_term = merged.long_term.len(),
        "Recommendations merged"
    );
    merged
}

/// Templated narrative for the report header.
fn executive_summary(
    job: &AuditJob,
    technical: &TechnicalAnalysis,
    level: ConformanceLevel,
    recommendations: &PriorityActions,
) -> String {
    let mut summary = format!(
        "Accessibility audit of {} ({} plan), performed on {}.\n\
         Overall conformance level: {} (score {:.1}/100, {} of {} analysis modules contributed).\n\
         Across {} crawled pages the analysis recorded {} passed criteria, \
         {} warnings and {} violations; automated checks added {} rule violations.",
        job.url,
        job.plan,
        job.created_at.format("%Y-%m-%d"),
        level,
        technical.overall_score,
        technical.modules_completed,
        technical.modules_completed + technical.modules_failed,
        technical.pages_crawled,
        technical.criteria_passed,
        technical.criteria_warnings,
        technical.criteria_violations,
        technical.automated_violations,
    );

    if !recommendations.immediate.is_empty() {
        summary.push_str("\n\nMost urgent actions:");
        for action in recommendations.immediate.iter().take(SUMMARY_TOP_ACTIONS) {
            summary.push_str(&format!("\n- {}", action.title));
        }
    }

    summary
}
