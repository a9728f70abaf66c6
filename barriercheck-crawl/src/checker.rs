//! Rule-based automated accessibility checks
//!
//! Cheap, deterministic rules evaluated over the parsed page facts. The
//! findings feed every LLM prompt as context and give the reducer a
//! model-independent floor. Rule ids are stable; the dispatcher filters
//! them per axis by id fragment.

use std::collections::HashMap;

use barriercheck_core::domain::{CheckFinding, CheckReport};
use tracing::debug;

use crate::extractor::PageFacts;

struct RuleHits {
    description: &'static str,
    pages: Vec<String>,
    count: usize,
}

/// Run all automated rules over the crawled pages.
pub fn run_checks(pages: &[PageFacts]) -> CheckReport {
    let mut violations: HashMap<&'static str, RuleHits> = HashMap::new();
    let mut warnings: HashMap<&'static str, RuleHits> = HashMap::new();
    let mut passes: Vec<CheckFinding> = Vec::new();

    let mut record = |bucket: &mut HashMap<&'static str, RuleHits>,
                      rule: &'static str,
                      description: &'static str,
                      page: &PageFacts,
                      count: usize| {
        if count == 0 {
            return;
        }
        let entry = bucket.entry(rule).or_insert_with(|| RuleHits {
            description,
            pages: Vec::new(),
            count: 0,
        });
        entry.pages.push(page.url.clone());
        entry.count += count;
    };

    for page in pages {
        if page.lang.is_none() {
            record(
                &mut violations,
                "html-lang",
                "Document has no lang attribute on <html>",
                page,
                1,
            );
        }

        let duplicate_ids = count_duplicate_ids(page);
        record(
            &mut violations,
            "duplicate-id",
            "The same id value is used more than once",
            page,
            duplicate_ids,
        );

        let missing_alt = page
            .images
            .iter()
            .filter(|i| {
                i.kind == "img"
                    && i.alt.is_none()
                    && i.aria_label.is_none()
                    && i.aria_labelledby.is_none()
                    && i.role.as_deref() != Some("presentation")
            })
            .count();
        record(
            &mut violations,
            "image-alt",
            "Images without a text alternative",
            page,
            missing_alt,
        );

        let empty_src = page
            .images
            .iter()
            .filter(|i| i.kind == "img" && i.src.as_deref().map(str::is_empty).unwrap_or(false))
            .count();
        record(
            &mut violations,
            "image-empty-src",
            "Images with an empty src attribute",
            page,
            empty_src,
        );

        let unlabeled_fields = page
            .forms
            .iter()
            .flat_map(|f| &f.fields)
            .filter(|f| f.label.is_none() && f.aria_label.is_none() && f.aria_labelledby.is_none())
            .count();
        record(
            &mut violations,
            "form-label",
            "Form fields without a programmatic label",
            page,
            unlabeled_fields,
        );

        record(
            &mut violations,
            "heading-order",
            "Heading levels skip one or more levels",
            page,
            heading_skips(page),
        );

        if page.title.as_deref().map(str::is_empty).unwrap_or(true) {
            record(
                &mut violations,
                "page-title",
                "Page has no title",
                page,
                1,
            );
        }

        let empty_links = page
            .links
            .iter()
            .filter(|l| l.text.is_empty() && l.aria_label.is_none())
            .count();
        record(
            &mut violations,
            "link-name",
            "Links without an accessible name",
            page,
            empty_links,
        );

        // Warnings: signals worth surfacing that need human judgement.
        let has_main = page
            .landmarks
            .iter()
            .any(|l| l.name == "main" || l.name == "role=main");
        if !has_main {
            record(
                &mut warnings,
                "landmark-main",
                "No main landmark found",
                page,
                1,
            );
        }
        if page.skip_links.is_empty() {
            record(
                &mut warnings,
                "bypass",
                "No skip link near the start of the document",
                page,
                1,
            );
        }
        let placeholder_only = page
            .forms
            .iter()
            .flat_map(|f| &f.fields)
            .filter(|f| f.label.is_none() && f.aria_label.is_none() && f.placeholder.is_some())
            .count();
        record(
            &mut warnings,
            "label-placeholder",
            "Fields labelled only by a placeholder",
            page,
            placeholder_only,
        );
        if page.meta_refresh.is_some() {
            record(
                &mut warnings,
                "meta-refresh",
                "Page uses meta refresh",
                page,
                1,
            );
        }
        record(
            &mut warnings,
            "blink",
            "Deprecated moving content elements present",
            page,
            page.marquee_blink_count,
        );
    }

    // Pass entries summarize what checked out fine across the crawl.
    let pass_checks: [(&str, &str, bool); 4] = [
        (
            "html-lang",
            "All pages declare a document language",
            pages.iter().all(|p| p.lang.is_some()),
        ),
        (
            "page-title",
            "All pages carry a non-empty title",
            pages
                .iter()
                .all(|p| p.title.as_deref().map(|t| !t.is_empty()).unwrap_or(false)),
        ),
        (
            "image-alt",
            "All images carry a text alternative or are marked decorative",
            pages.iter().all(|p| {
                p.images.iter().all(|i| {
                    i.kind != "img"
                        || i.alt.is_some()
                        || i.aria_label.is_some()
                        || i.role.as_deref() == Some("presentation")
                })
            }),
        ),
        (
            "duplicate-id",
            "No duplicate id values",
            pages.iter().all(|p| count_duplicate_ids(p) == 0),
        ),
    ];
    for (rule, description, passed) in pass_checks {
        if passed && !pages.is_empty() {
            passes.push(CheckFinding {
                rule_id: rule.to_string(),
                description: description.to_string(),
                pages: Vec::new(),
                count: pages.len(),
            });
        }
    }

    let into_findings = |bucket: HashMap<&'static str, RuleHits>| {
        let mut findings: Vec<CheckFinding> = bucket
            .into_iter()
            .map(|(rule, hits)| CheckFinding {
                rule_id: rule.to_string(),
                description: hits.description.to_string(),
                pages: hits.pages,
                count: hits.count,
            })
            .collect();
        findings.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
        findings
    };

    let report = CheckReport {
        violations: into_findings(violations),
        warnings: into_findings(warnings),
        passes,
    };

    debug!(
        violations = report.violations.len(),
        warnings = report.warnings.len(),
        passes = report.passes.len(),
        "Automated checks finished"
    );

    report
}

fn count_duplicate_ids(page: &PageFacts) -> usize {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for id in &page.ids {
        *counts.entry(id.as_str()).or_insert(0) += 1;
    }
    counts.values().filter(|n| **n > 1).map(|n| n - 1).sum()
}

fn heading_skips(page: &PageFacts) -> usize {
    page.headings
        .windows(2)
        .filter(|w| w[1].level > w[0].level + 1)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::parse_page;
    use barriercheck_core::domain::PageSnapshot;
    use chrono::Utc;

    fn facts(html: &str, lang: Option<&str>, title: Option<&str>) -> PageFacts {
        parse_page(&PageSnapshot {
            url: "https://example.com/".to_string(),
            status: 200,
            fetched_at: Utc::now(),
            fetch_ms: 1,
            title: title.map(String::from),
            lang: lang.map(String::from),
            html: html.to_string(),
            error: None,
        })
    }

    fn violation_count(report: &CheckReport, rule: &str) -> usize {
        report
            .violations
            .iter()
            .find(|v| v.rule_id == rule)
            .map(|v| v.count)
            .unwrap_or(0)
    }

    #[test]
    fn missing_lang_is_a_violation() {
        let report = run_checks(&[facts("<p>x</p>", None, Some("T"))]);
        assert_eq!(violation_count(&report, "html-lang"), 1);
    }

    #[test]
    fn duplicate_ids_counted_per_extra_occurrence() {
        let report = run_checks(&[facts(
            r#"<div id="a"></div><div id="a"></div><div id="a"></div>"#,
            Some("en"),
            Some("T"),
        )]);
        assert_eq!(violation_count(&report, "duplicate-id"), 2);
    }

    #[test]
    fn heading_skip_detected() {
        let report = run_checks(&[facts(
            "<h1>A</h1><h3>skipped</h3><h4>ok</h4>",
            Some("en"),
            Some("T"),
        )]);
        assert_eq!(violation_count(&report, "heading-order"), 1);
    }

    #[test]
    fn unlabeled_form_field_flagged() {
        let report = run_checks(&[facts(
            r#"<form><input type="text" name="q"></form>"#,
            Some("en"),
            Some("T"),
        )]);
        assert_eq!(violation_count(&report, "form-label"), 1);
    }

    #[test]
    fn clean_page_produces_passes() {
        let report = run_checks(&[facts(
            r##"<a href="#main">Skip</a><main><h1>Hi</h1><img src="/x.png" alt="x"></main>"##,
            Some("en"),
            Some("Clean page"),
        )]);
        assert!(report.violations.is_empty());
        assert!(report
            .passes
            .iter()
            .any(|p| p.rule_id == "image-alt"));
    }

    #[test]
    fn findings_aggregate_across_pages() {
        let a = facts("<p>x</p>", None, Some("A"));
        let b = facts("<p>y</p>", None, Some("B"));
        let report = run_checks(&[a, b]);
        let lang = report
            .violations
            .iter()
            .find(|v| v.rule_id == "html-lang")
            .unwrap();
        assert_eq!(lang.count, 2);
        assert_eq!(lang.pages.len(), 2);
    }
}
