//! End-to-end audit job scenarios: mock site, mock LLM, in-memory store

mod common;

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use barriercheck_core::domain::{Axis, ConformanceLevel, JobStatus, ModuleStatus, PlanTier};
use barriercheck_orchestrator::{AnalysisStore, AuditRequest, InMemoryStore};

use common::*;

fn request(url: &str, plan: PlanTier, max_pages: Option<usize>) -> AuditRequest {
    AuditRequest {
        url: url.to_string(),
        plan,
        max_pages,
        user_id: None,
        payment_session_id: None,
    }
}

#[tokio::test]
async fn happy_path_completes_with_aa_level() {
    let site = mock_site().await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(llm_response(&module_payload(85, "AA")))
        .mount(&llm)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let service = build_service(&llm.uri(), store.clone());

    let job_id = service.submit(request(&site.uri(), PlanTier::Pro, Some(3)));
    let view = wait_for_terminal(&service, job_id).await;

    assert!(is_completed(&view));
    assert_eq!(view.progress, 100);
    assert!(view.report_available);
    assert!(view.completed_at.is_some());
    assert!(view.error.is_none());

    // Twelve module rows, all completed, with audit raw text retained.
    let modules = store.list_module_results(job_id).await.unwrap();
    assert_eq!(modules.len(), 12);
    assert!(modules.iter().all(|m| m.status == ModuleStatus::Completed));
    assert!(modules.iter().all(|m| m.raw_output.is_some()));
    assert!(modules.iter().all(|m| m.token_usage == 1200));

    let report = service.report(job_id).await.unwrap();
    assert_eq!(report.conformance_level, ConformanceLevel::Aa);
    assert_eq!(report.technical_analysis.overall_score, 85.0);
    assert_eq!(report.technical_analysis.modules_completed, 12);
    assert_eq!(report.technical_analysis.pages_crawled, 3);
    assert_eq!(report.expert_analyses.len(), 12);
    assert!(!report.recommendations.immediate.is_empty());
}

#[tokio::test]
async fn permanent_failure_on_one_axis_still_completes() {
    let site = mock_site().await;
    let llm = MockServer::start().await;

    // Axis 2.3 gets a permanent 4xx; the axis key appears in the prompt data.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(Axis::Seizures.key()))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .with_priority(1)
        .mount(&llm)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(llm_response(&module_payload(88, "AA")))
        .mount(&llm)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let service = build_service(&llm.uri(), store.clone());

    let job_id = service.submit(request(&site.uri(), PlanTier::Pro, Some(2)));
    let view = wait_for_terminal(&service, job_id).await;
    assert!(is_completed(&view));

    let modules = store.list_module_results(job_id).await.unwrap();
    let completed = modules
        .iter()
        .filter(|m| m.status == ModuleStatus::Completed)
        .count();
    let failed: Vec<_> = modules
        .iter()
        .filter(|m| m.status == ModuleStatus::Failed)
        .collect();
    assert_eq!(completed, 11);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].axis, Axis::Seizures);
    assert!(failed[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("LLMPermanent"));

    // Mean over the eleven contributors; the failed axis is absent from
    // the expert analyses.
    let report = service.report(job_id).await.unwrap();
    assert_eq!(report.technical_analysis.overall_score, 88.0);
    assert_eq!(report.technical_analysis.modules_completed, 11);
    assert_eq!(report.technical_analysis.modules_failed, 1);
    assert!(!report.expert_analyses.contains_key(Axis::Seizures.key()));
}

#[tokio::test]
async fn seven_failed_axes_mean_insufficient_coverage() {
    let site = mock_site().await;
    let llm = MockServer::start().await;

    let failing = [
        Axis::TextAlternatives,
        Axis::TimeBasedMedia,
        Axis::Adaptable,
        Axis::Distinguishable,
        Axis::Keyboard,
        Axis::EnoughTime,
        Axis::Seizures,
    ];
    for axis in failing {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains(axis.key()))
            .respond_with(ResponseTemplate::new(400).set_body_string("nope"))
            .with_priority(1)
            .mount(&llm)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(llm_response(&module_payload(80, "AA")))
        .mount(&llm)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let service = build_service(&llm.uri(), store.clone());

    let job_id = service.submit(request(&site.uri(), PlanTier::Basic, Some(1)));
    let view = wait_for_terminal(&service, job_id).await;

    assert_eq!(view.status, JobStatus::Failed);
    assert!(view
        .error
        .as_deref()
        .unwrap()
        .starts_with("InsufficientCoverage"));
    assert!(!view.report_available);
    assert!(store.get_final_report(job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn fenced_output_with_trailing_commas_needs_no_retry() {
    let site = mock_site().await;
    let llm = MockServer::start().await;

    // Valid analysis wrapped in a markdown fence with a trailing comma
    // slipped in; repair must absorb it on the first attempt.
    let noisy = format!(
        "```json\n{}\n```",
        module_payload(75, "A").replace("}],", "}],,")
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(llm_response(&noisy))
        .expect(12)
        .mount(&llm)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let service = build_service(&llm.uri(), store.clone());

    let job_id = service.submit(request(&site.uri(), PlanTier::Basic, Some(1)));
    let view = wait_for_terminal(&service, job_id).await;

    assert!(is_completed(&view));
    let modules = store.list_module_results(job_id).await.unwrap();
    assert!(modules.iter().all(|m| m.status == ModuleStatus::Completed));
    // The mock's expect(12) verifies exactly one call per module.
}

#[tokio::test]
async fn cancellation_mid_flight_leaves_partial_results() {
    let site = mock_site().await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            llm_response(&module_payload(80, "AA")).set_delay(Duration::from_secs(5)),
        )
        .mount(&llm)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let service = build_service(&llm.uri(), store.clone());

    let job_id = service.submit(request(&site.uri(), PlanTier::Basic, Some(1)));
    // Wait until module dispatch started, then cancel.
    wait_for_progress(&service, job_id, 20).await;
    service.cancel(job_id).await.unwrap();

    let view = wait_for_terminal(&service, job_id).await;
    assert_eq!(view.status, JobStatus::Cancelled);
    assert!(!view.report_available);
    assert!(store.get_final_report(job_id).await.unwrap().is_none());

    // Whatever was persisted before the abort stays persisted; nothing
    // reached completed.
    let modules = store.list_module_results(job_id).await.unwrap();
    assert!(modules
        .iter()
        .all(|m| m.status != ModuleStatus::Completed));
}

#[tokio::test]
async fn unreachable_root_fails_with_crawl_fatal() {
    let llm = MockServer::start().await;
    let store = Arc::new(InMemoryStore::new());
    let service = build_service(&llm.uri(), store.clone());

    // Nothing listens on port 1.
    let job_id = service.submit(request("http://127.0.0.1:1/", PlanTier::Basic, None));
    let view = wait_for_terminal(&service, job_id).await;

    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.as_deref().unwrap().starts_with("CrawlFatal"));

    // Zero module rows, no report.
    assert!(store.list_module_results(job_id).await.unwrap().is_empty());
    assert!(store.get_final_report(job_id).await.unwrap().is_none());
}

#[tokio::test]
async fn resubmitting_a_url_runs_an_independent_job() {
    let site = mock_site().await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(llm_response(&module_payload(82, "AA")))
        .mount(&llm)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let service = build_service(&llm.uri(), store.clone());

    let first = service.submit(request(&site.uri(), PlanTier::Basic, Some(1)));
    let second = service.submit(request(&site.uri(), PlanTier::Basic, Some(1)));
    assert_ne!(first, second);

    let first_view = wait_for_terminal(&service, first).await;
    let second_view = wait_for_terminal(&service, second).await;
    assert!(is_completed(&first_view));
    assert!(is_completed(&second_view));

    // Independent runs, independent rows.
    assert_eq!(store.list_module_results(first).await.unwrap().len(), 12);
    assert_eq!(store.list_module_results(second).await.unwrap().len(), 12);
}

#[tokio::test]
async fn deadline_overrun_fails_the_job() {
    let site = mock_site().await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            llm_response(&module_payload(80, "AA")).set_delay(Duration::from_secs(10)),
        )
        .mount(&llm)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let mut config = barriercheck_core::config::Config::default();
    config.jobs.deadline_seconds = 1;
    let service = build_service_with(&llm.uri(), store.clone(), config);

    let job_id = service.submit(request(&site.uri(), PlanTier::Basic, Some(1)));
    let view = wait_for_terminal(&service, job_id).await;

    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.error.as_deref().unwrap().starts_with("Deadline"));
}

#[tokio::test]
async fn progress_is_monotonic_while_running() {
    let site = mock_site().await;
    let llm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            llm_response(&module_payload(85, "AA")).set_delay(Duration::from_millis(100)),
        )
        .mount(&llm)
        .await;

    let store = Arc::new(InMemoryStore::new());
    let service = build_service(&llm.uri(), store.clone());
    let job_id = service.submit(request(&site.uri(), PlanTier::Basic, Some(1)));

    let mut last = 0u8;
    loop {
        let view = service.poll(job_id).await.unwrap();
        assert!(
            view.progress >= last,
            "progress went backwards: {} -> {}",
            last,
            view.progress
        );
        last = view.progress;
        if view.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(last, 100);
}
