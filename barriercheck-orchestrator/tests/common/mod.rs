//! Shared helpers for orchestrator integration tests

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use barriercheck_core::config::Config;
use barriercheck_core::domain::JobStatus;
use barriercheck_llm::{OpenAiProvider, PromptRegistry};
use barriercheck_orchestrator::pipeline::Services;
use barriercheck_orchestrator::{
    AnalysisStore, AuditService, InMemoryStore, JobRegistry, JobStatusView,
};

/// Serve a small three-page site with assorted accessibility features.
pub async fn mock_site() -> MockServer {
    let server = MockServer::start().await;

    let html = |body: &str| {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html; charset=utf-8")
            .set_body_string(body.to_string())
    };

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r##"<html lang="en"><head><title>Acme Home</title></head><body>
               <a href="#main">Skip to content</a>
               <nav><a href="/about">About</a><a href="/contact">Contact</a></nav>
               <main id="main">
                 <h1>Welcome</h1>
                 <img src="/hero.png" alt="Team at work">
                 <img src="/decor.png">
               </main>
               </body></html>"##,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(html(
            r#"<html lang="en"><head><title>About Acme</title></head><body>
               <nav><a href="/about">About</a><a href="/contact">Contact</a></nav>
               <main><h1>About</h1><h3>History</h3></main>
               </body></html>"#,
        ))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/contact"))
        .respond_with(html(
            r#"<html lang="en"><head><title>Contact Acme</title></head><body>
               <main><h1>Contact</h1>
               <form action="/send">
                 <label for="email">E-mail</label>
                 <input id="email" type="email" name="email">
                 <input type="text" name="unlabeled">
                 <button type="submit">Send</button>
               </form></main>
               </body></html>"#,
        ))
        .mount(&server)
        .await;

    server
}

/// Analysis payload every well-behaved module responds with.
pub fn module_payload(score: u8, level: &str) -> String {
    serde_json::json!({
        "analysis_result": {
            "summary": {
                "score": score,
                "compliance_level": level,
                "overall_assessment": "Largely accessible with isolated gaps."
            },
            "criteria_evaluation": [
                {
                    "criterion_id": "1.1.1",
                    "name": "Non-text Content",
                    "status": "PASSED",
                    "finding": "Most images carry alt text",
                    "impact": "",
                    "examples": [],
                    "recommendation": "",
                    "severity": "MINOR"
                },
                {
                    "criterion_id": "1.1.1",
                    "name": "Non-text Content",
                    "status": "FAILED",
                    "finding": "Decorative image lacks empty alt",
                    "impact": "Screen readers announce the filename",
                    "examples": ["/decor.png"],
                    "recommendation": "Add alt=\"\"",
                    "severity": "MODERATE"
                }
            ],
            "priority_actions": {
                "immediate": [
                    {"title": "Add text alternatives", "description": "Fix missing alt attributes", "effort": "LOW", "affected_criteria": ["1.1.1"]}
                ],
                "short_term": [],
                "long_term": []
            }
        }
    })
    .to_string()
}

/// Wrap module content in the chat-completions wire format.
pub fn llm_response(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "id": "chatcmpl-test",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 900, "completion_tokens": 300, "total_tokens": 1200 }
    }))
}

/// Build the service graph against a mock LLM endpoint and an in-memory
/// store.
pub fn build_service(llm_url: &str, store: Arc<InMemoryStore>) -> AuditService {
    build_service_with(llm_url, store, Config::default())
}

pub fn build_service_with(
    llm_url: &str,
    store: Arc<InMemoryStore>,
    mut config: Config,
) -> AuditService {
    // Keep test crawls and retries snappy.
    config.crawler.request_timeout_seconds = 5;
    config.crawler.crawl_budget_seconds = 30;

    let store: Arc<dyn AnalysisStore> = store;
    let provider = Arc::new(
        OpenAiProvider::with_timeout("test-key", "test-model", 10).with_base_url(llm_url),
    );
    let registry = Arc::new(JobRegistry::new(store.clone()));

    AuditService::new(Arc::new(Services {
        config,
        store,
        registry,
        provider,
        prompts: Arc::new(PromptRegistry::embedded()),
    }))
}

/// Poll until the job reaches a terminal state.
pub async fn wait_for_terminal(service: &AuditService, job_id: uuid::Uuid) -> JobStatusView {
    for _ in 0..600 {
        let view = service.poll(job_id).await.expect("job must be pollable");
        if view.status.is_terminal() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {} did not reach a terminal state in time", job_id);
}

/// Poll until progress reaches at least `percent` (or terminal).
pub async fn wait_for_progress(
    service: &AuditService,
    job_id: uuid::Uuid,
    percent: u8,
) -> JobStatusView {
    for _ in 0..600 {
        let view = service.poll(job_id).await.expect("job must be pollable");
        if view.progress >= percent || view.status.is_terminal() {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job {} never reached {}% progress", job_id, percent);
}

/// `JobStatus` re-export convenience for assertions.
pub fn is_completed(view: &JobStatusView) -> bool {
    view.status == JobStatus::Completed
}
