//! Module dispatcher: twelve concurrent per-axis LLM analyses
//!
//! Each axis is an independent unit of work: assemble the prompt from the
//! axis slice plus automated-check context, call the provider, repair and
//! validate the output, persist the module row. Modules run on a
//! `JoinSet` throttled by a per-job semaphore; one module's permanent
//! failure never touches its siblings. Results are persisted in
//! completion order.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use barriercheck_core::config::LlmConfig;
use barriercheck_core::domain::{Axis, CheckReport, ModuleResult, ModuleStatus, SiteSnapshot};
use barriercheck_core::AuditError;
use barriercheck_llm::repair;
use barriercheck_llm::{CompletionRequest, LlmError, LlmProvider, PromptRegistry, RetryPolicy};

use crate::store::{with_retries, AnalysisStore};
use crate::validate::validate_module_output;

/// Dispatches the per-axis analysis modules for one job.
pub struct ModuleDispatcher {
    provider: Arc<dyn LlmProvider>,
    prompts: Arc<PromptRegistry>,
    store: Arc<dyn AnalysisStore>,
    llm: LlmConfig,
    retry: RetryPolicy,
}

impl ModuleDispatcher {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        prompts: Arc<PromptRegistry>,
        store: Arc<dyn AnalysisStore>,
        llm: LlmConfig,
    ) -> Self {
        Self {
            provider,
            prompts,
            store,
            llm,
            retry: RetryPolicy::default(),
        }
    }

    #[cfg(test)]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run all twelve modules concurrently. `concurrency` bounds in-flight
    /// modules within this job; `on_module_done(completed, total)` fires as
    /// each module finishes, in completion order.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn dispatch_all<F>(
        &self,
        job_id: Uuid,
        snapshot: &SiteSnapshot,
        checks: &CheckReport,
        concurrency: usize,
        cancel: &CancellationToken,
        mut on_module_done: F,
    ) -> Result<Vec<ModuleResult>, AuditError>
    where
        F: FnMut(usize, usize),
    {
        let permits = Arc::new(Semaphore::new(concurrency.max(2)));
        let mut join_set: JoinSet<ModuleResult> = JoinSet::new();

        info!(modules = Axis::ALL.len(), concurrency, "Dispatching analysis modules");

        for axis in Axis::ALL {
            let Some(slice) = snapshot.slice(axis) else {
                warn!(axis = %axis, "No slice for axis, skipping dispatch");
                continue;
            };

            let analysis_data = build_analysis_data(snapshot, checks, axis, &slice.data);
            let provider = self.provider.clone();
            let prompts = self.prompts.clone();
            let store = self.store.clone();
            let llm = self.llm.clone();
            let retry = self.retry.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();

            join_set.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let mut result = ModuleResult::pending(job_id, axis);
                        result.status = ModuleStatus::Failed;
                        result.error = Some("module permit pool closed".to_string());
                        return result;
                    }
                };

                run_module(
                    job_id,
                    axis,
                    analysis_data,
                    provider,
                    prompts,
                    store,
                    llm,
                    retry,
                    cancel,
                )
                .await
            });
        }

        let total = join_set.len();
        let mut results = Vec::with_capacity(total);

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    results.push(result);
                    on_module_done(results.len(), total);
                }
                Err(e) => {
                    // A panicked module task; its row stays at its last
                    // persisted state, siblings continue.
                    error!(job_id = %job_id, error = %e, "Module task panicked");
                }
            }
            if cancel.is_cancelled() {
                join_set.abort_all();
                return Err(AuditError::Cancelled);
            }
        }

        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }

        let completed = results.iter().filter(|r| r.is_completed()).count();
        info!(
            completed,
            failed = results.len() - completed,
            "Module dispatch finished"
        );

        Ok(results)
    }
}

/// Payload spliced into the template's `{WEBSITE_ANALYSIS_DATA}` slot.
fn build_analysis_data(
    snapshot: &SiteSnapshot,
    checks: &CheckReport,
    axis: Axis,
    slice: &serde_json::Value,
) -> serde_json::Value {
    json!({
        "specialized_analysis": slice,
        "base_context": {
            "website_url": snapshot.base_url,
            "pages_crawled": snapshot.pages_crawled,
            "pages_failed": snapshot.pages_failed,
            "accessibility_overview": {
                "total_violations": checks.violations.len(),
                "total_warnings": checks.warnings.len(),
                "total_passed": checks.passes.len(),
            },
        },
        "relevant_violations": checks.violations_matching(relevant_rule_fragments(axis)),
        "meta": {
            "wcag_area": axis.key(),
            "principle": axis.principle(),
        },
    })
}

/// Which automated rule ids matter for which axis.
fn relevant_rule_fragments(axis: Axis) -> &'static [&'static str] {
    match axis {
        Axis::TextAlternatives => &["image-alt", "image-empty-src", "object-alt"],
        Axis::TimeBasedMedia => &["video", "audio", "media"],
        Axis::Adaptable => &["heading-order", "form-label", "label-placeholder", "fieldset"],
        Axis::Distinguishable => &["contrast", "color"],
        Axis::Keyboard => &["keyboard", "focus", "tabindex", "bypass"],
        Axis::EnoughTime => &["meta-refresh", "blink"],
        Axis::Seizures => &["blink", "seizure", "motion"],
        Axis::Navigable => &["page-title", "link-name", "heading-order", "bypass", "landmark-main"],
        Axis::Readable => &["html-lang", "lang"],
        Axis::Predictable => &["link-name", "label-placeholder"],
        Axis::InputAssistance => &["form-label", "label-placeholder", "error"],
        Axis::Compatible => &["duplicate-id", "aria"],
    }
}

/// Execute one module end to end and persist its row.
#[allow(clippy::too_many_arguments)]
async fn run_module(
    job_id: Uuid,
    axis: Axis,
    analysis_data: serde_json::Value,
    provider: Arc<dyn LlmProvider>,
    prompts: Arc<PromptRegistry>,
    store: Arc<dyn AnalysisStore>,
    llm: LlmConfig,
    retry: RetryPolicy,
    cancel: CancellationToken,
) -> ModuleResult {
    let mut module = ModuleResult::pending(job_id, axis);
    module.status = ModuleStatus::Running;
    persist_module(&store, &module).await;

    let prompt = match prompts.assemble(axis, &analysis_data, llm.max_prompt_chars) {
        Ok(prompt) => prompt,
        Err(e) => {
            return finish_failed(store, module, format!("prompt assembly failed: {}", e)).await;
        }
    };

    // The whole call is retried when the output stays unparseable after
    // repair; transient HTTP failures retry inside the provider wrapper.
    let mut last_error = String::new();
    for attempt in 1..=retry.max_attempts {
        if cancel.is_cancelled() {
            return finish_failed(store, module, AuditError::Cancelled.user_message()).await;
        }

        let request = CompletionRequest::new()
            .with_system(prompt.system.clone())
            .with_user(prompt.user.clone())
            .with_temperature(llm.temperature)
            .with_max_tokens(llm.max_tokens)
            .with_json_mode(true);

        let response = tokio::select! {
            r = provider.complete(request) => r,
            _ = cancel.cancelled() => {
                return finish_failed(store, module, AuditError::Cancelled.user_message()).await;
            }
        };

        match response {
            Ok(response) => {
                module.token_usage += response.usage.total_tokens as u64;
                module.raw_output = Some(response.content.clone());

                match repair::parse_lenient(&response.content)
                    .map_err(|e| format!("{}: {}", AuditError::ParseFailed(e.to_string()).code(), e))
                    .and_then(|value| {
                        validate_module_output(value)
                            .map_err(|e| format!("ParseFailed: {}", e))
                    }) {
                    Ok(result) => {
                        debug!(
                            axis = %axis,
                            score = result.summary.score,
                            attempt,
                            "Module analysis parsed and validated"
                        );
                        module.status = ModuleStatus::Completed;
                        module.result = Some(result);
                        module.completed_at = Some(Utc::now());
                        module.error = None;
                        persist_module(&store, &module).await;
                        return module;
                    }
                    Err(reason) => {
                        warn!(axis = %axis, attempt, reason = %reason, "Module output rejected");
                        last_error = reason;
                    }
                }
            }
            Err(e) => {
                let code = classify_llm_error(&e);
                last_error = format!("{}: {}", code, e);
                if !e.is_retryable() {
                    // Permanent provider error: no point in another attempt.
                    return finish_failed(store, module, last_error).await;
                }
                warn!(axis = %axis, attempt, error = %e, "LLM call failed after provider retries");
            }
        }

        if attempt < retry.max_attempts {
            tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
        }
    }

    finish_failed(store, module, last_error).await
}

fn classify_llm_error(error: &LlmError) -> &'static str {
    if error.is_retryable() {
        "LLMTransient"
    } else {
        "LLMPermanent"
    }
}

async fn finish_failed(
    store: Arc<dyn AnalysisStore>,
    mut module: ModuleResult,
    error: String,
) -> ModuleResult {
    warn!(job_id = %module.job_id, axis = %module.axis, error = %error, "Module failed");
    module.status = ModuleStatus::Failed;
    module.completed_at = Some(Utc::now());
    module.error = Some(error);
    persist_module(&store, &module).await;
    module
}

async fn persist_module(store: &Arc<dyn AnalysisStore>, module: &ModuleResult) {
    if let Err(e) = with_retries(|| {
        let store = store.clone();
        let module = module.clone();
        async move { store.upsert_module_result(&module).await }
    })
    .await
    {
        error!(
            job_id = %module.job_id,
            axis = %module.axis,
            error = %e,
            "Persisting module result failed"
        );
    }
}
