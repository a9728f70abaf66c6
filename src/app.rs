//! Application assembly
//!
//! Builds the shared service graph once at startup and hands out a
//! single [`AppHandle`]: no module-level singletons, every component
//! receives its collaborators explicitly.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use barriercheck_core::{AuditError, Config};
use barriercheck_llm::{OpenAiProvider, PromptRegistry, ResilientProvider, RetryPolicy};
use barriercheck_orchestrator::pipeline::Services;
use barriercheck_orchestrator::store::PostgresStore;
use barriercheck_orchestrator::{AnalysisStore, AuditService, JobRegistry};

use crate::workers;

/// Handle to the assembled application.
pub struct AppHandle {
    pub service: Arc<AuditService>,
    pub shutdown: CancellationToken,
}

impl AppHandle {
    /// Signal the background workers to stop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Build the application from validated configuration.
///
/// Fails with `ConfigMissing` when a required binding (API key, database
/// URL) is absent, and with `PersistenceTransient` when the store is
/// unreachable at startup.
pub async fn create_app(config: Config) -> Result<AppHandle, AuditError> {
    config.require_bindings()?;

    let api_key = config.llm.api_key.clone().unwrap_or_default();
    let database_url = config.store.database_url.clone().unwrap_or_default();

    let store: Arc<dyn AnalysisStore> = Arc::new(
        PostgresStore::connect(&database_url, config.store.max_connections)
            .await
            .map_err(|e| AuditError::PersistenceTransient(e.to_string()))?,
    );

    let base_provider = Arc::new(
        OpenAiProvider::with_timeout(
            api_key,
            config.llm.model.clone(),
            config.llm.request_timeout_seconds,
        )
        .with_base_url(config.llm.base_url.clone()),
    );
    let provider = Arc::new(ResilientProvider::new(
        base_provider,
        RetryPolicy::default(),
        config.llm.max_concurrent_requests,
    ));

    let prompts = Arc::new(match &config.llm.prompt_dir {
        Some(dir) => PromptRegistry::from_dir(dir),
        None => PromptRegistry::embedded(),
    });

    let registry = Arc::new(JobRegistry::new(store.clone()));

    let services = Arc::new(Services {
        config: config.clone(),
        store: store.clone(),
        registry: registry.clone(),
        provider,
        prompts,
    });

    let shutdown = CancellationToken::new();
    workers::spawn_stale_job_sweeper(store, registry, &config, shutdown.clone());

    Ok(AppHandle {
        service: Arc::new(AuditService::new(services)),
        shutdown,
    })
}
