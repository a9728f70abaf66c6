//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub crawler: CrawlerConfig,
    pub jobs: JobsConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// LLM endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model identifier, e.g. `gpt-4-turbo-preview`
    pub model: String,
    /// API key; required at startup
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible chat completions endpoint
    pub base_url: String,
    /// Sampling temperature; analyses want near-deterministic output
    pub temperature: f64,
    /// Response token ceiling
    pub max_tokens: u32,
    /// Prompt character budget before the data section is truncated
    pub max_prompt_chars: usize,
    /// Per-call timeout in seconds
    pub request_timeout_seconds: u64,
    /// Global concurrency bound shared across jobs
    pub max_concurrent_requests: usize,
    /// Directory of axis prompt templates; embedded defaults when unset
    pub prompt_dir: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo-preview".to_string(),
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.0,
            max_tokens: 5000,
            max_prompt_chars: 400_000,
            request_timeout_seconds: 120,
            max_concurrent_requests: 32,
            prompt_dir: None,
        }
    }
}

/// Crawler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Default page cap when the plan does not narrow it further
    pub default_max_pages: usize,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
    /// Total wall-clock budget for one crawl, in seconds
    pub crawl_budget_seconds: u64,
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            default_max_pages: 5,
            request_timeout_seconds: 30,
            crawl_budget_seconds: 120,
            user_agent: concat!("barriercheck/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Job execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Wall-clock ceiling per job, in seconds
    pub deadline_seconds: u64,
    /// Concurrent module dispatches within one job (floor 2)
    pub module_concurrency: usize,
    /// Concurrent jobs processed by the worker pool
    pub max_concurrent_jobs: usize,
    /// Interval of the stale-job sweep, in seconds
    pub stale_sweep_interval_seconds: u64,
}

impl JobsConfig {
    /// Effective per-job module concurrency: configured value, floor 2.
    pub fn effective_module_concurrency(&self) -> usize {
        self.module_concurrency.max(2)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_seconds)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            deadline_seconds: 30 * 60,
            module_concurrency: 12,
            max_concurrent_jobs: 4,
            stale_sweep_interval_seconds: 300,
        }
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Postgres connection URL; required at startup
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `text`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.llm.validate()?;
        self.crawler.validate()?;
        self.jobs.validate()?;
        Ok(())
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.model.is_empty() {
            return Err(ValidationError::new("llm.model", "must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::new(
                "llm.temperature",
                "must be within 0.0..=2.0",
            ));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ValidationError::new(
                "llm.max_concurrent_requests",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Validate for CrawlerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.default_max_pages == 0 {
            return Err(ValidationError::new(
                "crawler.default_max_pages",
                "must be at least 1",
            ));
        }
        if self.user_agent.is_empty() {
            return Err(ValidationError::new("crawler.user_agent", "must not be empty"));
        }
        Ok(())
    }
}

impl Validate for JobsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.deadline_seconds == 0 {
            return Err(ValidationError::new(
                "jobs.deadline_seconds",
                "must be at least 1",
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ValidationError::new(
                "jobs.max_concurrent_jobs",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        // Add environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        // Add local config and environment variables last (highest priority)
        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("BARRIERCHECK").separator("__"));

        let config: Config = builder.build()?.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Fail when a value the service cannot run without is absent.
    pub fn require_bindings(&self) -> Result<(), crate::error::AuditError> {
        if self.llm.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(crate::error::AuditError::ConfigMissing(
                "llm.api_key (BARRIERCHECK__LLM__API_KEY)".to_string(),
            ));
        }
        if self.store.database_url.as_deref().unwrap_or("").is_empty() {
            return Err(crate::error::AuditError::ConfigMissing(
                "store.database_url (BARRIERCHECK__STORE__DATABASE_URL)".to_string(),
            ));
        }
        Ok(())
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}
