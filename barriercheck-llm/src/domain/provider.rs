//! LLM provider trait
//!
//! The core abstraction over chat-completion backends. The orchestrator
//! only ever sees `Arc<dyn LlmProvider>`.

use async_trait::async_trait;

use crate::domain::error::LlmError;
use crate::domain::messages::{CompletionRequest, CompletionResponse};

/// Metadata about a provider
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    /// Provider identifier (e.g. "openai")
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
}

/// Core trait for LLM providers.
///
/// Object-safe; used with dynamic dispatch via `Arc<dyn LlmProvider>`.
///
/// # Example
///
/// ```rust,ignore
/// async fn ask(provider: &dyn LlmProvider) -> Result<String, LlmError> {
///     let request = CompletionRequest::new().with_user("ping");
///     let response = provider.complete(request).await?;
///     Ok(response.content)
/// }
/// ```
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get provider metadata
    fn info(&self) -> ProviderInfo;

    /// Generate a completion
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Default model used when the request does not name one
    fn default_model(&self) -> &str;
}
