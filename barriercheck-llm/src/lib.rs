//! Provider-agnostic LLM client for the audit pipeline
//!
//! The dispatcher talks to a chat-completion endpoint through the
//! [`LlmProvider`] trait. This crate supplies the OpenAI-compatible
//! implementation, a resilience wrapper (retry with backoff, rate-limit
//! handling, global concurrency bound), the tolerant JSON repair pipeline
//! applied to model output, and the per-axis prompt template registry.

pub mod domain;
pub mod infrastructure;

pub use domain::{
    CompletionRequest, CompletionResponse, LlmError, LlmProvider, Message, ProviderInfo, Role,
    Usage,
};
pub use infrastructure::prompts::{AssembledPrompt, PromptRegistry};
pub use infrastructure::providers::{OpenAiProvider, ResilientProvider, RetryPolicy};
pub use infrastructure::repair;
