//! OpenAI-compatible provider implementation
//!
//! Works with the OpenAI API and any endpoint speaking the same
//! chat-completions protocol.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::domain::{
    CompletionRequest, CompletionResponse, LlmError, LlmProvider, ProviderInfo, Usage,
};

/// OpenAI-compatible chat-completions provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    timeout_seconds: u64,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_timeout(api_key, model, 120)
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_seconds: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build HTTP client with custom timeout, using default client");
                Client::new()
            });

        Self {
            client,
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            timeout_seconds,
        }
    }

    /// Point at a different OpenAI-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn to_wire_request(&self, request: &CompletionRequest) -> WireRequest {
        WireRequest {
            model: request.model.clone().unwrap_or_else(|| self.model.clone()),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
            response_format: request.json_mode.and_then(|on| {
                on.then(|| ResponseFormat {
                    format_type: "json_object".to_string(),
                })
            }),
        }
    }

    fn error_from_status(status: StatusCode, retry_after: Option<u64>, body: String) -> LlmError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication(body),
            StatusCode::NOT_FOUND => LlmError::ModelNotFound(body),
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
                retry_after,
                message: body,
            },
            s if s.is_server_error() => LlmError::ServiceUnavailable(body),
            _ => LlmError::InvalidRequest(body),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "openai",
            name: "OpenAI-compatible",
        }
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let wire = self.to_wire_request(&request);
        debug!(model = %wire.model, messages = wire.messages.len(), "Dispatching chat completion");

        let response = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(&wire)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(self.timeout_seconds)
                } else {
                    LlmError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error_from_status(status, retry_after, body));
        }

        let wire_response: WireResponse = response.json().await?;
        let choice = wire_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response carried no choices".to_string()))?;

        Ok(CompletionResponse {
            id: wire_response.id,
            model: wire_response.model,
            content: choice.message.content.unwrap_or_default(),
            usage: wire_response
                .usage
                .map(|u| Usage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                })
                .unwrap_or_default(),
        })
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Message;

    #[test]
    fn wire_request_uses_provider_default_model() {
        let provider = OpenAiProvider::new("key", "gpt-4-turbo-preview");
        let request = CompletionRequest::new().with_message(Message::user("hi"));
        let wire = provider.to_wire_request(&request);
        assert_eq!(wire.model, "gpt-4-turbo-preview");
        assert!(wire.response_format.is_none());
    }

    #[test]
    fn json_mode_sets_response_format() {
        let provider = OpenAiProvider::new("key", "m");
        let request = CompletionRequest::new().with_json_mode(true);
        let wire = provider.to_wire_request(&request);
        assert_eq!(wire.response_format.unwrap().format_type, "json_object");
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            OpenAiProvider::error_from_status(StatusCode::TOO_MANY_REQUESTS, Some(7), "x".into()),
            LlmError::RateLimited {
                retry_after: Some(7),
                ..
            }
        ));
        assert!(matches!(
            OpenAiProvider::error_from_status(StatusCode::BAD_REQUEST, None, "x".into()),
            LlmError::InvalidRequest(_)
        ));
        assert!(matches!(
            OpenAiProvider::error_from_status(StatusCode::BAD_GATEWAY, None, "x".into()),
            LlmError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            OpenAiProvider::error_from_status(StatusCode::UNAUTHORIZED, None, "x".into()),
            LlmError::Authentication(_)
        ));
    }
}
