//! Resilient LLM provider wrapper
//!
//! Adds retry with exponential backoff and a global concurrency bound to
//! any [`LlmProvider`]. Rate-limit responses with a server-supplied delay
//! are honoured; the bound is shared across all jobs so one noisy job
//! cannot starve the others at the client layer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::{CompletionRequest, CompletionResponse, LlmError, LlmProvider, ProviderInfo};

/// Retry configuration for transient LLM failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first call
    pub max_attempts: u32,
    /// Initial backoff delay
    pub base_delay: Duration,
    /// Multiplier applied per attempt
    pub factor: f64,
    /// Relative jitter applied to every delay (0.2 = +/-20%)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay before retry number `attempt` (1-based), jittered.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * self.factor.powi(attempt.saturating_sub(1) as i32);
        let jitter = if self.jitter > 0.0 {
            rand::thread_rng().gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64((exp * (1.0 + jitter)).max(0.0))
    }
}

/// Wraps any provider with retry and a shared concurrency bound.
pub struct ResilientProvider {
    inner: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
    permits: Arc<Semaphore>,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn LlmProvider>, policy: RetryPolicy, max_concurrent: usize) -> Self {
        Self {
            inner,
            policy,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn with_defaults(inner: Arc<dyn LlmProvider>) -> Self {
        Self::new(inner, RetryPolicy::default(), 32)
    }
}

#[async_trait]
impl LlmProvider for ResilientProvider {
    fn info(&self) -> ProviderInfo {
        self.inner.info()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::Configuration("LLM client permit pool closed".to_string()))?;

        let mut last_error: Option<LlmError> = None;

        for attempt in 1..=self.policy.max_attempts {
            match self.inner.complete(request.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(attempt, "LLM call succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    // A server-supplied retry delay wins over our own backoff.
                    let delay = err
                        .retry_after()
                        .unwrap_or_else(|| self.policy.delay_for_attempt(attempt));
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient LLM failure, backing off"
                    );
                    last_error = Some(err);
                    sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| LlmError::Configuration("retry loop exited without error".into())))
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        calls: AtomicU32,
        fail_first: u32,
        error_kind: fn() -> LlmError,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                id: "flaky",
                name: "Flaky",
            }
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err((self.error_kind)())
            } else {
                Ok(CompletionResponse {
                    id: "r1".into(),
                    model: "test".into(),
                    content: "{}".into(),
                    usage: Default::default(),
                })
            }
        }

        fn default_model(&self) -> &str {
            "test"
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            factor: 2.0,
            jitter: 0.0,
        }
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: 2,
            error_kind: || LlmError::network("reset"),
        });
        let provider = ResilientProvider::new(inner.clone(), fast_policy(), 4);

        let result = provider.complete(CompletionRequest::new()).await;
        assert!(result.is_ok());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error_kind: || LlmError::InvalidRequest("400".into()),
        });
        let provider = ResilientProvider::new(inner.clone(), fast_policy(), 4);

        let result = provider.complete(CompletionRequest::new()).await;
        assert!(matches!(result, Err(LlmError::InvalidRequest(_))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error() {
        let inner = Arc::new(FlakyProvider {
            calls: AtomicU32::new(0),
            fail_first: 10,
            error_kind: || LlmError::timeout(1),
        });
        let provider = ResilientProvider::new(inner.clone(), fast_policy(), 4);

        let result = provider.complete(CompletionRequest::new()).await;
        assert!(matches!(result, Err(LlmError::Timeout { .. })));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay_for_attempt(1).as_secs_f64();
            assert!((0.8..=1.2).contains(&d), "delay {} outside +/-20%", d);
        }
    }
}
