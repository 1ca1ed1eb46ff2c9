//! Retry with exponential backoff for transient model failures.
//!
//! Wraps any [`ModelClient`]. Timeouts, rate limits, network failures and
//! 5xx responses are retried; everything else is returned immediately.

use async_trait::async_trait;
use crawlpilot_core::{ModelClient, ModelError, ModelRequest, ModelResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct RetryingClient {
    inner: Arc<dyn ModelClient>,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryingClient {
    pub fn new(inner: Arc<dyn ModelClient>) -> Self {
        Self {
            inner,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// A provider-supplied retry-after wins when it is longer than the
    /// computed backoff. `None` when that retry-after exceeds `max_delay`.
    fn delay_for(&self, attempt: u32, error: &ModelError) -> Option<Duration> {
        let backoff = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        match error {
            ModelError::RateLimited { retry_after_secs } => {
                let wait = Duration::from_secs(*retry_after_secs);
                (wait <= self.max_delay).then(|| backoff.max(wait))
            }
            _ => Some(backoff),
        }
    }
}

#[async_trait]
impl ModelClient for RetryingClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let Some(delay) = self.delay_for(attempt, &e) else {
                        warn!(
                            client = %self.inner.name(),
                            error = %e,
                            max_delay_ms = self.max_delay.as_millis() as u64,
                            "Provider asked to wait past the retry cap, giving up"
                        );
                        return Err(e);
                    };
                    warn!(
                        client = %self.inner.name(),
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawlpilot_core::Message;
    use std::sync::Mutex;

    /// Fails with the queued errors, then answers.
    struct FlakyClient {
        errors: Mutex<Vec<ModelError>>,
        calls: Mutex<usize>,
    }

    impl FlakyClient {
        fn new(errors: Vec<ModelError>) -> Self {
            Self {
                errors: Mutex::new(errors),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ModelClient for FlakyClient {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ModelError> {
            *self.calls.lock().unwrap() += 1;
            let mut errors = self.errors.lock().unwrap();
            if errors.is_empty() {
                Ok(ModelResponse::Final { content: "ok".into() })
            } else {
                Err(errors.remove(0))
            }
        }
    }

    fn request() -> ModelRequest {
        ModelRequest {
            system_prompt: None,
            messages: vec![Message::user("hi")],
            tools: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let inner = Arc::new(FlakyClient::new(vec![
            ModelError::Timeout("slow".into()),
            ModelError::ApiError { status_code: 503, message: "busy".into() },
        ]));
        let client = RetryingClient::new(inner.clone());

        let started = tokio::time::Instant::now();
        let resp = client.generate(request()).await.unwrap();
        assert!(resp.is_final());
        assert_eq!(inner.calls(), 3);
        // 500ms + 1000ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let inner = Arc::new(FlakyClient::new(vec![ModelError::AuthenticationFailed("bad key".into())]));
        let client = RetryingClient::new(inner.clone());

        let err = client.generate(request()).await.unwrap_err();
        assert!(matches!(err, ModelError::AuthenticationFailed(_)));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let errors = (0..10).map(|_| ModelError::Network("reset".into())).collect();
        let inner = Arc::new(FlakyClient::new(errors));
        let client = RetryingClient::new(inner.clone()).with_max_retries(2);

        let err = client.generate(request()).await.unwrap_err();
        assert!(matches!(err, ModelError::Network(_)));
        assert_eq!(inner.calls(), 3);
    }

    #[test]
    fn backoff_is_capped_and_honors_retry_after() {
        let client = RetryingClient::new(Arc::new(FlakyClient::new(vec![])));
        let net = ModelError::Network("x".into());
        assert_eq!(client.delay_for(0, &net), Some(Duration::from_millis(500)));
        assert_eq!(client.delay_for(2, &net), Some(Duration::from_secs(2)));
        assert_eq!(client.delay_for(10, &net), Some(Duration::from_secs(8)));

        let limited = ModelError::RateLimited { retry_after_secs: 5 };
        assert_eq!(client.delay_for(0, &limited), Some(Duration::from_secs(5)));

        let too_long = ModelError::RateLimited { retry_after_secs: 3600 };
        assert_eq!(client.delay_for(0, &too_long), None);
    }

    #[tokio::test(start_paused = true)]
    async fn long_retry_after_surfaces_at_once() {
        let inner = Arc::new(FlakyClient::new(vec![ModelError::RateLimited { retry_after_secs: 3600 }]));
        let client = RetryingClient::new(inner.clone());

        let started = tokio::time::Instant::now();
        let err = client.generate(request()).await.unwrap_err();
        assert!(matches!(err, ModelError::RateLimited { retry_after_secs: 3600 }));
        assert_eq!(inner.calls(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
