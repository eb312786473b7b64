//! Generative-model access and the bounded retry loop around it
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};

use crate::{
    config::PipelineConfig,
    error::{AppResult, GenerationError},
    models::{AttemptOutcome, GenerationAttempt},
    services::cancel::CancelSignal,
};

/// A text-completion backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// False when credentials are missing; checked before any call is made
    fn is_configured(&self) -> bool;

    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Google Gemini `generateContent` client
#[derive(Clone)]
pub struct GeminiClient {
    http_client: HttpClient,
    api_key: Option<String>,
    api_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate, all parts concatenated
    fn into_text(self) -> Option<String> {
        let candidate = self.candidates.into_iter().next()?;
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(GenerationError::NotConfigured);
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_url, self.model
        );

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Transport(format!(
                "Gemini API returned status {}: {}",
                status, body
            )));
        }

        let body: GenerateContentResponse = response.json().await?;
        body.into_text().ok_or_else(|| {
            GenerationError::Transport("Gemini response contained no text".to_string())
        })
    }
}

/// Result of one invocation: the model text (or why there is none) plus the
/// attempts that were made
#[derive(Debug)]
pub struct Invocation {
    pub result: Result<String, GenerationError>,
    pub attempts: Vec<GenerationAttempt>,
}

#[derive(Debug)]
enum InvokerState {
    NotStarted,
    Attempting(u32),
    Succeeded(String),
    Exhausted(GenerationError),
}

/// Calls a [`TextGenerator`] with bounded retries and exponential backoff
#[derive(Clone)]
pub struct ModelInvoker {
    generator: Arc<dyn TextGenerator>,
    max_attempts: u32,
    backoff_base: Duration,
    request_timeout: Duration,
}

impl ModelInvoker {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &PipelineConfig) -> Self {
        Self {
            generator,
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            request_timeout: config.request_timeout,
        }
    }

    /// Delay after failed attempt `attempt`: `base * 2^attempt`
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs the retry state machine until success, exhaustion or cancellation.
    ///
    /// Only transport errors are retried. Both the call and the backoff sleep
    /// race `cancel`.
    pub async fn invoke(&self, prompt: &str, cancel: &CancelSignal) -> Invocation {
        let mut attempts = Vec::new();
        let mut state = InvokerState::NotStarted;

        loop {
            state = match state {
                InvokerState::NotStarted => {
                    if self.generator.is_configured() {
                        InvokerState::Attempting(1)
                    } else {
                        tracing::warn!("Generation service not configured, skipping model call");
                        InvokerState::Exhausted(GenerationError::NotConfigured)
                    }
                }
                InvokerState::Attempting(attempt) => {
                    self.attempt(attempt, prompt, cancel, &mut attempts).await
                }
                InvokerState::Succeeded(text) => {
                    return Invocation {
                        result: Ok(text),
                        attempts,
                    }
                }
                InvokerState::Exhausted(e) => {
                    return Invocation {
                        result: Err(e),
                        attempts,
                    }
                }
            };
        }
    }

    async fn attempt(
        &self,
        attempt: u32,
        prompt: &str,
        cancel: &CancelSignal,
        attempts: &mut Vec<GenerationAttempt>,
    ) -> InvokerState {
        if cancel.is_cancelled() {
            return InvokerState::Exhausted(GenerationError::Cancelled);
        }

        tracing::debug!(
            attempt = attempt,
            max_attempts = self.max_attempts,
            "Calling generation service"
        );

        let call = tokio::time::timeout(self.request_timeout, self.generator.generate_text(prompt));
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            outcome = call => outcome.unwrap_or_else(|_| {
                Err(GenerationError::Transport(format!(
                    "request timed out after {}ms",
                    self.request_timeout.as_millis()
                )))
            }),
        };

        let error = match result {
            Ok(text) => {
                attempts.push(GenerationAttempt {
                    attempt_number: attempt,
                    outcome: AttemptOutcome::Success,
                    backoff_applied_ms: 0,
                });
                tracing::info!(attempt = attempt, "Generation succeeded");
                return InvokerState::Succeeded(text);
            }
            Err(GenerationError::Cancelled) => {
                tracing::info!(attempt = attempt, "Generation cancelled by caller");
                return InvokerState::Exhausted(GenerationError::Cancelled);
            }
            Err(e) => e,
        };

        if !error.is_retryable() || attempt >= self.max_attempts {
            attempts.push(GenerationAttempt {
                attempt_number: attempt,
                outcome: AttemptOutcome::TransportError,
                backoff_applied_ms: 0,
            });
            tracing::warn!(attempt = attempt, error = %error, "Generation failed, giving up");
            return InvokerState::Exhausted(error);
        }

        let delay = self.backoff(attempt);
        attempts.push(GenerationAttempt {
            attempt_number: attempt,
            outcome: AttemptOutcome::TransportError,
            backoff_applied_ms: delay.as_millis() as u64,
        });
        tracing::warn!(
            attempt = attempt,
            backoff_ms = delay.as_millis() as u64,
            error = %error,
            "Generation failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(attempt = attempt, "Cancelled during backoff");
                InvokerState::Exhausted(GenerationError::Cancelled)
            }
            _ = tokio::time::sleep(delay) => InvokerState::Attempting(attempt + 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cancel::cancellation;
    use mockall::Sequence;

    fn invoker(generator: impl TextGenerator + 'static) -> ModelInvoker {
        ModelInvoker::new(Arc::new(generator), &PipelineConfig::default())
    }

    fn transport_error() -> GenerationError {
        GenerationError::Transport("connection reset".to_string())
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let invoker = invoker(MockTextGenerator::new());
        assert_eq!(invoker.backoff(1), Duration::from_secs(2));
        assert_eq!(invoker.backoff(2), Duration::from_secs(4));
        assert_eq!(invoker.backoff(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_transport_errors_exhaust_attempts() {
        let mut generator = MockTextGenerator::new();
        generator.expect_is_configured().return_const(true);
        generator
            .expect_generate_text()
            .times(3)
            .returning(|_| Err(transport_error()));

        let started = tokio::time::Instant::now();
        let invocation = invoker(generator)
            .invoke("prompt", &CancelSignal::never())
            .await;

        assert_eq!(invocation.result, Err(transport_error()));
        let backoffs: Vec<u64> = invocation
            .attempts
            .iter()
            .map(|a| a.backoff_applied_ms)
            .collect();
        assert_eq!(backoffs, vec![2000, 4000, 0]);
        assert!(invocation
            .attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::TransportError));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let mut seq = Sequence::new();
        let mut generator = MockTextGenerator::new();
        generator.expect_is_configured().return_const(true);
        generator
            .expect_generate_text()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(transport_error()));
        generator
            .expect_generate_text()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("[]".to_string()));

        let invocation = invoker(generator)
            .invoke("prompt", &CancelSignal::never())
            .await;

        assert_eq!(invocation.result, Ok("[]".to_string()));
        assert_eq!(invocation.attempts.len(), 2);
        assert_eq!(invocation.attempts[1].attempt_number, 2);
        assert_eq!(invocation.attempts[1].outcome, AttemptOutcome::Success);
    }

    #[tokio::test]
    async fn test_unconfigured_generator_makes_no_calls() {
        let mut generator = MockTextGenerator::new();
        generator.expect_is_configured().return_const(false);
        generator.expect_generate_text().times(0);

        let invocation = invoker(generator)
            .invoke("prompt", &CancelSignal::never())
            .await;

        assert_eq!(invocation.result, Err(GenerationError::NotConfigured));
        assert!(invocation.attempts.is_empty());
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let mut generator = MockTextGenerator::new();
        generator.expect_is_configured().return_const(true);
        generator
            .expect_generate_text()
            .times(1)
            .returning(|_| Err(GenerationError::NotConfigured));

        let invocation = invoker(generator)
            .invoke("prompt", &CancelSignal::never())
            .await;

        assert_eq!(invocation.result, Err(GenerationError::NotConfigured));
        assert_eq!(invocation.attempts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retries() {
        let mut generator = MockTextGenerator::new();
        generator.expect_is_configured().return_const(true);
        generator
            .expect_generate_text()
            .times(1)
            .returning(|_| Err(transport_error()));

        let (handle, signal) = cancellation();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            handle.cancel();
        });

        let invocation = invoker(generator).invoke("prompt", &signal).await;

        assert_eq!(invocation.result, Err(GenerationError::Cancelled));
        assert_eq!(invocation.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_calls() {
        let mut generator = MockTextGenerator::new();
        generator.expect_is_configured().return_const(true);
        generator.expect_generate_text().times(0);

        let (handle, signal) = cancellation();
        handle.cancel();

        let invocation = invoker(generator).invoke("prompt", &signal).await;
        assert_eq!(invocation.result, Err(GenerationError::Cancelled));
        assert!(invocation.attempts.is_empty());
    }

    struct StalledGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for StalledGenerator {
        fn is_configured(&self) -> bool {
            true
        }

        async fn generate_text(&self, _prompt: &str) -> Result<String, GenerationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("[]".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_is_transport_error() {
        let config = PipelineConfig {
            max_attempts: 1,
            request_timeout: Duration::from_secs(30),
            ..Default::default()
        };
        let invoker = ModelInvoker::new(Arc::new(StalledGenerator), &config);

        let invocation = invoker.invoke("prompt", &CancelSignal::never()).await;

        assert!(matches!(invocation.result, Err(GenerationError::Transport(_))));
        assert_eq!(invocation.attempts[0].outcome, AttemptOutcome::TransportError);
    }

    #[test]
    fn test_gemini_response_text_is_concatenated() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "[{\"title\":" }, { "text": "\"A\"}]" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();

        assert_eq!(body.into_text(), Some("[{\"title\":\"A\"}]".to_string()));
    }

    #[test]
    fn test_gemini_response_without_text() {
        let body: GenerateContentResponse =
            serde_json::from_value(json!({ "promptFeedback": { "blockReason": "SAFETY" } }))
                .unwrap();
        assert_eq!(body.into_text(), None);
    }

    #[test]
    fn test_blank_api_key_is_unconfigured() {
        let client = GeminiClient::new(
            Some("  ".to_string()),
            "https://example.com/".to_string(),
            "gemini-2.5-flash".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(!client.is_configured());
    }
}
