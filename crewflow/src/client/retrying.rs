//! Retrying wrapper around a [`PromptTransport`].

use super::retry::{RetryConfig, RetryDecision, RetryPolicy};
use super::transport::{PromptTransport, TransportError};
use crate::errors::ApiError;
use crate::streaming::{FragmentStream, StreamAggregator};
use crate::utils::duration_ms;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// An open response stream plus the retry history that led to it.
pub struct Invocation {
    /// Response fragments in arrival order.
    pub fragments: FragmentStream,
    /// Attempt that opened the stream (1-indexed).
    pub attempts: u32,
    /// Backoff pauses taken before it.
    pub delays: Vec<Duration>,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("attempts", &self.attempts)
            .field("delays", &self.delays)
            .finish_non_exhaustive()
    }
}

/// A fully collected response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The response text.
    pub text: String,
    /// Attempt that produced it.
    pub attempts: u32,
}

/// Calls the model with bounded retries and error classification.
#[derive(Clone)]
pub struct RetryingApiClient {
    transport: Arc<dyn PromptTransport>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RetryingApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingApiClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryingApiClient {
    /// Creates a client with an explicit policy.
    pub fn new(transport: Arc<dyn PromptTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Creates a client with the default classifier and the given config.
    pub fn with_config(transport: Arc<dyn PromptTransport>, config: RetryConfig) -> Self {
        Self::new(transport, RetryPolicy::new(config))
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Opens a response stream, retrying failures per the policy.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] once the policy gives up.
    pub async fn invoke(&self, prompt: &str) -> Result<Invocation, ApiError> {
        let mut attempt = 0u32;
        let mut delays = Vec::new();

        loop {
            let error = match self.transport.send_prompt(prompt).await {
                Ok(fragments) => {
                    return Ok(Invocation {
                        fragments,
                        attempts: attempt + 1,
                        delays,
                    });
                }
                Err(error) => error,
            };

            match self.policy.classify(&error, attempt) {
                RetryDecision::Fatal(api_error) => {
                    warn!(
                        attempt = attempt + 1,
                        kind = %api_error.kind,
                        error = %error,
                        "Model API call failed"
                    );
                    return Err(api_error);
                }
                decision @ (RetryDecision::Retryable(_) | RetryDecision::RateLimited(_)) => {
                    let delay = decision.delay().unwrap_or_default();
                    debug!(
                        attempt = attempt + 1,
                        delay_ms = duration_ms(delay),
                        rate_limited = matches!(decision, RetryDecision::RateLimited(_)),
                        error = %error,
                        "Retrying after error"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    delays.push(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Classifies a failure that arrived after the stream opened.
    ///
    /// Such failures are never retried; they are treated as final.
    #[must_use]
    pub fn classify_stream_error(&self, error: &TransportError) -> ApiError {
        self.policy.classify_final(error)
    }

    /// Invokes the model and collects the whole response.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] for open or mid-stream failures.
    pub async fn complete(&self, prompt: &str) -> Result<Completion, ApiError> {
        let Invocation {
            mut fragments,
            attempts,
            ..
        } = self.invoke(prompt).await?;

        let mut aggregator = StreamAggregator::new();
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    aggregator.push(&fragment);
                }
                Err(error) => return Err(self.classify_stream_error(&error)),
            }
        }
        aggregator.finish();
        Ok(Completion {
            text: aggregator.into_output(),
            attempts,
        })
    }
}
