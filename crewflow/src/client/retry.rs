//! Retry policy for model API calls.
//!
//! Failures are sorted into four classes. Rate limits back off
//! exponentially, network failures back off linearly, rejected credentials
//! fail at once and everything else is retried without a pause.

use super::transport::{TransportError, TransportErrorKind};
use crate::errors::ApiError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^attempt
    #[default]
    Exponential,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

impl BackoffStrategy {
    /// Delay in milliseconds before retrying after the 0-indexed `attempt`.
    #[must_use]
    pub fn delay_ms(self, attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
        let delay = match self {
            Self::Exponential => base_ms.saturating_mul(2u64.saturating_pow(attempt)),
            Self::Linear => base_ms.saturating_mul(u64::from(attempt) + 1),
            Self::Constant => base_ms,
        };
        delay.min(max_ms)
    }
}

/// Jitter strategy applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// Exact delays
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
    /// Random from base to min(max, delay * 3)
    Decorrelated,
}

impl JitterStrategy {
    fn apply(self, delay: u64, base: u64, max: u64) -> u64 {
        if delay == 0 {
            return 0;
        }
        match self {
            Self::None => delay,
            Self::Full => rand::thread_rng().gen_range(0..=delay),
            Self::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
            Self::Decorrelated => {
                let upper = delay.saturating_mul(3).min(max);
                if upper <= base {
                    base
                } else {
                    rand::thread_rng().gen_range(base..=upper)
                }
            }
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds. Uncapped by default.
    pub max_delay_ms: u64,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: u64::MAX,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Computes the pause after `attempt` for a backoff strategy.
    #[must_use]
    pub fn delay(&self, strategy: BackoffStrategy, attempt: u32) -> Duration {
        let base = strategy.delay_ms(attempt, self.base_delay_ms, self.max_delay_ms);
        let jittered = self
            .jitter
            .apply(base, self.base_delay_ms, self.max_delay_ms);
        Duration::from_millis(jittered)
    }
}

/// Failure class assigned by an [`ErrorClassifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Upstream throttling.
    RateLimited,
    /// The credential was rejected.
    Unauthorized,
    /// A transient connectivity failure.
    Network,
    /// Anything else.
    Other,
}

/// Maps raw transport failures to an [`ErrorClass`].
pub trait ErrorClassifier: Send + Sync {
    /// Classifies one failure.
    fn classify(&self, error: &TransportError) -> ErrorClass;
}

/// Classifier based on the HTTP status and transport error kind.
///
/// 429 is a rate limit, 401 and 403 are credential failures, connectivity
/// failures are network errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpErrorClassifier;

impl ErrorClassifier for HttpErrorClassifier {
    fn classify(&self, error: &TransportError) -> ErrorClass {
        match (error.kind, error.status) {
            (_, Some(429)) => ErrorClass::RateLimited,
            (_, Some(401 | 403)) => ErrorClass::Unauthorized,
            (TransportErrorKind::Network, _) => ErrorClass::Network,
            _ => ErrorClass::Other,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the delay.
    Retryable(Duration),
    /// Throttled; retry after the delay.
    RateLimited(Duration),
    /// Give up with this error.
    Fatal(ApiError),
}

impl RetryDecision {
    /// The pause before the next attempt, if any.
    #[must_use]
    pub fn delay(&self) -> Option<Duration> {
        match self {
            Self::Retryable(d) | Self::RateLimited(d) => Some(*d),
            Self::Fatal(_) => None,
        }
    }
}

/// Bounded retry policy with error classification.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    classifier: Arc<dyn ErrorClassifier>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Creates a policy using the HTTP classifier.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            classifier: Arc::new(HttpErrorClassifier),
        }
    }

    /// Replaces the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Returns the config.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Maximum attempts, never less than one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Decides what follows a failure on the 0-indexed `attempt`.
    #[must_use]
    pub fn classify(&self, error: &TransportError, attempt: u32) -> RetryDecision {
        let last = attempt + 1 >= self.max_attempts();
        match self.classifier.classify(error) {
            ErrorClass::Unauthorized => RetryDecision::Fatal(ApiError::unauthorized()),
            ErrorClass::RateLimited if last => RetryDecision::Fatal(ApiError::quota_exceeded()),
            ErrorClass::RateLimited => {
                RetryDecision::RateLimited(self.config.delay(BackoffStrategy::Exponential, attempt))
            }
            ErrorClass::Network if last => RetryDecision::Fatal(ApiError::network_unavailable()),
            ErrorClass::Network => {
                RetryDecision::Retryable(self.config.delay(BackoffStrategy::Linear, attempt))
            }
            ErrorClass::Other if last => RetryDecision::Fatal(ApiError::upstream(&error.message)),
            ErrorClass::Other => RetryDecision::Retryable(Duration::ZERO),
        }
    }

    /// Classifies a failure as if no attempts remained.
    #[must_use]
    pub fn classify_final(&self, error: &TransportError) -> ApiError {
        match self.classify(error, self.max_attempts() - 1) {
            RetryDecision::Fatal(e) => e,
            // The last attempt always yields a fatal decision.
            RetryDecision::Retryable(_) | RetryDecision::RateLimited(_) => {
                ApiError::upstream(&error.message)
            }
        }
    }
}
