//! Model API client.
//!
//! This module provides:
//! - The [`PromptTransport`] seam over the network
//! - The retry policy and error classification
//! - [`RetryingApiClient`], which combines the two
//! - The Gemini HTTP transport (feature `gemini`)

#[cfg(feature = "gemini")]
mod gemini;
mod retry;
mod retrying;
mod transport;

#[cfg(feature = "gemini")]
pub use gemini::GeminiTransport;
pub use retry::{
    BackoffStrategy, ErrorClass, ErrorClassifier, HttpErrorClassifier, JitterStrategy,
    RetryConfig, RetryDecision, RetryPolicy,
};
pub use retrying::{Completion, Invocation, RetryingApiClient};
pub use transport::{PromptTransport, TransportError, TransportErrorKind};
