//! The network-facing seam of the client.

use crate::streaming::FragmentStream;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Coarse origin of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The server answered with a non-success HTTP status.
    Http,
    /// The request never completed (connect, DNS, timeout, reset).
    Network,
    /// Anything else, e.g. an unparsable body.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A raw failure reported by a [`PromptTransport`].
///
/// The retry policy turns these into [`ApiError`](crate::errors::ApiError)s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Failure origin.
    pub kind: TransportErrorKind,
    /// HTTP status, when the server answered.
    pub status: Option<u16>,
    /// Upstream message.
    pub message: String,
}

impl TransportError {
    /// A non-success HTTP response.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Http,
            status: Some(status),
            message: message.into(),
        }
    }

    /// A connectivity failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    /// Any other failure.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Other,
            status: None,
            message: message.into(),
        }
    }
}

/// Sends one prompt to the model and returns its response fragments.
///
/// Failures that happen before the first fragment are returned as `Err` and
/// may be retried. Failures after that arrive as an `Err` item in the stream.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromptTransport: Send + Sync {
    /// Opens a response stream for `prompt`.
    async fn send_prompt(&self, prompt: &str) -> Result<FragmentStream, TransportError>;
}

#[async_trait]
impl<T: PromptTransport + ?Sized> PromptTransport for Arc<T> {
    async fn send_prompt(&self, prompt: &str) -> Result<FragmentStream, TransportError> {
        (**self).send_prompt(prompt).await
    }
}
