//! Error types for the crewflow pipeline.
//!
//! Configuration problems (bad graphs, missing credentials) are reported
//! before a run starts. Everything that goes wrong while talking to the model
//! API is an [`ApiError`] and surfaces as a stage-level failure.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Message used when a rate limit persists through every attempt.
pub const QUOTA_EXCEEDED_MESSAGE: &str =
    "API quota exceeded. Please try again later or check your billing.";

/// Message used when the upstream rejects the credential.
pub const UNAUTHORIZED_MESSAGE: &str =
    "Invalid API key. Please check your API key configuration.";

/// Message used when the network stays unreachable through every attempt.
pub const NETWORK_UNAVAILABLE_MESSAGE: &str =
    "Network error. Please check your internet connection.";

/// Message used when no credential is configured.
pub const MISSING_CREDENTIAL_MESSAGE: &str =
    "API key not found. Please configure an API key before running the pipeline.";

/// The main error type for crewflow operations.
#[derive(Debug, Error)]
pub enum CrewflowError {
    /// The pipeline or its environment is misconfigured.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A write-once context entry was written twice.
    #[error("{0}")]
    OutputConflict(#[from] OutputConflictError),

    /// `run` was called while a run is in flight.
    #[error("Pipeline is already running")]
    AlreadyRunning,

    /// `run` was called on a finished pipeline that has not been reset.
    #[error("Pipeline finished with status '{0}'; reset it before running again")]
    NotReset(crate::core::RunStatus),
}

/// Errors detected before any stage runs.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// The stage graph is invalid.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The stage graph contains a cycle.
    #[error("{0}")]
    CycleDetected(#[from] CycleDetectedError),

    /// No usable API credential was supplied.
    #[error("{}", MISSING_CREDENTIAL_MESSAGE)]
    MissingCredential,

    /// A configuration value is out of range or unparsable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CONTRACT-004-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of stages forming the cycle.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "CONTRACT-004-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the dependencies in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when a stage output is recorded twice in one run.
#[derive(Debug, Clone, Error)]
#[error("Output conflict for stage '{stage}': {message}")]
pub struct OutputConflictError {
    /// The stage id.
    pub stage: String,
    /// Additional message.
    pub message: String,
}

impl OutputConflictError {
    /// Creates a new output conflict error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// Classification of a failed model API call after retries are spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// Rate limiting persisted through the last attempt.
    QuotaExceeded,
    /// The credential was rejected.
    Unauthorized,
    /// The network stayed unreachable through the last attempt.
    NetworkUnavailable,
    /// Any other upstream failure.
    UpstreamFailure,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuotaExceeded => write!(f, "quota_exceeded"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::NetworkUnavailable => write!(f, "network_unavailable"),
            Self::UpstreamFailure => write!(f, "upstream_failure"),
        }
    }
}

/// A stage-level failure reported by the retrying client.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    /// What kind of failure this is.
    pub kind: ApiErrorKind,
    /// User-facing message.
    pub message: String,
}

impl ApiError {
    /// Creates an error with an explicit message.
    #[must_use]
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Rate limit never cleared.
    #[must_use]
    pub fn quota_exceeded() -> Self {
        Self::new(ApiErrorKind::QuotaExceeded, QUOTA_EXCEEDED_MESSAGE)
    }

    /// Credential rejected.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(ApiErrorKind::Unauthorized, UNAUTHORIZED_MESSAGE)
    }

    /// Network never came back.
    #[must_use]
    pub fn network_unavailable() -> Self {
        Self::new(ApiErrorKind::NetworkUnavailable, NETWORK_UNAVAILABLE_MESSAGE)
    }

    /// Generic upstream failure, keeping the upstream message.
    #[must_use]
    pub fn upstream(message: impl fmt::Display) -> Self {
        Self::new(
            ApiErrorKind::UpstreamFailure,
            format!("Failed to get response from the model API: {message}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_error_info_creation() {
        let info = ContractErrorInfo::new("TEST-001", "Test error")
            .with_fix_hint("Fix this by doing that")
            .with_context_entry("stage", "my_stage");

        assert_eq!(info.code, "TEST-001");
        assert_eq!(info.summary, "Test error");
        assert_eq!(info.fix_hint, Some("Fix this by doing that".to_string()));
        assert_eq!(info.context.get("stage"), Some(&"my_stage".to_string()));
    }

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> c -> a"));
        assert_eq!(err.error_info.code, "CONTRACT-004-CYCLE");
    }

    #[test]
    fn test_validation_error_code() {
        let err = PipelineValidationError::new("bad")
            .with_error_info(ContractErrorInfo::new("CONTRACT-004-EMPTY", "empty"));
        assert_eq!(err.code(), Some("CONTRACT-004-EMPTY"));
        assert_eq!(PipelineValidationError::new("bad").code(), None);
    }

    #[test]
    fn test_canonical_api_messages() {
        assert_eq!(
            ApiError::network_unavailable().to_string(),
            "Network error. Please check your internet connection."
        );
        assert_eq!(ApiError::quota_exceeded().kind, ApiErrorKind::QuotaExceeded);
        assert_eq!(ApiError::unauthorized().kind, ApiErrorKind::Unauthorized);
        assert_eq!(
            ApiError::upstream("boom").message,
            "Failed to get response from the model API: boom"
        );
    }

    #[test]
    fn test_missing_credential_message() {
        let err: CrewflowError = ConfigurationError::MissingCredential.into();
        assert_eq!(err.to_string(), MISSING_CREDENTIAL_MESSAGE);
    }

    #[test]
    fn test_api_error_kind_serialize() {
        let json = serde_json::to_string(&ApiErrorKind::NetworkUnavailable).unwrap();
        assert_eq!(json, r#""network_unavailable""#);
    }
}
