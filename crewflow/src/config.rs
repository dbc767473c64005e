//! Configuration for the crew pipeline and its model client.
//!
//! Everything is passed in explicitly. Nothing here reads environment
//! variables or files; the host decides where settings come from.

use crate::client::RetryConfig;
use crate::errors::ConfigurationError;
use crate::observability::LoggingConfig;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Value shipped in sample settings files; never a real key.
const PLACEHOLDER_KEYS: &[&str] = &["your_gemini_api_key_here", "your_api_key_here"];

/// An API key for the model service.
///
/// `Debug` and `Display` never print the key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential(String);

impl ApiCredential {
    /// Wraps a key, trimming surrounding whitespace.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into().trim().to_string())
    }

    /// Returns the raw key for building requests.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if the key is empty or a known placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.is_empty() || PLACEHOLDER_KEYS.contains(&self.0.as_str())
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiCredential(***)")
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl Serialize for ApiCredential {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ApiCredential {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Top-k sampling cutoff.
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Response length cap in tokens.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.8
}

fn default_top_k() -> u32 {
    40
}

fn default_max_output_tokens() -> u32 {
    8192
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewflowConfig {
    /// API key for the model service.
    #[serde(default)]
    pub api_key: Option<ApiCredential>,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of the generative-language API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sampling parameters.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Retry behavior.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Whether to stream responses fragment by fragment.
    #[serde(default = "default_streaming")]
    pub streaming: bool,
    /// Pause between wavefronts in milliseconds.
    #[serde(default)]
    pub stage_delay_ms: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_streaming() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for CrewflowConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            generation: GenerationConfig::default(),
            retry: RetryConfig::default(),
            streaming: default_streaming(),
            stage_delay_ms: 0,
            request_timeout_secs: default_request_timeout(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CrewflowConfig {
    /// Creates a configuration with defaults and no credential.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::Invalid` for malformed JSON or values
    /// rejected by [`CrewflowConfig::validate`].
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiCredential::new(key));
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the retry config.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enables or disables streaming.
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Sets the pause between wavefronts.
    #[must_use]
    pub fn with_stage_delay_ms(mut self, delay: u64) -> Self {
        self.stage_delay_ms = delay;
        self
    }

    /// Pause between wavefronts.
    #[must_use]
    pub fn stage_delay(&self) -> Duration {
        Duration::from_millis(self.stage_delay_ms)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the credential if it is present and not a placeholder.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::MissingCredential` otherwise.
    pub fn credential(&self) -> Result<&ApiCredential, ConfigurationError> {
        match &self.api_key {
            Some(key) if !key.is_placeholder() => Ok(key),
            _ => Err(ConfigurationError::MissingCredential),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::Invalid` describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ConfigurationError::Invalid(
                "retry.max_delay_ms must not be below retry.base_delay_ms".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigurationError::Invalid("model must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigurationError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
