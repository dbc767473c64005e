//! Gemini generative-language API transport.

use super::transport::{PromptTransport, TransportError};
use crate::config::{ApiCredential, CrewflowConfig, GenerationConfig};
use crate::errors::ConfigurationError;
use crate::streaming::{fragment_channel, fragments_from, FragmentSender, FragmentStream};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use tracing::debug;

const FRAGMENT_BUFFER: usize = 64;

/// [`PromptTransport`] backed by the Gemini REST API.
///
/// In streaming mode the response is read as server-sent events and every
/// event's text becomes one fragment. Otherwise the whole response arrives
/// as a single fragment.
#[derive(Debug, Clone)]
pub struct GeminiTransport {
    client: reqwest::Client,
    api_key: ApiCredential,
    base_url: String,
    model: String,
    generation: GenerationConfig,
    streaming: bool,
}

impl GeminiTransport {
    /// Creates a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` without a usable key, or `Invalid` if the
    /// HTTP client cannot be built.
    pub fn new(config: &CrewflowConfig) -> Result<Self, ConfigurationError> {
        let api_key = config.credential()?.clone();
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ConfigurationError::Invalid(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            generation: config.generation.clone(),
            streaming: config.streaming,
        })
    }

    fn url(&self) -> String {
        if self.streaming {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, self.model
            )
        } else {
            format!("{}/models/{}:generateContent", self.base_url, self.model)
        }
    }

    /// The credential travels in a header so it never appears in a URL.
    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url())
            .header("content-type", "application/json")
            .header("x-goog-api-key", self.api_key.expose())
            .json(&self.build_request_body(prompt))
    }

    fn build_request_body(&self, prompt: &str) -> serde_json::Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": self.generation.temperature,
                "topP": self.generation.top_p,
                "topK": self.generation.top_k,
                "maxOutputTokens": self.generation.max_output_tokens,
            }
        })
    }
}

#[async_trait]
impl PromptTransport for GeminiTransport {
    async fn send_prompt(&self, prompt: &str) -> Result<FragmentStream, TransportError> {
        let resp = self
            .request(prompt)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::http(status.as_u16(), extract_error_message(&body)));
        }

        if !self.streaming {
            let body = resp.text().await.map_err(map_reqwest_error)?;
            let value: serde_json::Value = serde_json::from_str(&body)
                .map_err(|e| TransportError::other(format!("Failed to parse response JSON: {e}")))?;
            let text = extract_text(&value)?;
            return Ok(fragments_from(vec![text]));
        }

        let (tx, fragments) = fragment_channel(FRAGMENT_BUFFER);
        tokio::spawn(pump_events(resp, tx));
        Ok(fragments)
    }
}

/// Forwards SSE events from the response body into the fragment channel.
async fn pump_events(resp: reqwest::Response, tx: FragmentSender) {
    let mut body = resp.bytes_stream();
    let mut lines = SseLineBuffer::default();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tx.fail(map_reqwest_error(e)).await;
                return;
            }
        };
        for line in lines.push(&chunk) {
            if !forward_line(&line, &tx).await {
                return;
            }
        }
    }
    if let Some(line) = lines.flush() {
        forward_line(&line, &tx).await;
    }
}

/// Returns false when the consumer is gone or the stream failed.
async fn forward_line(line: &str, tx: &FragmentSender) -> bool {
    match parse_sse_data(line) {
        None => true,
        Some(Ok(text)) if text.is_empty() => true,
        Some(Ok(text)) => {
            let delivered = tx.send(text).await;
            if !delivered {
                debug!("Fragment consumer dropped; stopping response stream");
            }
            delivered
        }
        Some(Err(error)) => {
            tx.fail(error).await;
            false
        }
    }
}

/// Splits a byte stream into complete lines.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            lines.push(text.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).trim_end().to_string();
        self.pending.clear();
        Some(text)
    }
}

/// Parses one SSE line. Non-data lines yield `None`.
fn parse_sse_data(line: &str) -> Option<Result<String, TransportError>> {
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(
        serde_json::from_str::<serde_json::Value>(payload)
            .map_err(|e| TransportError::other(format!("Failed to parse stream event: {e}")))
            .and_then(|value| extract_text(&value)),
    )
}

/// Concatenates the text parts of the first candidate.
fn extract_text(value: &serde_json::Value) -> Result<String, TransportError> {
    if let Some(message) = value["error"]["message"].as_str() {
        return Err(TransportError::other(message));
    }
    let Some(candidate) = value["candidates"].as_array().and_then(|c| c.first()) else {
        // Trailing events may carry only usage metadata.
        return Ok(String::new());
    };
    let text = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default();
    Ok(text)
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    let e = e.without_url();
    if let Some(status) = e.status() {
        TransportError::http(status.as_u16(), e.to_string())
    } else if e.is_timeout() || e.is_connect() || e.is_request() {
        TransportError::network(e.to_string())
    } else {
        TransportError::other(e.to_string())
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}
