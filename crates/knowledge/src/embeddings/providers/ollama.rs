//! Ollama Embedding Provider
//!
//! Calls Ollama's batch endpoint (`/api/embed`) with models like
//! nomic-embed-text. Failures are classified into [`EmbedError`] so the
//! client's retry policy can decide what is transient; this provider never
//! retries on its own.

use crate::embeddings::provider::{EmbedError, EmbeddingProvider};
use async_trait::async_trait;
use grounded_core::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

const EMBED_ENDPOINT: &str = "/api/embed";

/// Ollama embedding provider using the local HTTP API
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaEmbedder {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::Config(format!("Failed to create HTTP client for Ollama: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}{}", self.base_url, EMBED_ENDPOINT);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        debug!("Sending embedding request to {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, retry_after));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(format!("Failed to parse Ollama response: {}", e)))?;

        if let Some(expected) = self.dimensions {
            if let Some(actual) = body.embeddings.iter().map(Vec::len).find(|d| *d != expected) {
                return Err(EmbedError::InvalidResponse(format!(
                    "model '{}' returned {} dimensions, expected {}",
                    self.model, actual, expected
                )));
            }
        }

        debug!("Received {} embeddings", body.embeddings.len());
        Ok(body.embeddings)
    }
}

fn classify_transport_error(err: reqwest::Error) -> EmbedError {
    if err.is_timeout() {
        EmbedError::Timeout(err.to_string())
    } else if err.is_connect() {
        EmbedError::Unavailable(format!("Ollama not reachable: {}", err))
    } else {
        EmbedError::Network(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str, retry_after: Option<Duration>) -> EmbedError {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());
    let message = format!("Ollama API error ({}): {}", status, detail);

    match status {
        StatusCode::TOO_MANY_REQUESTS => EmbedError::RateLimited {
            message,
            retry_after,
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => EmbedError::Timeout(message),
        s if s.is_server_error() => EmbedError::Unavailable(message),
        _ => EmbedError::Rejected(message),
    }
}

/// Parse a `Retry-After` header given in seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
