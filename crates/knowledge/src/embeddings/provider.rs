//! Embedding provider trait, provider errors and factory.

use crate::config::RagConfig;
use grounded_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single provider call, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbedError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl EmbedError {
    /// Whether the failure is transient and the call may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbedError::Timeout(_)
                | EmbedError::RateLimited { .. }
                | EmbedError::Unavailable(_)
                | EmbedError::Network(_)
        )
    }

    /// Server-suggested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            EmbedError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Trait for embedding providers.
///
/// Providers are stateless between calls and do not retry; retries are
/// applied once, by [`super::EmbeddingClient`].
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "ollama", "trigram")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Expected embedding dimensions, when known up front
    fn dimensions(&self) -> Option<usize>;

    /// Generate one embedding per text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

/// Output sizes of common Ollama embedding models.
const KNOWN_OLLAMA_DIMENSIONS: &[(&str, usize)] = &[
    ("nomic-embed-text", 768),
    ("mxbai-embed-large", 1024),
    ("all-minilm", 384),
    ("snowflake-arctic-embed", 1024),
];

/// Vector size of an Ollama model, ignoring its `:tag`.
pub fn known_ollama_dimensions(model: &str) -> Option<usize> {
    let name = model.split(':').next().unwrap_or(model);
    KNOWN_OLLAMA_DIMENSIONS
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, dims)| *dims)
}

/// Create an embedding provider based on collection configuration.
pub fn create_provider(config: &RagConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match config.embedding_provider.as_str() {
        "ollama" => {
            let options = config.client_options();
            let provider = super::providers::ollama::OllamaEmbedder::new(
                options.ollama_url(),
                &config.embedding_model,
                config
                    .embedding_dimensions
                    .or_else(|| known_ollama_dimensions(&config.embedding_model)),
                options.timeout(),
            )?;
            Ok(Arc::new(provider))
        }

        "trigram" => {
            let dimensions = config
                .embedding_dimensions
                .unwrap_or(super::providers::trigram::DEFAULT_TRIGRAM_DIMENSIONS);
            Ok(Arc::new(super::providers::trigram::TrigramEmbedder::new(
                dimensions,
            )))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, trigram",
            config.embedding_provider
        ))),
    }
}
