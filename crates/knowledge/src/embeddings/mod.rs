//! Embedding client with batching limits and a single retry policy.
//!
//! Providers only classify failures; [`EmbeddingClient`] is the one place
//! where transient failures are retried with exponential backoff.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbedError, EmbeddingProvider};

use crate::config::RagConfig;
use grounded_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Bounded exponential backoff for transient embedding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
        }
    }

    /// Fail on the first error.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (0-based). A server hint replaces
    /// the exponential delay; both are capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exponential = self
            .initial_backoff
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.max_backoff);
        hint.unwrap_or(exponential).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(5))
    }
}

/// Turns texts into vectors through a provider, enforcing the batch limit
/// and retrying transient failures.
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        retry: RetryPolicy,
    ) -> AppResult<Self> {
        if batch_size == 0 {
            return Err(AppError::Config(
                "embedding batch size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            provider,
            batch_size,
            retry,
        })
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> AppResult<Self> {
        Self::new(provider, config.embedding_batch_size, config.retry_policy())
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embed up to `batch_size` texts, one vector per text in input order.
    ///
    /// Oversized batches are a configuration error and are never sent.
    /// After the retry budget is spent the call fails with
    /// [`AppError::Embedding`] naming every position of the batch.
    #[instrument(skip(self, texts), fields(batch = texts.len(), model = %self.provider.model_name()))]
    pub async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.len() > self.batch_size {
            return Err(AppError::Config(format!(
                "embedding batch of {} texts exceeds the configured batch size {}",
                texts.len(),
                self.batch_size
            )));
        }

        let mut attempt = 0u32;
        loop {
            let outcome = match self.provider.embed_batch(texts).await {
                Ok(vectors) => check_vectors(texts.len(), vectors),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(vectors) => {
                    debug!(attempts = attempt + 1, "Embedded batch");
                    return Ok(vectors);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff_for(attempt, err.retry_after());
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Embedding request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(AppError::Embedding {
                        message: err.to_string(),
                        indices: (0..texts.len()).collect(),
                        attempts: attempt + 1,
                    });
                }
            }
        }
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| AppError::Embedding {
            message: "no embedding returned for query".to_string(),
            indices: vec![0],
            attempts: 1,
        })
    }
}

fn check_vectors(expected: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>, EmbedError> {
    if vectors.len() != expected {
        return Err(EmbedError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }

    if let Some(first) = vectors.first() {
        let dim = first.len();
        if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
            return Err(EmbedError::InvalidResponse(
                "embeddings in one batch have inconsistent or zero dimensionality".to_string(),
            ));
        }
    }

    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Scripted {
        failures: AtomicU32,
        error: EmbedError,
        calls: AtomicU32,
        short: bool,
    }

    impl Scripted {
        fn failing(times: u32, error: EmbedError) -> Self {
            Self {
                failures: AtomicU32::new(times),
                error,
                calls: AtomicU32::new(0),
                short: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for Scripted {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model_name(&self) -> &str {
            "scripted-v1"
        }

        fn dimensions(&self) -> Option<usize> {
            Some(2)
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(self.error.clone());
            }
            let n = if self.short { texts.len() - 1 } else { texts.len() };
            Ok((0..n).map(|i| vec![i as f32, 1.0]).collect())
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(2))
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(0, None), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(1, None), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(2, None), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(3, None), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(40, None), Duration::from_millis(500));
        assert_eq!(
            policy.backoff_for(0, Some(Duration::from_secs(60))),
            Duration::from_millis(500)
        );
    }

    #[tokio::test]
    async fn test_empty_batch_skips_provider() {
        let provider = Arc::new(Scripted::failing(0, EmbedError::Timeout("t".into())));
        let client = EmbeddingClient::new(provider.clone(), 4, fast_retry(1)).unwrap();
        assert!(client.embed(&[]).await.unwrap().is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_config_error() {
        let provider = Arc::new(Scripted::failing(0, EmbedError::Timeout("t".into())));
        let client = EmbeddingClient::new(provider.clone(), 2, fast_retry(1)).unwrap();

        let err = client.embed(&texts(3)).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let provider = Arc::new(Scripted::failing(2, EmbedError::Unavailable("503".into())));
        let client = EmbeddingClient::new(provider.clone(), 4, fast_retry(3)).unwrap();

        let vectors = client.embed(&texts(3)).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_batch_indices() {
        let provider = Arc::new(Scripted::failing(10, EmbedError::Timeout("slow".into())));
        let client = EmbeddingClient::new(provider.clone(), 4, fast_retry(2)).unwrap();

        match client.embed(&texts(3)).await {
            Err(AppError::Embedding {
                indices, attempts, ..
            }) => {
                assert_eq!(indices, vec![0, 1, 2]);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected embedding error, got {:?}", other.map(|v| v.len())),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let provider = Arc::new(Scripted::failing(1, EmbedError::Rejected("no model".into())));
        let client = EmbeddingClient::new(provider.clone(), 4, fast_retry(3)).unwrap();

        let err = client.embed(&texts(1)).await.unwrap_err();
        assert!(matches!(err, AppError::Embedding { attempts: 1, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_vector_count_is_invalid_response() {
        let provider = Arc::new(Scripted {
            short: true,
            ..Scripted::failing(0, EmbedError::Timeout("t".into()))
        });
        let client = EmbeddingClient::new(provider, 4, fast_retry(3)).unwrap();

        let err = client.embed(&texts(2)).await.unwrap_err();
        assert!(err.to_string().contains("expected 2 embeddings, got 1"));
    }

    #[tokio::test]
    async fn test_embed_query() {
        let provider = Arc::new(Scripted::failing(0, EmbedError::Timeout("t".into())));
        let client = EmbeddingClient::new(provider, 1, RetryPolicy::none()).unwrap();
        assert_eq!(client.embed_query("hello").await.unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let provider = Arc::new(Scripted::failing(0, EmbedError::Timeout("t".into())));
        assert!(EmbeddingClient::new(provider, 0, RetryPolicy::none()).is_err());
    }
}
