//! Test doubles for the embedding service and the generation client.

use crate::config::RagConfig;
use crate::embeddings::{EmbedError, EmbeddingProvider};
use crate::index::{DistanceMetric, InMemoryIndex, VectorIndex};
use crate::rag::Pipeline;
use async_trait::async_trait;
use grounded_core::{AppError, AppResult};
use grounded_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Embeds text as keyword counts plus a constant bias dimension, so related
/// texts point in similar directions and no vector is ever zero.
#[derive(Debug)]
pub struct KeywordEmbedder {
    keywords: Vec<String>,
    /// Any text containing this marker fails with a transient error
    fail_marker: Option<String>,
    /// Number of leading calls that fail before calls start succeeding
    flaky_calls: AtomicUsize,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            fail_marker: None,
            flaky_calls: AtomicUsize::new(0),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub fn flaky(self, failures: usize) -> Self {
        self.flaky_calls.store(failures, Ordering::SeqCst);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn dims(&self) -> usize {
        self.keywords.len() + 1
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let mut vector: Vec<f32> = self
            .keywords
            .iter()
            .map(|k| words.iter().filter(|w| **w == k.as_str()).count() as f32)
            .collect();
        vector.push(1.0);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn provider_name(&self) -> &str {
        "keyword"
    }

    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dims())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self
            .flaky_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EmbedError::Timeout("simulated timeout".to_string()));
        }

        if let Some(marker) = &self.fail_marker {
            if texts.iter().any(|t| t.contains(marker.as_str())) {
                return Err(EmbedError::Unavailable("simulated outage".to_string()));
            }
        }

        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Generation client that records every request and answers with a fixed text.
#[derive(Debug, Default)]
pub struct RecordingLlm {
    requests: Mutex<Vec<LlmRequest>>,
}

impl RecordingLlm {
    pub const ANSWER: &'static str = "Start with small scripts [Source 1].";

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for RecordingLlm {
    fn provider_name(&self) -> &str {
        "recording"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        Ok(LlmResponse {
            content: format!("  {}\n", Self::ANSWER),
            model: request.model.clone(),
            usage: LlmUsage::new(10, 5),
            finish_reason: Some("stop".to_string()),
        })
    }
}

/// Generation client that always fails.
#[derive(Debug, Default)]
pub struct FailingLlm;

#[async_trait]
impl LlmClient for FailingLlm {
    fn provider_name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: &LlmRequest) -> AppResult<LlmResponse> {
        Err(AppError::Llm("connection refused".to_string()))
    }
}

pub const KEYWORDS: &[&str] = &["python", "cloud", "learn", "scripts", "servers", "scaling"];

/// Fast-retrying configuration for tests.
pub fn test_config() -> RagConfig {
    RagConfig {
        embedding_dimensions: None,
        embedding_max_retries: 2,
        embedding_initial_backoff_ms: 1,
        embedding_max_backoff_ms: 2,
        ..RagConfig::default()
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub embedder: Arc<KeywordEmbedder>,
    pub llm: Arc<RecordingLlm>,
    pub index: Arc<InMemoryIndex>,
}

pub fn harness(config: RagConfig, embedder: KeywordEmbedder) -> Harness {
    let embedder = Arc::new(embedder);
    let llm = Arc::new(RecordingLlm::default());
    let index = Arc::new(InMemoryIndex::new(
        config.collection.clone(),
        DistanceMetric::Cosine,
    ));

    let pipeline = Pipeline::new(
        config,
        embedder.clone(),
        index.clone() as Arc<dyn VectorIndex>,
        llm.clone(),
    )
    .unwrap();

    Harness {
        pipeline,
        embedder,
        llm,
        index,
    }
}
