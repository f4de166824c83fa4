//! Trigram embedding provider using character trigram-based content-aware embeddings.

use crate::embeddings::provider::{EmbedError, EmbeddingProvider};
use std::collections::{HashMap, HashSet};

pub const DEFAULT_TRIGRAM_DIMENSIONS: usize = 384;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them",
];

/// Trigram-based embedding provider for local, offline operation.
///
/// Generates deterministic embeddings from character trigrams and word
/// frequencies. Not semantically accurate like a neural model, but the
/// vectors are consistent and content-dependent, which is enough for
/// development and tests without a running model server.
#[derive(Debug)]
pub struct TrigramEmbedder {
    dimensions: usize,
    stop_words: HashSet<&'static str>,
}

impl TrigramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        let mut word_freq: HashMap<&str, u32> = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !self.stop_words.contains(w))
        {
            *word_freq.entry(word).or_insert(0) += 1;
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let hash = window
                    .iter()
                    .fold(0u64, |acc, c| acc.wrapping_mul(37).wrapping_add(*c as u64));
                embedding[(hash as usize) % self.dimensions] += (*freq as f32).sqrt();
            }

            let word_hash = word
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            embedding[(word_hash as usize) % self.dimensions] += *freq as f32;
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramEmbedder {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    #[tokio::test]
    async fn test_trigram_embed_batch() {
        let provider = TrigramEmbedder::new(384);
        let texts = vec![
            "hello world".to_string(),
            "test embedding".to_string(),
            "rust programming".to_string(),
        ];

        let embeddings = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        for embedding in &embeddings {
            assert_eq!(embedding.len(), 384);
            assert!((norm(embedding) - 1.0).abs() < 0.001);
        }
    }

    #[tokio::test]
    async fn test_trigram_deterministic() {
        let provider = TrigramEmbedder::new(128);
        let texts = vec!["deterministic test".to_string()];

        let first = provider.embed_batch(&texts).await.unwrap();
        let second = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_trigram_different_texts() {
        let provider = TrigramEmbedder::new(384);
        let texts = vec!["hello world".to_string(), "goodbye world".to_string()];

        let embeddings = provider.embed_batch(&texts).await.unwrap();
        assert_ne!(embeddings[0], embeddings[1]);
    }

    #[tokio::test]
    async fn test_trigram_empty_text_is_zero_vector() {
        let provider = TrigramEmbedder::new(64);
        let embeddings = provider.embed_batch(&[String::new()]).await.unwrap();
        assert!(embeddings[0].iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_trigram_multibyte_text() {
        let provider = TrigramEmbedder::new(384);
        let text = "Gamedex é um aplicativo 🎮 brasileiro para gerenciar jogos!".to_string();
        let embeddings = provider.embed_batch(&[text]).await.unwrap();
        assert!((norm(&embeddings[0]) - 1.0).abs() < 0.001);
    }
}
