//! Error types for the Grounded workspace.
//!
//! One enum covers every failure category: configuration, chunking,
//! embedding, vector index, generation, partial ingestion and cancellation,
//! plus the I/O and serialization errors that bubble up from storage.

use thiserror::Error;

/// Unified error type for the Grounded workspace.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic: errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid chunk size / overlap combination, raised before any splitting
    #[error("Invalid chunking configuration: overlap {overlap} must be less than chunk size {chunk_size}")]
    ChunkingConfig { chunk_size: usize, overlap: usize },

    /// Embedding call failed after the retry budget was exhausted
    #[error("Embedding error after {attempts} attempt(s) for batch items {indices:?}: {message}")]
    Embedding {
        message: String,
        /// Positions of the failed items inside the submitted batch
        indices: Vec<usize>,
        attempts: u32,
    },

    /// Vector dimensionality disagrees with the index
    #[error("Index dimension mismatch: expected {expected}, got {actual}")]
    IndexDimensionMismatch { expected: usize, actual: usize },

    /// Any other vector index failure
    #[error("Index error: {0}")]
    Index(String),

    /// Answer generation failed
    #[error("Generation error: {0}")]
    Generation(String),

    /// One or more ingest batches were not committed
    #[error("Partial ingest: {failed_batches} batch(es) failed, {} chunk(s) not indexed", .unindexed_chunk_ids.len())]
    PartialIngest {
        failed_batches: usize,
        unindexed_chunk_ids: Vec<String>,
    },

    /// The caller cancelled the operation
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base errors (loading, storage layout)
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error is a configuration problem that must not be retried.
    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::ChunkingConfig { .. })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ingest_message_counts_chunks() {
        let err = AppError::PartialIngest {
            failed_batches: 1,
            unindexed_chunk_ids: vec!["doc_0".to_string(), "doc_1".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Partial ingest: 1 batch(es) failed, 2 chunk(s) not indexed"
        );
    }

    #[test]
    fn test_config_classification() {
        assert!(AppError::Config("bad".into()).is_config());
        assert!(AppError::ChunkingConfig {
            chunk_size: 10,
            overlap: 10
        }
        .is_config());
        assert!(!AppError::Generation("down".into()).is_config());
    }
}
