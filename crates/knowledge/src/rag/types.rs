//! RAG request/response types.

use crate::index::IndexStatus;
use crate::types::{Metadata, QueryResult};
use chrono::{DateTime, Utc};
use grounded_core::{AppError, AppResult};
use serde::Serialize;

/// Answer returned when retrieval finds nothing.
pub const NO_EVIDENCE_ANSWER: &str =
    "I couldn't find any relevant information to answer that question.";

/// Answer returned when the question could not be embedded.
pub const RETRIEVAL_FAILED_ANSWER: &str =
    "I'm having trouble processing your question right now. Please try again in a moment.";

/// Answer returned when the generation call fails.
pub const GENERATION_FAILED_ANSWER: &str =
    "I'm sorry, I couldn't generate an answer right now. Please try again later.";

/// A distinct source shown to the user. Position `N - 1` in the source list
/// is what `[Source N]` in the answer refers to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub title: String,

    /// Document-level metadata (date, url, speaker, document_id, ...)
    pub metadata: Metadata,
}

/// How a query was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// Generated from retrieved evidence
    Answered,
    /// Nothing retrieved; generation skipped
    NoEvidence,
    /// Stopped by the content-safety chain before retrieval
    Blocked { validator: String },
    /// Embedding the question failed after retries
    RetrievalFailed,
    /// Generation failed; the answer is a fixed fallback
    GenerationFailed,
}

/// Response from a RAG query.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,

    /// Raw hits, for diagnostics
    pub retrieved_chunks: Vec<QueryResult>,

    pub outcome: AnswerOutcome,
}

impl PipelineAnswer {
    pub fn no_evidence() -> Self {
        Self::fallback(NO_EVIDENCE_ANSWER, AnswerOutcome::NoEvidence)
    }

    pub fn retrieval_failed() -> Self {
        Self::fallback(RETRIEVAL_FAILED_ANSWER, AnswerOutcome::RetrievalFailed)
    }

    pub fn blocked(validator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::fallback(
            reason,
            AnswerOutcome::Blocked {
                validator: validator.into(),
            },
        )
    }

    /// Generation fallback; the hits that were retrieved are kept for diagnostics.
    pub fn generation_failed(retrieved_chunks: Vec<QueryResult>) -> Self {
        Self {
            retrieved_chunks,
            ..Self::fallback(GENERATION_FAILED_ANSWER, AnswerOutcome::GenerationFailed)
        }
    }

    fn fallback(answer: impl Into<String>, outcome: AnswerOutcome) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
            retrieved_chunks: Vec::new(),
            outcome,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.outcome == AnswerOutcome::Answered
    }
}

/// A batch that was not committed during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedBatch {
    /// 0-based position among the ingest's batches
    pub batch_index: usize,
    pub chunk_ids: Vec<String>,
    /// Documents with at least one chunk in this batch, in order
    pub document_ids: Vec<String>,
    pub reason: String,
}

/// Outcome of one `ingest` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// When the ingest began (UTC)
    pub started_at: DateTime<Utc>,
    pub documents: usize,
    pub chunks_total: usize,
    pub chunks_indexed: usize,
    pub batches_total: usize,
    pub batches_committed: usize,
    pub failed_batches: Vec<FailedBatch>,
    /// Stale entries removed from documents that shrank
    pub pruned_entries: usize,
    pub duration_secs: f64,
}

impl IngestReport {
    pub fn is_complete(&self) -> bool {
        self.failed_batches.is_empty()
    }

    /// Chunk ids that were not indexed, in batch order.
    pub fn unindexed_chunk_ids(&self) -> Vec<String> {
        self.failed_batches
            .iter()
            .flat_map(|b| b.chunk_ids.iter().cloned())
            .collect()
    }

    /// Documents with at least one unindexed chunk, in order of first failure.
    pub fn unindexed_document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.failed_batches.iter().flat_map(|b| &b.document_ids) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Turn a report with failed batches into [`AppError::PartialIngest`].
    pub fn into_result(self) -> AppResult<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(AppError::PartialIngest {
                failed_batches: self.failed_batches.len(),
                unindexed_chunk_ids: self.unindexed_chunk_ids(),
            })
        }
    }
}

/// Administrative view of a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    #[serde(flatten)]
    pub index: IndexStatus,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k_default: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(index: usize, chunks: &[&str], docs: &[&str]) -> FailedBatch {
        FailedBatch {
            batch_index: index,
            chunk_ids: chunks.iter().map(|s| s.to_string()).collect(),
            document_ids: docs.iter().map(|s| s.to_string()).collect(),
            reason: "embedding service unavailable".to_string(),
        }
    }

    #[test]
    fn test_complete_report_is_ok() {
        let report = IngestReport {
            documents: 1,
            chunks_total: 3,
            chunks_indexed: 3,
            ..Default::default()
        };
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_partial_report_lists_unindexed_chunks() {
        let report = IngestReport {
            failed_batches: vec![
                failed(1, &["a_2", "b_0"], &["a", "b"]),
                failed(3, &["b_4"], &["b"]),
            ],
            ..Default::default()
        };

        assert_eq!(report.unindexed_document_ids(), vec!["a", "b"]);
        match report.into_result() {
            Err(AppError::PartialIngest {
                failed_batches,
                unindexed_chunk_ids,
            }) => {
                assert_eq!(failed_batches, 2);
                assert_eq!(unindexed_chunk_ids, vec!["a_2", "b_0", "b_4"]);
            }
            other => panic!("expected partial ingest, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_answers() {
        let answer = PipelineAnswer::no_evidence();
        assert_eq!(answer.answer, NO_EVIDENCE_ANSWER);
        assert!(answer.sources.is_empty());
        assert!(!answer.is_answered());

        let answer = PipelineAnswer::blocked("length", "Your question is too long.");
        assert_eq!(
            answer.outcome,
            AnswerOutcome::Blocked {
                validator: "length".to_string()
            }
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(AnswerOutcome::NoEvidence).unwrap();
        assert_eq!(json["kind"], "no_evidence");
    }
}
