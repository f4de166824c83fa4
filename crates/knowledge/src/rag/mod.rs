//! RAG (Retrieval-Augmented Generation) answering system.
//!
//! Retrieval, context assembly and the ingest/query pipeline that ties them
//! to the embedding service, the vector index and the generation client.

pub mod context;
pub mod pipeline;
pub mod retriever;
pub mod types;

pub use context::{AssembledContext, ContextAssembler};
pub use pipeline::Pipeline;
pub use retriever::Retriever;
pub use types::{
    AnswerOutcome, FailedBatch, IngestReport, PipelineAnswer, PipelineStatus, SourceRef,
    GENERATION_FAILED_ANSWER, NO_EVIDENCE_ANSWER, RETRIEVAL_FAILED_ANSWER,
};
