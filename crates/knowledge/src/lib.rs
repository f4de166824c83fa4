//! Retrieval-augmented question answering over a local document collection.
//!
//! Documents are split by the [`Chunker`], embedded through an
//! [`EmbeddingClient`] and stored in a [`VectorIndex`]. Questions are
//! answered by the [`Pipeline`], which retrieves the nearest chunks, builds a
//! `[Source N]`-tagged context and asks the generation client for a cited
//! answer.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod loader;
pub mod progress;
pub mod rag;
pub mod types;

#[cfg(test)]
mod tests;

pub use chunker::{chunk_text, Chunker, DEFAULT_SEPARATORS};
pub use config::{load_config, save_config, RagConfig};
pub use embeddings::{
    create_provider, EmbedError, EmbeddingClient, EmbeddingProvider, RetryPolicy,
};
pub use index::{DistanceMetric, InMemoryIndex, IndexStatus, SqliteIndex, VectorIndex};
pub use loader::load_documents;
pub use progress::{IngestPhase, ProgressCallback, ProgressEvent, ProgressReporter};
pub use rag::{
    AnswerOutcome, AssembledContext, ContextAssembler, FailedBatch, IngestReport, Pipeline,
    PipelineAnswer, PipelineStatus, Retriever, SourceRef,
};
pub use types::{Chunk, Document, DocumentRecord, Metadata, QueryResult};

pub use tokio_util::sync::CancellationToken;
