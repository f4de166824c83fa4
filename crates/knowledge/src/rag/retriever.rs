//! Query-time retrieval: embed the question, then search the index.

use crate::embeddings::EmbeddingClient;
use crate::index::VectorIndex;
use crate::types::QueryResult;
use grounded_core::AppResult;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Composes the embedding client and the vector index.
///
/// Errors from either side propagate unchanged; the only retries are the
/// ones the embedding client already performs.
#[derive(Clone)]
pub struct Retriever {
    embedder: EmbeddingClient,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: EmbeddingClient, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &EmbeddingClient {
        &self.embedder
    }

    /// Up to `k` chunks nearest to `query`, ascending by distance.
    ///
    /// An empty index or `k == 0` returns no results without calling the
    /// embedding service.
    #[instrument(skip(self, query), fields(collection = %self.index.collection()))]
    pub async fn search(&self, query: &str, k: usize) -> AppResult<Vec<QueryResult>> {
        if k == 0 || self.index.count() == 0 {
            debug!("Nothing to search");
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_query(query).await?;
        let results = self.index.query(&vector, k)?;

        debug!(
            hits = results.len(),
            best = results.first().map(|r| r.distance),
            "Retrieved chunks"
        );
        Ok(results)
    }
}
