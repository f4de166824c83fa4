//! In-process vector index with no persistence.

use super::{DistanceMetric, IndexSnapshot, VectorIndex};
use crate::types::{Metadata, QueryResult};
use grounded_core::AppResult;
use std::sync::{Arc, Mutex, RwLock};

/// Exact-search index held entirely in memory.
///
/// Writers are serialized; readers work on the snapshot current when
/// their query started.
#[derive(Debug)]
pub struct InMemoryIndex {
    collection: String,
    metric: DistanceMetric,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
}

impl InMemoryIndex {
    pub fn new(collection: impl Into<String>, metric: DistanceMetric) -> Self {
        Self {
            collection: collection.into(),
            metric,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::new())),
            writer: Mutex::new(()),
        }
    }

    fn current(&self) -> Arc<IndexSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn publish(&self, next: IndexSnapshot) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
    }

    /// Mutate the published snapshot; it is copied only if a reader holds it.
    fn update<R>(&self, f: impl FnOnce(&mut IndexSnapshot) -> R) -> R {
        let mut slot = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        f(Arc::make_mut(&mut slot))
    }
}

impl VectorIndex for InMemoryIndex {
    fn collection(&self) -> &str {
        &self.collection
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn dimension(&self) -> Option<usize> {
        self.current().dimension()
    }

    fn add(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
        metadatas: &[Metadata],
    ) -> AppResult<()> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let written = self.current().prepare_add(ids, vectors, texts, metadatas)?;
        let entries = written.len();
        if entries > 0 {
            self.update(|snapshot| snapshot.apply(written));
        }
        tracing::debug!(entries, collection = %self.collection, "Added entries");
        Ok(())
    }

    fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<QueryResult>> {
        self.current().query(self.metric, vector, k)
    }

    fn count(&self) -> usize {
        self.current().len()
    }

    fn delete(&self, ids: &[String]) -> AppResult<usize> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if self.current().count_present(ids) == 0 {
            return Ok(0);
        }
        Ok(self.update(|snapshot| snapshot.remove(ids)))
    }

    fn ids_for_document(&self, document_id: &str) -> Vec<String> {
        self.current().ids_for_document(document_id)
    }

    fn reset(&self) -> AppResult<()> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        self.publish(IndexSnapshot::new());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn batch(prefix: &str, n: usize) -> (Vec<String>, Vec<Vec<f32>>, Vec<String>, Vec<Metadata>) {
        let ids = (0..n).map(|i| format!("{}_{}", prefix, i)).collect();
        let vectors = (0..n).map(|i| vec![1.0, i as f32]).collect();
        let texts = (0..n).map(|i| format!("chunk {}", i)).collect();
        let metas = (0..n).map(|_| Metadata::new()).collect();
        (ids, vectors, texts, metas)
    }

    #[test]
    fn test_add_query_delete_reset() {
        let index = InMemoryIndex::new("docs", DistanceMetric::Cosine);
        let (ids, vectors, texts, metas) = batch("d", 3);
        index.add(&ids, &vectors, &texts, &metas).unwrap();

        assert_eq!(index.count(), 3);
        assert_eq!(index.dimension(), Some(2));

        let hits = index.query(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].chunk_id, "d_0");

        assert_eq!(index.delete(&["d_0".to_string()]).unwrap(), 1);
        assert_eq!(index.count(), 2);

        index.reset().unwrap();
        assert_eq!(index.count(), 0);
        assert_eq!(index.dimension(), None);

        let status = index.status();
        assert_eq!(status.collection, "docs");
        assert_eq!(status.entry_count, 0);
    }

    #[test]
    fn test_readers_never_see_partial_batches() {
        let index = Arc::new(InMemoryIndex::new("docs", DistanceMetric::Cosine));
        let batch_size = 50;

        let writer = {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for round in 0..20 {
                    let (ids, vectors, texts, metas) = batch(&format!("r{}", round), batch_size);
                    index.add(&ids, &vectors, &texts, &metas).unwrap();
                }
            })
        };

        for _ in 0..200 {
            assert_eq!(index.count() % batch_size, 0);
        }

        writer.join().unwrap();
        assert_eq!(index.count(), 20 * batch_size);
    }

    #[test]
    fn test_held_snapshot_is_stable_across_writes() {
        let index = InMemoryIndex::new("docs", DistanceMetric::Cosine);
        let (ids, vectors, texts, metas) = batch("a", 3);
        index.add(&ids, &vectors, &texts, &metas).unwrap();

        let held = index.current();
        let (ids, vectors, texts, metas) = batch("b", 3);
        index.add(&ids, &vectors, &texts, &metas).unwrap();
        assert_eq!(index.delete(&["a_0".to_string()]).unwrap(), 1);

        assert_eq!(held.len(), 3);
        assert!(held.get("a_0").is_some());
        assert_eq!(index.count(), 5);

        drop(held);
        let before = Arc::as_ptr(&index.current());
        let (ids, vectors, texts, metas) = batch("c", 2);
        index.add(&ids, &vectors, &texts, &metas).unwrap();
        assert_eq!(Arc::as_ptr(&index.current()), before);
        assert_eq!(index.count(), 7);
    }
}
