//! Immutable view of index contents shared by both backends.
//!
//! Readers hold an `Arc` to the snapshot they started with. Writers apply a
//! validated batch under the write lock through `Arc::make_mut`, which only
//! copies the snapshot while a reader still holds it, so a query never sees
//! half a batch and an uncontended batch costs only its own entries.

use super::DistanceMetric;
use crate::types::{Metadata, QueryResult};
use grounded_core::{AppError, AppResult};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One stored vector with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: String,
    /// Insertion sequence; ties in distance resolve by this
    pub seq: u64,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    entries: Vec<Arc<IndexEntry>>,
    positions: HashMap<String, usize>,
    dimension: Option<usize>,
    next_seq: u64,
}

impl IndexSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries. Entries are reordered by `seq`.
    pub fn from_entries(mut entries: Vec<IndexEntry>, dimension: Option<usize>) -> Self {
        entries.sort_by_key(|e| e.seq);
        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(0);
        let dimension = dimension.or_else(|| entries.first().map(|e| e.vector.len()));
        let entries: Vec<Arc<IndexEntry>> = entries.into_iter().map(Arc::new).collect();
        let positions = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        Self {
            entries,
            positions,
            dimension,
            next_seq,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter().map(|e| e.as_ref())
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.positions.get(id).map(|&i| self.entries[i].as_ref())
    }

    /// Validate a batch and return the entries it would write, with
    /// sequence numbers assigned. The snapshot itself is untouched, so a
    /// caller can persist the entries before publishing them.
    ///
    /// Fails without side effects if any vector is malformed.
    pub fn prepare_add(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
        metadatas: &[Metadata],
    ) -> AppResult<Vec<IndexEntry>> {
        if ids.len() != vectors.len() || ids.len() != texts.len() || ids.len() != metadatas.len() {
            return Err(AppError::Index(format!(
                "batch length mismatch: {} ids, {} vectors, {} texts, {} metadatas",
                ids.len(),
                vectors.len(),
                texts.len(),
                metadatas.len()
            )));
        }

        let Some(first) = vectors.first() else {
            return Ok(Vec::new());
        };

        let expected = self.dimension.unwrap_or(first.len());
        for (id, vector) in ids.iter().zip(vectors) {
            if vector.is_empty() {
                return Err(AppError::Index(format!("empty vector for entry '{}'", id)));
            }
            if vector.len() != expected {
                return Err(AppError::IndexDimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(AppError::Index(format!(
                    "non-finite value in vector for entry '{}'",
                    id
                )));
            }
        }

        let mut next_seq = self.next_seq;
        let mut fresh: HashMap<&str, u64> = HashMap::new();
        let mut written = Vec::with_capacity(ids.len());

        for (((id, vector), text), metadata) in ids.iter().zip(vectors).zip(texts).zip(metadatas) {
            let seq = match self.positions.get(id) {
                Some(&pos) => self.entries[pos].seq,
                None => *fresh.entry(id.as_str()).or_insert_with(|| {
                    next_seq += 1;
                    next_seq - 1
                }),
            };

            written.push(IndexEntry {
                id: id.clone(),
                seq,
                vector: vector.clone(),
                text: text.clone(),
                metadata: metadata.clone(),
            });
        }

        Ok(written)
    }

    /// Apply entries produced by [`prepare_add`](Self::prepare_add) in place.
    ///
    /// Existing ids keep their position; new ids are appended.
    pub fn apply(&mut self, written: Vec<IndexEntry>) {
        for entry in written {
            self.dimension.get_or_insert(entry.vector.len());
            self.next_seq = self.next_seq.max(entry.seq + 1);

            match self.positions.get(&entry.id).copied() {
                Some(pos) => self.entries[pos] = Arc::new(entry),
                None => {
                    self.positions.insert(entry.id.clone(), self.entries.len());
                    self.entries.push(Arc::new(entry));
                }
            }
        }
    }

    /// How many of `ids` are present.
    pub fn count_present(&self, ids: &[String]) -> usize {
        let unique: HashSet<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| self.positions.contains_key(*id))
            .collect();
        unique.len()
    }

    /// Drop the given ids in place and return how many were present.
    pub fn remove(&mut self, ids: &[String]) -> usize {
        let doomed: HashSet<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| self.positions.contains_key(*id))
            .collect();

        if doomed.is_empty() {
            return 0;
        }

        self.entries.retain(|e| !doomed.contains(e.id.as_str()));
        self.positions = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        doomed.len()
    }

    /// Exact k-nearest-neighbour search.
    pub fn query(
        &self,
        metric: DistanceMetric,
        vector: &[f32],
        k: usize,
    ) -> AppResult<Vec<QueryResult>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(AppError::IndexDimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (metric.distance(vector, &e.vector), e.as_ref()))
            .collect();

        scored.sort_by(|(da, a), (db, b)| match da.total_cmp(db) {
            Ordering::Equal => a.seq.cmp(&b.seq),
            other => other,
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, entry)| QueryResult {
                chunk_id: entry.id.clone(),
                text: entry.text.clone(),
                metadata: entry.metadata.clone(),
                distance,
            })
            .collect())
    }

    pub fn ids_for_document(&self, document_id: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| {
                e.metadata
                    .get("document_id")
                    .and_then(|v| v.as_str())
                    .is_some_and(|d| d == document_id)
            })
            .map(|e| e.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(doc: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("document_id".into(), doc.into());
        m
    }

    fn add(
        snapshot: &IndexSnapshot,
        ids: &[&str],
        vectors: Vec<Vec<f32>>,
    ) -> AppResult<IndexSnapshot> {
        let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        let texts: Vec<String> = ids.iter().map(|id| format!("text of {}", id)).collect();
        let metas: Vec<Metadata> = ids.iter().map(|_| meta("doc")).collect();
        let written = snapshot.prepare_add(&ids, &vectors, &texts, &metas)?;
        let mut next = snapshot.clone();
        next.apply(written);
        Ok(next)
    }

    #[test]
    fn test_first_batch_fixes_dimension() {
        let s = add(&IndexSnapshot::new(), &["a"], vec![vec![1.0, 0.0, 0.0]]).unwrap();
        assert_eq!(s.dimension(), Some(3));

        let err = add(&s, &["b"], vec![vec![1.0, 0.0]]).unwrap_err();
        assert!(matches!(
            err,
            AppError::IndexDimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_bad_batch_is_rejected_whole() {
        let s = add(&IndexSnapshot::new(), &["a"], vec![vec![1.0, 0.0]]).unwrap();

        let err = add(&s, &["b", "c"], vec![vec![0.0, 1.0], vec![f32::NAN, 1.0]]).unwrap_err();
        assert!(matches!(err, AppError::Index(_)));
        assert_eq!(s.len(), 1);
        assert!(s.get("b").is_none());
    }

    #[test]
    fn test_length_mismatch() {
        let ids = vec!["a".to_string()];
        let err = IndexSnapshot::new()
            .prepare_add(&ids, &[], &[], &[])
            .unwrap_err();
        assert!(err.to_string().contains("batch length mismatch"));
    }

    #[test]
    fn test_upsert_keeps_position() {
        let s = add(
            &IndexSnapshot::new(),
            &["a", "b"],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();
        let s = add(&s, &["a"], vec![vec![0.5, 0.5]]).unwrap();

        assert_eq!(s.len(), 2);
        let a = s.get("a").unwrap();
        assert_eq!(a.seq, 0);
        assert_eq!(a.vector, vec![0.5, 0.5]);
    }

    #[test]
    fn test_query_orders_by_distance_then_insertion() {
        let s = add(
            &IndexSnapshot::new(),
            &["far", "tie1", "tie2", "near"],
            vec![
                vec![-1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.0, -1.0],
                vec![1.0, 0.1],
            ],
        )
        .unwrap();

        let hits = s.query(DistanceMetric::Cosine, &[1.0, 0.0], 10).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "tie1", "tie2", "far"]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

        let top = s.query(DistanceMetric::Cosine, &[1.0, 0.0], 2).unwrap();
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_query_edge_cases() {
        let empty = IndexSnapshot::new();
        assert!(empty.query(DistanceMetric::Cosine, &[1.0], 5).unwrap().is_empty());

        let s = add(&empty, &["a"], vec![vec![1.0, 0.0]]).unwrap();
        assert!(s.query(DistanceMetric::Cosine, &[1.0, 0.0], 0).unwrap().is_empty());
        assert!(s.query(DistanceMetric::Cosine, &[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_remove_and_document_lookup() {
        let s = add(
            &IndexSnapshot::new(),
            &["a", "b", "c"],
            vec![vec![1.0], vec![2.0], vec![3.0]],
        )
        .unwrap();
        assert_eq!(s.ids_for_document("doc"), vec!["a", "b", "c"]);
        assert!(s.ids_for_document("other").is_empty());

        let mut s = s;
        let doomed = ["b".to_string(), "zzz".to_string()];
        assert_eq!(s.count_present(&doomed), 1);
        assert_eq!(s.remove(&doomed), 1);
        assert_eq!(s.get("a").unwrap().seq, 0);
        assert_eq!(s.ids_for_document("doc"), vec!["a", "c"]);
        assert_eq!(s.get("c").unwrap().seq, 2);
    }

    #[test]
    fn test_from_entries_restores_order_and_seq() {
        let entry = |id: &str, seq| IndexEntry {
            id: id.to_string(),
            seq,
            vector: vec![1.0, 0.0],
            text: String::new(),
            metadata: Metadata::new(),
        };
        let s = IndexSnapshot::from_entries(vec![entry("late", 7), entry("early", 2)], None);

        let ids: Vec<&str> = s.entries().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert_eq!(s.dimension(), Some(2));

        let s = add(&s, &["new"], vec![vec![0.0, 1.0]]).unwrap();
        assert_eq!(s.get("new").unwrap().seq, 8);
    }

    #[test]
    fn test_repeated_id_in_one_batch_keeps_first_seq() {
        let s = add(
            &IndexSnapshot::new(),
            &["a", "b", "a"],
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]],
        )
        .unwrap();

        assert_eq!(s.len(), 2);
        assert_eq!(s.get("a").unwrap().seq, 0);
        assert_eq!(s.get("a").unwrap().vector, vec![0.5, 0.5]);
        assert_eq!(s.get("b").unwrap().seq, 1);

        let s = add(&s, &["c"], vec![vec![1.0, 1.0]]).unwrap();
        assert_eq!(s.get("c").unwrap().seq, 2);
    }

    #[test]
    fn test_apply_in_place_leaves_shared_readers_alone() {
        let mut shared = Arc::new(add(&IndexSnapshot::new(), &["a"], vec![vec![1.0, 0.0]]).unwrap());
        let reader = Arc::clone(&shared);

        let ids = vec!["b".to_string()];
        let written = shared
            .prepare_add(&ids, &[vec![0.0, 1.0]], &["b".to_string()], &[meta("doc")])
            .unwrap();
        Arc::make_mut(&mut shared).apply(written);

        assert_eq!(shared.len(), 2);
        assert_eq!(reader.len(), 1);
        assert!(reader.get("b").is_none());

        drop(reader);
        let ids = vec!["c".to_string()];
        let before = Arc::as_ptr(&shared);
        let written = shared
            .prepare_add(&ids, &[vec![1.0, 1.0]], &["c".to_string()], &[meta("doc")])
            .unwrap();
        Arc::make_mut(&mut shared).apply(written);
        assert_eq!(Arc::as_ptr(&shared), before);
        assert_eq!(shared.len(), 3);
    }
}
