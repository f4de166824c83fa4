//! Vector index abstraction for chunk embeddings.
//!
//! Defines a trait for backend-agnostic storage and exact nearest-neighbour
//! search, plus the distance metrics both backends share.

pub mod memory;
pub mod snapshot;
pub mod sqlite;

pub use memory::InMemoryIndex;
pub use snapshot::{IndexEntry, IndexSnapshot};
pub use sqlite::SqliteIndex;

use crate::types::{Metadata, QueryResult};
use grounded_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance function used to rank entries. Lower is more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
        }
    }

    /// Distance between two vectors of equal length.
    ///
    /// Cosine distance is `1 - cos(a, b)` clamped to `[0, 2]`; a zero vector
    /// is treated as orthogonal to everything.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }

                (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
            }
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            other => Err(AppError::Config(format!(
                "Unknown distance metric: '{}'. Supported metrics: cosine, euclidean",
                other
            ))),
        }
    }
}

/// Point-in-time description of an index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStatus {
    pub collection: String,
    pub entry_count: usize,
    pub dimension: Option<usize>,
    pub metric: DistanceMetric,
}

/// Trait for vector index backends.
///
/// Implementations must:
/// - validate a whole batch before writing any of it
/// - treat an existing id as an upsert that keeps its insertion position
/// - return query hits ordered by ascending distance, ties by insertion order
/// - never expose a partially applied batch to concurrent readers
pub trait VectorIndex: Send + Sync {
    /// Collection this index serves.
    fn collection(&self) -> &str;

    fn metric(&self) -> DistanceMetric;

    /// Vector dimensionality, once established by the first write.
    fn dimension(&self) -> Option<usize>;

    /// Insert or replace entries. All four slices must have equal length.
    fn add(
        &self,
        ids: &[String],
        vectors: &[Vec<f32>],
        texts: &[String],
        metadatas: &[Metadata],
    ) -> AppResult<()>;

    /// Up to `k` nearest entries to `vector`.
    fn query(&self, vector: &[f32], k: usize) -> AppResult<Vec<QueryResult>>;

    /// Number of stored entries.
    fn count(&self) -> usize;

    /// Remove entries by id, returning how many existed.
    fn delete(&self, ids: &[String]) -> AppResult<usize>;

    /// Ids of entries whose metadata names `document_id`, in insertion order.
    fn ids_for_document(&self, document_id: &str) -> Vec<String>;

    /// Remove every entry and forget the established dimension.
    fn reset(&self) -> AppResult<()>;

    fn status(&self) -> IndexStatus {
        IndexStatus {
            collection: self.collection().to_string(),
            entry_count: self.count(),
            dimension: self.dimension(),
            metric: self.metric(),
        }
    }
}
