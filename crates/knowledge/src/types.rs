//! Knowledge system type definitions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Free-form metadata attached to documents and index entries.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A source document handed to ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable document identifier; chunk ids derive from it
    pub id: String,

    /// Human-readable title, used as the citation label
    pub title: String,

    /// Source metadata (date, url, speaker, ...)
    #[serde(default)]
    pub source_metadata: Metadata,

    /// Plain text content
    pub raw_text: String,
}

impl Document {
    /// Create a document with an explicit id.
    pub fn new(id: impl Into<String>, title: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source_metadata: Metadata::new(),
            raw_text: raw_text.into(),
        }
    }

    /// Create a document whose id is derived from its title.
    pub fn titled(title: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let title = title.into();
        Self::new(derive_document_id(&title), title, raw_text)
    }

    /// Attach one metadata value.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.source_metadata.insert(key.into(), value.into());
        self
    }
}

/// Derive a stable document id from a seed string (title or path).
pub fn derive_document_id(seed: &str) -> String {
    format!("doc-{}", &short_hash(seed)[..16])
}

/// Hex SHA-256 of `text`.
pub fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Ingestion record as it appears in JSON/JSONL/YAML files:
/// `{title, content, metadata?, id?}` plus any extra top-level fields,
/// which are folded into the metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentRecord {
    #[serde(default)]
    pub id: Option<String>,

    pub title: String,

    #[serde(alias = "raw_text", alias = "text")]
    pub content: String,

    #[serde(default, alias = "source_metadata")]
    pub metadata: Metadata,

    #[serde(flatten)]
    pub extra: Metadata,
}

impl DocumentRecord {
    pub fn into_document(self) -> Document {
        let mut metadata = self.metadata;
        for (key, value) in self.extra {
            metadata.entry(key).or_insert(value);
        }

        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| derive_document_id(&record_seed(&self.title, &metadata)));

        Document {
            id,
            title: self.title,
            source_metadata: metadata,
            raw_text: self.content,
        }
    }
}

/// Metadata keys that tell apart records sharing a title.
const IDENTITY_KEYS: &[&str] = &["url", "source", "date"];

/// Id seed for a record without an explicit id: the title, qualified by
/// whichever identity keys the record carries.
fn record_seed(title: &str, metadata: &Metadata) -> String {
    let mut seed = title.to_string();
    for key in IDENTITY_KEYS {
        match metadata.get(*key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => {
                seed.push('\u{1f}');
                seed.push_str(s);
            }
            Some(serde_json::Value::Number(n)) => {
                seed.push('\u{1f}');
                seed.push_str(&n.to_string());
            }
            _ => {}
        }
    }
    seed
}

/// A bounded passage of a document; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document_id}_{ordinal_index}`
    pub id: String,

    pub parent_document_id: String,

    /// Position within the parent, contiguous from 0
    pub ordinal_index: usize,

    pub text: String,

    pub total_chunks_for_parent: usize,
}

impl Chunk {
    /// Chunk id for a document ordinal.
    pub fn id_for(document_id: &str, ordinal_index: usize) -> String {
        format!("{}_{}", document_id, ordinal_index)
    }
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub chunk_id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Non-negative; lower is more similar
    pub distance: f32,
}

impl QueryResult {
    /// Title recorded in the entry metadata, if any.
    pub fn title(&self) -> Option<&str> {
        self.metadata
            .get("title")
            .and_then(|v| v.as_str())
            .filter(|t| !t.trim().is_empty())
    }
}
