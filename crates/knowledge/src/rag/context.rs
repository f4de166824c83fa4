//! Grounding context and citation list for the generation prompt.

use super::types::SourceRef;
use crate::types::{Metadata, QueryResult};

const UNKNOWN_TITLE: &str = "Unknown";

/// Chunk-level keys that are not shown as source metadata.
const CHUNK_KEYS: &[&str] = &["title", "chunk_index", "total_chunks", "content_hash"];

/// Result of assembling retrieved chunks.
#[derive(Debug, Clone, PartialEq)]
pub enum AssembledContext {
    /// Nothing was retrieved; generation must be skipped.
    NoEvidence,
    Grounded {
        context: String,
        sources: Vec<SourceRef>,
    },
}

/// Builds the `[Source N]`-tagged context and the deduplicated source list.
///
/// Sources are deduplicated by title in first-occurrence order, and every
/// block in the context is tagged with the 1-based position of its title
/// in that list. When titles are all distinct the tag equals the block's
/// rank in the input, and in every case tag `N` names `sources[N - 1]`.
///
/// Tags are therefore numbered after deduplication rather than by input
/// position: with results titled `A, A, B` the blocks are tagged `1, 1, 2`,
/// not `1, 2, 3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(&self, results: &[QueryResult]) -> AssembledContext {
        if results.is_empty() {
            return AssembledContext::NoEvidence;
        }

        let mut sources: Vec<SourceRef> = Vec::new();
        let mut blocks = Vec::with_capacity(results.len());

        for result in results {
            let title = result.title().unwrap_or(UNKNOWN_TITLE);
            let position = match sources.iter().position(|s| s.title == title) {
                Some(pos) => pos,
                None => {
                    sources.push(SourceRef {
                        title: title.to_string(),
                        metadata: source_metadata(&result.metadata),
                    });
                    sources.len() - 1
                }
            };

            blocks.push(format!("[Source {}] {}\n{}", position + 1, title, result.text.trim()));
        }

        AssembledContext::Grounded {
            context: blocks.join("\n\n"),
            sources,
        }
    }
}

fn source_metadata(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(key, _)| !CHUNK_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
