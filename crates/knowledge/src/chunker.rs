//! Recursive separator-based text chunking.
//!
//! Lengths are measured in characters, never bytes, so multi-byte text is
//! never split inside a code point.

use crate::config::RagConfig;
use crate::types::{Chunk, Document};
use grounded_core::{AppError, AppResult};

/// Paragraph break, line break, sentence end, word break, raw character.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Splits text into bounded, overlapping chunks.
///
/// A chunk ends on the highest-priority separator that still fits within
/// `chunk_size`; a hard character cut is used only when none does. The next
/// chunk starts `overlap` characters before the end of the previous span.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<Vec<char>>,
    prepend_title: bool,
}

impl Chunker {
    /// Create a chunker with the default separators.
    pub fn new(chunk_size: usize, overlap: usize) -> AppResult<Self> {
        Self::with_separators(chunk_size, overlap, &DEFAULT_SEPARATORS)
    }

    /// Create a chunker with custom separators in priority order.
    pub fn with_separators<S: AsRef<str>>(
        chunk_size: usize,
        overlap: usize,
        separators: &[S],
    ) -> AppResult<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(AppError::ChunkingConfig {
                chunk_size,
                overlap,
            });
        }

        Ok(Self {
            chunk_size,
            overlap,
            separators: separators
                .iter()
                .map(|s| s.as_ref().chars().collect())
                .collect(),
            prepend_title: false,
        })
    }

    /// Create a chunker from collection settings.
    pub fn from_config(config: &RagConfig) -> AppResult<Self> {
        Ok(
            Self::with_separators(config.chunk_size, config.chunk_overlap, &config.separators)?
                .with_title_prefix(config.prepend_title),
        )
    }

    /// Prefix `Title: <title>` to document text before splitting.
    pub fn with_title_prefix(mut self, enabled: bool) -> Self {
        self.prepend_title = enabled;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split raw text into trimmed, non-empty passages.
    pub fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut pieces = Vec::new();
        let mut start = 0;

        loop {
            if len - start <= self.chunk_size {
                push_trimmed(&mut pieces, &chars[start..len]);
                break;
            }

            let limit = start + self.chunk_size;
            let end = self.find_break(&chars, start, limit).unwrap_or(limit);
            push_trimmed(&mut pieces, &chars[start..end]);

            // end > start + overlap, so this always advances
            start = end - self.overlap;
        }

        pieces
    }

    /// Chunk a document into ordered chunks with ids `{document_id}_{ordinal}`.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let pieces = if self.prepend_title {
            self.split(&format!("Title: {}\n\n{}", document.title, document.raw_text))
        } else {
            self.split(&document.raw_text)
        };

        let total = pieces.len();
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| Chunk {
                id: Chunk::id_for(&document.id, ordinal),
                parent_document_id: document.id.clone(),
                ordinal_index: ordinal,
                text,
                total_chunks_for_parent: total,
            })
            .collect();

        tracing::debug!(
            document = %document.id,
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.overlap,
            "Chunked document"
        );

        chunks
    }

    /// End of the largest prefix of `chars[start..limit]` that ends on a
    /// separator, trying separators in priority order.
    fn find_break(&self, chars: &[char], start: usize, limit: usize) -> Option<usize> {
        // Breaks at or before this point would not advance past the overlap
        let min_end = start + self.overlap + 1;

        for separator in &self.separators {
            // Empty separator: raw character cut
            if separator.is_empty() {
                return None;
            }

            let sep_len = separator.len();
            let mut end = limit;
            while end >= min_end && end >= start + sep_len {
                if chars[end - sep_len..end] == separator[..] {
                    return Some(end);
                }
                end -= 1;
            }
        }

        None
    }
}

fn push_trimmed(pieces: &mut Vec<String>, span: &[char]) {
    let text: String = span.iter().collect();
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
}

/// Chunk one text for a parent document.
///
/// Fails with a chunking configuration error before any splitting when
/// `overlap >= chunk_size`.
pub fn chunk_text<S: AsRef<str>>(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
    separators: &[S],
) -> AppResult<Vec<Chunk>> {
    let chunker = Chunker::with_separators(chunk_size, overlap, separators)?;
    Ok(chunker.chunk_document(&Document::new(document_id, "", text)))
}
