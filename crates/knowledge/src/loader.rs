//! Loading ingestion records from files.
//!
//! Supported inputs:
//! - `.json`: an array of records or a single record
//! - `.jsonl`: one record per line
//! - `.yaml` / `.yml`: a sequence of records or a single record
//! - `.txt` / `.md`: one document per file, titled by the file stem
//! - directories: every `.txt`/`.md` file below, in path order

use crate::types::{derive_document_id, Document, DocumentRecord};
use grounded_core::{AppError, AppResult};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    Json,
    JsonLines,
    Yaml,
    Markdown,
    PlainText,
}

impl SourceFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Some(Self::Json),
            Some("jsonl") | Some("ndjson") => Some(Self::JsonLines),
            Some("yaml") | Some("yml") => Some(Self::Yaml),
            Some("md") | Some("markdown") => Some(Self::Markdown),
            Some("txt") => Some(Self::PlainText),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<DocumentRecord>),
    One(DocumentRecord),
}

impl OneOrMany {
    fn into_documents(self) -> Vec<Document> {
        match self {
            OneOrMany::Many(records) => records.into_iter().map(DocumentRecord::into_document).collect(),
            OneOrMany::One(record) => vec![record.into_document()],
        }
    }
}

/// Load documents from a record file, a text file or a directory.
pub fn load_documents(path: &Path) -> AppResult<Vec<Document>> {
    if path.is_dir() {
        return load_directory(path);
    }

    let format = SourceFormat::from_path(path).ok_or_else(|| {
        AppError::Knowledge(format!(
            "Unsupported input file {:?}: expected .json, .jsonl, .yaml, .txt or .md",
            path
        ))
    })?;

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;

    let documents = match format {
        SourceFormat::Json => serde_json::from_str::<OneOrMany>(&raw)?.into_documents(),
        SourceFormat::Yaml => serde_yaml::from_str::<OneOrMany>(&raw)?.into_documents(),
        SourceFormat::JsonLines => parse_json_lines(&raw)?,
        SourceFormat::Markdown | SourceFormat::PlainText => vec![text_document(path, format, &raw)],
    };

    tracing::debug!("Loaded {} documents from {:?}", documents.len(), path);
    Ok(documents)
}

fn parse_json_lines(raw: &str) -> AppResult<Vec<Document>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<DocumentRecord>(line)
                .map(DocumentRecord::into_document)
                .map_err(|e| AppError::Serialization(format!("line {}: {}", n + 1, e)))
        })
        .collect()
}

fn load_directory(dir: &Path) -> AppResult<Vec<Document>> {
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry
            .map_err(|e| AppError::Knowledge(format!("Failed to walk {:?}: {}", dir, e)))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let format = match SourceFormat::from_path(path) {
            Some(f @ (SourceFormat::Markdown | SourceFormat::PlainText)) => f,
            _ => continue,
        };

        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;
        if raw.contains('\0') {
            tracing::warn!("Skipping likely binary file: {:?}", path);
            continue;
        }

        documents.push(text_document(path, format, &raw));
    }

    tracing::debug!("Loaded {} documents from directory {:?}", documents.len(), dir);
    Ok(documents)
}

fn text_document(path: &Path, format: SourceFormat, raw: &str) -> Document {
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Untitled".to_string());
    let file_name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let source = path.to_string_lossy().to_string();

    let text = match format {
        SourceFormat::Markdown => clean_markdown(raw),
        _ => raw.trim().to_string(),
    };

    Document::new(derive_document_id(&source), title, text)
        .with_metadata("source", source)
        .with_metadata("file_name", file_name)
}

/// Strip markdown syntax that carries no content, keeping paragraph breaks.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_fence = false;
    let mut pending_break = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }

        // Keep fenced content verbatim
        if in_fence {
            if pending_break {
                result.push('\n');
                pending_break = false;
            }
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let content = trimmed.trim_start_matches('#').trim();
        if content.is_empty() || content.chars().all(|c| c == '-' || c == '*' || c == '_') {
            pending_break = !result.is_empty();
            continue;
        }

        if pending_break {
            result.push('\n');
            pending_break = false;
        }
        result.push_str(content);
        result.push('\n');
    }

    result.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_json_array() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.json");
        fs::write(
            &path,
            r#"[
                {"title": "Python Basics", "content": "Python is a language.", "url": "https://example.com/py"},
                {"id": "cloud", "title": "Cloud Architecture", "content": "Clouds scale.", "metadata": {"speaker": "Ada"}}
            ]"#,
        )
        .unwrap();

        let docs = load_documents(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, derive_document_id("Python Basics\u{1f}https://example.com/py"));
        assert_eq!(docs[0].source_metadata["url"], "https://example.com/py");
        assert_eq!(docs[1].id, "cloud");
        assert_eq!(docs[1].source_metadata["speaker"], "Ada");
    }

    #[test]
    fn test_load_jsonl_reports_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("docs.jsonl");
        fs::write(
            &path,
            "{\"title\": \"A\", \"content\": \"alpha\"}\n\n{\"title\": \"B\", \"content\": \"beta\"}\n",
        )
        .unwrap();
        assert_eq!(load_documents(&path).unwrap().len(), 2);

        fs::write(&path, "{\"title\": \"A\", \"content\": \"alpha\"}\nnot json\n").unwrap();
        let err = load_documents(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_load_yaml_single_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.yaml");
        fs::write(&path, "title: Notes\ncontent: Some notes.\ndate: 2024-01-01\n").unwrap();

        let docs = load_documents(&path).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].title, "Notes");
        assert!(docs[0].source_metadata.contains_key("date"));
    }

    #[test]
    fn test_load_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("b.md"), "# Header\n\nBody text").unwrap();
        fs::write(temp_dir.path().join("sub/a.txt"), "plain text").unwrap();
        fs::write(temp_dir.path().join("ignored.bin"), "xx").unwrap();

        let docs = load_documents(temp_dir.path()).unwrap();
        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a"]);
        assert_eq!(docs[0].raw_text, "Header\n\nBody text");
        assert_eq!(docs[1].source_metadata["file_name"], "a.txt");
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.pdf");
        fs::write(&path, "%PDF").unwrap();
        assert!(load_documents(&path).is_err());
    }

    #[test]
    fn test_clean_markdown_keeps_paragraphs() {
        let input = "# Title\n\nFirst para\nline two\n\n---\n\n```\ncode\n```\nLast";
        let output = clean_markdown(input);
        assert_eq!(output, "Title\n\nFirst para\nline two\n\ncode\nLast");
    }
}
