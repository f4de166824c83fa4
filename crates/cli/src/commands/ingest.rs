//! Ingest command handler.

use anyhow::{bail, Context};
use clap::Args;
use grounded_core::config::AppConfig;
use grounded_knowledge::config::get_config_path;
use grounded_knowledge::{load_documents, save_config, Document, IngestReport, ProgressReporter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Chunk, embed and index documents
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Record files to ingest (.json, .jsonl, .yaml, .txt, .md)
    #[arg(long)]
    pub file: Vec<PathBuf>,

    /// Directories of .txt/.md files to ingest
    #[arg(long)]
    pub path: Vec<PathBuf>,

    /// Reset the collection before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
        if self.file.is_empty() && self.path.is_empty() {
            bail!("Nothing to ingest: pass --file or --path");
        }

        let mut documents: Vec<Document> = Vec::new();
        for input in self.file.iter().chain(&self.path) {
            let loaded = load_documents(input)
                .with_context(|| format!("Failed to load documents from {:?}", input))?;
            documents.extend(loaded);
        }
        tracing::info!("Loaded {} documents", documents.len());

        let mut pipeline = if self.reset {
            let (pipeline, removed) = super::reset_pipeline(config)?;
            tracing::info!(removed, "Collection reset before ingest");
            pipeline
        } else {
            super::open_pipeline(config)?
        };
        if !self.json {
            pipeline = pipeline.with_progress(ProgressReporter::new(Arc::new(|event| {
                eprintln!("{}", event.format_simple());
            })));
        }

        if !get_config_path(&config.workspace, &config.collection).exists() {
            save_config(&config.workspace, pipeline.config())?;
        }

        let report = pipeline.ingest(&documents, cancel).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&config.collection, &report);
        }

        report.into_result()?;
        Ok(())
    }
}

fn print_report(collection: &str, report: &IngestReport) {
    println!(
        "Indexed {}/{} chunks from {} documents into '{}' in {:.2}s",
        report.chunks_indexed,
        report.chunks_total,
        report.documents,
        collection,
        report.duration_secs
    );

    if report.pruned_entries > 0 {
        println!("Removed {} stale chunks", report.pruned_entries);
    }

    for batch in &report.failed_batches {
        println!(
            "Batch {} not indexed ({} chunks from {}): {}",
            batch.batch_index + 1,
            batch.chunk_ids.len(),
            batch.document_ids.join(", "),
            batch.reason
        );
    }
}
