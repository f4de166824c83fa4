//! Ingest and query orchestration.
//!
//! `ingest`: documents -> chunks -> embedding batches -> index, one
//! atomic `add` per batch. `query`: guard -> retrieval -> context ->
//! generation, with fixed fallback answers for each failure mode.
//!
//! The index is the only state shared between calls.

use super::context::{AssembledContext, ContextAssembler};
use super::retriever::Retriever;
use super::types::{AnswerOutcome, FailedBatch, IngestReport, PipelineAnswer, PipelineStatus};
use crate::chunker::Chunker;
use crate::config::{get_index_path, RagConfig};
use crate::embeddings::{create_provider, EmbeddingClient, EmbeddingProvider};
use crate::index::{SqliteIndex, VectorIndex};
use crate::progress::ProgressReporter;
use crate::types::{short_hash, Chunk, Document, Metadata};
use chrono::Utc;
use grounded_core::{AppError, AppResult};
use grounded_llm::{create_client, LlmClient, LlmRequest};
use grounded_prompt::{
    build_prompt, load_prompt_or_default, PiiRedactor, PromptDefinition, ValidatorChain, Verdict,
    GROUNDED_ANSWER_PROMPT_ID,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A chunk waiting to be embedded, with the metadata its entry will carry.
struct PendingChunk {
    chunk: Chunk,
    metadata: Metadata,
}

pub struct Pipeline {
    config: RagConfig,
    chunker: Chunker,
    retriever: Retriever,
    assembler: ContextAssembler,
    generator: Arc<dyn LlmClient>,
    prompt: PromptDefinition,
    guard: Option<ValidatorChain>,
    redactor: Option<PiiRedactor>,
    progress: ProgressReporter,
}

impl Pipeline {
    /// Build a pipeline from explicit collaborators.
    ///
    /// The configuration is validated here, once; an index whose metric
    /// disagrees with it, or whose dimension disagrees with the provider's,
    /// is refused.
    pub fn new(
        config: RagConfig,
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn LlmClient>,
    ) -> AppResult<Self> {
        config.validate()?;

        if index.metric() != config.distance_metric {
            return Err(AppError::Config(format!(
                "Index for '{}' uses the {} metric but the configuration asks for {}",
                index.collection(),
                index.metric(),
                config.distance_metric
            )));
        }

        if let (Some(expected), Some(actual)) = (index.dimension(), provider.dimensions()) {
            if expected != actual {
                return Err(AppError::IndexDimensionMismatch { expected, actual });
            }
        }

        let chunker = Chunker::from_config(&config)?;
        let embedder = EmbeddingClient::from_config(provider, &config)?;
        let redactor = if config.redact_pii {
            Some(PiiRedactor::new()?)
        } else {
            None
        };

        Ok(Self {
            config,
            chunker,
            retriever: Retriever::new(embedder, index),
            assembler: ContextAssembler::new(),
            generator,
            prompt: PromptDefinition::grounded_answer(),
            guard: None,
            redactor,
            progress: ProgressReporter::noop(),
        })
    }

    /// Open the persistent collection in `workspace` with the configured
    /// providers and the workspace's answer prompt (or the built-in one).
    pub fn open(workspace: &Path, config: RagConfig) -> AppResult<Self> {
        config.validate()?;

        let index = SqliteIndex::open(
            &get_index_path(workspace, &config.collection),
            config.collection.clone(),
            config.distance_metric,
        )?;
        Self::with_index(workspace, config, index)
    }

    /// Like [`Pipeline::open`], but the collection is emptied first and
    /// rebound to the configured metric, so a collection built with another
    /// metric can be rebuilt. Returns the pipeline and the number of entries
    /// removed.
    pub fn open_reset(workspace: &Path, config: RagConfig) -> AppResult<(Self, usize)> {
        config.validate()?;

        let (index, removed) = SqliteIndex::open_reset(
            &get_index_path(workspace, &config.collection),
            config.collection.clone(),
            config.distance_metric,
        )?;
        Ok((Self::with_index(workspace, config, index)?, removed))
    }

    fn with_index(workspace: &Path, config: RagConfig, index: SqliteIndex) -> AppResult<Self> {
        let provider = create_provider(&config)?;
        let generator = create_client(&config.generation_provider, &config.client_options())?;
        let prompt = load_prompt_or_default(workspace, GROUNDED_ANSWER_PROMPT_ID)?;

        Ok(Self::new(config, provider, Arc::new(index), generator)?.with_prompt(prompt))
    }

    /// Redact personal data from questions after the guard has passed them.
    pub fn with_redactor(mut self, redactor: PiiRedactor) -> Self {
        self.redactor = Some(redactor);
        self
    }

    /// Run `guard` on every question before retrieval.
    pub fn with_guard(mut self, guard: ValidatorChain) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_prompt(mut self, prompt: PromptDefinition) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        self.retriever.index()
    }

    /// Chunk, embed and index `documents`.
    ///
    /// Batches are formed in document order then chunk order, and each batch
    /// is either fully written or reported in `failed_batches`. Committed
    /// batches stay committed. Configuration errors and cancellation abort
    /// the call; batches not yet committed at that point are not written.
    #[instrument(skip_all, fields(collection = %self.config.collection, documents = documents.len()))]
    pub async fn ingest(
        &self,
        documents: &[Document],
        cancel: &CancellationToken,
    ) -> AppResult<IngestReport> {
        reject_duplicate_ids(documents)?;

        let started = Instant::now();
        let mut report = IngestReport {
            started_at: Utc::now(),
            documents: documents.len(),
            ..Default::default()
        };

        let mut pending = Vec::new();
        for (i, document) in documents.iter().enumerate() {
            let chunks = self.chunker.chunk_document(document);
            self.progress
                .chunk(i as u64 + 1, Some(documents.len() as u64), chunks.len());

            for chunk in chunks {
                let metadata = chunk_metadata(document, &chunk);
                pending.push(PendingChunk { chunk, metadata });
            }
        }
        report.chunks_total = pending.len();

        let embedder = self.retriever.embedder();
        let index = self.retriever.index();
        let batches: Vec<&[PendingChunk]> = pending.chunks(embedder.batch_size()).collect();
        report.batches_total = batches.len();
        let mut failed_documents: HashSet<String> = HashSet::new();

        for (batch_index, batch) in batches.iter().enumerate() {
            let position = (batch_index as u64 + 1, Some(report.batches_total as u64));
            if cancel.is_cancelled() {
                return Err(ingest_cancelled(&report));
            }

            let texts: Vec<String> = batch.iter().map(|p| p.chunk.text.clone()).collect();
            self.progress.embed(position.0, position.1, embedder.model_name());

            let embedded = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ingest_cancelled(&report)),
                result = embedder.embed(&texts) => result,
            };

            let outcome = match embedded {
                Ok(vectors) => {
                    if cancel.is_cancelled() {
                        return Err(ingest_cancelled(&report));
                    }

                    let ids: Vec<String> = batch.iter().map(|p| p.chunk.id.clone()).collect();
                    let metadatas: Vec<Metadata> = batch.iter().map(|p| p.metadata.clone()).collect();
                    let index = Arc::clone(index);
                    off_runtime(move || index.add(&ids, &vectors, &texts, &metadatas)).await
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(()) => {
                    report.batches_committed += 1;
                    report.chunks_indexed += batch.len();
                    self.progress.index(position.0, position.1, index.collection());
                    debug!(batch_index, chunks = batch.len(), "Committed batch");
                }
                Err(err) if err.is_config() => return Err(err),
                Err(err) => {
                    warn!(batch_index, error = %err, "Batch not indexed");
                    let failed = failed_batch(batch_index, batch, &err);
                    failed_documents.extend(failed.document_ids.iter().cloned());
                    report.failed_batches.push(failed);
                }
            }
        }

        report.pruned_entries = self
            .prune_stale(documents, &pending, &failed_documents)
            .await?;
        report.duration_secs = started.elapsed().as_secs_f64();

        if report.is_complete() {
            info!(
                chunks = report.chunks_indexed,
                batches = report.batches_committed,
                pruned = report.pruned_entries,
                "Ingest complete"
            );
        } else {
            warn!(
                chunks_indexed = report.chunks_indexed,
                chunks_total = report.chunks_total,
                failed_batches = report.failed_batches.len(),
                "Ingest partially failed"
            );
        }

        Ok(report)
    }

    /// Remove entries of fully indexed documents that this ingest no longer
    /// produced, so a shrunken document converges to its new chunk set.
    async fn prune_stale(
        &self,
        documents: &[Document],
        pending: &[PendingChunk],
        failed_documents: &HashSet<String>,
    ) -> AppResult<usize> {
        let mut produced: HashMap<&str, HashSet<&str>> = HashMap::new();
        for document in documents {
            produced.entry(document.id.as_str()).or_default();
        }
        for p in pending {
            produced
                .entry(p.chunk.parent_document_id.as_str())
                .or_default()
                .insert(p.chunk.id.as_str());
        }

        let index = self.retriever.index();
        let mut stale = Vec::new();
        for document in documents {
            if failed_documents.contains(&document.id) {
                continue;
            }
            let Some(current) = produced.get(document.id.as_str()) else {
                continue;
            };
            stale.extend(
                index
                    .ids_for_document(&document.id)
                    .into_iter()
                    .filter(|id| !current.contains(id.as_str())),
            );
        }
        stale.sort();
        stale.dedup();

        if stale.is_empty() {
            return Ok(0);
        }

        let index = Arc::clone(index);
        let removed = off_runtime(move || index.delete(&stale)).await?;
        self.progress.prune(removed);
        debug!(removed, "Pruned stale entries");
        Ok(removed)
    }

    /// Answer `question` from the `k` nearest chunks (`top_k_default` when
    /// `k` is `None`).
    ///
    /// Retrieval and generation failures become fixed fallback answers;
    /// configuration and index errors propagate.
    #[instrument(skip(self, question, cancel), fields(collection = %self.config.collection))]
    pub async fn query(
        &self,
        question: &str,
        k: Option<usize>,
        cancel: &CancellationToken,
    ) -> AppResult<PipelineAnswer> {
        let k = k.unwrap_or(self.config.top_k_default);

        if let Some(guard) = &self.guard {
            if let Verdict::Block { validator, reason } = guard.check(question) {
                return Ok(PipelineAnswer::blocked(validator, reason));
            }
        }

        let redacted = self.redactor.as_ref().map(|r| r.redact(question));
        let question = match &redacted {
            Some(redaction) if !redaction.is_clean() => {
                info!(found = ?redaction.found, "Redacted personal data from question");
                redaction.text.as_str()
            }
            _ => question,
        };

        let searched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled("query cancelled during retrieval".to_string())),
            result = self.retriever.search(question, k) => result,
        };

        let results = match searched {
            Ok(results) => results,
            Err(err @ AppError::Embedding { .. }) => {
                warn!(error = %err, "Could not embed question");
                return Ok(PipelineAnswer::retrieval_failed());
            }
            Err(err) => return Err(err),
        };

        let (context, sources) = match self.assembler.assemble(&results) {
            AssembledContext::NoEvidence => {
                info!("No evidence retrieved, skipping generation");
                return Ok(PipelineAnswer::no_evidence());
            }
            AssembledContext::Grounded { context, sources } => (context, sources),
        };

        let request = self.build_request(question, &context)?;
        let generated = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled("query cancelled during generation".to_string())),
            result = self.generator.complete(&request) => result,
        };

        match generated {
            Ok(response) => {
                info!(
                    sources = sources.len(),
                    chunks = results.len(),
                    tokens = response.usage.total(),
                    "Answer generated"
                );
                Ok(PipelineAnswer {
                    answer: response.content.trim().to_string(),
                    sources,
                    retrieved_chunks: results,
                    outcome: AnswerOutcome::Answered,
                })
            }
            Err(err) => {
                let err = AppError::Generation(err.to_string());
                error!(provider = self.generator.provider_name(), error = %err, "Generation failed");
                Ok(PipelineAnswer::generation_failed(results))
            }
        }
    }

    fn build_request(&self, question: &str, context: &str) -> AppResult<LlmRequest> {
        let mut variables = HashMap::new();
        variables.insert("context".to_string(), context.to_string());
        variables.insert("question".to_string(), question.to_string());

        let built = build_prompt(&self.prompt, variables)?;
        let mut request = LlmRequest::new(built.user, &self.config.generation_model);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let Some(temperature) = built.metadata.temperature {
            request = request.with_temperature(temperature);
        }
        Ok(request)
    }

    pub fn status(&self) -> PipelineStatus {
        let embedder = self.retriever.embedder();
        PipelineStatus {
            index: self.retriever.index().status(),
            embedding_provider: embedder.provider_name().to_string(),
            embedding_model: embedder.model_name().to_string(),
            generation_model: self.config.generation_model.clone(),
            chunk_size: self.config.chunk_size,
            chunk_overlap: self.config.chunk_overlap,
            top_k_default: self.config.top_k_default,
        }
    }

    /// Remove every entry from the collection.
    pub fn reset(&self) -> AppResult<()> {
        self.retriever.index().reset()?;
        info!(collection = %self.config.collection, "Collection reset");
        Ok(())
    }
}

fn chunk_metadata(document: &Document, chunk: &Chunk) -> Metadata {
    let mut metadata = document.source_metadata.clone();
    metadata.insert("title".into(), Value::from(document.title.clone()));
    metadata.insert("document_id".into(), Value::from(document.id.clone()));
    metadata.insert("chunk_index".into(), Value::from(chunk.ordinal_index));
    metadata.insert("total_chunks".into(), Value::from(chunk.total_chunks_for_parent));
    metadata.insert("content_hash".into(), Value::from(short_hash(&chunk.text)));
    metadata
}

/// Two documents with one id would share chunk ids, and the later one would
/// silently replace the earlier one's entries.
fn reject_duplicate_ids(documents: &[Document]) -> AppResult<()> {
    let mut seen = HashSet::new();
    let mut duplicates: Vec<&str> = Vec::new();
    for document in documents {
        if !seen.insert(document.id.as_str()) && !duplicates.contains(&document.id.as_str()) {
            duplicates.push(&document.id);
        }
    }

    if duplicates.is_empty() {
        return Ok(());
    }

    Err(AppError::Knowledge(format!(
        "Duplicate document ids in one ingest: {}. Give each record a distinct id, url or source",
        duplicates.join(", ")
    )))
}

/// Run a synchronous index write on the blocking pool so SQLite I/O does
/// not stall the runtime.
async fn off_runtime<T, F>(write: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(write)
        .await
        .map_err(|e| AppError::Index(format!("Index write task failed: {}", e)))?
}

fn failed_batch(batch_index: usize, batch: &[PendingChunk], err: &AppError) -> FailedBatch {
    let mut document_ids: Vec<String> = Vec::new();
    for p in batch {
        if document_ids.last() != Some(&p.chunk.parent_document_id) {
            document_ids.push(p.chunk.parent_document_id.clone());
        }
    }

    FailedBatch {
        batch_index,
        chunk_ids: batch.iter().map(|p| p.chunk.id.clone()).collect(),
        document_ids,
        reason: err.to_string(),
    }
}

fn ingest_cancelled(report: &IngestReport) -> AppError {
    AppError::Cancelled(format!(
        "ingest cancelled after {} of {} batches were committed",
        report.batches_committed, report.batches_total
    ))
}
