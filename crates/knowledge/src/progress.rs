//! Structured progress reporting for ingestion.
//!
//! Provides observable, incremental feedback while documents are chunked,
//! embedded, written to the index and pruned.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Stage of an ingest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestPhase {
    Chunk,
    Embed,
    Index,
    Prune,
}

impl IngestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chunk => "chunk",
            Self::Embed => "embed",
            Self::Index => "index",
            Self::Prune => "prune",
        }
    }
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event emitted during ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: IngestPhase,

    /// Units done so far in this phase (documents chunked, batches embedded, ...)
    pub current: u64,

    /// Units expected, when known up front
    pub total: Option<u64>,

    pub message: String,

    /// Seconds since the reporter was created
    pub elapsed_secs: f64,
}

impl ProgressEvent {
    /// Completion in percent; `None` when the total is unknown.
    pub fn percentage(&self) -> Option<f64> {
        self.total.map(|total| match total {
            0 => 100.0,
            t => (self.current.min(t) as f64 / t as f64) * 100.0,
        })
    }

    /// One line for terminal output, e.g. `[embed] 5/10 (50%) - model=nomic-embed-text`.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };

        let pct = self
            .percentage()
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase, progress, pct, self.message)
    }
}

/// Callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Emits ingest progress to an optional callback and always to `tracing`.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    started: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            started: Instant::now(),
        }
    }

    /// Reporter that only mirrors events to tracing.
    pub fn noop() -> Self {
        Self {
            callback: None,
            started: Instant::now(),
        }
    }

    fn emit(&self, phase: IngestPhase, current: u64, total: Option<u64>, message: String) {
        let event = ProgressEvent {
            phase,
            current,
            total,
            message,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
        };

        tracing::debug!(
            phase = %event.phase,
            current = event.current,
            total = ?event.total,
            elapsed_secs = event.elapsed_secs,
            "{}",
            event.message
        );

        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    pub fn chunk(&self, current: u64, total: Option<u64>, chunks_created: usize) {
        self.emit(
            IngestPhase::Chunk,
            current,
            total,
            format!("{} chunks created", chunks_created),
        );
    }

    pub fn embed(&self, current: u64, total: Option<u64>, model: &str) {
        self.emit(IngestPhase::Embed, current, total, format!("model={}", model));
    }

    pub fn index(&self, current: u64, total: Option<u64>, collection: &str) {
        self.emit(
            IngestPhase::Index,
            current,
            total,
            format!("writing to {}", collection),
        );
    }

    pub fn prune(&self, removed: usize) {
        self.emit(
            IngestPhase::Prune,
            removed as u64,
            None,
            format!("{} stale entries removed", removed),
        );
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
