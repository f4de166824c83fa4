//! Ask command handler.

use clap::Args;
use grounded_core::config::AppConfig;
use grounded_knowledge::{PipelineAnswer, SourceRef};
use tokio_util::sync::CancellationToken;

/// Ask a question about the indexed documents
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: String,

    /// Number of chunks to retrieve (default: the collection's top_k_default)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
        let pipeline = super::open_pipeline(config)?;
        let answer = pipeline.query(&self.question, self.top_k, cancel).await?;

        tracing::debug!(
            outcome = ?answer.outcome,
            sources = answer.sources.len(),
            chunks = answer.retrieved_chunks.len(),
            "Query finished"
        );

        if self.json {
            println!("{}", serde_json::to_string_pretty(&answer)?);
        } else {
            print_answer(&answer);
        }

        Ok(())
    }
}

fn print_answer(answer: &PipelineAnswer) {
    println!("{}", answer.answer);

    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for (i, source) in answer.sources.iter().enumerate() {
            println!("  [{}] {}", i + 1, describe(source));
        }
    }
}

/// Title plus the most useful provenance fields, when present.
fn describe(source: &SourceRef) -> String {
    let details: Vec<String> = ["date", "url", "speaker", "source"]
        .iter()
        .filter_map(|key| source.metadata.get(*key))
        .filter_map(|value| match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();

    if details.is_empty() {
        source.title.clone()
    } else {
        format!("{} ({})", source.title, details.join(", "))
    }
}
