//! Status command handler.

use clap::Args;
use grounded_core::config::AppConfig;

/// Show collection status
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let pipeline = super::open_pipeline(config)?;
        let status = pipeline.status();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            println!("Collection: {}", status.index.collection);
            println!("  Entries: {}", status.index.entry_count);
            match status.index.dimension {
                Some(dimension) => println!("  Dimension: {}", dimension),
                None => println!("  Dimension: (not established)"),
            }
            println!("  Metric: {}", status.index.metric);
            println!(
                "  Embedding: {} ({})",
                status.embedding_model, status.embedding_provider
            );
            println!("  Generation: {}", status.generation_model);
            println!(
                "  Chunking: size {}, overlap {}, top_k {}",
                status.chunk_size, status.chunk_overlap, status.top_k_default
            );
        }

        Ok(())
    }
}
