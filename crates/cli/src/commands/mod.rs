//! Command handlers for the Grounded CLI.

pub mod ask;
pub mod ingest;
pub mod reset;
pub mod status;

pub use ask::AskCommand;
pub use ingest::IngestCommand;
pub use reset::ResetCommand;
pub use status::StatusCommand;

use anyhow::Context;
use grounded_core::config::AppConfig;
use grounded_knowledge::{load_config, Pipeline, RagConfig};
use grounded_prompt::ValidatorChain;

/// Collection settings: the collection's config file, then `GROUNDED_*`
/// environment overrides.
pub fn rag_config(config: &AppConfig) -> anyhow::Result<RagConfig> {
    let mut rag = load_config(&config.workspace, &config.collection)?;
    rag.apply_env_overrides(|key| std::env::var(key).ok())?;
    rag.validate()
        .with_context(|| format!("Invalid settings for collection '{}'", config.collection))?;
    Ok(rag)
}

/// Open the configured collection with the content-safety chain enabled.
pub fn open_pipeline(config: &AppConfig) -> anyhow::Result<Pipeline> {
    let rag = rag_config(config)?;
    let pipeline = Pipeline::open(&config.workspace, rag)
        .with_context(|| format!("Failed to open collection '{}'", config.collection))?;
    Ok(pipeline.with_guard(ValidatorChain::standard()?))
}

/// Empty the configured collection and open it, even if it was built with a
/// different distance metric. Returns the pipeline and the entries removed.
pub fn reset_pipeline(config: &AppConfig) -> anyhow::Result<(Pipeline, usize)> {
    let rag = rag_config(config)?;
    let (pipeline, removed) = Pipeline::open_reset(&config.workspace, rag)
        .with_context(|| format!("Failed to reset collection '{}'", config.collection))?;
    Ok((pipeline.with_guard(ValidatorChain::standard()?), removed))
}
