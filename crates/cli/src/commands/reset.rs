//! Reset command handler.

use clap::Args;
use grounded_core::config::AppConfig;

/// Remove every entry from the collection
#[derive(Args, Debug)]
pub struct ResetCommand {}

impl ResetCommand {
    pub fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let (_, removed) = super::reset_pipeline(config)?;

        println!("Collection '{}' reset ({} entries removed)", config.collection, removed);
        Ok(())
    }
}
