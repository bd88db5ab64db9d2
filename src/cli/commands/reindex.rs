//! Reindex command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Drop the persisted keyword index and rebuild it from stored clips.
pub async fn run_reindex(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings).await?;

    let spinner = Output::spinner("Rebuilding keyword index...");
    let result = orchestrator.rebuild_index().await;
    spinner.finish_and_clear();
    result?;

    let snapshot = orchestrator.search_snapshot()?;
    Output::success(&format!("Keyword index rebuilt over {} clips", snapshot.len()));
    Ok(())
}
