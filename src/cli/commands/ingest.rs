//! Ingest command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::transcript::TranscriptBundle;
use anyhow::{Context, Result};
use std::path::Path;

/// Run the ingest command.
pub async fn run_ingest(file: &str, settings: Settings) -> Result<()> {
    let bundle = TranscriptBundle::from_file(Path::new(file))
        .with_context(|| format!("Failed to read transcript bundle {}", file))?;

    if bundle.lines.is_empty() {
        Output::warning("The bundle contains no transcript lines.");
        return Ok(());
    }

    let orchestrator = Orchestrator::new(settings).await?;

    let spinner = Output::spinner(&format!("Segmenting {} lines...", bundle.lines.len()));
    let report = orchestrator.ingest(&bundle).await;
    spinner.finish_and_clear();

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            Output::error(&format!("Ingestion failed: {}", e));
            return Err(e.into());
        }
    };

    for source in &report.sources {
        Output::success(&format!(
            "{} ({}): {} chapters",
            source.title, source.source_id, source.chapters
        ));
    }
    println!();
    Output::kv("Sources", &report.sources.len().to_string());
    Output::kv("Chapters", &report.total_chapters().to_string());
    Output::info("Run 'klipp graph build' to refresh relationships.");

    Ok(())
}
