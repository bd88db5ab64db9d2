//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings).await?;

    match orchestrator.list_sources().await {
        Ok(sources) => {
            if sources.is_empty() {
                Output::info("Nothing indexed yet. Use 'klipp ingest <file>' to add transcripts.");
            } else {
                Output::header(&format!("Indexed Sources ({})", sources.len()));
                println!();

                for source in &sources {
                    Output::source_info(
                        &source.source_title,
                        &source.source_id,
                        source.chunk_count,
                        source.total_duration_seconds,
                    );
                }

                let total_chunks: u32 = sources.iter().map(|s| s.chunk_count).sum();
                println!();
                Output::kv("Total sources", &sources.len().to_string());
                Output::kv("Total clips", &total_chunks.to_string());
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to list sources: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
