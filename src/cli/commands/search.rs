//! Search command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::KlippError;
use crate::orchestrator::Orchestrator;
use crate::transcript::format_timestamp;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(query: &str, limit: usize, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings).await?;

    let spinner = Output::spinner("Searching...");
    let outcome = orchestrator.search(query, limit).await;
    spinner.finish_and_clear();

    match outcome {
        Ok(outcome) => {
            if outcome.degraded {
                Output::warning("Semantic search unavailable; results use keyword ranking only.");
            }
            if outcome.results.is_empty() {
                Output::warning("No results found matching your query.");
            } else if !outcome.clips.is_empty() {
                Output::success(&format!("Found {} clips", outcome.clips.len()));

                for clip in &outcome.clips {
                    Output::search_result(
                        &clip.source_title,
                        &format!(
                            "{} - {}",
                            format_timestamp(clip.start_time),
                            format_timestamp(clip.end_time)
                        ),
                        clip.score,
                        &clip.text,
                    );
                }
            } else {
                Output::success(&format!("Found {} results", outcome.results.len()));

                for result in &outcome.results {
                    Output::search_result(
                        &result.chunk.source_title,
                        &result.chunk.format_timestamp(),
                        result.fused_score,
                        &result.chunk.text,
                    );
                }
            }
        }
        Err(KlippError::EmptyCorpus) => {
            Output::info("Nothing indexed yet. Use 'klipp ingest <file>' first.");
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
