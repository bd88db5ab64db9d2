//! Stats command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the stats command.
pub async fn run_stats(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings).await?;
    let stats = orchestrator.statistics()?;

    Output::header("Topic Graph");
    Output::kv("Chapters", &stats.total_chapters.to_string());
    Output::kv("Sources", &stats.total_sources.to_string());
    for (edge_type, count) in &stats.edge_counts {
        Output::kv(edge_type.as_str(), &count.to_string());
    }
    Output::kv(
        "Avg similarity links",
        &format!("{:.2}", stats.avg_similarity_connections),
    );
    Output::kv(
        "Built at",
        &stats
            .built_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string()),
    );

    if !orchestrator.graph()?.is_built() && stats.total_chapters > 0 {
        println!();
        Output::info("No relationships yet. Run 'klipp graph build'.");
    }

    Ok(())
}
