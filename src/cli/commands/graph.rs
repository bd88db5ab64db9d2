//! Graph command implementations.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Rebuild every edge, showing progress of the pairwise pass.
pub async fn run_graph_build(
    threshold: Option<f32>,
    max_connections: Option<usize>,
    settings: Settings,
) -> Result<()> {
    let orchestrator = Orchestrator::new(settings).await?;

    let pb = Output::progress_bar(0, "Comparing chapters");
    let progress = pb.clone();
    let summary = orchestrator
        .build_graph(threshold, max_connections, move |done, total| {
            progress.set_length(total as u64);
            progress.set_position(done as u64);
        })
        .await;
    pb.finish_and_clear();

    let summary = match summary {
        Ok(summary) => summary,
        Err(e) => {
            Output::error(&format!("Graph build failed: {}", e));
            return Err(e.into());
        }
    };

    Output::success(&format!(
        "Graph built: {} chapters, {} edges",
        summary.nodes_created,
        summary.total_edges()
    ));
    for (edge_type, count) in &summary.edges_created {
        Output::kv(edge_type.as_str(), &count.to_string());
    }

    Ok(())
}

/// Print a slice of the graph.
pub async fn run_graph_show(
    source: Option<&str>,
    limit: usize,
    json: bool,
    settings: Settings,
) -> Result<()> {
    let orchestrator = Orchestrator::new(settings).await?;
    let view = orchestrator.get_graph(source, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    Output::header(&format!("Chapters ({})", view.nodes.len()));
    for chapter in &view.nodes {
        Output::chapter(chapter);
    }

    Output::header(&format!("Edges ({})", view.edges.len()));
    for edge in &view.edges {
        Output::edge(edge);
    }

    Ok(())
}
