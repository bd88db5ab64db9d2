//! Path command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the path command.
pub async fn run_path(chapter_id: &str, from: Option<&str>, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings).await?;

    let path = match from {
        Some(start) => orchestrator.get_path_between(start, chapter_id)?,
        None => orchestrator.get_learning_path(chapter_id)?,
    };

    if path.is_empty() {
        Output::warning("No path connects these chapters.");
        return Ok(());
    }

    Output::header(&format!("Learning path to {} ({} steps)", chapter_id, path.len()));
    for (step, chapter) in path.iter().enumerate() {
        print!("{:>3}.", step + 1);
        Output::chapter(chapter);
    }

    if path.len() == 1 && from.is_none() && !orchestrator.graph()?.is_built() {
        println!();
        Output::info("The graph has no relationships yet. Run 'klipp graph build'.");
    }

    Ok(())
}
