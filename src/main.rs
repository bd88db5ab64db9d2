//! Klipp CLI entry point.

use anyhow::Result;
use clap::Parser;
use klipp::cli::{commands, Cli, Commands, GraphAction};
use klipp::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("klipp={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };
    settings.validate()?;

    std::fs::create_dir_all(settings.data_dir())?;

    match &cli.command {
        Commands::Init => {
            commands::run_init(&settings)?;
        }

        Commands::Ingest { file } => {
            commands::run_ingest(file, settings).await?;
        }

        Commands::Search { query, limit } => {
            commands::run_search(query, *limit, settings).await?;
        }

        Commands::Graph { action } => match action {
            GraphAction::Build {
                threshold,
                max_connections,
            } => {
                commands::run_graph_build(*threshold, *max_connections, settings).await?;
            }
            GraphAction::Show {
                source,
                limit,
                json,
            } => {
                commands::run_graph_show(source.as_deref(), *limit, *json, settings).await?;
            }
        },

        Commands::Path { chapter_id, from } => {
            commands::run_path(chapter_id, from.as_deref(), settings).await?;
        }

        Commands::Stats => {
            commands::run_stats(settings).await?;
        }

        Commands::List => {
            commands::run_list(settings).await?;
        }

        Commands::Reindex => {
            commands::run_reindex(settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings)?;
        }
    }

    Ok(())
}
