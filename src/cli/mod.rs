//! CLI module for Klipp.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Klipp - topic clips and learning paths from video transcripts
///
/// Splits transcripts into topic chapters, searches them with hybrid keyword
/// and semantic ranking, and links them into a prerequisite graph.
#[derive(Parser, Debug)]
#[command(name = "klipp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration and create the data directory
    Init,

    /// Segment, embed and index a transcript bundle (JSON)
    Ingest {
        /// Path to the transcript bundle
        file: String,
    },

    /// Search indexed clips
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Build or inspect the topic graph
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Show the learning path leading to a chapter
    Path {
        /// Target chapter id (e.g. "abc123:0002")
        chapter_id: String,

        /// Start from this chapter instead of the nearest root
        #[arg(long)]
        from: Option<String>,
    },

    /// Show graph statistics
    Stats,

    /// List indexed sources
    List,

    /// Drop the keyword index snapshot and rebuild it
    Reindex,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum GraphAction {
    /// Rebuild every relationship between chapters
    Build {
        /// Lower similarity bound (overrides config)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Outgoing edges kept per chapter and type (overrides config)
        #[arg(short, long)]
        max_connections: Option<usize>,
    },

    /// Print chapters and their edges
    Show {
        /// Only chapters of this source (and their neighbors)
        #[arg(short, long)]
        source: Option<String>,

        /// Maximum number of chapters to select
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of a listing
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
