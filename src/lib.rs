//! Klipp - topic clips and learning paths from video transcripts
//!
//! Klipp turns timestamped transcript lines into topic chapters, ranks them
//! for a query with a blend of keyword and semantic relevance, and links them
//! into a graph of similar and prerequisite topics across videos.
//!
//! # Architecture
//!
//! - `transcript` - Transcript input model
//! - `lexical` - Tokenizer and BM25 keyword index
//! - `embedding` - Embedding generation
//! - `vector_store` - Vector database abstraction
//! - `search` - Hybrid ranking (score fusion, query expansion)
//! - `segmentation` - Topic segmentation into chapters
//! - `graph` - Relationship builder, learning paths, graph storage
//! - `orchestrator` - Pipeline coordination
//! - `config` - Configuration management
//!
//! # Example
//!
//! ```rust,no_run
//! use klipp::config::Settings;
//! use klipp::orchestrator::Orchestrator;
//! use klipp::transcript::TranscriptBundle;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings).await?;
//!
//!     let bundle = TranscriptBundle::from_file("lectures.json".as_ref())?;
//!     orchestrator.ingest(&bundle).await?;
//!     orchestrator.build_graph(None, None, |_, _| {}).await?;
//!
//!     let outcome = orchestrator.search("ownership and borrowing", 5).await?;
//!     for result in outcome.results {
//!         println!("{} @ {}", result.chunk.source_title, result.chunk.format_timestamp());
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod lexical;
pub mod model;
pub mod openai;
pub mod orchestrator;
pub mod search;
pub mod segmentation;
pub mod transcript;
pub mod vector_store;

pub use error::{KlippError, Result};
