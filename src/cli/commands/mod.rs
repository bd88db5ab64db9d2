//! CLI command implementations.

mod config;
mod graph;
mod ingest;
mod init;
mod list;
mod path;
mod reindex;
mod search;
mod stats;

pub use config::run_config;
pub use graph::{run_graph_build, run_graph_show};
pub use ingest::run_ingest;
pub use init::run_init;
pub use list::run_list;
pub use path::run_path;
pub use reindex::run_reindex;
pub use search::run_search;
pub use stats::run_stats;
