//! Pipeline orchestrator for Klipp.
//!
//! Owns the stores and the two read snapshots (search index and topic graph).
//! Writers rebuild a snapshot off to the side and swap it in with a single
//! pointer replacement, so queries never see a half-built index or graph.

use crate::config::{GraphSettings, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{KlippError, Result};
use crate::graph::{
    builder::count_by_type, build_edges, find_learning_path, find_path_between, BuildSummary, Edge,
    GraphStatistics, GraphView, KnowledgeGraph, SqliteGraphStore,
};
use crate::lexical::LexicalIndex;
use crate::model::{Chapter, Chunk};
use crate::search::{HybridSearcher, SearchOutcome, SearchSnapshot};
use crate::segmentation::TopicSegmenter;
use crate::transcript::TranscriptBundle;
use crate::vector_store::{check_dimensions, IndexedSource, SqliteVectorStore, VectorStore};
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// The main orchestrator for the Klipp pipeline.
pub struct Orchestrator {
    settings: Settings,
    vector_store: Arc<dyn VectorStore>,
    graph_store: Arc<SqliteGraphStore>,
    searcher: HybridSearcher,
    segmenter: TopicSegmenter,
    /// Width every stored embedding must have.
    dimensions: usize,
    /// Where the lexical snapshot lives. `None` keeps it in memory only.
    lexical_path: Option<PathBuf>,
    search_snapshot: RwLock<Arc<SearchSnapshot>>,
    graph: RwLock<Arc<KnowledgeGraph>>,
    /// Serializes ingestion and graph rebuilds.
    writer: Mutex<()>,
}

impl Orchestrator {
    /// Create an orchestrator backed by the configured SQLite file and OpenAI embedder.
    pub async fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let embedder = Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            settings.embedding.dimensions as usize,
        )?);
        let sqlite_path = settings.sqlite_path();
        let vector_store = Arc::new(SqliteVectorStore::new(&sqlite_path)?);
        let graph_store = Arc::new(SqliteGraphStore::new(&sqlite_path)?);
        let lexical_path = Some(settings.lexical_index_path());

        Self::with_components(settings, embedder, vector_store, graph_store, lexical_path).await
    }

    /// Create an orchestrator with custom components and load its snapshots.
    pub async fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        graph_store: Arc<SqliteGraphStore>,
        lexical_path: Option<PathBuf>,
    ) -> Result<Self> {
        settings.validate()?;

        let searcher = HybridSearcher::new(
            settings.search.clone(),
            embedder.clone(),
            vector_store.clone(),
        );
        let dimensions = embedder.dimensions();
        let segmenter = TopicSegmenter::new(settings.segmentation.clone(), embedder);
        let empty = SearchSnapshot::empty(settings.lexical.k1, settings.lexical.b);

        let orchestrator = Self {
            settings,
            vector_store,
            graph_store,
            searcher,
            segmenter,
            dimensions,
            lexical_path,
            search_snapshot: RwLock::new(Arc::new(empty)),
            graph: RwLock::new(Arc::new(KnowledgeGraph::default())),
            writer: Mutex::new(()),
        };

        orchestrator.refresh_search_snapshot().await?;
        orchestrator.refresh_graph_snapshot()?;
        Ok(orchestrator)
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Current search snapshot.
    pub fn search_snapshot(&self) -> Result<Arc<SearchSnapshot>> {
        self.search_snapshot
            .read()
            .map(|guard| guard.clone())
            .map_err(|e| KlippError::LexicalIndex(format!("Failed to acquire lock: {}", e)))
    }

    /// Current graph snapshot.
    pub fn graph(&self) -> Result<Arc<KnowledgeGraph>> {
        self.graph
            .read()
            .map(|guard| guard.clone())
            .map_err(|e| KlippError::GraphStore(format!("Failed to acquire lock: {}", e)))
    }

    fn swap_search_snapshot(&self, snapshot: SearchSnapshot) -> Result<()> {
        let mut guard = self
            .search_snapshot
            .write()
            .map_err(|e| KlippError::LexicalIndex(format!("Failed to acquire lock: {}", e)))?;
        *guard = Arc::new(snapshot);
        Ok(())
    }

    fn swap_graph(&self, graph: KnowledgeGraph) -> Result<()> {
        let mut guard = self
            .graph
            .write()
            .map_err(|e| KlippError::GraphStore(format!("Failed to acquire lock: {}", e)))?;
        *guard = Arc::new(graph);
        Ok(())
    }

    /// Rebuild the keyword index from the vector store's chunks and swap it in.
    async fn refresh_search_snapshot(&self) -> Result<()> {
        let chunks = self.vector_store.all_chunks().await?;
        let path = self.lexical_path.clone();
        let (k1, b) = (self.settings.lexical.k1, self.settings.lexical.b);

        let snapshot = tokio::task::spawn_blocking(move || -> Result<SearchSnapshot> {
            let index = match path {
                Some(path) => LexicalIndex::open_or_build(&path, &chunks, k1, b)?,
                None => LexicalIndex::build(&chunks, k1, b),
            };
            Ok(SearchSnapshot::new(index, chunks))
        })
        .await
        .map_err(|e| KlippError::LexicalIndex(format!("Index build task failed: {}", e)))??;

        info!("Search snapshot holds {} chunks", snapshot.len());
        self.swap_search_snapshot(snapshot)
    }

    /// Reload chapters, keeping only edges whose endpoints still exist.
    fn refresh_graph_snapshot(&self) -> Result<()> {
        let stored = self.graph_store.load_graph()?;
        let ids: HashSet<&str> = stored.chapters().map(|c| c.id()).collect();
        let edges = stored
            .edges()
            .iter()
            .filter(|e| ids.contains(e.from.as_str()) && ids.contains(e.to.as_str()))
            .cloned()
            .collect();
        let chapters = stored.chapters().cloned().collect();

        self.swap_graph(KnowledgeGraph::new(chapters, edges, stored.built_at()))
    }

    /// Segment, embed and index every source in `bundle`.
    ///
    /// A source that was ingested before is replaced. Every source is
    /// segmented before any store is touched; each source then commits on its
    /// own, so a failure leaves earlier sources replaced and later ones as
    /// they were. The snapshots are refreshed either way.
    #[instrument(skip(self, bundle), fields(lines = bundle.lines.len()))]
    pub async fn ingest(&self, bundle: &TranscriptBundle) -> Result<IngestReport> {
        let groups = bundle.group_by_source()?;
        let _writer = self.writer.lock().await;

        let mut segmented = Vec::with_capacity(groups.len());
        for (source, lines) in groups {
            let chapters = self.segmenter.segment(&source, &lines).await?;
            let chunks: Vec<Chunk> = chapters.iter().map(|c| c.chunk.clone()).collect();
            check_dimensions(&chunks, Some(self.dimensions))?;
            segmented.push((source, chapters, chunks));
        }

        let mut report = IngestReport::default();
        let mut written = Ok(());
        for (source, chapters, chunks) in segmented {
            written = self.write_source(&source.id, &chapters, &chunks).await;
            if written.is_err() {
                break;
            }

            info!("Ingested {} ({} chapters)", source.id, chapters.len());
            report.sources.push(IngestedSource {
                source_id: source.id,
                title: source.title,
                chapters: chapters.len(),
            });
        }

        let refreshed = match self.refresh_search_snapshot().await {
            Ok(()) => self.refresh_graph_snapshot(),
            Err(e) => Err(e),
        };
        written?;
        refreshed?;
        Ok(report)
    }

    /// Replace one source in both stores.
    ///
    /// If the graph store rejects the chapters, the source's previous chunks
    /// are put back so the two stores keep describing the same corpus.
    async fn write_source(&self, source_id: &str, chapters: &[Chapter], chunks: &[Chunk]) -> Result<()> {
        let previous = self.vector_store.get_by_source(source_id).await?;
        self.vector_store.replace_source(source_id, chunks).await?;

        if let Err(e) = self.graph_store.replace_source_chapters(source_id, chapters) {
            warn!("Graph store rejected {}, restoring its chunks: {}", source_id, e);
            if let Err(restore) = self.vector_store.replace_source(source_id, &previous).await {
                warn!("Could not restore chunks of {}: {}", source_id, restore);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Hybrid search over the current snapshot.
    ///
    /// Fails with `EmptyCorpus` when nothing has been ingested, so callers can
    /// tell that apart from a query without matches.
    pub async fn search(&self, query: &str, k: usize) -> Result<SearchOutcome> {
        let snapshot = self.search_snapshot()?;
        if snapshot.is_empty() {
            return Err(KlippError::EmptyCorpus);
        }
        self.searcher.search(&snapshot, query, k).await
    }

    /// Rebuild every edge from the stored chapters.
    ///
    /// The pairwise pass runs on a blocking thread and calls `progress` with
    /// `(done, total)` as it goes. Searches and graph reads keep using the
    /// previous graph until the new one is swapped in.
    pub async fn build_graph<F>(
        &self,
        similarity_threshold: Option<f32>,
        max_connections: Option<usize>,
        progress: F,
    ) -> Result<BuildSummary>
    where
        F: FnMut(usize, usize) + Send + 'static,
    {
        let graph_settings = GraphSettings {
            similarity_threshold: similarity_threshold
                .unwrap_or(self.settings.graph.similarity_threshold),
            max_connections: max_connections.unwrap_or(self.settings.graph.max_connections),
            ..self.settings.graph.clone()
        };
        graph_settings.validate()?;

        let _writer = self.writer.lock().await;
        let chapters = self.graph_store.all_chapters()?;
        if chapters.is_empty() {
            return Err(KlippError::EmptyCorpus);
        }

        info!(
            "Building graph over {} chapters (threshold {}, max connections {})",
            chapters.len(),
            graph_settings.similarity_threshold,
            graph_settings.max_connections
        );
        let (chapters, edges) =
            tokio::task::spawn_blocking(move || -> Result<(Vec<Chapter>, Vec<Edge>)> {
                let edges = build_edges(&chapters, &graph_settings, progress)?;
                Ok((chapters, edges))
            })
        .await
        .map_err(|e| KlippError::GraphStore(format!("Graph build task failed: {}", e)))??;

        let built_at = Utc::now();
        self.graph_store.replace_edges(&edges, built_at)?;

        let summary = BuildSummary {
            nodes_created: chapters.len(),
            edges_created: count_by_type(&edges),
        };
        info!(
            "Graph built: {} nodes, {} edges",
            summary.nodes_created,
            summary.total_edges()
        );

        self.swap_graph(KnowledgeGraph::new(chapters, edges, Some(built_at)))?;
        Ok(summary)
    }

    /// Nodes and edges for display.
    pub fn get_graph(&self, source_id: Option<&str>, limit: usize) -> Result<GraphView> {
        self.graph()?.view(source_id, limit)
    }

    /// Prerequisite chain ending at `target_chapter_id`.
    pub fn get_learning_path(&self, target_chapter_id: &str) -> Result<Vec<Chapter>> {
        let graph = self.graph()?;
        find_learning_path(&graph, target_chapter_id)
    }

    /// Shortest chain between two given chapters.
    pub fn get_path_between(&self, start_id: &str, target_id: &str) -> Result<Vec<Chapter>> {
        let graph = self.graph()?;
        find_path_between(&graph, start_id, target_id)
    }

    pub fn statistics(&self) -> Result<GraphStatistics> {
        Ok(self.graph()?.statistics())
    }

    pub async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        self.vector_store.list_sources().await
    }

    /// Drop the persisted keyword snapshot and rebuild it from the stored chunks.
    pub async fn rebuild_index(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        if let Some(path) = &self.lexical_path {
            LexicalIndex::clear_snapshot(path)?;
        }
        self.refresh_search_snapshot().await
    }
}

/// Per-source ingestion outcome.
#[derive(Debug, Clone)]
pub struct IngestedSource {
    pub source_id: String,
    pub title: String,
    pub chapters: usize,
}

/// Result of an ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub sources: Vec<IngestedSource>,
}

impl IngestReport {
    pub fn total_chapters(&self) -> usize {
        self.sources.iter().map(|s| s.chapters).sum()
    }
}
