//! Hybrid retrieval: BM25 and vector search fused into one ranking.

pub mod fusion;
pub mod merge;
pub mod query;

use crate::config::SearchSettings;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::lexical::{tokenize, LexicalIndex};
use crate::model::Chunk;
use crate::vector_store::{QueryFilter, VectorStore};
use fusion::{apply_title_boost, fuse, min_max_normalize, top_k};
use merge::{merge_clips, MergedClip};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A search hit. Scores are the normalized per-signal values.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub chunk: Chunk,
    pub lexical_score: Option<f32>,
    pub semantic_score: Option<f32>,
    pub fused_score: f32,
}

/// Results of one search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<RankedResult>,
    /// The semantic leg failed and the ranking is keyword-only.
    pub degraded: bool,
    /// Hits merged into padded clips, when clip merging is enabled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clips: Vec<MergedClip>,
}

/// Immutable view of the searchable corpus.
///
/// Rebuilds produce a new snapshot; searches in flight keep the old one.
#[derive(Debug)]
pub struct SearchSnapshot {
    pub index: LexicalIndex,
    chunks: HashMap<String, Chunk>,
    /// Latest end time seen per source.
    durations: HashMap<String, f64>,
}

impl SearchSnapshot {
    pub fn new(index: LexicalIndex, chunks: Vec<Chunk>) -> Self {
        let mut durations: HashMap<String, f64> = HashMap::new();
        for chunk in &chunks {
            let longest = durations.entry(chunk.source_id.clone()).or_insert(0.0);
            *longest = longest.max(chunk.end_time);
        }
        Self {
            index,
            chunks: chunks.into_iter().map(|c| (c.id.clone(), c)).collect(),
            durations,
        }
    }

    pub fn empty(k1: f32, b: f32) -> Self {
        Self::new(LexicalIndex::empty(k1, b), Vec::new())
    }

    pub fn get(&self, chunk_id: &str) -> Option<&Chunk> {
        self.chunks.get(chunk_id)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Runs the keyword and semantic lookups concurrently and fuses them.
pub struct HybridSearcher {
    settings: SearchSettings,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl HybridSearcher {
    pub fn new(
        settings: SearchSettings,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            settings,
            embedder,
            store,
        }
    }

    /// Semantic leg: embed the query and ask the store for neighbors.
    async fn semantic_candidates(&self, query: &str, fetch: usize) -> Result<Vec<(String, f32)>> {
        let embedding = self.embedder.embed(query).await?;
        let matches = self
            .store
            .query(&embedding, fetch, &QueryFilter::default())
            .await?;

        let scale = self.store.similarity_scale();
        Ok(matches
            .into_iter()
            .map(|m| (m.chunk_id, scale.to_unit(m.similarity)))
            .collect())
    }

    /// Search `snapshot` for `query`, returning at most `k` results.
    ///
    /// A failing embedder or vector store degrades the search to keyword-only
    /// instead of failing it.
    #[instrument(skip(self, snapshot))]
    pub async fn search(
        &self,
        snapshot: &SearchSnapshot,
        query: &str,
        k: usize,
    ) -> Result<SearchOutcome> {
        self.settings.validate()?;

        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || k == 0 {
            return Ok(SearchOutcome::default());
        }

        let fetch = k.saturating_mul(self.settings.overfetch_factor);
        let lexical_query = if self.settings.expand_abbreviations {
            query::expand_abbreviations(query)
        } else {
            query.to_string()
        };

        let (lexical, semantic) = tokio::join!(
            async { snapshot.index.query(&lexical_query, fetch) },
            self.semantic_candidates(query, fetch)
        );

        let (semantic, degraded) = match semantic {
            Ok(candidates) => (candidates, false),
            Err(e) => {
                warn!("Semantic search unavailable, falling back to keyword ranking: {}", e);
                (Vec::new(), true)
            }
        };

        // The store may hold chunks the snapshot does not know yet.
        let semantic: Vec<(String, f32)> = semantic
            .into_iter()
            .filter(|(id, _)| snapshot.get(id).is_some())
            .collect();

        debug!(
            "Candidates: {} lexical, {} semantic",
            lexical.len(),
            semantic.len()
        );

        let mut merged = fuse(
            &min_max_normalize(&lexical),
            &min_max_normalize(&semantic),
            self.settings.lexical_weight,
            self.settings.semantic_weight,
        );

        let query_terms: HashSet<String> = query_tokens.into_iter().collect();
        let mut title_hits: HashMap<String, bool> = HashMap::new();
        apply_title_boost(&mut merged, self.settings.title_boost, |id| {
            let Some(chunk) = snapshot.get(id) else {
                return false;
            };
            *title_hits
                .entry(chunk.source_id.clone())
                .or_insert_with(|| {
                    tokenize(&chunk.source_title)
                        .iter()
                        .any(|t| query_terms.contains(t))
                })
        });

        let ranked = top_k(merged, usize::MAX);

        let clips = if self.settings.merge_clips {
            let hits: Vec<(&Chunk, f32)> = ranked
                .iter()
                .filter_map(|(id, score)| snapshot.get(id).map(|c| (c, score.fused)))
                .collect();
            let mut clips = merge_clips(&hits, &snapshot.durations, &self.settings);
            clips.truncate(k);
            clips
        } else {
            Vec::new()
        };

        let results = ranked
            .into_iter()
            .take(k)
            .filter_map(|(id, score)| {
                snapshot.get(&id).map(|chunk| RankedResult {
                    chunk: chunk.clone(),
                    lexical_score: score.lexical,
                    semantic_score: score.semantic,
                    fused_score: score.fused,
                })
            })
            .collect();

        Ok(SearchOutcome {
            results,
            degraded,
            clips,
        })
    }
}
