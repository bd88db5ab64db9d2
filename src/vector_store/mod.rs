//! Vector store abstraction for Klipp.
//!
//! The nearest-neighbor store is an external collaborator. This module pins
//! down the narrow contract the search engine relies on and ships two
//! backends: an in-memory one and a SQLite one.

mod memory;
mod sqlite;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::error::{KlippError, Result};
use crate::model::Chunk;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Range of the similarity values a store reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityScale {
    /// Raw cosine similarity in [-1, 1].
    #[default]
    Cosine,
    /// Already normalized to [0, 1].
    Unit,
}

impl SimilarityScale {
    /// Map a reported similarity onto [0, 1].
    pub fn to_unit(self, similarity: f32) -> f32 {
        match self {
            SimilarityScale::Cosine => ((similarity + 1.0) / 2.0).clamp(0.0, 1.0),
            SimilarityScale::Unit => similarity.clamp(0.0, 1.0),
        }
    }
}

/// A raw semantic match.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub chunk_id: String,
    pub similarity: f32,
}

/// Optional metadata filters for a vector query.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Restrict matches to these sources.
    pub source_ids: Option<Vec<String>>,
    /// Drop matches below this similarity.
    pub min_similarity: Option<f32>,
}

impl QueryFilter {
    fn admits_source(&self, source_id: &str) -> bool {
        self.source_ids
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == source_id))
    }

    fn admits_similarity(&self, similarity: f32) -> bool {
        self.min_similarity.map_or(true, |min| similarity >= min)
    }
}

/// Summary information about an indexed video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedSource {
    pub source_id: String,
    pub source_title: String,
    pub chunk_count: u32,
    pub total_duration_seconds: f64,
    pub indexed_at: DateTime<Utc>,
}

/// Trait for vector store implementations.
///
/// Every chunk in a store shares one embedding dimensionality.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Swap every chunk of `source_id` for `chunks` in one atomic step.
    ///
    /// Fails with `InvalidInput`, leaving the store untouched, when the
    /// embeddings differ in length from each other or from the other sources.
    async fn replace_source(&self, source_id: &str, chunks: &[Chunk]) -> Result<usize>;

    /// Top-k nearest chunks by cosine similarity.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<VectorMatch>>;

    /// Get all chunks for a source, ordered by start time.
    async fn get_by_source(&self, source_id: &str) -> Result<Vec<Chunk>>;

    /// Get every chunk in the store, ordered by id.
    async fn all_chunks(&self) -> Result<Vec<Chunk>>;

    /// List all indexed sources.
    async fn list_sources(&self) -> Result<Vec<IndexedSource>>;

    /// Range of the similarities returned by `query`.
    fn similarity_scale(&self) -> SimilarityScale {
        SimilarityScale::Cosine
    }
}

/// Reject a batch whose embeddings are not all `stored` long.
///
/// With nothing stored yet the first chunk sets the dimensionality.
pub(crate) fn check_dimensions(chunks: &[Chunk], stored: Option<usize>) -> Result<()> {
    let Some(expected) = stored.or_else(|| chunks.first().map(|c| c.embedding.len())) else {
        return Ok(());
    };
    match chunks.iter().find(|c| c.embedding.len() != expected) {
        Some(bad) => Err(KlippError::InvalidInput(format!(
            "chunk {} has {} embedding dimensions, the corpus uses {}",
            bad.id,
            bad.embedding.len(),
            expected
        ))),
        None => Ok(()),
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Score every candidate, apply the filter and keep the best `k`.
///
/// Ties are broken by chunk id so results are stable across runs.
pub(crate) fn rank_chunks<'a, I>(
    candidates: I,
    embedding: &[f32],
    k: usize,
    filter: &QueryFilter,
) -> Vec<VectorMatch>
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let mut matches: Vec<VectorMatch> = candidates
        .into_iter()
        .filter(|chunk| filter.admits_source(&chunk.source_id))
        .map(|chunk| VectorMatch {
            chunk_id: chunk.id.clone(),
            similarity: cosine_similarity(embedding, &chunk.embedding),
        })
        .filter(|m| filter.admits_similarity(m.similarity))
        .collect();

    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    matches.truncate(k);
    matches
}
