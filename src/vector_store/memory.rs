//! In-memory vector store implementation.
//!
//! Useful for testing and small datasets.

use super::{check_dimensions, rank_chunks, IndexedSource, QueryFilter, VectorMatch, VectorStore};
use crate::error::{KlippError, Result};
use crate::model::Chunk;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory vector store.
pub struct MemoryVectorStore {
    chunks: RwLock<BTreeMap<String, (Chunk, DateTime<Utc>)>>,
}

impl MemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, (Chunk, DateTime<Utc>)>>> {
        self.chunks
            .read()
            .map_err(|e| KlippError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, (Chunk, DateTime<Utc>)>>> {
        self.chunks
            .write()
            .map_err(|e| KlippError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn replace_source(&self, source_id: &str, chunks: &[Chunk]) -> Result<usize> {
        let mut store = self.write()?;
        let stored = store
            .values()
            .find(|(c, _)| c.source_id != source_id)
            .map(|(c, _)| c.embedding.len());
        check_dimensions(chunks, stored)?;
        if let Some(stray) = chunks.iter().find(|c| c.source_id != source_id) {
            return Err(KlippError::InvalidInput(format!(
                "chunk {} does not belong to source {}",
                stray.id, source_id
            )));
        }

        store.retain(|_, (chunk, _)| chunk.source_id != source_id);
        let now = Utc::now();
        for chunk in chunks {
            store.insert(chunk.id.clone(), (chunk.clone(), now));
        }
        Ok(chunks.len())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<VectorMatch>> {
        let store = self.read()?;
        Ok(rank_chunks(store.values().map(|(c, _)| c), embedding, k, filter))
    }

    async fn get_by_source(&self, source_id: &str) -> Result<Vec<Chunk>> {
        let store = self.read()?;
        let mut result: Vec<Chunk> = store
            .values()
            .filter(|(c, _)| c.source_id == source_id)
            .map(|(c, _)| c.clone())
            .collect();
        result.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        Ok(result)
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let store = self.read()?;
        Ok(store.values().map(|(c, _)| c.clone()).collect())
    }

    async fn list_sources(&self) -> Result<Vec<IndexedSource>> {
        let store = self.read()?;

        let mut sources: HashMap<String, IndexedSource> = HashMap::new();

        for (chunk, indexed_at) in store.values() {
            let entry = sources
                .entry(chunk.source_id.clone())
                .or_insert_with(|| IndexedSource {
                    source_id: chunk.source_id.clone(),
                    source_title: chunk.source_title.clone(),
                    chunk_count: 0,
                    total_duration_seconds: 0.0,
                    indexed_at: *indexed_at,
                });

            entry.chunk_count += 1;
            if chunk.end_time > entry.total_duration_seconds {
                entry.total_duration_seconds = chunk.end_time;
            }
            if *indexed_at > entry.indexed_at {
                entry.indexed_at = *indexed_at;
            }
        }

        let mut sources: Vec<IndexedSource> = sources.into_values().collect();
        sources.sort_by(|a, b| {
            b.indexed_at
                .cmp(&a.indexed_at)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        Ok(sources)
    }
}
