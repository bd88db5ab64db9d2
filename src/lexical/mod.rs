//! BM25 keyword index over chunk text.
//!
//! The index is an immutable value: rebuilding produces a new index which the
//! caller swaps in. A JSON snapshot stamped with a fingerprint of the chunk set
//! lets a restart skip the rebuild when nothing changed.

mod tokenizer;

pub use tokenizer::tokenize;

use crate::error::{KlippError, Result};
use crate::model::Chunk;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001B3;

/// Occurrences of one term in one document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Posting {
    doc: u32,
    tf: u32,
}

/// Okapi BM25 index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalIndex {
    k1: f32,
    b: f32,
    /// Chunk ids, sorted. Postings refer to positions in this list.
    doc_ids: Vec<String>,
    doc_lengths: Vec<u32>,
    avg_doc_length: f32,
    postings: BTreeMap<String, Vec<Posting>>,
    fingerprint: u64,
}

impl LexicalIndex {
    /// An index with no documents. Every query returns nothing.
    pub fn empty(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            doc_ids: Vec::new(),
            doc_lengths: Vec::new(),
            avg_doc_length: 0.0,
            postings: BTreeMap::new(),
            fingerprint: fingerprint(&[]),
        }
    }

    /// Build an index from scratch over `chunks`.
    #[instrument(skip(chunks), fields(count = chunks.len()))]
    pub fn build(chunks: &[Chunk], k1: f32, b: f32) -> Self {
        let mut sorted: Vec<&Chunk> = chunks.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        sorted.dedup_by(|a, b| a.id == b.id);

        let mut index = Self::empty(k1, b);
        let mut total_length: u64 = 0;

        for (doc, chunk) in sorted.iter().enumerate() {
            let tokens = tokenize(&chunk.indexed_text());
            let mut counts: BTreeMap<String, u32> = BTreeMap::new();
            for token in &tokens {
                *counts.entry(token.clone()).or_insert(0) += 1;
            }
            for (term, tf) in counts {
                index.postings.entry(term).or_default().push(Posting {
                    doc: doc as u32,
                    tf,
                });
            }

            index.doc_ids.push(chunk.id.clone());
            index.doc_lengths.push(tokens.len() as u32);
            total_length += tokens.len() as u64;
        }

        if !index.doc_ids.is_empty() {
            index.avg_doc_length = total_length as f32 / index.doc_ids.len() as f32;
        }
        index.fingerprint = fingerprint(chunks);

        debug!(
            "Built lexical index: {} documents, {} terms",
            index.doc_ids.len(),
            index.postings.len()
        );
        index
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Fingerprint of the chunk set this index was built from.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn idf(&self, doc_freq: usize) -> f32 {
        let n = self.doc_ids.len() as f32;
        let df = doc_freq as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Return up to `k` chunk ids with their raw BM25 scores, best first.
    ///
    /// Each distinct query term counts once. Only documents matching at least
    /// one term are returned; ties are broken by chunk id.
    pub fn query(&self, text: &str, k: usize) -> Vec<(String, f32)> {
        if self.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut scores = vec![0.0f32; self.doc_ids.len()];
        let mut matched = vec![false; self.doc_ids.len()];

        for term in tokenize(text) {
            if !seen.insert(term.clone()) {
                continue;
            }
            let Some(postings) = self.postings.get(&term) else {
                continue;
            };

            let idf = self.idf(postings.len());
            for posting in postings {
                let doc = posting.doc as usize;
                let tf = posting.tf as f32;
                let length_ratio = if self.avg_doc_length > 0.0 {
                    self.doc_lengths[doc] as f32 / self.avg_doc_length
                } else {
                    1.0
                };
                let norm = self.k1 * (1.0 - self.b + self.b * length_ratio);
                scores[doc] += idf * tf * (self.k1 + 1.0) / (tf + norm);
                matched[doc] = true;
            }
        }

        let mut results: Vec<(String, f32)> = scores
            .into_iter()
            .enumerate()
            .filter(|(doc, score)| matched[*doc] && *score > 0.0)
            .map(|(doc, score)| (self.doc_ids[doc].clone(), score))
            .collect();

        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        results.truncate(k);
        results
    }

    /// Persist the index as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        debug!("Saved lexical index to {:?}", path);
        Ok(())
    }

    /// Load a previously saved index.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            KlippError::LexicalIndex(format!("Corrupt snapshot at {:?}: {}", path, e))
        })
    }

    /// Reuse the snapshot at `path` if it was built from exactly `chunks`
    /// with the same parameters, otherwise rebuild and overwrite it.
    #[instrument(skip(chunks), fields(count = chunks.len()))]
    pub fn open_or_build(path: &Path, chunks: &[Chunk], k1: f32, b: f32) -> Result<Self> {
        let expected = fingerprint(chunks);

        if path.exists() {
            match Self::load(path) {
                Ok(index) if index.fingerprint == expected && index.k1 == k1 && index.b == b => {
                    info!("Reusing lexical index snapshot ({} documents)", index.len());
                    return Ok(index);
                }
                Ok(_) => info!("Chunk set changed, rebuilding lexical index"),
                Err(e) => warn!("Ignoring unreadable lexical snapshot: {}", e),
            }
        }

        let index = Self::build(chunks, k1, b);
        index.save(path)?;
        Ok(index)
    }

    /// Remove a persisted snapshot. Returns whether one existed.
    pub fn clear_snapshot(path: &Path) -> Result<bool> {
        if path.exists() {
            std::fs::remove_file(path)?;
            info!("Cleared lexical index snapshot at {:?}", path);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// FNV-1a over the sorted chunk ids and indexed text.
pub fn fingerprint(chunks: &[Chunk]) -> u64 {
    let mut sorted: Vec<&Chunk> = chunks.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hash = FNV_OFFSET;
    let mut feed = |bytes: &[u8]| {
        for &byte in bytes {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        // field separator
        hash ^= 0xff;
        hash = hash.wrapping_mul(FNV_PRIME);
    };

    for chunk in sorted {
        feed(chunk.id.as_bytes());
        feed(chunk.indexed_text().as_bytes());
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, title: &str, text: &str) -> Chunk {
        Chunk::new(
            id.to_string(),
            format!("src-{}", id),
            title.to_string(),
            text.to_string(),
            0.0,
            30.0,
            vec![],
        )
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            chunk("c1", "OOP basics", "object oriented design with classes"),
            chunk("c2", "Cooking tips", "how to boil pasta and season sauce"),
            chunk("c3", "Rust ownership", "borrowing rules and lifetimes for objects"),
        ]
    }

    #[test]
    fn test_query_ranks_matching_document_first() {
        let index = LexicalIndex::build(&corpus(), 1.5, 0.75);
        let results = index.query("OOP classes", 10);
        assert_eq!(results[0].0, "c1");
        assert!(results.iter().all(|(id, _)| id != "c2"));
    }

    #[test]
    fn test_title_terms_are_searchable() {
        let index = LexicalIndex::build(&corpus(), 1.5, 0.75);
        let results = index.query("cooking", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "c2");
    }

    #[test]
    fn test_results_bounded_and_from_corpus() {
        let chunks = corpus();
        let index = LexicalIndex::build(&chunks, 1.5, 0.75);
        let ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();

        for query in ["objects", "and rules", "pasta sauce classes", "nothing here"] {
            let results = index.query(query, 2);
            assert!(results.len() <= 2);
            assert!(results.iter().all(|(id, _)| ids.contains(id.as_str())));
        }
    }

    #[test]
    fn test_ties_broken_by_id() {
        let chunks = vec![chunk("b", "t", "same words"), chunk("a", "t", "same words")];
        let index = LexicalIndex::build(&chunks, 1.5, 0.75);
        let results = index.query("same", 10);
        assert_eq!(results[0].0, "a");
        assert_eq!(results[1].0, "b");
        assert_eq!(results[0].1, results[1].1);
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = LexicalIndex::build(&[], 1.5, 0.75);
        assert!(index.is_empty());
        assert!(index.query("anything", 5).is_empty());
    }

    #[test]
    fn test_rebuild_is_identical() {
        let mut chunks = corpus();
        let a = LexicalIndex::build(&chunks, 1.5, 0.75);
        chunks.reverse();
        let b = LexicalIndex::build(&chunks, 1.5, 0.75);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.query("objects", 10), b.query("objects", 10));
    }

    #[test]
    fn test_fingerprint_tracks_text() {
        let mut chunks = corpus();
        let before = fingerprint(&chunks);
        chunks[0].text.push_str(" more");
        assert_ne!(before, fingerprint(&chunks));
    }

    #[test]
    fn test_snapshot_reused_when_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lexical.json");
        let chunks = corpus();

        let built = LexicalIndex::open_or_build(&path, &chunks, 1.5, 0.75).unwrap();
        assert!(path.exists());
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        let reopened = LexicalIndex::open_or_build(&path, &chunks, 1.5, 0.75).unwrap();
        assert_eq!(reopened.fingerprint(), built.fingerprint());
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
        assert_eq!(reopened.query("pasta", 5), built.query("pasta", 5));
    }

    #[test]
    fn test_snapshot_rebuilt_when_chunks_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lexical.json");
        let mut chunks = corpus();
        LexicalIndex::open_or_build(&path, &chunks, 1.5, 0.75).unwrap();

        chunks.push(chunk("c4", "Pasta", "fresh pasta from scratch"));
        let rebuilt = LexicalIndex::open_or_build(&path, &chunks, 1.5, 0.75).unwrap();
        assert_eq!(rebuilt.len(), 4);
        assert_eq!(LexicalIndex::load(&path).unwrap().len(), 4);
    }

    #[test]
    fn test_corrupt_snapshot_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lexical.json");
        std::fs::write(&path, b"not json").unwrap();

        let index = LexicalIndex::open_or_build(&path, &corpus(), 1.5, 0.75).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_clear_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lexical.json");
        LexicalIndex::build(&corpus(), 1.5, 0.75).save(&path).unwrap();

        assert!(LexicalIndex::clear_snapshot(&path).unwrap());
        assert!(!LexicalIndex::clear_snapshot(&path).unwrap());
    }
}
