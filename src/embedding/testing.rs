//! Deterministic embedders for tests.

use super::Embedder;
use crate::error::{KlippError, Result};
use crate::lexical::tokenize;
use async_trait::async_trait;

/// Maps text onto one dimension per topic, counting the topic's words.
///
/// Texts sharing a topic get a high cosine similarity, unrelated texts get 0.
pub struct KeywordBagEmbedder {
    topics: Vec<Vec<String>>,
}

impl KeywordBagEmbedder {
    pub fn new(topics: &[&[&str]]) -> Self {
        Self {
            topics: topics
                .iter()
                .map(|words| words.iter().map(|w| w.to_string()).collect())
                .collect(),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector: Vec<f32> = self
            .topics
            .iter()
            .map(|words| tokens.iter().filter(|t| words.contains(t)).count() as f32)
            .collect();

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for KeywordBagEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.topics.len()
    }
}

/// Always fails, as if the embedding service were down.
pub struct UnreachableEmbedder;

#[async_trait]
impl Embedder for UnreachableEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(KlippError::UpstreamUnavailable("connection refused".to_string()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(KlippError::UpstreamUnavailable("connection refused".to_string()))
    }

    fn dimensions(&self) -> usize {
        0
    }
}
