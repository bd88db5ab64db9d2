//! Topic graph over chapters.
//!
//! `builder` derives edges from a chapter set, `path` answers prerequisite
//! queries, `store` persists both. `KnowledgeGraph` is the immutable snapshot
//! the orchestrator swaps in after every rebuild.

pub mod builder;
pub mod path;
mod store;

pub use builder::build_edges;
pub use path::{find_learning_path, find_path_between};
pub use store::SqliteGraphStore;

use crate::error::{KlippError, Result};
use crate::model::{Chapter, ChapterLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Kind of relationship between two chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Consecutive chapters of the same source.
    NextTopic,
    /// Similarity at or above the high threshold.
    SimilarTo,
    /// Similarity in the band below the high threshold.
    RelatesTo,
    /// Earlier chapter that should be watched before a similar later one.
    PrerequisiteOf,
}

impl EdgeType {
    pub const ALL: [EdgeType; 4] = [
        EdgeType::NextTopic,
        EdgeType::SimilarTo,
        EdgeType::RelatesTo,
        EdgeType::PrerequisiteOf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeType::NextTopic => "NEXT_TOPIC",
            EdgeType::SimilarTo => "SIMILAR_TO",
            EdgeType::RelatesTo => "RELATES_TO",
            EdgeType::PrerequisiteOf => "PREREQUISITE_OF",
        }
    }

    /// Whether the fan-out cap applies to this type.
    pub fn is_capped(self) -> bool {
        self != EdgeType::NextTopic
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = KlippError;

    fn from_str(s: &str) -> Result<Self> {
        EdgeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| KlippError::GraphStore(format!("Unknown edge type: {}", s)))
    }
}

/// Directed relationship between two chapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    /// Similarity or fixed weight, in [0, 1].
    pub strength: f32,
}

impl Edge {
    pub fn new(from: &str, to: &str, edge_type: EdgeType, strength: f32) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            edge_type,
            strength,
        }
    }
}

/// Counts reported after a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildSummary {
    pub nodes_created: usize,
    pub edges_created: BTreeMap<EdgeType, usize>,
}

impl BuildSummary {
    pub fn total_edges(&self) -> usize {
        self.edges_created.values().sum()
    }
}

/// Aggregate figures about the current graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStatistics {
    pub total_chapters: usize,
    pub total_sources: usize,
    pub edge_counts: BTreeMap<EdgeType, usize>,
    /// Mean outgoing SIMILAR_TO + RELATES_TO edges per chapter.
    pub avg_similarity_connections: f32,
    pub built_at: Option<DateTime<Utc>>,
}

/// A bounded slice of the graph for display.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphView {
    /// Serialized without embeddings.
    #[serde(serialize_with = "serialize_nodes")]
    pub nodes: Vec<Chapter>,
    pub edges: Vec<Edge>,
}

#[derive(Serialize)]
struct NodeView<'a> {
    id: &'a str,
    source_id: &'a str,
    source_title: &'a str,
    title: &'a str,
    description: &'a str,
    topics: &'a [String],
    level: ChapterLevel,
    position: usize,
    start_time: f64,
    end_time: f64,
    text: &'a str,
}

impl<'a> From<&'a Chapter> for NodeView<'a> {
    fn from(chapter: &'a Chapter) -> Self {
        Self {
            id: &chapter.chunk.id,
            source_id: &chapter.chunk.source_id,
            source_title: &chapter.chunk.source_title,
            title: &chapter.title,
            description: &chapter.description,
            topics: &chapter.topics,
            level: chapter.level,
            position: chapter.position,
            start_time: chapter.chunk.start_time,
            end_time: chapter.chunk.end_time,
            text: &chapter.chunk.text,
        }
    }
}

fn serialize_nodes<S: Serializer>(nodes: &[Chapter], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(nodes.iter().map(NodeView::from))
}

/// Chapters plus the edges derived from them.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    chapters: BTreeMap<String, Chapter>,
    edges: Vec<Edge>,
    built_at: Option<DateTime<Utc>>,
}

impl KnowledgeGraph {
    pub fn new(chapters: Vec<Chapter>, edges: Vec<Edge>, built_at: Option<DateTime<Utc>>) -> Self {
        Self {
            chapters: chapters
                .into_iter()
                .map(|c| (c.id().to_string(), c))
                .collect(),
            edges,
            built_at,
        }
    }

    pub fn chapter(&self, id: &str) -> Option<&Chapter> {
        self.chapters.get(id)
    }

    /// Chapters ordered by id.
    pub fn chapters(&self) -> impl Iterator<Item = &Chapter> {
        self.chapters.values()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn built_at(&self) -> Option<DateTime<Utc>> {
        self.built_at
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// True once a relationship build produced any non-sequential edge.
    pub fn is_built(&self) -> bool {
        self.edges.iter().any(|e| e.edge_type.is_capped())
    }

    pub fn statistics(&self) -> GraphStatistics {
        let edge_counts = builder::count_by_type(&self.edges);
        let sources: BTreeSet<&str> = self.chapters.values().map(|c| c.source_id()).collect();
        let similarity_edges =
            edge_counts[&EdgeType::SimilarTo] + edge_counts[&EdgeType::RelatesTo];
        let avg_similarity_connections = if self.chapters.is_empty() {
            0.0
        } else {
            similarity_edges as f32 / self.chapters.len() as f32
        };

        GraphStatistics {
            total_chapters: self.chapters.len(),
            total_sources: sources.len(),
            edge_counts,
            avg_similarity_connections,
            built_at: self.built_at,
        }
    }

    /// The first `limit` chapters (of `source_id`, if given) together with
    /// their direct neighbors and every edge touching the selection.
    pub fn view(&self, source_id: Option<&str>, limit: usize) -> Result<GraphView> {
        if self.is_empty() {
            return Err(KlippError::EmptyCorpus);
        }

        let mut ordered: Vec<&Chapter> = self
            .chapters
            .values()
            .filter(|c| source_id.map_or(true, |s| c.source_id() == s))
            .collect();
        if ordered.is_empty() {
            if let Some(source) = source_id {
                return Err(KlippError::NotFound(format!("source {}", source)));
            }
        }
        ordered.sort_by(|a, b| chapter_order(a, b));

        let selected: BTreeSet<&str> = ordered.iter().take(limit).map(|c| c.id()).collect();

        let edges: Vec<Edge> = self
            .edges
            .iter()
            .filter(|e| selected.contains(e.from.as_str()) || selected.contains(e.to.as_str()))
            .cloned()
            .collect();

        let mut node_ids = selected.clone();
        for edge in &edges {
            node_ids.insert(edge.from.as_str());
            node_ids.insert(edge.to.as_str());
        }

        let mut nodes: Vec<Chapter> = node_ids
            .into_iter()
            .filter_map(|id| self.chapters.get(id).cloned())
            .collect();
        nodes.sort_by(chapter_order);

        Ok(GraphView { nodes, edges })
    }
}

/// Order by source, then start time, then id.
fn chapter_order(a: &Chapter, b: &Chapter) -> std::cmp::Ordering {
    a.source_id()
        .cmp(b.source_id())
        .then_with(|| a.start_time().total_cmp(&b.start_time()))
        .then_with(|| a.id().cmp(b.id()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::{Chapter, ChapterLevel, Chunk};

    /// A chapter of `source` at `position`, 60 seconds long.
    pub fn chapter(source: &str, position: usize, embedding: Vec<f32>) -> Chapter {
        let start = position as f64 * 60.0;
        Chapter {
            chunk: Chunk::new(
                Chapter::make_id(source, position),
                source.to_string(),
                format!("{} title", source),
                format!("chapter {} of {}", position, source),
                start,
                start + 60.0,
                embedding,
            ),
            title: format!("Part {}", position + 1),
            description: String::new(),
            topics: vec![],
            level: ChapterLevel::Main,
            position,
        }
    }
}
