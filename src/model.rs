//! Core records shared by the search and graph halves of the crate.

use crate::transcript::format_timestamp;
use serde::{Deserialize, Serialize};

/// Smallest indexed unit of text.
///
/// Created once per processed video segment and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier, unique across the corpus.
    pub id: String,
    /// Owning video.
    pub source_id: String,
    /// Title of the owning video.
    pub source_title: String,
    /// Body text.
    pub text: String,
    /// Start time in seconds.
    pub start_time: f64,
    /// End time in seconds.
    pub end_time: f64,
    /// Embedding vector. Dimensionality is fixed per corpus.
    pub embedding: Vec<f32>,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(
        id: String,
        source_id: String,
        source_title: String,
        text: String,
        start_time: f64,
        end_time: f64,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id,
            source_id,
            source_title,
            text,
            start_time,
            end_time,
            embedding,
        }
    }

    /// Text fed to the keyword index: title first, then body.
    pub fn indexed_text(&self) -> String {
        format!("{} {}", self.source_title, self.text)
    }

    /// Duration of this chunk in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Format the start timestamp for display.
    pub fn format_timestamp(&self) -> String {
        format_timestamp(self.start_time)
    }
}

/// Coarse position of a chapter inside its video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterLevel {
    Introduction,
    Main,
    Conclusion,
}

impl ChapterLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            ChapterLevel::Introduction => 0,
            ChapterLevel::Main => 1,
            ChapterLevel::Conclusion => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ChapterLevel::Introduction),
            1 => Some(ChapterLevel::Main),
            2 => Some(ChapterLevel::Conclusion),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChapterLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChapterLevel::Introduction => write!(f, "introduction"),
            ChapterLevel::Main => write!(f, "main"),
            ChapterLevel::Conclusion => write!(f, "conclusion"),
        }
    }
}

/// A chunk with the derived attributes used for graph construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub title: String,
    pub description: String,
    /// Keywords, most relevant first. Never contains duplicates.
    pub topics: Vec<String>,
    pub level: ChapterLevel,
    /// 0-based ordinal of this chapter within its video.
    pub position: usize,
}

impl Chapter {
    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    pub fn source_id(&self) -> &str {
        &self.chunk.source_id
    }

    pub fn start_time(&self) -> f64 {
        self.chunk.start_time
    }

    pub fn end_time(&self) -> f64 {
        self.chunk.end_time
    }

    pub fn embedding(&self) -> &[f32] {
        &self.chunk.embedding
    }

    /// Chapter ids are the source id followed by the zero-padded ordinal.
    pub fn make_id(source_id: &str, position: usize) -> String {
        format!("{}:{:04}", source_id, position)
    }
}
