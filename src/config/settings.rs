//! Configuration settings for Klipp.

use crate::error::{KlippError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub embedding: EmbeddingSettings,
    pub vector_store: VectorStoreSettings,
    pub lexical: LexicalSettings,
    pub search: SearchSettings,
    pub segmentation: SegmentationSettings,
    pub graph: GraphSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.klipp".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions. Fixed per corpus.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Vector store provider (sqlite, memory).
    pub provider: String,
    /// Path to SQLite database (for sqlite provider).
    pub sqlite_path: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.klipp/klipp.db".to_string(),
        }
    }
}

/// BM25 keyword index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicalSettings {
    /// Where the index snapshot is persisted.
    pub index_path: String,
    /// Term frequency saturation.
    pub k1: f32,
    /// Document length normalization.
    pub b: f32,
}

impl Default for LexicalSettings {
    fn default() -> Self {
        Self {
            index_path: "~/.klipp/lexical.json".to_string(),
            k1: 1.5,
            b: 0.75,
        }
    }
}

impl LexicalSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(invalid(format!("lexical.k1 must be >= 0, got {}", self.k1)));
        }
        if !(0.0..=1.0).contains(&self.b) {
            return Err(invalid(format!("lexical.b must be within [0, 1], got {}", self.b)));
        }
        Ok(())
    }
}

/// Hybrid search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Weight of the normalized BM25 score.
    pub lexical_weight: f32,
    /// Weight of the normalized semantic score.
    pub semantic_weight: f32,
    /// Candidates requested from each source per final result.
    pub overfetch_factor: usize,
    /// Multiplier applied when the query matches the source title.
    pub title_boost: f32,
    /// Expand known abbreviations before the keyword lookup.
    pub expand_abbreviations: bool,
    /// Merge nearby hits of one source into padded clips.
    pub merge_clips: bool,
    /// Largest gap in seconds between hits that still merge.
    pub merge_gap_seconds: f64,
    /// Context added before a merged clip.
    pub context_before_seconds: f64,
    /// Context added after a merged clip.
    pub context_after_seconds: f64,
    /// Merged clips shorter than this are widened.
    pub min_merged_seconds: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            lexical_weight: 0.4,
            semantic_weight: 0.6,
            overfetch_factor: 3,
            title_boost: 1.2,
            expand_abbreviations: true,
            merge_clips: false,
            merge_gap_seconds: 10.0,
            context_before_seconds: 5.0,
            context_after_seconds: 5.0,
            min_merged_seconds: 30.0,
        }
    }
}

impl SearchSettings {
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [
            ("lexical_weight", self.lexical_weight),
            ("semantic_weight", self.semantic_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(format!("search.{} must be >= 0, got {}", name, weight)));
            }
        }
        if self.lexical_weight + self.semantic_weight <= 0.0 {
            return Err(invalid("search weights cannot both be zero".to_string()));
        }
        if self.overfetch_factor == 0 {
            return Err(invalid("search.overfetch_factor must be at least 1".to_string()));
        }
        if !self.title_boost.is_finite() || self.title_boost < 1.0 {
            return Err(invalid(format!(
                "search.title_boost must be >= 1.0, got {}",
                self.title_boost
            )));
        }
        for (name, seconds) in [
            ("merge_gap_seconds", self.merge_gap_seconds),
            ("context_before_seconds", self.context_before_seconds),
            ("context_after_seconds", self.context_after_seconds),
            ("min_merged_seconds", self.min_merged_seconds),
        ] {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(invalid(format!("search.{} must be >= 0, got {}", name, seconds)));
            }
        }
        Ok(())
    }
}

/// Topic segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationSettings {
    /// Width of the sliding analysis window in seconds.
    pub window_seconds: f64,
    /// Overlap between consecutive windows in seconds.
    pub overlap_seconds: f64,
    /// Adjacent-line similarity below which a boundary may be declared.
    pub boundary_threshold: f32,
    /// Minimum clip duration in seconds.
    pub min_clip_seconds: f64,
    /// Number of keywords extracted per clip.
    pub keywords_per_clip: usize,
    /// Fraction of the source treated as introduction.
    pub intro_fraction: f64,
    /// Fraction of the source treated as conclusion.
    pub conclusion_fraction: f64,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            window_seconds: 300.0,
            overlap_seconds: 60.0,
            boundary_threshold: 0.7,
            min_clip_seconds: 30.0,
            keywords_per_clip: 5,
            intro_fraction: 0.15,
            conclusion_fraction: 0.15,
        }
    }
}

impl SegmentationSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.overlap_seconds >= 0.0 && self.window_seconds > self.overlap_seconds) {
            return Err(invalid(format!(
                "segmentation window ({}s) must be longer than its overlap ({}s)",
                self.window_seconds, self.overlap_seconds
            )));
        }
        if !(self.min_clip_seconds > 0.0) {
            return Err(invalid(format!(
                "segmentation.min_clip_seconds must be positive, got {}",
                self.min_clip_seconds
            )));
        }
        if !(-1.0..=1.0).contains(&self.boundary_threshold) {
            return Err(invalid(format!(
                "segmentation.boundary_threshold must be within [-1, 1], got {}",
                self.boundary_threshold
            )));
        }
        for (name, fraction) in [
            ("intro_fraction", self.intro_fraction),
            ("conclusion_fraction", self.conclusion_fraction),
        ] {
            if !(0.0..=0.5).contains(&fraction) {
                return Err(invalid(format!(
                    "segmentation.{} must be within [0, 0.5], got {}",
                    name, fraction
                )));
            }
        }
        Ok(())
    }
}

/// Relationship builder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Lower similarity bound for RELATES_TO and PREREQUISITE_OF.
    pub similarity_threshold: f32,
    /// Similarity at or above which an edge is SIMILAR_TO.
    pub similar_threshold_high: f32,
    /// Outgoing edges kept per node and type (NEXT_TOPIC excluded).
    pub max_connections: usize,
    /// Report progress every N chapters during the pairwise pass.
    pub progress_every: usize,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            similar_threshold_high: 0.85,
            max_connections: 5,
            progress_every: 10,
        }
    }
}

impl GraphSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.similarity_threshold) {
            return Err(invalid(format!(
                "graph.similarity_threshold must be within [0, 1), got {}",
                self.similarity_threshold
            )));
        }
        if !(self.similar_threshold_high >= self.similarity_threshold
            && self.similar_threshold_high <= 1.0)
        {
            return Err(invalid(format!(
                "graph.similar_threshold_high must be within [{}, 1], got {}",
                self.similarity_threshold, self.similar_threshold_high
            )));
        }
        if self.max_connections == 0 {
            return Err(invalid("graph.max_connections must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn invalid(msg: String) -> KlippError {
    KlippError::InvalidConfiguration(msg)
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| KlippError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every algorithm-facing section.
    pub fn validate(&self) -> Result<()> {
        self.lexical.validate()?;
        self.search.validate()?;
        self.segmentation.validate()?;
        self.graph.validate()?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("klipp")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }

    /// Get the expanded lexical snapshot path.
    pub fn lexical_index_path(&self) -> PathBuf {
        Self::expand_path(&self.lexical.index_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.search.lexical_weight, 0.4);
        assert_eq!(settings.search.semantic_weight, 0.6);
        assert_eq!(settings.graph.max_connections, 5);
        assert_eq!(settings.segmentation.window_seconds, 300.0);
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut search = SearchSettings::default();
        search.lexical_weight = -0.1;
        assert!(matches!(
            search.validate(),
            Err(KlippError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_negative_clip_padding() {
        let search = SearchSettings {
            context_before_seconds: -5.0,
            ..SearchSettings::default()
        };
        assert!(matches!(
            search.validate(),
            Err(KlippError::InvalidConfiguration(_))
        ));
        assert!(!SearchSettings::default().merge_clips);
    }

    #[test]
    fn test_rejects_threshold_of_one() {
        let mut graph = GraphSettings::default();
        graph.similarity_threshold = 1.0;
        assert!(matches!(
            graph.validate(),
            Err(KlippError::InvalidConfiguration(_))
        ));

        let mut graph = GraphSettings::default();
        graph.similar_threshold_high = 0.5;
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_rejects_overlap_wider_than_window() {
        let mut seg = SegmentationSettings::default();
        seg.overlap_seconds = 300.0;
        assert!(seg.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [search]
            lexical_weight = 0.5
            semantic_weight = 0.5

            [graph]
            max_connections = 3
            "#,
        )
        .unwrap();

        assert_eq!(settings.search.lexical_weight, 0.5);
        assert_eq!(settings.search.overfetch_factor, 3);
        assert_eq!(settings.graph.max_connections, 3);
        assert_eq!(settings.graph.similar_threshold_high, 0.85);
    }
}
