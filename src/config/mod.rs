//! Configuration module for Klipp.
//!
//! Handles loading, saving and validating application settings.

mod settings;

pub use settings::{
    EmbeddingSettings, GeneralSettings, GraphSettings, LexicalSettings, SearchSettings,
    SegmentationSettings, Settings, VectorStoreSettings,
};
