//! Transcript input model.
//!
//! Lines arrive already resolved from captions or speech-to-text, one
//! `(video_id, text, start_time, end_time)` record at a time.

use crate::error::{KlippError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single timestamped transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptLine {
    /// Video this line belongs to.
    pub video_id: String,
    /// Spoken text.
    pub text: String,
    /// Start time in seconds.
    pub start_time: f64,
    /// End time in seconds.
    pub end_time: f64,
}

impl TranscriptLine {
    /// Create a new transcript line.
    pub fn new(video_id: &str, text: &str, start_time: f64, end_time: f64) -> Self {
        Self {
            video_id: video_id.to_string(),
            text: text.to_string(),
            start_time,
            end_time,
        }
    }

    /// Duration of this line in seconds.
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Metadata about a source video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub id: String,
    pub title: String,
}

impl SourceInfo {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
        }
    }
}

/// A batch of transcript lines, possibly spanning several sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptBundle {
    #[serde(default)]
    pub sources: Vec<SourceInfo>,
    pub lines: Vec<TranscriptLine>,
}

impl TranscriptBundle {
    /// Load a bundle from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let bundle: TranscriptBundle = serde_json::from_str(&content)?;
        Ok(bundle)
    }

    /// Split the bundle into per-source line lists, ordered by first appearance.
    ///
    /// Lines within a source are sorted by start time. Sources without
    /// metadata use their id as title.
    pub fn group_by_source(&self) -> Result<Vec<(SourceInfo, Vec<TranscriptLine>)>> {
        let titles: HashMap<&str, &str> = self
            .sources
            .iter()
            .map(|s| (s.id.as_str(), s.title.as_str()))
            .collect();

        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<TranscriptLine>> = HashMap::new();

        for line in &self.lines {
            validate_line(line)?;
            if !groups.contains_key(&line.video_id) {
                order.push(line.video_id.clone());
            }
            groups
                .entry(line.video_id.clone())
                .or_default()
                .push(line.clone());
        }

        let mut result = Vec::with_capacity(order.len());
        for id in order {
            let mut lines = groups.remove(&id).unwrap_or_default();
            lines.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
            let title = titles.get(id.as_str()).copied().unwrap_or(id.as_str());
            result.push((SourceInfo::new(&id, title), lines));
        }

        Ok(result)
    }
}

fn validate_line(line: &TranscriptLine) -> Result<()> {
    if line.video_id.is_empty() {
        return Err(KlippError::InvalidInput(
            "transcript line without a video id".to_string(),
        ));
    }
    if !line.start_time.is_finite() || !line.end_time.is_finite() || line.end_time < line.start_time
    {
        return Err(KlippError::InvalidInput(format!(
            "bad timestamps for line in {}: {} - {}",
            line.video_id, line.start_time, line.end_time
        )));
    }
    Ok(())
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.0), "01:05");
        assert_eq!(format_timestamp(3665.0), "01:01:05");
    }

    #[test]
    fn test_group_by_source() {
        let bundle = TranscriptBundle {
            sources: vec![SourceInfo::new("b", "Second video")],
            lines: vec![
                TranscriptLine::new("a", "later", 10.0, 20.0),
                TranscriptLine::new("b", "other", 0.0, 5.0),
                TranscriptLine::new("a", "first", 0.0, 10.0),
            ],
        };

        let groups = bundle.group_by_source().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, SourceInfo::new("a", "a"));
        assert_eq!(groups[0].1[0].text, "first");
        assert_eq!(groups[0].1[1].text, "later");
        assert_eq!(groups[1].0.title, "Second video");
    }

    #[test]
    fn test_rejects_reversed_timestamps() {
        let bundle = TranscriptBundle {
            sources: vec![],
            lines: vec![TranscriptLine::new("a", "oops", 10.0, 5.0)],
        };
        assert!(matches!(
            bundle.group_by_source(),
            Err(KlippError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_bundle_json_shape() {
        let json = r#"{
            "sources": [{"id": "v1", "title": "Intro to OOP"}],
            "lines": [{"video_id": "v1", "text": "hello", "start_time": 0.0, "end_time": 4.5}]
        }"#;
        let bundle: TranscriptBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.lines[0].duration(), 4.5);
        assert_eq!(bundle.sources[0].title, "Intro to OOP");
    }
}
