//! Topic segmentation: transcript lines to chapters.
//!
//! Boundaries are found where the similarity between adjacent lines dips
//! below a threshold at a local minimum. Detection runs inside overlapping
//! time windows so that each decision only sees nearby context.

pub mod keywords;

use crate::config::SegmentationSettings;
use crate::embedding::Embedder;
use crate::error::{KlippError, Result};
use crate::model::{Chapter, ChapterLevel, Chunk};
use crate::transcript::{SourceInfo, TranscriptLine};
use crate::vector_store::cosine_similarity;
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Characters of clip text kept as the chapter description.
const DESCRIPTION_CHARS: usize = 200;

/// Keywords joined into a generated chapter title.
const TITLE_KEYWORDS: usize = 3;

/// Indices of lines that start a new clip.
///
/// `lines` must be ordered by start time and `embeddings` must be parallel
/// to it. Index 0 is never reported.
pub fn detect_boundaries(
    lines: &[TranscriptLine],
    embeddings: &[Vec<f32>],
    settings: &SegmentationSettings,
) -> BTreeSet<usize> {
    let mut boundaries = BTreeSet::new();
    if lines.len() < 2 {
        return boundaries;
    }

    // similarity[i] compares line i-1 with line i
    let similarity: Vec<f32> = (0..lines.len())
        .map(|i| {
            if i == 0 {
                1.0
            } else {
                cosine_similarity(&embeddings[i - 1], &embeddings[i])
            }
        })
        .collect();

    let first_start = lines[0].start_time;
    let last_start = lines[lines.len() - 1].start_time;
    let step = settings.window_seconds - settings.overlap_seconds;

    let mut window_start = first_start;
    loop {
        let window_end = window_start + settings.window_seconds;
        let lo = lines.partition_point(|l| l.start_time < window_start);
        let hi = lines.partition_point(|l| l.start_time < window_end);

        // adjacent pairs fully inside the window
        for i in (lo + 1)..hi {
            let s = similarity[i];
            if s >= settings.boundary_threshold {
                continue;
            }
            let left_ok = i - 1 <= lo || s <= similarity[i - 1];
            let right_ok = i + 1 >= hi || s <= similarity[i + 1];
            if left_ok && right_ok {
                boundaries.insert(i);
            }
        }

        if window_end > last_start {
            break;
        }
        window_start += step;
    }

    boundaries
}

/// Turn boundaries into clip ranges, enforcing the minimum duration.
///
/// A clip shorter than `min_clip_seconds` is merged into the clip that
/// follows it. The last clip may be shorter, unless it has no duration at
/// all, in which case it joins the previous one.
pub fn build_clips(
    lines: &[TranscriptLine],
    boundaries: &BTreeSet<usize>,
    min_clip_seconds: f64,
) -> Vec<Range<usize>> {
    if lines.is_empty() {
        return Vec::new();
    }

    let mut starts = vec![0usize];
    for &b in boundaries.iter().filter(|&&b| b > 0 && b < lines.len()) {
        let current = *starts.last().unwrap_or(&0);
        if lines[b].start_time - lines[current].start_time >= min_clip_seconds {
            starts.push(b);
        }
    }

    let end_time = source_end(lines);
    if starts.len() > 1 {
        let last = starts[starts.len() - 1];
        if end_time - lines[last].start_time <= 0.0 {
            starts.pop();
        }
    }

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| start..starts.get(i + 1).copied().unwrap_or(lines.len()))
        .collect()
}

fn source_end(lines: &[TranscriptLine]) -> f64 {
    lines
        .iter()
        .map(|l| l.end_time)
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Coarse level from the clip midpoint's position in the video.
pub fn level_for(
    clip_start: f64,
    clip_end: f64,
    video_start: f64,
    video_end: f64,
    settings: &SegmentationSettings,
) -> ChapterLevel {
    let total = video_end - video_start;
    if total <= 0.0 {
        return ChapterLevel::Main;
    }

    let fraction = ((clip_start + clip_end) / 2.0 - video_start) / total;
    if fraction < settings.intro_fraction {
        ChapterLevel::Introduction
    } else if fraction > 1.0 - settings.conclusion_fraction {
        ChapterLevel::Conclusion
    } else {
        ChapterLevel::Main
    }
}

/// Unit-length mean of the given vectors.
pub fn mean_embedding(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };

    let mut mean = vec![0.0f32; first.len()];
    for vector in vectors {
        for (acc, x) in mean.iter_mut().zip(vector) {
            *acc += x;
        }
    }

    let norm = mean.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        mean.iter_mut().for_each(|x| *x /= norm);
    }
    mean
}

fn chapter_title(keywords: &[String], position: usize) -> String {
    if keywords.is_empty() {
        return format!("Part {}", position + 1);
    }
    keywords
        .iter()
        .take(TITLE_KEYWORDS)
        .map(|k| {
            let mut chars = k.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(", ")
}

fn description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(DESCRIPTION_CHARS).collect();
    format!("{}...", cut.trim_end())
}

/// Segment one source's lines into chapters.
///
/// Pure: the caller supplies one embedding per line. Zero lines yield zero
/// chapters.
pub fn segment(
    source: &SourceInfo,
    lines: &[TranscriptLine],
    embeddings: &[Vec<f32>],
    settings: &SegmentationSettings,
) -> Result<Vec<Chapter>> {
    settings.validate()?;
    if lines.len() != embeddings.len() {
        return Err(KlippError::InvalidInput(format!(
            "{} lines but {} embeddings",
            lines.len(),
            embeddings.len()
        )));
    }
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let boundaries = detect_boundaries(lines, embeddings, settings);
    let clips = build_clips(lines, &boundaries, settings.min_clip_seconds);
    debug!(
        "{}: {} candidate boundaries, {} clips",
        source.id,
        boundaries.len(),
        clips.len()
    );

    let texts: Vec<String> = clips
        .iter()
        .map(|range| {
            lines[range.clone()]
                .iter()
                .map(|l| l.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    let keywords = keywords::extract_keywords(&texts, settings.keywords_per_clip);

    let video_start = lines[0].start_time;
    let video_end = source_end(lines);

    let chapters = clips
        .iter()
        .enumerate()
        .zip(texts)
        .zip(keywords)
        .map(|(((position, range), text), topics)| {
            let start_time = if position == 0 {
                video_start
            } else {
                lines[range.start].start_time
            };
            let end_time = clips
                .get(position + 1)
                .map(|next| lines[next.start].start_time)
                .unwrap_or(video_end);

            let chunk = Chunk::new(
                Chapter::make_id(&source.id, position),
                source.id.clone(),
                source.title.clone(),
                text,
                start_time,
                end_time,
                mean_embedding(&embeddings[range.clone()]),
            );

            Chapter {
                title: chapter_title(&topics, position),
                description: description(&chunk.text),
                level: level_for(start_time, end_time, video_start, video_end, settings),
                topics,
                position,
                chunk,
            }
        })
        .collect();

    Ok(chapters)
}

/// Segments transcripts using line embeddings from an `Embedder`.
pub struct TopicSegmenter {
    settings: SegmentationSettings,
    embedder: Arc<dyn Embedder>,
}

impl TopicSegmenter {
    pub fn new(settings: SegmentationSettings, embedder: Arc<dyn Embedder>) -> Self {
        Self { settings, embedder }
    }

    /// Embed every line of `source` and segment it.
    #[instrument(skip(self, lines), fields(source = %source.id, lines = lines.len()))]
    pub async fn segment(&self, source: &SourceInfo, lines: &[TranscriptLine]) -> Result<Vec<Chapter>> {
        self.settings.validate()?;
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = lines.iter().map(|l| l.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let chapters = segment(source, lines, &embeddings, &self.settings)?;
        info!("Segmented {} into {} chapters", source.id, chapters.len());
        Ok(chapters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::KeywordBagEmbedder;

    /// Lines of 10 seconds each; `topics[i]` picks the embedding axis.
    fn transcript(topics: &[usize], dims: usize) -> (Vec<TranscriptLine>, Vec<Vec<f32>>) {
        let words = ["classes objects", "pasta sauce", "guitar chords"];
        let lines = topics
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                TranscriptLine::new(
                    "v1",
                    &format!("line {} about {}", i, words[t]),
                    i as f64 * 10.0,
                    i as f64 * 10.0 + 10.0,
                )
            })
            .collect();
        let embeddings = topics
            .iter()
            .map(|&t| {
                let mut v = vec![0.0; dims];
                v[t] = 1.0;
                v
            })
            .collect();
        (lines, embeddings)
    }

    fn source() -> SourceInfo {
        SourceInfo::new("v1", "Video One")
    }

    fn assert_contiguous(chapters: &[Chapter], settings: &SegmentationSettings) {
        for pair in chapters.windows(2) {
            assert_eq!(pair[0].end_time(), pair[1].start_time());
            assert!(pair[0].end_time() - pair[0].start_time() >= settings.min_clip_seconds);
        }
    }

    #[test]
    fn test_splits_at_topic_change() {
        let settings = SegmentationSettings::default();
        let (lines, embeddings) = transcript(&[0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1], 2);

        let chapters = segment(&source(), &lines, &embeddings, &settings).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].start_time(), 0.0);
        assert_eq!(chapters[0].end_time(), 60.0);
        assert_eq!(chapters[1].end_time(), 120.0);
        assert_eq!(chapters[1].id(), "v1:0001");
        assert_eq!(chapters[1].position, 1);
        assert!(chapters[1].chunk.text.contains("pasta"));
        assert_eq!(chapters[0].embedding(), &[1.0, 0.0]);
        assert_contiguous(&chapters, &settings);
    }

    #[test]
    fn test_short_clip_merges_forward() {
        let settings = SegmentationSettings::default();
        let (lines, embeddings) = transcript(&[0, 0, 1, 1, 1, 1, 1, 1], 2);

        let chapters = segment(&source(), &lines, &embeddings, &settings).unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].start_time(), 0.0);
        assert_eq!(chapters[0].end_time(), 80.0);
    }

    #[test]
    fn test_last_clip_may_be_short() {
        let settings = SegmentationSettings::default();
        let (lines, embeddings) = transcript(&[0, 0, 0, 0, 0, 0, 1, 1], 2);

        let chapters = segment(&source(), &lines, &embeddings, &settings).unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].end_time() - chapters[1].start_time(), 20.0);
        assert_contiguous(&chapters, &settings);
    }

    #[test]
    fn test_boundary_found_in_later_window() {
        let settings = SegmentationSettings::default();
        let mut topics = vec![0; 40];
        topics.extend(vec![1; 20]);
        let (lines, embeddings) = transcript(&topics, 2);

        let boundaries = detect_boundaries(&lines, &embeddings, &settings);
        assert_eq!(boundaries.into_iter().collect::<Vec<_>>(), vec![40]);
    }

    #[test]
    fn test_levels_follow_position() {
        let settings = SegmentationSettings::default();
        let mut topics = vec![0; 10];
        topics.extend(vec![1; 80]);
        topics.extend(vec![2; 10]);
        let (lines, embeddings) = transcript(&topics, 3);

        let chapters = segment(&source(), &lines, &embeddings, &settings).unwrap();
        let levels: Vec<ChapterLevel> = chapters.iter().map(|c| c.level).collect();
        assert_eq!(
            levels,
            vec![
                ChapterLevel::Introduction,
                ChapterLevel::Main,
                ChapterLevel::Conclusion
            ]
        );
        assert_contiguous(&chapters, &settings);
    }

    #[test]
    fn test_chapter_topics_and_title() {
        let settings = SegmentationSettings::default();
        let (lines, embeddings) = transcript(&[0, 0, 0, 0, 1, 1, 1, 1], 2);

        let chapters = segment(&source(), &lines, &embeddings, &settings).unwrap();
        assert!(chapters[0].topics.contains(&"classes".to_string()));
        assert!(chapters[1].topics.contains(&"pasta".to_string()));
        assert!(chapters[0].topics.len() <= settings.keywords_per_clip);
        assert!(!chapters[0].title.is_empty());
    }

    #[test]
    fn test_empty_transcript() {
        let chapters = segment(&source(), &[], &[], &SegmentationSettings::default()).unwrap();
        assert!(chapters.is_empty());
    }

    #[test]
    fn test_mismatched_embeddings_rejected() {
        let (lines, _) = transcript(&[0, 0], 2);
        let result = segment(&source(), &lines, &[], &SegmentationSettings::default());
        assert!(matches!(result, Err(KlippError::InvalidInput(_))));
    }

    #[test]
    fn test_description_truncated() {
        let long = "word ".repeat(100);
        let d = description(&long);
        assert!(d.ends_with("..."));
        assert!(d.chars().count() <= DESCRIPTION_CHARS + 3);
    }

    #[tokio::test]
    async fn test_segmenter_uses_embedder() {
        let embedder = Arc::new(KeywordBagEmbedder::new(&[
            &["classes", "objects"],
            &["pasta", "sauce"],
        ]));
        let segmenter = TopicSegmenter::new(SegmentationSettings::default(), embedder);
        let (lines, _) = transcript(&[0, 0, 0, 0, 1, 1, 1, 1], 2);

        let chapters = segmenter.segment(&source(), &lines).await.unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].start_time(), 40.0);
    }
}
