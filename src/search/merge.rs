//! Clip merging: hits of one source that sit close together become a single
//! padded clip, rescored by where it falls in the source.

use crate::config::SearchSettings;
use crate::model::Chunk;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Phrases that mark a wrap-up rather than teaching content.
const CONCLUSION_PATTERNS: &[&str] = &[
    "hope you have understood",
    "hope you understood",
    "that's all",
    "thank you for watching",
    "see you in the next",
    "in the next video",
    "subscribe",
    "like and subscribe",
    "this is how",
    "this is the end",
    "conclusion",
    "summary",
    "wrap up",
    "wrap-up",
];

const MAX_JOINED_TEXTS: usize = 3;
const MAX_TEXT_CHARS: usize = 500;
const MIN_TEXT_CHARS: usize = 10;

/// A span of one source covering one or more adjacent hits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedClip {
    pub source_id: String,
    pub source_title: String,
    /// Hits folded into this clip, in time order.
    pub chunk_ids: Vec<String>,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub score: f32,
    pub is_conclusion: bool,
}

/// Hits of one source collected before padding.
struct Run<'a> {
    hits: Vec<(&'a Chunk, f32)>,
    start: f64,
    end: f64,
}

impl<'a> Run<'a> {
    fn new(chunk: &'a Chunk, score: f32) -> Self {
        Self {
            hits: vec![(chunk, score)],
            start: chunk.start_time,
            end: chunk.end_time,
        }
    }
}

/// Merge `hits` into clips, best first.
///
/// `durations` maps a source id to its length in seconds; sources without a
/// known length are neither clamped at the end nor rescored by position.
pub fn merge_clips(
    hits: &[(&Chunk, f32)],
    durations: &HashMap<String, f64>,
    settings: &SearchSettings,
) -> Vec<MergedClip> {
    let mut by_source: BTreeMap<&str, Vec<(&Chunk, f32)>> = BTreeMap::new();
    for (chunk, score) in hits {
        by_source
            .entry(chunk.source_id.as_str())
            .or_default()
            .push((*chunk, *score));
    }

    let mut clips = Vec::new();
    for (source_id, mut source_hits) in by_source {
        source_hits.sort_by(|a, b| {
            a.0.start_time
                .total_cmp(&b.0.start_time)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        let duration = durations.get(source_id).copied().unwrap_or(0.0);

        let mut runs: Vec<Run<'_>> = Vec::new();
        for (chunk, score) in source_hits {
            match runs.last_mut() {
                Some(run) if chunk.start_time - run.end <= settings.merge_gap_seconds => {
                    run.end = run.end.max(chunk.end_time);
                    run.hits.push((chunk, score));
                }
                _ => runs.push(Run::new(chunk, score)),
            }
        }

        clips.extend(runs.into_iter().map(|run| finalize(run, duration, settings)));
    }

    clips.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.start_time.total_cmp(&b.start_time))
    });
    clips
}

fn finalize(run: Run<'_>, duration: f64, settings: &SearchSettings) -> MergedClip {
    let (start, end) = pad(run.start, run.end, duration, settings);

    let text = join_texts(&run.hits);
    let lowered = text.to_lowercase();
    let is_conclusion = CONCLUSION_PATTERNS.iter().any(|p| lowered.contains(p));

    let mean = run.hits.iter().map(|(_, s)| s).sum::<f32>() / run.hits.len() as f32;
    let score = position_adjusted(mean, start, end, duration, is_conclusion);

    // Title of the best hit; ties keep the earliest.
    let mut best = run.hits[0];
    for hit in &run.hits[1..] {
        if hit.1 > best.1 {
            best = *hit;
        }
    }

    MergedClip {
        source_id: best.0.source_id.clone(),
        source_title: best.0.source_title.clone(),
        chunk_ids: run.hits.iter().map(|(c, _)| c.id.clone()).collect(),
        start_time: start,
        end_time: end,
        text,
        score,
        is_conclusion,
    }
}

/// Add context on both sides, then widen to the minimum length.
///
/// Widening leans backward; a clip pinned at zero takes the rest forward.
fn pad(start: f64, end: f64, duration: f64, settings: &SearchSettings) -> (f64, f64) {
    let clamp_end = |t: f64| if duration > 0.0 { t.min(duration) } else { t };

    let mut start = (start - settings.context_before_seconds).max(0.0);
    let mut end = clamp_end(end + settings.context_after_seconds);

    let length = end - start;
    if length < settings.min_merged_seconds {
        let half = (settings.min_merged_seconds - length) / 2.0;
        start = (start - half * 1.2).max(0.0);
        end = clamp_end(end + half * 0.8);

        if start == 0.0 && end - start < settings.min_merged_seconds {
            end = clamp_end(end + settings.min_merged_seconds - (end - start));
        }
    }
    (start, end)
}

fn join_texts(hits: &[(&Chunk, f32)]) -> String {
    let mut seen = HashSet::new();
    let mut texts: Vec<&str> = Vec::new();
    for (chunk, _) in hits {
        let key = chunk.text.trim().to_lowercase();
        if key.chars().count() > MIN_TEXT_CHARS && seen.insert(key) {
            texts.push(&chunk.text);
        }
    }
    if texts.is_empty() {
        return hits[0].0.text.clone();
    }

    // Longest first; stable for equal lengths.
    texts.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));
    let joined = texts[..texts.len().min(MAX_JOINED_TEXTS)].join(" ");
    if joined.chars().count() > MAX_TEXT_CHARS {
        let cut: String = joined.chars().take(MAX_TEXT_CHARS).collect();
        format!("{}...", cut)
    } else {
        joined
    }
}

/// Favor the body of a source over its opening and its closing stretch.
fn position_adjusted(score: f32, start: f64, end: f64, duration: f64, is_conclusion: bool) -> f32 {
    if duration <= 0.0 {
        return score;
    }
    let score = if is_conclusion { score * 0.3 } else { score };

    let ratio = (start + end) / 2.0 / duration;
    let factor = if ratio > 0.85 {
        0.4
    } else if ratio > 0.75 {
        0.7
    } else if ratio < 0.05 {
        0.85
    } else {
        1.15
    };
    (score * factor).max(0.0)
}
