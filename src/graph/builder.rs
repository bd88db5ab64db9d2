//! Pairwise relationship builder.
//!
//! `build_edges` is a pure function of the chapter set and settings. The
//! cross-source pass is quadratic in the number of chapters, so it reports
//! progress through a callback.

use super::{Edge, EdgeType};
use crate::config::GraphSettings;
use crate::error::{KlippError, Result};
use crate::model::Chapter;
use crate::vector_store::cosine_similarity;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Strength of sequential edges.
const NEXT_TOPIC_STRENGTH: f32 = 1.0;

/// Derive every edge for `chapters`.
///
/// `on_progress(done, total)` is called every `progress_every` chapters of
/// the pairwise pass and once at the end. Output is sorted by source id,
/// edge type, then target id, and is identical across runs over the same
/// chapter set.
///
/// Each similar pair yields one SIMILAR_TO or RELATES_TO edge, directed from
/// the lower chapter id to the higher. `max_connections` caps edges per
/// origin, so these bands are capped at the lower-id end only: a chapter
/// whose id sorts last can receive any number of them.
///
/// Fails with `InvalidInput` if the embeddings differ in length.
pub fn build_edges<F>(
    chapters: &[Chapter],
    settings: &GraphSettings,
    mut on_progress: F,
) -> Result<Vec<Edge>>
where
    F: FnMut(usize, usize),
{
    settings.validate()?;
    if chapters.len() < 2 {
        return Ok(Vec::new());
    }

    let mut sorted: Vec<&Chapter> = chapters.iter().collect();
    sorted.sort_by(|a, b| a.id().cmp(b.id()));
    sorted.dedup_by(|a, b| a.id() == b.id());

    let width = sorted[0].embedding().len();
    if let Some(odd) = sorted.iter().find(|c| c.embedding().len() != width) {
        return Err(KlippError::InvalidInput(format!(
            "chapter {} has {} embedding dimensions, {} has {}",
            odd.id(),
            odd.embedding().len(),
            sorted[0].id(),
            width
        )));
    }

    let total = sorted.len();
    let report_every = settings.progress_every.max(1);
    let mut candidates: BTreeMap<(String, EdgeType), Vec<Edge>> = BTreeMap::new();

    for (i, a) in sorted.iter().enumerate() {
        for b in &sorted[i + 1..] {
            if a.source_id() == b.source_id() {
                continue;
            }

            let similarity = cosine_similarity(a.embedding(), b.embedding()).clamp(0.0, 1.0);
            if similarity < settings.similarity_threshold {
                continue;
            }

            let band = if similarity >= settings.similar_threshold_high {
                EdgeType::SimilarTo
            } else {
                EdgeType::RelatesTo
            };
            push(&mut candidates, Edge::new(a.id(), b.id(), band, similarity));

            if similarity > settings.similarity_threshold {
                match a.position.cmp(&b.position) {
                    Ordering::Less => push(
                        &mut candidates,
                        Edge::new(a.id(), b.id(), EdgeType::PrerequisiteOf, similarity),
                    ),
                    Ordering::Greater => push(
                        &mut candidates,
                        Edge::new(b.id(), a.id(), EdgeType::PrerequisiteOf, similarity),
                    ),
                    Ordering::Equal => {}
                }
            }
        }

        let done = i + 1;
        if done % report_every == 0 || done == total {
            on_progress(done, total);
        }
    }

    let mut edges: Vec<Edge> = Vec::new();
    for (_, mut group) in candidates {
        group.sort_by(|x, y| {
            y.strength
                .partial_cmp(&x.strength)
                .unwrap_or(Ordering::Equal)
                .then_with(|| x.to.cmp(&y.to))
        });
        group.truncate(settings.max_connections);
        edges.extend(group);
    }

    edges.extend(sequential_edges(&sorted));
    edges.sort_by(|x, y| {
        x.from
            .cmp(&y.from)
            .then_with(|| x.edge_type.cmp(&y.edge_type))
            .then_with(|| x.to.cmp(&y.to))
    });

    debug!("Built {} edges over {} chapters", edges.len(), total);
    Ok(edges)
}

fn push(candidates: &mut BTreeMap<(String, EdgeType), Vec<Edge>>, edge: Edge) {
    candidates
        .entry((edge.from.clone(), edge.edge_type))
        .or_default()
        .push(edge);
}

/// NEXT_TOPIC between temporally consecutive chapters of each source.
fn sequential_edges(chapters: &[&Chapter]) -> Vec<Edge> {
    let mut by_source: BTreeMap<&str, Vec<&Chapter>> = BTreeMap::new();
    for &chapter in chapters {
        by_source.entry(chapter.source_id()).or_default().push(chapter);
    }

    let mut edges = Vec::new();
    for (_, mut group) in by_source {
        group.sort_by(|a, b| {
            a.start_time()
                .total_cmp(&b.start_time())
                .then_with(|| a.id().cmp(b.id()))
        });
        for pair in group.windows(2) {
            edges.push(Edge::new(
                pair[0].id(),
                pair[1].id(),
                EdgeType::NextTopic,
                NEXT_TOPIC_STRENGTH,
            ));
        }
    }
    edges
}

/// Count edges per type.
pub fn count_by_type(edges: &[Edge]) -> BTreeMap<EdgeType, usize> {
    let mut counts: BTreeMap<EdgeType, usize> = EdgeType::ALL.iter().map(|t| (*t, 0)).collect();
    for edge in edges {
        *counts.entry(edge.edge_type).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KlippError;
    use crate::graph::test_support::chapter;
    use std::collections::HashSet;

    /// Unit vector at `angle` radians; cosine between two is cos(delta).
    fn at(angle: f32) -> Vec<f32> {
        vec![angle.cos(), angle.sin()]
    }

    fn no_progress(_: usize, _: usize) {}

    #[test]
    fn test_high_similarity_gives_one_similar_edge() {
        let chapters = vec![
            chapter("a", 0, at(0.0)),
            chapter("b", 0, at(0.9f32.acos())),
        ];
        let edges = build_edges(&chapters, &GraphSettings::default(), no_progress).unwrap();

        let similar: Vec<&Edge> = edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::SimilarTo)
            .collect();
        assert_eq!(similar.len(), 1);
        assert!((similar[0].strength - 0.9).abs() < 1e-4);
        assert!(edges.iter().all(|e| e.edge_type != EdgeType::RelatesTo));
        // equal positions never imply a prerequisite
        assert!(edges.iter().all(|e| e.edge_type != EdgeType::PrerequisiteOf));
    }

    #[test]
    fn test_lower_band_relates() {
        let chapters = vec![
            chapter("a", 0, at(0.0)),
            chapter("b", 1, at(0.75f32.acos())),
        ];
        let edges = build_edges(&chapters, &GraphSettings::default(), no_progress).unwrap();
        let types: Vec<EdgeType> = edges.iter().map(|e| e.edge_type).collect();
        assert_eq!(types, vec![EdgeType::RelatesTo, EdgeType::PrerequisiteOf]);
        assert_eq!(edges[1].from, "a:0000");
        assert_eq!(edges[1].to, "b:0001");
    }

    #[test]
    fn test_prerequisite_points_from_earlier_position() {
        let chapters = vec![chapter("a", 3, at(0.0)), chapter("b", 1, at(0.1))];
        let edges = build_edges(&chapters, &GraphSettings::default(), no_progress).unwrap();
        let prereq = edges
            .iter()
            .find(|e| e.edge_type == EdgeType::PrerequisiteOf)
            .unwrap();
        assert_eq!(prereq.from, "b:0001");
        assert_eq!(prereq.to, "a:0003");
    }

    #[test]
    fn test_dissimilar_pairs_have_no_edge() {
        let chapters = vec![chapter("a", 0, at(0.0)), chapter("b", 1, at(1.5))];
        let edges = build_edges(&chapters, &GraphSettings::default(), no_progress).unwrap();
        assert!(edges.is_empty());
    }

    #[test]
    fn test_next_topic_ignores_cap() {
        let chapters: Vec<Chapter> = (0..6)
            .map(|p| chapter("a", p, at(p as f32)))
            .collect();
        let settings = GraphSettings {
            max_connections: 3,
            ..GraphSettings::default()
        };
        let edges = build_edges(&chapters, &settings, no_progress).unwrap();

        let next: Vec<&Edge> = edges
            .iter()
            .filter(|e| e.edge_type == EdgeType::NextTopic)
            .collect();
        assert_eq!(next.len(), 5);
        assert_eq!(next[0].from, "a:0000");
        assert_eq!(next[4].to, "a:0005");
    }

    #[test]
    fn test_fan_out_cap_keeps_strongest() {
        let mut chapters = vec![chapter("hub", 0, at(0.0))];
        for (i, angle) in [0.05f32, 0.01, 0.2, 0.15, 0.1, 0.3].iter().enumerate() {
            chapters.push(chapter(&format!("s{}", i), 0, at(*angle)));
        }
        let settings = GraphSettings {
            max_connections: 2,
            ..GraphSettings::default()
        };
        let edges = build_edges(&chapters, &settings, no_progress).unwrap();

        let mut outgoing: BTreeMap<(&str, EdgeType), usize> = BTreeMap::new();
        for e in &edges {
            if e.edge_type.is_capped() {
                *outgoing.entry((e.from.as_str(), e.edge_type)).or_insert(0) += 1;
            }
        }
        assert!(outgoing.values().all(|&n| n <= 2));

        let hub_similar: Vec<&str> = edges
            .iter()
            .filter(|e| e.from == "hub:0000" && e.edge_type == EdgeType::SimilarTo)
            .map(|e| e.to.as_str())
            .collect();
        assert_eq!(hub_similar, vec!["s0:0000", "s1:0000"]);
    }

    #[test]
    fn test_equal_strength_ties_keep_lower_ids() {
        let mut chapters = vec![chapter("a", 0, at(0.0))];
        for position in [3, 1, 0, 2] {
            chapters.push(chapter("n", position, at(0.1)));
        }
        let settings = GraphSettings {
            max_connections: 2,
            ..GraphSettings::default()
        };
        let edges = build_edges(&chapters, &settings, no_progress).unwrap();

        let similar: Vec<&str> = edges
            .iter()
            .filter(|e| e.from == "a:0000" && e.edge_type == EdgeType::SimilarTo)
            .map(|e| e.to.as_str())
            .collect();
        assert_eq!(similar, vec!["n:0000", "n:0001"]);
    }

    #[test]
    fn test_band_edges_run_from_lower_id() {
        let mut chapters = vec![chapter("z", 0, at(0.0))];
        for position in 0..4 {
            chapters.push(chapter("a", position, at(0.1)));
        }
        let settings = GraphSettings {
            max_connections: 2,
            ..GraphSettings::default()
        };
        let edges = build_edges(&chapters, &settings, no_progress).unwrap();

        let of_type = |t: EdgeType| edges.iter().filter(move |e| e.edge_type == t);
        assert_eq!(of_type(EdgeType::SimilarTo).filter(|e| e.from == "z:0000").count(), 0);
        assert_eq!(of_type(EdgeType::SimilarTo).filter(|e| e.to == "z:0000").count(), 4);
        // prerequisites still leave z toward the later chapters, capped
        assert_eq!(
            of_type(EdgeType::PrerequisiteOf)
                .filter(|e| e.from == "z:0000")
                .count(),
            2
        );
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let chapters = vec![
            chapter("a", 0, vec![1.0, 0.0, 0.0]),
            chapter("b", 0, vec![1.0, 0.0]),
        ];
        assert!(matches!(
            build_edges(&chapters, &GraphSettings::default(), no_progress),
            Err(KlippError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_no_self_loops_and_deterministic() {
        let mut chapters: Vec<Chapter> = Vec::new();
        for source in ["x", "y", "z"] {
            for p in 0..4 {
                chapters.push(chapter(source, p, at(p as f32 * 0.2)));
            }
        }
        let first = build_edges(&chapters, &GraphSettings::default(), no_progress).unwrap();
        chapters.reverse();
        let second = build_edges(&chapters, &GraphSettings::default(), no_progress).unwrap();

        assert_eq!(first, second);
        assert!(first.iter().all(|e| e.from != e.to));
        let unique: HashSet<(String, String, EdgeType)> = first
            .iter()
            .map(|e| (e.from.clone(), e.to.clone(), e.edge_type))
            .collect();
        assert_eq!(unique.len(), first.len());
    }

    #[test]
    fn test_fewer_than_two_chapters() {
        let settings = GraphSettings::default();
        assert!(build_edges(&[], &settings, no_progress).unwrap().is_empty());
        let one = vec![chapter("a", 0, at(0.0))];
        assert!(build_edges(&one, &settings, no_progress).unwrap().is_empty());
    }

    #[test]
    fn test_progress_reported() {
        let chapters: Vec<Chapter> = (0..25)
            .map(|p| chapter(&format!("s{}", p), 0, at(0.0)))
            .collect();
        let mut calls = Vec::new();
        build_edges(&chapters, &GraphSettings::default(), |done, total| {
            calls.push((done, total))
        })
        .unwrap();
        assert_eq!(calls, vec![(10, 25), (20, 25), (25, 25)]);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = GraphSettings {
            similarity_threshold: 1.0,
            ..GraphSettings::default()
        };
        let chapters = vec![chapter("a", 0, at(0.0)), chapter("b", 0, at(0.0))];
        assert!(matches!(
            build_edges(&chapters, &settings, no_progress),
            Err(KlippError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_count_by_type() {
        let edges = vec![
            Edge::new("a", "b", EdgeType::NextTopic, 1.0),
            Edge::new("a", "c", EdgeType::SimilarTo, 0.9),
        ];
        let counts = count_by_type(&edges);
        assert_eq!(counts[&EdgeType::NextTopic], 1);
        assert_eq!(counts[&EdgeType::RelatesTo], 0);
    }
}
