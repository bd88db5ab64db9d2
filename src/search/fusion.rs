//! Score fusion: normalize two candidate lists and merge them by chunk id.
//!
//! Everything here is pure; the searcher feeds it candidate lists and the
//! chunk catalog.

use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Per-chunk fusion record. A signal the chunk was not retrieved by is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FusedScore {
    /// Normalized keyword score.
    pub lexical: Option<f32>,
    /// Normalized semantic score.
    pub semantic: Option<f32>,
    /// Weighted sum, after any title boost.
    pub fused: f32,
}

/// Min-max normalize scores to [0, 1].
///
/// A list with a single member or with zero range maps every member to 1.0.
pub fn min_max_normalize(scores: &[(String, f32)]) -> Vec<(String, f32)> {
    let (min, max) = scores.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (_, s)| {
        (lo.min(*s), hi.max(*s))
    });
    let range = max - min;

    scores
        .iter()
        .map(|(id, score)| {
            let normalized = if scores.len() == 1 || range <= f32::EPSILON {
                1.0
            } else {
                (score - min) / range
            };
            (id.clone(), normalized)
        })
        .collect()
}

/// Merge normalized lists into one record per chunk id.
///
/// A missing signal contributes nothing to `fused`.
pub fn fuse(
    lexical: &[(String, f32)],
    semantic: &[(String, f32)],
    lexical_weight: f32,
    semantic_weight: f32,
) -> BTreeMap<String, FusedScore> {
    let mut merged: BTreeMap<String, FusedScore> = BTreeMap::new();

    for (id, score) in lexical {
        merged.entry(id.clone()).or_default().lexical = Some(*score);
    }
    for (id, score) in semantic {
        merged.entry(id.clone()).or_default().semantic = Some(*score);
    }

    for record in merged.values_mut() {
        record.fused = lexical_weight * record.lexical.unwrap_or(0.0)
            + semantic_weight * record.semantic.unwrap_or(0.0);
    }
    merged
}

/// Multiply `fused` by `boost` for every chunk whose source title matches.
pub fn apply_title_boost<F>(merged: &mut BTreeMap<String, FusedScore>, boost: f32, mut title_matches: F)
where
    F: FnMut(&str) -> bool,
{
    for (id, record) in merged.iter_mut() {
        if title_matches(id) {
            record.fused *= boost;
        }
    }
}

/// Best `k` records by fused score; ties go to the lower id.
pub fn top_k(merged: BTreeMap<String, FusedScore>, k: usize) -> Vec<(String, FusedScore)> {
    let mut ranked: Vec<(String, FusedScore)> = merged.into_iter().collect();
    ranked.sort_by(|a, b| {
        b.1.fused
            .partial_cmp(&a.1.fused)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[(&str, f32)]) -> Vec<(String, f32)> {
        items.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn test_normalize_spreads_to_unit_range() {
        let normalized = min_max_normalize(&list(&[("a", 10.0), ("b", 5.0), ("c", 0.0)]));
        assert_eq!(normalized, list(&[("a", 1.0), ("b", 0.5), ("c", 0.0)]));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = min_max_normalize(&list(&[("a", 3.2), ("b", 1.1), ("c", 7.9), ("d", 4.0)]));
        let twice = min_max_normalize(&once);
        for ((_, x), (_, y)) in once.iter().zip(twice.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalize_degenerate_lists() {
        assert_eq!(min_max_normalize(&list(&[("a", 0.2)])), list(&[("a", 1.0)]));
        assert_eq!(
            min_max_normalize(&list(&[("a", 4.0), ("b", 4.0)])),
            list(&[("a", 1.0), ("b", 1.0)])
        );
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn test_missing_signal_contributes_zero() {
        let merged = fuse(
            &list(&[("both", 1.0), ("lex", 0.5)]),
            &list(&[("both", 0.5), ("sem", 1.0)]),
            0.4,
            0.6,
        );

        assert!((merged["both"].fused - 0.7).abs() < 1e-6);
        assert!((merged["lex"].fused - 0.2).abs() < 1e-6);
        assert_eq!(merged["lex"].semantic, None);
        assert!((merged["sem"].fused - 0.6).abs() < 1e-6);
        assert_eq!(merged["sem"].lexical, None);
    }

    #[test]
    fn test_both_lists_empty() {
        let merged = fuse(&[], &[], 0.4, 0.6);
        assert!(merged.is_empty());
        assert!(top_k(merged, 5).is_empty());
    }

    #[test]
    fn test_raising_semantic_weight_favors_semantic_leader() {
        let lexical = list(&[("a", 0.5), ("b", 0.5)]);
        let semantic = list(&[("a", 0.9), ("b", 0.3)]);

        let mut previous_gap = f32::NEG_INFINITY;
        for step in 0..=10 {
            let w_sem = step as f32 / 10.0;
            let merged = fuse(&lexical, &semantic, 1.0 - w_sem, w_sem);
            let gap = merged["a"].fused - merged["b"].fused;
            assert!(gap >= previous_gap - 1e-6);
            previous_gap = gap;
        }
    }

    #[test]
    fn test_title_boost_and_ordering() {
        let mut merged = fuse(&list(&[("a", 1.0), ("b", 0.9)]), &[], 1.0, 0.0);
        apply_title_boost(&mut merged, 1.2, |id| id == "b");
        let ranked = top_k(merged, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0, "b");
        assert!((ranked[0].1.fused - 1.08).abs() < 1e-6);
    }

    #[test]
    fn test_ties_resolved_by_id() {
        let merged = fuse(&list(&[("z", 1.0), ("m", 1.0), ("a", 1.0)]), &[], 1.0, 0.0);
        let ids: Vec<String> = top_k(merged, 3).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }
}
