//! Learning paths over prerequisite edges.

use super::{EdgeType, KnowledgeGraph};
use crate::error::{KlippError, Result};
use crate::model::Chapter;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Hop limit for `find_path_between`.
pub const MAX_PATH_HOPS: usize = 10;

fn lookup<'a>(graph: &'a KnowledgeGraph, id: &str) -> Result<&'a Chapter> {
    graph
        .chapter(id)
        .ok_or_else(|| KlippError::NotFound(format!("chapter {}", id)))
}

/// Best way to reach the target from a node along shortest prerequisite hops.
#[derive(Debug, Clone)]
struct Route {
    strength: f32,
    /// Node ids from this node to the target, inclusive.
    ids: Vec<String>,
}

/// Ordered prerequisite chain ending with `target_id`.
///
/// Starts from the nearest root (a chapter with no incoming prerequisite).
/// Among equally short chains the one with the highest summed strength wins,
/// then the one starting at the lowest chapter id. Each node is visited at
/// most once, so cycles cannot trap the search; if every ancestor lies on a
/// cycle the farthest ancestors stand in for roots.
pub fn find_learning_path(graph: &KnowledgeGraph, target_id: &str) -> Result<Vec<Chapter>> {
    if graph.is_empty() {
        return Err(KlippError::EmptyCorpus);
    }
    let target = lookup(graph, target_id)?;

    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut outgoing: HashMap<&str, Vec<(&str, f32)>> = HashMap::new();
    for edge in graph
        .edges()
        .iter()
        .filter(|e| e.edge_type == EdgeType::PrerequisiteOf && e.from != e.to)
    {
        incoming.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
        outgoing
            .entry(edge.from.as_str())
            .or_default()
            .push((edge.to.as_str(), edge.strength));
    }

    // reverse BFS: distance of every ancestor to the target
    let mut distance: BTreeMap<&str, usize> = BTreeMap::new();
    let mut layers: Vec<Vec<&str>> = vec![vec![target.id()]];
    distance.insert(target.id(), 0);
    let mut queue = VecDeque::from([target.id()]);

    while let Some(node) = queue.pop_front() {
        let d = distance[node];
        let mut parents: Vec<&str> = incoming.get(node).cloned().unwrap_or_default();
        parents.sort_unstable();
        for parent in parents {
            if distance.contains_key(parent) {
                continue;
            }
            distance.insert(parent, d + 1);
            if layers.len() <= d + 1 {
                layers.push(Vec::new());
            }
            layers[d + 1].push(parent);
            queue.push_back(parent);
        }
    }

    if distance.len() == 1 {
        return Ok(vec![target.clone()]);
    }

    // best route per node, layer by layer away from the target
    let mut routes: HashMap<&str, Route> = HashMap::new();
    routes.insert(
        target.id(),
        Route {
            strength: 0.0,
            ids: vec![target.id().to_string()],
        },
    );
    for (d, layer) in layers.iter().enumerate().skip(1) {
        for &node in layer {
            let best = outgoing
                .get(node)
                .into_iter()
                .flatten()
                .filter(|(next, _)| distance.get(next) == Some(&(d - 1)))
                .filter_map(|(next, strength)| {
                    routes.get(next).map(|route| (strength + route.strength, *next, route))
                })
                .max_by(|a, b| {
                    a.0.partial_cmp(&b.0)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| b.1.cmp(a.1))
                });

            if let Some((strength, _, route)) = best {
                let mut ids = Vec::with_capacity(route.ids.len() + 1);
                ids.push(node.to_string());
                ids.extend(route.ids.iter().cloned());
                routes.insert(node, Route { strength, ids });
            }
        }
    }

    let target_key = target.id();
    let distance_ref = &distance;
    let ancestors = move || distance_ref.iter().filter(move |(id, _)| **id != target_key);
    let mut roots: Vec<(&str, usize)> = ancestors()
        .filter(|(id, _)| !incoming.contains_key(**id))
        .map(|(id, d)| (*id, *d))
        .collect();
    if roots.is_empty() {
        let farthest = ancestors().map(|(_, d)| *d).max().unwrap_or(0);
        roots = ancestors()
            .filter(|(_, d)| **d == farthest)
            .map(|(id, d)| (*id, *d))
            .collect();
    }

    let chosen = roots
        .iter()
        .filter_map(|(id, d)| routes.get(id).map(|route| (*d, *id, route)))
        .min_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| b.2.strength.partial_cmp(&a.2.strength).unwrap_or(Ordering::Equal))
                .then_with(|| a.1.cmp(b.1))
        });

    let ids = match chosen {
        Some((_, _, route)) => route.ids.clone(),
        None => vec![target.id().to_string()],
    };
    ids.iter().map(|id| lookup(graph, id).cloned()).collect()
}

/// Shortest chain from `start_id` to `target_id`.
///
/// Prerequisite, similarity and sequence edges are walked in both
/// directions, up to `MAX_PATH_HOPS` hops. Returns an empty list when the
/// target is out of reach.
pub fn find_path_between(
    graph: &KnowledgeGraph,
    start_id: &str,
    target_id: &str,
) -> Result<Vec<Chapter>> {
    if graph.is_empty() {
        return Err(KlippError::EmptyCorpus);
    }
    let start = lookup(graph, start_id)?;
    let target = lookup(graph, target_id)?;
    if start.id() == target.id() {
        return Ok(vec![target.clone()]);
    }

    let mut neighbors: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for edge in graph.edges().iter().filter(|e| {
        matches!(
            e.edge_type,
            EdgeType::PrerequisiteOf | EdgeType::SimilarTo | EdgeType::NextTopic
        )
    }) {
        neighbors.entry(&edge.from).or_default().insert(&edge.to);
        neighbors.entry(&edge.to).or_default().insert(&edge.from);
    }

    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut depth: HashMap<&str, usize> = HashMap::from([(start.id(), 0)]);
    let mut queue = VecDeque::from([start.id()]);

    while let Some(node) = queue.pop_front() {
        let d = depth[node];
        if node == target.id() {
            break;
        }
        if d >= MAX_PATH_HOPS {
            continue;
        }
        for &next in neighbors.get(node).into_iter().flatten() {
            if depth.contains_key(next) {
                continue;
            }
            depth.insert(next, d + 1);
            parent.insert(next, node);
            queue.push_back(next);
        }
    }

    if !depth.contains_key(target.id()) {
        return Ok(Vec::new());
    }

    let mut ids = vec![target.id()];
    let mut current = target.id();
    while let Some(&prev) = parent.get(current) {
        ids.push(prev);
        current = prev;
    }
    ids.reverse();
    ids.into_iter().map(|id| lookup(graph, id).cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::chapter;
    use crate::graph::Edge;

    fn graph(ids: &[(&str, usize)], edges: &[(&str, &str, EdgeType, f32)]) -> KnowledgeGraph {
        let chapters = ids.iter().map(|(s, p)| chapter(s, *p, vec![1.0])).collect();
        let edges = edges
            .iter()
            .map(|(f, t, ty, s)| Edge::new(f, t, *ty, *s))
            .collect();
        KnowledgeGraph::new(chapters, edges, None)
    }

    fn ids(path: &[Chapter]) -> Vec<&str> {
        path.iter().map(|c| c.id()).collect()
    }

    const P: EdgeType = EdgeType::PrerequisiteOf;

    #[test]
    fn test_no_prerequisites_returns_target() {
        let g = graph(
            &[("a", 0), ("b", 1)],
            &[("a:0000", "b:0001", EdgeType::SimilarTo, 0.9)],
        );
        assert_eq!(ids(&find_learning_path(&g, "a:0000").unwrap()), vec!["a:0000"]);
        assert_eq!(ids(&find_learning_path(&g, "b:0001").unwrap()), vec!["b:0001"]);
    }

    #[test]
    fn test_chain_from_root() {
        let g = graph(
            &[("a", 0), ("b", 1), ("c", 2)],
            &[("a:0000", "b:0001", P, 0.8), ("b:0001", "c:0002", P, 0.8)],
        );
        let path = find_learning_path(&g, "c:0002").unwrap();
        assert_eq!(ids(&path), vec!["a:0000", "b:0001", "c:0002"]);
    }

    #[test]
    fn test_prefers_fewest_hops() {
        // a -> b -> t and c -> t; c is the closer root
        let g = graph(
            &[("a", 0), ("b", 1), ("c", 0), ("t", 2)],
            &[
                ("a:0000", "b:0001", P, 0.99),
                ("b:0001", "t:0002", P, 0.99),
                ("c:0000", "t:0002", P, 0.71),
            ],
        );
        assert_eq!(
            ids(&find_learning_path(&g, "t:0002").unwrap()),
            vec!["c:0000", "t:0002"]
        );
    }

    #[test]
    fn test_ties_by_strength_then_id() {
        let g = graph(
            &[("a", 0), ("b", 0), ("c", 0), ("t", 1)],
            &[
                ("a:0000", "t:0001", P, 0.75),
                ("b:0000", "t:0001", P, 0.9),
                ("c:0000", "t:0001", P, 0.9),
            ],
        );
        assert_eq!(
            ids(&find_learning_path(&g, "t:0001").unwrap()),
            vec!["b:0000", "t:0001"]
        );
    }

    #[test]
    fn test_cycle_does_not_loop() {
        let g = graph(
            &[("a", 0), ("b", 1), ("t", 2)],
            &[
                ("a:0000", "b:0001", P, 0.8),
                ("b:0001", "a:0000", P, 0.8),
                ("b:0001", "t:0002", P, 0.8),
            ],
        );
        let path = find_learning_path(&g, "t:0002").unwrap();
        assert_eq!(ids(&path), vec!["a:0000", "b:0001", "t:0002"]);
    }

    #[test]
    fn test_missing_target() {
        let g = graph(&[("a", 0)], &[]);
        assert!(matches!(
            find_learning_path(&g, "zzz"),
            Err(KlippError::NotFound(_))
        ));
        assert!(matches!(
            find_learning_path(&KnowledgeGraph::default(), "a:0000"),
            Err(KlippError::EmptyCorpus)
        ));
    }

    #[test]
    fn test_path_between_walks_any_direction() {
        let g = graph(
            &[("a", 0), ("a", 1), ("b", 0), ("c", 0)],
            &[
                ("a:0000", "a:0001", EdgeType::NextTopic, 1.0),
                ("b:0000", "a:0001", EdgeType::SimilarTo, 0.9),
                ("c:0000", "b:0000", EdgeType::RelatesTo, 0.72),
            ],
        );
        let path = find_path_between(&g, "a:0000", "b:0000").unwrap();
        assert_eq!(ids(&path), vec!["a:0000", "a:0001", "b:0000"]);

        // RELATES_TO is not walked
        assert!(find_path_between(&g, "a:0000", "c:0000").unwrap().is_empty());
        assert_eq!(ids(&find_path_between(&g, "b:0000", "b:0000").unwrap()), vec!["b:0000"]);
        assert!(matches!(
            find_path_between(&g, "a:0000", "nope"),
            Err(KlippError::NotFound(_))
        ));
    }

    #[test]
    fn test_path_between_respects_hop_limit() {
        let chain: Vec<(&str, usize)> = (0..13).map(|p| ("long", p)).collect();
        let names: Vec<String> = (0..13).map(|p| Chapter::make_id("long", p)).collect();
        let edges: Vec<(&str, &str, EdgeType, f32)> = names
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str(), EdgeType::NextTopic, 1.0))
            .collect();
        let g = graph(&chain, &edges);

        assert_eq!(find_path_between(&g, &names[0], &names[10]).unwrap().len(), 11);
        assert!(find_path_between(&g, &names[0], &names[12]).unwrap().is_empty());
    }
}
