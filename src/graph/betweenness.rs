//! Betweenness centrality (Brandes).
//!
//! For each source `s` a single-source shortest-path pass records path counts
//! `σ` and predecessors, then dependencies are accumulated in reverse
//! distance order:
//!
//! ```text
//! δ(v) = Σ_{w : v ∈ pred(w)} σ(v)/σ(w) · (1 + δ(w))
//! ```
//!
//! Unweighted graphs use BFS; `weighted = true` switches to Dijkstra with
//! edge weights as distances. Sources are processed in fixed-size chunks
//! whose partial sums are added in chunk order, so the parallel and
//! sequential paths produce bit-identical scores.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use super::adjacency::{build_directed, build_undirected};
use super::models::{
    rank_scores, BetweennessConfig, BetweennessMetadata, BetweennessResult, EntityGraph,
    RankedEntity,
};

/// Minimum sources per chunk.
const MIN_CHUNK: usize = 16;
/// Upper bound on the number of partial score vectors held at once.
const MAX_CHUNKS: usize = 64;

/// Relative tolerance for equal weighted path lengths.
const DIST_EPSILON: f64 = 1e-12;

/// Compute betweenness centrality for every entity in the graph.
pub fn calculate_betweenness(graph: &EntityGraph, config: &BetweennessConfig) -> BetweennessResult {
    let n = graph.node_count();
    let neighbors = if config.directed {
        build_directed(graph).out_neighbors
    } else {
        build_undirected(graph).neighbors
    };

    let (sources, sample_size) = select_sources(n, config.sample_size, config.seed);
    let mut raw = accumulate_sources(&neighbors, &sources, config);

    let mut scale = 1.0;
    if let Some(k) = sample_size {
        scale *= n as f64 / k as f64;
    }
    if !config.directed {
        // Every undirected path is found once from each end.
        scale /= 2.0;
    }
    if config.normalized && n > 2 {
        let pairs = ((n - 1) * (n - 2)) as f64;
        scale /= if config.directed { pairs } else { pairs / 2.0 };
    }
    for score in raw.iter_mut() {
        *score *= scale;
    }

    let scores = graph
        .node_ids()
        .into_iter()
        .zip(raw)
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    let ranked_entities = rank_scores(&scores);

    tracing::debug!(
        "Betweenness over {} nodes from {} sources (weighted={}, directed={})",
        n,
        sources.len(),
        config.weighted,
        config.directed
    );

    BetweennessResult {
        scores,
        ranked_entities,
        metadata: BetweennessMetadata {
            normalized: config.normalized,
            directed: config.directed,
            sample_size,
            node_count: n,
            edge_count: graph.edge_count(),
        },
    }
}

/// Entities whose normalized betweenness exceeds `threshold`, highest first.
///
/// Forces `normalized = true` regardless of the passed config.
pub fn identify_bridge_entities(
    graph: &EntityGraph,
    threshold: f64,
    config: &BetweennessConfig,
) -> Vec<RankedEntity> {
    let config = BetweennessConfig {
        normalized: true,
        ..config.clone()
    };
    calculate_betweenness(graph, &config).entities_above(threshold)
}

/// Pick the traversal sources. Returns the sample size when sampling applies.
fn select_sources(n: usize, sample_size: Option<usize>, seed: u64) -> (Vec<usize>, Option<usize>) {
    match sample_size {
        Some(k) if k > 0 && k < n => {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut pivots: Vec<usize> = (0..n).collect();
            pivots.shuffle(&mut rng);
            pivots.truncate(k);
            pivots.sort_unstable();
            (pivots, Some(k))
        }
        _ => ((0..n).collect(), None),
    }
}

fn accumulate_sources(
    neighbors: &[Vec<(usize, f64)>],
    sources: &[usize],
    config: &BetweennessConfig,
) -> Vec<f64> {
    let n = neighbors.len();
    if sources.is_empty() {
        return vec![0.0; n];
    }
    let chunk_size = MIN_CHUNK.max(sources.len().div_ceil(MAX_CHUNKS));
    let weighted = config.weighted;

    let run_chunk = |chunk: &[usize]| -> Vec<f64> {
        let mut paths = ShortestPaths::new(n);
        let mut partial = vec![0.0; n];
        for &s in chunk {
            if weighted {
                paths.dijkstra(neighbors, s);
            } else {
                paths.bfs(neighbors, s);
            }
            paths.accumulate(s, &mut partial);
        }
        partial
    };

    let partials: Vec<Vec<f64>> = if sources.len() >= config.parallel_threshold {
        sources.par_chunks(chunk_size).map(run_chunk).collect()
    } else {
        sources.chunks(chunk_size).map(run_chunk).collect()
    };

    let mut total = vec![0.0; n];
    for partial in partials {
        for (t, p) in total.iter_mut().zip(partial) {
            *t += p;
        }
    }
    total
}

/// Reusable single-source state. Only nodes reached by the previous pass are
/// reset between sources.
struct ShortestPaths {
    dist: Vec<f64>,
    sigma: Vec<f64>,
    delta: Vec<f64>,
    preds: Vec<Vec<usize>>,
    settled: Vec<bool>,
    /// Nodes in non-decreasing distance order
    order: Vec<usize>,
    /// Every node touched by the pass, settled or not
    touched: Vec<usize>,
}

impl ShortestPaths {
    fn new(n: usize) -> Self {
        Self {
            dist: vec![f64::INFINITY; n],
            sigma: vec![0.0; n],
            delta: vec![0.0; n],
            preds: vec![Vec::new(); n],
            settled: vec![false; n],
            order: Vec::with_capacity(n),
            touched: Vec::with_capacity(n),
        }
    }

    fn reset(&mut self, source: usize) {
        for &v in &self.touched {
            self.dist[v] = f64::INFINITY;
            self.sigma[v] = 0.0;
            self.delta[v] = 0.0;
            self.preds[v].clear();
            self.settled[v] = false;
        }
        self.order.clear();
        self.touched.clear();

        self.dist[source] = 0.0;
        self.sigma[source] = 1.0;
        self.touched.push(source);
    }

    fn bfs(&mut self, neighbors: &[Vec<(usize, f64)>], source: usize) {
        self.reset(source);
        let mut queue = VecDeque::from([source]);
        while let Some(v) = queue.pop_front() {
            self.order.push(v);
            let next = self.dist[v] + 1.0;
            for &(w, _) in &neighbors[v] {
                if self.dist[w].is_infinite() {
                    self.dist[w] = next;
                    self.touched.push(w);
                    queue.push_back(w);
                }
                if self.dist[w] == next {
                    self.sigma[w] += self.sigma[v];
                    self.preds[w].push(v);
                }
            }
        }
    }

    fn dijkstra(&mut self, neighbors: &[Vec<(usize, f64)>], source: usize) {
        self.reset(source);
        let mut heap = BinaryHeap::from([HeapEntry {
            dist: 0.0,
            node: source,
        }]);
        while let Some(HeapEntry { dist, node: v }) = heap.pop() {
            if self.settled[v] || dist > self.dist[v] {
                continue;
            }
            self.settled[v] = true;
            self.order.push(v);
            for &(w, weight) in &neighbors[v] {
                if self.settled[w] {
                    continue;
                }
                let alt = dist + weight;
                let current = self.dist[w];
                let tolerance = DIST_EPSILON * alt.abs().max(1.0);
                if current.is_infinite() || alt < current - tolerance {
                    if current.is_infinite() {
                        self.touched.push(w);
                    }
                    self.dist[w] = alt;
                    self.sigma[w] = self.sigma[v];
                    self.preds[w].clear();
                    self.preds[w].push(v);
                    heap.push(HeapEntry { dist: alt, node: w });
                } else if (alt - current).abs() <= tolerance {
                    self.sigma[w] += self.sigma[v];
                    self.preds[w].push(v);
                }
            }
        }
    }

    /// Add this source's dependencies into `out`. The source itself is skipped.
    fn accumulate(&mut self, source: usize, out: &mut [f64]) {
        for &w in self.order.iter().rev() {
            let coeff = (1.0 + self.delta[w]) / self.sigma[w];
            for &v in &self.preds[w] {
                self.delta[v] += self.sigma[v] * coeff;
            }
            if w != source {
                out[w] += self.delta[w];
            }
        }
    }
}

/// Min-heap entry ordered by distance, then node index.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    dist: f64,
    node: usize,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::models::{EntityEdge, EntityNode};

    fn make_graph(nodes: &[&str], edges: &[(&str, &str)]) -> EntityGraph {
        EntityGraph::from_parts(
            nodes.iter().map(|id| EntityNode::new(*id)),
            edges.iter().map(|(s, t)| EntityEdge::new(*s, *t)),
        )
    }

    fn undirected_raw() -> BetweennessConfig {
        BetweennessConfig {
            normalized: false,
            directed: false,
            ..BetweennessConfig::default()
        }
    }

    /// Two triangles joined through a single bridge node.
    fn make_barbell() -> EntityGraph {
        make_graph(
            &["a1", "a2", "a3", "bridge", "b1", "b2", "b3"],
            &[
                ("a1", "a2"),
                ("a2", "a3"),
                ("a3", "a1"),
                ("b1", "b2"),
                ("b2", "b3"),
                ("b3", "b1"),
                ("a1", "bridge"),
                ("bridge", "b1"),
            ],
        )
    }

    #[test]
    fn test_chain_undirected_middle_is_one() {
        let g = make_graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let result = calculate_betweenness(&g, &undirected_raw());
        assert!((result.scores["a"] - 0.0).abs() < 1e-12);
        assert!((result.scores["b"] - 1.0).abs() < 1e-12);
        assert!((result.scores["c"] - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_chain_directed_normalized() {
        let g = make_graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let result = calculate_betweenness(&g, &BetweennessConfig::default());
        // One path a->c through b, (n-1)(n-2) = 2 ordered pairs
        assert!((result.scores["b"] - 0.5).abs() < 1e-12);
        assert_eq!(result.ranked_entities[0].id, "b");
    }

    #[test]
    fn test_two_nodes_all_zero() {
        let g = make_graph(&["a", "b"], &[("a", "b")]);
        let result = calculate_betweenness(&g, &BetweennessConfig::default());
        assert!(result.scores.values().all(|&s| s == 0.0));
    }

    #[test]
    fn test_empty_graph() {
        let result = calculate_betweenness(&EntityGraph::new(), &BetweennessConfig::default());
        assert!(result.scores.is_empty());
        assert_eq!(result.metadata.node_count, 0);
    }

    #[test]
    fn test_barbell_bridge_highest() {
        let g = make_barbell();
        let result = calculate_betweenness(&g, &undirected_raw());
        assert_eq!(result.ranked_entities[0].id, "bridge");
        assert!(result.scores["bridge"] > result.scores["a2"]);
        // 3 x 3 cross pairs; a1 also carries {a2, a3} x {bridge, b1, b2, b3}
        assert!((result.scores["bridge"] - 9.0).abs() < 1e-9);
        assert!((result.scores["a1"] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_star_center_highest() {
        let g = make_graph(
            &["center", "l1", "l2", "l3", "l4"],
            &[("center", "l1"), ("center", "l2"), ("center", "l3"), ("center", "l4")],
        );
        let result = calculate_betweenness(
            &g,
            &BetweennessConfig {
                directed: false,
                ..BetweennessConfig::default()
            },
        );
        assert!((result.scores["center"] - 1.0).abs() < 1e-12);
        assert!(result.scores["l1"].abs() < 1e-12);
    }

    #[test]
    fn test_disconnected_components_do_not_contribute() {
        let g = make_graph(
            &["a", "b", "c", "x", "y", "z"],
            &[("a", "b"), ("b", "c"), ("x", "y"), ("y", "z")],
        );
        let result = calculate_betweenness(&g, &undirected_raw());
        assert!((result.scores["b"] - 1.0).abs() < 1e-12);
        assert!((result.scores["y"] - 1.0).abs() < 1e-12);
        assert!(result.scores["a"].abs() < 1e-12);
    }

    #[test]
    fn test_sampling_is_seed_deterministic() {
        let g = make_barbell();
        let config = BetweennessConfig {
            sample_size: Some(3),
            seed: 7,
            ..undirected_raw()
        };
        let first = calculate_betweenness(&g, &config);
        let second = calculate_betweenness(&g, &config);
        assert_eq!(first, second);
        assert_eq!(first.metadata.sample_size, Some(3));
    }

    #[test]
    fn test_sample_larger_than_graph_is_exact() {
        let g = make_barbell();
        let exact = calculate_betweenness(&g, &undirected_raw());
        let sampled = calculate_betweenness(
            &g,
            &BetweennessConfig {
                sample_size: Some(100),
                ..undirected_raw()
            },
        );
        assert_eq!(exact.scores, sampled.scores);
        assert_eq!(sampled.metadata.sample_size, None);
    }

    #[test]
    fn test_select_sources_sorted_and_unique() {
        let (sources, k) = select_sources(50, Some(10), 42);
        assert_eq!(k, Some(10));
        assert_eq!(sources.len(), 10);
        assert!(sources.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(select_sources(50, Some(10), 42).0, sources);
    }

    #[test]
    fn test_parallel_matches_sequential_exactly() {
        let names: Vec<String> = (0..120).map(|i| format!("n{}", i)).collect();
        let mut edges = Vec::new();
        for i in 0..120 {
            for offset in [1, 5, 17] {
                edges.push(EntityEdge::new(names[i].clone(), names[(i + offset) % 120].clone()));
            }
        }
        let g = EntityGraph::from_parts(names.iter().map(EntityNode::new), edges);

        let sequential = calculate_betweenness(
            &g,
            &BetweennessConfig {
                parallel_threshold: usize::MAX,
                ..BetweennessConfig::default()
            },
        );
        let parallel = calculate_betweenness(
            &g,
            &BetweennessConfig {
                parallel_threshold: 1,
                ..BetweennessConfig::default()
            },
        );
        assert_eq!(sequential.scores, parallel.scores);
    }

    #[test]
    fn test_weighted_prefers_light_path() {
        // a-b-d costs 2, a-c-d costs 20: only b carries a->d
        let g = EntityGraph::from_parts(
            ["a", "b", "c", "d"].into_iter().map(EntityNode::new),
            vec![
                EntityEdge::new("a", "b"),
                EntityEdge::new("b", "d"),
                EntityEdge::new("a", "c").with_weight(10.0),
                EntityEdge::new("c", "d").with_weight(10.0),
            ],
        );
        let weighted = calculate_betweenness(
            &g,
            &BetweennessConfig {
                weighted: true,
                normalized: false,
                ..BetweennessConfig::default()
            },
        );
        assert!((weighted.scores["b"] - 1.0).abs() < 1e-12);
        assert!(weighted.scores["c"].abs() < 1e-12);

        let hops = calculate_betweenness(
            &g,
            &BetweennessConfig {
                normalized: false,
                ..BetweennessConfig::default()
            },
        );
        assert!((hops.scores["b"] - 0.5).abs() < 1e-12);
        assert!((hops.scores["c"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_identify_bridge_entities_threshold() {
        let g = make_barbell();
        let config = BetweennessConfig {
            directed: false,
            normalized: false,
            ..BetweennessConfig::default()
        };
        // Normalized over 15 pairs: bridge 9/15, a1 and b1 8/15
        let bridges = identify_bridge_entities(&g, 0.55, &config);
        let ids: Vec<&str> = bridges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["bridge"]);
        assert!((bridges[0].score - 0.6).abs() < 1e-9);

        let wider = identify_bridge_entities(&g, 0.5, &config);
        let ids: Vec<&str> = wider.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["bridge", "a1", "b1"]);
        assert!(identify_bridge_entities(&g, 1.0, &config).is_empty());
    }

    #[test]
    fn test_matches_rustworkx_reference() {
        let g = make_graph(
            &["a", "b", "c", "d", "e", "f"],
            &[
                ("a", "b"),
                ("b", "c"),
                ("c", "d"),
                ("a", "e"),
                ("e", "d"),
                ("d", "f"),
                ("f", "a"),
                ("b", "e"),
            ],
        );
        let ours = calculate_betweenness(&g, &BetweennessConfig::default());
        let reference =
            rustworkx_core::centrality::betweenness_centrality(&g.graph, false, true, 200);
        for idx in g.graph.node_indices() {
            let id = &g.graph[idx].id;
            let expected = reference[idx.index()].unwrap_or(0.0);
            assert!(
                (ours.scores[id] - expected).abs() < 1e-9,
                "{}: ours={} reference={}",
                id,
                ours.scores[id],
                expected
            );
        }
    }
}
