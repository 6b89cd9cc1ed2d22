//! Community detection: Louvain.
//!
//! Two phases repeated until the partition stops changing:
//!
//! 1. **Local moving**: every node, visited in index order, moves to the
//!    neighbouring community with the largest gain
//!    `ΔQ = [k_i,in(C′) − γ·k_i·Σtot(C′)/2m] − [k_i,in(C) − γ·k_i·Σtot(C)/2m]`
//!    provided the gain exceeds `min_modularity_gain`. Ties go to the lowest
//!    community index. Sweeps repeat until one produces no move.
//! 2. **Aggregation**: each community collapses into a super-node. Edges
//!    between communities are summed; edges inside a community disappear
//!    from the neighbour lists but stay in the super-node's degree.
//!
//! Every level is a flat arena of super-nodes; `membership[v]` maps each
//! original node to its super-node at the current level, so no level keeps
//! a reference to the previous one.
//!
//! Modularity of the final labels is computed over the original graph.

use std::collections::BTreeMap;

use super::adjacency::{build_undirected, UndirectedAdjacency};
use super::models::{
    CommunityDetectionResult, CommunityInfo, CommunityMetadata, EntityGraph, LouvainConfig,
};

// ============================================================================
// Aggregation level
// ============================================================================

/// One coarsening level. Degrees are carried explicitly because a super-node's
/// degree includes its internal weight, which is not in `neighbors`.
#[derive(Debug, Clone)]
pub(crate) struct Level {
    pub(crate) neighbors: Vec<Vec<(usize, f64)>>,
    pub(crate) degree: Vec<f64>,
}

impl Level {
    pub(crate) fn from_adjacency(adj: &UndirectedAdjacency) -> Self {
        Self {
            neighbors: adj.neighbors.clone(),
            degree: adj.degree.clone(),
        }
    }

    fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Collapse the level along `labels` (dense, `0..count`).
    fn aggregate(&self, labels: &[usize], count: usize) -> Self {
        let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
        let mut degree = vec![0.0; count];

        for (i, neighbors) in self.neighbors.iter().enumerate() {
            let ci = labels[i];
            degree[ci] += self.degree[i];
            for &(j, w) in neighbors {
                let cj = labels[j];
                if ci != cj {
                    *links[ci].entry(cj).or_insert(0.0) += w;
                }
            }
        }

        Self {
            neighbors: links.into_iter().map(|m| m.into_iter().collect()).collect(),
            degree,
        }
    }
}

// ============================================================================
// Local moving
// ============================================================================

/// Mutable state of the local-moving phase over one level.
///
/// `labels` are dense community indices; `sigma_tot[c]` is the total degree of
/// community `c`. Shared by the full detector and the incremental frontier.
pub(crate) struct LocalMoving<'a> {
    level: &'a Level,
    pub(crate) labels: Vec<usize>,
    sigma_tot: Vec<f64>,
    m2: f64,
    resolution: f64,
    min_gain: f64,
    weight_to: Vec<f64>,
    seen: Vec<bool>,
    touched: Vec<usize>,
}

impl<'a> LocalMoving<'a> {
    /// `community_count` must exceed every value in `labels`.
    pub(crate) fn new(
        level: &'a Level,
        labels: Vec<usize>,
        community_count: usize,
        config: &LouvainConfig,
    ) -> Self {
        let mut sigma_tot = vec![0.0; community_count];
        for (node, &c) in labels.iter().enumerate() {
            sigma_tot[c] += level.degree[node];
        }
        let m2: f64 = level.degree.iter().sum();
        Self {
            level,
            labels,
            sigma_tot,
            m2,
            resolution: config.resolution,
            min_gain: config.min_modularity_gain,
            weight_to: vec![0.0; community_count],
            seen: vec![false; community_count],
            touched: Vec::new(),
        }
    }

    /// Evaluate `node` and move it if some neighbouring community beats
    /// staying by more than the minimum gain. Returns whether it moved.
    pub(crate) fn try_move(&mut self, node: usize) -> bool {
        if self.m2 <= 0.0 || self.level.neighbors[node].is_empty() {
            return false;
        }
        let current = self.labels[node];
        let k_i = self.level.degree[node];

        for &(j, w) in &self.level.neighbors[node] {
            let c = self.labels[j];
            if !self.seen[c] {
                self.seen[c] = true;
                self.touched.push(c);
            }
            self.weight_to[c] += w;
        }
        self.touched.sort_unstable();

        // Take the node out of its community before scoring.
        self.sigma_tot[current] -= k_i;
        let stay = self.weight_to[current] - self.resolution * k_i * self.sigma_tot[current] / self.m2;

        let mut best = current;
        let mut best_gain = self.min_gain;
        for &c in &self.touched {
            if c == current {
                continue;
            }
            let join = self.weight_to[c] - self.resolution * k_i * self.sigma_tot[c] / self.m2;
            let gain = join - stay;
            if gain > best_gain {
                best_gain = gain;
                best = c;
            }
        }

        self.sigma_tot[best] += k_i;
        self.labels[node] = best;

        for &c in &self.touched {
            self.weight_to[c] = 0.0;
            self.seen[c] = false;
        }
        self.touched.clear();

        best != current
    }
}

// ============================================================================
// Full detection
// ============================================================================

/// Outcome of the multi-level optimisation on an adjacency.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Partition {
    /// Dense labels numbered by first appearance in node order
    pub(crate) labels: Vec<u32>,
    pub(crate) iterations: usize,
    pub(crate) levels: usize,
}

/// Run Louvain on an undirected adjacency.
pub(crate) fn louvain_partition(adj: &UndirectedAdjacency, config: &LouvainConfig) -> Partition {
    let n = adj.node_count();
    let mut membership: Vec<usize> = (0..n).collect();
    let mut iterations = 0;
    let mut levels = 0;

    if n > 0 && adj.total_weight > 0.0 {
        let mut level = Level::from_adjacency(adj);
        let mut budget = config.max_iterations;

        while budget > 0 {
            let count = level.node_count();
            let mut mover = LocalMoving::new(&level, (0..count).collect(), count, config);
            let mut moved_any = false;

            while budget > 0 {
                budget -= 1;
                iterations += 1;
                let mut moves = 0;
                for node in 0..count {
                    if mover.try_move(node) {
                        moves += 1;
                    }
                }
                if moves == 0 {
                    break;
                }
                moved_any = true;
            }

            if !moved_any {
                break;
            }

            let (labels, communities) = compact_labels(&mover.labels);
            levels += 1;
            tracing::debug!(
                "Louvain level {}: {} nodes -> {} communities",
                levels,
                count,
                communities
            );
            for m in membership.iter_mut() {
                *m = labels[*m];
            }
            if communities == count {
                break;
            }
            level = level.aggregate(&labels, communities);
        }
    }

    let (labels, _) = compact_labels(&membership);
    Partition {
        labels: labels.into_iter().map(|c| c as u32).collect(),
        iterations,
        levels,
    }
}

/// Renumber labels to `0..k` in order of first appearance.
fn compact_labels(labels: &[usize]) -> (Vec<usize>, usize) {
    let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
    let compact = labels
        .iter()
        .map(|&c| {
            let next = remap.len();
            *remap.entry(c).or_insert(next)
        })
        .collect();
    (compact, remap.len())
}

/// Detect communities using the Louvain method.
///
/// Works on the undirected view of the graph. Empty graphs and graphs with no
/// edge weight yield one singleton community per node and modularity 0.
pub fn detect_communities(graph: &EntityGraph, config: &LouvainConfig) -> CommunityDetectionResult {
    let adj = build_undirected(graph);
    let partition = louvain_partition(&adj, config);
    let modularity = calculate_modularity(&partition.labels, &adj, config.resolution);
    build_result(
        graph,
        &adj,
        &partition.labels,
        modularity,
        partition.iterations,
        partition.levels,
    )
}

/// Assemble the public result from per-node labels.
pub(crate) fn build_result(
    graph: &EntityGraph,
    adj: &UndirectedAdjacency,
    labels: &[u32],
    modularity: f64,
    iterations: usize,
    levels: usize,
) -> CommunityDetectionResult {
    let communities: BTreeMap<String, u32> = graph
        .node_ids()
        .into_iter()
        .zip(labels.iter())
        .map(|(id, &c)| (id.to_string(), c))
        .collect();
    let community_list = summarize_communities(graph, adj, labels);

    CommunityDetectionResult {
        communities,
        metadata: CommunityMetadata {
            node_count: graph.node_count(),
            edge_count: graph.edge_count(),
            community_count: community_list.len(),
            iterations,
            levels,
        },
        community_list,
        modularity,
    }
}

// ============================================================================
// Modularity
// ============================================================================

/// Newman modularity with resolution:
/// `Q = Σ_c [Σ_in,c / 2m − γ·(Σ_tot,c / 2m)²]`.
///
/// `labels[i]` is the community of node `i`. Returns exactly 0 when the graph
/// carries no edge weight.
pub fn calculate_modularity(labels: &[u32], adj: &UndirectedAdjacency, resolution: f64) -> f64 {
    if adj.total_weight <= 0.0 || labels.is_empty() {
        return 0.0;
    }
    let m2 = 2.0 * adj.total_weight;
    let mut sigma_in: BTreeMap<u32, f64> = BTreeMap::new();
    let mut sigma_tot: BTreeMap<u32, f64> = BTreeMap::new();

    for ((neighbors, &c), &k) in adj.neighbors.iter().zip(labels).zip(&adj.degree) {
        *sigma_tot.entry(c).or_insert(0.0) += k;
        let inside: f64 = neighbors
            .iter()
            .filter(|&&(j, _)| labels.get(j) == Some(&c))
            .map(|&(_, w)| w)
            .sum();
        *sigma_in.entry(c).or_insert(0.0) += inside;
    }

    sigma_tot
        .iter()
        .map(|(c, &tot)| {
            let inside = sigma_in.get(c).copied().unwrap_or(0.0);
            inside / m2 - resolution * (tot / m2).powi(2)
        })
        .sum()
}

// ============================================================================
// Community summaries
// ============================================================================

/// Build one [`CommunityInfo`] per label, sorted by size descending then ID.
pub(crate) fn summarize_communities(
    graph: &EntityGraph,
    adj: &UndirectedAdjacency,
    labels: &[u32],
) -> Vec<CommunityInfo> {
    let mut groups: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (node, &c) in labels.iter().enumerate() {
        groups.entry(c).or_default().push(node);
    }

    let nodes: Vec<_> = graph.graph.node_indices().map(|idx| &graph.graph[idx]).collect();
    let mut communities: Vec<CommunityInfo> = groups
        .into_iter()
        .map(|(id, members)| {
            let mut type_histogram: BTreeMap<String, usize> = BTreeMap::new();
            let mut total_weight = 0.0;
            for &m in &members {
                total_weight += nodes[m].weight;
                if let Some(t) = &nodes[m].entity_type {
                    *type_histogram.entry(t.clone()).or_insert(0) += 1;
                }
            }
            // Strict comparison keeps the first (smallest) type on ties.
            let dominant_type = type_histogram
                .iter()
                .fold(None::<(&String, usize)>, |best, (t, &count)| match best {
                    Some((_, top)) if top >= count => best,
                    _ => Some((t, count)),
                })
                .map(|(t, _)| t.clone());

            let mut by_degree = members.clone();
            by_degree.sort_by(|&a, &b| {
                let da = adj.degree.get(a).copied().unwrap_or(0.0);
                let db = adj.degree.get(b).copied().unwrap_or(0.0);
                db.total_cmp(&da).then(a.cmp(&b))
            });
            let key_names: Vec<&str> = by_degree.iter().map(|&m| nodes[m].name.as_str()).collect();
            let label = generate_community_label(&key_names, dominant_type.as_deref());

            CommunityInfo {
                id,
                size: members.len(),
                members: members.iter().map(|&m| nodes[m].id.clone()).collect(),
                type_histogram,
                dominant_type,
                total_weight,
                label,
            }
        })
        .collect();
    communities.sort_by(|a, b| b.size.cmp(&a.size).then(a.id.cmp(&b.id)));
    communities
}

/// Generate a human-readable label from the leading member names.
///
/// `names` are expected most-connected first.
fn generate_community_label(names: &[&str], dominant_type: Option<&str>) -> String {
    const SHOWN: usize = 2;
    let leading = match names {
        [] => return "empty".to_string(),
        [only] => only.to_string(),
        _ if names.len() <= SHOWN => names.join(", "),
        _ => format!("{} +{}", names[..SHOWN].join(", "), names.len() - SHOWN),
    };
    match dominant_type {
        Some(t) => format!("{}: {}", t, leading),
        None => leading,
    }
}

// ============================================================================
// Tests
// ============================================================================

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

    /// Two cliques of `size` nodes joined by a single bridge edge.
    fn make_two_cliques(size: usize) -> EntityGraph {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for prefix in ["a", "b"] {
            let names: Vec<String> = (0..size).map(|i| format!("{}_{}", prefix, i)).collect();
            for i in 0..size {
                for j in (i + 1)..size {
                    edges.push(EntityEdge::new(names[i].clone(), names[j].clone()));
                }
            }
            nodes.extend(names.into_iter().map(EntityNode::new));
        }
        edges.push(EntityEdge::new("a_0", "b_0"));
        EntityGraph::from_parts(nodes, edges)
    }

    /// Ring of `k` cliques, neighbouring cliques joined by one edge.
    fn make_ring_of_cliques(k: usize, size: usize) -> EntityGraph {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for c in 0..k {
            for i in 0..size {
                nodes.push(EntityNode::new(format!("c{}_{}", c, i)));
                for j in (i + 1)..size {
                    edges.push(EntityEdge::new(
                        format!("c{}_{}", c, i),
                        format!("c{}_{}", c, j),
                    ));
                }
            }
            edges.push(EntityEdge::new(
                format!("c{}_0", c),
                format!("c{}_1", (c + 1) % k),
            ));
        }
        EntityGraph::from_parts(nodes, edges)
    }

    #[test]
    fn test_louvain_two_cliques_detects_2_communities() {
        let g = make_two_cliques(4);
        let result = detect_communities(&g, &LouvainConfig::default());

        assert_eq!(result.communities.len(), 8);
        assert_eq!(
            result.community_list.len(),
            2,
            "Expected 2 communities, got {}",
            result.community_list.len()
        );
        assert!(result.modularity > 0.0, "Modularity should be positive");

        let a_comm = result.communities["a_0"];
        let b_comm = result.communities["b_0"];
        for i in 1..4 {
            assert_eq!(result.communities[&format!("a_{}", i)], a_comm);
            assert_eq!(result.communities[&format!("b_{}", i)], b_comm);
        }
        assert_ne!(a_comm, b_comm, "The two cliques should be in different communities");
    }

    #[test]
    fn test_louvain_disjoint_pairs_are_separate() {
        let g = make_graph(&["a", "b", "c", "d"], &[("a", "b"), ("c", "d")]);
        let result = detect_communities(&g, &LouvainConfig::default());
        let c = &result.communities;
        assert_eq!(c["a"], c["b"]);
        assert_eq!(c["c"], c["d"]);
        assert_ne!(c["a"], c["c"]);
        assert!((result.modularity - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_louvain_complete_graph_single_community() {
        let names: Vec<String> = (0..5).map(|i| format!("n{}", i)).collect();
        let mut edges = Vec::new();
        for i in 0..5 {
            for j in (i + 1)..5 {
                edges.push(EntityEdge::new(names[i].clone(), names[j].clone()));
            }
        }
        let g = EntityGraph::from_parts(names.iter().map(EntityNode::new), edges);
        let result = detect_communities(&g, &LouvainConfig::default());
        assert_eq!(result.community_list.len(), 1);
        assert_eq!(result.community_list[0].size, 5);
    }

    #[test]
    fn test_louvain_ring_of_cliques_aggregates() {
        let g = make_ring_of_cliques(6, 5);
        let result = detect_communities(&g, &LouvainConfig::default());

        assert_eq!(result.community_list.len(), 6, "one community per clique");
        for c in 0..6 {
            let head = result.communities[&format!("c{}_0", c)];
            for i in 1..5 {
                assert_eq!(result.communities[&format!("c{}_{}", c, i)], head);
            }
        }
        assert!(result.metadata.levels >= 1);
        assert!(result.modularity > 0.5);
    }

    #[test]
    fn test_louvain_sizes_sum_to_node_count() {
        let g = make_ring_of_cliques(4, 4);
        let result = detect_communities(&g, &LouvainConfig::default());
        let total: usize = result.community_list.iter().map(|c| c.size).sum();
        assert_eq!(total, g.node_count());
        assert_eq!(result.communities.len(), g.node_count());
        assert_eq!(result.metadata.community_count, result.community_list.len());
    }

    #[test]
    fn test_louvain_lone_node_is_singleton() {
        let g = make_graph(&["a", "b", "lonely"], &[("a", "b")]);
        let result = detect_communities(&g, &LouvainConfig::default());
        let lonely = result.communities["lonely"];
        assert_ne!(lonely, result.communities["a"]);
        let info = result.entity_community("lonely").unwrap();
        assert_eq!(info.size, 1);
        // a-b alone: Q = 2/2 - (2/2)^2 = 0, the singleton adds nothing
        assert!((result.modularity - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_louvain_self_loops_do_not_change_count() {
        let plain = make_graph(&["a", "b", "c", "d"], &[("a", "b"), ("c", "d")]);
        let looped = make_graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("c", "d"), ("a", "a"), ("d", "d"), ("d", "d")],
        );
        let r1 = detect_communities(&plain, &LouvainConfig::default());
        let r2 = detect_communities(&looped, &LouvainConfig::default());
        assert_eq!(r1.community_list.len(), r2.community_list.len());
        assert_eq!(r1.communities, r2.communities);
        assert!((r1.modularity - r2.modularity).abs() < 1e-12);
    }

    #[test]
    fn test_louvain_only_self_loops() {
        let g = make_graph(&["a", "b"], &[("a", "a"), ("b", "b")]);
        let result = detect_communities(&g, &LouvainConfig::default());
        assert_eq!(result.community_list.len(), 2);
        assert_eq!(result.modularity, 0.0);
    }

    #[test]
    fn test_louvain_empty_graph() {
        let result = detect_communities(&EntityGraph::new(), &LouvainConfig::default());
        assert!(result.communities.is_empty());
        assert!(result.community_list.is_empty());
        assert_eq!(result.modularity, 0.0);
        assert_eq!(result.metadata.iterations, 0);
    }

    #[test]
    fn test_louvain_is_deterministic() {
        let g = make_ring_of_cliques(5, 4);
        let config = LouvainConfig::default();
        let first = detect_communities(&g, &config);
        for _ in 0..3 {
            assert_eq!(detect_communities(&g, &config), first);
        }
    }

    #[test]
    fn test_louvain_respects_iteration_budget() {
        let g = make_ring_of_cliques(4, 4);
        let config = LouvainConfig {
            max_iterations: 1,
            ..LouvainConfig::default()
        };
        let result = detect_communities(&g, &config);
        assert_eq!(result.metadata.iterations, 1);
        assert_eq!(result.communities.len(), g.node_count());
    }

    #[test]
    fn test_louvain_high_resolution_splits_more() {
        let g = make_ring_of_cliques(4, 4);
        let coarse = detect_communities(&g, &LouvainConfig::default());
        let fine = detect_communities(
            &g,
            &LouvainConfig {
                resolution: 8.0,
                ..LouvainConfig::default()
            },
        );
        assert!(fine.community_list.len() >= coarse.community_list.len());
    }

    #[test]
    fn test_modularity_empty_is_zero() {
        let adj = UndirectedAdjacency::default();
        assert_eq!(calculate_modularity(&[], &adj, 1.0), 0.0);
    }

    #[test]
    fn test_modularity_all_in_one_community_is_zero() {
        let g = make_graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let adj = build_undirected(&g);
        let q = calculate_modularity(&[0, 0, 0], &adj, 1.0);
        assert!(q.abs() < 1e-12, "Q for a single community should be 0, got {}", q);
    }

    #[test]
    fn test_community_summary_types() {
        let g = EntityGraph::from_parts(
            vec![
                EntityNode::new("acme").with_type("Organization").with_name("Acme"),
                EntityNode::new("globex").with_type("Organization").with_name("Globex"),
                EntityNode::new("alice").with_type("Person").with_name("Alice"),
            ],
            vec![
                EntityEdge::new("acme", "globex"),
                EntityEdge::new("alice", "acme"),
                EntityEdge::new("alice", "globex"),
            ],
        );
        let result = detect_communities(&g, &LouvainConfig::default());
        assert_eq!(result.community_list.len(), 1);
        let info = &result.community_list[0];
        assert_eq!(info.type_histogram["Organization"], 2);
        assert_eq!(info.type_histogram["Person"], 1);
        assert_eq!(info.dominant_type.as_deref(), Some("Organization"));
        assert!((info.total_weight - 3.0).abs() < f64::EPSILON);
        assert!(info.label.starts_with("Organization: "), "Got: {}", info.label);
    }

    #[test]
    fn test_community_label_formats() {
        assert_eq!(generate_community_label(&[], None), "empty");
        assert_eq!(generate_community_label(&["Acme"], None), "Acme");
        assert_eq!(
            generate_community_label(&["Acme", "Globex", "Initech", "Hooli"], Some("Organization")),
            "Organization: Acme, Globex +2"
        );
    }

    #[test]
    fn test_dominant_type_tie_takes_smallest() {
        let g = EntityGraph::from_parts(
            vec![
                EntityNode::new("x").with_type("Person"),
                EntityNode::new("y").with_type("Location"),
            ],
            vec![EntityEdge::new("x", "y")],
        );
        let result = detect_communities(&g, &LouvainConfig::default());
        assert_eq!(result.community_list[0].dominant_type.as_deref(), Some("Location"));
    }

    #[test]
    fn test_benchmark_louvain_500_nodes() {
        let names: Vec<String> = (0..500).map(|i| format!("entity_{}", i)).collect();
        let mut edges = Vec::new();
        for i in 0..500 {
            for offset in &[1, 7, 31, 127] {
                let j = (i + offset) % 500;
                edges.push(EntityEdge::new(names[i].clone(), names[j].clone()));
            }
        }
        let g = EntityGraph::from_parts(names.iter().map(EntityNode::new), edges);

        let start = std::time::Instant::now();
        let result = detect_communities(&g, &LouvainConfig::default());
        let elapsed = start.elapsed();

        assert_eq!(result.communities.len(), 500);
        assert!(!result.community_list.is_empty());
        assert!(
            elapsed.as_millis() < 5000,
            "Louvain on 500 nodes took {}ms (limit: 5000ms for debug build)",
            elapsed.as_millis()
        );
    }
}
