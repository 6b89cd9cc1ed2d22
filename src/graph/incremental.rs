//! Incremental community detection (Dynamic Frontier Louvain).
//!
//! Instead of recomputing every community after a small update, only the
//! nodes touched by the change (the frontier) are re-evaluated. Every other
//! node keeps its previous label and stays fixed, though it remains a valid
//! move target. A frontier node is revisited only while a frontier neighbour
//! keeps moving, so the work is bounded by the frontier size.
//!
//! Falls back to a full [`detect_communities`] run when there is no previous
//! result, when the graph is too small to benefit, or when too much of it
//! changed.

use std::collections::{BTreeMap, BTreeSet};

use super::adjacency::build_undirected;
use super::louvain::{build_result, calculate_modularity, detect_communities, Level, LocalMoving};
use super::models::{
    CommunityDetectionResult, EntityEdge, EntityGraph, IncrementalCommunityResult,
    IncrementalConfig, IncrementalMetadata, LouvainConfig,
};

/// Delta applied to the graph since `previous_result` was computed.
///
/// The snapshot passed alongside it must already contain the change.
#[derive(Debug, Clone, Default)]
pub struct IncrementalUpdate {
    pub previous_result: Option<CommunityDetectionResult>,
    pub new_node_ids: Vec<String>,
    pub new_edges: Vec<EntityEdge>,
    pub removed_edges: Vec<EntityEdge>,
    pub modified_node_ids: Vec<String>,
}

impl IncrementalUpdate {
    pub fn new(previous: CommunityDetectionResult) -> Self {
        Self {
            previous_result: Some(previous),
            ..Self::default()
        }
    }

    /// Fraction of the graph touched by this update.
    ///
    /// Counts new nodes, modified nodes and the distinct endpoints of new
    /// edges. Removed edges do not count.
    pub fn change_ratio(&self, total_nodes: usize) -> f64 {
        if total_nodes == 0 {
            return 0.0;
        }
        let endpoints: BTreeSet<&str> = self
            .new_edges
            .iter()
            .flat_map(|e| [e.source.as_str(), e.target.as_str()])
            .collect();
        (self.new_node_ids.len() + self.modified_node_ids.len() + endpoints.len()) as f64
            / total_nodes as f64
    }
}

/// Detect communities by updating a previous result.
///
/// `graph` is the current snapshot. Community IDs stay in the previous
/// result's ID space; newly created communities get IDs above its maximum.
pub fn detect_communities_incremental(
    graph: &EntityGraph,
    update: &IncrementalUpdate,
    louvain: &LouvainConfig,
    config: &IncrementalConfig,
) -> IncrementalCommunityResult {
    let total = graph.node_count();
    let change_ratio = update.change_ratio(total);

    let previous = match &update.previous_result {
        Some(prev) if total >= config.min_graph_size && change_ratio <= config.max_change_ratio => {
            prev
        }
        previous => {
            tracing::debug!(
                "Incremental Louvain falling back to full run (nodes={}, change_ratio={:.3}, has_previous={})",
                total,
                change_ratio,
                previous.is_some()
            );
            return full_recompute(graph, previous.as_ref(), louvain, change_ratio);
        }
    };

    let adj = build_undirected(graph);
    let level = Level::from_adjacency(&adj);

    // Map previous labels onto dense indices, preserving their order so the
    // lowest-ID tie-break still holds. Unlabelled nodes become fresh singletons.
    let seeded: Vec<Option<u32>> = graph
        .node_ids()
        .into_iter()
        .map(|id| previous.communities.get(id).copied())
        .collect();
    let known: BTreeSet<u32> = seeded.iter().flatten().copied().collect();
    let mut dense_to_label: Vec<u32> = known.iter().copied().collect();
    let label_to_dense: BTreeMap<u32, usize> = dense_to_label
        .iter()
        .enumerate()
        .map(|(dense, &label)| (label, dense))
        .collect();
    let mut next_label = previous
        .communities
        .values()
        .max()
        .map_or(0, |max| max + 1);

    let mut frontier: BTreeSet<usize> = BTreeSet::new();
    let mut labels = Vec::with_capacity(total);
    for (node, label) in seeded.iter().enumerate() {
        match label.and_then(|l| label_to_dense.get(&l)) {
            Some(&dense) => labels.push(dense),
            None => {
                labels.push(dense_to_label.len());
                dense_to_label.push(next_label);
                next_label += 1;
                frontier.insert(node);
            }
        }
    }

    let explicit = update
        .new_node_ids
        .iter()
        .chain(&update.modified_node_ids)
        .map(String::as_str)
        .chain(
            update
                .new_edges
                .iter()
                .chain(&update.removed_edges)
                .flat_map(|e| [e.source.as_str(), e.target.as_str()]),
        );
    frontier.extend(explicit.filter_map(|id| graph.get_index(id)).map(|idx| idx.index()));

    if config.expand_to_neighbors {
        let neighbours: Vec<usize> = frontier
            .iter()
            .flat_map(|&node| level.neighbors[node].iter().map(|&(j, _)| j))
            .collect();
        frontier.extend(neighbours);
    }
    let frontier_size = frontier.len();

    let community_count = dense_to_label.len();
    let mut mover = LocalMoving::new(&level, labels, community_count, louvain);
    // Nodes outside the frontier are valid move targets but never move.
    // A node whose neighbour moved is re-evaluated only if it is in the frontier.
    let mut affected = frontier.clone();
    let mut active = frontier.clone();
    let mut iterations = 0;

    while !active.is_empty() && iterations < louvain.max_iterations {
        iterations += 1;
        let mut next = BTreeSet::new();
        for &node in &active {
            if mover.try_move(node) {
                for &(j, _) in &level.neighbors[node] {
                    affected.insert(j);
                    if frontier.contains(&j) {
                        next.insert(j);
                    }
                }
            }
        }
        active = next;
    }

    let final_labels: Vec<u32> = mover.labels.iter().map(|&d| dense_to_label[d]).collect();
    let modularity = calculate_modularity(&final_labels, &adj, louvain.resolution);
    let result = build_result(graph, &adj, &final_labels, modularity, iterations, 0);

    let ids = graph.node_ids();
    let changed_communities = identify_changed_communities(
        &previous.communities,
        &result.communities,
        frontier.iter().map(|&node| ids[node]),
    );

    tracing::debug!(
        "Incremental Louvain: frontier={} affected={} sweeps={} changed_communities={}",
        frontier_size,
        affected.len(),
        iterations,
        changed_communities.len()
    );

    IncrementalCommunityResult {
        result,
        incremental: IncrementalMetadata {
            incremental: true,
            frontier_size,
            affected_node_count: affected.len(),
            fell_back_to_full: false,
            change_ratio,
            iterations,
        },
        changed_communities,
    }
}

fn full_recompute(
    graph: &EntityGraph,
    previous: Option<&CommunityDetectionResult>,
    louvain: &LouvainConfig,
    change_ratio: f64,
) -> IncrementalCommunityResult {
    let result = detect_communities(graph, louvain);
    let changed_communities = match previous {
        Some(prev) => {
            identify_changed_communities(&prev.communities, &result.communities, graph.node_ids())
        }
        None => result.communities.values().copied().collect(),
    };
    let total = graph.node_count();

    IncrementalCommunityResult {
        incremental: IncrementalMetadata {
            incremental: false,
            frontier_size: total,
            affected_node_count: total,
            fell_back_to_full: true,
            change_ratio,
            iterations: result.metadata.iterations,
        },
        result,
        changed_communities,
    }
}

/// Communities touched by a set of affected nodes.
///
/// The union of each affected node's previous and current community. Nodes
/// missing from a map contribute nothing for that side.
pub fn identify_changed_communities<I, S>(
    previous: &BTreeMap<String, u32>,
    current: &BTreeMap<String, u32>,
    affected: I,
) -> BTreeSet<u32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut changed = BTreeSet::new();
    for id in affected {
        let id = id.as_ref();
        changed.extend(previous.get(id).copied());
        changed.extend(current.get(id).copied());
    }
    changed
}
