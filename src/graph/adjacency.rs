//! Adjacency builder.
//!
//! Converts an [`EntityGraph`] into the flat, index-addressed adjacency the
//! algorithms iterate over. Node `i` here is `NodeIndex::new(i)` in the
//! source graph, so iteration order is insertion order and never hash order.
//!
//! Two views are produced:
//! - [`UndirectedAdjacency`] for modularity (Louvain)
//! - [`DirectedAdjacency`] for ranking and centrality
//!
//! Parallel edges between the same pair are summed. Self-loops are kept out of
//! the neighbour lists and out of every degree; they are only tallied in
//! `self_loops`.

use petgraph::visit::EdgeRef;
use std::collections::BTreeMap;

use super::models::EntityGraph;

/// Symmetric weighted adjacency with degree sums.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndirectedAdjacency {
    /// Neighbour lists sorted by neighbour index: `(neighbor, aggregated weight)`
    pub neighbors: Vec<Vec<(usize, f64)>>,
    /// Self-loop weight per node, excluded from `degree`
    pub self_loops: Vec<f64>,
    /// Weighted degree per node
    pub degree: Vec<f64>,
    /// Sum of undirected edge weights, each edge counted once (m)
    pub total_weight: f64,
}

impl UndirectedAdjacency {
    pub fn node_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Number of distinct undirected neighbour pairs.
    pub fn edge_count(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum::<usize>() / 2
    }
}

/// Out/in weighted adjacency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectedAdjacency {
    /// Outgoing neighbour lists sorted by target index
    pub out_neighbors: Vec<Vec<(usize, f64)>>,
    /// Incoming neighbour lists sorted by source index
    pub in_neighbors: Vec<Vec<(usize, f64)>>,
    pub self_loops: Vec<f64>,
}

impl DirectedAdjacency {
    pub fn node_count(&self) -> usize {
        self.out_neighbors.len()
    }

    pub fn out_degree(&self, node: usize) -> usize {
        self.out_neighbors[node].len()
    }

    /// True when the node has no incident edge other than self-loops.
    pub fn is_isolated(&self, node: usize) -> bool {
        self.out_neighbors[node].is_empty() && self.in_neighbors[node].is_empty()
    }

    /// Symmetric view where every edge can be walked both ways.
    pub fn from_undirected(adj: &UndirectedAdjacency) -> Self {
        Self {
            out_neighbors: adj.neighbors.clone(),
            in_neighbors: adj.neighbors.clone(),
            self_loops: adj.self_loops.clone(),
        }
    }
}

/// Build the undirected adjacency used for modularity.
///
/// Edge direction is ignored: `a → b` and `b → a` both add to the `{a, b}` pair.
pub fn build_undirected(graph: &EntityGraph) -> UndirectedAdjacency {
    let g = &graph.graph;
    let n = g.node_count();
    let mut pairs: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
    let mut self_loops = vec![0.0; n];

    for edge in g.edge_references() {
        let s = edge.source().index();
        let t = edge.target().index();
        let w = edge.weight().weight;
        if s == t {
            self_loops[s] += w;
            continue;
        }
        *pairs[s].entry(t).or_insert(0.0) += w;
        *pairs[t].entry(s).or_insert(0.0) += w;
    }

    let neighbors: Vec<Vec<(usize, f64)>> = pairs
        .into_iter()
        .map(|m| m.into_iter().collect())
        .collect();
    let degree: Vec<f64> = neighbors
        .iter()
        .map(|list| list.iter().map(|&(_, w)| w).sum())
        .collect();
    let total_weight = degree.iter().sum::<f64>() / 2.0;

    UndirectedAdjacency {
        neighbors,
        self_loops,
        degree,
        total_weight,
    }
}

/// Build the directed adjacency used for ranking and centrality.
///
/// Edges flagged `directed = false` contribute in both directions.
pub fn build_directed(graph: &EntityGraph) -> DirectedAdjacency {
    let g = &graph.graph;
    let n = g.node_count();
    let mut outgoing: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
    let mut incoming: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
    let mut self_loops = vec![0.0; n];

    for edge in g.edge_references() {
        let s = edge.source().index();
        let t = edge.target().index();
        let data = edge.weight();
        if s == t {
            self_loops[s] += data.weight;
            continue;
        }
        *outgoing[s].entry(t).or_insert(0.0) += data.weight;
        *incoming[t].entry(s).or_insert(0.0) += data.weight;
        if !data.directed {
            *outgoing[t].entry(s).or_insert(0.0) += data.weight;
            *incoming[s].entry(t).or_insert(0.0) += data.weight;
        }
    }

    DirectedAdjacency {
        out_neighbors: outgoing.into_iter().map(|m| m.into_iter().collect()).collect(),
        in_neighbors: incoming.into_iter().map(|m| m.into_iter().collect()).collect(),
        self_loops,
    }
}
